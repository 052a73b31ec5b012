use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::state::{FileProcessStep, FileStateCode};

pub type FileId = Uuid;

/// A tracked data file, either discovered in the pending bucket or produced
/// by a pipeline stage from its parent.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SourceFile {
    pub id: FileId,
    /// Unique `"{bucket}/{key}"` path.
    pub path: String,
    /// Size in bytes.
    pub size: u64,
    pub created_at: DateTime<Utc>,
    pub deadline: DateTime<Utc>,
    pub state: FileStateCode,
    pub step: FileProcessStep,
    /// Root file this one was derived from.
    pub source_file: Option<FileId>,
    /// Pod currently processing this file.
    pub pod: Option<Uuid>,
}

impl SourceFile {
    /// A fresh pending file whose deadline is `created_at + deadline_offset`.
    pub fn new(path: impl Into<String>, size: u64, created_at: DateTime<Utc>, deadline_offset: Duration) -> Self {
        Self {
            id: Uuid::new_v4(),
            path: path.into(),
            size,
            created_at,
            deadline: created_at + deadline_offset.max(Duration::zero()),
            state: FileStateCode::Pending,
            step: FileProcessStep::New,
            source_file: None,
            pod: None,
        }
    }

    /// Override the deadline. Deadlines before creation are clamped to it.
    pub fn with_deadline(mut self, deadline: DateTime<Utc>) -> Self {
        self.deadline = deadline.max(self.created_at);
        self
    }

    pub fn with_state(mut self, state: FileStateCode) -> Self {
        self.state = state;
        self
    }

    pub fn with_source(mut self, source: FileId) -> Self {
        self.source_file = Some(source);
        self
    }

    pub fn is_finished(&self) -> bool {
        self.step == FileProcessStep::Finished
    }

    pub fn is_pending_new(&self) -> bool {
        self.state == FileStateCode::Pending && self.step == FileProcessStep::New
    }

    /// Path under which a file discovered in `bucket` is tracked.
    pub fn bucket_path(bucket: &str, key: &str) -> String {
        format!("{}/{}", bucket, key)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn t0() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 5, 1, 8, 0, 0).unwrap()
    }

    #[test]
    fn new_file_defaults_to_pending_new() {
        let f = SourceFile::new("pending/a.zip", 10, t0(), Duration::hours(24));
        assert_eq!(f.deadline, t0() + Duration::hours(24));
        assert!(f.is_pending_new());
        assert!(f.source_file.is_none());
    }

    #[test]
    fn deadline_never_precedes_creation() {
        let f = SourceFile::new("pending/a.zip", 10, t0(), Duration::hours(1))
            .with_deadline(t0() - Duration::minutes(5));
        assert_eq!(f.deadline, t0());

        let g = SourceFile::new("pending/b.zip", 10, t0(), Duration::seconds(-30));
        assert_eq!(g.deadline, t0());
    }

    #[test]
    fn bucket_path_joins_bucket_and_key() {
        assert_eq!(SourceFile::bucket_path("pending", "x/y.zip"), "pending/x/y.zip");
    }
}
