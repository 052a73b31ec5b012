use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error::QueueError;
use crate::file::{FileId, SourceFile};
use crate::time::{duration_as_secs_f64, duration_from_secs_f64};

pub type QueueId = Uuid;

/// One file scheduled inside a [`TaskQueue`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct QueueEntry {
    pub id: Uuid,
    pub file_id: FileId,
    /// Deadline of the file at the time it was queued.
    pub file_deadline: DateTime<Utc>,
    pub expected_duration_secs: f64,
    pub is_popped: bool,
}

impl QueueEntry {
    pub fn new(file: &SourceFile, expected_duration: Duration) -> Self {
        Self {
            id: Uuid::new_v4(),
            file_id: file.id,
            file_deadline: file.deadline,
            expected_duration_secs: duration_as_secs_f64(expected_duration),
            is_popped: false,
        }
    }

    pub fn expected_duration(&self) -> Duration {
        duration_from_secs_f64(self.expected_duration_secs)
    }

    /// `deadline - expected_duration * buffer`: the last moment this entry
    /// can start and still meet its deadline with the safety margin.
    pub fn latest_feasible_start(&self, buffer: f64) -> DateTime<Utc> {
        self.file_deadline - duration_from_secs_f64(self.expected_duration_secs * buffer)
    }
}

/// Files sharing a common start time, claimed by workers in order of their
/// latest feasible start.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TaskQueue {
    pub id: QueueId,
    pub start_time: DateTime<Utc>,
    pub has_started: bool,
    pub created_at: DateTime<Utc>,
    /// Multiplier applied to expected durations when ordering entries.
    pub deadline_buffer: f64,
    entries: Vec<QueueEntry>,
}

impl TaskQueue {
    pub fn new(start_time: DateTime<Utc>, created_at: DateTime<Utc>, deadline_buffer: f64) -> Self {
        Self {
            id: Uuid::new_v4(),
            start_time,
            has_started: false,
            created_at,
            deadline_buffer,
            entries: Vec::new(),
        }
    }

    pub fn entries(&self) -> &[QueueEntry] {
        &self.entries
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    fn has_unpopped_for(&self, file: FileId) -> bool {
        self.entries.iter().any(|e| !e.is_popped && e.file_id == file)
    }

    /// Add an unpopped entry. A file may have at most one unpopped entry.
    pub fn add_entry(&mut self, mut entry: QueueEntry) -> Result<(), QueueError> {
        if self.has_unpopped_for(entry.file_id) {
            return Err(QueueError::DuplicateFile {
                queue: self.id,
                file: entry.file_id,
            });
        }
        entry.is_popped = false;
        self.entries.push(entry);
        Ok(())
    }

    /// Append entries as unpopped. Entries already in the queue keep their
    /// popped state. Stops at the first file that is already queued.
    pub fn extend(&mut self, entries: impl IntoIterator<Item = QueueEntry>) -> Result<(), QueueError> {
        for entry in entries {
            self.add_entry(entry)?;
        }
        Ok(())
    }

    /// Return a popped entry to the queue so a later run claims it again.
    pub fn requeue(&mut self, entry_id: Uuid) -> Result<(), QueueError> {
        let queue = self.id;
        let idx = self
            .entries
            .iter()
            .position(|e| e.id == entry_id && e.is_popped)
            .ok_or(QueueError::UnknownEntry { queue, entry: entry_id })?;
        let file = self.entries[idx].file_id;
        if self.has_unpopped_for(file) {
            return Err(QueueError::DuplicateFile { queue, file });
        }
        self.entries[idx].is_popped = false;
        Ok(())
    }

    pub fn has_unpopped_entries(&self) -> bool {
        self.entries.iter().any(|e| !e.is_popped)
    }

    pub fn unpopped_count(&self) -> usize {
        self.entries.iter().filter(|e| !e.is_popped).count()
    }

    /// Claim the unpopped entry with the earliest latest-feasible start.
    /// Ties resolve in insertion order.
    pub fn pop(&mut self) -> Result<QueueEntry, QueueError> {
        let buffer = self.deadline_buffer;
        let idx = self
            .entries
            .iter()
            .enumerate()
            .filter(|(_, e)| !e.is_popped)
            .min_by_key(|(_, e)| e.latest_feasible_start(buffer))
            .map(|(i, _)| i)
            .ok_or(QueueError::Empty(self.id))?;

        let entry = &mut self.entries[idx];
        entry.is_popped = true;
        Ok(entry.clone())
    }

    /// Sum of expected durations of all entries.
    pub fn expected_duration(&self) -> Duration {
        let secs: f64 = self.entries.iter().map(|e| e.expected_duration_secs).sum();
        duration_from_secs_f64(secs)
    }

    pub fn expected_end_time(&self) -> DateTime<Utc> {
        self.start_time + self.expected_duration()
    }

    pub fn is_ready(&self, now: DateTime<Utc>) -> bool {
        self.start_time <= now
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn t0() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 5, 1, 8, 0, 0).unwrap()
    }

    fn file_due_in(secs: i64) -> SourceFile {
        SourceFile::new(format!("pending/{secs}.zip"), 100, t0(), Duration::seconds(secs))
    }

    #[test]
    fn latest_feasible_start_applies_buffer() {
        let f = file_due_in(60);
        let e = QueueEntry::new(&f, Duration::seconds(4));
        assert_eq!(
            e.latest_feasible_start(1.1),
            t0() + Duration::seconds(60) - Duration::milliseconds(4400)
        );
    }

    #[test]
    fn pop_orders_by_latest_feasible_start() {
        let mut q = TaskQueue::new(t0(), t0(), 1.1);
        let late = file_due_in(600);
        let early = file_due_in(30);
        q.add_entry(QueueEntry::new(&late, Duration::seconds(4))).unwrap();
        q.add_entry(QueueEntry::new(&early, Duration::seconds(4))).unwrap();

        assert_eq!(q.pop().unwrap().file_id, early.id);
        assert_eq!(q.pop().unwrap().file_id, late.id);
        assert_eq!(q.pop(), Err(QueueError::Empty(q.id)));
    }

    #[test]
    fn long_job_with_later_deadline_can_go_first() {
        let mut q = TaskQueue::new(t0(), t0(), 1.1);
        let short = file_due_in(100);
        let long = file_due_in(120);
        q.add_entry(QueueEntry::new(&short, Duration::seconds(10))).unwrap();
        q.add_entry(QueueEntry::new(&long, Duration::seconds(50))).unwrap();
        // 120 - 55 = 65 < 100 - 11 = 89
        assert_eq!(q.pop().unwrap().file_id, long.id);
    }

    #[test]
    fn ties_resolve_in_insertion_order() {
        let mut q = TaskQueue::new(t0(), t0(), 1.1);
        let a = file_due_in(60);
        let b = file_due_in(60);
        q.add_entry(QueueEntry::new(&a, Duration::seconds(4))).unwrap();
        q.add_entry(QueueEntry::new(&b, Duration::seconds(4))).unwrap();
        assert_eq!(q.pop().unwrap().file_id, a.id);
    }

    #[test]
    fn extend_keeps_popped_entries_popped() {
        let mut q = TaskQueue::new(t0(), t0(), 1.1);
        let a = file_due_in(60);
        q.add_entry(QueueEntry::new(&a, Duration::seconds(4))).unwrap();
        q.pop().unwrap();
        assert!(!q.has_unpopped_entries());

        let b = file_due_in(90);
        let mut stale = QueueEntry::new(&b, Duration::seconds(4));
        stale.is_popped = true;
        q.extend(vec![stale]).unwrap();

        assert_eq!(q.len(), 2);
        assert!(q.entries()[0].is_popped);
        assert!(!q.entries()[1].is_popped);
        assert_eq!(q.unpopped_count(), 1);
    }

    #[test]
    fn second_unpopped_entry_for_a_file_is_rejected() {
        let mut q = TaskQueue::new(t0(), t0(), 1.1);
        let a = file_due_in(60);
        q.add_entry(QueueEntry::new(&a, Duration::seconds(4))).unwrap();
        assert_eq!(
            q.add_entry(QueueEntry::new(&a, Duration::seconds(4))),
            Err(QueueError::DuplicateFile { queue: q.id, file: a.id })
        );
        assert!(q.extend(vec![QueueEntry::new(&a, Duration::seconds(1))]).is_err());
        assert_eq!(q.len(), 1);

        // Once the first entry is claimed the file may be queued again.
        q.pop().unwrap();
        q.add_entry(QueueEntry::new(&a, Duration::seconds(4))).unwrap();
        assert_eq!(q.unpopped_count(), 1);
    }

    #[test]
    fn requeue_returns_popped_entry() {
        let mut q = TaskQueue::new(t0(), t0(), 1.1);
        let a = file_due_in(60);
        q.add_entry(QueueEntry::new(&a, Duration::seconds(4))).unwrap();
        let entry = q.pop().unwrap();
        assert!(!q.has_unpopped_entries());

        q.requeue(entry.id).unwrap();
        assert_eq!(q.pop().unwrap().id, entry.id);

        let unknown = Uuid::new_v4();
        assert_eq!(q.requeue(unknown), Err(QueueError::UnknownEntry { queue: q.id, entry: unknown }));
    }

    #[test]
    fn expected_end_time_sums_entries() {
        let mut q = TaskQueue::new(t0(), t0(), 1.1);
        q.add_entry(QueueEntry::new(&file_due_in(60), Duration::seconds(4))).unwrap();
        q.add_entry(QueueEntry::new(&file_due_in(60), Duration::milliseconds(1500))).unwrap();
        assert_eq!(q.expected_duration(), Duration::milliseconds(5500));
        assert_eq!(q.expected_end_time(), t0() + Duration::milliseconds(5500));
    }

    #[test]
    fn empty_queue_pop_fails() {
        let mut q = TaskQueue::new(t0(), t0(), 1.1);
        assert!(q.is_empty());
        assert!(matches!(q.pop(), Err(QueueError::Empty(_))));
    }
}
