use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::state::PipelineRole;

/// Status recorded for pods the runtime no longer reports.
pub const POD_STATUS_DELETED: &str = "deleted";
pub const POD_STATUS_PENDING: &str = "pending";

/// A container launched for one pipeline stage of one queue entry.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Pod {
    /// Correlation id handed to the runtime when the pod is launched.
    pub identifier: Uuid,
    pub role: PipelineRole,
    pub name: Option<String>,
    pub namespace: Option<String>,
    pub ip: Option<String>,
    pub status: String,
    pub labels: BTreeMap<String, String>,
    pub created_at: DateTime<Utc>,
    pub last_status_update: Option<DateTime<Utc>>,
}

impl Pod {
    pub fn new(role: PipelineRole, created_at: DateTime<Utc>) -> Self {
        Self {
            identifier: Uuid::new_v4(),
            role,
            name: None,
            namespace: None,
            ip: None,
            status: POD_STATUS_PENDING.to_string(),
            labels: BTreeMap::new(),
            created_at,
            last_status_update: None,
        }
    }

    pub fn is_deleted(&self) -> bool {
        self.status == POD_STATUS_DELETED
    }
}
