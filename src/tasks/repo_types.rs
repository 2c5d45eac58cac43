use serde::{Deserialize, Serialize};
use time::OffsetDateTime;

/// Task record owned by exactly one user.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Task {
    pub id: u64,
    pub title: String,
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub completed: bool,
    #[serde(with = "time::serde::rfc3339")]
    pub created_at: OffsetDateTime,
}

/// Soft-deleted task. Serialized flat: the task fields plus `deletedAt`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TrashEntry {
    #[serde(flatten)]
    pub task: Task,
    #[serde(with = "time::serde::rfc3339")]
    pub deleted_at: OffsetDateTime,
}

impl TrashEntry {
    pub fn new(task: Task, deleted_at: OffsetDateTime) -> Self {
        Self { task, deleted_at }
    }

    pub fn into_task(self) -> Task {
        self.task
    }
}
