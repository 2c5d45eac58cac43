use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::tasks::repo::{TaskError, TaskPatch};
use crate::tasks::repo_types::Task;

#[derive(Debug, Default, Deserialize)]
pub struct CreateTaskRequest {
    pub title: Option<String>,
    pub description: Option<String>,
}

/// Absent fields are left unchanged.
#[derive(Debug, Default, Deserialize)]
pub struct UpdateTaskRequest {
    pub title: Option<String>,
    pub description: Option<String>,
}

impl From<UpdateTaskRequest> for TaskPatch {
    fn from(r: UpdateTaskRequest) -> Self {
        Self {
            title: r.title,
            description: r.description,
        }
    }
}

#[derive(Debug, Default, Deserialize)]
pub struct RestoreRequest {
    #[serde(default)]
    pub ids: Option<Value>,
}

impl RestoreRequest {
    /// `ids` must be a non-empty array. Elements that are not task ids are dropped.
    pub fn task_ids(&self) -> Result<Vec<u64>, TaskError> {
        match &self.ids {
            Some(Value::Array(items)) if !items.is_empty() => {
                Ok(items.iter().filter_map(Value::as_u64).collect())
            }
            _ => Err(TaskError::InvalidRequest),
        }
    }
}

#[derive(Debug, Serialize)]
pub struct RestoreResponse {
    pub restored: Vec<Task>,
}
