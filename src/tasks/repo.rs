use thiserror::Error;
use time::OffsetDateTime;

use crate::error::AppError;
use crate::store::{Document, StoreError};
use crate::tasks::repo_types::{Task, TrashEntry};

#[derive(Debug, Error)]
pub enum TaskError {
    #[error("Title is required")]
    MissingTitle,
    #[error("Task not found")]
    NotFound,
    #[error("ids array is required")]
    InvalidRequest,
    #[error(transparent)]
    Store(#[from] StoreError),
}

impl From<TaskError> for AppError {
    fn from(e: TaskError) -> Self {
        match e {
            TaskError::MissingTitle | TaskError::InvalidRequest => AppError::Validation(e.to_string()),
            TaskError::NotFound => AppError::NotFound(e.to_string()),
            TaskError::Store(store) => store.into(),
        }
    }
}

/// Fields a caller may change. `None` leaves the stored value untouched.
#[derive(Debug, Default, Clone)]
pub struct TaskPatch {
    pub title: Option<String>,
    pub description: Option<String>,
}

impl Document {
    pub fn tasks(&self, username: &str) -> &[Task] {
        self.tasks_by_user
            .get(username)
            .map(Vec::as_slice)
            .unwrap_or_default()
    }

    pub fn task(&self, username: &str, id: u64) -> Option<&Task> {
        self.tasks(username).iter().find(|t| t.id == id)
    }

    fn task_mut(&mut self, username: &str, id: u64) -> Result<&mut Task, TaskError> {
        self.tasks_by_user
            .get_mut(username)
            .and_then(|tasks| tasks.iter_mut().find(|t| t.id == id))
            .ok_or(TaskError::NotFound)
    }

    pub fn create_task(
        &mut self,
        username: &str,
        title: Option<&str>,
        description: Option<&str>,
        now: OffsetDateTime,
    ) -> Result<Task, TaskError> {
        let title = title.filter(|t| !t.is_empty()).ok_or(TaskError::MissingTitle)?;
        let task = Task {
            id: self.allocate_task_id(),
            title: title.to_owned(),
            description: description.unwrap_or_default().to_owned(),
            completed: false,
            created_at: now,
        };
        self.tasks_by_user
            .entry(username.to_owned())
            .or_default()
            .push(task.clone());
        Ok(task)
    }

    pub fn update_task(&mut self, username: &str, id: u64, patch: TaskPatch) -> Result<Task, TaskError> {
        let task = self.task_mut(username, id)?;
        if let Some(title) = patch.title {
            task.title = title;
        }
        if let Some(description) = patch.description {
            task.description = description;
        }
        Ok(task.clone())
    }

    pub fn toggle_task(&mut self, username: &str, id: u64) -> Result<Task, TaskError> {
        let task = self.task_mut(username, id)?;
        task.completed = !task.completed;
        Ok(task.clone())
    }

    /// Moves the task into the user's trash, stamped with `now`.
    pub fn delete_task(&mut self, username: &str, id: u64, now: OffsetDateTime) -> Result<(), TaskError> {
        let tasks = self.tasks_by_user.get_mut(username).ok_or(TaskError::NotFound)?;
        let index = tasks.iter().position(|t| t.id == id).ok_or(TaskError::NotFound)?;
        let task = tasks.remove(index);
        self.trash_by_user
            .entry(username.to_owned())
            .or_default()
            .push(TrashEntry::new(task, now));
        Ok(())
    }
}
