use std::collections::HashSet;

use time::{Duration, OffsetDateTime};

use crate::store::Document;
use crate::tasks::repo_types::{Task, TrashEntry};

impl Document {
    /// Drops entries whose age has reached `retention`. Returns how many went.
    pub fn sweep_trash(&mut self, username: &str, retention: Duration, now: OffsetDateTime) -> usize {
        let Some(trash) = self.trash_by_user.get_mut(username) else {
            return 0;
        };
        let before = trash.len();
        trash.retain(|entry| now - entry.deleted_at < retention);
        before - trash.len()
    }

    pub fn trash(&self, username: &str) -> &[TrashEntry] {
        self.trash_by_user
            .get(username)
            .map(Vec::as_slice)
            .unwrap_or_default()
    }

    /// Moves every trashed task whose id is in `ids` back to the task list, in
    /// trash order. Ids not in the trash are ignored.
    pub fn restore_tasks(&mut self, username: &str, ids: &[u64]) -> Vec<Task> {
        let wanted: HashSet<u64> = ids.iter().copied().collect();

        let trash = self.trash_by_user.remove(username).unwrap_or_default();
        let (matched, remainder): (Vec<_>, Vec<_>) = trash
            .into_iter()
            .partition(|entry| wanted.contains(&entry.task.id));
        self.trash_by_user.insert(username.to_owned(), remainder);

        let restored: Vec<Task> = matched.into_iter().map(TrashEntry::into_task).collect();
        self.tasks_by_user
            .entry(username.to_owned())
            .or_default()
            .extend(restored.iter().cloned());
        restored
    }
}
