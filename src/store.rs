use std::collections::HashMap;
use std::path::{Path, PathBuf};

use anyhow::Context;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tokio::sync::Mutex;
use tracing::{debug, info, warn};

use crate::auth::repo_types::User;
use crate::tasks::repo_types::{Task, TrashEntry};

#[derive(Debug, Error)]
#[error("failed to persist data file: {0:#}")]
pub struct StoreError(#[from] anyhow::Error);

/// The whole persisted state, read once at start-up and rewritten after mutations.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct Document {
    pub users: Vec<User>,
    pub tasks_by_user: HashMap<String, Vec<Task>>,
    pub trash_by_user: HashMap<String, Vec<TrashEntry>>,
    pub next_task_id: u64,
}

impl Default for Document {
    fn default() -> Self {
        Self {
            users: Vec::new(),
            tasks_by_user: HashMap::new(),
            trash_by_user: HashMap::new(),
            next_task_id: 1,
        }
    }
}

impl Document {
    /// Hands out the next task id. Ids are never reused.
    pub fn allocate_task_id(&mut self) -> u64 {
        let id = self.next_task_id.max(1);
        self.next_task_id = id + 1;
        id
    }
}

/// Single-writer handle over the JSON data file.
pub struct Store {
    path: PathBuf,
    doc: Mutex<Document>,
}

impl Store {
    /// Loads the data file. A missing or unreadable file yields an empty document.
    pub async fn open(path: impl Into<PathBuf>) -> Self {
        let path = path.into();
        let doc = load(&path).await;
        info!(
            path = %path.display(),
            users = doc.users.len(),
            next_task_id = doc.next_task_id,
            "data file loaded"
        );
        Self {
            path,
            doc: Mutex::new(doc),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub async fn read<T>(&self, f: impl FnOnce(&Document) -> T) -> T {
        let doc = self.doc.lock().await;
        f(&doc)
    }

    /// Runs `f` under the lock and saves afterwards, whatever `f` returned:
    /// a rejected OTP submission still has to record the failed attempt.
    pub async fn write<T, E>(&self, f: impl FnOnce(&mut Document) -> Result<T, E>) -> Result<T, E>
    where
        E: From<StoreError>,
    {
        let mut doc = self.doc.lock().await;
        let result = f(&mut doc);
        save(&self.path, &doc).await?;
        result
    }

    /// Like [`Store::write`] but only saves when `f` reports a change.
    pub async fn write_if<T>(
        &self,
        f: impl FnOnce(&mut Document) -> (T, bool),
    ) -> Result<T, StoreError> {
        let mut doc = self.doc.lock().await;
        let (value, changed) = f(&mut doc);
        if changed {
            save(&self.path, &doc).await?;
        }
        Ok(value)
    }
}

async fn load(path: &Path) -> Document {
    let raw = match tokio::fs::read(path).await {
        Ok(raw) => raw,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
            debug!(path = %path.display(), "no data file yet; starting empty");
            return Document::default();
        }
        Err(e) => {
            warn!(error = %e, path = %path.display(), "data file unreadable; starting empty");
            return Document::default();
        }
    };

    match serde_json::from_slice::<Document>(&raw) {
        Ok(doc) => doc,
        Err(e) => {
            let backup = sibling(path, ".corrupt");
            match tokio::fs::write(&backup, &raw).await {
                Ok(()) => warn!(
                    error = %e,
                    path = %path.display(),
                    backup = %backup.display(),
                    "data file corrupt; copy kept, starting empty"
                ),
                Err(copy_err) => warn!(
                    error = %e,
                    copy_error = %copy_err,
                    path = %path.display(),
                    "data file corrupt and could not be copied; starting empty"
                ),
            }
            Document::default()
        }
    }
}

/// `<path><suffix>` in the same directory.
fn sibling(path: &Path, suffix: &str) -> PathBuf {
    let mut name = path.as_os_str().to_owned();
    name.push(suffix);
    PathBuf::from(name)
}

async fn save(path: &Path, doc: &Document) -> Result<(), StoreError> {
    let body = serde_json::to_vec_pretty(doc).context("serialize document")?;

    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        tokio::fs::create_dir_all(parent)
            .await
            .with_context(|| format!("create {}", parent.display()))?;
    }

    let tmp = sibling(path, ".tmp");

    tokio::fs::write(&tmp, &body)
        .await
        .with_context(|| format!("write {}", tmp.display()))?;
    tokio::fs::rename(&tmp, path)
        .await
        .with_context(|| format!("rename {} -> {}", tmp.display(), path.display()))?;

    debug!(path = %path.display(), bytes = body.len(), "data file saved");
    Ok(())
}
