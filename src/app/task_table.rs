use std::collections::HashMap;
use std::sync::{Arc, PoisonError, RwLock};

use chrono::{DateTime, Utc};

use crate::app::model::{InvalidTransition, Task};
use crate::app::task_store::{TaskSnapshot, TaskStore};

pub const INTERRUPTED_ERROR: &str = "interrupted by process restart";

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum TaskUpdateError {
    #[error("task not found: {0}")]
    NotFound(String),
    #[error(transparent)]
    Transition(#[from] InvalidTransition),
}

/// The process-wide task map. Each update is applied under the write lock,
/// so readers see a task either before or after it, never in between; the
/// full table is then persisted.
pub struct TaskTable {
    tasks: RwLock<HashMap<String, Task>>,
    store: Arc<dyn TaskStore>,
    persist_lock: tokio::sync::Mutex<()>,
}

impl TaskTable {
    pub fn new(store: Arc<dyn TaskStore>) -> Self {
        Self {
            tasks: RwLock::new(HashMap::new()),
            store,
            persist_lock: tokio::sync::Mutex::new(()),
        }
    }

    /// Loads the persisted table. Tasks that were still pending or running
    /// when the previous process stopped are marked failed.
    pub async fn restore(&self, now: DateTime<Utc>) -> anyhow::Result<usize> {
        let Some(snapshot) = self.store.load().await? else {
            return Ok(0);
        };

        let mut interrupted = 0usize;
        {
            let mut tasks = self.tasks.write().unwrap_or_else(PoisonError::into_inner);
            for mut task in snapshot.tasks {
                if !task.status.is_terminal() {
                    task.fail(INTERRUPTED_ERROR, INTERRUPTED_ERROR.to_string(), now)?;
                    interrupted += 1;
                }
                tasks.insert(task.task_id.clone(), task);
            }
            tracing::info!(tasks = tasks.len(), interrupted, "task table restored");
        }

        if interrupted > 0 {
            self.persist().await;
        }
        Ok(interrupted)
    }

    pub async fn insert(&self, task: Task) {
        self.tasks
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(task.task_id.clone(), task);
        self.persist().await;
    }

    pub fn get(&self, task_id: &str) -> Option<Task> {
        self.tasks
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .get(task_id)
            .cloned()
    }

    pub fn len(&self) -> usize {
        self.tasks.read().unwrap_or_else(PoisonError::into_inner).len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub async fn update<F>(&self, task_id: &str, apply: F) -> Result<Task, TaskUpdateError>
    where
        F: FnOnce(&mut Task) -> Result<(), InvalidTransition>,
    {
        let updated = {
            let mut tasks = self.tasks.write().unwrap_or_else(PoisonError::into_inner);
            let task = tasks
                .get_mut(task_id)
                .ok_or_else(|| TaskUpdateError::NotFound(task_id.to_string()))?;
            let mut next = task.clone();
            apply(&mut next)?;
            *task = next.clone();
            next
        };
        self.persist().await;
        Ok(updated)
    }

    /// Drops terminal tasks created before `cutoff`.
    pub async fn remove_expired(&self, cutoff: DateTime<Utc>) -> Vec<String> {
        let removed = {
            let mut tasks = self.tasks.write().unwrap_or_else(PoisonError::into_inner);
            let expired = tasks
                .values()
                .filter(|t| t.status.is_terminal() && t.created_at < cutoff)
                .map(|t| t.task_id.clone())
                .collect::<Vec<_>>();
            for task_id in &expired {
                tasks.remove(task_id);
            }
            expired
        };
        if !removed.is_empty() {
            self.persist().await;
        }
        removed
    }

    /// Writes the current table. Failures are logged; memory stays
    /// authoritative.
    pub async fn persist(&self) {
        let _serialized = self.persist_lock.lock().await;
        let snapshot = {
            let tasks = self.tasks.read().unwrap_or_else(PoisonError::into_inner);
            let mut list = tasks.values().cloned().collect::<Vec<_>>();
            list.sort_by(|a, b| a.created_at.cmp(&b.created_at));
            TaskSnapshot::new(list, Utc::now())
        };
        if let Err(err) = self.store.snapshot(&snapshot).await {
            tracing::warn!(?err, "task snapshot failed");
        }
    }
}
