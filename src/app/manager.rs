use std::collections::HashMap;
use std::sync::{Arc, Mutex, PoisonError, Weak};
use std::time::Duration;

use chrono::{DateTime, Utc};
use tokio::task::JoinHandle;

use crate::app::model::{AnalysisRequest, Task, TaskStatus, ValidationError};
use crate::app::queue::InProcessQueue;
use crate::app::runner::PipelineRunner;
use crate::app::task_store::TaskStore;
use crate::app::task_table::TaskTable;
use crate::config::{EnhanceConfig, Settings};
use crate::crawl::CrawlCoordinator;
use crate::enhance::EnhancementCoordinator;
use crate::fetch::PageFetcher;
use crate::formats::AnalysisResult;
use crate::llm::LlmClient;

#[derive(Debug, Clone)]
pub struct ManagerOptions {
    pub max_concurrent_tasks: usize,
    /// Terminal tasks older than this are dropped by `sweep`.
    pub retention: Duration,
    pub cache_capacity: usize,
    pub enhance_config: Option<EnhanceConfig>,
}

impl Default for ManagerOptions {
    fn default() -> Self {
        Self::from(&Settings::default())
    }
}

impl From<&Settings> for ManagerOptions {
    fn from(settings: &Settings) -> Self {
        Self {
            max_concurrent_tasks: settings.max_concurrent_tasks,
            retention: settings.retention,
            cache_capacity: settings.cache_capacity,
            enhance_config: None,
        }
    }
}

/// Owns the task table and every pipeline spawned for it.
pub struct TaskManager {
    table: Arc<TaskTable>,
    runner: Arc<PipelineRunner>,
    queue: InProcessQueue,
    retention: chrono::Duration,
    handles: Mutex<HashMap<String, JoinHandle<()>>>,
    sweeper: Mutex<Option<JoinHandle<()>>>,
}

impl TaskManager {
    /// Builds the manager and restores the persisted table. An unreadable
    /// snapshot is logged and the manager starts empty.
    pub async fn start(
        options: ManagerOptions,
        store: Arc<dyn TaskStore>,
        fetcher: Arc<dyn PageFetcher>,
        llm: Arc<dyn LlmClient>,
    ) -> Arc<Self> {
        let table = Arc::new(TaskTable::new(store));
        match table.restore(Utc::now()).await {
            Ok(0) => {}
            Ok(interrupted) => {
                tracing::warn!(interrupted, "tasks interrupted by restart marked failed");
            }
            Err(err) => {
                tracing::error!(?err, "failed to restore task snapshot; starting empty");
            }
        }

        let mut enhancer = EnhancementCoordinator::new(llm, options.cache_capacity);
        if let Some(config) = options.enhance_config {
            enhancer = enhancer.with_config(config);
        }
        let runner = PipelineRunner::new(
            Arc::clone(&table),
            CrawlCoordinator::new(fetcher),
            Arc::new(enhancer),
        );

        Arc::new(Self {
            table,
            runner: Arc::new(runner),
            queue: InProcessQueue::new(options.max_concurrent_tasks),
            retention: chrono::Duration::from_std(options.retention)
                .unwrap_or(chrono::Duration::MAX),
            handles: Mutex::new(HashMap::new()),
            sweeper: Mutex::new(None),
        })
    }

    /// Validates, records the task as pending and queues its pipeline.
    /// Returns without waiting for any pipeline progress.
    pub async fn create(&self, request: AnalysisRequest) -> Result<String, ValidationError> {
        request.validate()?;

        let task = Task::new(request, Utc::now());
        let task_id = task.task_id.clone();
        tracing::info!(task_id = %task_id, url = %task.request.url, "task created");
        self.table.insert(task).await;

        let runner = Arc::clone(&self.runner);
        let id = task_id.clone();
        let handle = self.queue.spawn(async move {
            runner.run_task(&id).await;
        });
        self.handles_mut().insert(task_id.clone(), handle);

        Ok(task_id)
    }

    pub fn get_status(&self, task_id: &str) -> Option<Task> {
        self.table.get(task_id)
    }

    /// Only completed tasks have a result.
    pub fn get_result(&self, task_id: &str) -> Option<AnalysisResult> {
        self.table
            .get(task_id)
            .filter(|task| task.status == TaskStatus::Completed)
            .and_then(|task| task.result)
    }

    pub fn task_count(&self) -> usize {
        self.table.len()
    }

    /// Waits for the task's pipeline to finish. Returns false when no
    /// pipeline handle is held for it.
    pub async fn join(&self, task_id: &str) -> bool {
        let Some(handle) = self.handles_mut().remove(task_id) else {
            return false;
        };
        if let Err(err) = handle.await {
            tracing::warn!(task_id, ?err, "pipeline task ended abnormally");
        }
        true
    }

    pub async fn sweep(&self) -> usize {
        self.sweep_at(Utc::now()).await
    }

    pub async fn sweep_at(&self, now: DateTime<Utc>) -> usize {
        let cutoff = now
            .checked_sub_signed(self.retention)
            .unwrap_or(DateTime::<Utc>::MIN_UTC);
        let removed = self.table.remove_expired(cutoff).await;
        {
            let mut handles = self.handles_mut();
            for task_id in &removed {
                handles.remove(task_id);
            }
            handles.retain(|_, handle| !handle.is_finished());
        }
        if !removed.is_empty() {
            tracing::info!(removed = removed.len(), "expired tasks swept");
        }
        removed.len()
    }

    /// Sweeps every `interval` until the manager is dropped or shut down.
    pub fn spawn_sweeper(self: &Arc<Self>, interval: Duration) {
        let manager: Weak<Self> = Arc::downgrade(self);
        let handle = tokio::spawn(async move {
            let mut ticker = tokio::time::interval(interval);
            ticker.tick().await;
            loop {
                ticker.tick().await;
                let Some(manager) = manager.upgrade() else {
                    break;
                };
                manager.sweep().await;
            }
        });

        let previous = self
            .sweeper
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .replace(handle);
        if let Some(previous) = previous {
            previous.abort();
        }
    }

    /// Stops the sweeper, aborts in-flight pipelines and writes a final
    /// snapshot.
    pub async fn shutdown(&self) {
        let sweeper = self
            .sweeper
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take();
        if let Some(sweeper) = sweeper {
            sweeper.abort();
        }

        let handles = std::mem::take(&mut *self.handles_mut());
        let aborted = handles.values().filter(|h| !h.is_finished()).count();
        for handle in handles.into_values() {
            handle.abort();
        }
        tracing::info!(aborted, "task manager shut down");
        self.table.persist().await;
    }

    fn handles_mut(&self) -> std::sync::MutexGuard<'_, HashMap<String, JoinHandle<()>>> {
        self.handles.lock().unwrap_or_else(PoisonError::into_inner)
    }
}
