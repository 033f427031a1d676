use std::path::{Path, PathBuf};

use anyhow::Context as _;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tokio::fs;

use crate::app::model::Task;

pub const SNAPSHOT_VERSION: u32 = 1;

/// Persisted form of the whole task table.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct TaskSnapshot {
    pub version: u32,
    pub saved_at: DateTime<Utc>,
    pub tasks: Vec<Task>,
}

impl TaskSnapshot {
    pub fn new(tasks: Vec<Task>, saved_at: DateTime<Utc>) -> Self {
        Self {
            version: SNAPSHOT_VERSION,
            saved_at,
            tasks,
        }
    }
}

#[async_trait]
pub trait TaskStore: Send + Sync {
    async fn snapshot(&self, snapshot: &TaskSnapshot) -> anyhow::Result<()>;

    /// `Ok(None)` when nothing has been persisted yet.
    async fn load(&self) -> anyhow::Result<Option<TaskSnapshot>>;
}

#[derive(Debug, Clone)]
pub struct LocalFsTaskStore {
    base_dir: PathBuf,
}

impl LocalFsTaskStore {
    pub fn new(base_dir: impl Into<PathBuf>) -> Self {
        Self {
            base_dir: base_dir.into(),
        }
    }

    pub fn snapshot_path(&self) -> PathBuf {
        self.base_dir.join("tasks.json")
    }
}

#[async_trait]
impl TaskStore for LocalFsTaskStore {
    async fn snapshot(&self, snapshot: &TaskSnapshot) -> anyhow::Result<()> {
        write_json_atomic(&self.snapshot_path(), snapshot)
            .await
            .context("write tasks.json")
    }

    async fn load(&self) -> anyhow::Result<Option<TaskSnapshot>> {
        let path = self.snapshot_path();
        let Some(raw) = read_json::<serde_json::Value>(&path)
            .await
            .with_context(|| format!("read: {}", path.display()))?
        else {
            return Ok(None);
        };

        let version = raw.get("version").and_then(|v| v.as_u64());
        if version != Some(u64::from(SNAPSHOT_VERSION)) {
            anyhow::bail!(
                "unsupported task snapshot version {version:?} in {} (expected {SNAPSHOT_VERSION})",
                path.display()
            );
        }
        let snapshot = serde_json::from_value(raw)
            .with_context(|| format!("parse task snapshot: {}", path.display()))?;
        Ok(Some(snapshot))
    }
}

/// Keeps nothing; used by one-shot CLI runs without a data dir.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoopTaskStore;

#[async_trait]
impl TaskStore for NoopTaskStore {
    async fn snapshot(&self, _snapshot: &TaskSnapshot) -> anyhow::Result<()> {
        Ok(())
    }

    async fn load(&self) -> anyhow::Result<Option<TaskSnapshot>> {
        Ok(None)
    }
}

async fn read_json<T: serde::de::DeserializeOwned>(path: &Path) -> anyhow::Result<Option<T>> {
    let bytes = match fs::read(path).await {
        Ok(bytes) => bytes,
        Err(err) if err.kind() == std::io::ErrorKind::NotFound => return Ok(None),
        Err(err) => return Err(err.into()),
    };
    let value = serde_json::from_slice(&bytes).context("parse json")?;
    Ok(Some(value))
}

async fn write_json_atomic<T: serde::Serialize>(path: &Path, value: &T) -> anyhow::Result<()> {
    let parent = path
        .parent()
        .ok_or_else(|| anyhow::anyhow!("path has no parent: {}", path.display()))?;
    fs::create_dir_all(parent)
        .await
        .with_context(|| format!("create parent dir: {}", parent.display()))?;

    let tmp_path = path.with_extension(format!("tmp.{}", uuid::Uuid::new_v4().simple()));
    let data = serde_json::to_vec_pretty(value).context("serialize json")?;
    fs::write(&tmp_path, &data)
        .await
        .with_context(|| format!("write tmp: {}", tmp_path.display()))?;
    fs::rename(&tmp_path, path)
        .await
        .with_context(|| format!("rename tmp to final: {}", path.display()))?;
    Ok(())
}
