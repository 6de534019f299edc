//! Persistence collaborator
//!
//! The store persists whole snapshots through the [`Repository`] trait:
//! - `MemoryRepository`: in-process, for tests and ephemeral runs
//! - `JsonFileRepository`: one JSON document on disk, replaced atomically
//! - `FallbackRepository`: try a primary backend, fall back to a local one

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use tokio::sync::Mutex;

use super::error::{RepositoryError, RepositoryResult};
use crate::schedule::{Alert, Appointment, DepartmentCapacity};

/// Everything the store persists
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Snapshot {
    #[serde(default)]
    pub appointments: Vec<Appointment>,
    /// Absent when the operator never changed capacities at runtime
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub capacities: Option<DepartmentCapacity>,
    #[serde(default)]
    pub alerts: Vec<Alert>,
}

/// Load/save seam for appointment snapshots
#[async_trait]
pub trait Repository: Send + Sync {
    /// Short backend name for logs
    fn name(&self) -> &str;

    /// Load the latest snapshot. A backend with nothing stored yields an empty one.
    async fn load(&self) -> RepositoryResult<Snapshot>;

    /// Replace the stored snapshot
    async fn save(&self, snapshot: &Snapshot) -> RepositoryResult<()>;
}

#[derive(Debug, Default)]
pub struct MemoryRepository {
    snapshot: Mutex<Snapshot>,
}

impl MemoryRepository {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_snapshot(snapshot: Snapshot) -> Self {
        Self {
            snapshot: Mutex::new(snapshot),
        }
    }
}

#[async_trait]
impl Repository for MemoryRepository {
    fn name(&self) -> &str {
        "memory"
    }

    async fn load(&self) -> RepositoryResult<Snapshot> {
        Ok(self.snapshot.lock().await.clone())
    }

    async fn save(&self, snapshot: &Snapshot) -> RepositoryResult<()> {
        *self.snapshot.lock().await = snapshot.clone();
        Ok(())
    }
}

/// Snapshot stored as a pretty-printed JSON file
#[derive(Debug, Clone)]
pub struct JsonFileRepository {
    path: PathBuf,
}

impl JsonFileRepository {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn temp_path(&self) -> PathBuf {
        let mut name = self
            .path
            .file_name()
            .map(|n| n.to_os_string())
            .unwrap_or_default();
        name.push(".tmp");
        self.path.with_file_name(name)
    }
}

#[async_trait]
impl Repository for JsonFileRepository {
    fn name(&self) -> &str {
        "json-file"
    }

    async fn load(&self) -> RepositoryResult<Snapshot> {
        let content = match tokio::fs::read_to_string(&self.path).await {
            Ok(content) => content,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                tracing::debug!("No snapshot at {:?}, starting empty", self.path);
                return Ok(Snapshot::default());
            }
            Err(e) => return Err(e.into()),
        };
        Ok(serde_json::from_str(&content)?)
    }

    async fn save(&self, snapshot: &Snapshot) -> RepositoryResult<()> {
        if let Some(parent) = self.path.parent() {
            if !parent.as_os_str().is_empty() {
                tokio::fs::create_dir_all(parent).await?;
            }
        }

        let content = serde_json::to_string_pretty(snapshot)?;
        let temp = self.temp_path();
        tokio::fs::write(&temp, content).await?;
        tokio::fs::rename(&temp, &self.path).await?;
        Ok(())
    }
}

/// Try `primary`; on failure log and use `fallback`.
///
/// When both backends fail the result is [`RepositoryError::Unavailable`]
/// naming both causes.
pub struct FallbackRepository {
    primary: Box<dyn Repository>,
    fallback: Box<dyn Repository>,
}

impl FallbackRepository {
    pub fn new(primary: Box<dyn Repository>, fallback: Box<dyn Repository>) -> Self {
        Self { primary, fallback }
    }

    fn both_failed(&self, primary: RepositoryError, fallback: RepositoryError) -> RepositoryError {
        RepositoryError::Unavailable(format!(
            "{}: {}; {}: {}",
            self.primary.name(),
            primary,
            self.fallback.name(),
            fallback
        ))
    }
}

#[async_trait]
impl Repository for FallbackRepository {
    fn name(&self) -> &str {
        "fallback"
    }

    async fn load(&self) -> RepositoryResult<Snapshot> {
        match self.primary.load().await {
            Ok(snapshot) => Ok(snapshot),
            Err(e) => {
                tracing::warn!(
                    "Load from {} failed ({}), using {}",
                    self.primary.name(),
                    e,
                    self.fallback.name()
                );
                self.fallback
                    .load()
                    .await
                    .map_err(|fallback| self.both_failed(e, fallback))
            }
        }
    }

    async fn save(&self, snapshot: &Snapshot) -> RepositoryResult<()> {
        match self.primary.save(snapshot).await {
            Ok(()) => Ok(()),
            Err(e) => {
                tracing::warn!(
                    "Save to {} failed ({}), using {}",
                    self.primary.name(),
                    e,
                    self.fallback.name()
                );
                self.fallback
                    .save(snapshot)
                    .await
                    .map_err(|fallback| self.both_failed(e, fallback))
            }
        }
    }
}
