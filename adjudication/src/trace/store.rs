//! Trace stores — keyed, append-only persistence for run records.
//!
//! The store is an explicit dependency injected into the orchestrator,
//! never a module-level singleton, so tests substitute the in-memory
//! implementation. Concurrent writers racing on the same fingerprint
//! are allowed; last-writer-wins is safe because every written record
//! is self-consistent.

use std::collections::HashMap;
use std::io::Write;
use std::path::{Path, PathBuf};

use async_trait::async_trait;
use thiserror::Error;
use tokio::sync::{Mutex, RwLock};
use tracing::debug;

use super::{Fingerprint, StoredRun};

/// Error from a trace store operation.
#[derive(Debug, Error)]
pub enum TraceStoreError {
    #[error("trace store io error: {0}")]
    Io(#[from] std::io::Error),
    #[error("trace record serialization failed: {0}")]
    Serialize(#[from] serde_json::Error),
}

/// Append-only keyed storage for run records.
#[async_trait]
pub trait TraceStore: Send + Sync {
    /// Look up a prior run by input fingerprint.
    async fn get(&self, fingerprint: &Fingerprint) -> Result<Option<StoredRun>, TraceStoreError>;

    /// Record a completed run, keyed by its input fingerprint.
    async fn put(&self, run: StoredRun) -> Result<(), TraceStoreError>;

    /// Most recent records, newest first (audit listings).
    async fn recent(&self, limit: usize) -> Result<Vec<StoredRun>, TraceStoreError>;
}

/// In-memory store for tests and ephemeral runs.
#[derive(Debug, Default)]
pub struct MemoryTraceStore {
    runs: RwLock<HashMap<String, StoredRun>>,
    order: RwLock<Vec<String>>,
}

impl MemoryTraceStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl TraceStore for MemoryTraceStore {
    async fn get(&self, fingerprint: &Fingerprint) -> Result<Option<StoredRun>, TraceStoreError> {
        Ok(self.runs.read().await.get(fingerprint.as_str()).cloned())
    }

    async fn put(&self, run: StoredRun) -> Result<(), TraceStoreError> {
        let key = run.trace.input_hash.to_string();
        let mut runs = self.runs.write().await;
        // Rewrites keep their slot in the order list so `recent`
        // yields each fingerprint once.
        if runs.insert(key.clone(), run).is_none() {
            self.order.write().await.push(key);
        }
        Ok(())
    }

    async fn recent(&self, limit: usize) -> Result<Vec<StoredRun>, TraceStoreError> {
        let runs = self.runs.read().await;
        let order = self.order.read().await;
        Ok(order
            .iter()
            .rev()
            .take(limit)
            .filter_map(|k| runs.get(k).cloned())
            .collect())
    }
}

/// Durable store: one JSON record per line, append-only.
///
/// The full file is read once at open to build the fingerprint index;
/// afterwards every `put` appends a line and updates the index under a
/// single lock. A fingerprint written twice keeps its latest record.
pub struct JsonlTraceStore {
    path: PathBuf,
    inner: Mutex<HashMap<String, StoredRun>>,
}

impl JsonlTraceStore {
    /// Open (or create) the store at `path`.
    pub fn open(path: &Path) -> Result<Self, TraceStoreError> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }

        let mut index = HashMap::new();
        if path.exists() {
            let content = std::fs::read_to_string(path)?;
            for line in content.lines().filter(|l| !l.trim().is_empty()) {
                let run: StoredRun = serde_json::from_str(line)?;
                index.insert(run.trace.input_hash.to_string(), run);
            }
        }
        debug!(path = %path.display(), records = index.len(), "trace store opened");

        Ok(Self {
            path: path.to_path_buf(),
            inner: Mutex::new(index),
        })
    }
}

#[async_trait]
impl TraceStore for JsonlTraceStore {
    async fn get(&self, fingerprint: &Fingerprint) -> Result<Option<StoredRun>, TraceStoreError> {
        Ok(self.inner.lock().await.get(fingerprint.as_str()).cloned())
    }

    async fn put(&self, run: StoredRun) -> Result<(), TraceStoreError> {
        let mut index = self.inner.lock().await;
        let line = serde_json::to_string(&run)?;
        let mut file = std::fs::OpenOptions::new()
            .create(true)
            .append(true)
            .open(&self.path)?;
        writeln!(file, "{line}")?;
        index.insert(run.trace.input_hash.to_string(), run);
        Ok(())
    }

    async fn recent(&self, limit: usize) -> Result<Vec<StoredRun>, TraceStoreError> {
        let index = self.inner.lock().await;
        let mut runs: Vec<StoredRun> = index.values().cloned().collect();
        runs.sort_by(|a, b| b.trace.timestamp.cmp(&a.trace.timestamp));
        runs.truncate(limit);
        Ok(runs)
    }
}
