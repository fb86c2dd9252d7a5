use chrono::Utc;
use serde::Serialize;
use std::collections::HashMap;
use std::sync::Arc;
use taskmesh_core::{WorkerHandle, WorkerStats, WorkerStatus};
use tokio::sync::RwLock;
use uuid::Uuid;

/// Snapshot row returned by [`WorkerRegistry::snapshot`].
#[derive(Debug, Clone, Serialize)]
pub struct WorkerSnapshot {
    #[serde(flatten)]
    pub handle: WorkerHandle,
    pub stats: WorkerStats,
}

/// Directory of registered workers, keyed by handle id.
///
/// An injected, owned state object; tests construct isolated instances.
/// Handles are mutated only by the health loop and by dispatch outcomes, so
/// the lock is held briefly and never across network calls.
pub struct WorkerRegistry {
    workers: Arc<RwLock<HashMap<Uuid, (WorkerHandle, WorkerStats)>>>,
}

impl WorkerRegistry {
    pub fn new() -> Self {
        Self {
            workers: Arc::new(RwLock::new(HashMap::new())),
        }
    }

    /// Register a worker endpoint under a logical capability.
    pub async fn register(&self, capability: &str, endpoint: &str) -> Uuid {
        let handle = WorkerHandle::new(capability, endpoint);
        let id = handle.id;
        self.workers
            .write()
            .await
            .insert(id, (handle, WorkerStats::default()));
        id
    }

    /// First `active` handle for a capability, if any.
    ///
    /// Degraded and unreachable workers are excluded from routing until a
    /// health probe or successful dispatch restores them.
    pub async fn active_for(&self, capability: &str) -> Option<WorkerHandle> {
        let workers = self.workers.read().await;
        let mut candidates: Vec<&(WorkerHandle, WorkerStats)> = workers
            .values()
            .filter(|(h, _)| h.capability == capability && h.status == WorkerStatus::Active)
            .collect();
        candidates.sort_by(|a, b| a.0.id.cmp(&b.0.id));
        candidates.first().map(|(h, _)| h.clone())
    }

    /// Whether any handle (in any state) exists for a capability.
    pub async fn knows_capability(&self, capability: &str) -> bool {
        self.workers
            .read()
            .await
            .values()
            .any(|(h, _)| h.capability == capability)
    }

    /// Overwrite a handle's status, stamping the probe time.
    pub async fn set_status(&self, id: Uuid, status: WorkerStatus) {
        let mut workers = self.workers.write().await;
        if let Some((handle, _)) = workers.get_mut(&id) {
            handle.status = status;
            handle.last_probe_at = Some(Utc::now());
        }
    }

    /// Record a successful dispatch: handle back to `active`, EMAs updated.
    pub async fn record_success(&self, id: Uuid, latency_ms: u64) {
        let mut workers = self.workers.write().await;
        if let Some((handle, stats)) = workers.get_mut(&id) {
            handle.status = WorkerStatus::Active;
            stats.record_success(latency_ms);
        }
    }

    /// Record a failed dispatch: handle demoted to `degraded`.
    pub async fn record_failure(&self, id: Uuid) {
        let mut workers = self.workers.write().await;
        if let Some((handle, stats)) = workers.get_mut(&id) {
            handle.status = WorkerStatus::Degraded;
            stats.record_failure();
        }
    }

    /// All handles with their rolling stats, sorted by capability then id.
    pub async fn snapshot(&self) -> Vec<WorkerSnapshot> {
        let workers = self.workers.read().await;
        let mut all: Vec<WorkerSnapshot> = workers
            .values()
            .map(|(handle, stats)| WorkerSnapshot {
                handle: handle.clone(),
                stats: stats.clone(),
            })
            .collect();
        all.sort_by(|a, b| {
            a.handle
                .capability
                .cmp(&b.handle.capability)
                .then_with(|| a.handle.id.cmp(&b.handle.id))
        });
        all
    }

    /// `(active, total)` worker counts.
    pub async fn counts(&self) -> (usize, usize) {
        let workers = self.workers.read().await;
        let total = workers.len();
        let active = workers
            .values()
            .filter(|(h, _)| h.status == WorkerStatus::Active)
            .count();
        (active, total)
    }
}

impl Default for WorkerRegistry {
    fn default() -> Self {
        Self::new()
    }
}
