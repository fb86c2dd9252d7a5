use crate::registry::WorkerRegistry;
use async_trait::async_trait;
use serde::Serialize;
use std::sync::Arc;
use std::time::Duration;
use taskmesh_core::WorkerStatus;
use tokio::sync::RwLock;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

/// Hook run on the slow optimization tick. Hooks observe and recommend; they
/// never mutate running plans or in-flight executions.
#[async_trait]
pub trait OptimizationHook: Send + Sync {
    /// Short name used in logs.
    fn name(&self) -> &str;
    async fn run(&self);
}

/// Aggregate health published by the probe cycle.
#[derive(Debug, Clone, Serialize)]
pub struct HealthSnapshot {
    pub healthy: bool,
    pub active_workers: usize,
    pub total_workers: usize,
    pub active_fraction: f64,
}

impl Default for HealthSnapshot {
    fn default() -> Self {
        Self {
            healthy: true,
            active_workers: 0,
            total_workers: 0,
            active_fraction: 1.0,
        }
    }
}

/// Configuration for the health and optimization loop.
#[derive(Debug, Clone)]
pub struct HealthConfig {
    /// Fast cycle: re-probe every registered worker.
    pub probe_interval: Duration,
    /// Per-probe timeout; probes are cheap and should fail fast.
    pub probe_timeout: Duration,
    /// Slow cycle: run optimization hooks (cache sweep, stat snapshots).
    pub optimization_interval: Duration,
}

impl Default for HealthConfig {
    fn default() -> Self {
        Self {
            probe_interval: Duration::from_secs(30),
            probe_timeout: Duration::from_secs(2),
            optimization_interval: Duration::from_secs(120),
        }
    }
}

/// Background loop that keeps worker statuses current and periodically runs
/// optimization hooks.
pub struct HealthMonitor {
    registry: Arc<WorkerRegistry>,
    client: reqwest::Client,
    config: HealthConfig,
    snapshot: RwLock<HealthSnapshot>,
    hooks: Vec<Arc<dyn OptimizationHook>>,
}

impl HealthMonitor {
    pub fn new(registry: Arc<WorkerRegistry>, config: HealthConfig) -> Self {
        Self {
            registry,
            client: reqwest::Client::new(),
            config,
            snapshot: RwLock::new(HealthSnapshot::default()),
            hooks: Vec::new(),
        }
    }

    /// Attach an optimization hook. Builder-style, called before [`Self::start`].
    pub fn with_hook(mut self, hook: Arc<dyn OptimizationHook>) -> Self {
        self.hooks.push(hook);
        self
    }

    /// Current aggregate health. Never fails; reflects the last probe cycle.
    pub async fn snapshot(&self) -> HealthSnapshot {
        self.snapshot.read().await.clone()
    }

    /// Probe every registered worker once and refresh the aggregate.
    ///
    /// A worker answering 2xx on `GET {endpoint}/health` within the probe
    /// timeout is `active`; anything else is `unreachable`. The process is
    /// considered healthy while at least half of the registered workers are
    /// active (an empty registry counts as healthy — nothing to serve yet).
    pub async fn run_probe_cycle(&self) {
        let workers = self.registry.snapshot().await;
        for worker in &workers {
            let url = format!("{}/health", worker.handle.endpoint.trim_end_matches('/'));
            let result = self
                .client
                .get(&url)
                .timeout(self.config.probe_timeout)
                .send()
                .await;

            let status = match result {
                Ok(resp) if resp.status().is_success() => WorkerStatus::Active,
                Ok(resp) => {
                    debug!(
                        worker_id = %worker.handle.id,
                        status = %resp.status(),
                        "Health probe rejected"
                    );
                    WorkerStatus::Unreachable
                }
                Err(e) => {
                    debug!(worker_id = %worker.handle.id, error = %e, "Health probe failed");
                    WorkerStatus::Unreachable
                }
            };
            if status != worker.handle.status {
                info!(
                    worker_id = %worker.handle.id,
                    capability = %worker.handle.capability,
                    from = %worker.handle.status,
                    to = %status,
                    "Worker status changed"
                );
            }
            self.registry.set_status(worker.handle.id, status).await;
        }

        let (active, total) = self.registry.counts().await;
        let fraction = if total == 0 {
            1.0
        } else {
            active as f64 / total as f64
        };
        let healthy = total == 0 || fraction >= 0.5;
        if !healthy {
            warn!(active, total, "Less than half of registered workers are active");
        }
        *self.snapshot.write().await = HealthSnapshot {
            healthy,
            active_workers: active,
            total_workers: total,
            active_fraction: fraction,
        };
    }

    /// Run every attached optimization hook once.
    pub async fn run_optimization_cycle(&self) {
        for hook in &self.hooks {
            debug!(hook = hook.name(), "Running optimization hook");
            hook.run().await;
        }
    }

    /// Spawn the combined loop: probes on the fast interval, optimization
    /// hooks on the slow one. Returns the handle so the caller can abort it.
    pub fn start(self: Arc<Self>) -> JoinHandle<()> {
        tokio::spawn(async move {
            let mut probe = tokio::time::interval(self.config.probe_interval);
            let mut optimize = tokio::time::interval(self.config.optimization_interval);
            // The first tick of an interval fires immediately; consume the
            // optimization one so hooks only run after a full period.
            optimize.tick().await;
            loop {
                tokio::select! {
                    _ = probe.tick() => self.run_probe_cycle().await,
                    _ = optimize.tick() => self.run_optimization_cycle().await,
                }
            }
        })
    }
}
