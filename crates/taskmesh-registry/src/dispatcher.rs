use crate::registry::WorkerRegistry;
use async_trait::async_trait;
use chrono::Utc;
use serde_json::Value;
use std::sync::Arc;
use std::time::{Duration, Instant};
use taskmesh_core::{MeshError, MeshResult, TaskExecutionRecord};
use tracing::{info, warn};

/// Seam between the workflow executor and the network.
///
/// The production implementation is [`TaskDispatcher`]; tests substitute a
/// mock to count calls and script outcomes.
#[async_trait]
pub trait Dispatch: Send + Sync {
    /// Send one task to an active worker for `capability`.
    ///
    /// Fails with `Unavailable` before any network call when no active worker
    /// exists. Timeouts, transport errors, and non-2xx worker responses are
    /// normalized into a failed [`TaskExecutionRecord`], not an error: retry
    /// and failover policy belongs to the caller, not this layer.
    async fn dispatch(
        &self,
        capability: &str,
        payload: Value,
        timeout: Duration,
    ) -> MeshResult<TaskExecutionRecord>;
}

/// HTTP dispatcher: `POST {endpoint}/execute` with a hard per-call timeout.
pub struct TaskDispatcher {
    registry: Arc<WorkerRegistry>,
    client: reqwest::Client,
}

impl TaskDispatcher {
    pub fn new(registry: Arc<WorkerRegistry>) -> Self {
        Self {
            registry,
            client: reqwest::Client::new(),
        }
    }
}

#[async_trait]
impl Dispatch for TaskDispatcher {
    async fn dispatch(
        &self,
        capability: &str,
        payload: Value,
        timeout: Duration,
    ) -> MeshResult<TaskExecutionRecord> {
        let handle = match self.registry.active_for(capability).await {
            Some(h) => h,
            None => {
                if self.registry.knows_capability(capability).await {
                    return Err(MeshError::Unavailable(format!(
                        "no active worker for capability '{capability}'"
                    )));
                }
                return Err(MeshError::NotFound(format!("capability '{capability}'")));
            }
        };

        let url = format!("{}/execute", handle.endpoint.trim_end_matches('/'));
        let started_at = Utc::now();
        let start = Instant::now();

        let response = self
            .client
            .post(&url)
            .timeout(timeout)
            .json(&payload)
            .send()
            .await;

        let duration_ms = start.elapsed().as_millis() as u64;

        match response {
            Ok(resp) if resp.status().is_success() => {
                let body: Value = resp.json().await.unwrap_or(Value::Null);
                self.registry.record_success(handle.id, duration_ms).await;
                info!(
                    capability,
                    worker_id = %handle.id,
                    duration_ms,
                    "Dispatch succeeded"
                );
                Ok(TaskExecutionRecord::success(
                    capability,
                    started_at,
                    duration_ms,
                    Some(body),
                ))
            }
            Ok(resp) => {
                // Any non-2xx is a uniform dispatch failure regardless of the
                // worker's internal cause.
                let status = resp.status();
                self.registry.record_failure(handle.id).await;
                warn!(
                    capability,
                    worker_id = %handle.id,
                    status = %status,
                    "Dispatch rejected by worker"
                );
                Ok(TaskExecutionRecord::failure(
                    capability,
                    started_at,
                    duration_ms,
                    format!("worker returned {status}"),
                ))
            }
            Err(e) => {
                self.registry.record_failure(handle.id).await;
                let reason = if e.is_timeout() {
                    format!("dispatch timed out after {}ms", timeout.as_millis())
                } else {
                    format!("transport error: {e}")
                };
                warn!(capability, worker_id = %handle.id, error = %reason, "Dispatch failed");
                Ok(TaskExecutionRecord::failure(
                    capability, started_at, duration_ms, reason,
                ))
            }
        }
    }
}
