use serde::{Deserialize, Serialize};

/// Default smoothing factor for all rolling statistics.
pub const DEFAULT_ALPHA: f64 = 0.1;

/// Exponential moving average over a stream of samples.
///
/// The first sample seeds the value directly; every later sample is blended
/// with weight `alpha`. Both latency and success-rate tracking share this type
/// so the smoothing constant stays consistent.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RollingStat {
    value: Option<f64>,
    alpha: f64,
}

impl RollingStat {
    pub fn new(alpha: f64) -> Self {
        Self { value: None, alpha }
    }

    /// Fold one sample into the average.
    pub fn update(&mut self, sample: f64) {
        self.value = Some(match self.value {
            None => sample,
            Some(current) => current + self.alpha * (sample - current),
        });
    }

    /// Current smoothed value, or `None` before the first sample.
    pub fn value(&self) -> Option<f64> {
        self.value
    }
}

impl Default for RollingStat {
    fn default() -> Self {
        Self::new(DEFAULT_ALPHA)
    }
}

/// Rolling performance counters kept per worker handle.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct WorkerStats {
    pub avg_latency_ms: RollingStat,
    pub success_rate: RollingStat,
    pub total_dispatches: u64,
    pub failures: u64,
}

impl WorkerStats {
    /// Record a successful dispatch with its observed latency.
    pub fn record_success(&mut self, latency_ms: u64) {
        self.total_dispatches += 1;
        self.avg_latency_ms.update(latency_ms as f64);
        self.success_rate.update(1.0);
    }

    /// Record a failed dispatch.
    pub fn record_failure(&mut self) {
        self.total_dispatches += 1;
        self.failures += 1;
        self.success_rate.update(0.0);
    }
}
