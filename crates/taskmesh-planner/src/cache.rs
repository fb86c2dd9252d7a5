use crate::planner::ExecutionPlan;
use chrono::Utc;
use serde_json::Value;
use sha2::{Digest, Sha256};
use std::collections::HashMap;
use std::time::Duration;

/// Default plan time-to-live: five minutes.
pub const DEFAULT_PLAN_TTL: Duration = Duration::from_secs(300);

/// Derive the cache key for a planning request.
///
/// Hashes the workflow id together with the canonical JSON of the parameters
/// and constraints, so any change to either produces a distinct key.
/// `serde_json` maps serialize with sorted keys, which makes the encoding
/// canonical.
pub fn cache_key(workflow_id: &str, parameters: &Value, constraints: &Value) -> String {
    let mut hasher = Sha256::new();
    hasher.update(workflow_id.as_bytes());
    hasher.update(b"\x1f");
    hasher.update(parameters.to_string().as_bytes());
    hasher.update(b"\x1f");
    hasher.update(constraints.to_string().as_bytes());
    hex::encode(hasher.finalize())
}

struct CacheEntry {
    plan: ExecutionPlan,
    inserted_at: chrono::DateTime<Utc>,
    access_count: u64,
}

/// TTL cache of computed execution plans, keyed by [`cache_key`].
///
/// Plans are treated as immutable values once published; a hit returns a clone
/// tagged `cached = true` with its age filled in. An injected, owned value —
/// never a process-wide singleton.
pub struct PlanCache {
    entries: HashMap<String, CacheEntry>,
    ttl: Duration,
}

impl PlanCache {
    pub fn new(ttl: Duration) -> Self {
        Self {
            entries: HashMap::new(),
            ttl,
        }
    }

    /// Fetch a live plan, bumping its access counter.
    pub fn get(&mut self, key: &str) -> Option<ExecutionPlan> {
        let ttl_ms = self.ttl.as_millis() as i64;
        let age_ms = (Utc::now() - self.entries.get(key)?.inserted_at).num_milliseconds();
        if age_ms >= ttl_ms {
            self.entries.remove(key);
            return None;
        }
        let entry = self.entries.get_mut(key)?;
        entry.access_count += 1;
        let mut plan = entry.plan.clone();
        plan.cached = true;
        plan.cache_age_ms = age_ms.max(0) as u64;
        Some(plan)
    }

    /// Publish a freshly computed plan.
    pub fn insert(&mut self, key: String, plan: ExecutionPlan) {
        self.entries.insert(
            key,
            CacheEntry {
                plan,
                inserted_at: Utc::now(),
                access_count: 0,
            },
        );
    }

    /// Evict every entry older than the TTL. Returns the eviction count.
    pub fn sweep(&mut self) -> usize {
        let ttl_ms = self.ttl.as_millis() as i64;
        let before = self.entries.len();
        let now = Utc::now();
        self.entries
            .retain(|_, e| (now - e.inserted_at).num_milliseconds() < ttl_ms);
        before - self.entries.len()
    }

    /// Access count for a key, if present.
    pub fn access_count(&self, key: &str) -> Option<u64> {
        self.entries.get(key).map(|e| e.access_count)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

impl Default for PlanCache {
    fn default() -> Self {
        Self::new(DEFAULT_PLAN_TTL)
    }
}
