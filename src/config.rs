//! Environment-driven service configuration and the shared clock helpers.

use serde::Serialize;
use sha2::{Digest, Sha256};

use crate::store::DEFAULT_INSERT_BATCH;

#[derive(Debug, Clone, Serialize)]
pub struct Config {
    pub sqlite_path: String,
    pub tick_secs: u64,
    /// Optional JSON catalog; builtin instrument table when unset.
    pub catalog_path: Option<String>,
    /// Seed for the normal source; OS entropy when unset.
    pub rng_seed: Option<u64>,
    pub insert_batch: usize,
    /// Days of synthetic history to generate at startup; 0 disables.
    pub bootstrap_days: u32,
    pub bootstrap_step_minutes: u32,
}

impl Config {
    pub fn from_env() -> Self {
        Self {
            sqlite_path: std::env::var("SQLITE_PATH").unwrap_or_else(|_| "./market.sqlite".to_string()),
            tick_secs: std::env::var("TICK_SECS").ok().and_then(|v| v.parse().ok()).unwrap_or(60).max(1),
            catalog_path: std::env::var("CATALOG_PATH").ok(),
            rng_seed: std::env::var("RNG_SEED").ok().and_then(|v| v.parse().ok()),
            insert_batch: std::env::var("INSERT_BATCH").ok().and_then(|v| v.parse().ok()).unwrap_or(DEFAULT_INSERT_BATCH),
            bootstrap_days: std::env::var("BOOTSTRAP_DAYS").ok().and_then(|v| v.parse().ok()).unwrap_or(0),
            bootstrap_step_minutes: std::env::var("BOOTSTRAP_STEP_MINUTES").ok().and_then(|v| v.parse().ok()).unwrap_or(15),
        }
    }

    /// Seconds until the next tick boundary.
    pub fn sleep_until_next_tick(&self, now_ts: u64) -> u64 {
        let next = ((now_ts / self.tick_secs) + 1) * self.tick_secs;
        next.saturating_sub(now_ts)
    }

    pub fn to_json(&self) -> String {
        serde_json::to_string(self).unwrap_or_default()
    }

    /// SHA-256 of the serialized config, logged at startup for run correlation.
    pub fn config_hash(&self) -> String {
        let mut hasher = Sha256::new();
        hasher.update(self.to_json().as_bytes());
        hex::encode(hasher.finalize())
    }
}

pub fn now_ts() -> i64 {
    chrono::Utc::now().timestamp()
}
