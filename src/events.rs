//! Crash/rocket price events and the mean-reversion math applied while a
//! crash is in effect.
//!
//! Only crashes pull prices; rockets are recorded flavor events that the
//! pricing overlay never consumes.

use serde::{Deserialize, Serialize};

use crate::error::{MarketError, Result};

/// Fraction of the gap to baseline closed per tick.
pub const PULL_ALPHA: f64 = 0.03;

/// Relative band around baseline inside which a crash counts as recovered.
pub const RECOVERY_BAND: f64 = 0.02;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EventKind {
    Crash,
    Rocket,
}

impl EventKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            EventKind::Crash => "crash",
            EventKind::Rocket => "rocket",
        }
    }

    pub fn parse(s: &str) -> Result<Self> {
        match s {
            "crash" => Ok(EventKind::Crash),
            "rocket" => Ok(EventKind::Rocket),
            other => Err(MarketError::Storage(format!("unknown event kind: {}", other))),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PriceEvent {
    pub id: i64,
    pub symbol: String,
    pub kind: EventKind,
    /// Price captured when the event was created; the reversion target.
    pub baseline_price: f64,
    pub created_at: i64,
    pub resolved: bool,
}

/// Pull `raw` 3% of the way toward `baseline`.
pub fn revert_toward(raw: f64, baseline: f64) -> f64 {
    raw + PULL_ALPHA * (baseline - raw)
}

/// True once `adjusted` is within 2% of baseline.
pub fn within_recovery_band(adjusted: f64, baseline: f64) -> bool {
    if baseline <= 0.0 {
        return false;
    }
    (adjusted - baseline).abs() / baseline < RECOVERY_BAND
}
