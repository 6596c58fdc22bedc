//! Synthetic history generation: retroactively fill a symbol's chart with a
//! GBM walk so new deployments are not empty. Generation stops strictly
//! before the earliest real point and snaps to it at the seam.

use std::collections::BTreeMap;

use serde::Serialize;

pub const MIN_DAYS: u32 = 1;
pub const MAX_DAYS: u32 = 365;
pub const MIN_STEP_MINUTES: u32 = 1;
pub const MAX_STEP_MINUTES: u32 = 60;

#[derive(Debug, Clone)]
pub struct BackfillRequest {
    /// Symbols to backfill; the whole catalog when unset.
    pub symbols: Option<Vec<String>>,
    pub days: u32,
    pub step_minutes: u32,
}

impl BackfillRequest {
    pub fn all(days: u32, step_minutes: u32) -> Self {
        Self { symbols: None, days, step_minutes }
    }

    /// Clamp days and step into their supported ranges.
    pub fn clamped(mut self) -> Self {
        self.days = self.days.clamp(MIN_DAYS, MAX_DAYS);
        self.step_minutes = self.step_minutes.clamp(MIN_STEP_MINUTES, MAX_STEP_MINUTES);
        self
    }
}

#[derive(Debug, Default, Serialize)]
pub struct BackfillReport {
    /// Points inserted per symbol.
    pub inserted: BTreeMap<String, u64>,
    pub failed: Vec<BackfillFailure>,
}

#[derive(Debug, Serialize)]
pub struct BackfillFailure {
    pub symbol: String,
    pub error: String,
}

impl BackfillReport {
    pub fn total_inserted(&self) -> u64 {
        self.inserted.values().sum()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_clamp_days() {
        let req = BackfillRequest::all(0, 15).clamped();
        assert_eq!(req.days, MIN_DAYS);
        let req = BackfillRequest::all(1_000, 15).clamped();
        assert_eq!(req.days, MAX_DAYS);
        let req = BackfillRequest::all(90, 15).clamped();
        assert_eq!(req.days, 90);
    }

    #[test]
    fn test_clamp_step_minutes() {
        let req = BackfillRequest::all(90, 0).clamped();
        assert_eq!(req.step_minutes, MIN_STEP_MINUTES);
        let req = BackfillRequest::all(90, 240).clamped();
        assert_eq!(req.step_minutes, MAX_STEP_MINUTES);
    }

    #[test]
    fn test_report_total() {
        let mut report = BackfillReport::default();
        report.inserted.insert("ACME".to_string(), 10);
        report.inserted.insert("BYTE".to_string(), 5);
        assert_eq!(report.total_inserted(), 15);
    }
}
