//! Fault injection for tests: store decorators that fail chosen operations
//! while passing everything else through.

use std::collections::HashSet;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use crate::error::{MarketError, Result};
use crate::events::{EventKind, PriceEvent};
use crate::store::{EventStore, PricePoint, PriceStore};

pub struct WriteFaults {
    inner: Arc<dyn PriceStore>,
    deny: HashSet<String>,
}

impl WriteFaults {
    pub fn new(inner: Arc<dyn PriceStore>, deny: &[&str]) -> Self {
        Self {
            inner,
            deny: deny.iter().map(|s| s.to_string()).collect(),
        }
    }

    fn check(&self, symbol: &str) -> Result<()> {
        if self.deny.contains(symbol) {
            return Err(MarketError::Storage(format!(
                "injected write fault for {}",
                symbol
            )));
        }
        Ok(())
    }
}

impl PriceStore for WriteFaults {
    fn append(&self, point: &PricePoint) -> Result<()> {
        self.check(&point.symbol)?;
        self.inner.append(point)
    }

    fn append_many(&self, points: &[PricePoint]) -> Result<usize> {
        for point in points {
            self.check(&point.symbol)?;
        }
        self.inner.append_many(points)
    }

    fn latest(&self, symbol: &str) -> Result<Option<PricePoint>> {
        self.inner.latest(symbol)
    }

    fn earliest(&self, symbol: &str) -> Result<Option<PricePoint>> {
        self.inner.earliest(symbol)
    }

    fn at_or_before(&self, symbol: &str, ts: i64) -> Result<Option<PricePoint>> {
        self.inner.at_or_before(symbol, ts)
    }

    fn since(&self, symbol: &str, from_ts: i64) -> Result<Vec<PricePoint>> {
        self.inner.since(symbol, from_ts)
    }
}

/// `EventStore` decorator with toggleable failures for `active` lookups and
/// `resolve` writes. Toggles flip mid-test to exercise recovery paths.
pub struct EventFaults {
    inner: Arc<dyn EventStore>,
    deny_lookups: AtomicBool,
    deny_resolves: AtomicBool,
}

impl EventFaults {
    pub fn new(inner: Arc<dyn EventStore>) -> Self {
        Self {
            inner,
            deny_lookups: AtomicBool::new(false),
            deny_resolves: AtomicBool::new(false),
        }
    }

    pub fn deny_lookups(&self, on: bool) {
        self.deny_lookups.store(on, Ordering::SeqCst);
    }

    pub fn deny_resolves(&self, on: bool) {
        self.deny_resolves.store(on, Ordering::SeqCst);
    }
}

impl EventStore for EventFaults {
    fn create(
        &self,
        symbol: &str,
        kind: EventKind,
        baseline_price: f64,
        created_at: i64,
    ) -> Result<PriceEvent> {
        self.inner.create(symbol, kind, baseline_price, created_at)
    }

    fn active(&self, symbol: &str, kind: EventKind) -> Result<Option<PriceEvent>> {
        if self.deny_lookups.load(Ordering::SeqCst) {
            return Err(MarketError::Storage(format!(
                "injected lookup fault for {}",
                symbol
            )));
        }
        self.inner.active(symbol, kind)
    }

    fn resolve(&self, id: i64) -> Result<()> {
        if self.deny_resolves.load(Ordering::SeqCst) {
            return Err(MarketError::Storage(format!(
                "injected resolve fault for event {}",
                id
            )));
        }
        self.inner.resolve(id)
    }

    fn list(&self, symbol: Option<&str>) -> Result<Vec<PriceEvent>> {
        self.inner.list(symbol)
    }
}
