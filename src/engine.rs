//! The price engine: GBM stepping per instrument, lazy seeding, the crash
//! reversion overlay, latest/history/24h-change queries and backfill.
//!
//! Every step depends only on the latest persisted point, so a failed tick
//! for one symbol self-heals on the next tick and never blocks the others.

use std::sync::{Arc, Mutex};

use serde::Serialize;
use serde_json::json;

use crate::backfill::{BackfillFailure, BackfillReport, BackfillRequest};
use crate::error::Result;
use crate::events::{revert_toward, within_recovery_band, EventKind};
use crate::history::HistoryRange;
use crate::instrument::{Instrument, InstrumentCatalog};
use crate::logging::{log, log_event_resolved, log_price_point, obj, v_num, v_str, Domain, Level};
use crate::sim::{gbm_step, min_tick, round_dp, GbmParams, NormalSource};
use crate::store::{EventStore, PricePoint, PriceStore};

/// Outcome of one pass over the whole catalog.
#[derive(Debug, Default, Serialize)]
pub struct TickReport {
    pub ts: i64,
    pub ticked: Vec<String>,
    pub failed: Vec<TickFailure>,
}

#[derive(Debug, Serialize)]
pub struct TickFailure {
    pub symbol: String,
    pub error: String,
}

/// 24h change for a symbol, with the reference point actually used.
#[derive(Debug, Clone, Serialize)]
pub struct DayChange {
    pub symbol: String,
    pub latest: f64,
    pub reference: f64,
    pub change: f64,
    pub change_pct: f64,
}

/// One row of the market listing view.
#[derive(Debug, Clone, Serialize)]
pub struct OverviewRow {
    pub symbol: String,
    pub name: String,
    pub price: f64,
    pub change: f64,
    pub change_pct: f64,
}

pub struct PriceEngine {
    catalog: InstrumentCatalog,
    prices: Arc<dyn PriceStore>,
    events: Arc<dyn EventStore>,
    normals: Mutex<Box<dyn NormalSource>>,
    tick_secs: i64,
}

impl PriceEngine {
    pub fn new(
        catalog: InstrumentCatalog,
        prices: Arc<dyn PriceStore>,
        events: Arc<dyn EventStore>,
        normals: Box<dyn NormalSource>,
    ) -> Self {
        Self {
            catalog,
            prices,
            events,
            normals: Mutex::new(normals),
            tick_secs: 60,
        }
    }

    pub fn with_tick_secs(mut self, tick_secs: u64) -> Self {
        self.tick_secs = tick_secs.max(1) as i64;
        self
    }

    pub fn catalog(&self) -> &InstrumentCatalog {
        &self.catalog
    }

    // -------------------------------------------------------------------------
    // Quotes
    // -------------------------------------------------------------------------

    /// Latest persisted point for a symbol, seeding a never-priced instrument
    /// as a side effect. Two calls without an intervening tick return the
    /// same point.
    pub fn latest_price(&self, symbol: &str) -> Result<PricePoint> {
        self.latest_price_at(symbol, crate::config::now_ts())
    }

    pub fn latest_price_at(&self, symbol: &str, now: i64) -> Result<PricePoint> {
        let inst = self.catalog.require(symbol)?;
        match self.prices.latest(symbol)? {
            Some(point) => Ok(point),
            None => self.seed(inst, now),
        }
    }

    /// Persist the seed point one step in the past so the first live tick
    /// lands one step after it.
    fn seed(&self, inst: &Instrument, now: i64) -> Result<PricePoint> {
        let point = PricePoint {
            symbol: inst.symbol.clone(),
            price: round_dp(inst.initial_price, inst.decimals),
            ts: now - self.tick_secs,
        };
        self.prices.append(&point)?;
        log(
            Level::Debug,
            Domain::Market,
            "seeded",
            obj(&[
                ("symbol", v_str(&inst.symbol)),
                ("price", v_num(point.price)),
                ("seed_ts", json!(point.ts)),
            ]),
        );
        Ok(point)
    }

    // -------------------------------------------------------------------------
    // Price stepping
    // -------------------------------------------------------------------------

    /// Compute the next point for a symbol without persisting it (quote path).
    pub fn next_price(&self, symbol: &str) -> Result<PricePoint> {
        self.next_price_at(symbol, crate::config::now_ts())
    }

    pub fn next_price_at(&self, symbol: &str, now: i64) -> Result<PricePoint> {
        let inst = self.catalog.require(symbol)?;
        let last = self.latest_price_at(symbol, now)?;

        let z = self.next_normal();
        let params = GbmParams::per_minute(inst.avg_yield_per_year, inst.volatility);
        let tick = min_tick(inst.decimals);
        let mut raw = gbm_step(last.price, &params, z).max(tick);
        raw = self.apply_crash_overlay(inst, raw);
        // Reversion toward a sub-tick baseline could undershoot; clamp again.
        let price = round_dp(raw.max(tick), inst.decimals);

        Ok(PricePoint { symbol: inst.symbol.clone(), price, ts: now })
    }

    fn next_normal(&self) -> f64 {
        match self.normals.lock() {
            Ok(mut normals) => normals.next_normal(),
            // A poisoned RNG mutex degrades to a drift-only step.
            Err(_) => 0.0,
        }
    }

    /// Pull the raw price toward the baseline of the most recent unresolved
    /// crash, resolving the event best-effort once inside the recovery band.
    /// Lookup failures never block pricing.
    fn apply_crash_overlay(&self, inst: &Instrument, raw: f64) -> f64 {
        let event = match self.events.active(&inst.symbol, EventKind::Crash) {
            Ok(Some(event)) => event,
            Ok(None) => return raw,
            Err(err) => {
                log(
                    Level::Warn,
                    Domain::Event,
                    "crash_lookup_failed",
                    obj(&[("symbol", v_str(&inst.symbol)), ("error", v_str(&err.to_string()))]),
                );
                return raw;
            }
        };

        let adjusted = revert_toward(raw, event.baseline_price);
        if within_recovery_band(adjusted, event.baseline_price) {
            match self.events.resolve(event.id) {
                Ok(()) => log_event_resolved(&inst.symbol, event.id, event.baseline_price, adjusted),
                // Leave the event active; the next tick retries.
                Err(err) => log(
                    Level::Warn,
                    Domain::Event,
                    "crash_resolve_failed",
                    obj(&[
                        ("symbol", v_str(&inst.symbol)),
                        ("event_id", json!(event.id)),
                        ("error", v_str(&err.to_string())),
                    ]),
                ),
            }
        }
        adjusted
    }

    // -------------------------------------------------------------------------
    // Tick
    // -------------------------------------------------------------------------

    /// Advance every instrument one step and persist each point as an
    /// independent atomic append. One symbol's failure never voids the rest.
    pub fn tick_all(&self) -> TickReport {
        self.tick_all_at(crate::config::now_ts())
    }

    pub fn tick_all_at(&self, now: i64) -> TickReport {
        let mut report = TickReport { ts: now, ..Default::default() };
        for symbol in self.catalog.symbols() {
            let result = self
                .next_price_at(symbol, now)
                .and_then(|point| {
                    self.prices.append(&point)?;
                    Ok(point)
                });
            match result {
                Ok(point) => {
                    log_price_point(&point.symbol, point.price, point.ts);
                    report.ticked.push(symbol.to_string());
                }
                Err(err) => {
                    log(
                        Level::Error,
                        Domain::Tick,
                        "symbol_tick_failed",
                        obj(&[("symbol", v_str(symbol)), ("error", v_str(&err.to_string()))]),
                    );
                    report.failed.push(TickFailure {
                        symbol: symbol.to_string(),
                        error: err.to_string(),
                    });
                }
            }
        }
        report
    }

    // -------------------------------------------------------------------------
    // Queries
    // -------------------------------------------------------------------------

    /// Full-resolution series inside the range window, ascending. Empty is
    /// not an error.
    pub fn history(&self, symbol: &str, range: HistoryRange) -> Result<Vec<PricePoint>> {
        self.history_at(symbol, range, crate::config::now_ts())
    }

    pub fn history_at(&self, symbol: &str, range: HistoryRange, now: i64) -> Result<Vec<PricePoint>> {
        self.catalog.require(symbol)?;
        self.prices.since(symbol, now - range.window_secs())
    }

    /// Change against the price ~24h ago. Reference fallback order: point
    /// at-or-before 24h ago, then at-or-before 60 minutes ago, then the
    /// earliest point ever, then the latest itself (zero change).
    pub fn change_24h(&self, symbol: &str) -> Result<DayChange> {
        self.change_24h_at(symbol, crate::config::now_ts())
    }

    pub fn change_24h_at(&self, symbol: &str, now: i64) -> Result<DayChange> {
        let latest = self.latest_price_at(symbol, now)?;
        let reference = match self.prices.at_or_before(symbol, now - 86_400)? {
            Some(point) => point,
            None => match self.prices.at_or_before(symbol, now - 3_600)? {
                Some(point) => point,
                None => match self.prices.earliest(symbol)? {
                    Some(point) => point,
                    None => latest.clone(),
                },
            },
        };

        let change = latest.price - reference.price;
        let change_pct = if reference.price == 0.0 {
            0.0
        } else {
            round_dp(change / reference.price * 100.0, 2)
        };

        Ok(DayChange {
            symbol: symbol.to_string(),
            latest: latest.price,
            reference: reference.price,
            change,
            change_pct,
        })
    }

    /// Listing view: latest price plus 24h change for every instrument.
    /// Per-symbol failures are logged and skipped.
    pub fn overview(&self) -> Vec<OverviewRow> {
        self.overview_at(crate::config::now_ts())
    }

    pub fn overview_at(&self, now: i64) -> Vec<OverviewRow> {
        let mut rows = Vec::with_capacity(self.catalog.len());
        for inst in self.catalog.instruments() {
            match self.change_24h_at(&inst.symbol, now) {
                Ok(change) => rows.push(OverviewRow {
                    symbol: inst.symbol.clone(),
                    name: inst.name.clone(),
                    price: change.latest,
                    change: change.change,
                    change_pct: change.change_pct,
                }),
                Err(err) => log(
                    Level::Warn,
                    Domain::Market,
                    "overview_symbol_failed",
                    obj(&[("symbol", v_str(&inst.symbol)), ("error", v_str(&err.to_string()))]),
                ),
            }
        }
        rows
    }

    // -------------------------------------------------------------------------
    // Backfill
    // -------------------------------------------------------------------------

    /// Generate synthetic history for the requested symbols. Expected to run
    /// without concurrent ticks on the same symbols (documented operational
    /// precondition, not a lock).
    pub fn backfill(&self, request: BackfillRequest) -> BackfillReport {
        self.backfill_at(request, crate::config::now_ts())
    }

    pub fn backfill_at(&self, request: BackfillRequest, now: i64) -> BackfillReport {
        let request = request.clamped();
        let symbols: Vec<String> = match &request.symbols {
            Some(symbols) => symbols.clone(),
            None => self.catalog.symbols().map(|s| s.to_string()).collect(),
        };

        let mut report = BackfillReport::default();
        for symbol in symbols {
            match self.backfill_symbol(&symbol, &request, now) {
                Ok(inserted) => {
                    log(
                        Level::Info,
                        Domain::Backfill,
                        "symbol_done",
                        obj(&[("symbol", v_str(&symbol)), ("inserted", json!(inserted))]),
                    );
                    report.inserted.insert(symbol, inserted);
                }
                Err(err) => {
                    log(
                        Level::Error,
                        Domain::Backfill,
                        "symbol_failed",
                        obj(&[("symbol", v_str(&symbol)), ("error", v_str(&err.to_string()))]),
                    );
                    report.failed.push(BackfillFailure {
                        symbol,
                        error: err.to_string(),
                    });
                }
            }
        }
        report
    }

    fn backfill_symbol(&self, symbol: &str, request: &BackfillRequest, now: i64) -> Result<u64> {
        let inst = self.catalog.require(symbol)?;
        let window_start = now - request.days as i64 * 86_400;
        let earliest = self.prices.earliest(symbol)?;

        // Exclusive end: generation never reaches the first real point.
        // With no history at all, generate through `now` so a fresh deploy
        // charts immediately.
        let window_end = match &earliest {
            Some(point) => point.ts,
            None => now + 1,
        };
        if window_end <= window_start {
            return Ok(0);
        }

        let step_secs = request.step_minutes as i64 * 60;
        let params = GbmParams::per_step_minutes(
            inst.avg_yield_per_year,
            inst.volatility,
            request.step_minutes,
        );
        let tick = min_tick(inst.decimals);

        let mut points = Vec::new();
        let mut price = round_dp(inst.initial_price, inst.decimals);
        let mut ts = window_start;
        while ts < window_end {
            points.push(PricePoint { symbol: inst.symbol.clone(), price, ts });
            let z = self.next_normal();
            price = round_dp(gbm_step(price, &params, z).max(tick), inst.decimals);
            ts += step_secs;
        }

        // Seam continuity: the last synthetic point matches the first real one.
        if let (Some(real), Some(last)) = (&earliest, points.last_mut()) {
            last.price = real.price;
        }

        let written = self.prices.append_many(&points)?;
        Ok(written as u64)
    }

    // -------------------------------------------------------------------------
    // Event administration (the "external collaborator" surface)
    // -------------------------------------------------------------------------

    /// Create a crash/rocket event with baseline = the current latest price
    /// (lazy-seeding if needed).
    pub fn create_event(&self, symbol: &str, kind: EventKind) -> Result<crate::events::PriceEvent> {
        let now = crate::config::now_ts();
        let latest = self.latest_price_at(symbol, now)?;
        let event = self.events.create(symbol, kind, latest.price, now)?;
        log(
            Level::Info,
            Domain::Event,
            "created",
            obj(&[
                ("symbol", v_str(symbol)),
                ("kind", v_str(kind.as_str())),
                ("event_id", json!(event.id)),
                ("baseline", v_num(event.baseline_price)),
            ]),
        );
        Ok(event)
    }

    pub fn list_events(&self, symbol: Option<&str>) -> Result<Vec<crate::events::PriceEvent>> {
        if let Some(symbol) = symbol {
            self.catalog.require(symbol)?;
        }
        self.events.list(symbol)
    }

    pub fn resolve_event(&self, id: i64) -> Result<()> {
        self.events.resolve(id)
    }
}

impl std::fmt::Debug for PriceEngine {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PriceEngine")
            .field("instruments", &self.catalog.len())
            .field("tick_secs", &self.tick_secs)
            .finish()
    }
}
