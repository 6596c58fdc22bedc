use std::sync::Arc;

use tempfile::TempDir;

use citymarket::engine::PriceEngine;
use citymarket::error::MarketError;
use citymarket::events::EventKind;
use citymarket::fault::{EventFaults, WriteFaults};
use citymarket::history::HistoryRange;
use citymarket::instrument::{Instrument, InstrumentCatalog};
use citymarket::sim::{BoxMuller, FixedNormals, NormalSource};
use citymarket::store::{EventStore, PricePoint, PriceStore, SqliteStore};

const NOW: i64 = 1_700_000_000;

fn instrument(symbol: &str, initial: f64, mu: f64, sigma: f64, decimals: u32) -> Instrument {
    Instrument {
        symbol: symbol.to_string(),
        name: format!("{} Corp", symbol),
        description: String::new(),
        initial_price: initial,
        avg_yield_per_year: mu,
        volatility: sigma,
        decimals,
    }
}

fn open_store(dir: &TempDir) -> Arc<SqliteStore> {
    let path = dir.path().join("market.sqlite");
    let store = SqliteStore::open(path.to_str().unwrap()).unwrap();
    store.init().unwrap();
    Arc::new(store)
}

fn engine(
    store: Arc<SqliteStore>,
    instruments: Vec<Instrument>,
    normals: Box<dyn NormalSource>,
) -> PriceEngine {
    let catalog = InstrumentCatalog::from_instruments(instruments).unwrap();
    PriceEngine::new(catalog, store.clone(), store, normals)
}

// ---------------------------------------------------------------------------
// Lazy seeding
// ---------------------------------------------------------------------------

#[test]
fn lazy_seed_is_idempotent() {
    let dir = TempDir::new().unwrap();
    let store = open_store(&dir);
    let engine = engine(
        store.clone(),
        vec![instrument("ACME", 125.0, 0.05, 0.25, 2)],
        Box::new(BoxMuller::seeded(1)),
    );

    let first = engine.latest_price_at("ACME", NOW).unwrap();
    let second = engine.latest_price_at("ACME", NOW).unwrap();
    assert_eq!(first, second);
    assert_eq!(first.price, 125.0);
    // Seed lands one tick in the past
    assert_eq!(first.ts, NOW - 60);

    // Exactly one row was written
    let all = store.since("ACME", 0).unwrap();
    assert_eq!(all.len(), 1);
}

#[test]
fn quote_path_does_not_persist() {
    let dir = TempDir::new().unwrap();
    let store = open_store(&dir);
    let engine = engine(
        store.clone(),
        vec![instrument("ACME", 125.0, 0.05, 0.25, 2)],
        Box::new(BoxMuller::seeded(1)),
    );

    let quote = engine.next_price_at("ACME", NOW).unwrap();
    assert_eq!(quote.ts, NOW);
    // Only the lazy seed is on disk, not the quote
    let all = store.since("ACME", 0).unwrap();
    assert_eq!(all.len(), 1);
    assert_eq!(all[0].ts, NOW - 60);
}

// ---------------------------------------------------------------------------
// Degenerate determinism and positivity
// ---------------------------------------------------------------------------

#[test]
fn zero_drift_zero_vol_is_constant() {
    let dir = TempDir::new().unwrap();
    let store = open_store(&dir);
    let engine = engine(
        store,
        vec![instrument("X", 100.0, 0.0, 0.0, 2)],
        Box::new(BoxMuller::seeded(99)),
    );

    for i in 0..50 {
        let report = engine.tick_all_at(NOW + i * 60);
        assert!(report.failed.is_empty());
        let latest = engine.latest_price_at("X", NOW + i * 60).unwrap();
        assert_eq!(latest.price, 100.0, "tick {} drifted", i);
    }
}

#[test]
fn price_never_drops_below_min_tick() {
    let dir = TempDir::new().unwrap();
    let store = open_store(&dir);
    // Brutal parameters: huge sigma, every z draw at -8 sigma
    let engine = engine(
        store.clone(),
        vec![instrument("DOOM", 0.05, -10.0, 50.0, 2)],
        Box::new(FixedNormals::constant(-8.0)),
    );

    for i in 0..200 {
        let report = engine.tick_all_at(NOW + i * 60);
        assert!(report.failed.is_empty());
    }
    let points = store.since("DOOM", 0).unwrap();
    assert!(!points.is_empty());
    for point in &points {
        assert!(point.price >= 0.01, "price below min tick: {}", point.price);
    }
    // It does actually get pinned at the floor
    assert_eq!(store.latest("DOOM").unwrap().unwrap().price, 0.01);
}

#[test]
fn persisted_prices_respect_decimals() {
    let dir = TempDir::new().unwrap();
    let store = open_store(&dir);
    let engine = engine(
        store.clone(),
        vec![instrument("PREC", 42.123, 0.1, 0.9, 3)],
        Box::new(BoxMuller::seeded(7)),
    );

    for i in 0..100 {
        engine.tick_all_at(NOW + i * 60);
    }
    for point in store.since("PREC", 0).unwrap() {
        let scaled = point.price * 1_000.0;
        assert!(
            (scaled - scaled.round()).abs() < 1e-6,
            "more than 3 decimals: {}",
            point.price
        );
    }
}

// ---------------------------------------------------------------------------
// Crash overlay
// ---------------------------------------------------------------------------

#[test]
fn crash_reversion_converges_and_resolves() {
    let dir = TempDir::new().unwrap();
    let store = open_store(&dir);
    // sigma = 0 so the raw price is exactly the previous price each tick
    let engine = engine(
        store.clone(),
        vec![instrument("X", 200.0, 0.0, 0.0, 2)],
        Box::new(BoxMuller::seeded(1)),
    );

    // Seed at 200, then a crash with baseline 100
    engine.latest_price_at("X", NOW).unwrap();
    let event = store.create("X", EventKind::Crash, 100.0, NOW).unwrap();

    let mut prev_gap = 100.0;
    let mut resolved_at = None;
    for i in 0..300 {
        let now = NOW + (i + 1) * 60;
        let report = engine.tick_all_at(now);
        assert!(report.failed.is_empty());
        let latest = engine.latest_price_at("X", now).unwrap();

        if resolved_at.is_none() {
            let gap = (latest.price - 100.0).abs();
            assert!(gap < prev_gap, "gap must strictly shrink while crash active");
            prev_gap = gap;
            let active = store.active("X", EventKind::Crash).unwrap();
            if active.is_none() {
                resolved_at = Some(i);
                // Resolution implies the persisted price is inside the band
                assert!(gap / 100.0 < 0.02);
            }
        }
    }
    assert!(resolved_at.is_some(), "crash never resolved");

    // Event row is flipped, not deleted
    let events = store.list(Some("X")).unwrap();
    assert_eq!(events.len(), 1);
    assert_eq!(events[0].id, event.id);
    assert!(events[0].resolved);
}

#[test]
fn rocket_events_never_adjust_prices() {
    let dir = TempDir::new().unwrap();
    let store = open_store(&dir);
    let engine = engine(
        store.clone(),
        vec![instrument("X", 200.0, 0.0, 0.0, 2)],
        Box::new(BoxMuller::seeded(1)),
    );

    engine.latest_price_at("X", NOW).unwrap();
    store.create("X", EventKind::Rocket, 100.0, NOW).unwrap();

    for i in 0..10 {
        engine.tick_all_at(NOW + (i + 1) * 60);
    }
    // No reversion: price stays exactly at 200
    assert_eq!(store.latest("X").unwrap().unwrap().price, 200.0);
    // And the rocket is still unresolved
    assert!(store.active("X", EventKind::Rocket).unwrap().is_some());
}

#[test]
fn crash_lookup_failure_does_not_block_pricing() {
    let dir = TempDir::new().unwrap();
    let sqlite = open_store(&dir);
    let events = Arc::new(EventFaults::new(sqlite.clone()));

    let catalog =
        InstrumentCatalog::from_instruments(vec![instrument("X", 200.0, 0.0, 0.0, 2)]).unwrap();
    let engine = PriceEngine::new(
        catalog,
        sqlite.clone(),
        events.clone(),
        Box::new(BoxMuller::seeded(1)),
    );

    engine.latest_price_at("X", NOW).unwrap();
    sqlite.create("X", EventKind::Crash, 100.0, NOW).unwrap();

    // With the lookup failing the overlay is skipped, not the tick
    events.deny_lookups(true);
    let report = engine.tick_all_at(NOW);
    assert!(report.failed.is_empty());
    assert_eq!(sqlite.latest("X").unwrap().unwrap().price, 200.0);

    // Once lookups recover the reversion pull applies again
    events.deny_lookups(false);
    engine.tick_all_at(NOW + 60);
    assert_eq!(sqlite.latest("X").unwrap().unwrap().price, 197.0);
}

#[test]
fn failed_resolve_keeps_the_crash_active() {
    let dir = TempDir::new().unwrap();
    let sqlite = open_store(&dir);
    let events = Arc::new(EventFaults::new(sqlite.clone()));

    // Last price already close enough to baseline that one adjusted step
    // lands inside the recovery band
    let catalog =
        InstrumentCatalog::from_instruments(vec![instrument("X", 101.0, 0.0, 0.0, 2)]).unwrap();
    let engine = PriceEngine::new(
        catalog,
        sqlite.clone(),
        events.clone(),
        Box::new(BoxMuller::seeded(1)),
    );

    engine.latest_price_at("X", NOW).unwrap();
    let event = sqlite.create("X", EventKind::Crash, 100.0, NOW).unwrap();

    events.deny_resolves(true);
    let report = engine.tick_all_at(NOW);
    assert!(report.failed.is_empty());
    // The pull still applied, the event stayed active
    assert_eq!(sqlite.latest("X").unwrap().unwrap().price, 100.97);
    assert!(sqlite.active("X", EventKind::Crash).unwrap().is_some());

    // The next tick retries and resolves
    events.deny_resolves(false);
    engine.tick_all_at(NOW + 60);
    assert!(sqlite.active("X", EventKind::Crash).unwrap().is_none());
    let listed = sqlite.list(Some("X")).unwrap();
    assert_eq!(listed[0].id, event.id);
    assert!(listed[0].resolved);
}

// ---------------------------------------------------------------------------
// Partial tick failure
// ---------------------------------------------------------------------------

#[test]
fn one_failing_symbol_does_not_block_the_others() {
    let dir = TempDir::new().unwrap();
    let sqlite = open_store(&dir);
    let faulty: Arc<dyn PriceStore> =
        Arc::new(WriteFaults::new(sqlite.clone(), &["BAD"]));

    let catalog = InstrumentCatalog::from_instruments(vec![
        instrument("AAA", 10.0, 0.0, 0.0, 2),
        instrument("BAD", 10.0, 0.0, 0.0, 2),
        instrument("CCC", 10.0, 0.0, 0.0, 2),
    ])
    .unwrap();
    let engine = PriceEngine::new(
        catalog,
        faulty,
        sqlite.clone(),
        Box::new(BoxMuller::seeded(1)),
    );

    let report = engine.tick_all_at(NOW);
    assert_eq!(report.ticked, vec!["AAA".to_string(), "CCC".to_string()]);
    assert_eq!(report.failed.len(), 1);
    assert_eq!(report.failed[0].symbol, "BAD");

    // Fresh points persisted for the healthy symbols (seed + tick each)
    assert_eq!(sqlite.since("AAA", 0).unwrap().len(), 2);
    assert_eq!(sqlite.since("CCC", 0).unwrap().len(), 2);
    assert!(sqlite.since("BAD", 0).unwrap().is_empty());
}

// ---------------------------------------------------------------------------
// History and 24h change
// ---------------------------------------------------------------------------

#[test]
fn history_returns_exactly_the_window() {
    let dir = TempDir::new().unwrap();
    let store = open_store(&dir);
    let engine = engine(
        store.clone(),
        vec![instrument("ACME", 100.0, 0.0, 0.0, 2)],
        Box::new(BoxMuller::seeded(1)),
    );

    // Ten days of minute-resolution data ending at NOW
    let start = NOW - 10 * 86_400;
    let points: Vec<PricePoint> = (0..=(10 * 1_440))
        .map(|i| PricePoint {
            symbol: "ACME".to_string(),
            price: 100.0,
            ts: start + i * 60,
        })
        .collect();
    store.append_many(&points).unwrap();

    let window = engine.history_at("ACME", HistoryRange::Week, NOW).unwrap();
    let cutoff = NOW - 7 * 86_400;
    assert_eq!(window.len(), 7 * 1_440 + 1);
    assert!(window.iter().all(|p| p.ts >= cutoff));
    assert_eq!(window.first().unwrap().ts, cutoff);
    assert_eq!(window.last().unwrap().ts, NOW);
    assert!(window.windows(2).all(|w| w[0].ts < w[1].ts));
}

#[test]
fn history_empty_window_is_not_an_error() {
    let dir = TempDir::new().unwrap();
    let store = open_store(&dir);
    let engine = engine(
        store.clone(),
        vec![instrument("ACME", 100.0, 0.0, 0.0, 2)],
        Box::new(BoxMuller::seeded(1)),
    );
    // Old point only, far outside the window
    store
        .append(&PricePoint { symbol: "ACME".to_string(), price: 90.0, ts: NOW - 100 * 86_400 })
        .unwrap();
    let window = engine.history_at("ACME", HistoryRange::Day, NOW).unwrap();
    assert!(window.is_empty());
}

#[test]
fn change_24h_uses_day_old_reference() {
    let dir = TempDir::new().unwrap();
    let store = open_store(&dir);
    let engine = engine(
        store.clone(),
        vec![instrument("ACME", 100.0, 0.0, 0.0, 2)],
        Box::new(BoxMuller::seeded(1)),
    );
    store.append(&PricePoint { symbol: "ACME".to_string(), price: 80.0, ts: NOW - 86_500 }).unwrap();
    store.append(&PricePoint { symbol: "ACME".to_string(), price: 110.0, ts: NOW }).unwrap();

    let change = engine.change_24h_at("ACME", NOW).unwrap();
    assert_eq!(change.reference, 80.0);
    assert_eq!(change.change, 30.0);
    assert_eq!(change.change_pct, 37.5);
}

#[test]
fn change_24h_falls_back_to_hour_then_earliest() {
    let dir = TempDir::new().unwrap();
    let store = open_store(&dir);
    let engine = engine(
        store.clone(),
        vec![
            instrument("HOUR", 100.0, 0.0, 0.0, 2),
            instrument("NEW", 100.0, 0.0, 0.0, 2),
        ],
        Box::new(BoxMuller::seeded(1)),
    );

    // Only two hours of history: the 24h lookup misses, the 1h one hits
    store.append(&PricePoint { symbol: "HOUR".to_string(), price: 95.0, ts: NOW - 7_200 }).unwrap();
    store.append(&PricePoint { symbol: "HOUR".to_string(), price: 100.0, ts: NOW }).unwrap();
    let change = engine.change_24h_at("HOUR", NOW).unwrap();
    assert_eq!(change.reference, 95.0);

    // Only half an hour of history: both lookups miss, earliest wins
    store.append(&PricePoint { symbol: "NEW".to_string(), price: 98.0, ts: NOW - 1_800 }).unwrap();
    store.append(&PricePoint { symbol: "NEW".to_string(), price: 99.0, ts: NOW - 900 }).unwrap();
    let change = engine.change_24h_at("NEW", NOW).unwrap();
    assert_eq!(change.reference, 98.0);
    assert_eq!(change.change, 1.0);
}

#[test]
fn change_24h_on_virgin_symbol_is_zero() {
    let dir = TempDir::new().unwrap();
    let store = open_store(&dir);
    let engine = engine(
        store,
        vec![instrument("ACME", 125.0, 0.05, 0.25, 2)],
        Box::new(BoxMuller::seeded(1)),
    );
    let change = engine.change_24h_at("ACME", NOW).unwrap();
    assert_eq!(change.latest, 125.0);
    assert_eq!(change.change, 0.0);
    assert_eq!(change.change_pct, 0.0);
}

#[test]
fn change_24h_against_zero_reference_reports_flat_pct() {
    let dir = TempDir::new().unwrap();
    let store = open_store(&dir);
    let engine = engine(
        store.clone(),
        vec![instrument("ACME", 5.0, 0.0, 0.0, 2)],
        Box::new(BoxMuller::seeded(1)),
    );

    // A delisted-to-zero point a day ago must not divide the change by it
    store
        .append(&PricePoint { symbol: "ACME".to_string(), price: 0.0, ts: NOW - 86_500 })
        .unwrap();
    store
        .append(&PricePoint { symbol: "ACME".to_string(), price: 5.0, ts: NOW - 60 })
        .unwrap();

    let change = engine.change_24h_at("ACME", NOW).unwrap();
    assert_eq!(change.reference, 0.0);
    assert_eq!(change.change, 5.0);
    assert_eq!(change.change_pct, 0.0);
}

#[test]
fn overview_lists_every_instrument() {
    let dir = TempDir::new().unwrap();
    let store = open_store(&dir);
    let engine = engine(
        store,
        vec![
            instrument("AAA", 10.0, 0.0, 0.0, 2),
            instrument("BBB", 20.0, 0.0, 0.0, 2),
        ],
        Box::new(BoxMuller::seeded(1)),
    );
    let rows = engine.overview_at(NOW);
    assert_eq!(rows.len(), 2);
    assert_eq!(rows[0].symbol, "AAA");
    assert_eq!(rows[0].price, 10.0);
    assert_eq!(rows[1].symbol, "BBB");
    assert_eq!(rows[1].name, "BBB Corp");
}

// ---------------------------------------------------------------------------
// Unknown symbols
// ---------------------------------------------------------------------------

#[test]
fn unknown_symbol_fails_on_every_operation() {
    let dir = TempDir::new().unwrap();
    let store = open_store(&dir);
    let engine = engine(
        store,
        vec![instrument("ACME", 125.0, 0.05, 0.25, 2)],
        Box::new(BoxMuller::seeded(1)),
    );

    assert!(matches!(
        engine.next_price_at("NOPE", NOW),
        Err(MarketError::UnknownSymbol(_))
    ));
    assert!(matches!(
        engine.latest_price_at("NOPE", NOW),
        Err(MarketError::UnknownSymbol(_))
    ));
    assert!(matches!(
        engine.history_at("NOPE", HistoryRange::Day, NOW),
        Err(MarketError::UnknownSymbol(_))
    ));
    assert!(matches!(
        engine.change_24h_at("NOPE", NOW),
        Err(MarketError::UnknownSymbol(_))
    ));
    assert!(matches!(
        engine.list_events(Some("NOPE")),
        Err(MarketError::UnknownSymbol(_))
    ));
}
