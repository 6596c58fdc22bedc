//! One-shot synthetic history backfill.
//!
//! Usage: backfill [days] [step_minutes]
//!   SYMBOLS=ACME,BYTE  restrict to a comma-separated symbol set
//!   Shares SQLITE_PATH / CATALOG_PATH / RNG_SEED / INSERT_BATCH with the service.

use std::sync::Arc;

use anyhow::Result;

use citymarket::backfill::BackfillRequest;
use citymarket::config::Config;
use citymarket::engine::PriceEngine;
use citymarket::instrument::InstrumentCatalog;
use citymarket::sim::{BoxMuller, NormalSource};
use citymarket::store::SqliteStore;

fn main() -> Result<()> {
    let days: u32 = std::env::args()
        .nth(1)
        .and_then(|v| v.parse().ok())
        .unwrap_or(90);
    let step_minutes: u32 = std::env::args()
        .nth(2)
        .and_then(|v| v.parse().ok())
        .unwrap_or(15);
    let symbols: Option<Vec<String>> = std::env::var("SYMBOLS")
        .ok()
        .map(|v| v.split(',').map(|s| s.trim().to_string()).filter(|s| !s.is_empty()).collect());

    let cfg = Config::from_env();
    let catalog = match &cfg.catalog_path {
        Some(path) => InstrumentCatalog::from_json_file(path)?,
        None => InstrumentCatalog::builtin(),
    };
    let store = Arc::new(SqliteStore::open_with_batch(&cfg.sqlite_path, cfg.insert_batch)?);
    store.init()?;
    let normals: Box<dyn NormalSource> = match cfg.rng_seed {
        Some(seed) => Box::new(BoxMuller::seeded(seed)),
        None => Box::new(BoxMuller::from_entropy()),
    };
    let engine = PriceEngine::new(catalog, store.clone(), store, normals)
        .with_tick_secs(cfg.tick_secs);

    let report = engine.backfill(BackfillRequest { symbols, days, step_minutes });
    println!("{}", serde_json::to_string_pretty(&report)?);

    if !report.failed.is_empty() {
        std::process::exit(1);
    }
    Ok(())
}
