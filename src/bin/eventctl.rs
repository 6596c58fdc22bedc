//! Operator tool for crash/rocket events.
//!
//! Usage:
//!   eventctl create <symbol> <crash|rocket>   baseline = current latest price
//!   eventctl list [symbol]
//!   eventctl resolve <event_id>

use std::sync::Arc;

use anyhow::{anyhow, Result};

use citymarket::config::Config;
use citymarket::engine::PriceEngine;
use citymarket::events::EventKind;
use citymarket::instrument::InstrumentCatalog;
use citymarket::sim::{BoxMuller, NormalSource};
use citymarket::store::SqliteStore;

fn usage() -> ! {
    eprintln!("usage: eventctl create <symbol> <crash|rocket> | list [symbol] | resolve <event_id>");
    std::process::exit(2);
}

fn main() -> Result<()> {
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

    let command = std::env::args().nth(1).unwrap_or_else(|| usage());
    match command.as_str() {
        "create" => {
            let symbol = std::env::args().nth(2).unwrap_or_else(|| usage());
            let kind = std::env::args().nth(3).unwrap_or_else(|| usage());
            let kind = EventKind::parse(&kind).map_err(|_| anyhow!("kind must be crash or rocket"))?;
            let event = engine.create_event(&symbol, kind)?;
            println!("{}", serde_json::to_string_pretty(&event)?);
        }
        "list" => {
            let symbol = std::env::args().nth(2);
            let events = engine.list_events(symbol.as_deref())?;
            println!("{}", serde_json::to_string_pretty(&events)?);
        }
        "resolve" => {
            let id: i64 = std::env::args()
                .nth(2)
                .and_then(|v| v.parse().ok())
                .unwrap_or_else(|| usage());
            engine.resolve_event(id)?;
            println!("{{\"resolved\":{}}}", id);
        }
        _ => usage(),
    }
    Ok(())
}
