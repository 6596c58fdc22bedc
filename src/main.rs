use std::sync::Arc;
use std::time::Instant;

use anyhow::Result;
use serde_json::json;
use tokio::time::{sleep, Duration};

use citymarket::backfill::BackfillRequest;
use citymarket::config::{now_ts, Config};
use citymarket::engine::PriceEngine;
use citymarket::instrument::InstrumentCatalog;
use citymarket::logging::{json_log, log_tick_metrics, obj, v_num, v_str};
use citymarket::sim::{BoxMuller, NormalSource};
use citymarket::store::SqliteStore;

#[tokio::main]
async fn main() -> Result<()> {
    let cfg = Config::from_env();
    let catalog = match &cfg.catalog_path {
        Some(path) => InstrumentCatalog::from_json_file(path)?,
        None => InstrumentCatalog::builtin(),
    };
    json_log(
        "startup",
        obj(&[
            ("config_hash", v_str(&cfg.config_hash())),
            ("catalog_fingerprint", v_str(&catalog.fingerprint())),
            ("instruments", v_num(catalog.len() as f64)),
            ("tick_secs", v_num(cfg.tick_secs as f64)),
        ]),
    );

    let store = Arc::new(SqliteStore::open_with_batch(&cfg.sqlite_path, cfg.insert_batch)?);
    store.init()?;

    let normals: Box<dyn NormalSource> = match cfg.rng_seed {
        Some(seed) => Box::new(BoxMuller::seeded(seed)),
        None => Box::new(BoxMuller::from_entropy()),
    };
    let engine = PriceEngine::new(catalog, store.clone(), store, normals)
        .with_tick_secs(cfg.tick_secs);

    if cfg.bootstrap_days > 0 {
        let report = engine.backfill(BackfillRequest::all(
            cfg.bootstrap_days,
            cfg.bootstrap_step_minutes,
        ));
        json_log(
            "bootstrap_backfill",
            obj(&[
                ("inserted", json!(report.total_inserted())),
                ("failed", json!(report.failed.len())),
            ]),
        );
    }

    loop {
        let start = now_ts();
        let started = Instant::now();
        let report = engine.tick_all_at(start);
        log_tick_metrics(
            start,
            report.ticked.len(),
            report.failed.len(),
            started.elapsed().as_secs_f64() * 1000.0,
        );

        let sleep_for = cfg.sleep_until_next_tick(start.max(0) as u64);
        sleep(Duration::from_secs(sleep_for)).await;
    }
}
