//! Market simulation core for the city game: GBM price evolution, crash
//! mean-reversion, historical queries and synthetic backfill over SQLite.

pub mod backfill;
pub mod config;
pub mod engine;
pub mod error;
pub mod events;
pub mod fault;
pub mod history;
pub mod instrument;
pub mod logging;
pub mod sim;
pub mod store;
