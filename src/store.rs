//! Persistence for price points and price events.
//!
//! Both stores are traits so the engine can be tested against fault-injecting
//! wrappers; the production implementation is a single SQLite handle shared
//! between the tick loop and query callers.

use std::sync::Mutex;

use rusqlite::{params, Connection, OptionalExtension};
use serde::{Deserialize, Serialize};

use crate::error::{MarketError, Result};
use crate::events::{EventKind, PriceEvent};

/// Default rows per insert transaction for bulk appends.
pub const DEFAULT_INSERT_BATCH: usize = 2_000;

/// One observed price. Append-only; never mutated after insert.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PricePoint {
    pub symbol: String,
    pub price: f64,
    pub ts: i64,
}

pub trait PriceStore: Send + Sync {
    fn append(&self, point: &PricePoint) -> Result<()>;
    /// Bulk append, chunked by the adapter's batch size. Returns rows written.
    fn append_many(&self, points: &[PricePoint]) -> Result<usize>;
    fn latest(&self, symbol: &str) -> Result<Option<PricePoint>>;
    fn earliest(&self, symbol: &str) -> Result<Option<PricePoint>>;
    fn at_or_before(&self, symbol: &str, ts: i64) -> Result<Option<PricePoint>>;
    /// All points with `ts >= from_ts`, ascending.
    fn since(&self, symbol: &str, from_ts: i64) -> Result<Vec<PricePoint>>;
}

pub trait EventStore: Send + Sync {
    fn create(
        &self,
        symbol: &str,
        kind: EventKind,
        baseline_price: f64,
        created_at: i64,
    ) -> Result<PriceEvent>;
    /// Most recently created unresolved event of the given kind.
    fn active(&self, symbol: &str, kind: EventKind) -> Result<Option<PriceEvent>>;
    /// Idempotent: resolving an already-resolved event is a no-op.
    fn resolve(&self, id: i64) -> Result<()>;
    fn list(&self, symbol: Option<&str>) -> Result<Vec<PriceEvent>>;
}

pub struct SqliteStore {
    conn: Mutex<Connection>,
    insert_batch: usize,
}

impl SqliteStore {
    pub fn open(path: &str) -> Result<Self> {
        Self::open_with_batch(path, DEFAULT_INSERT_BATCH)
    }

    pub fn open_with_batch(path: &str, insert_batch: usize) -> Result<Self> {
        let conn = Connection::open(path)?;
        Ok(Self {
            conn: Mutex::new(conn),
            insert_batch: insert_batch.max(1),
        })
    }

    pub fn init(&self) -> Result<()> {
        let conn = self.lock()?;
        conn.execute_batch(
            "BEGIN;
            CREATE TABLE IF NOT EXISTS price_points (
                symbol TEXT NOT NULL,
                price REAL NOT NULL,
                ts INTEGER NOT NULL
            );
            CREATE INDEX IF NOT EXISTS idx_price_points_symbol_ts
                ON price_points (symbol, ts);
            CREATE TABLE IF NOT EXISTS price_events (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                symbol TEXT NOT NULL,
                kind TEXT NOT NULL,
                baseline_price REAL NOT NULL,
                created_at INTEGER NOT NULL,
                resolved INTEGER NOT NULL DEFAULT 0
            );
            COMMIT;",
        )?;
        Ok(())
    }

    fn lock(&self) -> Result<std::sync::MutexGuard<'_, Connection>> {
        self.conn
            .lock()
            .map_err(|_| MarketError::Storage("store mutex poisoned".to_string()))
    }
}

fn row_to_point(row: &rusqlite::Row<'_>) -> rusqlite::Result<PricePoint> {
    Ok(PricePoint {
        symbol: row.get(0)?,
        price: row.get(1)?,
        ts: row.get(2)?,
    })
}

fn row_to_event(row: &rusqlite::Row<'_>) -> rusqlite::Result<PriceEvent> {
    let kind: String = row.get(2)?;
    let kind = EventKind::parse(&kind).map_err(|_| {
        rusqlite::Error::FromSqlConversionFailure(
            2,
            rusqlite::types::Type::Text,
            format!("bad event kind: {}", kind).into(),
        )
    })?;
    Ok(PriceEvent {
        id: row.get(0)?,
        symbol: row.get(1)?,
        kind,
        baseline_price: row.get(3)?,
        created_at: row.get(4)?,
        resolved: row.get::<_, i64>(5)? != 0,
    })
}

impl PriceStore for SqliteStore {
    fn append(&self, point: &PricePoint) -> Result<()> {
        let conn = self.lock()?;
        conn.execute(
            "INSERT INTO price_points (symbol, price, ts) VALUES (?1, ?2, ?3)",
            params![point.symbol, point.price, point.ts],
        )?;
        Ok(())
    }

    fn append_many(&self, points: &[PricePoint]) -> Result<usize> {
        let mut conn = self.lock()?;
        let mut written = 0;
        for chunk in points.chunks(self.insert_batch) {
            let tx = conn.transaction()?;
            for point in chunk {
                tx.execute(
                    "INSERT INTO price_points (symbol, price, ts) VALUES (?1, ?2, ?3)",
                    params![point.symbol, point.price, point.ts],
                )?;
            }
            tx.commit()?;
            written += chunk.len();
        }
        Ok(written)
    }

    fn latest(&self, symbol: &str) -> Result<Option<PricePoint>> {
        let conn = self.lock()?;
        let point = conn
            .query_row(
                "SELECT symbol, price, ts FROM price_points
                 WHERE symbol = ?1 ORDER BY ts DESC LIMIT 1",
                params![symbol],
                row_to_point,
            )
            .optional()?;
        Ok(point)
    }

    fn earliest(&self, symbol: &str) -> Result<Option<PricePoint>> {
        let conn = self.lock()?;
        let point = conn
            .query_row(
                "SELECT symbol, price, ts FROM price_points
                 WHERE symbol = ?1 ORDER BY ts ASC LIMIT 1",
                params![symbol],
                row_to_point,
            )
            .optional()?;
        Ok(point)
    }

    fn at_or_before(&self, symbol: &str, ts: i64) -> Result<Option<PricePoint>> {
        let conn = self.lock()?;
        let point = conn
            .query_row(
                "SELECT symbol, price, ts FROM price_points
                 WHERE symbol = ?1 AND ts <= ?2 ORDER BY ts DESC LIMIT 1",
                params![symbol, ts],
                row_to_point,
            )
            .optional()?;
        Ok(point)
    }

    fn since(&self, symbol: &str, from_ts: i64) -> Result<Vec<PricePoint>> {
        let conn = self.lock()?;
        let mut stmt = conn.prepare(
            "SELECT symbol, price, ts FROM price_points
             WHERE symbol = ?1 AND ts >= ?2 ORDER BY ts ASC",
        )?;
        let rows = stmt.query_map(params![symbol, from_ts], row_to_point)?;
        let mut points = Vec::new();
        for row in rows {
            points.push(row?);
        }
        Ok(points)
    }
}

impl EventStore for SqliteStore {
    fn create(
        &self,
        symbol: &str,
        kind: EventKind,
        baseline_price: f64,
        created_at: i64,
    ) -> Result<PriceEvent> {
        let conn = self.lock()?;
        conn.execute(
            "INSERT INTO price_events (symbol, kind, baseline_price, created_at, resolved)
             VALUES (?1, ?2, ?3, ?4, 0)",
            params![symbol, kind.as_str(), baseline_price, created_at],
        )?;
        let id = conn.last_insert_rowid();
        Ok(PriceEvent {
            id,
            symbol: symbol.to_string(),
            kind,
            baseline_price,
            created_at,
            resolved: false,
        })
    }

    fn active(&self, symbol: &str, kind: EventKind) -> Result<Option<PriceEvent>> {
        let conn = self.lock()?;
        let event = conn
            .query_row(
                "SELECT id, symbol, kind, baseline_price, created_at, resolved
                 FROM price_events
                 WHERE symbol = ?1 AND kind = ?2 AND resolved = 0
                 ORDER BY created_at DESC, id DESC LIMIT 1",
                params![symbol, kind.as_str()],
                row_to_event,
            )
            .optional()?;
        Ok(event)
    }

    fn resolve(&self, id: i64) -> Result<()> {
        let conn = self.lock()?;
        conn.execute("UPDATE price_events SET resolved = 1 WHERE id = ?1", params![id])?;
        Ok(())
    }

    fn list(&self, symbol: Option<&str>) -> Result<Vec<PriceEvent>> {
        let conn = self.lock()?;
        let mut events = Vec::new();
        match symbol {
            Some(symbol) => {
                let mut stmt = conn.prepare(
                    "SELECT id, symbol, kind, baseline_price, created_at, resolved
                     FROM price_events WHERE symbol = ?1 ORDER BY created_at ASC, id ASC",
                )?;
                let rows = stmt.query_map(params![symbol], row_to_event)?;
                for row in rows {
                    events.push(row?);
                }
            }
            None => {
                let mut stmt = conn.prepare(
                    "SELECT id, symbol, kind, baseline_price, created_at, resolved
                     FROM price_events ORDER BY created_at ASC, id ASC",
                )?;
                let rows = stmt.query_map([], row_to_event)?;
                for row in rows {
                    events.push(row?);
                }
            }
        }
        Ok(events)
    }
}
