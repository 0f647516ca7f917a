//! Reading Store.
//!
//! Persists [`ReadingEvent`]s to a local SQLite database.
//!
//! # Storage layout
//!
//! A single table `occupancy_readings` is created (if it does not already
//! exist) with the following columns:
//!
//! | column      | type    | description                                  |
//! |-------------|---------|----------------------------------------------|
//! | id          | TEXT    | UUID v4 primary key                          |
//! | stream_id   | TEXT    | Camera/stream the reading belongs to         |
//! | timestamp   | TEXT    | RFC-3339 capture time (UTC, microseconds)    |
//! | count       | INTEGER | Smoothed occupant count                      |
//! | confidence  | REAL    | Fusion confidence                            |
//! | method      | TEXT    | `combined` or `error`                        |
//! | frame       | BLOB    | Encoded frame, only when frames are kept     |
//!
//! Error readings are stored like any other, but queries skip them: they
//! mark frames that could not be analysed, not empty rooms.
//!
//! Databases created before the `frame` column existed gain it on open.
//!
//! # Example
//!
//! ```rust
//! use chrono::{Duration, Utc};
//! use occusense_memory::ReadingStore;
//! use occusense_types::{DetectionMethod, OccupancyReading, ReadingEvent};
//!
//! let store = ReadingStore::open_in_memory().unwrap();
//! let reading = OccupancyReading {
//!     count: 4,
//!     confidence: 0.8,
//!     method: DetectionMethod::Combined,
//!     timestamp: Utc::now(),
//! };
//! store.record(&ReadingEvent::new("front-door", reading)).unwrap();
//!
//! let stats = store.stats_since(Utc::now() - Duration::hours(1)).unwrap();
//! assert_eq!(stats.max_occupancy, 4);
//! ```

use chrono::{DateTime, SecondsFormat, Utc};
use occusense_types::{DetectionMethod, OccupancyReading, ReadingEvent};
use rusqlite::{Connection, OptionalExtension, Row, params};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::debug;
use uuid::Uuid;

// ─────────────────────────────────────────────────────────────────────────────
// Error type
// ─────────────────────────────────────────────────────────────────────────────

/// Errors that can arise from reading store operations.
#[derive(Error, Debug)]
pub enum StoreError {
    #[error("SQLite error: {0}")]
    Sqlite(#[from] rusqlite::Error),
    #[error("Corrupt row in column {column}: {details}")]
    CorruptRow { column: &'static str, details: String },
}

// ─────────────────────────────────────────────────────────────────────────────
// ReadingStats
// ─────────────────────────────────────────────────────────────────────────────

/// Aggregate over the readings of a time window.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ReadingStats {
    /// All readings in the window, error readings included.
    pub total_readings: u64,
    /// Readings in the window that stand in for failed frames.
    pub error_readings: u64,
    /// Mean smoothed count over non-error readings, two decimals.
    pub average_occupancy: f64,
    /// Largest smoothed count over non-error readings.
    pub max_occupancy: u32,
    /// Mean confidence over non-error readings, two decimals.
    pub average_confidence: f64,
}

/// An encoded frame kept alongside its reading.
#[derive(Debug, Clone, PartialEq)]
pub struct StoredFrame {
    /// Id of the reading computed from this frame.
    pub id: Uuid,
    pub timestamp: DateTime<Utc>,
    pub bytes: Vec<u8>,
}

/// Fixed-width RFC-3339 so that text order matches time order.
fn format_timestamp(ts: &DateTime<Utc>) -> String {
    ts.to_rfc3339_opts(SecondsFormat::Micros, true)
}

fn round2(value: f64) -> f64 {
    (value * 100.0).round() / 100.0
}

// ─────────────────────────────────────────────────────────────────────────────
// ReadingStore
// ─────────────────────────────────────────────────────────────────────────────

/// SQLite-backed reading log.
pub struct ReadingStore {
    conn: Connection,
}

impl ReadingStore {
    /// Open (or create) a persistent SQLite database at `path`.
    pub fn open(path: &str) -> Result<Self, StoreError> {
        let conn = Connection::open(path)?;
        let store = Self { conn };
        store.init_schema()?;
        Ok(store)
    }

    /// Open a temporary in-memory database (useful for testing).
    pub fn open_in_memory() -> Result<Self, StoreError> {
        let conn = Connection::open_in_memory()?;
        let store = Self { conn };
        store.init_schema()?;
        Ok(store)
    }

    fn init_schema(&self) -> Result<(), StoreError> {
        self.conn.execute_batch(
            "CREATE TABLE IF NOT EXISTS occupancy_readings (
                id         TEXT NOT NULL PRIMARY KEY,
                stream_id  TEXT NOT NULL,
                timestamp  TEXT NOT NULL,
                count      INTEGER NOT NULL,
                confidence REAL NOT NULL,
                method     TEXT NOT NULL,
                frame      BLOB
            );
            CREATE INDEX IF NOT EXISTS idx_readings_stream_time
                ON occupancy_readings (stream_id, timestamp);",
        )?;

        let has_frame_column = self
            .conn
            .prepare("SELECT 1 FROM pragma_table_info('occupancy_readings') WHERE name = 'frame'")?
            .exists([])?;
        if !has_frame_column {
            debug!("adding frame column to occupancy_readings");
            self.conn
                .execute_batch("ALTER TABLE occupancy_readings ADD COLUMN frame BLOB;")?;
        }
        Ok(())
    }

    /// Persist a reading.
    pub fn record(&self, event: &ReadingEvent) -> Result<(), StoreError> {
        self.record_with_frame(event, None)
    }

    /// Persist a reading together with the encoded frame it was computed
    /// from. `None` stores the reading alone.
    pub fn record_with_frame(
        &self,
        event: &ReadingEvent,
        frame: Option<&[u8]>,
    ) -> Result<(), StoreError> {
        let reading = &event.reading;
        self.conn.execute(
            "INSERT OR REPLACE INTO occupancy_readings
                 (id, stream_id, timestamp, count, confidence, method, frame)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)",
            params![
                event.id.to_string(),
                event.stream_id,
                format_timestamp(&reading.timestamp),
                reading.count,
                reading.confidence,
                reading.method.as_str(),
                frame,
            ],
        )?;
        debug!(
            stream = %event.stream_id,
            count = reading.count,
            method = %reading.method,
            frame_bytes = frame.map_or(0, <[u8]>::len),
            "reading recorded"
        );
        Ok(())
    }

    /// The newest stored frame of `stream_id`, whatever its reading's
    /// method. `None` when no frame has been kept for the stream.
    pub fn latest_frame(&self, stream_id: &str) -> Result<Option<StoredFrame>, StoreError> {
        let raw = self
            .conn
            .query_row(
                "SELECT id, timestamp, frame
                 FROM occupancy_readings
                 WHERE stream_id = ?1 AND frame IS NOT NULL
                 ORDER BY timestamp DESC
                 LIMIT 1",
                params![stream_id],
                |row| {
                    Ok((
                        row.get::<_, String>(0)?,
                        row.get::<_, String>(1)?,
                        row.get::<_, Vec<u8>>(2)?,
                    ))
                },
            )
            .optional()?;
        let Some((id, timestamp, bytes)) = raw else {
            return Ok(None);
        };
        Ok(Some(StoredFrame {
            id: parse_id(&id)?,
            timestamp: parse_timestamp(&timestamp)?,
            bytes,
        }))
    }

    /// The newest non-error reading of `stream_id`, if any.
    pub fn latest(&self, stream_id: &str) -> Result<Option<ReadingEvent>, StoreError> {
        let raw = self
            .conn
            .query_row(
                "SELECT id, stream_id, timestamp, count, confidence, method
                 FROM occupancy_readings
                 WHERE stream_id = ?1 AND method != ?2
                 ORDER BY timestamp DESC
                 LIMIT 1",
                params![stream_id, DetectionMethod::Error.as_str()],
                RawRow::from_row,
            )
            .optional()?;
        raw.map(RawRow::into_event).transpose()
    }

    /// Every reading of `stream_id`, error readings included, oldest first.
    pub fn readings(&self, stream_id: &str) -> Result<Vec<ReadingEvent>, StoreError> {
        let mut stmt = self.conn.prepare(
            "SELECT id, stream_id, timestamp, count, confidence, method
             FROM occupancy_readings
             WHERE stream_id = ?1
             ORDER BY timestamp ASC",
        )?;
        let rows = stmt.query_map(params![stream_id], RawRow::from_row)?;
        let mut events = Vec::new();
        for row in rows {
            events.push(row?.into_event()?);
        }
        Ok(events)
    }

    /// Aggregate all readings captured at or after `since`.
    pub fn stats_since(&self, since: DateTime<Utc>) -> Result<ReadingStats, StoreError> {
        let since = format_timestamp(&since);
        let error_tag = DetectionMethod::Error.as_str();

        let (total, errors): (i64, i64) = self.conn.query_row(
            "SELECT COUNT(*), COALESCE(SUM(method = ?2), 0)
             FROM occupancy_readings
             WHERE timestamp >= ?1",
            params![since, error_tag],
            |row| Ok((row.get(0)?, row.get(1)?)),
        )?;

        let (avg_count, max_count, avg_conf): (Option<f64>, Option<i64>, Option<f64>) =
            self.conn.query_row(
                "SELECT AVG(count), MAX(count), AVG(confidence)
                 FROM occupancy_readings
                 WHERE timestamp >= ?1 AND method != ?2",
                params![since, error_tag],
                |row| Ok((row.get(0)?, row.get(1)?, row.get(2)?)),
            )?;

        Ok(ReadingStats {
            total_readings: total.max(0) as u64,
            error_readings: errors.max(0) as u64,
            average_occupancy: round2(avg_count.unwrap_or(0.0)),
            max_occupancy: max_count.unwrap_or(0).clamp(0, i64::from(u32::MAX)) as u32,
            average_confidence: round2(avg_conf.unwrap_or(0.0)),
        })
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Row decoding
// ─────────────────────────────────────────────────────────────────────────────

struct RawRow {
    id: String,
    stream_id: String,
    timestamp: String,
    count: u32,
    confidence: f64,
    method: String,
}

impl RawRow {
    fn from_row(row: &Row<'_>) -> rusqlite::Result<Self> {
        Ok(Self {
            id: row.get(0)?,
            stream_id: row.get(1)?,
            timestamp: row.get(2)?,
            count: row.get(3)?,
            confidence: row.get(4)?,
            method: row.get(5)?,
        })
    }

    fn into_event(self) -> Result<ReadingEvent, StoreError> {
        let id = parse_id(&self.id)?;
        let timestamp = parse_timestamp(&self.timestamp)?;
        let method = self
            .method
            .parse::<DetectionMethod>()
            .map_err(|e| StoreError::CorruptRow {
                column: "method",
                details: e.to_string(),
            })?;
        Ok(ReadingEvent {
            id,
            stream_id: self.stream_id,
            reading: OccupancyReading {
                count: self.count,
                confidence: self.confidence,
                method,
                timestamp,
            },
        })
    }
}

fn parse_id(raw: &str) -> Result<Uuid, StoreError> {
    Uuid::parse_str(raw).map_err(|e| StoreError::CorruptRow {
        column: "id",
        details: e.to_string(),
    })
}

fn parse_timestamp(raw: &str) -> Result<DateTime<Utc>, StoreError> {
    raw.parse::<DateTime<Utc>>()
        .map_err(|e| StoreError::CorruptRow {
            column: "timestamp",
            details: e.to_string(),
        })
}

// ─────────────────────────────────────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────────────────────────────────────
