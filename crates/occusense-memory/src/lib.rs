//! `occusense-memory` – the reading log.
//!
//! Persists every occupancy reading to a local SQLite database and answers
//! the questions operators ask of it: what is the latest trustworthy reading
//! for a stream, and how busy has it been recently.
//!
//! # Modules
//!
//! - [`readings`] – [`ReadingStore`][readings::ReadingStore]: append-only
//!   reading log with latest-reading, latest-frame and windowed statistics
//!   queries.

pub mod readings;

pub use readings::{ReadingStats, ReadingStore, StoreError, StoredFrame};
