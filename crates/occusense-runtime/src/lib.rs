//! `occusense-runtime` – runs occupancy engines against live streams.
//!
//! # Modules
//!
//! - [`worker`] – [`StreamWorker`][worker::StreamWorker]: gives each stream
//!   its own engine behind a single-consumer queue so frames of one stream
//!   are processed strictly one at a time.
//! - [`bus`] – [`ReadingBus`][bus::ReadingBus]: broadcasts every reading to
//!   any number of consumers (storage, dashboards, …).
//! - [`telemetry`] – [`init_tracing`][telemetry::init_tracing]: initialises
//!   the global `tracing` subscriber with an optional OTLP span exporter.

pub mod bus;
pub mod telemetry;
pub mod worker;

pub use bus::{ReadingBus, ReadingReceiver};
pub use telemetry::{TracerProviderGuard, init_tracing};
pub use worker::{StreamHandle, StreamWorker, WorkerSummary};
