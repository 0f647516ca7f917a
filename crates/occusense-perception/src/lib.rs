//! `occusense-perception` – multi-signal occupancy fusion.
//!
//! Turns the noisy per-frame counts of several independent detectors into a
//! single, stable, confidence-scored occupancy estimate.
//!
//! # Modules
//!
//! - [`fusion`] – [`fuse`][fusion::fuse]: weighted blend with a max-guard,
//!   plus a confidence score derived from detector disagreement.
//! - [`smoother`] – [`RollingSmoother`][smoother::RollingSmoother]: bounded
//!   FIFO window averaging recent fused counts.
//! - [`motion`] – [`MotionDetector`][motion::MotionDetector]: background
//!   model and moving-region counter.
//! - [`engine`] – [`OccupancyEngine`][engine::OccupancyEngine]: owns the
//!   per-stream state and runs one frame through the whole chain.
//! - [`config`] – [`EngineConfig`][config::EngineConfig].

pub mod config;
pub mod engine;
pub mod fusion;
pub mod motion;
pub mod smoother;

pub use config::EngineConfig;
pub use engine::{EnginePhase, FrameFailure, OccupancyEngine};
