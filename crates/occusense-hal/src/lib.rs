//! `occusense-hal` – the boundary between the occupancy engine and the
//! outside world.
//!
//! # Modules
//!
//! - [`frame`] – [`FrameNormalizer`][frame::FrameNormalizer]: decodes encoded
//!   image bytes and resizes them into a bounded
//!   [`NormalizedFrame`][frame::NormalizedFrame].
//! - [`detector`] – [`RegionDetector`][detector::RegionDetector]: the uniform
//!   contract every external person/face detector is plugged in through.
//! - [`remote`] – [`HttpRegionDetector`][remote::HttpRegionDetector]: a
//!   detector backed by an HTTP detection service.
//! - [`source`] – [`FrameSource`][source::FrameSource]: producers of encoded
//!   frames, with a directory-backed implementation.

pub mod detector;
pub mod frame;
pub mod remote;
pub mod source;

pub use detector::{Region, RegionDetector};
pub use frame::{FrameNormalizer, NormalizedFrame};
