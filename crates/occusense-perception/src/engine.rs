//! [`OccupancyEngine`] – the per-stream occupancy estimator.
//!
//! Each call to [`OccupancyEngine::process_frame`] runs one frame through the
//! full chain:
//!
//! 1. **Normalize** – decode and resize the encoded frame.
//! 2. **Detect** – person and face counts from the external detectors, then
//!    the motion count against the previous frame's background model.
//! 3. **Fuse** – combine the three counts into a [`FusedEstimate`].
//! 4. **Smooth** – push the fused count into the rolling window.
//! 5. **Remember** – keep the frame as the previous frame for the next call.
//!
//! # State and concurrency
//!
//! The engine owns the previous frame, the background model and the history
//! window. All three are mutated through `&mut self`, so at most one frame is
//! ever in flight per engine; run one engine per camera/stream.
//!
//! A failed call leaves all three untouched: the only fallible steps
//! (normalization, person and face detection) run before anything is
//! mutated.
//!
//! # Example
//!
//! ```rust
//! use occusense_hal::{NormalizedFrame, Region, RegionDetector};
//! use occusense_perception::config::EngineConfig;
//! use occusense_perception::engine::OccupancyEngine;
//! use occusense_types::{DetectionMethod, OccuError};
//!
//! struct Nobody;
//!
//! impl RegionDetector for Nobody {
//!     fn name(&self) -> &str { "nobody" }
//!     fn detect(&mut self, _: &NormalizedFrame) -> Result<Vec<Region>, OccuError> {
//!         Ok(Vec::new())
//!     }
//! }
//!
//! let mut engine = OccupancyEngine::new(EngineConfig::default(), Nobody, Nobody).unwrap();
//! let reading = engine.process_frame(b"not an image");
//! assert_eq!(reading.method, DetectionMethod::Error);
//! ```

use chrono::{DateTime, Utc};
use occusense_hal::{FrameNormalizer, NormalizedFrame, RegionDetector};
use occusense_types::{DetectionMethod, OccuError, OccupancyReading};
use tracing::{debug, error, info};

use crate::config::EngineConfig;
use crate::fusion::{FrameSignals, FusedEstimate, fuse};
use crate::motion::{BackgroundModel, MotionDetector};
use crate::smoother::RollingSmoother;

// ─────────────────────────────────────────────────────────────────────────────
// Public types
// ─────────────────────────────────────────────────────────────────────────────

/// Lifecycle of an engine. There is no way back to `Cold` short of building a
/// new engine.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EnginePhase {
    /// No frame has been processed successfully yet.
    Cold,
    /// A previous frame is held and the history window is non-empty.
    Warm,
}

/// Why a frame produced no reading.
#[derive(Debug, Clone)]
pub struct FrameFailure {
    error: OccuError,
    timestamp: DateTime<Utc>,
}

impl FrameFailure {
    fn new(error: OccuError) -> Self {
        Self {
            error,
            timestamp: Utc::now(),
        }
    }

    pub fn error(&self) -> &OccuError {
        &self.error
    }

    /// The zero-confidence reading that stands in for the failed frame.
    pub fn degraded_reading(&self) -> OccupancyReading {
        OccupancyReading {
            count: 0,
            confidence: 0.0,
            method: DetectionMethod::Error,
            timestamp: self.timestamp,
        }
    }
}

impl std::fmt::Display for FrameFailure {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        std::fmt::Display::fmt(&self.error, f)
    }
}

impl std::error::Error for FrameFailure {}

/// Everything the engine computed for the most recent successful frame.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct FrameTrace {
    pub signals: FrameSignals,
    pub estimate: FusedEstimate,
    pub smoothed: u32,
}

// ─────────────────────────────────────────────────────────────────────────────
// Engine state
// ─────────────────────────────────────────────────────────────────────────────

/// Mutable state carried from one frame to the next.
#[derive(Debug, Default)]
struct EngineState {
    previous_frame: Option<NormalizedFrame>,
    motion: MotionDetector,
    smoother: RollingSmoother,
    last_trace: Option<FrameTrace>,
}

// ─────────────────────────────────────────────────────────────────────────────
// OccupancyEngine
// ─────────────────────────────────────────────────────────────────────────────

/// Fuses person, face and motion signals into a smoothed occupancy reading.
///
/// `P` and `F` are the person and face detectors.
pub struct OccupancyEngine<P, F> {
    config: EngineConfig,
    normalizer: FrameNormalizer,
    person: P,
    face: F,
    state: EngineState,
}

impl<P: RegionDetector, F: RegionDetector> OccupancyEngine<P, F> {
    /// Build a cold engine.
    ///
    /// # Errors
    ///
    /// Returns [`OccuError::Config`] when `config` fails validation.
    pub fn new(config: EngineConfig, person: P, face: F) -> Result<Self, OccuError> {
        config.validate()?;
        let state = EngineState {
            previous_frame: None,
            motion: MotionDetector::new(config.motion),
            smoother: RollingSmoother::new(config.history_capacity),
            last_trace: None,
        };
        Ok(Self {
            normalizer: FrameNormalizer::new(config.max_dimension),
            config,
            person,
            face,
            state,
        })
    }

    /// Process one encoded frame, never failing.
    ///
    /// Any failure is logged and turned into the degraded reading
    /// (`count = 0`, `confidence = 0.0`, `method = error`) so a single bad
    /// frame never halts the stream.
    pub fn process_frame(&mut self, bytes: &[u8]) -> OccupancyReading {
        match self.try_process_frame(bytes) {
            Ok(reading) => reading,
            Err(failure) => {
                error!(error = %failure, "Error in occupancy detection");
                failure.degraded_reading()
            }
        }
    }

    /// Process one encoded frame.
    ///
    /// # Errors
    ///
    /// Returns a [`FrameFailure`] when the frame cannot be decoded or a
    /// detector fails. Engine state is unchanged in that case.
    pub fn try_process_frame(&mut self, bytes: &[u8]) -> Result<OccupancyReading, FrameFailure> {
        let frame = self.normalizer.normalize(bytes).map_err(FrameFailure::new)?;

        let person_count = self.person.count(&frame).map_err(FrameFailure::new)?;
        let face_count = self.face.count(&frame).map_err(FrameFailure::new)?;
        // Past this point nothing can fail, so state may be mutated.
        let motion_count = self
            .state
            .motion
            .count(self.state.previous_frame.as_ref(), &frame);

        let signals = FrameSignals {
            person_count,
            face_count,
            motion_count,
        };
        let estimate = fuse(signals, &self.config.weights);
        let smoothed = self.state.smoother.push(estimate.count);

        debug!(
            person = person_count,
            face = face_count,
            motion = motion_count,
            fused = estimate.count,
            confidence = estimate.confidence,
            smoothed,
            "frame fused"
        );

        let was_cold = self.state.previous_frame.is_none();
        self.state.previous_frame = Some(frame);
        self.state.last_trace = Some(FrameTrace {
            signals,
            estimate,
            smoothed,
        });
        if was_cold {
            info!("occupancy engine warmed up");
        }

        Ok(OccupancyReading {
            count: smoothed,
            confidence: estimate.confidence,
            method: DetectionMethod::Combined,
            timestamp: Utc::now(),
        })
    }

    pub fn phase(&self) -> EnginePhase {
        if self.state.previous_frame.is_some() {
            EnginePhase::Warm
        } else {
            EnginePhase::Cold
        }
    }

    /// Fused counts currently in the smoothing window, oldest first.
    pub fn history(&self) -> Vec<u32> {
        self.state.smoother.samples().collect()
    }

    pub fn background(&self) -> &BackgroundModel {
        self.state.motion.model()
    }

    pub fn previous_frame(&self) -> Option<&NormalizedFrame> {
        self.state.previous_frame.as_ref()
    }

    /// Signals and estimates of the most recent successful frame.
    pub fn last_trace(&self) -> Option<FrameTrace> {
        self.state.last_trace
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;
    use crate::motion::MotionConfig;
    use image::{DynamicImage, GrayImage, ImageFormat, Luma};
    use occusense_hal::Region;
    use std::collections::VecDeque;
    use std::io::Cursor;

    const SIZE: u32 = 64;

    /// Detector replaying a scripted sequence of counts or failures.
    struct Scripted {
        name: &'static str,
        script: VecDeque<Result<u32, OccuError>>,
        calls: usize,
    }

    impl Scripted {
        fn counts(name: &'static str, counts: &[u32]) -> Self {
            Self {
                name,
                script: counts.iter().map(|&c| Ok(c)).collect(),
                calls: 0,
            }
        }

        fn with(name: &'static str, script: Vec<Result<u32, OccuError>>) -> Self {
            Self {
                name,
                script: script.into(),
                calls: 0,
            }
        }
    }

    impl RegionDetector for Scripted {
        fn name(&self) -> &str {
            self.name
        }

        fn detect(&mut self, _frame: &NormalizedFrame) -> Result<Vec<Region>, OccuError> {
            self.calls += 1;
            let n = self.script.pop_front().unwrap_or(Ok(0))?;
            let region = Region {
                x: 0,
                y: 0,
                width: 1,
                height: 1,
                score: 1.0,
            };
            Ok(vec![region; n as usize])
        }
    }

    fn png(blobs: &[(u32, u32, u32)]) -> Vec<u8> {
        let mut img = GrayImage::from_pixel(SIZE, SIZE, Luma([40]));
        for &(bx, by, size) in blobs {
            for y in by..by + size {
                for x in bx..bx + size {
                    img.put_pixel(x, y, Luma([250]));
                }
            }
        }
        let mut out = Cursor::new(Vec::new());
        DynamicImage::ImageLuma8(img)
            .write_to(&mut out, ImageFormat::Png)
            .unwrap();
        out.into_inner()
    }

    fn config() -> EngineConfig {
        EngineConfig {
            max_dimension: SIZE,
            motion: MotionConfig {
                min_area: 10.0,
                ..MotionConfig::default()
            },
            ..EngineConfig::default()
        }
    }

    fn engine(person: Scripted, face: Scripted) -> OccupancyEngine<Scripted, Scripted> {
        OccupancyEngine::new(config(), person, face).unwrap()
    }

    // ── Lifecycle ───────────────────────────────────────────────────────────

    #[test]
    fn new_engine_is_cold() {
        let eng = engine(Scripted::counts("person", &[]), Scripted::counts("face", &[]));
        assert_eq!(eng.phase(), EnginePhase::Cold);
        assert!(eng.history().is_empty());
        assert!(eng.previous_frame().is_none());
        assert!(eng.last_trace().is_none());
    }

    #[test]
    fn first_empty_frame_warms_engine() {
        let mut eng = engine(Scripted::counts("person", &[0]), Scripted::counts("face", &[0]));
        let reading = eng.try_process_frame(&png(&[])).unwrap();
        assert_eq!(reading.count, 0);
        assert_eq!(reading.confidence, 1.0);
        assert_eq!(reading.method, DetectionMethod::Combined);
        assert_eq!(eng.history(), vec![0]);
        assert_eq!(eng.phase(), EnginePhase::Warm);
        // Motion is not consulted without a previous frame.
        assert!(!eng.background().is_seeded());
    }

    #[test]
    fn single_frame_reading_equals_fused_count() {
        let mut eng = engine(Scripted::counts("person", &[4]), Scripted::counts("face", &[3]));
        let reading = eng.process_frame(&png(&[]));
        let trace = eng.last_trace().unwrap();
        assert_eq!(trace.estimate.count, 4);
        assert_eq!(reading.count, 4);
    }

    // ── Fusion and smoothing end to end ─────────────────────────────────────

    #[test]
    fn motion_region_enters_fusion() {
        let mut eng = engine(
            Scripted::counts("person", &[0, 0, 3]),
            Scripted::counts("face", &[0, 0, 2]),
        );
        eng.process_frame(&png(&[]));
        eng.process_frame(&png(&[]));
        let reading = eng.process_frame(&png(&[(20, 20, 12)]));

        let trace = eng.last_trace().unwrap();
        assert_eq!(
            trace.signals,
            FrameSignals {
                person_count: 3,
                face_count: 2,
                motion_count: 1
            }
        );
        assert_eq!(trace.estimate.count, 3);
        assert!((reading.confidence - 0.5).abs() < 1e-6);
        // Window [0, 0, 3] → ⌊3 / 3⌋.
        assert_eq!(reading.count, 1);
    }

    #[test]
    fn outlier_is_damped_and_evicted_fifo() {
        let counts = [2, 2, 2, 2, 10, 0];
        let mut eng = engine(
            Scripted::counts("person", &counts),
            Scripted::counts("face", &counts),
        );
        let frame = png(&[]);
        let readings: Vec<u32> = counts.iter().map(|_| eng.process_frame(&frame).count).collect();

        assert_eq!(readings[4], 3); // ⌊18 / 5⌋
        assert_eq!(readings[5], 3); // ⌊16 / 5⌋
        assert_eq!(eng.history(), vec![2, 2, 2, 10, 0]);
    }

    #[test]
    fn history_never_exceeds_capacity() {
        let mut eng = engine(Scripted::counts("person", &[1; 20]), Scripted::counts("face", &[]));
        let frame = png(&[]);
        for _ in 0..20 {
            eng.process_frame(&frame);
            assert!(eng.history().len() <= 5);
        }
        assert_eq!(eng.history().len(), 5);
    }

    // ── Failure handling ────────────────────────────────────────────────────

    #[test]
    fn decode_failure_is_degraded_and_leaves_state_alone() {
        let mut eng = engine(
            Scripted::counts("person", &[1, 1, 1]),
            Scripted::counts("face", &[1, 1, 1]),
        );
        eng.process_frame(&png(&[]));
        eng.process_frame(&png(&[]));
        let history = eng.history();
        let frames_seen = eng.background().frames_seen();

        let reading = eng.process_frame(b"\xff\xd8 truncated jpeg");
        assert_eq!(reading.count, 0);
        assert_eq!(reading.confidence, 0.0);
        assert_eq!(reading.method, DetectionMethod::Error);
        assert!(reading.is_degraded());

        assert_eq!(eng.history(), history);
        assert_eq!(eng.background().frames_seen(), frames_seen);
        // Detectors never saw the bad frame.
        assert_eq!(eng.person.calls, 2);
    }

    #[test]
    fn decode_failure_on_cold_engine_stays_cold() {
        let mut eng = engine(Scripted::counts("person", &[]), Scripted::counts("face", &[]));
        let failure = eng.try_process_frame(&[]).unwrap_err();
        assert!(matches!(failure.error(), OccuError::Decode(_)));
        assert_eq!(eng.phase(), EnginePhase::Cold);
        assert!(eng.history().is_empty());
    }

    #[test]
    fn detector_failure_is_degraded_and_leaves_state_alone() {
        let fault = OccuError::Detector {
            detector: "face".to_string(),
            details: "timeout".to_string(),
        };
        let mut eng = engine(
            Scripted::counts("person", &[1, 1, 1]),
            Scripted::with("face", vec![Ok(1), Ok(1), Err(fault.clone())]),
        );
        eng.process_frame(&png(&[]));
        eng.process_frame(&png(&[]));
        let history = eng.history();
        let frames_seen = eng.background().frames_seen();
        let previous = eng.previous_frame().map(|f| f.gray().clone());

        let failure = eng.try_process_frame(&png(&[(5, 5, 20)])).unwrap_err();
        assert_eq!(failure.error(), &fault);
        let degraded = failure.degraded_reading();
        assert_eq!(degraded.method, DetectionMethod::Error);
        assert_eq!(degraded.confidence, 0.0);

        assert_eq!(eng.history(), history);
        assert_eq!(eng.background().frames_seen(), frames_seen);
        assert_eq!(eng.previous_frame().map(|f| f.gray().clone()), previous);
    }

    #[test]
    fn failure_is_distinguishable_from_empty_room() {
        let mut eng = engine(Scripted::counts("person", &[0]), Scripted::counts("face", &[0]));
        let empty = eng.process_frame(&png(&[]));
        let failed = eng.process_frame(b"garbage");
        assert_eq!(empty.count, failed.count);
        assert!(!empty.is_degraded());
        assert!(failed.is_degraded());
    }

    #[test]
    fn invalid_config_is_rejected() {
        let cfg = EngineConfig {
            history_capacity: 0,
            ..EngineConfig::default()
        };
        let result = OccupancyEngine::new(
            cfg,
            Scripted::counts("person", &[]),
            Scripted::counts("face", &[]),
        );
        assert!(matches!(result, Err(OccuError::Config(_))));
    }
}
