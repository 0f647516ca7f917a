//! Disagreement-Aware Fusion.
//!
//! Combines the three per-frame detector counts into one instantaneous
//! [`FusedEstimate`] and scores how much the methods agree.
//!
//! The fused count is a weighted blend guarded from below by the stronger of
//! the two precision-oriented detectors:
//!
//! ```text
//! blended = ⌊w_p·person + w_f·face + w_m·motion⌋
//! count   = max(blended, max(person, face))
//! ```
//!
//! Motion never takes part in the floor: it is the noisiest signal and may
//! not drag the fused count below what person or face detection reports.
//!
//! Confidence falls with the largest pairwise disagreement:
//!
//! ```text
//! confidence = 1 − max_diff / (count + 1)   if count > 0
//! confidence = 1                            if count = 0
//! ```
//!
//! No clamping is applied, so a large disagreement against a small fused
//! count yields a negative confidence.
//!
//! # Example
//!
//! ```rust
//! use occusense_perception::fusion::{FrameSignals, FusionWeights, fuse};
//!
//! let estimate = fuse(
//!     FrameSignals { person_count: 3, face_count: 2, motion_count: 1 },
//!     &FusionWeights::default(),
//! );
//! assert_eq!(estimate.count, 3);
//! assert!((estimate.confidence - 0.5).abs() < 1e-6);
//! ```

use serde::{Deserialize, Serialize};

// ────────────────────────────────────────────────────────────────────────────
// Input / output types
// ────────────────────────────────────────────────────────────────────────────

/// Per-frame counts reported by the three detection methods.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct FrameSignals {
    pub person_count: u32,
    pub face_count: u32,
    pub motion_count: u32,
}

impl FrameSignals {
    /// Largest pairwise absolute difference among the three counts.
    pub fn disagreement(&self) -> u32 {
        let (p, f, m) = (self.person_count, self.face_count, self.motion_count);
        p.abs_diff(f).max(p.abs_diff(m)).max(f.abs_diff(m))
    }
}

/// Instantaneous fused value for one frame, before temporal smoothing.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct FusedEstimate {
    pub count: u32,
    pub confidence: f64,
}

/// Blend weights applied to each detection method.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct FusionWeights {
    pub person: f64,
    pub face: f64,
    pub motion: f64,
}

impl Default for FusionWeights {
    fn default() -> Self {
        Self {
            person: 0.4,
            face: 0.4,
            motion: 0.2,
        }
    }
}

impl FusionWeights {
    /// `true` when every weight is finite and non-negative and at least one
    /// is positive.
    pub fn is_valid(&self) -> bool {
        let all = [self.person, self.face, self.motion];
        all.iter().all(|w| w.is_finite() && *w >= 0.0) && all.iter().any(|w| *w > 0.0)
    }
}

// ────────────────────────────────────────────────────────────────────────────
// Fusion
// ────────────────────────────────────────────────────────────────────────────

/// Fuse one frame's signals into a [`FusedEstimate`].
pub fn fuse(signals: FrameSignals, weights: &FusionWeights) -> FusedEstimate {
    let blended = weights.person * f64::from(signals.person_count)
        + weights.face * f64::from(signals.face_count)
        + weights.motion * f64::from(signals.motion_count);
    // `as` truncates toward zero and saturates at the u32 bounds.
    let blended = blended as u32;

    let strongest = signals.person_count.max(signals.face_count);
    let count = blended.max(strongest);

    let confidence = if count > 0 {
        1.0 - f64::from(signals.disagreement()) / (f64::from(count) + 1.0)
    } else {
        1.0
    };

    FusedEstimate { count, confidence }
}

// ────────────────────────────────────────────────────────────────────────────
// Tests
// ────────────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;

    fn signals(person: u32, face: u32, motion: u32) -> FrameSignals {
        FrameSignals {
            person_count: person,
            face_count: face,
            motion_count: motion,
        }
    }

    fn fuse_default(person: u32, face: u32, motion: u32) -> FusedEstimate {
        fuse(signals(person, face, motion), &FusionWeights::default())
    }

    #[test]
    fn mixed_counts_scenario() {
        // blended = ⌊1.2 + 0.8 + 0.2⌋ = 2, strongest = 3, max_diff = 2.
        let est = fuse_default(3, 2, 1);
        assert_eq!(est.count, 3);
        assert!((est.confidence - 0.5).abs() < 1e-6);
    }

    #[test]
    fn confidence_keeps_double_precision() {
        // blended = ⌊0.8 + 0.8⌋ = 1, strongest = 2, max_diff = 2 → 1 − 2/3.
        let est = fuse_default(2, 2, 0);
        assert_eq!(est.count, 2);
        assert_eq!(est.confidence, 1.0 - 2.0 / 3.0);
    }

    #[test]
    fn all_zero_is_full_confidence() {
        let est = fuse_default(0, 0, 0);
        assert_eq!(est.count, 0);
        assert_eq!(est.confidence, 1.0);
    }

    #[test]
    fn equal_counts_are_full_confidence() {
        for n in [1, 2, 5, 7, 13, 100, 1_000] {
            let est = fuse_default(n, n, n);
            assert_eq!(est.count, n, "fused count for ({n}, {n}, {n})");
            assert_eq!(est.confidence, 1.0);
        }
    }

    #[test]
    fn fused_count_never_below_stronger_detector() {
        for p in 0..8 {
            for f in 0..8 {
                for m in 0..8 {
                    let est = fuse_default(p, f, m);
                    assert!(est.count >= p.max(f), "({p}, {f}, {m}) -> {}", est.count);
                }
            }
        }
    }

    #[test]
    fn motion_alone_cannot_set_the_floor() {
        // blended = ⌊0.2 · 4⌋ = 0, strongest = 0.
        let est = fuse_default(0, 0, 4);
        assert_eq!(est.count, 0);
        // Zero fused count keeps full confidence by convention.
        assert_eq!(est.confidence, 1.0);
    }

    #[test]
    fn motion_can_raise_the_blend() {
        // blended = ⌊0.4 + 0.4 + 0.2 · 10⌋ = 2, strongest = 1.
        let est = fuse_default(1, 1, 10);
        assert_eq!(est.count, 2);
        // max_diff = 9 → 1 − 9/3 = −2.
        assert!((est.confidence + 2.0).abs() < 1e-6);
    }

    #[test]
    fn confidence_can_fall_below_zero() {
        // blended = ⌊0.2 · 5⌋ = 1 → count 1, max_diff 5 → 1 − 5/2.
        let est = fuse_default(0, 0, 5);
        assert_eq!(est.count, 1);
        assert!((est.confidence + 1.5).abs() < 1e-6);
    }

    #[test]
    fn confidence_decreases_as_disagreement_grows() {
        let mut last = f64::INFINITY;
        for face in 4..=8 {
            let est = fuse_default(4, face, 4);
            assert!(est.confidence < last || face == 4);
            last = est.confidence;
        }
    }

    #[test]
    fn disagreement_is_max_pairwise_difference() {
        assert_eq!(signals(3, 2, 1).disagreement(), 2);
        assert_eq!(signals(0, 9, 4).disagreement(), 9);
        assert_eq!(signals(5, 5, 5).disagreement(), 0);
    }

    #[test]
    fn custom_weights_change_the_blend() {
        let weights = FusionWeights {
            person: 0.0,
            face: 0.0,
            motion: 1.0,
        };
        let est = fuse(signals(1, 1, 6), &weights);
        assert_eq!(est.count, 6);
    }

    #[test]
    fn weight_validation() {
        assert!(FusionWeights::default().is_valid());
        let negative = FusionWeights {
            person: -0.1,
            ..FusionWeights::default()
        };
        assert!(!negative.is_valid());
        let zero = FusionWeights {
            person: 0.0,
            face: 0.0,
            motion: 0.0,
        };
        assert!(!zero.is_valid());
        let nan = FusionWeights {
            motion: f64::NAN,
            ..FusionWeights::default()
        };
        assert!(!nan.is_valid());
    }
}
