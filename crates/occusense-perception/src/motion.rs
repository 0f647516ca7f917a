//! Motion adapter and its running background model.
//!
//! Motion detection is comparative: each frame is classified against a
//! per-pixel Gaussian background model learned from the frames before it.
//! Foreground pixels are grouped into 8-connected regions and every region
//! larger than the minimum area counts as one moving occupant signal.
//!
//! The adapter reports `0` without touching the model while no previous
//! frame exists (the engine's cold state).
//!
//! The first comparison only seeds the model and reports no motion. A MOG2
//! subtractor instead marks its whole first frame as foreground, which counts
//! as one region on the second frame of a stream; that spurious region is
//! not reproduced here. A change of frame dimensions reseeds the model the
//! same way.

use image::{GrayImage, Luma};
use imageproc::region_labelling::{Connectivity, connected_components};
use occusense_hal::NormalizedFrame;
use serde::{Deserialize, Serialize};
use tracing::debug;

/// Initial per-pixel variance of a freshly seeded model.
const VAR_INIT: f32 = 15.0;
/// Lower bound on per-pixel variance.
const VAR_MIN: f32 = 4.0;
/// Upper bound on per-pixel variance.
const VAR_MAX: f32 = 5.0 * VAR_INIT;
/// Mask value of a foreground pixel.
const FOREGROUND: u8 = 255;

// ────────────────────────────────────────────────────────────────────────────
// Configuration
// ────────────────────────────────────────────────────────────────────────────

/// Tunables for the motion adapter.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct MotionConfig {
    /// Minimum region area in *source* pixels. Scaled by `scale²` to
    /// normalized-frame pixels, so the threshold follows the frame scale.
    pub min_area: f32,
    /// Number of frames the background model effectively remembers.
    pub history: u32,
    /// Squared Mahalanobis distance above which a pixel is foreground.
    pub var_threshold: f32,
}

impl Default for MotionConfig {
    fn default() -> Self {
        Self {
            min_area: 500.0,
            history: 500,
            var_threshold: 16.0,
        }
    }
}

impl MotionConfig {
    /// Minimum region area in pixels of a frame normalized by `scale`.
    pub fn min_area_for_scale(&self, scale: f32) -> f32 {
        self.min_area * scale * scale
    }
}

// ────────────────────────────────────────────────────────────────────────────
// BackgroundModel
// ────────────────────────────────────────────────────────────────────────────

/// Per-pixel running mean and variance of the grayscale scene.
#[derive(Debug, Clone, Default)]
pub struct BackgroundModel {
    width: u32,
    height: u32,
    mean: Vec<f32>,
    variance: Vec<f32>,
    frames: u32,
}

impl BackgroundModel {
    pub fn new() -> Self {
        Self::default()
    }

    /// `true` once the model has learned at least one frame.
    pub fn is_seeded(&self) -> bool {
        self.frames > 0
    }

    /// Number of frames the model has learned from.
    pub fn frames_seen(&self) -> u32 {
        self.frames
    }

    /// `(width, height)` the model was seeded with.
    pub fn dimensions(&self) -> (u32, u32) {
        (self.width, self.height)
    }

    /// Classify `gray` against the model, then learn from it.
    ///
    /// Returns a mask of the same dimensions with foreground pixels set to
    /// `255`. An unseeded model, or one seeded at different dimensions, is
    /// (re-)seeded from `gray` and reports no foreground.
    pub fn apply(&mut self, gray: &GrayImage, config: &MotionConfig) -> GrayImage {
        let (width, height) = gray.dimensions();
        let mut mask = GrayImage::new(width, height);
        if !self.is_seeded() || (width, height) != (self.width, self.height) {
            self.seed(gray);
            return mask;
        }

        self.frames = self.frames.saturating_add(1);
        let alpha = 1.0 / self.frames.min(config.history.max(1)) as f32;

        let model = self.mean.iter_mut().zip(self.variance.iter_mut());
        for ((out, &px), (mean, var)) in mask.iter_mut().zip(gray.as_raw()).zip(model) {
            let d = f32::from(px) - *mean;
            let d2 = d * d;
            if d2 > config.var_threshold * *var {
                *out = FOREGROUND;
            }
            *mean += alpha * d;
            *var = (*var + alpha * (d2 - *var)).clamp(VAR_MIN, VAR_MAX);
        }
        mask
    }

    fn seed(&mut self, gray: &GrayImage) {
        let (width, height) = gray.dimensions();
        debug!(width, height, "seeding background model");
        self.width = width;
        self.height = height;
        self.mean = gray.as_raw().iter().map(|&px| f32::from(px)).collect();
        self.variance = vec![VAR_INIT; self.mean.len()];
        self.frames = 1;
    }
}

// ────────────────────────────────────────────────────────────────────────────
// Region counting
// ────────────────────────────────────────────────────────────────────────────

/// Areas (pixel counts) of the 8-connected non-zero regions of `mask`.
pub fn region_areas(mask: &GrayImage) -> Vec<usize> {
    let labels = connected_components(mask, Connectivity::Eight, Luma([0u8]));
    let mut areas: Vec<usize> = Vec::new();
    for &label in labels.iter().filter(|&&label| label > 0) {
        let slot = label as usize - 1;
        if slot >= areas.len() {
            areas.resize(slot + 1, 0);
        }
        areas[slot] += 1;
    }
    areas.retain(|&area| area > 0);
    areas
}

// ────────────────────────────────────────────────────────────────────────────
// MotionDetector
// ────────────────────────────────────────────────────────────────────────────

/// Motion adapter: owns the background model and turns each frame into a
/// count of significant moving regions.
#[derive(Debug, Clone, Default)]
pub struct MotionDetector {
    config: MotionConfig,
    model: BackgroundModel,
}

impl MotionDetector {
    pub fn new(config: MotionConfig) -> Self {
        Self {
            config,
            model: BackgroundModel::new(),
        }
    }

    pub fn model(&self) -> &BackgroundModel {
        &self.model
    }

    /// Count moving regions in `frame`.
    ///
    /// Without a `previous` frame this returns `0` and leaves the model
    /// untouched. Otherwise the model is updated in place.
    pub fn count(&mut self, previous: Option<&NormalizedFrame>, frame: &NormalizedFrame) -> u32 {
        if previous.is_none() {
            return 0;
        }
        let mask = self.model.apply(frame.gray(), &self.config);
        let min_area = self.config.min_area_for_scale(frame.scale());

        let significant = region_areas(&mask)
            .into_iter()
            .filter(|&area| area as f32 > min_area)
            .count();
        u32::try_from(significant).unwrap_or(u32::MAX)
    }
}

// ────────────────────────────────────────────────────────────────────────────
// Tests
// ────────────────────────────────────────────────────────────────────────────
