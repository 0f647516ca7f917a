//! Engine configuration.
//!
//! Defaults reproduce the reference tuning: weights `0.4 / 0.4 / 0.2`, a
//! five-sample smoothing window, frames bounded to 400 px and a motion
//! threshold of 500 source pixels.

use occusense_hal::frame::DEFAULT_MAX_DIMENSION;
use occusense_types::OccuError;
use serde::{Deserialize, Serialize};

use crate::fusion::FusionWeights;
use crate::motion::MotionConfig;
use crate::smoother::DEFAULT_HISTORY_CAPACITY;

/// Configuration bundle for [`OccupancyEngine`][crate::engine::OccupancyEngine].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    /// Blend weights for the person, face and motion counts.
    pub weights: FusionWeights,
    /// Number of fused counts averaged into each reading.
    pub history_capacity: usize,
    /// Bound on the longest side of a normalized frame (pixels).
    pub max_dimension: u32,
    pub motion: MotionConfig,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            weights: FusionWeights::default(),
            history_capacity: DEFAULT_HISTORY_CAPACITY,
            max_dimension: DEFAULT_MAX_DIMENSION,
            motion: MotionConfig::default(),
        }
    }
}

impl EngineConfig {
    /// Check the configuration for values the engine cannot run with.
    ///
    /// # Errors
    ///
    /// Returns [`OccuError::Config`] describing the first invalid field.
    pub fn validate(&self) -> Result<(), OccuError> {
        if !self.weights.is_valid() {
            return Err(OccuError::Config(format!(
                "fusion weights must be finite, non-negative and not all zero (got {:?})",
                self.weights
            )));
        }
        if self.history_capacity == 0 {
            return Err(OccuError::Config("history_capacity must be at least 1".to_string()));
        }
        if self.max_dimension == 0 {
            return Err(OccuError::Config("max_dimension must be at least 1".to_string()));
        }
        if self.motion.history == 0 {
            return Err(OccuError::Config("motion.history must be at least 1".to_string()));
        }
        if !(self.motion.var_threshold.is_finite() && self.motion.var_threshold > 0.0) {
            return Err(OccuError::Config(
                "motion.var_threshold must be a positive number".to_string(),
            ));
        }
        if !(self.motion.min_area.is_finite() && self.motion.min_area >= 0.0) {
            return Err(OccuError::Config(
                "motion.min_area must be a non-negative number".to_string(),
            ));
        }
        Ok(())
    }
}
