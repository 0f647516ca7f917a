//! Detector contract shared by every external person/face detector.

use occusense_types::OccuError;
use serde::{Deserialize, Serialize};

use crate::frame::NormalizedFrame;

/// A single detection reported by an external detector, in normalized-frame
/// pixel coordinates.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Region {
    pub x: u32,
    pub y: u32,
    pub width: u32,
    pub height: u32,
    /// Detector-specific score. Informational only: every reported region
    /// counts as one occupant signal.
    #[serde(default)]
    pub score: f32,
}

/// A person or face detector.
///
/// Implementations receive the normalized frame and return the regions they
/// found. The engine only ever needs the number of regions, which
/// [`RegionDetector::count`] derives.
pub trait RegionDetector: Send {
    /// Stable identifier for this detector, e.g. `"person"`.
    fn name(&self) -> &str;

    /// Run detection on `frame`.
    ///
    /// # Errors
    ///
    /// Returns [`OccuError::Detector`] when the detector cannot produce a
    /// result for this frame.
    fn detect(&mut self, frame: &NormalizedFrame) -> Result<Vec<Region>, OccuError>;

    /// Normalize the detector output into an occupant count.
    fn count(&mut self, frame: &NormalizedFrame) -> Result<u32, OccuError> {
        let regions = self.detect(frame)?;
        Ok(u32::try_from(regions.len()).unwrap_or(u32::MAX))
    }
}

impl<D: RegionDetector + ?Sized> RegionDetector for Box<D> {
    fn name(&self) -> &str {
        (**self).name()
    }

    fn detect(&mut self, frame: &NormalizedFrame) -> Result<Vec<Region>, OccuError> {
        (**self).detect(frame)
    }
}
