//! Detector backed by an HTTP detection service.
//!
//! The normalized frame is PNG-encoded and posted to the service URL. The
//! service answers with the regions it found:
//!
//! ```json
//! { "regions": [ { "x": 10, "y": 12, "width": 40, "height": 90, "score": 0.8 } ] }
//! ```

use std::io::Cursor;
use std::time::Duration;

use image::{DynamicImage, ImageFormat};
use occusense_types::OccuError;
use serde::Deserialize;
use tracing::debug;

use crate::detector::{Region, RegionDetector};
use crate::frame::NormalizedFrame;

/// Raw shape of the detection service response.
#[derive(Debug, Deserialize)]
struct DetectResponse {
    regions: Vec<Region>,
}

/// Blocking HTTP client for a single detection endpoint.
pub struct HttpRegionDetector {
    name: String,
    url: String,
    client: reqwest::blocking::Client,
}

impl HttpRegionDetector {
    /// Build a detector named `name` posting frames to `url`.
    ///
    /// # Errors
    ///
    /// Returns [`OccuError::Config`] if the HTTP client cannot be built.
    pub fn new(name: &str, url: &str, timeout: Duration) -> Result<Self, OccuError> {
        let client = reqwest::blocking::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| OccuError::Config(format!("HTTP client for {name}: {e}")))?;
        Ok(Self {
            name: name.to_string(),
            url: url.to_string(),
            client,
        })
    }

    pub fn url(&self) -> &str {
        &self.url
    }

    fn fault(&self, details: String) -> OccuError {
        OccuError::Detector {
            detector: self.name.clone(),
            details,
        }
    }
}

impl RegionDetector for HttpRegionDetector {
    fn name(&self) -> &str {
        &self.name
    }

    fn detect(&mut self, frame: &NormalizedFrame) -> Result<Vec<Region>, OccuError> {
        let body = encode_png(frame).map_err(|e| self.fault(e))?;
        let response = self
            .client
            .post(&self.url)
            .header(reqwest::header::CONTENT_TYPE, "image/png")
            .body(body)
            .send()
            .map_err(|e| self.fault(format!("unreachable at {}: {e}", self.url)))?;

        if !response.status().is_success() {
            return Err(self.fault(format!("service returned HTTP {}", response.status())));
        }

        let text = response
            .text()
            .map_err(|e| self.fault(format!("failed to read response: {e}")))?;
        let regions = parse_regions(&text).map_err(|e| self.fault(e))?;
        debug!(detector = %self.name, regions = regions.len(), "remote detection complete");
        Ok(regions)
    }
}

/// Parse a detection service response body.
pub fn parse_regions(body: &str) -> Result<Vec<Region>, String> {
    serde_json::from_str::<DetectResponse>(body)
        .map(|r| r.regions)
        .map_err(|e| format!("malformed response: {e}"))
}

fn encode_png(frame: &NormalizedFrame) -> Result<Vec<u8>, String> {
    let mut out = Cursor::new(Vec::new());
    DynamicImage::ImageRgb8(frame.rgb().clone())
        .write_to(&mut out, ImageFormat::Png)
        .map_err(|e| format!("failed to encode frame: {e}"))?;
    Ok(out.into_inner())
}
