use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use uuid::Uuid;

/// How a reading was produced.
///
/// Downstream consumers (storage, broadcast) must treat [`DetectionMethod::Error`]
/// readings as disposable: they mark a frame that could not be analysed, not
/// an empty room.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DetectionMethod {
    /// Person, face and motion signals were fused and smoothed.
    Combined,
    /// The frame could not be decoded or a detector failed.
    Error,
}

impl DetectionMethod {
    pub fn as_str(&self) -> &'static str {
        match self {
            DetectionMethod::Combined => "combined",
            DetectionMethod::Error => "error",
        }
    }
}

impl std::fmt::Display for DetectionMethod {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for DetectionMethod {
    type Err = OccuError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "combined" => Ok(DetectionMethod::Combined),
            "error" => Ok(DetectionMethod::Error),
            other => Err(OccuError::Serialization(format!(
                "unknown detection method '{other}'"
            ))),
        }
    }
}

/// The engine's public output, one per processed frame.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OccupancyReading {
    /// Smoothed occupant count.
    pub count: u32,
    /// Agreement between the detection methods for the frame that produced
    /// this reading. `1.0` means full agreement; it may drop below `0.0`
    /// when the disagreement is large relative to a small fused count.
    pub confidence: f64,
    pub method: DetectionMethod,
    /// Capture time of the reading.
    pub timestamp: DateTime<Utc>,
}

impl OccupancyReading {
    /// Build the degraded sentinel emitted when a frame cannot be analysed.
    pub fn degraded() -> Self {
        Self {
            count: 0,
            confidence: 0.0,
            method: DetectionMethod::Error,
            timestamp: Utc::now(),
        }
    }

    /// `true` for readings that stand in for a failed frame.
    pub fn is_degraded(&self) -> bool {
        self.method == DetectionMethod::Error
    }
}

/// A reading tagged with the stream that produced it, as routed over the
/// reading bus and persisted by the store.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ReadingEvent {
    pub id: Uuid,
    /// e.g., "bus-12/front-door"
    pub stream_id: String,
    pub reading: OccupancyReading,
}

impl ReadingEvent {
    pub fn new(stream_id: impl Into<String>, reading: OccupancyReading) -> Self {
        Self {
            id: Uuid::new_v4(),
            stream_id: stream_id.into(),
            reading,
        }
    }
}

/// Global error type spanning frame decoding, detector faults and
/// configuration problems.
#[derive(Error, Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum OccuError {
    #[error("Frame Decode Error: {0}")]
    Decode(String),

    #[error("Detector Fault on {detector}: {details}")]
    Detector { detector: String, details: String },

    #[error("Invalid Configuration: {0}")]
    Config(String),

    #[error("Frame Source Error on {source_id}: {details}")]
    Source { source_id: String, details: String },

    #[error("Channel Error: {0}")]
    Channel(String),

    #[error("Serialization Error: {0}")]
    Serialization(String),
}
