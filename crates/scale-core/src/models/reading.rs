//! Decoded weight readings

use chrono::{DateTime, Utc};
use serde::Serialize;

use super::WeightUnit;

/// One decoded measurement from the scale
///
/// Fields are private so that a `Reading` can only exist with a finite
/// value. Malformed frames produce no reading at all rather than a zeroed one.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Reading {
    value: f64,
    unit: WeightUnit,
    /// Capture time, assigned on decode (devices do not timestamp frames)
    timestamp: DateTime<Utc>,
    /// Trimmed source frame, kept for diagnostics
    raw_frame: String,
}

impl Reading {
    /// Build a reading, rejecting non-finite values
    pub fn new(
        value: f64,
        unit: WeightUnit,
        raw_frame: impl Into<String>,
        timestamp: DateTime<Utc>,
    ) -> Option<Self> {
        if !value.is_finite() {
            return None;
        }
        Some(Self {
            value,
            unit,
            timestamp,
            raw_frame: raw_frame.into(),
        })
    }

    pub fn value(&self) -> f64 {
        self.value
    }

    pub fn unit(&self) -> WeightUnit {
        self.unit
    }

    pub fn timestamp(&self) -> DateTime<Utc> {
        self.timestamp
    }

    pub fn raw_frame(&self) -> &str {
        &self.raw_frame
    }
}
