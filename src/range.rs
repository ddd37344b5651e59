//! Range header resolution
//!
//! Parses the HTTP `Range` header into a typed slice request. Two unit
//! systems are supported: `bytes=<start>-<stop>` addresses the persisted
//! byte stream of a feature, while `seconds=<start>-<stop>` addresses a
//! window of time at picosecond precision. A missing or shape-malformed
//! header degrades to the full range; an unrecognized unit token is a hard
//! failure. That asymmetry is part of the contract.

use crate::error::{Result, ServeError};
use serde::{Deserialize, Serialize};

/// Picoseconds per second, the resolution used for all time offsets.
pub const PS_PER_SECOND: f64 = 1e12;

/// A window of time, expressed in picoseconds from the start of a document
///
/// An absent duration means "to the end of the data". The default value
/// (start zero, no duration) is the full-window sentinel.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct TimeSlice {
    /// Offset of the window start in picoseconds
    pub start_ps: i64,
    /// Length of the window in picoseconds, or `None` for "to end"
    pub duration_ps: Option<i64>,
}

impl TimeSlice {
    /// Create a time slice from an explicit start and duration
    pub fn new(start_ps: i64, duration_ps: Option<i64>) -> Self {
        TimeSlice {
            start_ps,
            duration_ps,
        }
    }

    /// The full-window sentinel: start zero, open-ended
    pub fn full() -> Self {
        TimeSlice::default()
    }

    /// Whether this slice is exactly the full-window sentinel
    pub fn is_full(&self) -> bool {
        *self == TimeSlice::full()
    }

    /// Convert a start/stop pair in seconds into a time slice
    ///
    /// The start is rounded to the nearest picosecond; when a stop is given
    /// the duration is `round((stop - start) * 1e12)`.
    pub fn from_seconds(start: f64, stop: Option<f64>) -> Self {
        TimeSlice {
            start_ps: (start * PS_PER_SECOND).round() as i64,
            duration_ps: stop.map(|s| ((s - start) * PS_PER_SECOND).round() as i64),
        }
    }

    /// Window start in seconds
    pub fn start_seconds(&self) -> f64 {
        self.start_ps as f64 / PS_PER_SECOND
    }

    /// Window duration in seconds, if bounded
    pub fn duration_seconds(&self) -> Option<f64> {
        self.duration_ps.map(|d| d as f64 / PS_PER_SECOND)
    }

    /// Exclusive end of the window in picoseconds, if bounded
    pub fn end_ps(&self) -> Option<i64> {
        self.duration_ps.map(|d| self.start_ps + d)
    }
}

/// A typed slice request parsed from a `Range` header
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum RangeSpec {
    /// No restriction; the entire feature value
    Full,
    /// A byte range over the feature's persisted stream; `stop` is exclusive
    /// and absent means "to end"
    Bytes { start: u64, stop: Option<u64> },
    /// A window of time over the feature's data
    Time(TimeSlice),
}

impl Default for RangeSpec {
    fn default() -> Self {
        RangeSpec::Full
    }
}

impl RangeSpec {
    /// Parse a raw `Range` header value into a slice request
    ///
    /// # Arguments
    /// * `header` - The raw header value, or an empty string when the header
    ///   was absent
    ///
    /// # Returns
    /// * `Ok(RangeSpec::Full)` for an empty header or one that does not match
    ///   the `<unit>=<start>-<stop>` shape
    /// * `Ok(RangeSpec::Bytes {..})` / `Ok(RangeSpec::Time(..))` for the two
    ///   supported units
    /// * `Err(ServeError::RangeUnitUnsupported)` for any other unit token
    pub fn parse(header: &str) -> Result<Self> {
        let raw = header.trim();
        if raw.is_empty() {
            return Ok(RangeSpec::Full);
        }

        let (unit, rest) = match Self::split_shape(raw) {
            Some(parts) => parts,
            // Malformed shape is a lenient full-range fallback, never an error.
            None => return Ok(RangeSpec::Full),
        };

        match unit {
            "bytes" => Self::byte_slice(rest.0, rest.1),
            "seconds" => Self::time_slice(rest.0, rest.1),
            other => Err(ServeError::RangeUnitUnsupported(other.to_string())),
        }
    }

    /// Match `<unit>=<start>-<stop>`: unit and start must be non-empty, start
    /// contains no `-`, stop is the (possibly empty) remainder.
    fn split_shape(raw: &str) -> Option<(&str, (&str, &str))> {
        let (unit, spec) = raw.split_once('=')?;
        if unit.is_empty() {
            return None;
        }
        let (start, stop) = spec.split_once('-')?;
        if start.is_empty() {
            return None;
        }
        Some((unit, (start, stop)))
    }

    fn byte_slice(start: &str, stop: &str) -> Result<Self> {
        let start = start
            .parse::<u64>()
            .map_err(|e| ServeError::Internal(format!("invalid range start '{}': {}", start, e)))?;
        // An unparseable stop means "to end"; only the start is mandatory.
        let stop = stop.parse::<u64>().ok();
        Ok(RangeSpec::Bytes { start, stop })
    }

    fn time_slice(start: &str, stop: &str) -> Result<Self> {
        let start = start
            .parse::<f64>()
            .map_err(|e| ServeError::Internal(format!("invalid range start '{}': {}", start, e)))?;
        let stop = stop.parse::<f64>().ok();
        Ok(RangeSpec::Time(TimeSlice::from_seconds(start, stop)))
    }

    /// The time window carried by this spec, if it is a time range
    pub fn as_time(&self) -> Option<&TimeSlice> {
        match self {
            RangeSpec::Time(ts) => Some(ts),
            _ => None,
        }
    }

    /// Whether this spec restricts the response to a sub-range of bytes
    pub fn is_byte_range(&self) -> bool {
        matches!(self, RangeSpec::Bytes { .. })
    }
}
