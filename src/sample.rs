use chrono::{DateTime, NaiveDateTime, Utc};
use std::fmt;

/// Timestamp layout of the input stream, e.g. `10-03-2016 15:19:20.729915`.
pub const TIMESTAMP_FORMAT: &str = "%d-%m-%Y %H:%M:%S.%6f";

/// Microseconds since the Unix epoch, always computed in UTC.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Instant(i64);

impl Instant {
    pub fn from_micros(micros: i64) -> Self {
        Self(micros)
    }

    pub fn as_micros(self) -> i64 {
        self.0
    }

    /// Signed elapsed time. Negative when `earlier` is actually later.
    pub fn micros_since(self, earlier: Instant) -> i64 {
        self.0.saturating_sub(earlier.0)
    }
}

impl fmt::Display for Instant {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match DateTime::<Utc>::from_timestamp_micros(self.0) {
            Some(dt) => write!(f, "{}", dt.format(TIMESTAMP_FORMAT)),
            None => write!(f, "{}us", self.0),
        }
    }
}

/// Parses a `DD-MM-YYYY HH:MM:SS.ffffff` timestamp as a UTC calendar time.
pub fn parse_timestamp(text: &str) -> Result<Instant, chrono::ParseError> {
    let naive = NaiveDateTime::parse_from_str(text, TIMESTAMP_FORMAT)?;
    Ok(Instant(naive.and_utc().timestamp_micros()))
}

/// One measurement handed to the detector.
#[derive(Debug, Clone, PartialEq)]
pub struct Sample {
    pub instant: Instant,
    /// Timestamp text as it appeared in the input, echoed in the output row.
    pub stamp: String,
    pub value: f64,
}

impl Sample {
    pub fn new(instant: Instant, stamp: impl Into<String>, value: f64) -> Self {
        Self {
            instant,
            stamp: stamp.into(),
            value,
        }
    }

    /// Builds a sample whose timestamp text is rendered from the instant.
    pub fn at(instant: Instant, value: f64) -> Self {
        Self::new(instant, instant.to_string(), value)
    }
}
