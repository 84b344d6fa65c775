//! Single-pass detector of sustained deviations in equally-sampled, timestamped
//! scalar data.
//!
//! A [`feed::SampleFeed`] reads `timestamp ; value` lines, the [`detector::Detector`]
//! turns each retained sample into an [`detector::OutputRecord`], and
//! [`output::RecordWriter`] prints the records. [`pipeline::run`] wires the three
//! together.

pub mod args;
pub mod config;
pub mod detector;
pub mod feed;
pub mod output;
pub mod pipeline;
pub mod sample;

pub use config::DetectorConfig;
pub use detector::{Detector, OutputRecord};
pub use sample::{Instant, Sample};
