use crate::config::DetectorConfig;
use crate::detector::Detector;
use crate::feed::{FeedError, SampleFeed};
use crate::output::RecordWriter;
use anyhow::{Context, Result};
use log::{debug, info, warn};
use std::io::{Read, Write};

/// What to do with an input record that cannot be parsed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum MalformedPolicy {
    /// Warn and continue with the next record.
    #[default]
    Skip,
    /// Stop the run with an error.
    Abort,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct RunSummary {
    /// Non-blank input records, including the ones dropped by decimation.
    pub raw_records: u64,
    pub processed: u64,
    pub skipped: u64,
    pub alarms: u32,
}

/// Streams `input` through the detector and writes one row per retained sample.
pub fn run<R: Read, W: Write>(
    input: R,
    output: W,
    config: &DetectorConfig,
    policy: MalformedPolicy,
) -> Result<RunSummary> {
    let mut feed = SampleFeed::new(input, config.sample_each);
    let mut detector = Detector::new(*config);
    let mut writer = RecordWriter::new(output).context("Failed to write output header")?;
    let mut summary = RunSummary::default();
    let mut previous = None;

    for item in feed.by_ref() {
        let sample = match item {
            Ok(sample) => sample,
            Err(err @ FeedError::Malformed { .. }) => match policy {
                MalformedPolicy::Skip => {
                    warn!("Skipping {}", err);
                    summary.skipped += 1;
                    continue;
                }
                MalformedPolicy::Abort => return Err(err).context("Malformed input record"),
            },
            Err(err) => return Err(err.into()),
        };

        if let Some(prev) = previous {
            if sample.instant < prev {
                warn!(
                    "Timestamp {} is earlier than the previous sample ({})",
                    sample.stamp, prev
                );
            }
        }
        previous = Some(sample.instant);

        let record = detector.process(sample);
        if record.is_alarm {
            debug!(
                "Alarm #{} at line {} ({}), baseline {}",
                detector.alarms(),
                record.line_id,
                record.stamp,
                record.baseline
            );
        }
        writer
            .write(&record)
            .with_context(|| format!("Failed to write record {}", record.line_id))?;
    }

    writer.finish().context("Failed to flush output")?;

    summary.raw_records = feed.raw_records();
    summary.processed = detector.samples();
    summary.alarms = detector.alarms();
    info!(
        "Processed {} of {} record(s), {} skipped, {} alarm(s)",
        summary.processed, summary.raw_records, summary.skipped, summary.alarms
    );
    Ok(summary)
}
