use crate::sample::{parse_timestamp, Sample};
use csv::{ReaderBuilder, StringRecord, StringRecordsIntoIter, Trim};
use serde::Deserialize;
use std::io::Read;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum MalformedReason {
    #[error("expected `timestamp ; value`, found {0} field(s)")]
    FieldCount(usize),
    #[error("invalid timestamp {text:?}: {error}")]
    Timestamp {
        text: String,
        error: chrono::ParseError,
    },
    #[error("invalid value {0:?}")]
    Value(String),
    #[error("line is not valid UTF-8")]
    Encoding,
}

#[derive(Debug, Error)]
pub enum FeedError {
    #[error("line {line}: {reason}")]
    Malformed { line: u64, reason: MalformedReason },
    #[error("failed to read input")]
    Read(#[from] csv::Error),
}

#[derive(Deserialize)]
struct RawRecord<'a> {
    timestamp: &'a str,
    value: &'a str,
}

/// Lazily reads `timestamp ; value` records, keeping only the last record of every
/// `sample_each` consecutive ones.
///
/// Dropped records are never parsed, so a broken line only surfaces when it lands
/// on a retained slot. Blank lines are not records and do not count.
pub struct SampleFeed<R> {
    records: StringRecordsIntoIter<R>,
    sample_each: u32,
    countdown: u32,
    raw_records: u64,
}

impl<R: Read> SampleFeed<R> {
    pub fn new(reader: R, sample_each: u32) -> Self {
        let reader = ReaderBuilder::new()
            .delimiter(b';')
            .has_headers(false)
            .flexible(true)
            .quoting(false)
            .trim(Trim::All)
            .from_reader(reader);
        let sample_each = sample_each.max(1);
        Self {
            records: reader.into_records(),
            sample_each,
            countdown: sample_each,
            raw_records: 0,
        }
    }

    /// Raw records seen so far, retained or not.
    pub fn raw_records(&self) -> u64 {
        self.raw_records
    }

    fn retain(&mut self) -> bool {
        self.raw_records += 1;
        if self.countdown > 1 {
            self.countdown -= 1;
            false
        } else {
            self.countdown = self.sample_each;
            true
        }
    }
}

impl<R: Read> Iterator for SampleFeed<R> {
    type Item = Result<Sample, FeedError>;

    fn next(&mut self) -> Option<Self::Item> {
        loop {
            let record = match self.records.next()? {
                Ok(record) => record,
                Err(err) => {
                    let line = match err.kind() {
                        csv::ErrorKind::Utf8 { pos, .. } => pos.as_ref().map(|p| p.line()),
                        _ => return Some(Err(err.into())),
                    };
                    if !self.retain() {
                        continue;
                    }
                    return Some(Err(FeedError::Malformed {
                        line: line.unwrap_or(self.raw_records),
                        reason: MalformedReason::Encoding,
                    }));
                }
            };

            if is_blank(&record) {
                continue;
            }
            if !self.retain() {
                continue;
            }

            let line = record
                .position()
                .map(|p| p.line())
                .unwrap_or(self.raw_records);
            return Some(
                parse_record(&record).map_err(|reason| FeedError::Malformed { line, reason }),
            );
        }
    }
}

fn is_blank(record: &StringRecord) -> bool {
    record.iter().all(str::is_empty)
}

/// Turns one trimmed record into a sample.
pub fn parse_record(record: &StringRecord) -> Result<Sample, MalformedReason> {
    if record.len() != 2 {
        return Err(MalformedReason::FieldCount(record.len()));
    }
    let raw: RawRecord = record
        .deserialize(None)
        .map_err(|_| MalformedReason::FieldCount(record.len()))?;

    let instant = parse_timestamp(raw.timestamp).map_err(|error| MalformedReason::Timestamp {
        text: raw.timestamp.to_string(),
        error,
    })?;
    let value = raw
        .value
        .parse::<f64>()
        .ok()
        .filter(|v| v.is_finite())
        .ok_or_else(|| MalformedReason::Value(raw.value.to_string()))?;

    Ok(Sample::new(instant, raw.timestamp, value))
}

#[cfg(test)]
mod tests {
    use super::*;

    const INPUT: &str = "\
10-03-2016 15:19:20.729915 ;   68998
10-03-2016 15:19:20.729979 ;   69058
10-03-2016 15:19:20.730043 ;   68808
10-03-2016 15:19:20.730107 ;   68810
10-03-2016 15:19:20.730171 ;   68901
";

    fn collect(input: &str, sample_each: u32) -> Vec<Result<Sample, FeedError>> {
        SampleFeed::new(input.as_bytes(), sample_each).collect()
    }

    #[test]
    fn test_reads_and_trims_fields() {
        let samples: Vec<Sample> = collect(INPUT, 1)
            .into_iter()
            .collect::<Result<_, _>>()
            .unwrap();
        assert_eq!(samples.len(), 5);
        assert_eq!(samples[0].stamp, "10-03-2016 15:19:20.729915");
        assert_eq!(samples[0].value, 68998.0);
        assert_eq!(samples[1].instant.micros_since(samples[0].instant), 64);
    }

    #[test]
    fn test_decimation_keeps_every_nth() {
        let samples: Vec<Sample> = collect(INPUT, 2)
            .into_iter()
            .collect::<Result<_, _>>()
            .unwrap();
        let values: Vec<f64> = samples.iter().map(|s| s.value).collect();
        assert_eq!(values, vec![69058.0, 68810.0]);

        let mut feed = SampleFeed::new(INPUT.as_bytes(), 3);
        assert_eq!(feed.next().unwrap().unwrap().value, 68808.0);
        assert!(feed.next().is_none());
        assert_eq!(feed.raw_records(), 5);
    }

    #[test]
    fn test_blank_lines_are_ignored() {
        let input = "\n10-03-2016 15:19:20.729915;1\n\n   \n10-03-2016 15:19:20.729979;2\n";
        let samples: Vec<Sample> = collect(input, 2)
            .into_iter()
            .collect::<Result<_, _>>()
            .unwrap();
        assert_eq!(samples.len(), 1);
        assert_eq!(samples[0].value, 2.0);
    }

    #[test]
    fn test_malformed_lines_carry_line_numbers() {
        let input = "\
10-03-2016 15:19:20.729915 ; 1
garbage
10-03-2016 15:19:20.730043 ; abc
10-03-2016 25:19:20.730043 ; 4
10-03-2016 15:19:20.730107 ; 5
";
        let items = collect(input, 1);
        assert_eq!(items.len(), 5);
        assert!(items[0].is_ok());
        assert!(matches!(
            items[1],
            Err(FeedError::Malformed { line: 2, reason: MalformedReason::FieldCount(1) })
        ));
        assert!(matches!(
            items[2],
            Err(FeedError::Malformed { line: 3, reason: MalformedReason::Value(_) })
        ));
        assert!(matches!(
            items[3],
            Err(FeedError::Malformed { line: 4, reason: MalformedReason::Timestamp { .. } })
        ));
        assert_eq!(items[4].as_ref().unwrap().value, 5.0);
    }

    #[test]
    fn test_non_finite_values_are_rejected() {
        let items = collect("10-03-2016 15:19:20.729915 ; NaN\n", 1);
        assert!(matches!(
            items[0],
            Err(FeedError::Malformed { reason: MalformedReason::Value(_), .. })
        ));
    }

    #[test]
    fn test_dropped_records_are_not_parsed() {
        let input = "garbage\n10-03-2016 15:19:20.729915 ; 7\n";
        let items = collect(input, 2);
        assert_eq!(items.len(), 1);
        assert_eq!(items[0].as_ref().unwrap().value, 7.0);
    }

    #[test]
    fn test_quote_does_not_swallow_later_lines() {
        let input = "\
10-03-2016 15:19:20.729915 ; 1
\"10-03-2016 15:19:20.729979 ; 2
10-03-2016 15:19:20.730043 ; 3
10-03-2016 15:19:20.730107 ; 4\"
10-03-2016 15:19:20.730171 ; 5
";
        let items = collect(input, 1);
        assert_eq!(items.len(), 5);
        assert_eq!(items[0].as_ref().unwrap().value, 1.0);
        assert!(matches!(
            items[1],
            Err(FeedError::Malformed { line: 2, reason: MalformedReason::Timestamp { .. } })
        ));
        assert_eq!(items[2].as_ref().unwrap().value, 3.0);
        assert!(matches!(
            items[3],
            Err(FeedError::Malformed { line: 4, reason: MalformedReason::Value(_) })
        ));
        assert_eq!(items[4].as_ref().unwrap().value, 5.0);
    }

    #[test]
    fn test_invalid_utf8_is_malformed() {
        let mut input = b"10-03-2016 15:19:20.729915 ; 1\n".to_vec();
        input.extend_from_slice(b"\xff\xfe ; 2\n");
        input.extend_from_slice(b"10-03-2016 15:19:20.730043 ; 3\n");
        let items: Vec<_> = SampleFeed::new(input.as_slice(), 1).collect();
        assert_eq!(items.len(), 3);
        assert!(matches!(
            items[1],
            Err(FeedError::Malformed { line: 2, reason: MalformedReason::Encoding })
        ));
        assert_eq!(items[2].as_ref().unwrap().value, 3.0);
    }
}
