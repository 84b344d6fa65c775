use crate::detector::OutputRecord;
use csv::{Terminator, Writer, WriterBuilder};
use std::io::{self, Write};

pub const HEADER: [&str; 9] = [
    "lineid",
    "timestamp",
    "meas",
    "diff",
    "curavg",
    "isdetect",
    "isalarm",
    "iswait",
    "patternid",
];

/// Writes detector records as `;`-delimited rows below a header.
///
/// Reals use the shortest decimal form that parses back to the same value, so an
/// output file can be replayed as input.
pub struct RecordWriter<W: Write> {
    writer: Writer<W>,
}

impl<W: Write> RecordWriter<W> {
    pub fn new(output: W) -> csv::Result<Self> {
        let mut writer = WriterBuilder::new()
            .delimiter(b';')
            .terminator(Terminator::Any(b'\n'))
            .has_headers(false)
            .from_writer(output);
        writer.write_record(HEADER)?;
        Ok(Self { writer })
    }

    pub fn write(&mut self, record: &OutputRecord) -> csv::Result<()> {
        self.writer.write_record([
            record.line_id.to_string().as_str(),
            record.stamp.as_str(),
            record.value.to_string().as_str(),
            record.difference.to_string().as_str(),
            record.baseline.to_string().as_str(),
            flag(record.is_detecting),
            flag(record.is_alarm),
            flag(record.is_wait),
            record.pattern_id.to_string().as_str(),
        ])
    }

    /// Flushes and hands back the underlying writer.
    pub fn finish(self) -> io::Result<W> {
        self.writer.into_inner().map_err(|err| err.into_error())
    }
}

fn flag(set: bool) -> &'static str {
    if set {
        "1"
    } else {
        "0"
    }
}
