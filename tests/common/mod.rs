#![allow(dead_code)]

use fp_patterns::pipeline::{self, MalformedPolicy, RunSummary};
use fp_patterns::{DetectorConfig, Instant};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

/// 10-03-2016 15:19:20 UTC
pub const BASE_MICROS: i64 = 1_457_623_160_000_000;

#[derive(Debug, Clone, PartialEq)]
pub struct Row {
    pub line_id: u64,
    pub stamp: String,
    pub value: f64,
    pub difference: f64,
    pub baseline: f64,
    pub is_detecting: bool,
    pub is_alarm: bool,
    pub is_wait: bool,
    pub pattern_id: u32,
}

/// Renders `(offset_us, value)` pairs as input lines.
pub fn render_input(points: &[(i64, f64)]) -> String {
    points
        .iter()
        .map(|&(offset, value)| {
            format!("{} ; {}\n", Instant::from_micros(BASE_MICROS + offset), value)
        })
        .collect()
}

pub fn run_text(input: &str, config: &DetectorConfig) -> (String, RunSummary) {
    let mut out = Vec::new();
    let summary = pipeline::run(input.as_bytes(), &mut out, config, MalformedPolicy::Skip)
        .expect("pipeline run failed");
    (String::from_utf8(out).expect("output is not UTF-8"), summary)
}

pub fn parse_rows(output: &str) -> Vec<Row> {
    output
        .lines()
        .skip(1)
        .map(|line| {
            let f: Vec<&str> = line.split(';').collect();
            assert_eq!(f.len(), 9, "bad row: {}", line);
            Row {
                line_id: f[0].parse().unwrap(),
                stamp: f[1].to_string(),
                value: f[2].parse().unwrap(),
                difference: f[3].parse().unwrap(),
                baseline: f[4].parse().unwrap(),
                is_detecting: f[5] == "1",
                is_alarm: f[6] == "1",
                is_wait: f[7] == "1",
                pattern_id: f[8].parse().unwrap(),
            }
        })
        .collect()
}

/// Sensor-like stream: small noise around a level, with bursts of large jumps every
/// `burst_every` samples. Samples are 64us apart.
pub fn noisy_stream(seed: u64, len: usize, burst_every: usize) -> Vec<(i64, f64)> {
    let mut rng = StdRng::seed_from_u64(seed);
    (0..len)
        .map(|i| {
            let noise: f64 = rng.gen_range(-40.0..40.0);
            let in_burst = i % burst_every < 8 && i >= burst_every;
            let value = if in_burst {
                let sign = if i % 2 == 0 { 1.0 } else { -1.0 };
                69_000.0 + sign * rng.gen_range(4_000.0..6_000.0)
            } else {
                69_000.0 + noise
            };
            (i as i64 * 64, value.round())
        })
        .collect()
}

fn micros(row: &Row) -> i64 {
    fp_patterns::sample::parse_timestamp(&row.stamp)
        .expect("row timestamp does not parse")
        .as_micros()
}

/// Checks the detector's contract on a strictly time-ordered output.
pub fn check_invariants(rows: &[Row], config: &DetectorConfig) {
    let points = config.points_to_alarm as usize;
    let mut alarms = 0u32;
    let mut wait_since: Option<i64> = None;
    let mut pattern: Option<(i64, u32)> = None;

    if let Some(first) = rows.first() {
        assert_eq!(first.difference, 0.0, "first row must have zero difference");
    }

    for (i, row) in rows.iter().enumerate() {
        assert_eq!(row.line_id, i as u64 + 1);
        let now = micros(row);

        if i > 0 && (row.is_wait || row.is_detecting) {
            assert_eq!(
                row.baseline,
                rows[i - 1].baseline,
                "baseline moved on frozen row {}",
                row.line_id
            );
        }

        if row.is_alarm {
            alarms += 1;
            assert!(row.is_wait, "alarm row {} is not waiting", row.line_id);
            assert_eq!(row.pattern_id, alarms);
            assert!(i + 1 >= points);
            for earlier in &rows[i + 1 - points..i] {
                assert!(earlier.is_detecting && !earlier.is_wait && !earlier.is_alarm);
            }
            wait_since = Some(now);
            pattern = Some((now, alarms));
            continue;
        }

        match wait_since {
            Some(t) if now - t < config.wait_usec => {
                assert!(row.is_wait, "row {} left the cooldown early", row.line_id);
            }
            Some(_) => {
                assert!(!row.is_wait, "row {} outstayed the cooldown", row.line_id);
                wait_since = None;
            }
            None => assert!(!row.is_wait),
        }

        match pattern {
            Some((t, id)) if now - t < config.pattern_usec => assert_eq!(row.pattern_id, id),
            Some(_) => {
                assert_eq!(row.pattern_id, 0);
                pattern = None;
            }
            None => assert_eq!(row.pattern_id, 0),
        }
    }
}
