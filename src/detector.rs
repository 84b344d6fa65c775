use crate::config::DetectorConfig;
use crate::sample::{Instant, Sample};

/// Decision emitted for every consumed sample.
#[derive(Debug, Clone, PartialEq)]
pub struct OutputRecord {
    /// 1-based sequence number among consumed samples.
    pub line_id: u64,
    pub instant: Instant,
    pub stamp: String,
    pub value: f64,
    /// Signed difference from the previous consumed value.
    pub difference: f64,
    pub baseline: f64,
    /// An exceedance streak is being counted.
    pub is_detecting: bool,
    pub is_alarm: bool,
    pub is_wait: bool,
    /// Id of the running pattern window, 0 outside of one.
    pub pattern_id: u32,
}

#[derive(Debug, Clone)]
struct DetectorState {
    last_value: Option<f64>,
    baseline: f64,
    remaining_to_alarm: u32,
    is_alarm: bool,
    wait_started_at: Option<Instant>,
    pattern_started_at: Option<Instant>,
    pattern_id: u32,
    sample_count: u64,
}

/// Sustained-deviation detector over a single, time-ordered stream.
///
/// The baseline is a moving average of absolute sample-to-sample differences. A run of
/// `points_to_alarm` consecutive differences at or above `multiplier * baseline`
/// raises an alarm, which opens a cooldown (no new alarm) and a pattern window
/// (records tagged with the alarm id). The baseline is frozen while a streak is being
/// counted or the cooldown runs.
#[derive(Debug, Clone)]
pub struct Detector {
    config: DetectorConfig,
    state: DetectorState,
}

impl Detector {
    pub fn new(config: DetectorConfig) -> Self {
        Self {
            state: DetectorState {
                last_value: None,
                baseline: config.initial_baseline,
                remaining_to_alarm: config.points_to_alarm,
                is_alarm: false,
                wait_started_at: None,
                pattern_started_at: None,
                pattern_id: 0,
                sample_count: 0,
            },
            config,
        }
    }

    pub fn config(&self) -> &DetectorConfig {
        &self.config
    }

    pub fn baseline(&self) -> f64 {
        self.state.baseline
    }

    /// Alarms raised so far, which is also the id of the latest pattern.
    pub fn alarms(&self) -> u32 {
        self.state.pattern_id
    }

    pub fn samples(&self) -> u64 {
        self.state.sample_count
    }

    pub fn process(&mut self, sample: Sample) -> OutputRecord {
        let Self { config, state } = self;

        state.sample_count += 1;

        let last_value = *state.last_value.get_or_insert(sample.value);
        let difference = sample.value - last_value;
        let abs_diff = difference.abs();

        // Pattern and wait windows run on separate timers.
        if let Some(started) = state.pattern_started_at {
            if sample.instant.micros_since(started) >= config.pattern_usec {
                state.pattern_started_at = None;
            }
        }

        if let Some(started) = state.wait_started_at {
            state.is_alarm = false;
            if sample.instant.micros_since(started) >= config.wait_usec {
                state.wait_started_at = None;
            }
        } else {
            let threshold = f64::from(config.multiplier) * state.baseline;
            if abs_diff < threshold {
                state.remaining_to_alarm = config.points_to_alarm;
            } else {
                state.remaining_to_alarm = state.remaining_to_alarm.saturating_sub(1);
                if state.remaining_to_alarm == 0 {
                    state.is_alarm = true;
                    state.wait_started_at = Some(sample.instant);
                    state.remaining_to_alarm = config.points_to_alarm;
                    state.pattern_id += 1;
                    state.pattern_started_at = Some(sample.instant);
                }
            }
        }

        let is_detecting = state.remaining_to_alarm != config.points_to_alarm;

        // No floor: the baseline may decay towards zero on a flat signal.
        if state.wait_started_at.is_none() && !is_detecting {
            let n = f64::from(config.smoothing);
            state.baseline = (state.baseline * (n - 1.0) + abs_diff) / n;
        }

        state.last_value = Some(sample.value);

        OutputRecord {
            line_id: state.sample_count,
            instant: sample.instant,
            stamp: sample.stamp,
            value: sample.value,
            difference,
            baseline: state.baseline,
            is_detecting,
            is_alarm: state.is_alarm,
            is_wait: state.wait_started_at.is_some(),
            pattern_id: if state.pattern_started_at.is_some() {
                state.pattern_id
            } else {
                0
            },
        }
    }
}
