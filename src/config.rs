use directories::ProjectDirs;
use knuffel::ast::{Literal, TypeName};
use knuffel::decode::{Context, Kind};
use knuffel::errors::DecodeError;
use knuffel::span::Spanned;
use knuffel::traits::ErrorSpan;
use knuffel::{Decode, DecodeScalar};
use log::debug;
use std::path::{Path, PathBuf};
use thiserror::Error;

/// Number of tunable detector parameters.
pub const PARAMETER_COUNT: usize = 7;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("expected all 7 detector parameters or none, got {given}")]
    Partial { given: usize },
    #[error("invalid parameter value(s): {}; every value must be >= 1", .fields.join(", "))]
    OutOfRange { fields: Vec<String> },
    #[error("failed to read config file {}", .path.display())]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("failed to parse config file {}", .path.display())]
    Parse {
        path: PathBuf,
        #[source]
        source: knuffel::Error,
    },
}

/// Validated detector configuration.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct DetectorConfig {
    /// Decimation factor: only every nth raw record reaches the detector.
    pub sample_each: u32,
    /// Seed of the adaptive baseline.
    pub initial_baseline: f64,
    /// Consecutive over-threshold samples needed to raise an alarm.
    pub points_to_alarm: u32,
    /// Cooldown after an alarm, in microseconds.
    pub wait_usec: i64,
    /// Baseline multiplier giving the exceedance threshold.
    pub multiplier: u32,
    /// Smoothing length of the baseline moving average.
    pub smoothing: u32,
    /// Length of the labeled window after an alarm, in microseconds.
    pub pattern_usec: i64,
}

impl Default for DetectorConfig {
    fn default() -> Self {
        Self {
            sample_each: 1,
            initial_baseline: 200.0,
            points_to_alarm: 5,
            wait_usec: 1_000_000,
            multiplier: 10,
            smoothing: 500,
            pattern_usec: 250_000,
        }
    }
}

impl DetectorConfig {
    /// Renders the configuration in config-file syntax.
    pub fn to_kdl(&self) -> String {
        // `{:?}` keeps the decimal point on whole baselines (`200.0`).
        format!(
            "// fp-patterns detector configuration\n\
             detector sample-each={} initial-baseline={:?} points-to-alarm={} wait-usec={} multiplier={} smoothing={} pattern-usec={}\n",
            self.sample_each,
            self.initial_baseline,
            self.points_to_alarm,
            self.wait_usec,
            self.multiplier,
            self.smoothing,
            self.pattern_usec,
        )
    }
}

/// A partial set of raw, unvalidated parameter values.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct ConfigOverlay {
    pub sample_each: Option<i64>,
    pub initial_baseline: Option<f64>,
    pub points_to_alarm: Option<i64>,
    pub wait_usec: Option<i64>,
    pub multiplier: Option<i64>,
    pub smoothing: Option<i64>,
    pub pattern_usec: Option<i64>,
}

impl ConfigOverlay {
    pub fn provided(&self) -> usize {
        [
            self.sample_each.is_some(),
            self.initial_baseline.is_some(),
            self.points_to_alarm.is_some(),
            self.wait_usec.is_some(),
            self.multiplier.is_some(),
            self.smoothing.is_some(),
            self.pattern_usec.is_some(),
        ]
        .into_iter()
        .filter(|&set| set)
        .count()
    }

    /// Values set in `upper` win over the ones in `self`.
    pub fn layer(self, upper: ConfigOverlay) -> ConfigOverlay {
        ConfigOverlay {
            sample_each: upper.sample_each.or(self.sample_each),
            initial_baseline: upper.initial_baseline.or(self.initial_baseline),
            points_to_alarm: upper.points_to_alarm.or(self.points_to_alarm),
            wait_usec: upper.wait_usec.or(self.wait_usec),
            multiplier: upper.multiplier.or(self.multiplier),
            smoothing: upper.smoothing.or(self.smoothing),
            pattern_usec: upper.pattern_usec.or(self.pattern_usec),
        }
    }

    /// Fills the gaps with defaults and checks every constraint, reporting all
    /// offending fields at once.
    pub fn resolve(&self) -> Result<DetectorConfig, ConfigError> {
        let defaults = DetectorConfig::default();
        let mut invalid = Vec::new();

        let mut count = |name: &str, raw: Option<i64>, default: u32| -> u32 {
            let value = raw.unwrap_or(i64::from(default));
            match u32::try_from(value) {
                Ok(v) if v >= 1 => v,
                _ => {
                    invalid.push(format!("{}={}", name, value));
                    default
                }
            }
        };
        let sample_each = count("sample_each", self.sample_each, defaults.sample_each);
        let points_to_alarm = count("points_to_alarm", self.points_to_alarm, defaults.points_to_alarm);
        let multiplier = count("multiplier", self.multiplier, defaults.multiplier);
        let smoothing = count("smoothing", self.smoothing, defaults.smoothing);

        let mut duration = |name: &str, raw: Option<i64>, default: i64| -> i64 {
            let value = raw.unwrap_or(default);
            if value < 1 {
                invalid.push(format!("{}={}", name, value));
            }
            value
        };
        let wait_usec = duration("wait_usec", self.wait_usec, defaults.wait_usec);
        let pattern_usec = duration("pattern_usec", self.pattern_usec, defaults.pattern_usec);

        let initial_baseline = self.initial_baseline.unwrap_or(defaults.initial_baseline);
        if !(initial_baseline >= 1.0 && initial_baseline.is_finite()) {
            invalid.push(format!("initial_baseline={}", initial_baseline));
        }

        if !invalid.is_empty() {
            return Err(ConfigError::OutOfRange { fields: invalid });
        }

        Ok(DetectorConfig {
            sample_each,
            initial_baseline,
            points_to_alarm,
            wait_usec,
            multiplier,
            smoothing,
            pattern_usec,
        })
    }
}

#[derive(Decode, Debug, Clone, Default)]
pub struct ConfigFile {
    #[knuffel(child)]
    pub detector: Option<DetectorSection>,
}

#[derive(Decode, Debug, Clone, Default, PartialEq)]
pub struct DetectorSection {
    #[knuffel(property(name = "sample-each"))]
    pub sample_each: Option<i64>,
    #[knuffel(property(name = "initial-baseline"))]
    pub initial_baseline: Option<Real>,
    #[knuffel(property(name = "points-to-alarm"))]
    pub points_to_alarm: Option<i64>,
    #[knuffel(property(name = "wait-usec"))]
    pub wait_usec: Option<i64>,
    #[knuffel(property(name = "multiplier"))]
    pub multiplier: Option<i64>,
    #[knuffel(property(name = "smoothing"))]
    pub smoothing: Option<i64>,
    #[knuffel(property(name = "pattern-usec"))]
    pub pattern_usec: Option<i64>,
}

/// A real-valued property that also takes integer literals, so `200` and `200.0`
/// read the same.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Real(pub f64);

impl<S: ErrorSpan> DecodeScalar<S> for Real {
    fn type_check(type_name: &Option<Spanned<TypeName, S>>, ctx: &mut Context<S>) {
        <f64 as DecodeScalar<S>>::type_check(type_name, ctx)
    }

    fn raw_decode(value: &Spanned<Literal, S>, ctx: &mut Context<S>) -> Result<Self, DecodeError<S>> {
        let parsed = match &**value {
            Literal::Decimal(decimal) => f64::try_from(decimal).map_err(|e| e.to_string()),
            Literal::Int(integer) => i64::try_from(integer)
                .map(|v| v as f64)
                .map_err(|e| e.to_string()),
            _ => {
                ctx.emit_error(DecodeError::scalar_kind(Kind::Decimal, value));
                return Ok(Real(0.0));
            }
        };
        match parsed {
            Ok(v) => Ok(Real(v)),
            Err(e) => {
                ctx.emit_error(DecodeError::conversion(value, e));
                Ok(Real(0.0))
            }
        }
    }
}

impl ConfigFile {
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let content = std::fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.to_path_buf(),
            source,
        })?;
        let file_name = path
            .file_name()
            .and_then(|n| n.to_str())
            .unwrap_or("config.kdl");
        knuffel::parse::<ConfigFile>(file_name, &content).map_err(|source| ConfigError::Parse {
            path: path.to_path_buf(),
            source,
        })
    }

    pub fn overlay(&self) -> ConfigOverlay {
        match &self.detector {
            Some(section) => ConfigOverlay {
                sample_each: section.sample_each,
                initial_baseline: section.initial_baseline.map(|Real(v)| v),
                points_to_alarm: section.points_to_alarm,
                wait_usec: section.wait_usec,
                multiplier: section.multiplier,
                smoothing: section.smoothing,
                pattern_usec: section.pattern_usec,
            },
            None => ConfigOverlay::default(),
        }
    }
}

/// Per-user location of the config file, e.g. `~/.config/fp-patterns/config.kdl`.
pub fn default_config_path() -> Option<PathBuf> {
    ProjectDirs::from("org", "fingerprints", "fp-patterns")
        .map(|dirs| dirs.config_dir().join("config.kdl"))
}

#[derive(Debug, Clone, PartialEq)]
pub struct ResolvedConfig {
    pub config: DetectorConfig,
    /// Config file that contributed values, if any.
    pub file: Option<PathBuf>,
}

/// Layers defaults, the config file and the command-line values.
///
/// An explicit path must exist. Without one, the per-user default file is used only
/// when it is present.
pub fn resolve(explicit: Option<&Path>, cli: ConfigOverlay) -> Result<ResolvedConfig, ConfigError> {
    let file = match explicit {
        Some(path) => Some(path.to_path_buf()),
        None => default_config_path().filter(|path| path.is_file()),
    };

    let mut overlay = ConfigOverlay::default();
    if let Some(path) = &file {
        let from_file = ConfigFile::load(path)?.overlay();
        debug!(
            "{} parameter(s) taken from {}",
            from_file.provided(),
            path.display()
        );
        overlay = overlay.layer(from_file);
    }
    if cli.provided() > 0 {
        debug!("{} parameter(s) taken from the command line", cli.provided());
    }
    overlay = overlay.layer(cli);

    Ok(ResolvedConfig {
        config: overlay.resolve()?,
        file,
    })
}
