//! Run options and `gprof.toml` loading.
//!
//! Every field has a default, so a config file only needs the keys it
//! changes:
//!
//! ```toml
//! max_depth = 10
//! mode = "timecalls"
//! reduction_factor = 4
//! ```

use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::Path;
use std::str::FromStr;
use thiserror::Error;

use crate::graph::DEFAULT_TIME_THRESHOLD;
use crate::registry::FunctionId;

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("failed to read config {path}: {source}")]
    Read {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to parse config {path}: {source}")]
    Parse {
        path: String,
        #[source]
        source: toml::de::Error,
    },

    #[error("unknown feature mode '{0}', expected 'time' or 'timecalls'")]
    UnknownMode(String),

    #[error("feature_stride {0} leaves no room for time and calls, need at least {min}", min = MIN_FEATURE_STRIDE)]
    FeatureStride(u32),
}

/// Smallest stride that keeps `id*stride+1` and `id*stride+2` clear of the
/// next function's slots.
pub const MIN_FEATURE_STRIDE: u32 = 3;

/// Which per-function values a feature line carries.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FeatureMode {
    /// `id:time`
    #[default]
    Time,
    /// `id*stride+1:time id*stride+2:calls`
    TimeCalls,
}

impl FromStr for FeatureMode {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "time" => Ok(FeatureMode::Time),
            "timecalls" => Ok(FeatureMode::TimeCalls),
            other => Err(ConfigError::UnknownMode(other.to_string())),
        }
    }
}

impl fmt::Display for FeatureMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FeatureMode::Time => write!(f, "time"),
            FeatureMode::TimeCalls => write!(f, "timecalls"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case", default)]
pub struct Config {
    /// Deepest node, by minimum depth, that still contributes a feature.
    pub max_depth: u32,

    /// Fraction of total time a function needs to be kept as a node.
    pub time_threshold: f64,

    pub mode: FeatureMode,

    /// Number of consecutive intervals combined into one, if any.
    pub reduction_factor: Option<usize>,

    /// First identity handed out by the registry.
    pub id_base: FunctionId,

    /// Drop edges whose endpoint has no node instead of keeping them.
    pub strict_endpoints: bool,

    /// Add functions seen only in the flat profile as edge-less nodes.
    pub flat_only_nodes: bool,

    /// Express feature times as a fraction of total execution time.
    pub normalize_time: bool,

    /// Index spacing between functions in `timecalls` mode.
    pub feature_stride: u32,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            max_depth: 20,
            time_threshold: DEFAULT_TIME_THRESHOLD,
            mode: FeatureMode::Time,
            reduction_factor: None,
            id_base: 0,
            strict_endpoints: false,
            flat_only_nodes: true,
            normalize_time: false,
            feature_stride: 10,
        }
    }
}

impl Config {
    /// Load a config file, falling back to defaults when it is missing or
    /// cannot be used.
    pub fn load_optional(path: &Path) -> Self {
        match Self::load(path) {
            Ok(config) => config,
            Err(ConfigError::Read { source, .. }) if source.kind() == std::io::ErrorKind::NotFound => {
                Self::default()
            }
            Err(err) => {
                tracing::warn!("{err}, using defaults");
                Self::default()
            }
        }
    }

    /// Load a config file, failing on any problem.
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let text = std::fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.display().to_string(),
            source,
        })?;
        let config: Config = toml::from_str(&text).map_err(|source| ConfigError::Parse {
            path: path.display().to_string(),
            source,
        })?;
        config.validate()?;
        Ok(config)
    }

    /// Check values that deserialize fine but cannot be used together.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.feature_stride < MIN_FEATURE_STRIDE {
            return Err(ConfigError::FeatureStride(self.feature_stride));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn partial_file_keeps_other_defaults() {
        let config: Config = toml::from_str("max_depth = 3\nmode = \"timecalls\"\n").unwrap();

        assert_eq!(config.max_depth, 3);
        assert_eq!(config.mode, FeatureMode::TimeCalls);
        assert_eq!(config.time_threshold, 0.05);
        assert_eq!(config.feature_stride, 10);
        assert!(config.flat_only_nodes);
        assert_eq!(config.reduction_factor, None);
    }

    #[test]
    fn mode_from_str() {
        assert_eq!("time".parse::<FeatureMode>().unwrap(), FeatureMode::Time);
        assert_eq!("TimeCalls".parse::<FeatureMode>().unwrap(), FeatureMode::TimeCalls);
        assert!(matches!(
            "calls".parse::<FeatureMode>(),
            Err(ConfigError::UnknownMode(_))
        ));
        assert_eq!(FeatureMode::TimeCalls.to_string(), "timecalls");
    }

    #[test]
    fn load_optional_missing_file_uses_defaults() {
        let config = Config::load_optional(Path::new("/nonexistent/gprof.toml"));
        assert_eq!(config, Config::default());
    }

    #[test]
    fn load_reports_bad_toml() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("gprof.toml");
        std::fs::write(&path, "max_depth = \"deep\"").unwrap();

        assert!(matches!(Config::load(&path), Err(ConfigError::Parse { .. })));
        assert_eq!(Config::load_optional(&path), Config::default());
    }

    #[test]
    fn load_rejects_colliding_stride() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("gprof.toml");
        std::fs::write(&path, "mode = \"timecalls\"\nfeature_stride = 2\n").unwrap();

        assert!(matches!(Config::load(&path), Err(ConfigError::FeatureStride(2))));
        assert_eq!(Config::load_optional(&path), Config::default());
        assert!(Config::default().validate().is_ok());
    }

    #[test]
    fn load_reads_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("gprof.toml");
        std::fs::write(&path, "time_threshold = 0.1\nreduction_factor = 4\n").unwrap();

        let config = Config::load(&path).unwrap();
        assert_eq!(config.time_threshold, 0.1);
        assert_eq!(config.reduction_factor, Some(4));
    }
}
