//! Configuration types for map comparison.

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::core::labels::{DynamicClassSet, DEFAULT_DYNAMIC_CLASSES};
use crate::processors::complement::DEFAULT_THRESHOLD_SQ;

/// Path used for every input that was never configured. It does not exist,
/// so loading it fails and the run aborts before any comparison.
pub const PLACEHOLDER_PATH: &str = "/path/to/unset.pcd";

/// Names of the removal algorithms compared by default.
pub const DEFAULT_CANDIDATES: [&str; 4] = ["octomap", "pplremover", "removert", "erasor"];

/// Errors that can occur while reading or writing configuration.
#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("failed to access config '{path}': {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("invalid YAML in '{path}': {source}")]
    Yaml {
        path: PathBuf,
        #[source]
        source: serde_yaml::Error,
    },

    #[error("invalid configuration: {0}")]
    Invalid(String),
}

/// Result type for configuration operations.
pub type Result<T> = std::result::Result<T, ConfigError>;

fn placeholder() -> PathBuf {
    PathBuf::from(PLACEHOLDER_PATH)
}

/// One candidate static map produced by a removal algorithm.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CandidateInput {
    /// Algorithm name; also the publishing channel prefix.
    pub name: String,

    #[serde(default = "placeholder")]
    pub path: PathBuf,
}

/// Input point cloud files.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct InputConfig {
    /// Reference (raw) map
    #[serde(default = "placeholder")]
    pub raw: PathBuf,

    /// Candidate maps, compared in this order
    #[serde(default = "default_candidates")]
    pub candidates: Vec<CandidateInput>,
}

fn default_candidates() -> Vec<CandidateInput> {
    DEFAULT_CANDIDATES
        .iter()
        .map(|name| CandidateInput {
            name: name.to_string(),
            path: placeholder(),
        })
        .collect()
}

impl Default for InputConfig {
    fn default() -> Self {
        Self {
            raw: placeholder(),
            candidates: default_candidates(),
        }
    }
}

impl InputConfig {
    /// Point the named candidate at `path`, adding it if it is not listed.
    pub fn set_candidate(&mut self, name: &str, path: PathBuf) {
        match self.candidates.iter_mut().find(|c| c.name == name) {
            Some(candidate) => candidate.path = path,
            None => self.candidates.push(CandidateInput {
                name: name.to_string(),
                path,
            }),
        }
    }
}

/// Semantic label settings.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LabelConfig {
    /// Semantic class ids treated as moving objects
    #[serde(default = "default_dynamic_classes")]
    pub dynamic_classes: Vec<u32>,
}

fn default_dynamic_classes() -> Vec<u32> {
    DEFAULT_DYNAMIC_CLASSES.to_vec()
}

impl Default for LabelConfig {
    fn default() -> Self {
        Self {
            dynamic_classes: default_dynamic_classes(),
        }
    }
}

impl LabelConfig {
    pub fn class_set(&self) -> DynamicClassSet {
        DynamicClassSet::new(self.dynamic_classes.iter().copied())
    }
}

/// Complement computation settings.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ComplementConfig {
    /// Tolerance compared against the *squared* nearest-neighbor distance.
    /// The default 0.03 corresponds to about 0.173 linear units.
    #[serde(default = "default_threshold_sq")]
    pub threshold_sq: f32,

    /// Linear distance tolerance. When set it replaces `threshold_sq` with
    /// its square.
    #[serde(default)]
    pub max_distance: Option<f32>,
}

fn default_threshold_sq() -> f32 {
    DEFAULT_THRESHOLD_SQ
}

impl Default for ComplementConfig {
    fn default() -> Self {
        Self {
            threshold_sq: default_threshold_sq(),
            max_distance: None,
        }
    }
}

impl ComplementConfig {
    /// The squared-distance tolerance actually used.
    pub fn effective_threshold_sq(&self) -> f32 {
        match self.max_distance {
            Some(d) => d * d,
            None => self.threshold_sq,
        }
    }
}

/// Periodic emission settings.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PublishConfig {
    /// Emission rate in Hz
    #[serde(default = "default_rate_hz")]
    pub rate_hz: f64,

    /// Directory the file sink writes one cloud per channel into.
    /// When unset, emissions are only logged.
    #[serde(default)]
    pub output_dir: Option<PathBuf>,

    /// Stop after this many cycles (runs until interrupted when unset)
    #[serde(default)]
    pub max_cycles: Option<u64>,

    /// Log a progress line every this many cycles (0 disables)
    #[serde(default = "default_log_every")]
    pub log_every: u64,
}

fn default_rate_hz() -> f64 {
    2.0
}

fn default_log_every() -> u64 {
    2
}

impl Default for PublishConfig {
    fn default() -> Self {
        Self {
            rate_hz: default_rate_hz(),
            output_dir: None,
            max_cycles: None,
            log_every: default_log_every(),
        }
    }
}

/// Main configuration combining all sub-configs.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct CompareConfig {
    #[serde(default)]
    pub inputs: InputConfig,

    #[serde(default)]
    pub labels: LabelConfig,

    #[serde(default)]
    pub complement: ComplementConfig,

    #[serde(default)]
    pub publish: PublishConfig,
}

impl CompareConfig {
    /// Load configuration from a YAML file.
    pub fn from_yaml<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        let content = std::fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        let config: CompareConfig =
            serde_yaml::from_str(&content).map_err(|source| ConfigError::Yaml {
                path: path.to_path_buf(),
                source,
            })?;
        config.validate()?;
        Ok(config)
    }

    /// Save configuration to a YAML file.
    pub fn to_yaml<P: AsRef<Path>>(&self, path: P) -> Result<()> {
        let path = path.as_ref();
        let content = serde_yaml::to_string(self).map_err(|source| ConfigError::Yaml {
            path: path.to_path_buf(),
            source,
        })?;
        std::fs::write(path, content).map_err(|source| ConfigError::Io {
            path: path.to_path_buf(),
            source,
        })
    }

    /// Reject values no run can use.
    pub fn validate(&self) -> Result<()> {
        let threshold = self.complement.effective_threshold_sq();
        if !threshold.is_finite() || threshold < 0.0 {
            return Err(ConfigError::Invalid(format!(
                "complement threshold must be a non-negative number, got {}",
                threshold
            )));
        }
        if !(self.publish.rate_hz > 0.0 && self.publish.rate_hz.is_finite()) {
            return Err(ConfigError::Invalid(format!(
                "publish rate must be positive, got {}",
                self.publish.rate_hz
            )));
        }
        let mut names: Vec<&str> = self.inputs.candidates.iter().map(|c| c.name.as_str()).collect();
        names.sort_unstable();
        if let Some(dup) = names.windows(2).find(|w| w[0] == w[1]) {
            return Err(ConfigError::Invalid(format!("duplicate candidate name '{}'", dup[0])));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn test_default_config() {
        let config = CompareConfig::default();
        assert_eq!(config.inputs.raw, PathBuf::from(PLACEHOLDER_PATH));
        assert_eq!(config.inputs.candidates.len(), 4);
        assert_eq!(config.inputs.candidates[3].name, "erasor");
        assert_eq!(config.labels.dynamic_classes, (252..=259).collect::<Vec<u32>>());
        assert_eq!(config.complement.effective_threshold_sq(), 0.03);
        assert_eq!(config.publish.rate_hz, 2.0);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_partial_yaml_uses_defaults() {
        let yaml = "inputs:\n  raw: /data/raw.pcd\ncomplement:\n  max_distance: 0.5\n";
        let config: CompareConfig = serde_yaml::from_str(yaml).unwrap();
        assert_eq!(config.inputs.raw, PathBuf::from("/data/raw.pcd"));
        assert_eq!(config.inputs.candidates.len(), 4);
        assert_eq!(config.complement.effective_threshold_sq(), 0.25);
        assert_eq!(config.publish.log_every, 2);
    }

    #[test]
    fn test_yaml_round_trip_file() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("compare.yaml");

        let mut config = CompareConfig::default();
        config.inputs.set_candidate("erasor", PathBuf::from("/maps/erasor.pcd"));
        config.labels.dynamic_classes = vec![10, 20];
        config.to_yaml(&path).unwrap();

        let loaded = CompareConfig::from_yaml(&path).unwrap();
        assert_eq!(loaded, config);
        assert!(loaded.labels.class_set().is_dynamic(20));
    }

    #[test]
    fn test_set_candidate_adds_unknown() {
        let mut inputs = InputConfig::default();
        inputs.set_candidate("dufomap", PathBuf::from("d.pcd"));
        assert_eq!(inputs.candidates.len(), 5);
        assert_eq!(inputs.candidates[4].path, PathBuf::from("d.pcd"));
    }

    #[test]
    fn test_validate_rejects_bad_values() {
        let mut config = CompareConfig::default();
        config.publish.rate_hz = 0.0;
        assert!(matches!(config.validate(), Err(ConfigError::Invalid(_))));

        let mut config = CompareConfig::default();
        config.complement.threshold_sq = -1.0;
        assert!(config.validate().is_err());

        let mut config = CompareConfig::default();
        config.inputs.candidates[1].name = "octomap".to_string();
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_missing_config_file() {
        let result = CompareConfig::from_yaml("/nonexistent/compare.yaml");
        assert!(matches!(result, Err(ConfigError::Io { .. })));
    }
}
