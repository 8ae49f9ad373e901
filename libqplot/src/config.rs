use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

use super::buffer::OpenOptions;
use super::constants::DEFAULT_SIDECAR_NAME;
use super::error::{ConfigError, HintError};
use super::hints::{FixedHints, RawAxisHints};

/// Structure representing the application configuration. Contains pathing and parse options
/// Configs are seralizable and deserializable to YAML using serde and serde_yaml
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Config {
    pub data_path: PathBuf,
    pub recursive: bool,
    pub n_threads: usize,
    pub sidecar_name: String,
    pub qtt_metadata: bool,
    pub normalize_units: bool,
    pub export_matrices: bool,
    pub raw_matrix_hints: Option<RawAxisHints>,
}

impl Default for Config {
    /// Generate a new Config object. The data path will be invalid
    fn default() -> Self {
        Self {
            data_path: PathBuf::from("None"),
            recursive: true,
            n_threads: 1,
            sidecar_name: String::from(DEFAULT_SIDECAR_NAME),
            qtt_metadata: false,
            normalize_units: true,
            export_matrices: false,
            raw_matrix_hints: None,
        }
    }
}

impl Config {
    /// Read the configuration in a YAML file
    /// Returns a Config if successful
    pub fn read_config_file(config_path: &Path) -> Result<Self, ConfigError> {
        if !config_path.exists() {
            return Err(ConfigError::BadFilePath(config_path.to_path_buf()));
        }

        let yaml_str = std::fs::read_to_string(config_path)?;

        Ok(serde_yaml::from_str::<Self>(&yaml_str)?)
    }

    /// Write the configuration as YAML
    pub fn write_config_file(&self, config_path: &Path) -> Result<(), ConfigError> {
        let yaml_str = serde_yaml::to_string(self)?;
        std::fs::write(config_path, yaml_str)?;
        Ok(())
    }

    pub fn is_n_threads_valid(&self) -> bool {
        self.n_threads >= 1
    }

    pub fn open_options(&self) -> OpenOptions {
        OpenOptions {
            sidecar_name: self.sidecar_name.clone(),
            qtt_metadata: self.qtt_metadata,
            normalize_units: self.normalize_units,
        }
    }

    /// Collector answering every raw matrix with the configured hints, if any were given
    pub fn fixed_hints(&self) -> Result<Option<FixedHints>, HintError> {
        self.raw_matrix_hints
            .as_ref()
            .map(FixedHints::new)
            .transpose()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::axis::AxisMeta;
    use crate::hints::RawAxisHint;

    #[test]
    fn test_round_trip_through_yaml() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.yml");
        let config = Config {
            data_path: dir.path().to_path_buf(),
            n_threads: 4,
            raw_matrix_hints: Some(RawAxisHints {
                x: RawAxisHint {
                    start: "0".to_string(),
                    end: "1".to_string(),
                    name: "gate".to_string(),
                    unit: "mV".to_string(),
                },
                y: RawAxisHint::default(),
                z: AxisMeta::new("I", "nA"),
            }),
            ..Config::default()
        };
        config.write_config_file(&path).unwrap();
        let read = Config::read_config_file(&path).unwrap();
        assert_eq!(read, config);
        assert!(read.is_n_threads_valid());
        // y has no numbers, so the hints cannot be used
        assert!(matches!(
            read.fixed_hints(),
            Err(HintError::InvalidAxisHint(_, _))
        ));
    }

    #[test]
    fn test_missing_file() {
        assert!(matches!(
            Config::read_config_file(Path::new("/definitely/not/here.yml")),
            Err(ConfigError::BadFilePath(_))
        ));
        assert!(Config::default().fixed_hints().unwrap().is_none());
    }
}
