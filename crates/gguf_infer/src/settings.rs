//! Ambient engine configuration: compute precision, validation strictness,
//! prompt length limit, and log directory, loadable from a JSON file the way
//! `ProjectConfig` loads a training project's settings.

use std::path::Path;

use candle_core::DType;
use serde::{Deserialize, Serialize};

use crate::error::EngineError;
use crate::materializer::ValidationLevel;

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ValidationLevelSetting {
    None,
    Partial(usize),
    Full,
}

impl From<ValidationLevelSetting> for ValidationLevel {
    fn from(setting: ValidationLevelSetting) -> Self {
        match setting {
            ValidationLevelSetting::None => ValidationLevel::None,
            ValidationLevelSetting::Partial(sample_size) => ValidationLevel::Partial(sample_size),
            ValidationLevelSetting::Full => ValidationLevel::Full,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ComputePrecisionSetting {
    F16,
    F32,
}

impl From<ComputePrecisionSetting> for DType {
    fn from(setting: ComputePrecisionSetting) -> Self {
        match setting {
            ComputePrecisionSetting::F16 => DType::F16,
            ComputePrecisionSetting::F32 => DType::F32,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EngineSettings {
    #[serde(default = "default_validation_level")]
    pub validation_level: ValidationLevelSetting,
    #[serde(default = "default_compute_precision")]
    pub compute_precision: ComputePrecisionSetting,
    #[serde(default = "default_max_prompt_length")]
    pub max_prompt_length: usize,
    #[serde(default = "default_log_directory")]
    pub log_directory: String,
}

fn default_validation_level() -> ValidationLevelSetting {
    ValidationLevelSetting::Partial(256)
}

fn default_compute_precision() -> ComputePrecisionSetting {
    ComputePrecisionSetting::F16
}

fn default_max_prompt_length() -> usize {
    4096
}

fn default_log_directory() -> String {
    "logs".to_string()
}

impl Default for EngineSettings {
    fn default() -> Self {
        EngineSettings {
            validation_level: default_validation_level(),
            compute_precision: default_compute_precision(),
            max_prompt_length: default_max_prompt_length(),
            log_directory: default_log_directory(),
        }
    }
}

impl EngineSettings {
    /// Loads settings from a JSON file; any field the file omits falls back
    /// to its default rather than failing the load.
    pub fn from_file(path: &Path) -> Result<Self, EngineError> {
        let text = std::fs::read_to_string(path)?;
        serde_json::from_str(&text).map_err(|source| EngineError::Config(source.to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn missing_fields_fall_back_to_defaults() {
        let settings: EngineSettings = serde_json::from_str("{}").unwrap();
        assert_eq!(settings.max_prompt_length, default_max_prompt_length());
        assert_eq!(settings.compute_precision, ComputePrecisionSetting::F16);
    }

    #[test]
    fn parses_a_full_settings_file() {
        let json = r#"{
            "validation_level": {"partial": 64},
            "compute_precision": "f32",
            "max_prompt_length": 2048,
            "log_directory": "custom_logs"
        }"#;
        let settings: EngineSettings = serde_json::from_str(json).unwrap();
        assert_eq!(settings.validation_level, ValidationLevelSetting::Partial(64));
        assert_eq!(settings.compute_precision, ComputePrecisionSetting::F32);
        assert_eq!(settings.max_prompt_length, 2048);
        assert_eq!(settings.log_directory, "custom_logs");
    }
}
