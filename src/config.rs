//! Engine configuration.
//!
//! All tunables are injected into `WorkflowEngine::new` as an explicit
//! `EngineConfig` value; nothing in the engine reads process-wide
//! environment variables. The struct can be built in code or loaded from a
//! TOML file:
//!
//! ```toml
//! max_build_attempts = 3
//! max_test_deploy_attempts = 3
//! stage_timeout_secs = 300
//! memory_capacity = 20
//!
//! [test_generator]
//! provider = "anthropic"
//! model = "large"
//! max_output_tokens = 8192
//!
//! [primary_generator]
//! provider = "anthropic"
//! model = "large"
//! max_output_tokens = 16384
//! ```

use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::Duration;

use crate::errors::ConfigError;

/// Provider settings for one generator collaborator.
///
/// The engine carries these as opaque data; the embedding application reads
/// them when constructing its `Generator` implementations.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct GeneratorSettings {
    /// Provider identifier (e.g. "anthropic", "openai")
    pub provider: String,
    /// Model name or tier within the provider
    pub model: String,
    /// Ceiling on generated output tokens
    pub max_output_tokens: u32,
}

impl Default for GeneratorSettings {
    fn default() -> Self {
        Self {
            provider: "anthropic".to_string(),
            model: "large".to_string(),
            max_output_tokens: 8192,
        }
    }
}

/// Configuration for a workflow engine instance.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    /// Retry budget for the primary build/deploy cycle
    pub max_build_attempts: u32,
    /// Retry budget for test artifact deployment
    pub max_test_deploy_attempts: u32,
    /// Per-stage timeout in seconds; a timed-out collaborator call is a
    /// stage failure, routed like any other failure
    pub stage_timeout_secs: u64,
    /// Size bound on the attempt memory log (successes are never pruned)
    pub memory_capacity: usize,
    /// Settings for the test artifact generator
    pub test_generator: GeneratorSettings,
    /// Settings for the primary artifact generator
    pub primary_generator: GeneratorSettings,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            max_build_attempts: 3,
            max_test_deploy_attempts: 3,
            stage_timeout_secs: 300,
            memory_capacity: 20,
            test_generator: GeneratorSettings::default(),
            primary_generator: GeneratorSettings::default(),
        }
    }
}

impl EngineConfig {
    /// Load configuration from a TOML file.
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path).map_err(|source| ConfigError::ReadFailed {
            path: path.to_path_buf(),
            source,
        })?;

        let config: EngineConfig =
            toml::from_str(&content).map_err(|source| ConfigError::ParseFailed {
                path: path.to_path_buf(),
                source,
            })?;

        config.validate()?;
        Ok(config)
    }

    /// Check that the configuration is internally consistent.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.max_build_attempts == 0 {
            return Err(ConfigError::Invalid {
                field: "max_build_attempts",
                message: "must be at least 1".into(),
            });
        }
        if self.max_test_deploy_attempts == 0 {
            return Err(ConfigError::Invalid {
                field: "max_test_deploy_attempts",
                message: "must be at least 1".into(),
            });
        }
        if self.stage_timeout_secs == 0 {
            return Err(ConfigError::Invalid {
                field: "stage_timeout_secs",
                message: "must be greater than zero".into(),
            });
        }
        if self.memory_capacity == 0 {
            return Err(ConfigError::Invalid {
                field: "memory_capacity",
                message: "must be at least 1".into(),
            });
        }
        Ok(())
    }

    /// Per-stage timeout as a `Duration`.
    pub fn stage_timeout(&self) -> Duration {
        Duration::from_secs(self.stage_timeout_secs)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use tempfile::tempdir;

    #[test]
    fn test_default_config() {
        let config = EngineConfig::default();
        assert_eq!(config.max_build_attempts, 3);
        assert_eq!(config.max_test_deploy_attempts, 3);
        assert_eq!(config.stage_timeout(), Duration::from_secs(300));
        assert_eq!(config.memory_capacity, 20);
        config.validate().unwrap();
    }

    #[test]
    fn test_load_full_file() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("pipewright.toml");
        fs::write(
            &path,
            r#"
max_build_attempts = 5
stage_timeout_secs = 120

[primary_generator]
provider = "openai"
model = "small"
max_output_tokens = 4096
"#,
        )
        .unwrap();

        let config = EngineConfig::load(&path).unwrap();
        assert_eq!(config.max_build_attempts, 5);
        assert_eq!(config.stage_timeout_secs, 120);
        // Unspecified sections keep defaults
        assert_eq!(config.max_test_deploy_attempts, 3);
        assert_eq!(config.test_generator, GeneratorSettings::default());
        assert_eq!(config.primary_generator.provider, "openai");
        assert_eq!(config.primary_generator.max_output_tokens, 4096);
    }

    #[test]
    fn test_load_missing_file() {
        let result = EngineConfig::load(Path::new("/nonexistent/pipewright.toml"));
        assert!(matches!(result, Err(ConfigError::ReadFailed { .. })));
    }

    #[test]
    fn test_load_invalid_toml() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("pipewright.toml");
        fs::write(&path, "max_build_attempts = [not toml").unwrap();

        let result = EngineConfig::load(&path);
        assert!(matches!(result, Err(ConfigError::ParseFailed { .. })));
    }

    #[test]
    fn test_zero_budget_rejected() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("pipewright.toml");
        fs::write(&path, "max_build_attempts = 0").unwrap();

        let result = EngineConfig::load(&path);
        match result {
            Err(ConfigError::Invalid { field, .. }) => {
                assert_eq!(field, "max_build_attempts");
            }
            other => panic!("Expected Invalid error, got {:?}", other),
        }
    }

    #[test]
    fn test_zero_timeout_rejected() {
        let config = EngineConfig {
            stage_timeout_secs: 0,
            ..EngineConfig::default()
        };
        assert!(matches!(
            config.validate(),
            Err(ConfigError::Invalid {
                field: "stage_timeout_secs",
                ..
            })
        ));
    }

    #[test]
    fn test_config_roundtrip() {
        let config = EngineConfig {
            max_build_attempts: 4,
            ..EngineConfig::default()
        };
        let serialized = toml::to_string(&config).unwrap();
        let parsed: EngineConfig = toml::from_str(&serialized).unwrap();
        assert_eq!(config, parsed);
    }
}
