//! Node configuration loaded from TOML.
//!
//! ```toml
//! [cluster]
//! size = 4
//! seed = 7
//!
//! [consensus]
//! variant = "two_chain"
//! view_timeout_ms = 500
//!
//! [runner]
//! channel_capacity = 4096
//!
//! [telemetry]
//! filter = "info,canopy=debug"
//! ```
//!
//! Every section and field is optional.

use canopy_bft::BftConfig;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use thiserror::Error;

/// Errors loading a [`NodeConfig`].
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read {path}: {source}")]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to parse {path}: {source}")]
    Parse {
        path: PathBuf,
        #[source]
        source: toml::de::Error,
    },

    #[error("invalid configuration: {0}")]
    Invalid(String),
}

/// Full configuration of a local cluster run.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct NodeConfig {
    pub cluster: ClusterConfig,
    /// Consensus tunables shared by every replica.
    pub consensus: BftConfig,
    pub runner: RunnerConfig,
    pub telemetry: TelemetrySettings,
}

/// Committee shape.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ClusterConfig {
    /// Number of replicas.
    pub size: usize,
    /// Seed for deterministic key derivation.
    pub seed: u64,
}

impl Default for ClusterConfig {
    fn default() -> Self {
        Self { size: 4, seed: 0 }
    }
}

/// Runner tunables.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RunnerConfig {
    /// Capacity of each replica's inbound event channel.
    pub channel_capacity: usize,
}

impl Default for RunnerConfig {
    fn default() -> Self {
        Self {
            channel_capacity: 10_000,
        }
    }
}

/// Log output settings.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct TelemetrySettings {
    /// `EnvFilter` directive used when `RUST_LOG` is unset.
    pub filter: String,
    /// Include thread ids in log lines.
    pub thread_ids: bool,
}

impl Default for TelemetrySettings {
    fn default() -> Self {
        Self {
            filter: "info".to_string(),
            thread_ids: false,
        }
    }
}

impl NodeConfig {
    /// Read and validate a TOML file.
    pub fn load(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let text = std::fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.to_path_buf(),
            source,
        })?;
        let config: Self = toml::from_str(&text).map_err(|source| ConfigError::Parse {
            path: path.to_path_buf(),
            source,
        })?;
        config.validate()?;
        Ok(config)
    }

    /// Check cross-field constraints that serde cannot express.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.cluster.size == 0 {
            return Err(ConfigError::Invalid("cluster.size must be at least 1".into()));
        }
        if self.runner.channel_capacity == 0 {
            return Err(ConfigError::Invalid(
                "runner.channel_capacity must be at least 1".into(),
            ));
        }
        if self.consensus.view_timeout_ms == 0 {
            return Err(ConfigError::Invalid(
                "consensus.view_timeout_ms must be at least 1".into(),
            ));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use canopy_bft::ProtocolVariant;

    #[test]
    fn test_sections_are_optional() {
        let config: NodeConfig = toml::from_str(
            r#"
            [cluster]
            size = 7

            [consensus]
            variant = "streamlet"
            "#,
        )
        .unwrap();

        assert_eq!(config.cluster.size, 7);
        assert_eq!(config.cluster.seed, 0);
        assert_eq!(config.consensus.variant, ProtocolVariant::Streamlet);
        assert_eq!(config.runner, RunnerConfig::default());
        assert_eq!(config.telemetry.filter, "info");
    }

    #[test]
    fn test_load_reports_path() {
        let path = std::env::temp_dir().join("canopy-missing-config.toml");
        let _ = std::fs::remove_file(&path);

        let err = NodeConfig::load(&path).unwrap_err();
        assert!(matches!(err, ConfigError::Read { .. }));
        assert!(err.to_string().contains("canopy-missing-config.toml"));
    }

    #[test]
    fn test_load_validates() {
        let path = std::env::temp_dir().join(format!("canopy-config-{}.toml", std::process::id()));
        std::fs::write(&path, "[cluster]\nsize = 0\n").unwrap();

        let err = NodeConfig::load(&path).unwrap_err();
        std::fs::remove_file(&path).unwrap();
        assert!(matches!(err, ConfigError::Invalid(_)));
    }
}
