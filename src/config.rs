use anyhow::Result;
use ::config::{Config, Environment, File};
use serde::{Deserialize, Serialize};
use std::path::Path;

/// Configuration file looked up in the current directory
pub const CONFIG_FILE_NAME: &str = "jelly-migrator.toml";
/// Prefix of environment variable overrides
pub const ENV_PREFIX: &str = "JELLY_MIGRATOR";

/// Main configuration structure for Jelly Migrator
///
/// The migration itself is fixed; only how the run reports itself can be
/// configured.
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
#[serde(default)]
pub struct MigratorConfig {
    /// Observability settings
    pub observability: ObservabilityConfig,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct ObservabilityConfig {
    /// Log level or `EnvFilter` directive, used when `RUST_LOG` is unset
    pub log_level: String,
    /// Emit logs as JSON lines instead of human-readable text
    pub json_logs: bool,
}

impl Default for ObservabilityConfig {
    fn default() -> Self {
        Self {
            log_level: "warn".to_string(),
            json_logs: false,
        }
    }
}

impl MigratorConfig {
    /// Load configuration from multiple sources with precedence:
    /// 1. Default values
    /// 2. `jelly-migrator.toml` in the current directory
    /// 3. Environment variables (e.g. `JELLY_MIGRATOR_OBSERVABILITY__LOG_LEVEL`)
    pub fn load() -> Result<Self> {
        Self::load_from(Path::new(CONFIG_FILE_NAME))
    }

    /// Same as [`MigratorConfig::load`] with an explicit configuration file
    pub fn load_from(path: &Path) -> Result<Self> {
        let mut builder = Config::builder();

        if path.exists() {
            builder = builder.add_source(File::from(path));
        }

        builder = builder.add_source(
            Environment::with_prefix(ENV_PREFIX)
                .prefix_separator("_")
                .separator("__")
                .try_parsing(true),
        );

        let config = builder.build()?;
        let migrator_config: MigratorConfig = config.try_deserialize()?;
        Ok(migrator_config)
    }

    /// Load .env file if it exists
    pub fn load_env_file() -> Result<()> {
        if Path::new(".env").exists() {
            dotenvy::dotenv()?;
            tracing::info!("Loaded environment variables from .env file");
        }
        Ok(())
    }
}
