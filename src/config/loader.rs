//! Configuration Loader
//!
//! Environment-aware configuration loading: YAML discovery, environment detection
//! and layered merging through the `config` crate.

use super::error::{ConfigResult, ConfigurationError};
use super::PromoterConfig;
use std::collections::HashMap;
use std::env;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::{debug, info};

/// Base configuration file name inside the configuration directory
pub const BASE_CONFIG_FILE: &str = "promoter.yaml";

/// Prefix for environment variable overrides (`PROMOTER__ENGINE__POLL_INTERVAL_SECONDS`)
pub const ENV_PREFIX: &str = "PROMOTER";

/// Loaded, validated configuration plus the context it was loaded from
#[derive(Debug)]
pub struct ConfigManager {
    config: PromoterConfig,
    environment: String,
    config_directory: Option<PathBuf>,
}

impl ConfigManager {
    /// Load configuration with environment auto-detection
    pub fn load() -> ConfigResult<Arc<ConfigManager>> {
        Self::load_from_directory(Self::default_config_directory())
    }

    /// Load configuration from a specific directory
    pub fn load_from_directory(config_dir: Option<PathBuf>) -> ConfigResult<Arc<ConfigManager>> {
        let environment = Self::detect_environment();
        Self::load_from_directory_with_env(config_dir, &environment)
    }

    /// Load configuration from a specific directory with explicit environment
    pub fn load_from_directory_with_env(
        config_dir: Option<PathBuf>,
        environment: &str,
    ) -> ConfigResult<Arc<ConfigManager>> {
        Self::load_with_overrides(config_dir, environment, None)
    }

    /// Load configuration with an explicit override map standing in for the process
    /// environment. Useful for tests that must not touch global environment variables.
    pub fn load_with_overrides(
        config_dir: Option<PathBuf>,
        environment: &str,
        overrides: Option<HashMap<String, String>>,
    ) -> ConfigResult<Arc<ConfigManager>> {
        let mut builder = config::Config::builder();

        if let Some(dir) = &config_dir {
            let base = dir.join(BASE_CONFIG_FILE);
            if !base.is_file() {
                return Err(ConfigurationError::config_file_not_found(vec![base]));
            }
            debug!(
                "Loading configuration for environment '{}' from directory: {}",
                environment,
                dir.display()
            );
            builder = builder
                .add_source(config::File::from(base))
                .add_source(
                    config::File::from(Self::environment_file(dir, environment)).required(false),
                );
        }

        let env_source = config::Environment::with_prefix(ENV_PREFIX)
            .prefix_separator("__")
            .separator("__")
            .try_parsing(true)
            .source(overrides);
        builder = builder.add_source(env_source);

        let config: PromoterConfig = builder
            .build()
            .and_then(|c| c.try_deserialize())
            .map_err(|e| ConfigurationError::environment_config_error(environment, e))?;

        config.validate()?;

        info!(
            environment = %environment,
            config_dir = ?config_dir,
            database = if config.database.url.is_some() { "postgres" } else { "in_memory" },
            bind_address = %config.web.bind_address,
            "Configuration loaded successfully"
        );

        Ok(Arc::new(ConfigManager {
            config,
            environment: environment.to_string(),
            config_directory: config_dir,
        }))
    }

    /// Get the loaded configuration
    pub fn config(&self) -> &PromoterConfig {
        &self.config
    }

    pub fn environment(&self) -> &str {
        &self.environment
    }

    pub fn config_directory(&self) -> Option<&Path> {
        self.config_directory.as_deref()
    }

    /// Detect the current environment from the process environment
    pub fn detect_environment() -> String {
        env::var("PROMOTER_ENV")
            .or_else(|_| env::var("APP_ENV"))
            .unwrap_or_else(|_| "development".to_string())
            .to_lowercase()
    }

    fn environment_file(dir: &Path, environment: &str) -> PathBuf {
        dir.join(format!("promoter.{environment}.yaml"))
    }

    /// `./config` when it carries a base file; otherwise defaults plus environment only
    fn default_config_directory() -> Option<PathBuf> {
        let dir = PathBuf::from("config");
        if dir.join(BASE_CONFIG_FILE).is_file() {
            Some(dir)
        } else {
            None
        }
    }
}
