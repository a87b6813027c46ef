//! Configuration Error Types
//!
//! Specific, actionable error messages for configuration loading and validation.

use std::path::PathBuf;
use thiserror::Error;

/// Configuration-related errors with detailed context
#[derive(Debug, Error)]
pub enum ConfigurationError {
    /// Base configuration file missing from the configuration directory
    #[error("Configuration file not found. Searched paths: {searched_paths:?}")]
    ConfigFileNotFound { searched_paths: Vec<PathBuf> },

    /// Layered sources could not be read or merged
    #[error("Failed to load configuration for environment '{environment}': {error}")]
    EnvironmentConfigError { environment: String, error: String },

    /// Invalid configuration value
    #[error("Invalid value '{value}' for field '{field}': {context}")]
    InvalidValue {
        field: String,
        value: String,
        context: String,
    },

    /// Missing required configuration field
    #[error("Missing required configuration field '{field}' in {context}")]
    MissingRequiredField { field: String, context: String },
}

impl ConfigurationError {
    /// Create a configuration file not found error
    pub fn config_file_not_found(searched_paths: Vec<PathBuf>) -> Self {
        Self::ConfigFileNotFound { searched_paths }
    }

    /// Create an environment configuration error
    pub fn environment_config_error<E: Into<String>, R: std::fmt::Display>(
        environment: E,
        error: R,
    ) -> Self {
        Self::EnvironmentConfigError {
            environment: environment.into(),
            error: error.to_string(),
        }
    }

    /// Create an invalid value error
    pub fn invalid_value<F: Into<String>, V: Into<String>, C: Into<String>>(
        field: F,
        value: V,
        context: C,
    ) -> Self {
        Self::InvalidValue {
            field: field.into(),
            value: value.into(),
            context: context.into(),
        }
    }

    /// Create a missing required field error
    pub fn missing_required_field<F: Into<String>, C: Into<String>>(field: F, context: C) -> Self {
        Self::MissingRequiredField {
            field: field.into(),
            context: context.into(),
        }
    }
}

pub type ConfigResult<T> = std::result::Result<T, ConfigurationError>;
