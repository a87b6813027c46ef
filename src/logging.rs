//! # Structured Logging Module
//!
//! Environment-aware structured logging that outputs to both console and files
//! for following long-running promotion executions across suspensions.

use chrono::Utc;
use std::fs;
use std::path::PathBuf;
use std::process;
use std::sync::OnceLock;
use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter, Layer};
use uuid::Uuid;

static LOGGER_INITIALIZED: OnceLock<()> = OnceLock::new();

/// Initialize structured logging with environment-specific configuration
pub fn init_structured_logging() {
    LOGGER_INITIALIZED.get_or_init(|| {
        let environment = get_environment();
        let log_level = get_log_level(&environment);

        let console_layer = fmt::layer()
            .with_target(true)
            .with_thread_ids(true)
            .with_level(true)
            .with_ansi(true)
            .with_filter(env_filter(&log_level));

        // File output is best effort; a read-only filesystem still gets console logs
        let log_dir = PathBuf::from("log");
        let file_layer = match fs::create_dir_all(&log_dir) {
            Ok(()) => {
                let pid = process::id();
                let timestamp = Utc::now().format("%Y%m%d_%H%M%S").to_string();
                let file_appender = tracing_appender::rolling::never(
                    &log_dir,
                    format!("{environment}.{pid}.{timestamp}.log"),
                );
                let (file_writer, guard) = tracing_appender::non_blocking(file_appender);
                // The guard flushes on drop; logging lives for the whole process
                std::mem::forget(guard);
                Some(
                    fmt::layer()
                        .with_writer(file_writer)
                        .with_target(true)
                        .with_thread_ids(true)
                        .with_level(true)
                        .with_ansi(false)
                        .json()
                        .with_filter(env_filter(&log_level)),
                )
            }
            Err(_) => None,
        };

        if tracing_subscriber::registry()
            .with(console_layer)
            .with(file_layer)
            .try_init()
            .is_err()
        {
            tracing::debug!("Global tracing subscriber already initialized, keeping it");
        }

        tracing::info!(
            pid = process::id(),
            environment = %environment,
            log_dir = %log_dir.display(),
            "🔧 STRUCTURED LOGGING: Initialized"
        );
    });
}

fn env_filter(default_level: &str) -> EnvFilter {
    EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level))
}

/// Get current environment from environment variables
fn get_environment() -> String {
    std::env::var("PROMOTER_ENV")
        .or_else(|_| std::env::var("APP_ENV"))
        .unwrap_or_else(|_| "development".to_string())
}

/// Get log level based on environment
fn get_log_level(environment: &str) -> String {
    match environment {
        "production" => "info".to_string(),
        _ => "debug".to_string(),
    }
}

/// Log structured data for execution lifecycle operations
pub fn log_execution_operation(
    operation: &str,
    execution_id: Uuid,
    pipeline: Option<&str>,
    status: &str,
    details: Option<&str>,
) {
    tracing::info!(
        operation = %operation,
        execution_id = %execution_id,
        pipeline = pipeline,
        status = %status,
        details = details,
        timestamp = %Utc::now().to_rfc3339(),
        "📋 EXECUTION_OPERATION"
    );
}

/// Log structured data for step operations
pub fn log_step_operation(
    operation: &str,
    execution_id: Uuid,
    step_name: &str,
    attempt: u32,
    status: &str,
    details: Option<&str>,
) {
    tracing::info!(
        operation = %operation,
        execution_id = %execution_id,
        step_name = %step_name,
        attempt = attempt,
        status = %status,
        details = details,
        timestamp = %Utc::now().to_rfc3339(),
        "🔧 STEP_OPERATION"
    );
}

/// Log structured data for callback token operations. The token value itself is never logged.
pub fn log_token_operation(
    operation: &str,
    execution_id: Option<Uuid>,
    status: &str,
    details: Option<&str>,
) {
    tracing::info!(
        operation = %operation,
        execution_id = ?execution_id,
        status = %status,
        details = details,
        timestamp = %Utc::now().to_rfc3339(),
        "🔑 TOKEN_OPERATION"
    );
}

/// Log error with full context
pub fn log_error(component: &str, operation: &str, error: &str, context: Option<&str>) {
    tracing::error!(
        component = %component,
        operation = %operation,
        error = %error,
        context = context,
        timestamp = %Utc::now().to_rfc3339(),
        "❌ ERROR"
    );
}
