//! # Structured Logging Module
//!
//! Environment-aware structured logging for consumer services. Console output
//! is always enabled; a JSON file layer is added when a log directory is
//! configured.

use std::fs;
use std::path::Path;
use std::process;
use std::sync::OnceLock;

use chrono::Utc;
use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter, Layer};

use crate::config::LogConfig;

static LOGGER_INITIALIZED: OnceLock<()> = OnceLock::new();
static FILE_GUARD: OnceLock<tracing_appender::non_blocking::WorkerGuard> = OnceLock::new();

/// Initialize structured logging with environment defaults
pub fn init_structured_logging() {
    init_with_config(&LogConfig::default());
}

/// Initialize structured logging, honouring an explicit level and log directory
///
/// Only the first call has any effect.
pub fn init_with_config(config: &LogConfig) {
    LOGGER_INITIALIZED.get_or_init(|| {
        let environment = get_environment();
        let log_level = config
            .level
            .clone()
            .unwrap_or_else(|| get_log_level(&environment).to_string());

        let console = fmt::layer()
            .with_target(true)
            .with_thread_ids(true)
            .with_level(true)
            .with_ansi(true)
            .with_filter(EnvFilter::new(log_level.clone()));

        let file = config
            .directory
            .as_deref()
            .and_then(|dir| file_writer(dir, &environment))
            .map(|writer| {
                fmt::layer()
                    .with_writer(writer)
                    .with_target(true)
                    .with_thread_ids(true)
                    .with_level(true)
                    .with_ansi(false)
                    .json()
                    .with_filter(EnvFilter::new(log_level.clone()))
            });

        let subscriber = tracing_subscriber::registry().with(console).with(file);

        // Another subscriber may already be installed (tests, embedding hosts)
        if subscriber.try_init().is_err() {
            tracing::debug!("Global tracing subscriber already initialized - continuing");
        }

        tracing::info!(
            pid = process::id(),
            environment = %environment,
            level = %log_level,
            "Structured logging initialized"
        );
    });
}

fn file_writer(
    dir: &Path,
    environment: &str,
) -> Option<tracing_appender::non_blocking::NonBlocking> {
    if let Err(e) = fs::create_dir_all(dir) {
        eprintln!("cannot create log directory {}: {e}", dir.display());
        return None;
    }

    let timestamp = Utc::now().format("%Y%m%d_%H%M%S");
    let file_name = format!("{environment}.{}.{timestamp}.log", process::id());
    let appender = tracing_appender::rolling::never(dir, file_name);
    let (writer, guard) = tracing_appender::non_blocking(appender);
    // Guard must outlive the process for buffered lines to flush
    let _ = FILE_GUARD.set(guard);
    Some(writer)
}

/// Get current environment from environment variables
fn get_environment() -> String {
    std::env::var("REACTIVE_ENV")
        .or_else(|_| std::env::var("APP_ENV"))
        .unwrap_or_else(|_| "development".to_string())
}

/// Get log level based on environment
fn get_log_level(environment: &str) -> &'static str {
    match environment {
        "production" => "info",
        _ => "debug",
    }
}

/// Log structured data for a work item moving through a pipeline stage
pub fn log_item_operation(
    service_id: &str,
    stage: &str,
    object_type: &str,
    object_identifier: &str,
    operation: &str,
    details: Option<&str>,
) {
    tracing::info!(
        service_id = %service_id,
        stage = %stage,
        object_type = %object_type,
        object_identifier = %object_identifier,
        operation = %operation,
        details = details,
        "ITEM_OPERATION"
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
        "ERROR"
    );
}
