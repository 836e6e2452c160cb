//! # Logging infrastructure.
//!
//! Structured logging with a runtime-adjustable level:
//! - With a configured log file, all output goes to the file through a
//!   non-blocking writer (the console stays clean for the CLI contract).
//! - Without one, output goes to stderr.
//! - `/loglevel` adjusts the level at runtime through a reload handle; the
//!   requested level is applied atomically.
//!
//! The returned [`LogGuard`] must be kept alive for the process lifetime;
//! dropping it flushes and closes the file writer.

use std::sync::{Mutex, OnceLock};

use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::registry::Registry;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::{reload, EnvFilter};

use crate::config::LogConfig;
use crate::error::Error;

type ReloadHandle = reload::Handle<EnvFilter, Registry>;

static RELOAD: OnceLock<ReloadHandle> = OnceLock::new();

fn current_level() -> &'static Mutex<String> {
    static LEVEL: OnceLock<Mutex<String>> = OnceLock::new();
    LEVEL.get_or_init(|| Mutex::new("info".to_string()))
}

/// Keeps the non-blocking file writer alive.
pub struct LogGuard {
    _file_guard: Option<WorkerGuard>,
}

/// Initializes the global subscriber from the log configuration.
///
/// Idempotent: a second initialization (e.g. several supervisors in one test
/// binary) keeps the first subscriber and succeeds.
pub fn init(cfg: &LogConfig) -> Result<LogGuard, Error> {
    let filter = mk_filter(&cfg.level)?;
    let (filter_layer, handle) = reload::Layer::new(filter);
    let registry = tracing_subscriber::registry().with(filter_layer);

    let (guard, init_result) = if cfg.file.is_empty() {
        let layer = tracing_subscriber::fmt::layer()
            .with_writer(std::io::stderr)
            .with_ansi(false)
            .with_target(true);
        (None, registry.with(layer).try_init())
    } else {
        let path = std::path::Path::new(&cfg.file);
        let dir = path.parent().filter(|p| !p.as_os_str().is_empty());
        if let Some(dir) = dir {
            std::fs::create_dir_all(dir).map_err(|e| Error::Log {
                reason: format!("cannot create log directory {}: {e}", dir.display()),
            })?;
        }
        let file_name = path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_else(|| "loadvisor.log".to_string());
        let appender = tracing_appender::rolling::never(
            dir.unwrap_or_else(|| std::path::Path::new(".")),
            file_name,
        );
        let (writer, file_guard) = tracing_appender::non_blocking(appender);
        let layer = tracing_subscriber::fmt::layer()
            .with_writer(writer)
            .with_ansi(false)
            .with_target(true);
        (Some(file_guard), registry.with(layer).try_init())
    };

    match init_result {
        Ok(()) => {
            let _ = RELOAD.set(handle);
            *current_level().lock().expect("level poisoned") = cfg.level.clone();
            Ok(LogGuard { _file_guard: guard })
        }
        // A subscriber is already installed; keep it and its handle.
        Err(_) => Ok(LogGuard { _file_guard: None }),
    }
}

fn mk_filter(level: &str) -> Result<EnvFilter, Error> {
    EnvFilter::try_new(level).map_err(|_| Error::Log {
        reason: format!("invalid log level '{level}'"),
    })
}

/// Applies a new log level atomically through the reload handle.
pub fn set_level(level: &str) -> Result<(), Error> {
    let filter = mk_filter(level)?;
    let handle = RELOAD.get().ok_or_else(|| Error::Log {
        reason: "logging is not initialized".to_string(),
    })?;
    handle.reload(filter).map_err(|e| Error::Log {
        reason: format!("cannot reload log level: {e}"),
    })?;
    *current_level().lock().expect("level poisoned") = level.to_string();
    Ok(())
}

/// Returns the currently applied log level.
pub fn level() -> String {
    current_level().lock().expect("level poisoned").clone()
}

/// Returns true if `level` names a plain severity we accept over HTTP.
pub fn is_valid_level(level: &str) -> bool {
    matches!(
        level.to_ascii_lowercase().as_str(),
        "trace" | "debug" | "info" | "warn" | "error"
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn filter_rejects_garbage_levels() {
        assert!(mk_filter("info").is_ok());
        assert!(mk_filter("=][=").is_err());
    }

    #[test]
    fn plain_severities_validate() {
        for level in ["trace", "debug", "info", "warn", "error", "WARN"] {
            assert!(is_valid_level(level), "{level}");
        }
        assert!(!is_valid_level("loud"));
    }
}
