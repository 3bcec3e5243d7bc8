/*
 *  Copyright 2025-2026 Colliery Software
 *
 *  Licensed under the Apache License, Version 2.0 (the "License");
 *  you may not use this file except in compliance with the License.
 *  You may obtain a copy of the License at
 *
 *      http://www.apache.org/licenses/LICENSE-2.0
 *
 *  Unless required by applicable law or agreed to in writing, software
 *  distributed under the License is distributed on an "AS IS" BASIS,
 *  WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
 *  See the License for the specific language governing permissions and
 *  limitations under the License.
 */

//! Tracing subscriber setup.
//!
//! [`init`] installs a registry with two layers:
//!
//! - a console layer (plain text or JSON lines) filtered by `RUST_LOG`, or
//!   by the configured default directives when `RUST_LOG` is unset;
//! - a file layer receiving only worker pool events (target
//!   `parcelpoint::pool`) at the pool's log level, written through a
//!   non-blocking appender.
//!
//! Keep the returned [`LoggingGuard`] alive for the life of the process;
//! dropping it flushes and closes the pool log file.

use std::fs;
use std::path::{Path, PathBuf};

use tracing::{Level, Subscriber};
use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::filter::Targets;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::{fmt, EnvFilter, Layer, Registry};

use crate::config::AppConfig;
use crate::error::LoggingError;

/// Target prefix of the worker pool's log records.
pub const POOL_TARGET: &str = "parcelpoint::pool";

const DEFAULT_FILTER: &str = "info";

#[derive(Debug, Clone)]
pub struct LoggingOptions {
    /// Emit console records as JSON lines.
    pub json: bool,
    /// Console directives used when `RUST_LOG` is unset.
    pub default_filter: String,
    /// Pool log file and the minimum level written to it.
    pub pool_log: Option<(PathBuf, Level)>,
}

impl Default for LoggingOptions {
    fn default() -> Self {
        Self {
            json: false,
            default_filter: DEFAULT_FILTER.to_string(),
            pool_log: None,
        }
    }
}

impl LoggingOptions {
    pub fn from_config(config: &AppConfig) -> Self {
        let pool = config.worker_pool_config();
        Self {
            json: config.logging.json,
            default_filter: config
                .logging
                .filter
                .clone()
                .unwrap_or_else(|| DEFAULT_FILTER.to_string()),
            pool_log: Some((pool.log_path().to_path_buf(), pool.log_level())),
        }
    }
}

/// Keeps the non-blocking file writer running.
#[must_use = "dropping the guard stops the pool log writer"]
pub struct LoggingGuard {
    _file: Option<WorkerGuard>,
}

/// Installs the global subscriber described by `options`.
pub fn init(options: &LoggingOptions) -> Result<LoggingGuard, LoggingError> {
    let (subscriber, guard) = build_subscriber(options)?;
    subscriber
        .try_init()
        .map_err(|_| LoggingError::AlreadyInitialized)?;

    tracing::debug!(json = options.json, "Logging initialized");
    Ok(guard)
}

/// Builds the subscriber without installing it.
pub fn build_subscriber(
    options: &LoggingOptions,
) -> Result<(impl Subscriber + Send + Sync + 'static, LoggingGuard), LoggingError> {
    let console_filter = match EnvFilter::try_from_default_env() {
        Ok(filter) => filter,
        Err(_) => EnvFilter::try_new(&options.default_filter).map_err(|e| LoggingError::Filter {
            filter: options.default_filter.clone(),
            reason: e.to_string(),
        })?,
    };

    let console: Box<dyn Layer<Registry> + Send + Sync> = if options.json {
        fmt::layer().json().with_target(true).boxed()
    } else {
        fmt::layer().with_target(true).boxed()
    };

    let (file_layer, file_guard) = match &options.pool_log {
        Some((path, level)) => {
            let (writer, guard) = pool_log_writer(path)?;
            let layer = fmt::layer()
                .with_writer(writer)
                .with_ansi(false)
                .with_target(true)
                .with_filter(Targets::new().with_target(POOL_TARGET, *level));
            (Some(layer), Some(guard))
        }
        None => (None, None),
    };

    let subscriber = tracing_subscriber::registry()
        .with(console.with_filter(console_filter))
        .with(file_layer);

    Ok((subscriber, LoggingGuard { _file: file_guard }))
}

fn pool_log_writer(
    path: &Path,
) -> Result<(tracing_appender::non_blocking::NonBlocking, WorkerGuard), LoggingError> {
    let directory = match path.parent() {
        Some(parent) if !parent.as_os_str().is_empty() => parent.to_path_buf(),
        _ => PathBuf::from("."),
    };
    fs::create_dir_all(&directory).map_err(|source| LoggingError::CreateDir {
        path: directory.clone(),
        source,
    })?;

    let file_name = path
        .file_name()
        .map(|name| name.to_os_string())
        .unwrap_or_else(|| "workerpool.log".into());
    let appender = tracing_appender::rolling::never(directory, file_name);
    Ok(tracing_appender::non_blocking(appender))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_pool_events_reach_file_only_when_targeted() {
        let dir = tempfile::tempdir().unwrap();
        let log_path = dir.path().join("nested").join("workerpool.log");
        let options = LoggingOptions {
            pool_log: Some((log_path.clone(), Level::INFO)),
            ..LoggingOptions::default()
        };

        let (subscriber, guard) = build_subscriber(&options).unwrap();
        tracing::subscriber::with_default(subscriber, || {
            tracing::info!(target: "parcelpoint::pool::default_pool", worker_id = 3, "Worker started");
            tracing::debug!(target: "parcelpoint::pool::default_pool", "Below pool level");
            tracing::info!(target: "parcelpoint::cache", "Cache started");
        });
        drop(guard);

        let contents = fs::read_to_string(&log_path).unwrap();
        assert!(contents.contains("Worker started"));
        assert!(contents.contains("worker_id=3"));
        assert!(!contents.contains("Below pool level"));
        assert!(!contents.contains("Cache started"));
    }

    #[test]
    fn test_invalid_default_filter() {
        if std::env::var_os("RUST_LOG").is_some() {
            return;
        }
        let options = LoggingOptions {
            default_filter: "parcelpoint=loud".to_string(),
            ..LoggingOptions::default()
        };
        assert!(matches!(
            build_subscriber(&options),
            Err(LoggingError::Filter { .. })
        ));
    }

    #[test]
    fn test_options_from_config() {
        let config = AppConfig::default();
        let options = LoggingOptions::from_config(&config);
        assert!(!options.json);
        assert_eq!(options.default_filter, "info");
        let (path, level) = options.pool_log.unwrap();
        assert_eq!(path, PathBuf::from("./logs/workerpool.log"));
        assert_eq!(level, Level::INFO);
    }
}
