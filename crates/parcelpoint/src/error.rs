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

//! Error types for the parcelpoint core.
//!
//! Each subsystem has its own error enum so callers can match on the
//! failures they can actually act on:
//!
//! - [`PoolError`] - submission rejected, shutdown timeout, invalid resize
//! - [`CacheError`] - invalid invalidation pattern
//! - [`RepositoryError`] - persistence port failures (outbox and orders)
//! - [`BrokerError`] - message broker delivery failures
//! - [`DispatchError`] - outbox dispatcher lifecycle
//! - [`OrderError`] - per-order business failures reported in batch results
//! - [`ConfigError`] - configuration loading and validation
//! - [`LoggingError`] - subscriber installation

use std::path::PathBuf;
use thiserror::Error;

/// Errors returned by the worker pool.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum PoolError {
    /// The pool has been shut down and accepts no further work.
    #[error("Worker pool is shutting down")]
    ShuttingDown,

    /// The drain did not finish within the caller's timeout.
    #[error("Worker pool shutdown timed out")]
    ShutdownTimeout,

    /// The caller's cancellation token fired before the task was accepted.
    #[error("Task submission cancelled")]
    Cancelled,

    #[error("Invalid worker count: {0} (must be greater than zero)")]
    InvalidWorkerCount(usize),
}

/// Errors returned by the sharded cache.
#[derive(Debug, Error)]
pub enum CacheError {
    #[error("Invalid invalidation pattern '{pattern}': {source}")]
    InvalidPattern {
        pattern: String,
        #[source]
        source: regex::Error,
    },
}

/// Errors returned by persistence ports.
#[derive(Debug, Error)]
pub enum RepositoryError {
    #[error("Connection pool error: {0}")]
    ConnectionPool(String),

    #[error("Database error: {0}")]
    Database(String),

    #[error("Record not found: {0}")]
    NotFound(String),

    #[error("Record already exists: {0}")]
    Conflict(String),

    #[error("Record changed concurrently: {0}")]
    Stale(String),
}

#[cfg(feature = "postgres")]
impl From<diesel::result::Error> for RepositoryError {
    fn from(err: diesel::result::Error) -> Self {
        match err {
            diesel::result::Error::NotFound => RepositoryError::NotFound(err.to_string()),
            diesel::result::Error::DatabaseError(
                diesel::result::DatabaseErrorKind::UniqueViolation,
                _,
            ) => RepositoryError::Conflict(err.to_string()),
            other => RepositoryError::Database(other.to_string()),
        }
    }
}

/// Errors returned by message broker producers.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum BrokerError {
    #[error("Failed to deliver message to '{topic}': {reason}")]
    Delivery { topic: String, reason: String },

    #[error("Producer is closed")]
    Closed,

    #[error("Producer configuration error: {0}")]
    Configuration(String),
}

/// Errors returned by the outbox dispatcher.
#[derive(Debug, Error)]
pub enum DispatchError {
    /// The dispatcher's cancellation token fired (or `stop` was called).
    #[error("Outbox dispatcher cancelled")]
    Cancelled,

    #[error("Outbox dispatcher loop '{name}' terminated abnormally: {reason}")]
    LoopFailed { name: &'static str, reason: String },
}

impl DispatchError {
    /// Returns true if this is the normal cancellation outcome.
    pub fn is_cancelled(&self) -> bool {
        matches!(self, DispatchError::Cancelled)
    }
}

/// Errors produced by order operations.
///
/// Cloneable so a single failure can be shared by every caller joined on
/// the same cached read.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum OrderError {
    #[error("Order {0} not found")]
    NotFound(i64),

    #[error("Order {0} already exists")]
    AlreadyExists(i64),

    #[error("Validation failed: {0}")]
    Validation(String),

    #[error("Order {0} storage period expired")]
    StorageExpired(i64),

    #[error("Storage error: {0}")]
    Storage(String),

    #[error("Failed to encode order event: {0}")]
    Encoding(String),

    /// The worker pool dropped the unit of work (pool shut down).
    #[error("Order processing unavailable: worker pool is shutting down")]
    Unavailable,
}

impl From<RepositoryError> for OrderError {
    fn from(err: RepositoryError) -> Self {
        OrderError::Storage(err.to_string())
    }
}

impl From<serde_json::Error> for OrderError {
    fn from(err: serde_json::Error) -> Self {
        OrderError::Encoding(err.to_string())
    }
}

/// Errors raised while loading or validating configuration.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Failed to read configuration file '{path}': {source}")]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Failed to parse configuration: {0}")]
    Parse(#[from] toml::de::Error),

    #[error("Invalid configuration: {message}")]
    Invalid { message: String },
}

/// Errors raised while installing the tracing subscriber.
#[derive(Debug, Error)]
pub enum LoggingError {
    #[error("Failed to create log directory '{path}': {source}")]
    CreateDir {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Invalid log filter '{filter}': {reason}")]
    Filter { filter: String, reason: String },

    #[error("A global tracing subscriber is already installed")]
    AlreadyInitialized,
}
