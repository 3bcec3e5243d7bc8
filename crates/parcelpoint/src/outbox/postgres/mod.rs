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

//! PostgreSQL persistence for the outbox.
//!
//! The pool is a `deadpool-diesel` pool; the `outbox` table is created by
//! the embedded migrations in [`MIGRATIONS`].

mod repository;
pub mod schema;

pub use repository::PgOutboxRepository;

use deadpool_diesel::postgres::{Manager, Pool, Runtime};
use diesel_migrations::{embed_migrations, EmbeddedMigrations, MigrationHarness};
use tracing::info;

use crate::config::redact_database_url;
use crate::error::RepositoryError;

pub const MIGRATIONS: EmbeddedMigrations = embed_migrations!("src/outbox/postgres/migrations");

/// Builds a connection pool for `database_url` holding at most `max_size`
/// connections. Connections are opened lazily.
pub fn connect(database_url: &str, max_size: usize) -> Result<Pool, RepositoryError> {
    let manager = Manager::new(database_url, Runtime::Tokio1);
    let pool = Pool::builder(manager)
        .max_size(max_size)
        .build()
        .map_err(|e| RepositoryError::ConnectionPool(e.to_string()))?;

    info!(
        url = %redact_database_url(database_url),
        max_size,
        "PostgreSQL connection pool initialized"
    );
    Ok(pool)
}

/// Applies pending migrations. Returns the number applied.
pub async fn run_migrations(pool: &Pool) -> Result<usize, RepositoryError> {
    let conn = pool
        .get()
        .await
        .map_err(|e| RepositoryError::ConnectionPool(e.to_string()))?;

    let applied = conn
        .interact(|conn| {
            conn.run_pending_migrations(MIGRATIONS)
                .map(|versions| versions.len())
                .map_err(|e| e.to_string())
        })
        .await
        .map_err(|e| RepositoryError::ConnectionPool(format!("Failed to run migrations: {}", e)))?
        .map_err(RepositoryError::Database)?;

    info!(applied, "Outbox migrations applied");
    Ok(applied)
}
