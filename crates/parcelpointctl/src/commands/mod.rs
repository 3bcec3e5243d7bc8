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

pub mod migrate;
pub mod outbox;

use anyhow::{Context, Result};
use parcelpoint::config::AppConfig;
use parcelpoint::outbox::postgres::{self, PgOutboxRepository};

/// Opens the PostgreSQL outbox repository described by `config`.
pub fn repository(config: &AppConfig) -> Result<PgOutboxRepository> {
    let url = config.database_url()?;
    let pool = postgres::connect(url, config.database.max_size)
        .context("Failed to connect to database")?;
    Ok(PgOutboxRepository::new(pool))
}
