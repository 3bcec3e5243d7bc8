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

//! PostgreSQL outbox repository.

use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use deadpool_diesel::postgres::Pool;
use diesel::prelude::*;
use diesel::sql_types::{BigInt, Double, Text};
use tracing::debug;

use super::schema::outbox;
use crate::error::RepositoryError;
use crate::outbox::model::{NewOutboxEvent, OutboxCounts, OutboxEvent, OutboxStatus, RedriveScope};
use crate::outbox::repository::OutboxRepository;

#[derive(Debug, Clone, Queryable, QueryableByName, Selectable)]
#[diesel(table_name = outbox)]
#[diesel(check_for_backend(diesel::pg::Pg))]
struct OutboxRow {
    id: i64,
    order_id: i64,
    payload: String,
    status: i16,
    error: Option<String>,
    created_at: DateTime<Utc>,
    sent_at: Option<DateTime<Utc>>,
    attempts: i32,
    last_attempt_at: Option<DateTime<Utc>>,
    claimed_by: Option<String>,
}

#[derive(Debug, Insertable)]
#[diesel(table_name = outbox)]
struct NewOutboxRow {
    id: i64,
    order_id: i64,
    payload: String,
    status: i16,
    created_at: DateTime<Utc>,
    attempts: i32,
}

impl TryFrom<OutboxRow> for OutboxEvent {
    type Error = RepositoryError;

    fn try_from(row: OutboxRow) -> Result<Self, Self::Error> {
        let status = OutboxStatus::from_i16(row.status).ok_or_else(|| {
            RepositoryError::Database(format!(
                "Unknown outbox status {} for event {}",
                row.status, row.id
            ))
        })?;
        Ok(OutboxEvent {
            event_id: row.id,
            order_id: row.order_id,
            payload: row.payload,
            status,
            error: row.error,
            created_at: row.created_at,
            sent_at: row.sent_at,
            attempts: row.attempts,
            last_attempt_at: row.last_attempt_at,
            claimed_by: row.claimed_by,
        })
    }
}

fn into_events(rows: Vec<OutboxRow>) -> Result<Vec<OutboxEvent>, RepositoryError> {
    rows.into_iter().map(OutboxEvent::try_from).collect()
}

fn expect_updated(updated: usize, event_id: i64) -> Result<(), RepositoryError> {
    if updated == 0 {
        Err(RepositoryError::NotFound(format!("outbox event {}", event_id)))
    } else {
        Ok(())
    }
}

/// [`OutboxRepository`] over a `deadpool-diesel` PostgreSQL pool.
///
/// Claims use a single `UPDATE ... FROM (SELECT ... FOR UPDATE SKIP LOCKED)`
/// statement so concurrent dispatchers never claim the same row.
#[derive(Clone)]
pub struct PgOutboxRepository {
    pool: Pool,
}

impl PgOutboxRepository {
    pub fn new(pool: Pool) -> Self {
        Self { pool }
    }

    pub fn pool(&self) -> &Pool {
        &self.pool
    }

    async fn with_conn<T, F>(&self, op: F) -> Result<T, RepositoryError>
    where
        F: FnOnce(&mut PgConnection) -> Result<T, diesel::result::Error> + Send + 'static,
        T: Send + 'static,
    {
        let conn = self
            .pool
            .get()
            .await
            .map_err(|e| RepositoryError::ConnectionPool(e.to_string()))?;

        let result = conn
            .interact(op)
            .await
            .map_err(|e| RepositoryError::ConnectionPool(e.to_string()))??;
        Ok(result)
    }
}

#[async_trait]
impl OutboxRepository for PgOutboxRepository {
    async fn create(&self, event: NewOutboxEvent) -> Result<OutboxEvent, RepositoryError> {
        let row = NewOutboxRow {
            id: event.event_id,
            order_id: event.order_id,
            payload: event.payload,
            status: OutboxStatus::Created.as_i16(),
            created_at: Utc::now(),
            attempts: 0,
        };

        let inserted: OutboxRow = self
            .with_conn(move |conn| {
                diesel::insert_into(outbox::table)
                    .values(&row)
                    .returning(OutboxRow::as_returning())
                    .get_result(conn)
            })
            .await?;
        inserted.try_into()
    }

    async fn claim_batch(
        &self,
        limit: usize,
        retry_delay: Duration,
        claimant: &str,
    ) -> Result<Vec<OutboxEvent>, RepositoryError> {
        let limit = limit as i64;
        let retry_secs = retry_delay.as_secs_f64();
        let claimant = claimant.to_string();

        let mut rows: Vec<OutboxRow> = self
            .with_conn(move |conn| {
                conn.transaction::<_, diesel::result::Error, _>(|conn| {
                    // Created events, plus processing events whose last
                    // attempt is older than the retry delay. Rows locked by a
                    // concurrent claim are skipped.
                    diesel::sql_query(
                        r#"
                        WITH claimable AS (
                            SELECT id FROM outbox
                            WHERE status = 1
                               OR (status = 2
                                   AND last_attempt_at <= NOW() - make_interval(secs => $1))
                            ORDER BY created_at ASC, id ASC
                            LIMIT $2
                            FOR UPDATE SKIP LOCKED
                        )
                        UPDATE outbox
                        SET status = 2,
                            attempts = outbox.attempts + 1,
                            last_attempt_at = NOW(),
                            claimed_by = $3
                        FROM claimable
                        WHERE outbox.id = claimable.id
                        RETURNING outbox.*
                        "#,
                    )
                    .bind::<Double, _>(retry_secs)
                    .bind::<BigInt, _>(limit)
                    .bind::<Text, _>(claimant)
                    .load(conn)
                })
            })
            .await?;

        rows.sort_by(|a, b| a.created_at.cmp(&b.created_at).then(a.id.cmp(&b.id)));
        if !rows.is_empty() {
            debug!(claimed = rows.len(), "Claimed outbox events");
        }
        into_events(rows)
    }

    async fn fetch_processing(
        &self,
        limit: usize,
        claimant: &str,
    ) -> Result<Vec<OutboxEvent>, RepositoryError> {
        let limit = limit as i64;
        let claimant = claimant.to_string();

        let rows: Vec<OutboxRow> = self
            .with_conn(move |conn| {
                outbox::table
                    .filter(outbox::status.eq(OutboxStatus::Processing.as_i16()))
                    .filter(outbox::claimed_by.eq(claimant))
                    .order((outbox::created_at.asc(), outbox::id.asc()))
                    .limit(limit)
                    .select(OutboxRow::as_select())
                    .load(conn)
            })
            .await?;
        into_events(rows)
    }

    async fn set_completed(
        &self,
        event_id: i64,
        sent_at: DateTime<Utc>,
    ) -> Result<(), RepositoryError> {
        let updated = self
            .with_conn(move |conn| {
                diesel::update(outbox::table.find(event_id))
                    .set((
                        outbox::status.eq(OutboxStatus::Completed.as_i16()),
                        outbox::sent_at.eq(Some(sent_at)),
                    ))
                    .execute(conn)
            })
            .await?;
        expect_updated(updated, event_id)
    }

    async fn set_failed(&self, event_id: i64, reason: &str) -> Result<(), RepositoryError> {
        let reason = reason.to_string();
        let updated = self
            .with_conn(move |conn| {
                diesel::update(outbox::table.find(event_id))
                    .set((
                        outbox::status.eq(OutboxStatus::Failed.as_i16()),
                        outbox::error.eq(Some(reason)),
                        outbox::claimed_by.eq(None::<String>),
                    ))
                    .execute(conn)
            })
            .await?;
        expect_updated(updated, event_id)
    }

    async fn update_error(&self, event_id: i64, error: &str) -> Result<(), RepositoryError> {
        let error = error.to_string();
        let updated = self
            .with_conn(move |conn| {
                diesel::update(outbox::table.find(event_id))
                    .set((
                        outbox::error.eq(Some(error)),
                        outbox::claimed_by.eq(None::<String>),
                    ))
                    .execute(conn)
            })
            .await?;
        expect_updated(updated, event_id)
    }

    async fn find(&self, event_id: i64) -> Result<Option<OutboxEvent>, RepositoryError> {
        let row: Option<OutboxRow> = self
            .with_conn(move |conn| {
                outbox::table
                    .find(event_id)
                    .select(OutboxRow::as_select())
                    .first(conn)
                    .optional()
            })
            .await?;
        row.map(OutboxEvent::try_from).transpose()
    }

    async fn list_by_status(
        &self,
        status: OutboxStatus,
        limit: usize,
    ) -> Result<Vec<OutboxEvent>, RepositoryError> {
        let limit = limit as i64;
        let rows: Vec<OutboxRow> = self
            .with_conn(move |conn| {
                outbox::table
                    .filter(outbox::status.eq(status.as_i16()))
                    .order((outbox::created_at.asc(), outbox::id.asc()))
                    .limit(limit)
                    .select(OutboxRow::as_select())
                    .load(conn)
            })
            .await?;
        into_events(rows)
    }

    async fn count_by_status(&self) -> Result<OutboxCounts, RepositoryError> {
        let grouped: Vec<(i16, i64)> = self
            .with_conn(|conn| {
                outbox::table
                    .group_by(outbox::status)
                    .select((outbox::status, diesel::dsl::count_star()))
                    .load(conn)
            })
            .await?;

        let mut counts = OutboxCounts::default();
        for (status, count) in grouped {
            if let Some(status) = OutboxStatus::from_i16(status) {
                counts.add(status, count.max(0) as u64);
            }
        }
        Ok(counts)
    }

    async fn redrive_failed(&self, scope: RedriveScope) -> Result<usize, RepositoryError> {
        let failed = OutboxStatus::Failed.as_i16();
        let reset = (
            outbox::status.eq(OutboxStatus::Created.as_i16()),
            outbox::attempts.eq(0),
            outbox::error.eq(None::<String>),
            outbox::last_attempt_at.eq(None::<DateTime<Utc>>),
            outbox::claimed_by.eq(None::<String>),
        );

        self.with_conn(move |conn| match scope {
            RedriveScope::All => diesel::update(outbox::table.filter(outbox::status.eq(failed)))
                .set(reset)
                .execute(conn),
            RedriveScope::Events(ids) => diesel::update(
                outbox::table
                    .filter(outbox::status.eq(failed))
                    .filter(outbox::id.eq_any(ids)),
            )
            .set(reset)
            .execute(conn),
        })
        .await
    }
}
