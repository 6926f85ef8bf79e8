//! PostgreSQL storage backend.
//!
//! This is the relational adapter the storage interface requires alongside
//! the in-memory one. Each process application owns one `PostgresEventStore`
//! pointed at its own schema (or its own set of tables, via `application`),
//! so two different applications' event logs and tracking cursors never
//! collide even though they may share a database.
//!
//! The atomic multi-row commit is a single `sqlx` transaction spanning the
//! inserts into `events` and the upsert into `tracking` — §5.1's "single
//! transaction in a relational store".
use sqlx::{PgPool, Row};

use crate::error::Error;
use crate::event::{AggregateId, RawEvent};
use crate::store::{PostgresSettings, TrackingUpdate};

/// `CREATE TABLE` statements a deployment must run once per application
/// schema before using [`PostgresEventStore`]. Exposed as a constant rather
/// than embedded migrations because the concrete migration runner is an
/// external-collaborator concern (§1).
pub const SCHEMA: &str = r#"
CREATE TABLE IF NOT EXISTS events (
    originator_id UUID NOT NULL,
    originator_version BIGINT NOT NULL,
    position BIGSERIAL PRIMARY KEY,
    topic TEXT NOT NULL,
    occurred_at TIMESTAMPTZ NOT NULL,
    payload JSONB NOT NULL,
    UNIQUE (originator_id, originator_version)
);

CREATE TABLE IF NOT EXISTS tracking (
    upstream TEXT PRIMARY KEY,
    position BIGINT NOT NULL
);
"#;

pub struct PostgresEventStore {
    pool: PgPool,
}

impl PostgresEventStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    pub async fn connect(database_url: &str) -> Result<Self, Error> {
        let pool = PgPool::connect(database_url)
            .await
            .map_err(Error::storage)?;
        Ok(Self::new(pool))
    }

    /// Connects using [`PostgresSettings`], e.g. `PostgresSettings::from_env()`.
    pub async fn connect_with_settings(settings: &PostgresSettings) -> Result<Self, Error> {
        Self::connect(&settings.to_connection_string()).await
    }
}

#[async_trait::async_trait]
impl super::EventStoreBackend for PostgresEventStore {
    async fn load(&self, id: AggregateId) -> Result<Vec<RawEvent>, Error> {
        let rows = sqlx::query(
            "SELECT originator_id, originator_version, topic, occurred_at, payload, position \
             FROM events WHERE originator_id = $1 ORDER BY originator_version ASC",
        )
        .bind(id.as_uuid())
        .fetch_all(&self.pool)
        .await
        .map_err(Error::storage)?;

        rows.into_iter().map(row_to_raw_event).collect()
    }

    async fn commit(
        &self,
        events: Vec<RawEvent>,
        tracking: Option<TrackingUpdate>,
    ) -> Result<Vec<RawEvent>, Error> {
        if events.is_empty() && tracking.is_none() {
            return Ok(events);
        }

        let mut tx = self.pool.begin().await.map_err(Error::storage)?;
        let mut committed = Vec::with_capacity(events.len());

        for event in events {
            let row = sqlx::query(
                "INSERT INTO events (originator_id, originator_version, topic, occurred_at, payload) \
                 VALUES ($1, $2, $3, $4, $5) \
                 RETURNING position",
            )
            .bind(event.originator_id.as_uuid())
            .bind(event.originator_version as i64)
            .bind(&event.topic)
            .bind(event.timestamp)
            .bind(&event.payload)
            .fetch_one(&mut *tx)
            .await
            .map_err(|err| match &err {
                sqlx::Error::Database(db) if db.constraint() == Some("events_originator_id_originator_version_key") => {
                    Error::ConcurrencyConflict {
                        stream: event.originator_id,
                        expected: event.originator_version,
                        actual: None,
                    }
                }
                _ => Error::storage(err),
            })?;

            let position: i64 = row.try_get("position").map_err(Error::storage)?;
            committed.push(RawEvent {
                position: Some(position as u64),
                ..event
            });
        }

        if let Some(TrackingUpdate { upstream, position }) = tracking {
            sqlx::query(
                "INSERT INTO tracking (upstream, position) VALUES ($1, $2) \
                 ON CONFLICT (upstream) DO UPDATE SET position = EXCLUDED.position \
                 WHERE tracking.position < EXCLUDED.position",
            )
            .bind(&upstream)
            .bind(position as i64)
            .execute(&mut *tx)
            .await
            .map_err(Error::storage)?;
        }

        tx.commit().await.map_err(Error::storage)?;
        Ok(committed)
    }

    async fn notifications(&self, from_position: u64, limit: usize) -> Result<Vec<RawEvent>, Error> {
        let rows = sqlx::query(
            "SELECT originator_id, originator_version, topic, occurred_at, payload, position \
             FROM events WHERE position > $1 ORDER BY position ASC LIMIT $2",
        )
        .bind(from_position as i64)
        .bind(limit as i64)
        .fetch_all(&self.pool)
        .await
        .map_err(Error::storage)?;

        rows.into_iter().map(row_to_raw_event).collect()
    }

    async fn tracking(&self, upstream: &str) -> Result<u64, Error> {
        let row = sqlx::query("SELECT position FROM tracking WHERE upstream = $1")
            .bind(upstream)
            .fetch_optional(&self.pool)
            .await
            .map_err(Error::storage)?;

        Ok(match row {
            Some(row) => row.try_get::<i64, _>("position").map_err(Error::storage)? as u64,
            None => 0,
        })
    }
}

fn row_to_raw_event(row: sqlx::postgres::PgRow) -> Result<RawEvent, Error> {
    let originator_id: uuid::Uuid = row.try_get("originator_id").map_err(Error::storage)?;
    let originator_version: i64 = row.try_get("originator_version").map_err(Error::storage)?;
    let position: i64 = row.try_get("position").map_err(Error::storage)?;
    Ok(RawEvent {
        originator_id: AggregateId::from_uuid(originator_id),
        originator_version: originator_version as u64,
        topic: row.try_get("topic").map_err(Error::storage)?,
        timestamp: row.try_get("occurred_at").map_err(Error::storage)?,
        payload: row.try_get("payload").map_err(Error::storage)?,
        position: Some(position as u64),
    })
}
