//! Postgres event store.
//!
//! One table holds every stream. `position` gives the global commit order
//! used for read-model rebuilds; `(stream_id, revision)` is unique, so two
//! writers racing on the same item, request or order cannot both commit.
//!
//! SQLSTATE mapping: `23505` (unique violation) is `Concurrency`, `23514`
//! (check violation) is `InvalidAppend`, anything else is `Storage`.
//!
//! The `EventStore` trait is synchronous. Calls are bridged onto the current
//! tokio runtime with `block_in_place`, which needs the multi-threaded
//! runtime flavour.

use std::future::Future;

use sqlx::postgres::{PgPoolOptions, PgRow};
use sqlx::{PgPool, Postgres, QueryBuilder, Row, Transaction};
use tracing::instrument;

use labstock_core::{AggregateId, ExpectedVersion};

use super::r#trait::{
    EventStore, EventStoreError, StoredEvent, UncommittedEvent, assign_revisions, check_head, ensure_single_stream,
};

const MAX_CONNECTIONS: u32 = 10;

const SCHEMA: [&str; 2] = [
    r#"
    CREATE TABLE IF NOT EXISTS stock_events (
        position       BIGSERIAL PRIMARY KEY,
        event_id       UUID NOT NULL UNIQUE,
        stream_id      UUID NOT NULL,
        stream_type    TEXT NOT NULL,
        revision       BIGINT NOT NULL CHECK (revision > 0),
        event_type     TEXT NOT NULL,
        schema_version INTEGER NOT NULL,
        occurred_at    TIMESTAMPTZ NOT NULL,
        payload        JSONB NOT NULL,
        recorded_at    TIMESTAMPTZ NOT NULL DEFAULT NOW(),
        UNIQUE (stream_id, revision)
    )
    "#,
    "CREATE INDEX IF NOT EXISTS stock_events_stream_type ON stock_events (stream_type, position)",
];

const COLUMNS: &str =
    "event_id, stream_id, stream_type, revision, event_type, schema_version, occurred_at, payload";

#[derive(Debug, Clone)]
pub struct PostgresEventStore {
    pool: PgPool,
}

impl PostgresEventStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    /// Open a pool against `database_url` and create the table if missing.
    pub async fn connect(database_url: &str) -> Result<Self, EventStoreError> {
        let pool = PgPoolOptions::new()
            .max_connections(MAX_CONNECTIONS)
            .connect(database_url)
            .await
            .map_err(|e| storage_error("connect", e))?;

        let store = Self::new(pool);
        store.ensure_schema().await?;
        Ok(store)
    }

    pub async fn ensure_schema(&self) -> Result<(), EventStoreError> {
        for statement in SCHEMA {
            sqlx::query(statement)
                .execute(&self.pool)
                .await
                .map_err(|e| storage_error("ensure_schema", e))?;
        }
        Ok(())
    }

    #[instrument(skip(self), fields(stream_id = %stream_id), err)]
    pub async fn load_stream_async(&self, stream_id: AggregateId) -> Result<Vec<StoredEvent>, EventStoreError> {
        let rows = sqlx::query(&format!(
            "SELECT {COLUMNS} FROM stock_events WHERE stream_id = $1 ORDER BY revision"
        ))
        .bind(stream_id.as_uuid())
        .fetch_all(&self.pool)
        .await
        .map_err(|e| storage_error("load_stream", e))?;

        rows.iter().map(decode_row).collect()
    }

    /// Every event in commit order.
    #[instrument(skip(self), err)]
    pub async fn load_all_async(&self) -> Result<Vec<StoredEvent>, EventStoreError> {
        let rows = sqlx::query(&format!("SELECT {COLUMNS} FROM stock_events ORDER BY position"))
            .fetch_all(&self.pool)
            .await
            .map_err(|e| storage_error("load_all", e))?;

        rows.iter().map(decode_row).collect()
    }

    /// Append a batch to one stream.
    ///
    /// The stream head is read and the batch inserted in one transaction. A
    /// writer that commits in between trips the `(stream_id, revision)`
    /// constraint and the append fails with `Concurrency`.
    #[instrument(
        skip(self, events),
        fields(event_count = events.len(), expected_version = ?expected_version),
        err
    )]
    pub async fn append_events(
        &self,
        events: Vec<UncommittedEvent>,
        expected_version: ExpectedVersion,
    ) -> Result<Vec<StoredEvent>, EventStoreError> {
        if events.is_empty() {
            return Ok(vec![]);
        }
        let (stream_id, stream_type) = ensure_single_stream(&events)?;

        let mut tx = self.pool.begin().await.map_err(|e| storage_error("begin", e))?;

        let head = stream_head(&mut tx, stream_id).await?;
        let current = check_head(
            stream_id,
            &stream_type,
            head.as_ref().map(|(revision, existing)| (*revision, existing.as_str())),
            expected_version,
        )?;
        let committed = assign_revisions(events, stream_id, &stream_type, current);

        let mut insert = QueryBuilder::<Postgres>::new(format!("INSERT INTO stock_events ({COLUMNS}) "));
        insert.push_values(&committed, |mut row, event| {
            row.push_bind(event.event_id)
                .push_bind(*event.aggregate_id.as_uuid())
                .push_bind(event.aggregate_type.clone())
                .push_bind(event.sequence_number as i64)
                .push_bind(event.event_type.clone())
                .push_bind(event.event_version as i32)
                .push_bind(event.occurred_at)
                .push_bind(event.payload.clone());
        });
        insert
            .build()
            .execute(&mut *tx)
            .await
            .map_err(|e| storage_error("insert_events", e))?;

        tx.commit().await.map_err(|e| storage_error("commit", e))?;
        Ok(committed)
    }
}

impl EventStore for PostgresEventStore {
    fn append(
        &self,
        events: Vec<UncommittedEvent>,
        expected_version: ExpectedVersion,
    ) -> Result<Vec<StoredEvent>, EventStoreError> {
        block_on(self.append_events(events, expected_version))
    }

    fn load_stream(&self, aggregate_id: AggregateId) -> Result<Vec<StoredEvent>, EventStoreError> {
        block_on(self.load_stream_async(aggregate_id))
    }

    fn load_all(&self) -> Result<Vec<StoredEvent>, EventStoreError> {
        block_on(self.load_all_async())
    }
}

fn block_on<F, T>(fut: F) -> Result<T, EventStoreError>
where
    F: Future<Output = Result<T, EventStoreError>>,
{
    let handle = tokio::runtime::Handle::try_current()
        .map_err(|_| EventStoreError::Storage("postgres event store used outside a tokio runtime".to_string()))?;
    tokio::task::block_in_place(|| handle.block_on(fut))
}

/// Latest revision and stream type, or `None` for a new stream.
async fn stream_head(
    tx: &mut Transaction<'_, Postgres>,
    stream_id: AggregateId,
) -> Result<Option<(u64, String)>, EventStoreError> {
    let row = sqlx::query(
        "SELECT revision, stream_type FROM stock_events WHERE stream_id = $1 ORDER BY revision DESC LIMIT 1",
    )
    .bind(stream_id.as_uuid())
    .fetch_optional(&mut **tx)
    .await
    .map_err(|e| storage_error("stream_head", e))?;

    row.map(|row| {
        let revision: i64 = row.try_get("revision").map_err(|e| storage_error("stream_head", e))?;
        let stream_type: String = row.try_get("stream_type").map_err(|e| storage_error("stream_head", e))?;
        Ok((revision as u64, stream_type))
    })
    .transpose()
}

fn decode_row(row: &PgRow) -> Result<StoredEvent, EventStoreError> {
    let decode = || -> Result<StoredEvent, sqlx::Error> {
        Ok(StoredEvent {
            event_id: row.try_get("event_id")?,
            aggregate_id: AggregateId::from_uuid(row.try_get("stream_id")?),
            aggregate_type: row.try_get("stream_type")?,
            sequence_number: row.try_get::<i64, _>("revision")? as u64,
            event_type: row.try_get("event_type")?,
            event_version: row.try_get::<i32, _>("schema_version")? as u32,
            occurred_at: row.try_get("occurred_at")?,
            payload: row.try_get("payload")?,
        })
    };
    decode().map_err(|e| storage_error("decode_row", e))
}

fn storage_error(operation: &str, err: sqlx::Error) -> EventStoreError {
    match &err {
        sqlx::Error::Database(db) => {
            let msg = format!("{operation}: {}", db.message());
            match db.code().as_deref() {
                Some("23505") => EventStoreError::Concurrency(msg),
                Some("23514") => EventStoreError::InvalidAppend(msg),
                _ => EventStoreError::Storage(msg),
            }
        }
        sqlx::Error::PoolClosed => EventStoreError::Storage(format!("{operation}: connection pool closed")),
        _ => EventStoreError::Storage(format!("{operation}: {err}")),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn column_list_matches_the_insert_arity() {
        assert_eq!(COLUMNS.split(',').count(), 8);
    }

    #[test]
    fn non_database_errors_are_storage_failures() {
        let err = storage_error("load_all", sqlx::Error::PoolClosed);
        assert!(matches!(err, EventStoreError::Storage(msg) if msg.contains("load_all")));
    }
}
