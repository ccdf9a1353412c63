use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value as JsonValue;
use thiserror::Error;
use uuid::Uuid;

use labstock_core::{AggregateId, ExpectedVersion};
use labstock_events::{Event, EventEnvelope, StreamPosition};

/// A serialized domain event bound for a stream, before the store numbers it.
///
/// The dispatcher builds these from an aggregate's `handle` output with
/// `from_typed`; the store turns them into `StoredEvent`s and the dispatcher
/// publishes those as envelopes.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UncommittedEvent {
    pub event_id: Uuid,
    pub aggregate_id: AggregateId,
    pub aggregate_type: String,

    pub event_type: String,
    pub event_version: u32,
    pub occurred_at: DateTime<Utc>,

    pub payload: JsonValue,
}

/// A committed event. `sequence_number` is its 1-based revision in the stream.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StoredEvent {
    pub event_id: Uuid,
    pub aggregate_id: AggregateId,
    pub aggregate_type: String,

    pub sequence_number: u64,

    pub event_type: String,
    pub event_version: u32,
    pub occurred_at: DateTime<Utc>,

    pub payload: JsonValue,
}

impl StoredEvent {
    pub fn to_envelope(&self) -> EventEnvelope<JsonValue> {
        EventEnvelope::new(
            self.event_id,
            StreamPosition {
                stream_id: self.aggregate_id,
                stream_type: self.aggregate_type.clone(),
                sequence: self.sequence_number,
            },
            self.event_type.clone(),
            self.occurred_at,
            self.payload.clone(),
        )
    }
}

#[derive(Debug, Error)]
pub enum EventStoreError {
    /// Another writer moved the stream first. The dispatcher retries these.
    #[error("stream moved concurrently: {0}")]
    Concurrency(String),

    #[error("stream type mismatch: {0}")]
    AggregateTypeMismatch(String),

    #[error("invalid append: {0}")]
    InvalidAppend(String),

    #[error("storage failure: {0}")]
    Storage(String),
}

/// Append-only store of item, usage request and batch order streams.
///
/// `append` takes a batch for one stream, refuses it unless the stream is at
/// `expected_version`, numbers it from the next revision and commits it all
/// or nothing. `load_stream` is empty for a stream that was never written.
/// `load_all` returns the whole log in commit order for read-model rebuilds.
pub trait EventStore: Send + Sync {
    fn append(
        &self,
        events: Vec<UncommittedEvent>,
        expected_version: ExpectedVersion,
    ) -> Result<Vec<StoredEvent>, EventStoreError>;

    fn load_stream(&self, aggregate_id: AggregateId) -> Result<Vec<StoredEvent>, EventStoreError>;

    fn load_all(&self) -> Result<Vec<StoredEvent>, EventStoreError>;
}

impl<S> EventStore for Arc<S>
where
    S: EventStore + ?Sized,
{
    fn append(
        &self,
        events: Vec<UncommittedEvent>,
        expected_version: ExpectedVersion,
    ) -> Result<Vec<StoredEvent>, EventStoreError> {
        (**self).append(events, expected_version)
    }

    fn load_stream(&self, aggregate_id: AggregateId) -> Result<Vec<StoredEvent>, EventStoreError> {
        (**self).load_stream(aggregate_id)
    }

    fn load_all(&self) -> Result<Vec<StoredEvent>, EventStoreError> {
        (**self).load_all()
    }
}

impl UncommittedEvent {
    /// Serialize a typed domain event, keeping the metadata needed to read it back.
    pub fn from_typed<E>(
        aggregate_id: AggregateId,
        aggregate_type: impl Into<String>,
        event_id: Uuid,
        event: &E,
    ) -> Result<Self, EventStoreError>
    where
        E: Event + Serialize,
    {
        let payload = serde_json::to_value(event).map_err(|e| {
            EventStoreError::InvalidAppend(format!("payload serialization failed: {e}"))
        })?;

        Ok(Self {
            event_id,
            aggregate_id,
            aggregate_type: aggregate_type.into(),
            event_type: event.event_type().to_string(),
            event_version: event.version(),
            occurred_at: event.occurred_at(),
            payload,
        })
    }
}

/// Batch-level checks shared by every backend.
pub(crate) fn ensure_single_stream(
    events: &[UncommittedEvent],
) -> Result<(AggregateId, String), EventStoreError> {
    let first = events
        .first()
        .ok_or_else(|| EventStoreError::InvalidAppend("empty batch".to_string()))?;
    let aggregate_id = first.aggregate_id;
    let aggregate_type = first.aggregate_type.clone();

    for (idx, e) in events.iter().enumerate() {
        if e.aggregate_id != aggregate_id {
            return Err(EventStoreError::InvalidAppend(format!(
                "batch contains multiple aggregate_ids (index {idx})"
            )));
        }
        if e.aggregate_type != aggregate_type {
            return Err(EventStoreError::AggregateTypeMismatch(format!(
                "batch contains multiple aggregate_types (index {idx})"
            )));
        }
    }

    Ok((aggregate_id, aggregate_type))
}

/// Refuse an append whose stream already holds another stream type or has
/// moved past `expected`. `head` is the latest `(revision, stream_type)`.
pub(crate) fn check_head(
    stream_id: AggregateId,
    stream_type: &str,
    head: Option<(u64, &str)>,
    expected: ExpectedVersion,
) -> Result<u64, EventStoreError> {
    let current = head.map_or(0, |(revision, _)| revision);
    if let Some((_, existing)) = head.filter(|(_, existing)| *existing != stream_type) {
        return Err(EventStoreError::AggregateTypeMismatch(format!(
            "stream {stream_id} is '{existing}', append was '{stream_type}'"
        )));
    }
    if !expected.matches(current) {
        return Err(EventStoreError::Concurrency(format!(
            "stream {stream_id}: expected {expected:?}, found revision {current}"
        )));
    }
    Ok(current)
}

/// Number a checked batch from `current + 1`.
pub(crate) fn assign_revisions(
    events: Vec<UncommittedEvent>,
    stream_id: AggregateId,
    stream_type: &str,
    current: u64,
) -> Vec<StoredEvent> {
    events
        .into_iter()
        .zip(current + 1..)
        .map(|(event, revision)| StoredEvent {
            event_id: event.event_id,
            aggregate_id: stream_id,
            aggregate_type: stream_type.to_string(),
            sequence_number: revision,
            event_type: event.event_type,
            event_version: event.event_version,
            occurred_at: event.occurred_at,
            payload: event.payload,
        })
        .collect()
}
