use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use labstock_core::AggregateId;

/// Where a committed event sits: which stream, of which kind, at which revision.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StreamPosition {
    pub stream_id: AggregateId,
    /// Stream kind, e.g. `stock.item`.
    pub stream_type: String,
    /// 1-based revision within the stream.
    pub sequence: u64,
}

/// A committed event as published on the bus.
///
/// Projections key their idempotency cursors on `(stream_id, sequence)`, so
/// redelivering an envelope is harmless.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EventEnvelope<E> {
    event_id: Uuid,
    position: StreamPosition,
    event_type: String,
    occurred_at: DateTime<Utc>,
    payload: E,
}

impl<E> EventEnvelope<E> {
    pub fn new(
        event_id: Uuid,
        position: StreamPosition,
        event_type: impl Into<String>,
        occurred_at: DateTime<Utc>,
        payload: E,
    ) -> Self {
        Self {
            event_id,
            position,
            event_type: event_type.into(),
            occurred_at,
            payload,
        }
    }

    pub fn event_id(&self) -> Uuid {
        self.event_id
    }

    pub fn position(&self) -> &StreamPosition {
        &self.position
    }

    pub fn aggregate_id(&self) -> AggregateId {
        self.position.stream_id
    }

    pub fn aggregate_type(&self) -> &str {
        &self.position.stream_type
    }

    pub fn sequence_number(&self) -> u64 {
        self.position.sequence
    }

    pub fn event_type(&self) -> &str {
        &self.event_type
    }

    pub fn occurred_at(&self) -> DateTime<Utc> {
        self.occurred_at
    }

    pub fn payload(&self) -> &E {
        &self.payload
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn accessors_read_through_the_position() {
        let stream_id = AggregateId::new();
        let envelope = EventEnvelope::new(
            Uuid::now_v7(),
            StreamPosition {
                stream_id,
                stream_type: "stock.item".to_string(),
                sequence: 3,
            },
            "stock.item.reconciled",
            Utc::now(),
            42_i64,
        );

        assert_eq!(envelope.aggregate_id(), stream_id);
        assert_eq!(envelope.aggregate_type(), "stock.item");
        assert_eq!(envelope.sequence_number(), 3);
        assert_eq!(*envelope.payload(), 42);
    }
}
