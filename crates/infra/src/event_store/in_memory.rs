use std::collections::HashMap;
use std::sync::{RwLock, RwLockReadGuard, RwLockWriteGuard};

use labstock_core::{AggregateId, ExpectedVersion};

use super::r#trait::{
    EventStore, EventStoreError, StoredEvent, UncommittedEvent, assign_revisions, check_head, ensure_single_stream,
};

/// Single commit log plus a per-stream index into it.
#[derive(Debug, Default)]
struct Log {
    events: Vec<StoredEvent>,
    streams: HashMap<AggregateId, Vec<usize>>,
}

impl Log {
    fn head(&self, stream_id: AggregateId) -> Option<&StoredEvent> {
        self.streams
            .get(&stream_id)
            .and_then(|positions| positions.last())
            .map(|&position| &self.events[position])
    }
}

/// Event store for tests, benches and non-persistent runs.
#[derive(Debug, Default)]
pub struct InMemoryEventStore {
    log: RwLock<Log>,
}

impl InMemoryEventStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn read(&self) -> Result<RwLockReadGuard<'_, Log>, EventStoreError> {
        self.log
            .read()
            .map_err(|_| EventStoreError::Storage("event log lock poisoned".to_string()))
    }

    fn write(&self) -> Result<RwLockWriteGuard<'_, Log>, EventStoreError> {
        self.log
            .write()
            .map_err(|_| EventStoreError::Storage("event log lock poisoned".to_string()))
    }
}

impl EventStore for InMemoryEventStore {
    fn append(
        &self,
        events: Vec<UncommittedEvent>,
        expected_version: ExpectedVersion,
    ) -> Result<Vec<StoredEvent>, EventStoreError> {
        if events.is_empty() {
            return Ok(vec![]);
        }
        let (stream_id, stream_type) = ensure_single_stream(&events)?;

        let mut log = self.write()?;
        let head = log
            .head(stream_id)
            .map(|e| (e.sequence_number, e.aggregate_type.as_str()));
        let current = check_head(stream_id, &stream_type, head, expected_version)?;
        let committed = assign_revisions(events, stream_id, &stream_type, current);

        let start = log.events.len();
        log.events.extend(committed.iter().cloned());
        log.streams
            .entry(stream_id)
            .or_default()
            .extend(start..start + committed.len());

        Ok(committed)
    }

    fn load_stream(&self, aggregate_id: AggregateId) -> Result<Vec<StoredEvent>, EventStoreError> {
        let log = self.read()?;
        Ok(log
            .streams
            .get(&aggregate_id)
            .map(|positions| positions.iter().map(|&p| log.events[p].clone()).collect())
            .unwrap_or_default())
    }

    fn load_all(&self) -> Result<Vec<StoredEvent>, EventStoreError> {
        Ok(self.read()?.events.clone())
    }
}

#[cfg(test)]
mod tests {
    use chrono::Utc;
    use uuid::Uuid;

    use super::*;
    use crate::streams::{ITEM_STREAM, ORDER_STREAM, USAGE_STREAM};

    fn event(stream_id: AggregateId, stream_type: &str) -> UncommittedEvent {
        UncommittedEvent {
            event_id: Uuid::now_v7(),
            aggregate_id: stream_id,
            aggregate_type: stream_type.to_string(),
            event_type: "stock.test".to_string(),
            event_version: 1,
            occurred_at: Utc::now(),
            payload: serde_json::json!({}),
        }
    }

    fn revisions(events: &[StoredEvent]) -> Vec<u64> {
        events.iter().map(|e| e.sequence_number).collect()
    }

    #[test]
    fn revisions_are_numbered_per_stream() {
        let store = InMemoryEventStore::new();
        let item = AggregateId::new();
        let other = AggregateId::new();

        store
            .append(vec![event(item, ITEM_STREAM), event(item, ITEM_STREAM)], ExpectedVersion::Exact(0))
            .unwrap();
        let committed = store
            .append(vec![event(other, ITEM_STREAM)], ExpectedVersion::Exact(0))
            .unwrap();
        store.append(vec![event(item, ITEM_STREAM)], ExpectedVersion::Exact(2)).unwrap();

        assert_eq!(revisions(&committed), vec![1]);
        assert_eq!(revisions(&store.load_stream(item).unwrap()), vec![1, 2, 3]);
    }

    #[test]
    fn racing_writer_with_stale_revision_loses() {
        let store = InMemoryEventStore::new();
        let item = AggregateId::new();

        store.append(vec![event(item, ITEM_STREAM)], ExpectedVersion::Exact(0)).unwrap();
        let err = store
            .append(vec![event(item, ITEM_STREAM)], ExpectedVersion::Exact(0))
            .unwrap_err();

        assert!(matches!(err, EventStoreError::Concurrency(_)));
        assert_eq!(store.load_stream(item).unwrap().len(), 1);
    }

    #[test]
    fn a_stream_keeps_its_type() {
        let store = InMemoryEventStore::new();
        let id = AggregateId::new();

        store.append(vec![event(id, ITEM_STREAM)], ExpectedVersion::Any).unwrap();
        let err = store
            .append(vec![event(id, ORDER_STREAM)], ExpectedVersion::Any)
            .unwrap_err();
        assert!(matches!(err, EventStoreError::AggregateTypeMismatch(_)));
    }

    #[test]
    fn mixed_batches_are_refused() {
        let store = InMemoryEventStore::new();
        let err = store
            .append(
                vec![event(AggregateId::new(), ITEM_STREAM), event(AggregateId::new(), ITEM_STREAM)],
                ExpectedVersion::Any,
            )
            .unwrap_err();
        assert!(matches!(err, EventStoreError::InvalidAppend(_)));
        assert!(store.load_all().unwrap().is_empty());
    }

    #[test]
    fn full_log_is_in_commit_order() {
        let store = InMemoryEventStore::new();
        let item = AggregateId::new();
        let request = AggregateId::new();

        store.append(vec![event(item, ITEM_STREAM)], ExpectedVersion::Any).unwrap();
        store.append(vec![event(request, USAGE_STREAM)], ExpectedVersion::Any).unwrap();
        store.append(vec![event(item, ITEM_STREAM)], ExpectedVersion::Any).unwrap();

        let order: Vec<_> = store
            .load_all()
            .unwrap()
            .iter()
            .map(|e| (e.aggregate_id, e.sequence_number))
            .collect();
        assert_eq!(order, vec![(item, 1), (request, 1), (item, 2)]);
    }

    #[test]
    fn unknown_stream_loads_empty() {
        let store = InMemoryEventStore::new();
        assert!(store.load_stream(AggregateId::new()).unwrap().is_empty());
    }
}
