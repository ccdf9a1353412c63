//! Command execution pipeline.
//!
//! ```text
//! Command
//!   ↓
//! 1. Load the aggregate stream
//!   ↓
//! 2. Rehydrate (apply history in sequence order)
//!   ↓
//! 3. Decide the command against current state
//!   ↓
//! 4. Handle (pure, produces events)
//!   ↓
//! 5. Append with ExpectedVersion::Exact(loaded version)
//!   ↓
//! 6. Publish committed events to the bus
//! ```
//!
//! A concurrent writer makes step 5 fail with `Concurrency`; the whole
//! pipeline is then re-run from step 1, so any decision that depends on
//! current state (e.g. an audit delta against the live quantity) is taken
//! again against fresh state.

use serde::Serialize;
use serde::de::DeserializeOwned;
use serde_json::Value as JsonValue;
use thiserror::Error;
use uuid::Uuid;

use labstock_core::{Aggregate, AggregateId, DomainError, ExpectedVersion};
use labstock_events::{EventBus, EventEnvelope};

use crate::event_store::{EventStore, EventStoreError, StoredEvent, UncommittedEvent};

const DEFAULT_MAX_ATTEMPTS: u32 = 5;

#[derive(Debug, Error)]
pub enum DispatchError {
    /// Optimistic concurrency failure (stale stream version).
    #[error("concurrency conflict: {0}")]
    Concurrency(String),
    /// A loaded stream was out of order or mixed aggregates.
    #[error("stream integrity violation: {0}")]
    StreamIntegrity(String),
    #[error("validation failed: {0}")]
    Validation(String),
    #[error("invariant violated: {0}")]
    InvariantViolation(String),
    /// Request or order already in a terminal state.
    #[error("invalid state: {0}")]
    InvalidState(String),
    /// Business conflict (duplicate creation, source already applied). Not retried.
    #[error("conflict: {0}")]
    Conflict(String),
    #[error("not found")]
    NotFound,
    /// Historical payloads did not deserialize into the aggregate event type.
    #[error("failed to deserialize stored event: {0}")]
    Deserialize(String),
    #[error(transparent)]
    Store(EventStoreError),
    /// Publication failed after a successful append (at-least-once; retry may duplicate).
    #[error("event publication failed: {0}")]
    Publish(String),
}

impl From<EventStoreError> for DispatchError {
    fn from(value: EventStoreError) -> Self {
        match value {
            EventStoreError::Concurrency(msg) => DispatchError::Concurrency(msg),
            other => DispatchError::Store(other),
        }
    }
}

impl From<DomainError> for DispatchError {
    fn from(value: DomainError) -> Self {
        match value {
            DomainError::Validation(msg) => DispatchError::Validation(msg),
            DomainError::InvariantViolation(msg) => DispatchError::InvariantViolation(msg),
            DomainError::InvalidState(msg) => DispatchError::InvalidState(msg),
            DomainError::Conflict(msg) => DispatchError::Conflict(msg),
            DomainError::NotFound => DispatchError::NotFound,
            DomainError::InvalidId(msg) => DispatchError::Validation(msg),
        }
    }
}

/// Result of a successful `execute`: the aggregate after the new events and
/// the events that were committed.
#[derive(Debug)]
pub struct Outcome<A> {
    pub aggregate: A,
    pub committed: Vec<StoredEvent>,
}

/// Reusable command execution engine for event-sourced aggregates.
///
/// Events are persisted before publication; if the append fails nothing is
/// published. A publication failure is returned to the caller even though
/// the events are already durable (at-least-once delivery).
#[derive(Debug)]
pub struct CommandDispatcher<S, B> {
    store: S,
    bus: B,
    max_attempts: u32,
}

impl<S, B> CommandDispatcher<S, B> {
    pub fn new(store: S, bus: B) -> Self {
        Self {
            store,
            bus,
            max_attempts: DEFAULT_MAX_ATTEMPTS,
        }
    }

    /// Number of attempts made when appends race (at least 1).
    pub fn with_max_attempts(mut self, max_attempts: u32) -> Self {
        self.max_attempts = max_attempts.max(1);
        self
    }

    pub fn store(&self) -> &S {
        &self.store
    }

    pub fn bus(&self) -> &B {
        &self.bus
    }
}

impl<S, B> CommandDispatcher<S, B>
where
    S: EventStore,
    B: EventBus<EventEnvelope<JsonValue>>,
{
    /// Rehydrate an aggregate without executing anything.
    ///
    /// An id whose stream belongs to another aggregate type is `NotFound`.
    pub fn load<A>(
        &self,
        aggregate_id: AggregateId,
        aggregate_type: &str,
        make_aggregate: impl FnOnce(AggregateId) -> A,
    ) -> Result<A, DispatchError>
    where
        A: Aggregate,
        A::Event: DeserializeOwned,
    {
        let history = self.store.load_stream(aggregate_id)?;
        validate_loaded_stream(aggregate_id, aggregate_type, &history)?;

        let mut aggregate = make_aggregate(aggregate_id);
        apply_history(&mut aggregate, &history)?;
        Ok(aggregate)
    }

    /// Decode one stream into typed events, in sequence order.
    pub fn load_events<E>(&self, aggregate_id: AggregateId, aggregate_type: &str) -> Result<Vec<E>, DispatchError>
    where
        E: DeserializeOwned,
    {
        let history = self.store.load_stream(aggregate_id)?;
        validate_loaded_stream(aggregate_id, aggregate_type, &history)?;

        history
            .into_iter()
            .map(|stored| {
                serde_json::from_value(stored.payload)
                    .map_err(|e| DispatchError::Deserialize(e.to_string()))
            })
            .collect()
    }

    /// Run the full pipeline, building the command from current state.
    ///
    /// `decide` is called once per attempt with the freshly rehydrated
    /// aggregate. Concurrency failures are retried up to `max_attempts`;
    /// every other error is returned as-is.
    pub fn execute<A, F>(
        &self,
        aggregate_id: AggregateId,
        aggregate_type: &str,
        make_aggregate: impl Fn(AggregateId) -> A,
        mut decide: F,
    ) -> Result<Outcome<A>, DispatchError>
    where
        A: Aggregate<Error = DomainError>,
        A::Event: labstock_events::Event + Serialize + DeserializeOwned,
        F: FnMut(&A) -> Result<A::Command, DispatchError>,
    {
        let mut attempt = 1;
        loop {
            match self.try_execute(aggregate_id, aggregate_type, &make_aggregate, &mut decide) {
                Err(DispatchError::Concurrency(msg)) if attempt < self.max_attempts => {
                    tracing::debug!(
                        aggregate_id = %aggregate_id,
                        aggregate_type,
                        attempt,
                        reason = %msg,
                        "append raced, retrying"
                    );
                    attempt += 1;
                }
                other => return other,
            }
        }
    }

    /// Dispatch a fixed command. Returns the committed events.
    pub fn dispatch<A>(
        &self,
        aggregate_id: AggregateId,
        aggregate_type: &str,
        command: A::Command,
        make_aggregate: impl Fn(AggregateId) -> A,
    ) -> Result<Vec<StoredEvent>, DispatchError>
    where
        A: Aggregate<Error = DomainError>,
        A::Event: labstock_events::Event + Serialize + DeserializeOwned,
    {
        self.execute(aggregate_id, aggregate_type, make_aggregate, |_| {
            Ok(command.clone())
        })
        .map(|outcome| outcome.committed)
    }

    fn try_execute<A, F>(
        &self,
        aggregate_id: AggregateId,
        aggregate_type: &str,
        make_aggregate: &impl Fn(AggregateId) -> A,
        decide: &mut F,
    ) -> Result<Outcome<A>, DispatchError>
    where
        A: Aggregate<Error = DomainError>,
        A::Event: labstock_events::Event + Serialize + DeserializeOwned,
        F: FnMut(&A) -> Result<A::Command, DispatchError>,
    {
        // 1) Load
        let history = self.store.load_stream(aggregate_id)?;
        validate_loaded_stream(aggregate_id, aggregate_type, &history)?;
        let expected = ExpectedVersion::Exact(stream_version(&history));

        // 2) Rehydrate
        let mut aggregate = make_aggregate(aggregate_id);
        apply_history(&mut aggregate, &history)?;

        // 3) + 4) Decide and handle
        let command = decide(&aggregate)?;
        let decided = aggregate.handle(&command).map_err(DispatchError::from)?;
        if decided.is_empty() {
            return Ok(Outcome {
                aggregate,
                committed: vec![],
            });
        }

        // 5) Persist
        let uncommitted = decided
            .iter()
            .map(|ev| UncommittedEvent::from_typed(aggregate_id, aggregate_type, Uuid::now_v7(), ev))
            .collect::<Result<Vec<_>, _>>()?;
        let committed = self.store.append(uncommitted, expected)?;

        for ev in &decided {
            aggregate.apply(ev);
        }

        // 6) Publish
        for stored in &committed {
            self.bus
                .publish(stored.to_envelope())
                .map_err(|e| DispatchError::Publish(format!("{e:?}")))?;
        }

        Ok(Outcome {
            aggregate,
            committed,
        })
    }
}

fn stream_version(stream: &[StoredEvent]) -> u64 {
    stream.last().map(|e| e.sequence_number).unwrap_or(0)
}

/// Ids share one namespace across aggregate types, so a stream of another
/// type is reported as `NotFound` rather than failing to deserialize.
fn validate_loaded_stream(
    aggregate_id: AggregateId,
    aggregate_type: &str,
    stream: &[StoredEvent],
) -> Result<(), DispatchError> {
    if stream.first().is_some_and(|e| e.aggregate_type != aggregate_type) {
        return Err(DispatchError::NotFound);
    }

    let mut last = 0u64;
    for (idx, e) in stream.iter().enumerate() {
        if e.aggregate_id != aggregate_id {
            return Err(DispatchError::StreamIntegrity(format!(
                "loaded stream contains wrong aggregate_id at index {idx}"
            )));
        }
        if e.aggregate_type != aggregate_type {
            return Err(DispatchError::StreamIntegrity(format!(
                "loaded stream mixes aggregate types at index {idx}"
            )));
        }
        if e.sequence_number <= last {
            return Err(DispatchError::StreamIntegrity(format!(
                "non-monotonic sequence_number in loaded stream (last={last}, found={})",
                e.sequence_number
            )));
        }
        last = e.sequence_number;
    }
    Ok(())
}

fn apply_history<A>(aggregate: &mut A, history: &[StoredEvent]) -> Result<(), DispatchError>
where
    A: Aggregate,
    A::Event: DeserializeOwned,
{
    for stored in history {
        let ev: A::Event = serde_json::from_value(stored.payload.clone())
            .map_err(|e| DispatchError::Deserialize(e.to_string()))?;
        aggregate.apply(&ev);
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;
    use std::sync::atomic::{AtomicU32, Ordering};

    use chrono::Utc;

    use labstock_core::{AggregateRoot, CategoryId, LabId, UserId};
    use labstock_events::InMemoryEventBus;
    use labstock_inventory::{
        Item, ItemCommand, ItemEvent, ItemId, ItemMetadata, ItemStatus, ReconcileStock,
        ReconciliationSource, RegisterItem,
    };

    use super::*;
    use labstock_orders::{BatchOrder, BatchOrderCommand, BatchOrderEvent, BatchOrderId, CancelBatchOrder};

    use crate::event_store::InMemoryEventStore;
    use crate::streams::{ITEM_STREAM, ORDER_STREAM};

    type Dispatcher = CommandDispatcher<Arc<InMemoryEventStore>, Arc<InMemoryEventBus<EventEnvelope<JsonValue>>>>;

    fn dispatcher() -> Dispatcher {
        CommandDispatcher::new(Arc::new(InMemoryEventStore::new()), Arc::new(InMemoryEventBus::new()))
    }

    fn register(d: &Dispatcher, quantity: i64) -> AggregateId {
        let id = AggregateId::new();
        d.dispatch(
            id,
            ITEM_STREAM,
            ItemCommand::RegisterItem(RegisterItem {
                item_id: ItemId::new(id),
                metadata: ItemMetadata {
                    name: "Agarose".to_string(),
                    lab_id: LabId::new(),
                    category_id: CategoryId::new(),
                    unit: "g".to_string(),
                    min_stock: 1,
                    expiry_date: None,
                    status: ItemStatus::Active,
                },
                initial_quantity: quantity,
                registered_by: UserId::new(),
                occurred_at: Utc::now(),
            }),
            |id| Item::empty(ItemId::new(id)),
        )
        .unwrap();
        id
    }

    fn reconcile(id: AggregateId, delta: i64) -> ItemCommand {
        ItemCommand::ReconcileStock(ReconcileStock {
            item_id: ItemId::new(id),
            delta,
            source: ReconciliationSource::UsageRequest {
                request_id: AggregateId::new(),
            },
            tag: "test".to_string(),
            actor: UserId::new(),
            on_behalf_of: None,
            occurred_at: Utc::now(),
        })
    }

    #[test]
    fn dispatch_appends_then_publishes() {
        let d = dispatcher();
        let subscription = d.bus().subscribe();

        let id = register(&d, 10);
        let committed = d
            .dispatch(id, ITEM_STREAM, reconcile(id, 20), |id| Item::empty(ItemId::new(id)))
            .unwrap();
        assert_eq!(committed[0].sequence_number, 2);

        let item: Item = d.load(id, ITEM_STREAM, |id| Item::empty(ItemId::new(id))).unwrap();
        assert_eq!(item.quantity(), 30);
        assert_eq!(item.version(), 2);

        let published = subscription.drain();
        assert_eq!(published.len(), 2);
        assert_eq!(published[1].event_type(), "stock.item.reconciled");
    }

    #[test]
    fn execute_returns_the_post_command_aggregate() {
        let d = dispatcher();
        let id = register(&d, 10);

        let outcome = d
            .execute(id, ITEM_STREAM, |id| Item::empty(ItemId::new(id)), |_| Ok(reconcile(id, -3)))
            .unwrap();
        assert_eq!(outcome.aggregate.quantity(), 7);
        assert_eq!(outcome.committed.len(), 1);
    }

    #[test]
    fn domain_errors_are_not_retried() {
        let d = dispatcher();
        let id = AggregateId::new();
        let calls = AtomicU32::new(0);

        let err = d
            .execute(id, ITEM_STREAM, |id| Item::empty(ItemId::new(id)), |_| {
                calls.fetch_add(1, Ordering::SeqCst);
                Ok(reconcile(id, 1))
            })
            .unwrap_err();
        assert!(matches!(err, DispatchError::NotFound));
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn concurrent_append_is_retried_against_fresh_state() {
        let d = dispatcher();
        let id = register(&d, 10);
        let mut seen = Vec::new();

        let outcome = d
            .execute(id, ITEM_STREAM, |id| Item::empty(ItemId::new(id)), |item: &Item| {
                seen.push(item.quantity());
                if seen.len() == 1 {
                    // Another writer lands between load and append.
                    d.dispatch(id, ITEM_STREAM, reconcile(id, 5), |id| Item::empty(ItemId::new(id)))?;
                }
                Ok(reconcile(id, 1))
            })
            .unwrap();

        assert_eq!(seen, vec![10, 15]);
        assert_eq!(outcome.aggregate.quantity(), 16);
    }

    #[test]
    fn load_events_decodes_in_sequence_order() {
        let d = dispatcher();
        let id = register(&d, 4);
        d.dispatch(id, ITEM_STREAM, reconcile(id, 2), |id| Item::empty(ItemId::new(id)))
            .unwrap();

        let events: Vec<ItemEvent> = d.load_events(id, ITEM_STREAM).unwrap();
        assert!(matches!(events[0], ItemEvent::ItemRegistered(_)));
        assert!(matches!(events[1], ItemEvent::StockReconciled(_)));
    }

    #[test]
    fn id_of_another_aggregate_type_is_not_found() {
        let d = dispatcher();
        let id = register(&d, 4);

        let err = d
            .load(id, ORDER_STREAM, |id| BatchOrder::empty(BatchOrderId::new(id)))
            .unwrap_err();
        assert!(matches!(err, DispatchError::NotFound));

        let err = d.load_events::<BatchOrderEvent>(id, ORDER_STREAM).unwrap_err();
        assert!(matches!(err, DispatchError::NotFound));

        let err = d
            .execute(id, ORDER_STREAM, |id| BatchOrder::empty(BatchOrderId::new(id)), |_| {
                Ok(BatchOrderCommand::CancelBatchOrder(CancelBatchOrder {
                    order_id: BatchOrderId::new(id),
                    cancelled_by: UserId::new(),
                    occurred_at: Utc::now(),
                }))
            })
            .unwrap_err();
        assert!(matches!(err, DispatchError::NotFound));
        assert_eq!(d.store().load_stream(id).unwrap().len(), 1);
    }
}
