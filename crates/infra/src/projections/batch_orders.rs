use chrono::{DateTime, Utc};
use serde::Serialize;
use serde_json::Value as JsonValue;

use labstock_core::UserId;
use labstock_events::EventEnvelope;
use labstock_inventory::ItemId;
use labstock_orders::{BatchOrder, BatchOrderEvent, BatchOrderId, BatchOrderStatus, BatchOrderType, OrderLine};

use crate::read_model::{InMemoryReadStore, ReadStore};

use super::cursor::{ProjectionError, StreamCursors};

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct BatchOrderReadModel {
    pub order_id: BatchOrderId,
    pub order_type: BatchOrderType,
    pub status: BatchOrderStatus,
    pub requested_by: UserId,
    pub reason: String,
    pub tag: String,
    pub lines: Vec<OrderLine>,
    pub created_at: DateTime<Utc>,
    pub completed_at: Option<DateTime<Utc>>,
    pub completed_by: Option<UserId>,
    pub cancelled_at: Option<DateTime<Utc>>,
    pub cancelled_by: Option<UserId>,
}

impl BatchOrderReadModel {
    /// View of a rehydrated aggregate. `None` unless the order was created.
    pub fn from_aggregate(order: &BatchOrder) -> Option<Self> {
        if !order.exists() {
            return None;
        }
        Some(Self {
            order_id: order.id_typed(),
            order_type: order.order_type(),
            status: order.status(),
            requested_by: order.requested_by()?,
            reason: order.reason().to_string(),
            tag: order.tag(),
            lines: order.lines().to_vec(),
            created_at: order.created_at()?,
            completed_at: order.completed_at(),
            completed_by: order.completed_by(),
            cancelled_at: order.cancelled_at(),
            cancelled_by: order.cancelled_by(),
        })
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct OrderQuery {
    pub order_type: Option<BatchOrderType>,
    pub status: Option<BatchOrderStatus>,
    pub requested_by: Option<UserId>,
}

impl OrderQuery {
    fn matches(&self, row: &BatchOrderReadModel) -> bool {
        self.order_type.is_none_or(|t| t == row.order_type)
            && self.status.is_none_or(|s| s == row.status)
            && self.requested_by.is_none_or(|u| u == row.requested_by)
    }
}

#[derive(Debug)]
pub struct BatchOrdersProjection<S = InMemoryReadStore<BatchOrderId, BatchOrderReadModel>>
where
    S: ReadStore<BatchOrderId, BatchOrderReadModel>,
{
    store: S,
    cursors: StreamCursors,
}

impl Default for BatchOrdersProjection {
    fn default() -> Self {
        Self::new(InMemoryReadStore::new())
    }
}

impl<S> BatchOrdersProjection<S>
where
    S: ReadStore<BatchOrderId, BatchOrderReadModel>,
{
    pub fn new(store: S) -> Self {
        Self {
            store,
            cursors: StreamCursors::new(),
        }
    }

    pub fn get(&self, order_id: &BatchOrderId) -> Option<BatchOrderReadModel> {
        self.store.get(order_id)
    }

    /// Filtered orders, newest first.
    pub fn query(&self, query: &OrderQuery) -> Vec<BatchOrderReadModel> {
        let mut rows: Vec<_> = self
            .store
            .list()
            .into_iter()
            .filter(|row| query.matches(row))
            .collect();
        rows.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        rows
    }

    /// True while a non-terminal order has a line for `item_id`.
    pub fn open_referencing(&self, item_id: ItemId) -> bool {
        self.store.list().iter().any(|row| {
            !row.status.is_terminal() && row.lines.iter().any(|l| l.item_id == item_id)
        })
    }

    pub fn clear(&self) {
        self.cursors.clear();
        self.store.clear();
    }

    pub fn apply_envelope(&self, envelope: &EventEnvelope<JsonValue>) -> Result<(), ProjectionError> {
        let aggregate_id = envelope.aggregate_id();

        self.cursors
            .advance(aggregate_id, envelope.sequence_number(), || {
                let event: BatchOrderEvent = serde_json::from_value(envelope.payload().clone())
                    .map_err(|e| ProjectionError::Deserialize {
                        stream: "batch order",
                        message: e.to_string(),
                    })?;

                let order_id = match &event {
                    BatchOrderEvent::BatchOrderCreated(e) => e.order_id,
                    BatchOrderEvent::BatchOrderCompleted(e) => e.order_id,
                    BatchOrderEvent::BatchOrderCancelled(e) => e.order_id,
                };
                if order_id.0 != aggregate_id {
                    return Err(ProjectionError::StreamMismatch(aggregate_id));
                }

                self.apply(event);
                Ok(())
            })
    }

    fn apply(&self, event: BatchOrderEvent) {
        match event {
            BatchOrderEvent::BatchOrderCreated(e) => {
                self.store.upsert(
                    e.order_id,
                    BatchOrderReadModel {
                        order_id: e.order_id,
                        order_type: e.order_type,
                        status: e.status,
                        requested_by: e.requested_by,
                        reason: e.reason,
                        tag: e.order_type.tag(e.order_id),
                        lines: e.lines,
                        created_at: e.occurred_at,
                        completed_at: None,
                        completed_by: None,
                        cancelled_at: None,
                        cancelled_by: None,
                    },
                );
            }
            BatchOrderEvent::BatchOrderCompleted(e) => {
                if let Some(mut row) = self.store.get(&e.order_id) {
                    for receipt in &e.receipts {
                        if let Some(line) = row.lines.iter_mut().find(|l| l.item_id == receipt.item_id) {
                            line.received_qty = Some(receipt.received_qty);
                            line.applied_delta = Some(receipt.applied_delta);
                        }
                    }
                    row.status = BatchOrderStatus::Completed;
                    row.completed_at = Some(e.occurred_at);
                    row.completed_by = Some(e.completed_by);
                    self.store.upsert(e.order_id, row);
                }
            }
            BatchOrderEvent::BatchOrderCancelled(e) => {
                if let Some(mut row) = self.store.get(&e.order_id) {
                    row.status = BatchOrderStatus::Cancelled;
                    row.cancelled_at = Some(e.occurred_at);
                    row.cancelled_by = Some(e.cancelled_by);
                    self.store.upsert(e.order_id, row);
                }
            }
        }
    }
}
