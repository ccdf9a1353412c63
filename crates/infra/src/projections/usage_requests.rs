use chrono::{DateTime, Utc};
use serde::Serialize;
use serde_json::Value as JsonValue;

use labstock_core::UserId;
use labstock_events::EventEnvelope;
use labstock_inventory::ItemId;
use labstock_usage::{UsageKind, UsageRequest, UsageRequestEvent, UsageRequestId, UsageStatus};

use crate::read_model::{InMemoryReadStore, ReadStore};

use super::cursor::{ProjectionError, StreamCursors};

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct UsageRequestReadModel {
    pub request_id: UsageRequestId,
    pub item_id: ItemId,
    pub requested_by: UserId,
    pub quantity: i64,
    pub kind: UsageKind,
    pub reason: String,
    pub status: UsageStatus,
    pub decided_by: Option<UserId>,
    pub applied_delta: Option<i64>,
    pub created_at: DateTime<Utc>,
    pub decided_at: Option<DateTime<Utc>>,
}

impl UsageRequestReadModel {
    /// View of a rehydrated aggregate. `None` unless the request was submitted.
    pub fn from_aggregate(request: &UsageRequest) -> Option<Self> {
        if !request.exists() {
            return None;
        }
        Some(Self {
            request_id: request.id_typed(),
            item_id: request.item_id()?,
            requested_by: request.requested_by()?,
            quantity: request.quantity(),
            kind: request.kind(),
            reason: request.reason().to_string(),
            status: request.status(),
            decided_by: request.decided_by(),
            applied_delta: request.applied_delta(),
            created_at: request.created_at()?,
            decided_at: request.decided_at(),
        })
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct UsageQuery {
    pub item_id: Option<ItemId>,
    /// `None` means every status.
    pub status: Option<UsageStatus>,
    /// Restrict to one requester (non-admin listings).
    pub requested_by: Option<UserId>,
}

impl UsageQuery {
    fn matches(&self, row: &UsageRequestReadModel) -> bool {
        self.item_id.is_none_or(|id| id == row.item_id)
            && self.status.is_none_or(|s| s == row.status)
            && self.requested_by.is_none_or(|u| u == row.requested_by)
    }
}

#[derive(Debug)]
pub struct UsageRequestsProjection<S = InMemoryReadStore<UsageRequestId, UsageRequestReadModel>>
where
    S: ReadStore<UsageRequestId, UsageRequestReadModel>,
{
    store: S,
    cursors: StreamCursors,
}

impl Default for UsageRequestsProjection {
    fn default() -> Self {
        Self::new(InMemoryReadStore::new())
    }
}

impl<S> UsageRequestsProjection<S>
where
    S: ReadStore<UsageRequestId, UsageRequestReadModel>,
{
    pub fn new(store: S) -> Self {
        Self {
            store,
            cursors: StreamCursors::new(),
        }
    }

    pub fn get(&self, request_id: &UsageRequestId) -> Option<UsageRequestReadModel> {
        self.store.get(request_id)
    }

    /// Filtered requests, newest first.
    pub fn query(&self, query: &UsageQuery) -> Vec<UsageRequestReadModel> {
        let mut rows: Vec<_> = self
            .store
            .list()
            .into_iter()
            .filter(|row| query.matches(row))
            .collect();
        rows.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        rows
    }

    /// True while a pending request references `item_id`.
    pub fn open_for_item(&self, item_id: ItemId) -> bool {
        self.store
            .list()
            .iter()
            .any(|row| row.item_id == item_id && row.status == UsageStatus::Pending)
    }

    pub fn clear(&self) {
        self.cursors.clear();
        self.store.clear();
    }

    pub fn apply_envelope(&self, envelope: &EventEnvelope<JsonValue>) -> Result<(), ProjectionError> {
        let aggregate_id = envelope.aggregate_id();

        self.cursors
            .advance(aggregate_id, envelope.sequence_number(), || {
                let event: UsageRequestEvent = serde_json::from_value(envelope.payload().clone())
                    .map_err(|e| ProjectionError::Deserialize {
                        stream: "usage request",
                        message: e.to_string(),
                    })?;

                let request_id = match &event {
                    UsageRequestEvent::UsageSubmitted(e) => e.request_id,
                    UsageRequestEvent::UsageApproved(e) => e.request_id,
                    UsageRequestEvent::UsageRejected(e) => e.request_id,
                };
                if request_id.0 != aggregate_id {
                    return Err(ProjectionError::StreamMismatch(aggregate_id));
                }

                self.apply(event);
                Ok(())
            })
    }

    fn apply(&self, event: UsageRequestEvent) {
        match event {
            UsageRequestEvent::UsageSubmitted(e) => {
                self.store.upsert(
                    e.request_id,
                    UsageRequestReadModel {
                        request_id: e.request_id,
                        item_id: e.item_id,
                        requested_by: e.requested_by,
                        quantity: e.quantity,
                        kind: e.kind,
                        reason: e.reason,
                        status: UsageStatus::Pending,
                        decided_by: None,
                        applied_delta: None,
                        created_at: e.occurred_at,
                        decided_at: None,
                    },
                );
            }
            UsageRequestEvent::UsageApproved(e) => {
                if let Some(mut row) = self.store.get(&e.request_id) {
                    row.status = UsageStatus::Approved;
                    row.quantity = e.quantity;
                    row.applied_delta = Some(e.applied_delta);
                    row.decided_by = Some(e.approved_by);
                    row.decided_at = Some(e.occurred_at);
                    self.store.upsert(e.request_id, row);
                }
            }
            UsageRequestEvent::UsageRejected(e) => {
                if let Some(mut row) = self.store.get(&e.request_id) {
                    row.status = UsageStatus::Rejected;
                    row.quantity = e.quantity;
                    row.decided_by = Some(e.rejected_by);
                    row.decided_at = Some(e.occurred_at);
                    self.store.upsert(e.request_id, row);
                }
            }
        }
    }
}
