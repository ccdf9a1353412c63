//! The only writer of item quantities.
//!
//! Every quantity change (usage approval, batch order line) goes through
//! `ReconciliationEngine`, which turns it into a `ReconcileStock` command
//! on the item stream. The resulting `StockReconciled` event is both the
//! ledger movement and its audit record, written in one append.

use std::sync::Arc;

use chrono::Utc;
use serde_json::Value as JsonValue;
use tracing::info;

use labstock_core::{DomainError, UserId};
use labstock_events::{EventBus, EventEnvelope};
use labstock_inventory::{
    AuditEntry, Item, ItemCommand, ItemEvent, ItemId, ReconcileStock, ReconciliationSource,
};

use crate::command_dispatcher::{CommandDispatcher, DispatchError};
use crate::event_store::{EventStore, StoredEvent};
use crate::streams::ITEM_STREAM;

/// Who and what a reconciliation is for.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReconcileRequest {
    pub item_id: ItemId,
    pub source: ReconciliationSource,
    pub tag: String,
    /// Approving user.
    pub actor: UserId,
    /// Requesting user, when different from the approver.
    pub on_behalf_of: Option<UserId>,
}

#[derive(Debug, Clone)]
pub struct Reconciliation {
    /// Item state after the change.
    pub item: Item,
    pub audit: AuditEntry,
    /// False when `source` had already been applied and nothing changed.
    pub applied: bool,
}

#[derive(Debug)]
pub struct ReconciliationEngine<S, B> {
    dispatcher: Arc<CommandDispatcher<S, B>>,
}

impl<S, B> Clone for ReconciliationEngine<S, B> {
    fn clone(&self) -> Self {
        Self {
            dispatcher: self.dispatcher.clone(),
        }
    }
}

impl<S, B> ReconciliationEngine<S, B>
where
    S: EventStore,
    B: EventBus<EventEnvelope<JsonValue>>,
{
    pub fn new(dispatcher: Arc<CommandDispatcher<S, B>>) -> Self {
        Self { dispatcher }
    }

    /// Apply a fixed signed delta.
    pub fn reconcile(&self, request: ReconcileRequest, delta: i64) -> Result<Reconciliation, DispatchError> {
        self.reconcile_with(request, |_| Ok(delta))
    }

    /// Apply `rule(live_quantity)` as the delta.
    ///
    /// The live quantity is read inside the optimistic-concurrency window:
    /// if another change lands first the rule is evaluated again against
    /// the new quantity. Re-applying an already applied `source` returns
    /// the original audit entry with `applied == false`. A rule error
    /// aborts before anything is written.
    pub fn reconcile_with(
        &self,
        request: ReconcileRequest,
        rule: impl Fn(i64) -> Result<i64, DomainError>,
    ) -> Result<Reconciliation, DispatchError> {
        let item_id = request.item_id;

        let result = self.dispatcher.execute(
            item_id.0,
            ITEM_STREAM,
            |id| Item::empty(ItemId::new(id)),
            |item: &Item| {
                if !item.exists() {
                    return Err(DispatchError::NotFound);
                }
                if item.has_applied(&request.source) {
                    return Err(DispatchError::Conflict("reconciliation source already applied".to_string()));
                }
                Ok(ItemCommand::ReconcileStock(ReconcileStock {
                    item_id,
                    delta: rule(item.quantity())?,
                    source: request.source.clone(),
                    tag: request.tag.clone(),
                    actor: request.actor,
                    on_behalf_of: request.on_behalf_of,
                    occurred_at: Utc::now(),
                }))
            },
        );

        match result {
            Ok(outcome) => {
                let audit = audit_from_committed(&outcome.committed)?;
                info!(
                    item_id = %item_id,
                    delta = audit.delta(),
                    quantity_after = audit.quantity_after,
                    tag = %audit.tag,
                    "stock reconciled"
                );
                Ok(Reconciliation {
                    item: outcome.aggregate,
                    audit,
                    applied: true,
                })
            }
            Err(DispatchError::Conflict(msg)) => match self.find_applied(item_id, &request.source)? {
                Some(audit) => {
                    info!(item_id = %item_id, tag = %audit.tag, "reconciliation source already applied");
                    let item = self
                        .dispatcher
                        .load(item_id.0, ITEM_STREAM, |id| Item::empty(ItemId::new(id)))?;
                    Ok(Reconciliation {
                        item,
                        audit,
                        applied: false,
                    })
                }
                None => Err(DispatchError::Conflict(msg)),
            },
            Err(err) => Err(err),
        }
    }

    /// Audit trail of one item, oldest first. `None` if the item never existed.
    pub fn audit_trail(&self, item_id: ItemId) -> Result<Option<Vec<AuditEntry>>, DispatchError> {
        let events: Vec<ItemEvent> = self.dispatcher.load_events(item_id.0, ITEM_STREAM)?;
        if events.is_empty() {
            return Ok(None);
        }

        Ok(Some(
            events
                .iter()
                .filter_map(|e| match e {
                    ItemEvent::StockReconciled(r) => Some(AuditEntry::from(r)),
                    _ => None,
                })
                .collect(),
        ))
    }

    /// The audit entry `source` produced on this item, if it was applied.
    pub fn find_applied(
        &self,
        item_id: ItemId,
        source: &ReconciliationSource,
    ) -> Result<Option<AuditEntry>, DispatchError> {
        let events: Vec<ItemEvent> = self.dispatcher.load_events(item_id.0, ITEM_STREAM)?;
        Ok(events.iter().find_map(|e| match e {
            ItemEvent::StockReconciled(r) if &r.source == source => Some(AuditEntry::from(r)),
            _ => None,
        }))
    }
}

fn audit_from_committed(committed: &[StoredEvent]) -> Result<AuditEntry, DispatchError> {
    committed
        .iter()
        .find_map(|stored| match serde_json::from_value::<ItemEvent>(stored.payload.clone()) {
            Ok(ItemEvent::StockReconciled(e)) => Some(AuditEntry::from(&e)),
            _ => None,
        })
        .ok_or_else(|| DispatchError::InvariantViolation("reconciliation committed no ledger event".to_string()))
}
