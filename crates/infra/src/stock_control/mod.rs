//! Stock workflows: the operations the API exposes.
//!
//! Writes go through the `CommandDispatcher` (one aggregate per call) and
//! the `ReconciliationEngine` (every quantity change). Single-record reads
//! rehydrate the aggregate; listings read the projections.

mod error;
mod items;
mod orders;
mod reorder;
mod usage;

use std::sync::Arc;

use serde_json::Value as JsonValue;
use tracing::warn;

use labstock_auth::{Permission, Principal, authorize};
use labstock_core::AggregateId;
use labstock_events::{EventBus, EventEnvelope};
use labstock_inventory::{Item, ItemId, ReconciliationSource};

use crate::command_dispatcher::CommandDispatcher;
use crate::event_store::EventStore;
use crate::locks::DecisionLocks;
use crate::projections::StockProjections;
use crate::reconciliation::ReconciliationEngine;
use crate::streams::ITEM_STREAM;

pub use error::StockError;
pub use items::NewItem;
pub use orders::{Finalize, NewBatchOrder, NewOrderLineInput};
pub use reorder::{LabBreakdown, ReorderSuggestion, StockStats};
pub use usage::{Decision, NewUsageRequest};

use error::NotFoundContext;

pub type StockResult<T> = Result<T, StockError>;

#[derive(Debug)]
pub struct StockControl<S, B> {
    dispatcher: Arc<CommandDispatcher<S, B>>,
    engine: ReconciliationEngine<S, B>,
    projections: Arc<StockProjections>,
    locks: DecisionLocks,
}

impl<S, B> StockControl<S, B>
where
    S: EventStore,
    B: EventBus<EventEnvelope<JsonValue>>,
{
    pub fn new(dispatcher: Arc<CommandDispatcher<S, B>>, projections: Arc<StockProjections>) -> Self {
        Self {
            engine: ReconciliationEngine::new(dispatcher.clone()),
            dispatcher,
            projections,
            locks: DecisionLocks::new(),
        }
    }

    pub fn engine(&self) -> &ReconciliationEngine<S, B> {
        &self.engine
    }

    pub fn projections(&self) -> &Arc<StockProjections> {
        &self.projections
    }

    /// Rehydrate an item that must exist (registered and not removed).
    fn load_existing_item(&self, item_id: ItemId) -> StockResult<Item> {
        let item = self
            .dispatcher
            .load(item_id.0, ITEM_STREAM, |id| Item::empty(ItemId::new(id)))
            .or_not_found("item")?;
        if !item.exists() {
            return Err(StockError::not_found(format!("item {item_id}")));
        }
        Ok(item)
    }

    /// Fail with `State` if `source` already moved any of `items`.
    ///
    /// An approval or completion whose final append failed leaves the ledger
    /// ahead of the request or order; the only way to close it is to retry
    /// that approval or completion.
    fn ensure_unapplied(
        &self,
        items: impl IntoIterator<Item = ItemId>,
        source: &ReconciliationSource,
        retry_with: &str,
    ) -> StockResult<()> {
        for item_id in items {
            if let Some(audit) = self.engine.find_applied(item_id, source).or_not_found("item")? {
                warn!(item_id = %item_id, tag = %audit.tag, "decision refused, ledger already reconciled");
                return Err(StockError::State(format!(
                    "item {item_id} was already reconciled by {}; {retry_with} to finish",
                    audit.tag
                )));
            }
        }
        Ok(())
    }
}

fn require(principal: &Principal, permission: &Permission) -> StockResult<()> {
    authorize(principal, permission).map_err(StockError::from)
}

fn new_id() -> AggregateId {
    AggregateId::new()
}
