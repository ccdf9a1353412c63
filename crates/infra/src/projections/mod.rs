//! Projections (read model builders).
//!
//! Projections consume published envelopes and maintain query-optimized
//! read models. All of them are:
//! - **Rebuildable**: reconstructed from `EventStore::load_all()` at startup
//! - **Idempotent**: safe for at-least-once delivery (per-stream cursors)
//!
//! The audit trail has no projection of its own: it is read straight from
//! an item's event stream, so it can never lag the ledger.

pub mod batch_orders;
pub mod cursor;
pub mod items;
pub mod usage_requests;

use serde_json::Value as JsonValue;

use labstock_events::EventEnvelope;

use crate::streams::{ITEM_STREAM, ORDER_STREAM, USAGE_STREAM};

pub use batch_orders::{BatchOrderReadModel, BatchOrdersProjection, OrderQuery};
pub use cursor::{ProjectionError, StreamCursors};
pub use items::{ItemQuery, ItemReadModel, ItemsProjection};
pub use usage_requests::{UsageQuery, UsageRequestReadModel, UsageRequestsProjection};

/// Every stock read model, routed by stream type.
#[derive(Debug, Default)]
pub struct StockProjections {
    pub items: ItemsProjection,
    pub usage: UsageRequestsProjection,
    pub orders: BatchOrdersProjection,
}

impl StockProjections {
    pub fn new() -> Self {
        Self::default()
    }

    /// Apply one envelope. Envelopes from unknown streams are ignored.
    pub fn apply_envelope(&self, envelope: &EventEnvelope<JsonValue>) -> Result<(), ProjectionError> {
        match envelope.aggregate_type() {
            ITEM_STREAM => self.items.apply_envelope(envelope),
            USAGE_STREAM => self.usage.apply_envelope(envelope),
            ORDER_STREAM => self.orders.apply_envelope(envelope),
            _ => Ok(()),
        }
    }

    /// Drop every read model and replay `envelopes` (commit order).
    pub fn rebuild(
        &self,
        envelopes: impl IntoIterator<Item = EventEnvelope<JsonValue>>,
    ) -> Result<usize, ProjectionError> {
        self.items.clear();
        self.usage.clear();
        self.orders.clear();

        let mut replayed = 0;
        for envelope in envelopes {
            self.apply_envelope(&envelope)?;
            replayed += 1;
        }
        Ok(replayed)
    }
}
