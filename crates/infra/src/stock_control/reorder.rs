use chrono::{DateTime, Duration, Utc};
use serde::Serialize;
use serde_json::Value as JsonValue;

use labstock_auth::{Permission, Principal};
use labstock_core::LabId;
use labstock_events::{EventBus, EventEnvelope};
use labstock_inventory::{ItemId, suggest_replenishment};
use labstock_orders::BatchOrderType;

use crate::event_store::EventStore;
use crate::projections::{BatchOrderReadModel, ItemReadModel};

use super::{NewBatchOrder, NewOrderLineInput, StockControl, StockError, StockResult, require};

const EXPIRY_WINDOW_DAYS: i64 = 30;

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ReorderSuggestion {
    pub item: ItemReadModel,
    pub suggested_qty: i64,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct LabBreakdown {
    pub lab_id: LabId,
    pub item_count: usize,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct StockStats {
    pub total_items: usize,
    pub low_stock_items: usize,
    pub expiring_soon: usize,
    pub lab_breakdown: Vec<LabBreakdown>,
}

impl<S, B> StockControl<S, B>
where
    S: EventStore,
    B: EventBus<EventEnvelope<JsonValue>>,
{
    /// Active items at or below their threshold, with a refill suggestion.
    pub fn scan_low_stock(&self, principal: &Principal) -> StockResult<Vec<ReorderSuggestion>> {
        require(principal, &Permission::REORDER_READ)?;

        Ok(self
            .projections
            .items
            .low_stock()
            .into_iter()
            .map(|item| ReorderSuggestion {
                suggested_qty: suggest_replenishment(item.quantity, item.min_stock),
                item,
            })
            .collect())
    }

    /// Draft a purchase order from the low-stock scan.
    ///
    /// `item_ids` narrows the scan. Only lines with a positive suggestion
    /// are included.
    pub fn create_replenishment_order(
        &self,
        principal: &Principal,
        item_ids: Option<Vec<ItemId>>,
        reason: Option<String>,
    ) -> StockResult<BatchOrderReadModel> {
        let lines: Vec<_> = self
            .scan_low_stock(principal)?
            .into_iter()
            .filter(|s| s.suggested_qty > 0)
            .filter(|s| item_ids.as_ref().is_none_or(|ids| ids.contains(&s.item.item_id)))
            .map(|s| NewOrderLineInput {
                item_id: s.item.item_id,
                requested_qty: s.suggested_qty,
            })
            .collect();

        if lines.is_empty() {
            return Err(StockError::validation("no items need reordering"));
        }

        self.create_batch_order(
            principal,
            NewBatchOrder {
                order_type: BatchOrderType::Purchase,
                reason: Some(reason.unwrap_or_else(|| "replenishment".to_string())),
                lines,
            },
        )
    }

    /// Dashboard counters over active items.
    pub fn stats(&self, principal: &Principal, now: DateTime<Utc>) -> StockResult<StockStats> {
        require(principal, &Permission::ITEMS_READ)?;

        let active = self.projections.items.active();
        let horizon = now + Duration::days(EXPIRY_WINDOW_DAYS);

        let mut lab_breakdown: Vec<LabBreakdown> = Vec::new();
        for item in &active {
            match lab_breakdown.iter_mut().find(|l| l.lab_id == item.lab_id) {
                Some(entry) => entry.item_count += 1,
                None => lab_breakdown.push(LabBreakdown {
                    lab_id: item.lab_id,
                    item_count: 1,
                }),
            }
        }
        lab_breakdown.sort_by(|a, b| b.item_count.cmp(&a.item_count));

        Ok(StockStats {
            total_items: active.len(),
            low_stock_items: active.iter().filter(|i| i.is_low_stock()).count(),
            expiring_soon: active
                .iter()
                .filter(|i| i.expiry_date.is_some_and(|d| d >= now && d <= horizon))
                .count(),
            lab_breakdown,
        })
    }
}
