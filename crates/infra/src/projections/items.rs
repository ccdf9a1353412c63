use chrono::{DateTime, Utc};
use serde::Serialize;
use serde_json::Value as JsonValue;

use labstock_core::{CategoryId, LabId};
use labstock_events::EventEnvelope;
use labstock_inventory::{Item, ItemEvent, ItemId, ItemMetadata, ItemStatus, is_low_stock};

use crate::read_model::{InMemoryReadStore, ReadStore};

use super::cursor::{ProjectionError, StreamCursors};

/// Queryable item row: metadata plus the current quantity.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ItemReadModel {
    pub item_id: ItemId,
    pub name: String,
    pub lab_id: LabId,
    pub category_id: CategoryId,
    pub unit: String,
    pub quantity: i64,
    pub min_stock: i64,
    pub expiry_date: Option<DateTime<Utc>>,
    pub status: ItemStatus,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl ItemReadModel {
    /// View of a rehydrated aggregate. `None` unless the item exists.
    pub fn from_aggregate(item: &Item) -> Option<Self> {
        if !item.exists() {
            return None;
        }
        let metadata = item.metadata()?.clone();
        let created_at = item.created_at()?;

        Some(
            Self {
                item_id: item.id_typed(),
                name: String::new(),
                lab_id: metadata.lab_id,
                category_id: metadata.category_id,
                unit: String::new(),
                quantity: item.quantity(),
                min_stock: 0,
                expiry_date: None,
                status: ItemStatus::Active,
                created_at,
                updated_at: item.updated_at().unwrap_or(created_at),
            }
            .with_metadata(metadata),
        )
    }

    fn with_metadata(mut self, metadata: ItemMetadata) -> Self {
        self.name = metadata.name;
        self.lab_id = metadata.lab_id;
        self.category_id = metadata.category_id;
        self.unit = metadata.unit;
        self.min_stock = metadata.min_stock;
        self.expiry_date = metadata.expiry_date;
        self.status = metadata.status;
        self
    }

    pub fn is_low_stock(&self) -> bool {
        is_low_stock(self.quantity, self.min_stock)
    }
}

/// Item list filters. Search is a case-insensitive substring match on the name.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ItemQuery {
    pub lab_id: Option<LabId>,
    pub category_id: Option<CategoryId>,
    pub search: Option<String>,
}

impl ItemQuery {
    fn matches(&self, item: &ItemReadModel) -> bool {
        if self.lab_id.is_some_and(|lab| lab != item.lab_id) {
            return false;
        }
        if self.category_id.is_some_and(|c| c != item.category_id) {
            return false;
        }
        match &self.search {
            Some(term) if !term.trim().is_empty() => item
                .name
                .to_lowercase()
                .contains(&term.trim().to_lowercase()),
            _ => true,
        }
    }
}

/// Item projection. Removed items are dropped from the read model.
#[derive(Debug)]
pub struct ItemsProjection<S = InMemoryReadStore<ItemId, ItemReadModel>>
where
    S: ReadStore<ItemId, ItemReadModel>,
{
    store: S,
    cursors: StreamCursors,
}

impl Default for ItemsProjection {
    fn default() -> Self {
        Self::new(InMemoryReadStore::new())
    }
}

impl<S> ItemsProjection<S>
where
    S: ReadStore<ItemId, ItemReadModel>,
{
    pub fn new(store: S) -> Self {
        Self {
            store,
            cursors: StreamCursors::new(),
        }
    }

    pub fn get(&self, item_id: &ItemId) -> Option<ItemReadModel> {
        self.store.get(item_id)
    }

    /// Filtered items, newest first.
    pub fn query(&self, query: &ItemQuery) -> Vec<ItemReadModel> {
        let mut items: Vec<_> = self
            .store
            .list()
            .into_iter()
            .filter(|item| query.matches(item))
            .collect();
        items.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        items
    }

    /// Active items at or below their threshold.
    pub fn low_stock(&self) -> Vec<ItemReadModel> {
        let mut items: Vec<_> = self
            .store
            .list()
            .into_iter()
            .filter(|item| item.status == ItemStatus::Active && item.is_low_stock())
            .collect();
        items.sort_by(|a, b| a.name.cmp(&b.name));
        items
    }

    pub fn active(&self) -> Vec<ItemReadModel> {
        self.store
            .list()
            .into_iter()
            .filter(|item| item.status == ItemStatus::Active)
            .collect()
    }

    pub fn clear(&self) {
        self.cursors.clear();
        self.store.clear();
    }

    pub fn apply_envelope(&self, envelope: &EventEnvelope<JsonValue>) -> Result<(), ProjectionError> {
        let aggregate_id = envelope.aggregate_id();

        self.cursors
            .advance(aggregate_id, envelope.sequence_number(), || {
                let event: ItemEvent = serde_json::from_value(envelope.payload().clone()).map_err(|e| {
                    ProjectionError::Deserialize {
                        stream: "item",
                        message: e.to_string(),
                    }
                })?;

                let item_id = match &event {
                    ItemEvent::ItemRegistered(e) => e.item_id,
                    ItemEvent::ItemMetadataUpdated(e) => e.item_id,
                    ItemEvent::StockReconciled(e) => e.item_id,
                    ItemEvent::ItemRemoved(e) => e.item_id,
                };
                if item_id.0 != aggregate_id {
                    return Err(ProjectionError::StreamMismatch(aggregate_id));
                }

                self.apply(event);
                Ok(())
            })
    }

    fn apply(&self, event: ItemEvent) {
        match event {
            ItemEvent::ItemRegistered(e) => {
                let row = ItemReadModel {
                    item_id: e.item_id,
                    name: String::new(),
                    lab_id: e.metadata.lab_id,
                    category_id: e.metadata.category_id,
                    unit: String::new(),
                    quantity: e.initial_quantity,
                    min_stock: 0,
                    expiry_date: None,
                    status: ItemStatus::Active,
                    created_at: e.occurred_at,
                    updated_at: e.occurred_at,
                }
                .with_metadata(e.metadata);
                self.store.upsert(e.item_id, row);
            }
            ItemEvent::ItemMetadataUpdated(e) => {
                if let Some(row) = self.store.get(&e.item_id) {
                    let mut row = row.with_metadata(e.metadata);
                    row.updated_at = e.occurred_at;
                    self.store.upsert(e.item_id, row);
                }
            }
            ItemEvent::StockReconciled(e) => {
                if let Some(mut row) = self.store.get(&e.item_id) {
                    row.quantity = e.quantity_after;
                    row.updated_at = e.occurred_at;
                    self.store.upsert(e.item_id, row);
                }
            }
            ItemEvent::ItemRemoved(e) => {
                self.store.remove(&e.item_id);
            }
        }
    }
}
