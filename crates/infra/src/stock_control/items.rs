use chrono::{DateTime, Utc};
use serde_json::Value as JsonValue;
use tracing::info;

use labstock_auth::{CommandAuthorization, Permission, Principal, authorize_all};
use labstock_core::{CategoryId, LabId};
use labstock_events::{EventBus, EventEnvelope};
use labstock_inventory::{
    AuditEntry, Item, ItemCommand, ItemId, ItemMetadata, ItemStatus, MetadataPatch, RegisterItem,
    RemoveItem, UpdateItemMetadata,
};

use crate::event_store::EventStore;
use crate::projections::{ItemQuery, ItemReadModel};
use crate::read_model::{Page, PageRequest, paginate};
use crate::streams::ITEM_STREAM;

use super::{NotFoundContext, StockControl, StockError, StockResult, new_id, require};

/// Input for registering an item. The only place a quantity is chosen freely.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NewItem {
    pub name: String,
    pub lab_id: LabId,
    pub category_id: CategoryId,
    pub unit: String,
    pub min_stock: i64,
    pub expiry_date: Option<DateTime<Utc>>,
    pub status: Option<ItemStatus>,
    pub initial_quantity: i64,
}

impl CommandAuthorization for NewItem {
    fn required_permissions(&self) -> &[Permission] {
        &[Permission::ITEMS_WRITE]
    }
}

fn item_view(item: &Item) -> StockResult<ItemReadModel> {
    ItemReadModel::from_aggregate(item).ok_or_else(|| StockError::not_found(format!("item {}", item.id_typed())))
}

impl<S, B> StockControl<S, B>
where
    S: EventStore,
    B: EventBus<EventEnvelope<JsonValue>>,
{
    pub fn register_item(&self, principal: &Principal, input: NewItem) -> StockResult<ItemReadModel> {
        authorize_all(principal, &input)?;

        let item_id = ItemId::new(new_id());
        let command = ItemCommand::RegisterItem(RegisterItem {
            item_id,
            metadata: ItemMetadata {
                name: input.name.trim().to_string(),
                lab_id: input.lab_id,
                category_id: input.category_id,
                unit: input.unit.trim().to_string(),
                min_stock: input.min_stock,
                expiry_date: input.expiry_date,
                status: input.status.unwrap_or_default(),
            },
            initial_quantity: input.initial_quantity,
            registered_by: principal.user_id,
            occurred_at: Utc::now(),
        });

        let outcome = self
            .dispatcher
            .execute(item_id.0, ITEM_STREAM, |id| Item::empty(ItemId::new(id)), |_| Ok(command.clone()))?;

        info!(item_id = %item_id, quantity = input.initial_quantity, user_id = %principal.user_id, "item registered");
        item_view(&outcome.aggregate)
    }

    /// Patch metadata. The patch type has no quantity field.
    pub fn update_item_metadata(
        &self,
        principal: &Principal,
        item_id: ItemId,
        patch: MetadataPatch,
    ) -> StockResult<ItemReadModel> {
        require(principal, &Permission::ITEMS_WRITE)?;

        let outcome = self
            .dispatcher
            .execute(item_id.0, ITEM_STREAM, |id| Item::empty(ItemId::new(id)), |_| {
                Ok(ItemCommand::UpdateItemMetadata(UpdateItemMetadata {
                    item_id,
                    patch: patch.clone(),
                    occurred_at: Utc::now(),
                }))
            })
            .or_not_found("item")?;

        info!(item_id = %item_id, user_id = %principal.user_id, "item metadata updated");
        item_view(&outcome.aggregate)
    }

    /// Remove an item. Refused while pending usage requests or open batch
    /// orders still reference it.
    pub fn remove_item(&self, principal: &Principal, item_id: ItemId) -> StockResult<()> {
        require(principal, &Permission::ITEMS_WRITE)?;
        self.load_existing_item(item_id)?;

        if self.projections.usage.open_for_item(item_id) {
            return Err(StockError::Conflict(format!(
                "item {item_id} has pending usage requests"
            )));
        }
        if self.projections.orders.open_referencing(item_id) {
            return Err(StockError::Conflict(format!(
                "item {item_id} is part of an open batch order"
            )));
        }

        self.dispatcher
            .dispatch(
                item_id.0,
                ITEM_STREAM,
                ItemCommand::RemoveItem(RemoveItem {
                    item_id,
                    removed_by: principal.user_id,
                    occurred_at: Utc::now(),
                }),
                |id| Item::empty(ItemId::new(id)),
            )
            .or_not_found("item")?;

        info!(item_id = %item_id, user_id = %principal.user_id, "item removed");
        Ok(())
    }

    /// Strongly consistent read from the event store.
    pub fn get_item(&self, principal: &Principal, item_id: ItemId) -> StockResult<ItemReadModel> {
        require(principal, &Permission::ITEMS_READ)?;
        let item = self.load_existing_item(item_id)?;
        item_view(&item)
    }

    pub fn query_items(
        &self,
        principal: &Principal,
        query: &ItemQuery,
        page: PageRequest,
    ) -> StockResult<Page<ItemReadModel>> {
        require(principal, &Permission::ITEMS_READ)?;
        Ok(paginate(self.projections.items.query(query), page))
    }

    /// Audit entries of one item, newest first. Still available after removal.
    pub fn item_audit_trail(&self, principal: &Principal, item_id: ItemId) -> StockResult<Vec<AuditEntry>> {
        require(principal, &Permission::ITEMS_READ)?;

        let mut trail = self
            .engine
            .audit_trail(item_id)
            .or_not_found("item")?
            .ok_or_else(|| StockError::not_found(format!("item {item_id}")))?;
        trail.reverse();
        Ok(trail)
    }
}
