use std::collections::HashSet;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use labstock_core::{Aggregate, AggregateId, AggregateRoot, CategoryId, DomainError, LabId, UserId};
use labstock_events::Event;

/// Inventory item identifier.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ItemId(pub AggregateId);

impl ItemId {
    pub fn new(id: AggregateId) -> Self {
        Self(id)
    }
}

impl core::fmt::Display for ItemId {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        core::fmt::Display::fmt(&self.0, f)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ItemStatus {
    #[default]
    Active,
    Inactive,
}

/// Everything about an item except its quantity.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ItemMetadata {
    pub name: String,
    pub lab_id: LabId,
    pub category_id: CategoryId,
    pub unit: String,
    pub min_stock: i64,
    pub expiry_date: Option<DateTime<Utc>>,
    #[serde(default)]
    pub status: ItemStatus,
}

impl ItemMetadata {
    fn validate(&self) -> Result<(), DomainError> {
        if self.name.trim().is_empty() {
            return Err(DomainError::validation("name cannot be empty"));
        }
        if self.unit.trim().is_empty() {
            return Err(DomainError::validation("unit cannot be empty"));
        }
        if self.min_stock < 0 {
            return Err(DomainError::validation("min_stock cannot be negative"));
        }
        Ok(())
    }
}

/// Partial metadata update.
///
/// Has no quantity field: quantity only moves through `ReconcileStock`.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct MetadataPatch {
    pub name: Option<String>,
    pub lab_id: Option<LabId>,
    pub category_id: Option<CategoryId>,
    pub unit: Option<String>,
    pub min_stock: Option<i64>,
    pub expiry_date: Option<DateTime<Utc>>,
    #[serde(default)]
    pub clear_expiry_date: bool,
    pub status: Option<ItemStatus>,
}

impl MetadataPatch {
    pub fn is_empty(&self) -> bool {
        self.name.is_none()
            && self.lab_id.is_none()
            && self.category_id.is_none()
            && self.unit.is_none()
            && self.min_stock.is_none()
            && self.expiry_date.is_none()
            && !self.clear_expiry_date
            && self.status.is_none()
    }

    /// Merge this patch over `current`.
    pub fn merged_into(&self, current: &ItemMetadata) -> ItemMetadata {
        let mut next = current.clone();
        if let Some(name) = &self.name {
            next.name = name.clone();
        }
        if let Some(lab_id) = self.lab_id {
            next.lab_id = lab_id;
        }
        if let Some(category_id) = self.category_id {
            next.category_id = category_id;
        }
        if let Some(unit) = &self.unit {
            next.unit = unit.clone();
        }
        if let Some(min_stock) = self.min_stock {
            next.min_stock = min_stock;
        }
        if self.clear_expiry_date {
            next.expiry_date = None;
        } else if let Some(expiry) = self.expiry_date {
            next.expiry_date = Some(expiry);
        }
        if let Some(status) = self.status {
            next.status = status;
        }
        next
    }
}

/// What caused a reconciliation. Each source is applied to an item at most once.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum ReconciliationSource {
    UsageRequest { request_id: AggregateId },
    BatchOrderLine { order_id: AggregateId },
}

/// Aggregate root: Item (the quantity ledger entry).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Item {
    id: ItemId,
    metadata: Option<ItemMetadata>,
    quantity: i64,
    applied_sources: HashSet<ReconciliationSource>,
    created_at: Option<DateTime<Utc>>,
    updated_at: Option<DateTime<Utc>>,
    removed: bool,
    version: u64,
}

impl Item {
    /// Create an empty, not-yet-registered aggregate instance for rehydration.
    pub fn empty(id: ItemId) -> Self {
        Self {
            id,
            metadata: None,
            quantity: 0,
            applied_sources: HashSet::new(),
            created_at: None,
            updated_at: None,
            removed: false,
            version: 0,
        }
    }

    pub fn id_typed(&self) -> ItemId {
        self.id
    }

    /// True once registered and not removed.
    pub fn exists(&self) -> bool {
        self.metadata.is_some() && !self.removed
    }

    pub fn is_removed(&self) -> bool {
        self.removed
    }

    pub fn metadata(&self) -> Option<&ItemMetadata> {
        self.metadata.as_ref()
    }

    pub fn quantity(&self) -> i64 {
        self.quantity
    }

    pub fn created_at(&self) -> Option<DateTime<Utc>> {
        self.created_at
    }

    pub fn updated_at(&self) -> Option<DateTime<Utc>> {
        self.updated_at
    }

    pub fn has_applied(&self, source: &ReconciliationSource) -> bool {
        self.applied_sources.contains(source)
    }
}

impl AggregateRoot for Item {
    type Id = ItemId;

    fn id(&self) -> &Self::Id {
        &self.id
    }

    fn version(&self) -> u64 {
        self.version
    }
}

/// Command: RegisterItem. The only place an initial quantity is chosen.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RegisterItem {
    pub item_id: ItemId,
    pub metadata: ItemMetadata,
    pub initial_quantity: i64,
    pub registered_by: UserId,
    pub occurred_at: DateTime<Utc>,
}

/// Command: UpdateItemMetadata.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UpdateItemMetadata {
    pub item_id: ItemId,
    pub patch: MetadataPatch,
    pub occurred_at: DateTime<Utc>,
}

/// Command: ReconcileStock. Issued only by the reconciliation engine.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReconcileStock {
    pub item_id: ItemId,
    pub delta: i64,
    pub source: ReconciliationSource,
    pub tag: String,
    /// The approving user.
    pub actor: UserId,
    /// The user who asked for the change, when different from the approver.
    pub on_behalf_of: Option<UserId>,
    pub occurred_at: DateTime<Utc>,
}

/// Command: RemoveItem.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RemoveItem {
    pub item_id: ItemId,
    pub removed_by: UserId,
    pub occurred_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum ItemCommand {
    RegisterItem(RegisterItem),
    UpdateItemMetadata(UpdateItemMetadata),
    ReconcileStock(ReconcileStock),
    RemoveItem(RemoveItem),
}

/// Event: ItemRegistered.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ItemRegistered {
    pub item_id: ItemId,
    pub metadata: ItemMetadata,
    pub initial_quantity: i64,
    pub registered_by: UserId,
    pub occurred_at: DateTime<Utc>,
}

/// Event: ItemMetadataUpdated (carries the full resulting metadata).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ItemMetadataUpdated {
    pub item_id: ItemId,
    pub metadata: ItemMetadata,
    pub occurred_at: DateTime<Utc>,
}

/// Event: StockReconciled. Doubles as the immutable audit record.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StockReconciled {
    pub item_id: ItemId,
    pub delta: i64,
    pub quantity_before: i64,
    pub quantity_after: i64,
    pub source: ReconciliationSource,
    pub tag: String,
    pub actor: UserId,
    pub on_behalf_of: Option<UserId>,
    pub occurred_at: DateTime<Utc>,
}

/// Event: ItemRemoved.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ItemRemoved {
    pub item_id: ItemId,
    pub removed_by: UserId,
    pub occurred_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum ItemEvent {
    ItemRegistered(ItemRegistered),
    ItemMetadataUpdated(ItemMetadataUpdated),
    StockReconciled(StockReconciled),
    ItemRemoved(ItemRemoved),
}

impl Event for ItemEvent {
    fn event_type(&self) -> &'static str {
        match self {
            ItemEvent::ItemRegistered(_) => "stock.item.registered",
            ItemEvent::ItemMetadataUpdated(_) => "stock.item.metadata_updated",
            ItemEvent::StockReconciled(_) => "stock.item.reconciled",
            ItemEvent::ItemRemoved(_) => "stock.item.removed",
        }
    }

    fn version(&self) -> u32 {
        1
    }

    fn occurred_at(&self) -> DateTime<Utc> {
        match self {
            ItemEvent::ItemRegistered(e) => e.occurred_at,
            ItemEvent::ItemMetadataUpdated(e) => e.occurred_at,
            ItemEvent::StockReconciled(e) => e.occurred_at,
            ItemEvent::ItemRemoved(e) => e.occurred_at,
        }
    }
}

impl Aggregate for Item {
    type Command = ItemCommand;
    type Event = ItemEvent;
    type Error = DomainError;

    fn apply(&mut self, event: &Self::Event) {
        match event {
            ItemEvent::ItemRegistered(e) => {
                self.id = e.item_id;
                self.metadata = Some(e.metadata.clone());
                self.quantity = e.initial_quantity;
                self.created_at = Some(e.occurred_at);
                self.updated_at = Some(e.occurred_at);
            }
            ItemEvent::ItemMetadataUpdated(e) => {
                self.metadata = Some(e.metadata.clone());
                self.updated_at = Some(e.occurred_at);
            }
            ItemEvent::StockReconciled(e) => {
                self.quantity = e.quantity_after;
                self.applied_sources.insert(e.source.clone());
                self.updated_at = Some(e.occurred_at);
            }
            ItemEvent::ItemRemoved(e) => {
                self.removed = true;
                self.updated_at = Some(e.occurred_at);
            }
        }

        self.version += 1;
    }

    fn handle(&self, command: &Self::Command) -> Result<Vec<Self::Event>, Self::Error> {
        match command {
            ItemCommand::RegisterItem(cmd) => self.handle_register(cmd),
            ItemCommand::UpdateItemMetadata(cmd) => self.handle_update_metadata(cmd),
            ItemCommand::ReconcileStock(cmd) => self.handle_reconcile(cmd),
            ItemCommand::RemoveItem(cmd) => self.handle_remove(cmd),
        }
    }
}

impl Item {
    fn ensure_exists(&self, item_id: ItemId) -> Result<&ItemMetadata, DomainError> {
        if self.id != item_id {
            return Err(DomainError::invariant("item_id mismatch"));
        }
        match &self.metadata {
            Some(metadata) if !self.removed => Ok(metadata),
            _ => Err(DomainError::not_found()),
        }
    }

    fn handle_register(&self, cmd: &RegisterItem) -> Result<Vec<ItemEvent>, DomainError> {
        if self.metadata.is_some() {
            return Err(DomainError::conflict("item already exists"));
        }
        if self.id != cmd.item_id {
            return Err(DomainError::invariant("item_id mismatch"));
        }
        cmd.metadata.validate()?;

        Ok(vec![ItemEvent::ItemRegistered(ItemRegistered {
            item_id: cmd.item_id,
            metadata: cmd.metadata.clone(),
            initial_quantity: cmd.initial_quantity,
            registered_by: cmd.registered_by,
            occurred_at: cmd.occurred_at,
        })])
    }

    fn handle_update_metadata(
        &self,
        cmd: &UpdateItemMetadata,
    ) -> Result<Vec<ItemEvent>, DomainError> {
        let current = self.ensure_exists(cmd.item_id)?;

        if cmd.patch.is_empty() {
            return Err(DomainError::validation("metadata patch is empty"));
        }

        let next = cmd.patch.merged_into(current);
        next.validate()?;

        Ok(vec![ItemEvent::ItemMetadataUpdated(ItemMetadataUpdated {
            item_id: cmd.item_id,
            metadata: next,
            occurred_at: cmd.occurred_at,
        })])
    }

    fn handle_reconcile(&self, cmd: &ReconcileStock) -> Result<Vec<ItemEvent>, DomainError> {
        self.ensure_exists(cmd.item_id)?;

        if self.has_applied(&cmd.source) {
            return Err(DomainError::conflict("reconciliation source already applied"));
        }

        // No floor: a negative result is recorded as-is.
        let quantity_after = self
            .quantity
            .checked_add(cmd.delta)
            .ok_or_else(|| DomainError::validation("quantity overflow"))?;

        Ok(vec![ItemEvent::StockReconciled(StockReconciled {
            item_id: cmd.item_id,
            delta: cmd.delta,
            quantity_before: self.quantity,
            quantity_after,
            source: cmd.source.clone(),
            tag: cmd.tag.clone(),
            actor: cmd.actor,
            on_behalf_of: cmd.on_behalf_of,
            occurred_at: cmd.occurred_at,
        })])
    }

    fn handle_remove(&self, cmd: &RemoveItem) -> Result<Vec<ItemEvent>, DomainError> {
        self.ensure_exists(cmd.item_id)?;

        Ok(vec![ItemEvent::ItemRemoved(ItemRemoved {
            item_id: cmd.item_id,
            removed_by: cmd.removed_by,
            occurred_at: cmd.occurred_at,
        })])
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn test_item_id() -> ItemId {
        ItemId::new(AggregateId::new())
    }

    fn test_time() -> DateTime<Utc> {
        Utc::now()
    }

    fn test_metadata() -> ItemMetadata {
        ItemMetadata {
            name: "Ethanol 70%".to_string(),
            lab_id: LabId::new(),
            category_id: CategoryId::new(),
            unit: "ml".to_string(),
            min_stock: 5,
            expiry_date: None,
            status: ItemStatus::Active,
        }
    }

    fn registered(item_id: ItemId, initial_quantity: i64) -> Item {
        let mut item = Item::empty(item_id);
        let events = item
            .handle(&ItemCommand::RegisterItem(RegisterItem {
                item_id,
                metadata: test_metadata(),
                initial_quantity,
                registered_by: UserId::new(),
                occurred_at: test_time(),
            }))
            .unwrap();
        item.apply(&events[0]);
        item
    }

    fn reconcile_cmd(item_id: ItemId, delta: i64, source: ReconciliationSource) -> ItemCommand {
        ItemCommand::ReconcileStock(ReconcileStock {
            item_id,
            delta,
            source,
            tag: "test".to_string(),
            actor: UserId::new(),
            on_behalf_of: None,
            occurred_at: test_time(),
        })
    }

    fn usage_source() -> ReconciliationSource {
        ReconciliationSource::UsageRequest {
            request_id: AggregateId::new(),
        }
    }

    #[test]
    fn register_sets_initial_quantity() {
        let item_id = test_item_id();
        let item = registered(item_id, 10);

        assert!(item.exists());
        assert_eq!(item.quantity(), 10);
        assert_eq!(item.version(), 1);
        assert_eq!(item.metadata().unwrap().unit, "ml");
    }

    #[test]
    fn register_twice_is_a_conflict() {
        let item_id = test_item_id();
        let item = registered(item_id, 0);

        let err = item
            .handle(&ItemCommand::RegisterItem(RegisterItem {
                item_id,
                metadata: test_metadata(),
                initial_quantity: 3,
                registered_by: UserId::new(),
                occurred_at: test_time(),
            }))
            .unwrap_err();
        assert!(matches!(err, DomainError::Conflict(_)));
    }

    #[test]
    fn register_rejects_blank_name_and_negative_threshold() {
        let item_id = test_item_id();
        let item = Item::empty(item_id);

        let mut metadata = test_metadata();
        metadata.name = "   ".to_string();
        let err = item
            .handle(&ItemCommand::RegisterItem(RegisterItem {
                item_id,
                metadata,
                initial_quantity: 0,
                registered_by: UserId::new(),
                occurred_at: test_time(),
            }))
            .unwrap_err();
        assert!(matches!(err, DomainError::Validation(msg) if msg.contains("name")));

        let mut metadata = test_metadata();
        metadata.min_stock = -1;
        let err = item
            .handle(&ItemCommand::RegisterItem(RegisterItem {
                item_id,
                metadata,
                initial_quantity: 0,
                registered_by: UserId::new(),
                occurred_at: test_time(),
            }))
            .unwrap_err();
        assert!(matches!(err, DomainError::Validation(msg) if msg.contains("min_stock")));
    }

    #[test]
    fn metadata_update_never_changes_quantity() {
        let item_id = test_item_id();
        let mut item = registered(item_id, 10);

        let patch = MetadataPatch {
            name: Some("Ethanol 96%".to_string()),
            min_stock: Some(8),
            ..Default::default()
        };
        let events = item
            .handle(&ItemCommand::UpdateItemMetadata(UpdateItemMetadata {
                item_id,
                patch,
                occurred_at: test_time(),
            }))
            .unwrap();
        item.apply(&events[0]);

        assert_eq!(item.quantity(), 10);
        assert_eq!(item.metadata().unwrap().name, "Ethanol 96%");
        assert_eq!(item.metadata().unwrap().min_stock, 8);
    }

    #[test]
    fn empty_patch_is_rejected() {
        let item_id = test_item_id();
        let item = registered(item_id, 10);

        let err = item
            .handle(&ItemCommand::UpdateItemMetadata(UpdateItemMetadata {
                item_id,
                patch: MetadataPatch::default(),
                occurred_at: test_time(),
            }))
            .unwrap_err();
        assert!(matches!(err, DomainError::Validation(_)));
    }

    #[test]
    fn reconcile_records_before_and_after() {
        let item_id = test_item_id();
        let mut item = registered(item_id, 10);

        let events = item.handle(&reconcile_cmd(item_id, -3, usage_source())).unwrap();
        match &events[0] {
            ItemEvent::StockReconciled(e) => {
                assert_eq!(e.quantity_before, 10);
                assert_eq!(e.quantity_after, 7);
                assert_eq!(e.delta, -3);
            }
            _ => panic!("Expected StockReconciled event"),
        }
        item.apply(&events[0]);
        assert_eq!(item.quantity(), 7);
    }

    #[test]
    fn reconcile_may_drive_quantity_negative() {
        let item_id = test_item_id();
        let mut item = registered(item_id, 2);

        let events = item.handle(&reconcile_cmd(item_id, -5, usage_source())).unwrap();
        item.apply(&events[0]);
        assert_eq!(item.quantity(), -3);
    }

    #[test]
    fn zero_delta_still_produces_an_audit_record() {
        let item_id = test_item_id();
        let item = registered(item_id, 4);

        let events = item.handle(&reconcile_cmd(item_id, 0, usage_source())).unwrap();
        assert_eq!(events.len(), 1);
    }

    #[test]
    fn same_source_cannot_be_applied_twice() {
        let item_id = test_item_id();
        let mut item = registered(item_id, 10);
        let source = ReconciliationSource::BatchOrderLine {
            order_id: AggregateId::new(),
        };

        let events = item.handle(&reconcile_cmd(item_id, 5, source.clone())).unwrap();
        item.apply(&events[0]);

        let err = item.handle(&reconcile_cmd(item_id, 5, source)).unwrap_err();
        match err {
            DomainError::Conflict(msg) if msg.contains("already applied") => {}
            _ => panic!("Expected Conflict for duplicate source"),
        }
        assert_eq!(item.quantity(), 15);
    }

    #[test]
    fn removed_item_rejects_further_commands() {
        let item_id = test_item_id();
        let mut item = registered(item_id, 10);

        let events = item
            .handle(&ItemCommand::RemoveItem(RemoveItem {
                item_id,
                removed_by: UserId::new(),
                occurred_at: test_time(),
            }))
            .unwrap();
        item.apply(&events[0]);

        assert!(!item.exists());
        let err = item.handle(&reconcile_cmd(item_id, 1, usage_source())).unwrap_err();
        assert_eq!(err, DomainError::NotFound);
    }

    #[test]
    fn reconcile_on_unknown_item_is_not_found() {
        let item_id = test_item_id();
        let item = Item::empty(item_id);

        let err = item.handle(&reconcile_cmd(item_id, 1, usage_source())).unwrap_err();
        assert_eq!(err, DomainError::NotFound);
    }
}
