//! Quantity ledger domain (event-sourced).
//!
//! Business rules for inventory items, their audit trail and the reorder
//! rule, implemented purely as deterministic domain logic (no IO, no HTTP,
//! no storage).

pub mod audit;
pub mod item;
pub mod reorder;

pub use audit::{AuditEntry, AuditStatus, Direction};
pub use item::{
    Item, ItemCommand, ItemEvent, ItemId, ItemMetadata, ItemMetadataUpdated, ItemRegistered,
    ItemRemoved, ItemStatus, MetadataPatch, ReconcileStock, ReconciliationSource, RegisterItem,
    RemoveItem, StockReconciled, UpdateItemMetadata,
};
pub use reorder::{is_low_stock, suggest_replenishment};
