//! Batch order domain (event-sourced).
//!
//! Multi-item purchase, audit and utilisation orders. Business rules are
//! implemented purely as deterministic domain logic (no IO, no HTTP, no
//! storage).

pub mod order;

pub use order::{
    BatchOrder, BatchOrderCancelled, BatchOrderCommand, BatchOrderCompleted, BatchOrderCreated,
    BatchOrderEvent, BatchOrderId, BatchOrderStatus, BatchOrderType, CancelBatchOrder,
    CompleteBatchOrder, CreateBatchOrder, LineReceipt, NewOrderLine, OrderLine, ReceivedLine,
};
