//! Aggregate type names used as stream types in the event store.

pub const ITEM_STREAM: &str = "stock.item";
pub const USAGE_STREAM: &str = "stock.usage_request";
pub const ORDER_STREAM: &str = "stock.batch_order";
