//! Request DTOs, validated at the boundary, and their mapping to workflow
//! inputs. Responses serialize the read models directly.

use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value as JsonValue;
use tracing::debug;
use validator::Validate;

use labstock_core::{AggregateId, CategoryId, LabId};
use labstock_infra::projections::ItemQuery;
use labstock_infra::stock_control::{Decision, NewBatchOrder, NewItem, NewOrderLineInput, NewUsageRequest};
use labstock_inventory::{ItemId, ItemStatus, MetadataPatch};
use labstock_orders::{BatchOrderStatus, BatchOrderType, ReceivedLine};
use labstock_usage::{UsageKind, UsageStatus};

// -------------------------
// Items
// -------------------------

#[derive(Debug, Deserialize, Validate)]
pub struct CreateItemRequest {
    #[validate(length(min = 1, max = 200))]
    pub name: String,
    pub lab_id: LabId,
    pub category_id: CategoryId,
    #[validate(length(min = 1, max = 32))]
    pub unit: String,
    #[validate(range(min = 0))]
    pub min_stock: i64,
    pub expiry_date: Option<DateTime<Utc>>,
    pub status: Option<ItemStatus>,
    #[serde(default)]
    pub quantity: i64,
}

impl From<CreateItemRequest> for NewItem {
    fn from(body: CreateItemRequest) -> Self {
        NewItem {
            name: body.name,
            lab_id: body.lab_id,
            category_id: body.category_id,
            unit: body.unit,
            min_stock: body.min_stock,
            expiry_date: body.expiry_date,
            status: body.status,
            initial_quantity: body.quantity,
        }
    }
}

/// Metadata patch. A `quantity` key is accepted and dropped.
#[derive(Debug, Default, Deserialize, Validate)]
pub struct UpdateItemRequest {
    #[validate(length(min = 1, max = 200))]
    pub name: Option<String>,
    pub lab_id: Option<LabId>,
    pub category_id: Option<CategoryId>,
    #[validate(length(min = 1, max = 32))]
    pub unit: Option<String>,
    #[validate(range(min = 0))]
    pub min_stock: Option<i64>,
    /// `null` clears the date; absent leaves it alone.
    #[serde(default, deserialize_with = "present")]
    pub expiry_date: Option<Option<DateTime<Utc>>>,
    pub status: Option<ItemStatus>,
    #[serde(default)]
    pub quantity: Option<JsonValue>,
}

impl UpdateItemRequest {
    pub fn into_patch(self) -> MetadataPatch {
        if let Some(quantity) = &self.quantity {
            debug!(%quantity, "ignoring quantity in metadata patch");
        }

        let (expiry_date, clear_expiry_date) = match self.expiry_date {
            Some(Some(date)) => (Some(date), false),
            Some(None) => (None, true),
            None => (None, false),
        };

        MetadataPatch {
            name: self.name,
            lab_id: self.lab_id,
            category_id: self.category_id,
            unit: self.unit,
            min_stock: self.min_stock,
            expiry_date,
            clear_expiry_date,
            status: self.status,
        }
    }
}

/// Distinguishes an explicit `null` from an absent field.
fn present<'de, D, T>(deserializer: D) -> Result<Option<T>, D::Error>
where
    D: serde::Deserializer<'de>,
    T: Deserialize<'de>,
{
    T::deserialize(deserializer).map(Some)
}

#[derive(Debug, Default, Deserialize)]
pub struct ItemListParams {
    pub lab_id: Option<String>,
    pub category_id: Option<String>,
    pub search: Option<String>,
    pub page: Option<usize>,
    pub limit: Option<usize>,
}

impl ItemListParams {
    pub fn query(&self) -> Result<ItemQuery, String> {
        Ok(ItemQuery {
            lab_id: parse_id(self.lab_id.as_deref(), "lab_id")?,
            category_id: parse_id(self.category_id.as_deref(), "category_id")?,
            search: self.search.clone().filter(|s| !s.trim().is_empty()),
        })
    }
}

// -------------------------
// Usage requests
// -------------------------

#[derive(Debug, Deserialize, Validate)]
pub struct UsageEntry {
    pub item_id: ItemId,
    #[validate(range(min = 1))]
    pub quantity: i64,
    #[serde(rename = "type")]
    pub kind: UsageKind,
    #[validate(length(max = 500))]
    pub reason: Option<String>,
}

impl From<UsageEntry> for NewUsageRequest {
    fn from(entry: UsageEntry) -> Self {
        NewUsageRequest {
            item_id: entry.item_id,
            quantity: entry.quantity,
            kind: entry.kind,
            reason: entry.reason,
        }
    }
}

/// `POST /usage` accepts one entry or an array of entries.
#[derive(Debug, Deserialize)]
#[serde(untagged)]
pub enum UsageSubmission {
    Batch(Vec<UsageEntry>),
    Single(UsageEntry),
}

impl UsageSubmission {
    /// Validate every entry; errors name the offending index in a batch.
    pub fn validate_entries(&self) -> Result<(), String> {
        match self {
            UsageSubmission::Single(entry) => entry.validate().map_err(|e| e.to_string()),
            UsageSubmission::Batch(entries) => entries
                .iter()
                .enumerate()
                .try_for_each(|(idx, entry)| entry.validate().map_err(|e| format!("entry {idx}: {e}"))),
        }
    }
}

#[derive(Debug, Deserialize, Validate)]
pub struct DecideUsageRequest {
    pub status: Decision,
    /// Replaces the requested quantity before the delta is computed.
    #[validate(range(min = 1))]
    pub quantity: Option<i64>,
}

#[derive(Debug, Default, Deserialize)]
pub struct UsageListParams {
    pub item_id: Option<String>,
    /// `pending` when absent; `all` disables the filter.
    pub status: Option<String>,
    pub page: Option<usize>,
    pub limit: Option<usize>,
}

impl UsageListParams {
    pub fn item_filter(&self) -> Result<Option<ItemId>, String> {
        Ok(parse_id::<AggregateId>(self.item_id.as_deref(), "item_id")?.map(ItemId::new))
    }

    pub fn status_filter(&self) -> Result<Option<UsageStatus>, String> {
        match self.status.as_deref().map(str::trim) {
            None | Some("") => Ok(Some(UsageStatus::Pending)),
            Some(s) if s.eq_ignore_ascii_case("all") => Ok(None),
            Some(s) => parse_enum(s).map(Some),
        }
    }
}

// -------------------------
// Batch orders
// -------------------------

#[derive(Debug, Serialize, Deserialize, Validate)]
pub struct OrderLineRequest {
    pub item_id: ItemId,
    #[validate(range(min = 0))]
    pub requested_qty: i64,
}

#[derive(Debug, Deserialize, Validate)]
pub struct CreateOrderRequest {
    #[serde(rename = "type")]
    pub order_type: BatchOrderType,
    #[validate(length(max = 500))]
    pub reason: Option<String>,
    #[validate(length(min = 1), nested)]
    pub lines: Vec<OrderLineRequest>,
}

impl From<CreateOrderRequest> for NewBatchOrder {
    fn from(body: CreateOrderRequest) -> Self {
        NewBatchOrder {
            order_type: body.order_type,
            reason: body.reason,
            lines: body
                .lines
                .into_iter()
                .map(|l| NewOrderLineInput {
                    item_id: l.item_id,
                    requested_qty: l.requested_qty,
                })
                .collect(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FinalizeStatus {
    Completed,
    Cancelled,
}

/// Received quantities are checked against the order by the workflow.
#[derive(Debug, Deserialize)]
pub struct ReceivedLineRequest {
    pub item_id: ItemId,
    pub received_qty: i64,
}

#[derive(Debug, Deserialize)]
pub struct FinalizeOrderRequest {
    pub status: FinalizeStatus,
    pub lines: Option<Vec<ReceivedLineRequest>>,
}

#[derive(Debug, Default, Deserialize)]
pub struct OrderListParams {
    #[serde(rename = "type")]
    pub order_type: Option<String>,
    pub status: Option<String>,
    pub page: Option<usize>,
    pub limit: Option<usize>,
}

impl OrderListParams {
    pub fn type_filter(&self) -> Result<Option<BatchOrderType>, String> {
        optional_filter(self.order_type.as_deref())
    }

    pub fn status_filter(&self) -> Result<Option<BatchOrderStatus>, String> {
        optional_filter(self.status.as_deref())
    }
}

// -------------------------
// Reorder
// -------------------------

#[derive(Debug, Default, Deserialize, Validate)]
pub struct ReplenishmentRequest {
    pub item_ids: Option<Vec<ItemId>>,
    #[validate(length(max = 500))]
    pub reason: Option<String>,
}

// -------------------------
// Helpers
// -------------------------

fn parse_id<T: FromStr>(value: Option<&str>, name: &str) -> Result<Option<T>, String> {
    match value.map(str::trim) {
        None | Some("") => Ok(None),
        Some(s) => s.parse().map(Some).map_err(|_| format!("{name} is not a valid id")),
    }
}

fn optional_filter<T: for<'de> Deserialize<'de>>(value: Option<&str>) -> Result<Option<T>, String> {
    match value.map(str::trim) {
        None | Some("") => Ok(None),
        Some(s) if s.eq_ignore_ascii_case("all") => Ok(None),
        Some(s) => parse_enum(s).map(Some),
    }
}

/// Parse a lowercase serde enum from a query-string value.
fn parse_enum<T: for<'de> Deserialize<'de>>(value: &str) -> Result<T, String> {
    serde_json::from_value(JsonValue::String(value.to_ascii_lowercase()))
        .map_err(|_| format!("unknown value '{value}'"))
}

pub fn received_lines(lines: Option<Vec<ReceivedLineRequest>>) -> Option<Vec<ReceivedLine>> {
    lines.map(|lines| {
        lines
            .into_iter()
            .map(|l| ReceivedLine {
                item_id: l.item_id,
                received_qty: l.received_qty,
            })
            .collect()
    })
}
