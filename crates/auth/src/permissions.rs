use std::borrow::Cow;

use serde::{Deserialize, Serialize};

/// Permission identifier (e.g. "stock.usage.decide").
///
/// The wildcard `"*"` lets the admin role allow everything without
/// enumerating permissions in tokens.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Permission(Cow<'static, str>);

impl Permission {
    pub const WILDCARD: Permission = Permission(Cow::Borrowed("*"));

    pub const ITEMS_READ: Permission = Permission(Cow::Borrowed("stock.items.read"));
    pub const ITEMS_WRITE: Permission = Permission(Cow::Borrowed("stock.items.write"));

    pub const USAGE_SUBMIT: Permission = Permission(Cow::Borrowed("stock.usage.submit"));
    pub const USAGE_READ: Permission = Permission(Cow::Borrowed("stock.usage.read"));
    pub const USAGE_DECIDE: Permission = Permission(Cow::Borrowed("stock.usage.decide"));

    pub const ORDERS_CREATE: Permission = Permission(Cow::Borrowed("stock.orders.create"));
    pub const ORDERS_READ: Permission = Permission(Cow::Borrowed("stock.orders.read"));
    pub const ORDERS_FINALIZE: Permission = Permission(Cow::Borrowed("stock.orders.finalize"));

    pub const REORDER_READ: Permission = Permission(Cow::Borrowed("stock.reorder.read"));

    /// Lists every request and order, not just the caller's own.
    pub const VIEW_ALL: Permission = Permission(Cow::Borrowed("stock.view_all"));

    pub fn new(name: impl Into<Cow<'static, str>>) -> Self {
        Self(name.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    pub fn is_wildcard(&self) -> bool {
        self.as_str() == "*"
    }
}

impl core::fmt::Display for Permission {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.write_str(&self.0)
    }
}
