//! Replenishment rule.

/// An item is low on stock when it is at or below its threshold.
pub fn is_low_stock(quantity: i64, min_stock: i64) -> bool {
    quantity <= min_stock
}

/// Suggested reorder quantity: refill to twice the threshold.
///
/// `max(0, 2 × min_stock − quantity)`, saturating on overflow.
pub fn suggest_replenishment(quantity: i64, min_stock: i64) -> i64 {
    min_stock
        .saturating_mul(2)
        .saturating_sub(quantity)
        .max(0)
}
