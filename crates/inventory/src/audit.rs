//! Audit trail records.
//!
//! An `AuditEntry` is a read-only view of a `StockReconciled` event, so the
//! ledger and its audit trail can never diverge.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use labstock_core::UserId;

use crate::item::{ItemId, ReconciliationSource, StockReconciled};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Direction {
    Add,
    Subtract,
}

impl Direction {
    /// Zero counts as an addition.
    pub fn of(delta: i64) -> Self {
        if delta >= 0 { Direction::Add } else { Direction::Subtract }
    }
}

/// Audit entries are only ever written for applied changes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AuditStatus {
    Approved,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AuditEntry {
    pub item_id: ItemId,
    /// Requesting user, or the approver when the change was admin-initiated.
    pub user_id: UserId,
    pub approved_by: UserId,
    /// Magnitude of the change.
    pub quantity: u64,
    pub direction: Direction,
    pub tag: String,
    pub status: AuditStatus,
    pub quantity_before: i64,
    pub quantity_after: i64,
    pub source: ReconciliationSource,
    pub recorded_at: DateTime<Utc>,
}

impl AuditEntry {
    pub fn delta(&self) -> i64 {
        self.quantity_after - self.quantity_before
    }
}

impl From<&StockReconciled> for AuditEntry {
    fn from(e: &StockReconciled) -> Self {
        Self {
            item_id: e.item_id,
            user_id: e.on_behalf_of.unwrap_or(e.actor),
            approved_by: e.actor,
            quantity: e.delta.unsigned_abs(),
            direction: Direction::of(e.delta),
            tag: e.tag.clone(),
            status: AuditStatus::Approved,
            quantity_before: e.quantity_before,
            quantity_after: e.quantity_after,
            source: e.source.clone(),
            recorded_at: e.occurred_at,
        }
    }
}

#[cfg(test)]
mod tests {
    use labstock_core::AggregateId;
    use proptest::prelude::*;

    use super::*;

    fn reconciled(delta: i64, before: i64) -> StockReconciled {
        StockReconciled {
            item_id: ItemId::new(AggregateId::new()),
            delta,
            quantity_before: before,
            quantity_after: before + delta,
            source: ReconciliationSource::BatchOrderLine {
                order_id: AggregateId::new(),
            },
            tag: "BATCH_AUDIT_x".to_string(),
            actor: UserId::new(),
            on_behalf_of: None,
            occurred_at: Utc::now(),
        }
    }

    #[test]
    fn admin_initiated_change_is_attributed_to_the_approver() {
        let e = reconciled(2, 7);
        let entry = AuditEntry::from(&e);
        assert_eq!(entry.user_id, e.actor);
        assert_eq!(entry.approved_by, e.actor);
        assert_eq!(entry.quantity, 2);
        assert_eq!(entry.direction, Direction::Add);
    }

    #[test]
    fn requested_change_keeps_the_requester() {
        let requester = UserId::new();
        let mut e = reconciled(-3, 10);
        e.on_behalf_of = Some(requester);

        let entry = AuditEntry::from(&e);
        assert_eq!(entry.user_id, requester);
        assert_eq!(entry.direction, Direction::Subtract);
        assert_eq!(entry.quantity, 3);
    }

    proptest! {
        #![proptest_config(ProptestConfig { cases: 256, .. ProptestConfig::default() })]

        #[test]
        fn magnitude_and_direction_reconstruct_the_delta(
            delta in -1_000_000i64..1_000_000,
            before in -1_000_000i64..1_000_000,
        ) {
            let entry = AuditEntry::from(&reconciled(delta, before));
            let signed = match entry.direction {
                Direction::Add => entry.quantity as i64,
                Direction::Subtract => -(entry.quantity as i64),
            };
            prop_assert_eq!(signed, delta);
            prop_assert_eq!(entry.delta(), delta);
        }
    }
}
