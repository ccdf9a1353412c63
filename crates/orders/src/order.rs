use std::collections::{HashMap, HashSet};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use labstock_core::{Aggregate, AggregateId, AggregateRoot, DomainError, UserId};
use labstock_events::Event;
use labstock_inventory::ItemId;

/// Batch order identifier.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct BatchOrderId(pub AggregateId);

impl BatchOrderId {
    pub fn new(id: AggregateId) -> Self {
        Self(id)
    }
}

impl core::fmt::Display for BatchOrderId {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        core::fmt::Display::fmt(&self.0, f)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum BatchOrderType {
    Purchase,
    Audit,
    Utilisation,
}

impl BatchOrderType {
    /// Purchases start `requested`; audits and utilisation start `pending`.
    pub fn initial_status(self) -> BatchOrderStatus {
        match self {
            BatchOrderType::Purchase => BatchOrderStatus::Requested,
            BatchOrderType::Audit | BatchOrderType::Utilisation => BatchOrderStatus::Pending,
        }
    }

    /// Ledger delta for one completed line.
    ///
    /// Purchases add what was received. Audits and utilisation set the item
    /// to the counted value, measured against the live quantity. A count
    /// too far from the live quantity to express as a delta is rejected.
    pub fn delta(self, received: i64, live_quantity: i64) -> Result<i64, DomainError> {
        match self {
            BatchOrderType::Purchase => Ok(received),
            BatchOrderType::Audit | BatchOrderType::Utilisation => received
                .checked_sub(live_quantity)
                .ok_or_else(|| {
                    DomainError::validation(format!(
                        "received quantity {received} is out of range against live stock {live_quantity}"
                    ))
                }),
        }
    }

    /// Audit-trail tag for lines of order `order_id`.
    pub fn tag(self, order_id: BatchOrderId) -> String {
        match self {
            BatchOrderType::Purchase => format!("BATCH_PO_{order_id}"),
            BatchOrderType::Audit | BatchOrderType::Utilisation => {
                format!("BATCH_AUDIT_{order_id}")
            }
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum BatchOrderStatus {
    Requested,
    Pending,
    Completed,
    Cancelled,
}

impl BatchOrderStatus {
    pub fn is_terminal(self) -> bool {
        matches!(self, BatchOrderStatus::Completed | BatchOrderStatus::Cancelled)
    }

    pub fn as_str(self) -> &'static str {
        match self {
            BatchOrderStatus::Requested => "requested",
            BatchOrderStatus::Pending => "pending",
            BatchOrderStatus::Completed => "completed",
            BatchOrderStatus::Cancelled => "cancelled",
        }
    }
}

/// Order line item.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OrderLine {
    pub item_id: ItemId,
    /// Ordered amount for purchases, counted amount for audits.
    pub requested_qty: i64,
    /// Set at completion.
    pub received_qty: Option<i64>,
    /// Live quantity when the order was created. Display only.
    pub current_stock: i64,
    /// Delta the ledger received at completion.
    pub applied_delta: Option<i64>,
}

/// Line as supplied when creating an order.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NewOrderLine {
    pub item_id: ItemId,
    pub requested_qty: i64,
    pub current_stock: i64,
}

/// Received amount supplied by the finalizing admin.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReceivedLine {
    pub item_id: ItemId,
    pub received_qty: i64,
}

/// Outcome for one line at completion.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct LineReceipt {
    pub item_id: ItemId,
    pub received_qty: i64,
    pub applied_delta: i64,
}

/// Aggregate root: BatchOrder.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BatchOrder {
    id: BatchOrderId,
    order_type: BatchOrderType,
    status: BatchOrderStatus,
    requested_by: Option<UserId>,
    reason: String,
    lines: Vec<OrderLine>,
    created_at: Option<DateTime<Utc>>,
    completed_at: Option<DateTime<Utc>>,
    completed_by: Option<UserId>,
    cancelled_at: Option<DateTime<Utc>>,
    cancelled_by: Option<UserId>,
    version: u64,
    created: bool,
}

impl BatchOrder {
    /// Create an empty, not-yet-created aggregate instance for rehydration.
    pub fn empty(id: BatchOrderId) -> Self {
        Self {
            id,
            order_type: BatchOrderType::Purchase,
            status: BatchOrderStatus::Requested,
            requested_by: None,
            reason: String::new(),
            lines: Vec::new(),
            created_at: None,
            completed_at: None,
            completed_by: None,
            cancelled_at: None,
            cancelled_by: None,
            version: 0,
            created: false,
        }
    }

    pub fn id_typed(&self) -> BatchOrderId {
        self.id
    }

    pub fn exists(&self) -> bool {
        self.created
    }

    pub fn order_type(&self) -> BatchOrderType {
        self.order_type
    }

    pub fn status(&self) -> BatchOrderStatus {
        self.status
    }

    pub fn requested_by(&self) -> Option<UserId> {
        self.requested_by
    }

    pub fn reason(&self) -> &str {
        &self.reason
    }

    pub fn lines(&self) -> &[OrderLine] {
        &self.lines
    }

    pub fn created_at(&self) -> Option<DateTime<Utc>> {
        self.created_at
    }

    pub fn completed_at(&self) -> Option<DateTime<Utc>> {
        self.completed_at
    }

    pub fn completed_by(&self) -> Option<UserId> {
        self.completed_by
    }

    pub fn cancelled_at(&self) -> Option<DateTime<Utc>> {
        self.cancelled_at
    }

    pub fn cancelled_by(&self) -> Option<UserId> {
        self.cancelled_by
    }

    pub fn tag(&self) -> String {
        self.order_type.tag(self.id)
    }

    /// Fails with `NotFound` before creation and `InvalidState` once terminal.
    pub fn ensure_open(&self) -> Result<(), DomainError> {
        if !self.created {
            return Err(DomainError::not_found());
        }
        if self.status.is_terminal() {
            return Err(DomainError::invalid_state(format!(
                "batch order already {}",
                self.status.as_str()
            )));
        }
        Ok(())
    }

    /// Resolve the received amount for every line, in line order.
    ///
    /// Supplied entries must name lines of this order, at most once each.
    /// Lines the admin did not mention are received at `requested_qty`.
    pub fn resolve_receipts(
        &self,
        supplied: Option<&[ReceivedLine]>,
    ) -> Result<Vec<ReceivedLine>, DomainError> {
        self.ensure_open()?;

        let mut overrides: HashMap<ItemId, i64> = HashMap::new();
        for line in supplied.unwrap_or_default() {
            if !self.lines.iter().any(|l| l.item_id == line.item_id) {
                return Err(DomainError::validation(format!(
                    "item {} is not part of this order",
                    line.item_id
                )));
            }
            if line.received_qty < 0 {
                return Err(DomainError::validation("received_qty cannot be negative"));
            }
            if overrides.insert(line.item_id, line.received_qty).is_some() {
                return Err(DomainError::validation(format!(
                    "item {} listed more than once",
                    line.item_id
                )));
            }
        }

        Ok(self
            .lines
            .iter()
            .map(|l| ReceivedLine {
                item_id: l.item_id,
                received_qty: overrides.get(&l.item_id).copied().unwrap_or(l.requested_qty),
            })
            .collect())
    }
}

impl AggregateRoot for BatchOrder {
    type Id = BatchOrderId;

    fn id(&self) -> &Self::Id {
        &self.id
    }

    fn version(&self) -> u64 {
        self.version
    }
}

/// Command: CreateBatchOrder.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CreateBatchOrder {
    pub order_id: BatchOrderId,
    pub order_type: BatchOrderType,
    pub requested_by: UserId,
    pub reason: String,
    pub lines: Vec<NewOrderLine>,
    pub occurred_at: DateTime<Utc>,
}

impl CreateBatchOrder {
    /// Stateless checks, usable before snapshotting live quantities.
    pub fn validate(&self) -> Result<(), DomainError> {
        if self.lines.is_empty() {
            return Err(DomainError::validation("order must have at least one line"));
        }
        let mut seen = HashSet::new();
        for line in &self.lines {
            if line.requested_qty < 0 {
                return Err(DomainError::validation("requested_qty cannot be negative"));
            }
            if !seen.insert(line.item_id) {
                return Err(DomainError::validation(format!(
                    "item {} listed more than once",
                    line.item_id
                )));
            }
        }
        Ok(())
    }
}

/// Command: CompleteBatchOrder. Receipts carry the deltas already applied to the ledger.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CompleteBatchOrder {
    pub order_id: BatchOrderId,
    pub completed_by: UserId,
    pub receipts: Vec<LineReceipt>,
    pub occurred_at: DateTime<Utc>,
}

/// Command: CancelBatchOrder.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CancelBatchOrder {
    pub order_id: BatchOrderId,
    pub cancelled_by: UserId,
    pub occurred_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum BatchOrderCommand {
    CreateBatchOrder(CreateBatchOrder),
    CompleteBatchOrder(CompleteBatchOrder),
    CancelBatchOrder(CancelBatchOrder),
}

/// Event: BatchOrderCreated.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BatchOrderCreated {
    pub order_id: BatchOrderId,
    pub order_type: BatchOrderType,
    pub status: BatchOrderStatus,
    pub requested_by: UserId,
    pub reason: String,
    pub lines: Vec<OrderLine>,
    pub occurred_at: DateTime<Utc>,
}

/// Event: BatchOrderCompleted.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BatchOrderCompleted {
    pub order_id: BatchOrderId,
    pub completed_by: UserId,
    pub receipts: Vec<LineReceipt>,
    pub occurred_at: DateTime<Utc>,
}

/// Event: BatchOrderCancelled.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BatchOrderCancelled {
    pub order_id: BatchOrderId,
    pub cancelled_by: UserId,
    pub occurred_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum BatchOrderEvent {
    BatchOrderCreated(BatchOrderCreated),
    BatchOrderCompleted(BatchOrderCompleted),
    BatchOrderCancelled(BatchOrderCancelled),
}

impl Event for BatchOrderEvent {
    fn event_type(&self) -> &'static str {
        match self {
            BatchOrderEvent::BatchOrderCreated(_) => "stock.order.created",
            BatchOrderEvent::BatchOrderCompleted(_) => "stock.order.completed",
            BatchOrderEvent::BatchOrderCancelled(_) => "stock.order.cancelled",
        }
    }

    fn version(&self) -> u32 {
        1
    }

    fn occurred_at(&self) -> DateTime<Utc> {
        match self {
            BatchOrderEvent::BatchOrderCreated(e) => e.occurred_at,
            BatchOrderEvent::BatchOrderCompleted(e) => e.occurred_at,
            BatchOrderEvent::BatchOrderCancelled(e) => e.occurred_at,
        }
    }
}

impl Aggregate for BatchOrder {
    type Command = BatchOrderCommand;
    type Event = BatchOrderEvent;
    type Error = DomainError;

    fn apply(&mut self, event: &Self::Event) {
        match event {
            BatchOrderEvent::BatchOrderCreated(e) => {
                self.id = e.order_id;
                self.order_type = e.order_type;
                self.status = e.status;
                self.requested_by = Some(e.requested_by);
                self.reason = e.reason.clone();
                self.lines = e.lines.clone();
                self.created_at = Some(e.occurred_at);
                self.created = true;
            }
            BatchOrderEvent::BatchOrderCompleted(e) => {
                for receipt in &e.receipts {
                    if let Some(line) = self.lines.iter_mut().find(|l| l.item_id == receipt.item_id) {
                        line.received_qty = Some(receipt.received_qty);
                        line.applied_delta = Some(receipt.applied_delta);
                    }
                }
                self.status = BatchOrderStatus::Completed;
                self.completed_at = Some(e.occurred_at);
                self.completed_by = Some(e.completed_by);
            }
            BatchOrderEvent::BatchOrderCancelled(e) => {
                self.status = BatchOrderStatus::Cancelled;
                self.cancelled_at = Some(e.occurred_at);
                self.cancelled_by = Some(e.cancelled_by);
            }
        }

        self.version += 1;
    }

    fn handle(&self, command: &Self::Command) -> Result<Vec<Self::Event>, Self::Error> {
        match command {
            BatchOrderCommand::CreateBatchOrder(cmd) => self.handle_create(cmd),
            BatchOrderCommand::CompleteBatchOrder(cmd) => self.handle_complete(cmd),
            BatchOrderCommand::CancelBatchOrder(cmd) => self.handle_cancel(cmd),
        }
    }
}

impl BatchOrder {
    fn ensure_order_id(&self, order_id: BatchOrderId) -> Result<(), DomainError> {
        if self.id != order_id {
            return Err(DomainError::invariant("order_id mismatch"));
        }
        Ok(())
    }

    fn handle_create(&self, cmd: &CreateBatchOrder) -> Result<Vec<BatchOrderEvent>, DomainError> {
        if self.created {
            return Err(DomainError::conflict("batch order already exists"));
        }
        self.ensure_order_id(cmd.order_id)?;
        cmd.validate()?;

        let lines = cmd
            .lines
            .iter()
            .map(|l| OrderLine {
                item_id: l.item_id,
                requested_qty: l.requested_qty,
                received_qty: None,
                current_stock: l.current_stock,
                applied_delta: None,
            })
            .collect();

        Ok(vec![BatchOrderEvent::BatchOrderCreated(BatchOrderCreated {
            order_id: cmd.order_id,
            order_type: cmd.order_type,
            status: cmd.order_type.initial_status(),
            requested_by: cmd.requested_by,
            reason: cmd.reason.clone(),
            lines,
            occurred_at: cmd.occurred_at,
        })])
    }

    fn handle_complete(
        &self,
        cmd: &CompleteBatchOrder,
    ) -> Result<Vec<BatchOrderEvent>, DomainError> {
        self.ensure_order_id(cmd.order_id)?;
        self.ensure_open()?;

        // Invariant: one receipt per line, nothing extra.
        if cmd.receipts.len() != self.lines.len() {
            return Err(DomainError::invariant("completion must cover every order line"));
        }
        for line in &self.lines {
            let receipt = cmd
                .receipts
                .iter()
                .find(|r| r.item_id == line.item_id)
                .ok_or_else(|| DomainError::invariant("completion must cover every order line"))?;
            if self.order_type == BatchOrderType::Purchase
                && receipt.applied_delta != receipt.received_qty
            {
                return Err(DomainError::invariant(
                    "purchase lines must add exactly the received quantity",
                ));
            }
        }

        Ok(vec![BatchOrderEvent::BatchOrderCompleted(BatchOrderCompleted {
            order_id: cmd.order_id,
            completed_by: cmd.completed_by,
            receipts: cmd.receipts.clone(),
            occurred_at: cmd.occurred_at,
        })])
    }

    fn handle_cancel(&self, cmd: &CancelBatchOrder) -> Result<Vec<BatchOrderEvent>, DomainError> {
        self.ensure_order_id(cmd.order_id)?;
        self.ensure_open()?;

        Ok(vec![BatchOrderEvent::BatchOrderCancelled(BatchOrderCancelled {
            order_id: cmd.order_id,
            cancelled_by: cmd.cancelled_by,
            occurred_at: cmd.occurred_at,
        })])
    }
}

#[cfg(test)]
mod tests {
    use proptest::prelude::*;

    use super::*;

    fn test_order_id() -> BatchOrderId {
        BatchOrderId::new(AggregateId::new())
    }

    fn test_item_id() -> ItemId {
        ItemId::new(AggregateId::new())
    }

    fn test_time() -> DateTime<Utc> {
        Utc::now()
    }

    fn created(
        order_id: BatchOrderId,
        order_type: BatchOrderType,
        lines: Vec<NewOrderLine>,
    ) -> BatchOrder {
        let mut order = BatchOrder::empty(order_id);
        let events = order
            .handle(&BatchOrderCommand::CreateBatchOrder(CreateBatchOrder {
                order_id,
                order_type,
                requested_by: UserId::new(),
                reason: String::new(),
                lines,
                occurred_at: test_time(),
            }))
            .unwrap();
        order.apply(&events[0]);
        order
    }

    fn line(item_id: ItemId, requested_qty: i64, current_stock: i64) -> NewOrderLine {
        NewOrderLine {
            item_id,
            requested_qty,
            current_stock,
        }
    }

    #[test]
    fn initial_status_depends_on_type() {
        let purchase = created(test_order_id(), BatchOrderType::Purchase, vec![line(test_item_id(), 5, 7)]);
        assert_eq!(purchase.status(), BatchOrderStatus::Requested);

        let audit = created(test_order_id(), BatchOrderType::Audit, vec![line(test_item_id(), 9, 7)]);
        assert_eq!(audit.status(), BatchOrderStatus::Pending);

        let utilisation =
            created(test_order_id(), BatchOrderType::Utilisation, vec![line(test_item_id(), 2, 7)]);
        assert_eq!(utilisation.status(), BatchOrderStatus::Pending);
    }

    #[test]
    fn create_snapshots_current_stock() {
        let item_id = test_item_id();
        let order = created(test_order_id(), BatchOrderType::Audit, vec![line(item_id, 9, 7)]);
        assert_eq!(order.lines()[0].current_stock, 7);
        assert_eq!(order.lines()[0].received_qty, None);
    }

    #[test]
    fn create_rejects_empty_duplicate_and_negative_lines() {
        let order_id = test_order_id();
        let order = BatchOrder::empty(order_id);
        let item_id = test_item_id();

        for lines in [
            vec![],
            vec![line(item_id, 1, 0), line(item_id, 2, 0)],
            vec![line(item_id, -1, 0)],
        ] {
            let err = order
                .handle(&BatchOrderCommand::CreateBatchOrder(CreateBatchOrder {
                    order_id,
                    order_type: BatchOrderType::Purchase,
                    requested_by: UserId::new(),
                    reason: String::new(),
                    lines,
                    occurred_at: test_time(),
                }))
                .unwrap_err();
            assert!(matches!(err, DomainError::Validation(_)));
        }
    }

    #[test]
    fn delta_rule_per_type() {
        assert_eq!(BatchOrderType::Purchase.delta(5, 7).unwrap(), 5);
        assert_eq!(BatchOrderType::Audit.delta(9, 7).unwrap(), 2);
        assert_eq!(BatchOrderType::Utilisation.delta(4, 7).unwrap(), -3);
    }

    #[test]
    fn audit_delta_out_of_range_is_a_validation_error() {
        let err = BatchOrderType::Audit.delta(i64::MAX, -5).unwrap_err();
        assert!(matches!(err, DomainError::Validation(_)));

        let err = BatchOrderType::Utilisation.delta(i64::MIN, 1).unwrap_err();
        assert!(matches!(err, DomainError::Validation(_)));

        assert_eq!(BatchOrderType::Purchase.delta(i64::MAX, -5).unwrap(), i64::MAX);
    }

    #[test]
    fn tag_prefix_per_type() {
        let order_id = test_order_id();
        assert_eq!(BatchOrderType::Purchase.tag(order_id), format!("BATCH_PO_{order_id}"));
        assert_eq!(BatchOrderType::Audit.tag(order_id), format!("BATCH_AUDIT_{order_id}"));
        assert_eq!(BatchOrderType::Utilisation.tag(order_id), format!("BATCH_AUDIT_{order_id}"));
    }

    #[test]
    fn resolve_receipts_defaults_to_requested_quantity() {
        let (a, b) = (test_item_id(), test_item_id());
        let order = created(
            test_order_id(),
            BatchOrderType::Purchase,
            vec![line(a, 5, 0), line(b, 3, 0)],
        );

        let resolved = order
            .resolve_receipts(Some(&[ReceivedLine {
                item_id: b,
                received_qty: 2,
            }]))
            .unwrap();
        assert_eq!(resolved[0], ReceivedLine { item_id: a, received_qty: 5 });
        assert_eq!(resolved[1], ReceivedLine { item_id: b, received_qty: 2 });

        let all_default = order.resolve_receipts(None).unwrap();
        assert_eq!(all_default[1].received_qty, 3);
    }

    #[test]
    fn resolve_receipts_rejects_foreign_items() {
        let order = created(test_order_id(), BatchOrderType::Purchase, vec![line(test_item_id(), 5, 0)]);
        let err = order
            .resolve_receipts(Some(&[ReceivedLine {
                item_id: test_item_id(),
                received_qty: 1,
            }]))
            .unwrap_err();
        match err {
            DomainError::Validation(msg) if msg.contains("not part of this order") => {}
            _ => panic!("Expected Validation for unmatched line"),
        }
    }

    #[test]
    fn complete_records_receipts() {
        let order_id = test_order_id();
        let item_id = test_item_id();
        let mut order = created(order_id, BatchOrderType::Audit, vec![line(item_id, 9, 7)]);
        let admin = UserId::new();

        let events = order
            .handle(&BatchOrderCommand::CompleteBatchOrder(CompleteBatchOrder {
                order_id,
                completed_by: admin,
                receipts: vec![LineReceipt {
                    item_id,
                    received_qty: 9,
                    applied_delta: 2,
                }],
                occurred_at: test_time(),
            }))
            .unwrap();
        order.apply(&events[0]);

        assert_eq!(order.status(), BatchOrderStatus::Completed);
        assert_eq!(order.completed_by(), Some(admin));
        assert_eq!(order.lines()[0].received_qty, Some(9));
        assert_eq!(order.lines()[0].applied_delta, Some(2));
    }

    #[test]
    fn complete_requires_every_line() {
        let order_id = test_order_id();
        let order = created(
            order_id,
            BatchOrderType::Purchase,
            vec![line(test_item_id(), 5, 0), line(test_item_id(), 1, 0)],
        );
        let first = order.lines()[0].item_id;

        let err = order
            .handle(&BatchOrderCommand::CompleteBatchOrder(CompleteBatchOrder {
                order_id,
                completed_by: UserId::new(),
                receipts: vec![LineReceipt {
                    item_id: first,
                    received_qty: 5,
                    applied_delta: 5,
                }],
                occurred_at: test_time(),
            }))
            .unwrap_err();
        assert!(matches!(err, DomainError::InvariantViolation(_)));
    }

    #[test]
    fn terminal_orders_cannot_be_finalized_again() {
        let order_id = test_order_id();
        let mut order = created(order_id, BatchOrderType::Purchase, vec![line(test_item_id(), 5, 0)]);

        let events = order
            .handle(&BatchOrderCommand::CancelBatchOrder(CancelBatchOrder {
                order_id,
                cancelled_by: UserId::new(),
                occurred_at: test_time(),
            }))
            .unwrap();
        order.apply(&events[0]);
        assert_eq!(order.status(), BatchOrderStatus::Cancelled);

        let err = order.resolve_receipts(None).unwrap_err();
        match err {
            DomainError::InvalidState(msg) if msg.contains("already cancelled") => {}
            _ => panic!("Expected InvalidState for terminal order"),
        }

        let err = order
            .handle(&BatchOrderCommand::CancelBatchOrder(CancelBatchOrder {
                order_id,
                cancelled_by: UserId::new(),
                occurred_at: test_time(),
            }))
            .unwrap_err();
        assert!(matches!(err, DomainError::InvalidState(_)));
    }

    proptest! {
        #![proptest_config(ProptestConfig { cases: 256, .. ProptestConfig::default() })]

        #[test]
        fn audit_delta_lands_on_counted_value(
            counted in 0i64..1_000_000,
            live in -1_000_000i64..1_000_000,
        ) {
            let delta = BatchOrderType::Audit.delta(counted, live).unwrap();
            prop_assert_eq!(live + delta, counted);
        }

        #[test]
        fn purchase_delta_ignores_live_quantity(
            received in 0i64..1_000_000,
            live in -1_000_000i64..1_000_000,
        ) {
            prop_assert_eq!(BatchOrderType::Purchase.delta(received, live).unwrap(), received);
        }
    }
}
