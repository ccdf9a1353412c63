use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use labstock_core::{Aggregate, AggregateId, AggregateRoot, DomainError, UserId};
use labstock_events::Event;
use labstock_inventory::ItemId;

/// Usage request identifier.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct UsageRequestId(pub AggregateId);

impl UsageRequestId {
    pub fn new(id: AggregateId) -> Self {
        Self(id)
    }
}

impl core::fmt::Display for UsageRequestId {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        core::fmt::Display::fmt(&self.0, f)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum UsageKind {
    Add,
    Subtract,
}

impl UsageKind {
    /// Signed ledger delta for a positive quantity.
    pub fn signed(self, quantity: i64) -> i64 {
        match self {
            UsageKind::Add => quantity,
            UsageKind::Subtract => -quantity,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum UsageStatus {
    Pending,
    Approved,
    Rejected,
}

impl UsageStatus {
    pub fn is_terminal(self) -> bool {
        !matches!(self, UsageStatus::Pending)
    }
}

/// Aggregate root: UsageRequest.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UsageRequest {
    id: UsageRequestId,
    item_id: Option<ItemId>,
    requested_by: Option<UserId>,
    quantity: i64,
    kind: UsageKind,
    reason: String,
    status: UsageStatus,
    decided_by: Option<UserId>,
    applied_delta: Option<i64>,
    created_at: Option<DateTime<Utc>>,
    decided_at: Option<DateTime<Utc>>,
    version: u64,
    created: bool,
}

impl UsageRequest {
    /// Create an empty, not-yet-submitted aggregate instance for rehydration.
    pub fn empty(id: UsageRequestId) -> Self {
        Self {
            id,
            item_id: None,
            requested_by: None,
            quantity: 0,
            kind: UsageKind::Subtract,
            reason: String::new(),
            status: UsageStatus::Pending,
            decided_by: None,
            applied_delta: None,
            created_at: None,
            decided_at: None,
            version: 0,
            created: false,
        }
    }

    pub fn id_typed(&self) -> UsageRequestId {
        self.id
    }

    pub fn exists(&self) -> bool {
        self.created
    }

    pub fn item_id(&self) -> Option<ItemId> {
        self.item_id
    }

    pub fn requested_by(&self) -> Option<UserId> {
        self.requested_by
    }

    pub fn quantity(&self) -> i64 {
        self.quantity
    }

    pub fn kind(&self) -> UsageKind {
        self.kind
    }

    pub fn reason(&self) -> &str {
        &self.reason
    }

    pub fn status(&self) -> UsageStatus {
        self.status
    }

    pub fn decided_by(&self) -> Option<UserId> {
        self.decided_by
    }

    pub fn applied_delta(&self) -> Option<i64> {
        self.applied_delta
    }

    pub fn created_at(&self) -> Option<DateTime<Utc>> {
        self.created_at
    }

    pub fn decided_at(&self) -> Option<DateTime<Utc>> {
        self.decided_at
    }

    /// Quantity a decision would use, after an optional admin override.
    ///
    /// Fails with `InvalidState` once decided, so callers can check this
    /// before touching the ledger.
    pub fn decision_quantity(&self, quantity_override: Option<i64>) -> Result<i64, DomainError> {
        if !self.created {
            return Err(DomainError::not_found());
        }
        if self.status.is_terminal() {
            return Err(DomainError::invalid_state(format!(
                "usage request already {}",
                status_label(self.status)
            )));
        }
        match quantity_override {
            Some(q) if q <= 0 => Err(DomainError::validation("quantity override must be positive")),
            Some(q) => Ok(q),
            None => Ok(self.quantity),
        }
    }

    /// Signed ledger delta an approval would apply.
    pub fn approval_delta(&self, quantity_override: Option<i64>) -> Result<i64, DomainError> {
        let quantity = self.decision_quantity(quantity_override)?;
        Ok(self.kind.signed(quantity))
    }
}

fn status_label(status: UsageStatus) -> &'static str {
    match status {
        UsageStatus::Pending => "pending",
        UsageStatus::Approved => "approved",
        UsageStatus::Rejected => "rejected",
    }
}

impl AggregateRoot for UsageRequest {
    type Id = UsageRequestId;

    fn id(&self) -> &Self::Id {
        &self.id
    }

    fn version(&self) -> u64 {
        self.version
    }
}

/// Command: SubmitUsage.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SubmitUsage {
    pub request_id: UsageRequestId,
    pub item_id: ItemId,
    pub requested_by: UserId,
    pub quantity: i64,
    pub kind: UsageKind,
    pub reason: String,
    pub occurred_at: DateTime<Utc>,
}

impl SubmitUsage {
    /// Stateless checks, usable before anything is persisted.
    pub fn validate(&self) -> Result<(), DomainError> {
        if self.quantity <= 0 {
            return Err(DomainError::validation("quantity must be positive"));
        }
        Ok(())
    }
}

/// Command: ApproveUsage. `applied_delta` is what the ledger actually received.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ApproveUsage {
    pub request_id: UsageRequestId,
    pub approved_by: UserId,
    pub quantity_override: Option<i64>,
    pub applied_delta: i64,
    pub occurred_at: DateTime<Utc>,
}

/// Command: RejectUsage.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RejectUsage {
    pub request_id: UsageRequestId,
    pub rejected_by: UserId,
    pub quantity_override: Option<i64>,
    pub occurred_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum UsageRequestCommand {
    SubmitUsage(SubmitUsage),
    ApproveUsage(ApproveUsage),
    RejectUsage(RejectUsage),
}

/// Event: UsageSubmitted.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UsageSubmitted {
    pub request_id: UsageRequestId,
    pub item_id: ItemId,
    pub requested_by: UserId,
    pub quantity: i64,
    pub kind: UsageKind,
    pub reason: String,
    pub occurred_at: DateTime<Utc>,
}

/// Event: UsageApproved.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UsageApproved {
    pub request_id: UsageRequestId,
    pub item_id: ItemId,
    pub approved_by: UserId,
    pub quantity: i64,
    pub applied_delta: i64,
    pub occurred_at: DateTime<Utc>,
}

/// Event: UsageRejected.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UsageRejected {
    pub request_id: UsageRequestId,
    pub item_id: ItemId,
    pub rejected_by: UserId,
    pub quantity: i64,
    pub occurred_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum UsageRequestEvent {
    UsageSubmitted(UsageSubmitted),
    UsageApproved(UsageApproved),
    UsageRejected(UsageRejected),
}

impl Event for UsageRequestEvent {
    fn event_type(&self) -> &'static str {
        match self {
            UsageRequestEvent::UsageSubmitted(_) => "stock.usage.submitted",
            UsageRequestEvent::UsageApproved(_) => "stock.usage.approved",
            UsageRequestEvent::UsageRejected(_) => "stock.usage.rejected",
        }
    }

    fn version(&self) -> u32 {
        1
    }

    fn occurred_at(&self) -> DateTime<Utc> {
        match self {
            UsageRequestEvent::UsageSubmitted(e) => e.occurred_at,
            UsageRequestEvent::UsageApproved(e) => e.occurred_at,
            UsageRequestEvent::UsageRejected(e) => e.occurred_at,
        }
    }
}

impl Aggregate for UsageRequest {
    type Command = UsageRequestCommand;
    type Event = UsageRequestEvent;
    type Error = DomainError;

    fn apply(&mut self, event: &Self::Event) {
        match event {
            UsageRequestEvent::UsageSubmitted(e) => {
                self.id = e.request_id;
                self.item_id = Some(e.item_id);
                self.requested_by = Some(e.requested_by);
                self.quantity = e.quantity;
                self.kind = e.kind;
                self.reason = e.reason.clone();
                self.status = UsageStatus::Pending;
                self.created_at = Some(e.occurred_at);
                self.created = true;
            }
            UsageRequestEvent::UsageApproved(e) => {
                self.quantity = e.quantity;
                self.applied_delta = Some(e.applied_delta);
                self.status = UsageStatus::Approved;
                self.decided_by = Some(e.approved_by);
                self.decided_at = Some(e.occurred_at);
            }
            UsageRequestEvent::UsageRejected(e) => {
                self.quantity = e.quantity;
                self.status = UsageStatus::Rejected;
                self.decided_by = Some(e.rejected_by);
                self.decided_at = Some(e.occurred_at);
            }
        }

        self.version += 1;
    }

    fn handle(&self, command: &Self::Command) -> Result<Vec<Self::Event>, Self::Error> {
        match command {
            UsageRequestCommand::SubmitUsage(cmd) => self.handle_submit(cmd),
            UsageRequestCommand::ApproveUsage(cmd) => self.handle_approve(cmd),
            UsageRequestCommand::RejectUsage(cmd) => self.handle_reject(cmd),
        }
    }
}

impl UsageRequest {
    fn ensure_request_id(&self, request_id: UsageRequestId) -> Result<(), DomainError> {
        if self.id != request_id {
            return Err(DomainError::invariant("request_id mismatch"));
        }
        Ok(())
    }

    fn submitted_item(&self) -> Result<ItemId, DomainError> {
        self.item_id
            .ok_or_else(|| DomainError::invariant("submitted request has no item"))
    }

    fn handle_submit(&self, cmd: &SubmitUsage) -> Result<Vec<UsageRequestEvent>, DomainError> {
        if self.created {
            return Err(DomainError::conflict("usage request already exists"));
        }
        self.ensure_request_id(cmd.request_id)?;
        cmd.validate()?;

        Ok(vec![UsageRequestEvent::UsageSubmitted(UsageSubmitted {
            request_id: cmd.request_id,
            item_id: cmd.item_id,
            requested_by: cmd.requested_by,
            quantity: cmd.quantity,
            kind: cmd.kind,
            reason: cmd.reason.clone(),
            occurred_at: cmd.occurred_at,
        })])
    }

    fn handle_approve(&self, cmd: &ApproveUsage) -> Result<Vec<UsageRequestEvent>, DomainError> {
        self.ensure_request_id(cmd.request_id)?;
        let quantity = self.decision_quantity(cmd.quantity_override)?;

        if cmd.applied_delta != self.kind.signed(quantity) {
            return Err(DomainError::invariant(
                "applied delta does not match request kind and quantity",
            ));
        }

        Ok(vec![UsageRequestEvent::UsageApproved(UsageApproved {
            request_id: cmd.request_id,
            item_id: self.submitted_item()?,
            approved_by: cmd.approved_by,
            quantity,
            applied_delta: cmd.applied_delta,
            occurred_at: cmd.occurred_at,
        })])
    }

    fn handle_reject(&self, cmd: &RejectUsage) -> Result<Vec<UsageRequestEvent>, DomainError> {
        self.ensure_request_id(cmd.request_id)?;
        let quantity = self.decision_quantity(cmd.quantity_override)?;

        Ok(vec![UsageRequestEvent::UsageRejected(UsageRejected {
            request_id: cmd.request_id,
            item_id: self.submitted_item()?,
            rejected_by: cmd.rejected_by,
            quantity,
            occurred_at: cmd.occurred_at,
        })])
    }
}

#[cfg(test)]
mod tests {
    use proptest::prelude::*;

    use super::*;

    fn test_request_id() -> UsageRequestId {
        UsageRequestId::new(AggregateId::new())
    }

    fn test_item_id() -> ItemId {
        ItemId::new(AggregateId::new())
    }

    fn test_time() -> DateTime<Utc> {
        Utc::now()
    }

    fn submitted(request_id: UsageRequestId, quantity: i64, kind: UsageKind) -> UsageRequest {
        let mut request = UsageRequest::empty(request_id);
        let events = request
            .handle(&UsageRequestCommand::SubmitUsage(SubmitUsage {
                request_id,
                item_id: test_item_id(),
                requested_by: UserId::new(),
                quantity,
                kind,
                reason: "weekly prep".to_string(),
                occurred_at: test_time(),
            }))
            .unwrap();
        request.apply(&events[0]);
        request
    }

    #[test]
    fn submit_starts_pending() {
        let request = submitted(test_request_id(), 3, UsageKind::Subtract);
        assert_eq!(request.status(), UsageStatus::Pending);
        assert_eq!(request.quantity(), 3);
        assert!(request.decided_by().is_none());
    }

    #[test]
    fn submit_rejects_non_positive_quantity() {
        let request_id = test_request_id();
        let request = UsageRequest::empty(request_id);

        for quantity in [0, -2] {
            let err = request
                .handle(&UsageRequestCommand::SubmitUsage(SubmitUsage {
                    request_id,
                    item_id: test_item_id(),
                    requested_by: UserId::new(),
                    quantity,
                    kind: UsageKind::Add,
                    reason: String::new(),
                    occurred_at: test_time(),
                }))
                .unwrap_err();
            assert!(matches!(err, DomainError::Validation(_)));
        }
    }

    #[test]
    fn approve_records_decider_and_delta() {
        let request_id = test_request_id();
        let mut request = submitted(request_id, 3, UsageKind::Subtract);
        let admin = UserId::new();

        let delta = request.approval_delta(None).unwrap();
        assert_eq!(delta, -3);

        let events = request
            .handle(&UsageRequestCommand::ApproveUsage(ApproveUsage {
                request_id,
                approved_by: admin,
                quantity_override: None,
                applied_delta: delta,
                occurred_at: test_time(),
            }))
            .unwrap();
        request.apply(&events[0]);

        assert_eq!(request.status(), UsageStatus::Approved);
        assert_eq!(request.decided_by(), Some(admin));
        assert_eq!(request.applied_delta(), Some(-3));
        assert!(request.decided_at().is_some());
    }

    #[test]
    fn override_replaces_quantity_before_delta() {
        let request = submitted(test_request_id(), 3, UsageKind::Add);
        assert_eq!(request.approval_delta(Some(5)).unwrap(), 5);

        let err = request.approval_delta(Some(0)).unwrap_err();
        assert!(matches!(err, DomainError::Validation(_)));
    }

    #[test]
    fn approve_rejects_mismatched_delta() {
        let request_id = test_request_id();
        let request = submitted(request_id, 3, UsageKind::Add);

        let err = request
            .handle(&UsageRequestCommand::ApproveUsage(ApproveUsage {
                request_id,
                approved_by: UserId::new(),
                quantity_override: None,
                applied_delta: -3,
                occurred_at: test_time(),
            }))
            .unwrap_err();
        assert!(matches!(err, DomainError::InvariantViolation(_)));
    }

    #[test]
    fn cannot_decide_twice() {
        let request_id = test_request_id();
        let mut request = submitted(request_id, 2, UsageKind::Subtract);

        let events = request
            .handle(&UsageRequestCommand::RejectUsage(RejectUsage {
                request_id,
                rejected_by: UserId::new(),
                quantity_override: None,
                occurred_at: test_time(),
            }))
            .unwrap();
        request.apply(&events[0]);
        assert_eq!(request.status(), UsageStatus::Rejected);

        let err = request
            .handle(&UsageRequestCommand::ApproveUsage(ApproveUsage {
                request_id,
                approved_by: UserId::new(),
                quantity_override: None,
                applied_delta: -2,
                occurred_at: test_time(),
            }))
            .unwrap_err();
        match err {
            DomainError::InvalidState(msg) if msg.contains("already rejected") => {}
            _ => panic!("Expected InvalidState for re-decision"),
        }
    }

    #[test]
    fn deciding_unknown_request_is_not_found() {
        let request = UsageRequest::empty(test_request_id());
        assert_eq!(request.approval_delta(None), Err(DomainError::NotFound));
    }

    proptest! {
        #![proptest_config(ProptestConfig { cases: 256, .. ProptestConfig::default() })]

        #[test]
        fn approval_delta_follows_kind(quantity in 1i64..1_000_000, add in any::<bool>()) {
            let kind = if add { UsageKind::Add } else { UsageKind::Subtract };
            let request = submitted(test_request_id(), quantity, kind);
            let delta = request.approval_delta(None).unwrap();
            prop_assert_eq!(delta.abs(), quantity);
            prop_assert_eq!(delta > 0, add);
        }
    }
}
