use chrono::Utc;
use serde::{Deserialize, Serialize};
use serde_json::Value as JsonValue;
use tracing::{info, warn};

use labstock_auth::{AuthzError, CommandAuthorization, Permission, Principal, authorize_all};
use labstock_events::{EventBus, EventEnvelope};
use labstock_inventory::{ItemId, ReconciliationSource};
use labstock_usage::{
    ApproveUsage, RejectUsage, SubmitUsage, UsageKind, UsageRequest, UsageRequestCommand,
    UsageRequestId,
};

use crate::command_dispatcher::DispatchError;
use crate::event_store::EventStore;
use crate::projections::{UsageQuery, UsageRequestReadModel};
use crate::read_model::{Page, PageRequest, paginate};
use crate::reconciliation::ReconcileRequest;
use crate::streams::USAGE_STREAM;

use super::{NotFoundContext, StockControl, StockError, StockResult, new_id, require};

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NewUsageRequest {
    pub item_id: ItemId,
    pub quantity: i64,
    pub kind: UsageKind,
    pub reason: Option<String>,
}

impl CommandAuthorization for NewUsageRequest {
    fn required_permissions(&self) -> &[Permission] {
        &[Permission::USAGE_SUBMIT]
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Decision {
    Approved,
    Rejected,
}

impl CommandAuthorization for Decision {
    fn required_permissions(&self) -> &[Permission] {
        &[Permission::USAGE_DECIDE]
    }
}

fn usage_view(request: &UsageRequest) -> StockResult<UsageRequestReadModel> {
    UsageRequestReadModel::from_aggregate(request)
        .ok_or_else(|| StockError::not_found(format!("usage request {}", request.id_typed())))
}

fn load_request<S, B>(control: &StockControl<S, B>, request_id: UsageRequestId) -> StockResult<UsageRequest>
where
    S: EventStore,
    B: EventBus<EventEnvelope<JsonValue>>,
{
    control
        .dispatcher
        .load(request_id.0, USAGE_STREAM, |id| UsageRequest::empty(UsageRequestId::new(id)))
        .or_not_found("usage request")
}

impl<S, B> StockControl<S, B>
where
    S: EventStore,
    B: EventBus<EventEnvelope<JsonValue>>,
{
    pub fn submit_usage(&self, principal: &Principal, input: NewUsageRequest) -> StockResult<UsageRequestReadModel> {
        authorize_all(principal, &input)?;
        let command = self.prepare_submission(principal, &input)?;
        self.persist_submission(command)
    }

    /// Submit several requests at once.
    ///
    /// Every entry is checked before anything is written; one bad entry
    /// rejects the whole batch. After that each entry is persisted on its
    /// own and its outcome reported at the same index.
    pub fn submit_usage_batch(
        &self,
        principal: &Principal,
        inputs: Vec<NewUsageRequest>,
    ) -> StockResult<Vec<StockResult<UsageRequestReadModel>>> {
        require(principal, &Permission::USAGE_SUBMIT)?;
        if inputs.is_empty() {
            return Err(StockError::validation("batch must contain at least one entry"));
        }

        let commands = inputs
            .iter()
            .enumerate()
            .map(|(idx, input)| {
                self.prepare_submission(principal, input).map_err(|err| match err {
                    StockError::Validation(msg) => StockError::Validation(format!("entry {idx}: {msg}")),
                    StockError::NotFound(what) => StockError::NotFound(format!("{what} (entry {idx})")),
                    other => other,
                })
            })
            .collect::<StockResult<Vec<_>>>()?;

        let results: Vec<_> = commands.into_iter().map(|c| self.persist_submission(c)).collect();
        let failed = results.iter().filter(|r| r.is_err()).count();
        if failed > 0 {
            warn!(failed, total = results.len(), "usage batch partially persisted");
        }
        Ok(results)
    }

    /// Approve or reject a pending request.
    ///
    /// Everything that can reject the decision (missing request, terminal
    /// status, bad override) is checked before the ledger is touched. On
    /// approval the ledger is reconciled first and the request is marked
    /// approved afterwards; if reconciliation fails the request stays pending.
    /// A request whose ledger movement already landed can only be approved.
    pub fn decide_usage(
        &self,
        principal: &Principal,
        request_id: UsageRequestId,
        decision: Decision,
        quantity_override: Option<i64>,
    ) -> StockResult<UsageRequestReadModel> {
        authorize_all(principal, &decision)?;

        self.locks.with_lock(request_id.0, || {
            let request = load_request(self, request_id)?;
            let delta = request
                .approval_delta(quantity_override)
                .map_err(DispatchError::from)
                .or_not_found("usage request")?;

            let command = match decision {
                Decision::Approved => {
                    let item_id = request
                        .item_id()
                        .ok_or_else(|| StockError::Persistence("usage request has no item".to_string()))?;

                    let reconciliation = self
                        .engine
                        .reconcile(
                            ReconcileRequest {
                                item_id,
                                source: ReconciliationSource::UsageRequest {
                                    request_id: request_id.0,
                                },
                                tag: request.reason().to_string(),
                                actor: principal.user_id,
                                on_behalf_of: request.requested_by(),
                            },
                            delta,
                        )
                        .or_not_found("item")?;

                    // A previous attempt may already have reconciled; record what the ledger got.
                    let applied_delta = reconciliation.audit.delta();
                    let quantity_override = if reconciliation.applied {
                        quantity_override
                    } else {
                        Some(applied_delta.abs())
                    };

                    UsageRequestCommand::ApproveUsage(ApproveUsage {
                        request_id,
                        approved_by: principal.user_id,
                        quantity_override,
                        applied_delta,
                        occurred_at: Utc::now(),
                    })
                }
                Decision::Rejected => {
                    self.ensure_unapplied(
                        request.item_id(),
                        &ReconciliationSource::UsageRequest {
                            request_id: request_id.0,
                        },
                        "approve the request",
                    )?;
                    UsageRequestCommand::RejectUsage(RejectUsage {
                        request_id,
                        rejected_by: principal.user_id,
                        quantity_override,
                        occurred_at: Utc::now(),
                    })
                }
            };

            let outcome = self
                .dispatcher
                .execute(
                    request_id.0,
                    USAGE_STREAM,
                    |id| UsageRequest::empty(UsageRequestId::new(id)),
                    |_| Ok(command.clone()),
                )
                .or_not_found("usage request")?;

            info!(
                request_id = %request_id,
                decision = ?decision,
                decided_by = %principal.user_id,
                "usage request decided"
            );
            usage_view(&outcome.aggregate)
        })
    }

    /// Owners and admins only.
    pub fn get_usage(&self, principal: &Principal, request_id: UsageRequestId) -> StockResult<UsageRequestReadModel> {
        require(principal, &Permission::USAGE_READ)?;

        let request = load_request(self, request_id)?;
        let view = usage_view(&request)?;
        if !principal.can_view(view.requested_by) {
            return Err(AuthzError::NotOwner.into());
        }
        Ok(view)
    }

    /// Non-admins only ever see their own requests.
    pub fn list_usage(
        &self,
        principal: &Principal,
        mut query: UsageQuery,
        page: PageRequest,
    ) -> StockResult<Page<UsageRequestReadModel>> {
        require(principal, &Permission::USAGE_READ)?;
        if !principal.has_permission(&Permission::VIEW_ALL) {
            query.requested_by = Some(principal.user_id);
        }
        Ok(paginate(self.projections.usage.query(&query), page))
    }

    fn prepare_submission(&self, principal: &Principal, input: &NewUsageRequest) -> StockResult<SubmitUsage> {
        let command = SubmitUsage {
            request_id: UsageRequestId::new(new_id()),
            item_id: input.item_id,
            requested_by: principal.user_id,
            quantity: input.quantity,
            kind: input.kind,
            reason: input.reason.as_deref().unwrap_or_default().trim().to_string(),
            occurred_at: Utc::now(),
        };
        command
            .validate()
            .map_err(|e| StockError::from(DispatchError::from(e)))?;
        self.load_existing_item(input.item_id)?;
        Ok(command)
    }

    fn persist_submission(&self, command: SubmitUsage) -> StockResult<UsageRequestReadModel> {
        let request_id = command.request_id;
        let outcome = self.dispatcher.execute(
            request_id.0,
            USAGE_STREAM,
            |id| UsageRequest::empty(UsageRequestId::new(id)),
            |_| Ok(UsageRequestCommand::SubmitUsage(command.clone())),
        )?;

        info!(
            request_id = %request_id,
            item_id = %command.item_id,
            kind = ?command.kind,
            quantity = command.quantity,
            "usage request submitted"
        );
        usage_view(&outcome.aggregate)
    }
}
