use chrono::Utc;
use serde_json::Value as JsonValue;
use tracing::info;

use labstock_auth::{AuthzError, CommandAuthorization, Permission, Principal, authorize_all};
use labstock_events::{EventBus, EventEnvelope};
use labstock_inventory::{ItemId, ReconciliationSource};
use labstock_orders::{
    BatchOrder, BatchOrderCommand, BatchOrderId, BatchOrderType, CancelBatchOrder,
    CompleteBatchOrder, CreateBatchOrder, LineReceipt, NewOrderLine, ReceivedLine,
};

use crate::command_dispatcher::DispatchError;
use crate::event_store::EventStore;
use crate::projections::{BatchOrderReadModel, OrderQuery};
use crate::read_model::{Page, PageRequest, paginate};
use crate::reconciliation::ReconcileRequest;
use crate::streams::ORDER_STREAM;

use super::{NotFoundContext, StockControl, StockError, StockResult, new_id, require};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct NewOrderLineInput {
    pub item_id: ItemId,
    pub requested_qty: i64,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NewBatchOrder {
    pub order_type: BatchOrderType,
    pub reason: Option<String>,
    pub lines: Vec<NewOrderLineInput>,
}

impl CommandAuthorization for NewBatchOrder {
    fn required_permissions(&self) -> &[Permission] {
        &[Permission::ORDERS_CREATE]
    }
}

/// How to close a batch order.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Finalize {
    /// Receive the order. Lines left out are received at `requested_qty`.
    Complete { lines: Option<Vec<ReceivedLine>> },
    Cancel,
}

impl CommandAuthorization for Finalize {
    fn required_permissions(&self) -> &[Permission] {
        &[Permission::ORDERS_FINALIZE]
    }
}

fn order_view(order: &BatchOrder) -> StockResult<BatchOrderReadModel> {
    BatchOrderReadModel::from_aggregate(order)
        .ok_or_else(|| StockError::not_found(format!("batch order {}", order.id_typed())))
}

impl<S, B> StockControl<S, B>
where
    S: EventStore,
    B: EventBus<EventEnvelope<JsonValue>>,
{
    /// Create an order. Each line snapshots the item's live quantity.
    pub fn create_batch_order(&self, principal: &Principal, input: NewBatchOrder) -> StockResult<BatchOrderReadModel> {
        authorize_all(principal, &input)?;

        let lines = input
            .lines
            .iter()
            .map(|line| {
                let item = self.load_existing_item(line.item_id)?;
                Ok(NewOrderLine {
                    item_id: line.item_id,
                    requested_qty: line.requested_qty,
                    current_stock: item.quantity(),
                })
            })
            .collect::<StockResult<Vec<_>>>()?;

        let order_id = BatchOrderId::new(new_id());
        let command = BatchOrderCommand::CreateBatchOrder(CreateBatchOrder {
            order_id,
            order_type: input.order_type,
            requested_by: principal.user_id,
            reason: input.reason.as_deref().unwrap_or_default().trim().to_string(),
            lines,
            occurred_at: Utc::now(),
        });

        let outcome = self.dispatcher.execute(
            order_id.0,
            ORDER_STREAM,
            |id| BatchOrder::empty(BatchOrderId::new(id)),
            |_| Ok(command.clone()),
        )?;

        info!(
            order_id = %order_id,
            order_type = ?input.order_type,
            lines = input.lines.len(),
            "batch order created"
        );
        order_view(&outcome.aggregate)
    }

    /// Complete or cancel an open order.
    ///
    /// A terminal order fails with `State` before any ledger access. On
    /// completion each line is reconciled against the item's live quantity
    /// with the order type's delta rule; a line already applied by an
    /// earlier, interrupted attempt is not applied again. Such an order
    /// cannot be cancelled any more.
    pub fn finalize_batch_order(
        &self,
        principal: &Principal,
        order_id: BatchOrderId,
        finalize: Finalize,
    ) -> StockResult<BatchOrderReadModel> {
        authorize_all(principal, &finalize)?;

        self.locks.with_lock(order_id.0, || {
            let order = self
                .dispatcher
                .load(order_id.0, ORDER_STREAM, |id| BatchOrder::empty(BatchOrderId::new(id)))
                .or_not_found("batch order")?;

            let command = match &finalize {
                Finalize::Cancel => {
                    order.ensure_open().map_err(DispatchError::from).or_not_found("batch order")?;
                    self.ensure_unapplied(
                        order.lines().iter().map(|line| line.item_id),
                        &ReconciliationSource::BatchOrderLine {
                            order_id: order_id.0,
                        },
                        "complete the order",
                    )?;
                    BatchOrderCommand::CancelBatchOrder(CancelBatchOrder {
                        order_id,
                        cancelled_by: principal.user_id,
                        occurred_at: Utc::now(),
                    })
                }
                Finalize::Complete { lines } => {
                    let received = order
                        .resolve_receipts(lines.as_deref())
                        .map_err(DispatchError::from)
                        .or_not_found("batch order")?;
                    let receipts = self.receive_lines(principal, &order, &received)?;

                    BatchOrderCommand::CompleteBatchOrder(CompleteBatchOrder {
                        order_id,
                        completed_by: principal.user_id,
                        receipts,
                        occurred_at: Utc::now(),
                    })
                }
            };

            let outcome = self
                .dispatcher
                .execute(
                    order_id.0,
                    ORDER_STREAM,
                    |id| BatchOrder::empty(BatchOrderId::new(id)),
                    |_| Ok(command.clone()),
                )
                .or_not_found("batch order")?;

            info!(
                order_id = %order_id,
                status = outcome.aggregate.status().as_str(),
                finalized_by = %principal.user_id,
                "batch order finalized"
            );
            order_view(&outcome.aggregate)
        })
    }

    /// Owners and admins only.
    pub fn get_order(&self, principal: &Principal, order_id: BatchOrderId) -> StockResult<BatchOrderReadModel> {
        require(principal, &Permission::ORDERS_READ)?;

        let order = self
            .dispatcher
            .load(order_id.0, ORDER_STREAM, |id| BatchOrder::empty(BatchOrderId::new(id)))
            .or_not_found("batch order")?;
        let view = order_view(&order)?;
        if !principal.can_view(view.requested_by) {
            return Err(AuthzError::NotOwner.into());
        }
        Ok(view)
    }

    /// Non-admins only ever see their own orders.
    pub fn list_orders(
        &self,
        principal: &Principal,
        mut query: OrderQuery,
        page: PageRequest,
    ) -> StockResult<Page<BatchOrderReadModel>> {
        require(principal, &Permission::ORDERS_READ)?;
        if !principal.has_permission(&Permission::VIEW_ALL) {
            query.requested_by = Some(principal.user_id);
        }
        Ok(paginate(self.projections.orders.query(&query), page))
    }

    fn receive_lines(
        &self,
        principal: &Principal,
        order: &BatchOrder,
        received: &[ReceivedLine],
    ) -> StockResult<Vec<LineReceipt>> {
        let order_id = order.id_typed();
        let order_type = order.order_type();
        let tag = order.tag();

        received
            .iter()
            .map(|line| {
                let received_qty = line.received_qty;
                let reconciliation = self
                    .engine
                    .reconcile_with(
                        ReconcileRequest {
                            item_id: line.item_id,
                            source: ReconciliationSource::BatchOrderLine {
                                order_id: order_id.0,
                            },
                            tag: tag.clone(),
                            actor: principal.user_id,
                            on_behalf_of: None,
                        },
                        |live| order_type.delta(received_qty, live),
                    )
                    .or_not_found("item")?;

                Ok(LineReceipt {
                    item_id: line.item_id,
                    received_qty,
                    applied_delta: reconciliation.audit.delta(),
                })
            })
            .collect()
    }
}
