use std::sync::Arc;

use axum::{
    extract::{Extension, Path, Query},
    http::StatusCode,
    response::Response,
    routing::{get, post},
    Router,
};

use labstock_infra::projections::OrderQuery;
use labstock_infra::stock_control::Finalize;
use labstock_orders::BatchOrderId;

use crate::app::dto;
use crate::app::routes::common::{bad_query, page, parse_path_id, respond_blocking, validate, ValidJson};
use crate::app::services::AppServices;
use crate::context::PrincipalContext;

const DEFAULT_LIMIT: usize = 10;

pub fn router() -> Router {
    Router::new()
        .route("/", get(list_orders).post(create_order))
        .route("/:id", get(get_order))
        .route("/:id/finalize", post(finalize_order))
}

pub async fn create_order(
    Extension(services): Extension<Arc<AppServices>>,
    Extension(principal): Extension<PrincipalContext>,
    ValidJson(body): ValidJson<dto::CreateOrderRequest>,
) -> Response {
    if let Err(resp) = validate(&body) {
        return resp;
    }
    respond_blocking(StatusCode::CREATED, move || {
        services.control.create_batch_order(principal.principal(), body.into())
    })
    .await
}

pub async fn list_orders(
    Extension(services): Extension<Arc<AppServices>>,
    Extension(principal): Extension<PrincipalContext>,
    Query(params): Query<dto::OrderListParams>,
) -> Response {
    let query = match (params.type_filter(), params.status_filter()) {
        (Ok(order_type), Ok(status)) => OrderQuery {
            order_type,
            status,
            requested_by: None,
        },
        (Err(msg), _) | (_, Err(msg)) => return bad_query(msg),
    };
    let page = page(params.page, params.limit, DEFAULT_LIMIT);
    respond_blocking(StatusCode::OK, move || {
        services.control.list_orders(principal.principal(), query, page)
    })
    .await
}

pub async fn get_order(
    Extension(services): Extension<Arc<AppServices>>,
    Extension(principal): Extension<PrincipalContext>,
    Path(id): Path<String>,
) -> Response {
    let order_id = match parse_path_id(&id, "batch order", BatchOrderId::new) {
        Ok(v) => v,
        Err(resp) => return resp,
    };
    respond_blocking(StatusCode::OK, move || services.control.get_order(principal.principal(), order_id)).await
}

pub async fn finalize_order(
    Extension(services): Extension<Arc<AppServices>>,
    Extension(principal): Extension<PrincipalContext>,
    Path(id): Path<String>,
    ValidJson(body): ValidJson<dto::FinalizeOrderRequest>,
) -> Response {
    let order_id = match parse_path_id(&id, "batch order", BatchOrderId::new) {
        Ok(v) => v,
        Err(resp) => return resp,
    };
    let finalize = match body.status {
        dto::FinalizeStatus::Completed => Finalize::Complete {
            lines: dto::received_lines(body.lines),
        },
        dto::FinalizeStatus::Cancelled => Finalize::Cancel,
    };
    respond_blocking(StatusCode::OK, move || {
        services
            .control
            .finalize_batch_order(principal.principal(), order_id, finalize)
    })
    .await
}
