use std::sync::Arc;

use axum::{
    extract::{Extension, Path, Query},
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::{get, post},
    Json, Router,
};
use serde_json::json;

use labstock_infra::projections::UsageQuery;
use labstock_usage::UsageRequestId;

use crate::app::dto;
use crate::app::errors;
use crate::app::routes::common::{bad_query, blocking, page, parse_path_id, respond_blocking, validate, ValidJson};
use crate::app::services::AppServices;
use crate::context::PrincipalContext;

const DEFAULT_LIMIT: usize = 20;

pub fn router() -> Router {
    Router::new()
        .route("/", get(list_usage).post(submit_usage))
        .route("/:id", get(get_usage))
        .route("/:id/decision", post(decide_usage))
}

/// One entry answers with the request; an array answers with per-entry results.
pub async fn submit_usage(
    Extension(services): Extension<Arc<AppServices>>,
    Extension(principal): Extension<PrincipalContext>,
    ValidJson(body): ValidJson<dto::UsageSubmission>,
) -> Response {
    if let Err(msg) = body.validate_entries() {
        return errors::json_error(StatusCode::BAD_REQUEST, "validation_error", msg);
    }

    match body {
        dto::UsageSubmission::Single(entry) => {
            respond_blocking(StatusCode::CREATED, move || {
                services.control.submit_usage(principal.principal(), entry.into())
            })
            .await
        }
        dto::UsageSubmission::Batch(entries) => {
            let inputs = entries.into_iter().map(Into::into).collect();
            let results = match blocking(move || services.control.submit_usage_batch(principal.principal(), inputs)).await {
                Ok(Ok(r)) => r,
                Ok(Err(e)) => return errors::stock_error_to_response(e),
                Err(resp) => return resp,
            };

            let created = results.iter().filter(|r| r.is_ok()).count();
            let results: Vec<_> = results
                .into_iter()
                .map(|r| match r {
                    Ok(request) => json!({ "ok": true, "request": request }),
                    Err(e) => json!({ "ok": false, "error": e.code(), "message": e.to_string() }),
                })
                .collect();

            let status = if created == results.len() {
                StatusCode::CREATED
            } else {
                StatusCode::MULTI_STATUS
            };
            (status, Json(json!({ "created": created, "results": results }))).into_response()
        }
    }
}

pub async fn list_usage(
    Extension(services): Extension<Arc<AppServices>>,
    Extension(principal): Extension<PrincipalContext>,
    Query(params): Query<dto::UsageListParams>,
) -> Response {
    let query = match (params.item_filter(), params.status_filter()) {
        (Ok(item_id), Ok(status)) => UsageQuery {
            item_id,
            status,
            requested_by: None,
        },
        (Err(msg), _) | (_, Err(msg)) => return bad_query(msg),
    };
    let page = page(params.page, params.limit, DEFAULT_LIMIT);
    respond_blocking(StatusCode::OK, move || {
        services.control.list_usage(principal.principal(), query, page)
    })
    .await
}

pub async fn get_usage(
    Extension(services): Extension<Arc<AppServices>>,
    Extension(principal): Extension<PrincipalContext>,
    Path(id): Path<String>,
) -> Response {
    let request_id = match parse_path_id(&id, "usage request", UsageRequestId::new) {
        Ok(v) => v,
        Err(resp) => return resp,
    };
    respond_blocking(StatusCode::OK, move || {
        services.control.get_usage(principal.principal(), request_id)
    })
    .await
}

pub async fn decide_usage(
    Extension(services): Extension<Arc<AppServices>>,
    Extension(principal): Extension<PrincipalContext>,
    Path(id): Path<String>,
    ValidJson(body): ValidJson<dto::DecideUsageRequest>,
) -> Response {
    let request_id = match parse_path_id(&id, "usage request", UsageRequestId::new) {
        Ok(v) => v,
        Err(resp) => return resp,
    };
    if let Err(resp) = validate(&body) {
        return resp;
    }
    respond_blocking(StatusCode::OK, move || {
        services
            .control
            .decide_usage(principal.principal(), request_id, body.status, body.quantity)
    })
    .await
}
