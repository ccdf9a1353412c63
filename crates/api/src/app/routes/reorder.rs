use std::sync::Arc;

use axum::{extract::Extension, http::StatusCode, response::Response};
use chrono::Utc;

use crate::app::dto;
use crate::app::routes::common::{respond_blocking, validate, ValidJson};
use crate::app::services::AppServices;
use crate::context::PrincipalContext;

pub async fn scan_low_stock(
    Extension(services): Extension<Arc<AppServices>>,
    Extension(principal): Extension<PrincipalContext>,
) -> Response {
    respond_blocking(StatusCode::OK, move || services.control.scan_low_stock(principal.principal())).await
}

/// Body is optional; an empty object drafts an order for every low item.
pub async fn create_replenishment_order(
    Extension(services): Extension<Arc<AppServices>>,
    Extension(principal): Extension<PrincipalContext>,
    body: Option<ValidJson<dto::ReplenishmentRequest>>,
) -> Response {
    let body = body.map(|ValidJson(b)| b).unwrap_or_default();
    if let Err(resp) = validate(&body) {
        return resp;
    }
    respond_blocking(StatusCode::CREATED, move || {
        services
            .control
            .create_replenishment_order(principal.principal(), body.item_ids, body.reason)
    })
    .await
}

pub async fn stats(
    Extension(services): Extension<Arc<AppServices>>,
    Extension(principal): Extension<PrincipalContext>,
) -> Response {
    respond_blocking(StatusCode::OK, move || services.control.stats(principal.principal(), Utc::now())).await
}
