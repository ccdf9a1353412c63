use std::sync::Arc;

use axum::{
    extract::{Extension, Path, Query},
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::get,
    Router,
};

use labstock_inventory::ItemId;

use crate::app::dto;
use crate::app::errors;
use crate::app::routes::common::{bad_query, blocking, page, parse_path_id, respond_blocking, validate, ValidJson};
use crate::app::services::AppServices;
use crate::context::PrincipalContext;

const DEFAULT_LIMIT: usize = 10;

pub fn router() -> Router {
    Router::new()
        .route("/", get(list_items).post(create_item))
        .route("/:id", get(get_item).put(update_item).delete(remove_item))
        .route("/:id/audit", get(audit_trail))
}

pub async fn create_item(
    Extension(services): Extension<Arc<AppServices>>,
    Extension(principal): Extension<PrincipalContext>,
    ValidJson(body): ValidJson<dto::CreateItemRequest>,
) -> Response {
    if let Err(resp) = validate(&body) {
        return resp;
    }
    respond_blocking(StatusCode::CREATED, move || {
        services.control.register_item(principal.principal(), body.into())
    })
    .await
}

pub async fn list_items(
    Extension(services): Extension<Arc<AppServices>>,
    Extension(principal): Extension<PrincipalContext>,
    Query(params): Query<dto::ItemListParams>,
) -> Response {
    let query = match params.query() {
        Ok(q) => q,
        Err(msg) => return bad_query(msg),
    };
    let page = page(params.page, params.limit, DEFAULT_LIMIT);
    respond_blocking(StatusCode::OK, move || {
        services.control.query_items(principal.principal(), &query, page)
    })
    .await
}

pub async fn get_item(
    Extension(services): Extension<Arc<AppServices>>,
    Extension(principal): Extension<PrincipalContext>,
    Path(id): Path<String>,
) -> Response {
    let item_id = match parse_path_id(&id, "item", ItemId::new) {
        Ok(v) => v,
        Err(resp) => return resp,
    };
    respond_blocking(StatusCode::OK, move || services.control.get_item(principal.principal(), item_id)).await
}

pub async fn update_item(
    Extension(services): Extension<Arc<AppServices>>,
    Extension(principal): Extension<PrincipalContext>,
    Path(id): Path<String>,
    ValidJson(body): ValidJson<dto::UpdateItemRequest>,
) -> Response {
    let item_id = match parse_path_id(&id, "item", ItemId::new) {
        Ok(v) => v,
        Err(resp) => return resp,
    };
    if let Err(resp) = validate(&body) {
        return resp;
    }
    respond_blocking(StatusCode::OK, move || {
        services
            .control
            .update_item_metadata(principal.principal(), item_id, body.into_patch())
    })
    .await
}

pub async fn remove_item(
    Extension(services): Extension<Arc<AppServices>>,
    Extension(principal): Extension<PrincipalContext>,
    Path(id): Path<String>,
) -> Response {
    let item_id = match parse_path_id(&id, "item", ItemId::new) {
        Ok(v) => v,
        Err(resp) => return resp,
    };
    match blocking(move || services.control.remove_item(principal.principal(), item_id)).await {
        Ok(Ok(())) => StatusCode::NO_CONTENT.into_response(),
        Ok(Err(e)) => errors::stock_error_to_response(e),
        Err(resp) => resp,
    }
}

pub async fn audit_trail(
    Extension(services): Extension<Arc<AppServices>>,
    Extension(principal): Extension<PrincipalContext>,
    Path(id): Path<String>,
) -> Response {
    let item_id = match parse_path_id(&id, "item", ItemId::new) {
        Ok(v) => v,
        Err(resp) => return resp,
    };
    respond_blocking(StatusCode::OK, move || {
        services.control.item_audit_trail(principal.principal(), item_id)
    })
    .await
}
