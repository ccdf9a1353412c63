use axum::{
    routing::{get, post},
    Router,
};

pub mod common;
pub mod items;
pub mod orders;
pub mod reorder;
pub mod system;
pub mod usage;

/// Router for all authenticated endpoints.
pub fn router() -> Router {
    Router::new()
        .route("/whoami", get(system::whoami))
        .nest("/items", items::router())
        .nest("/usage", usage::router())
        .nest("/orders", orders::router())
        .route("/reorder", get(reorder::scan_low_stock))
        .route("/reorder/orders", post(reorder::create_replenishment_order))
        .route("/stats", get(reorder::stats))
}
