//! HTTP application wiring (Axum router + service wiring).
//!
//! - `services.rs`: event store selection, projections, background worker
//! - `routes/`: HTTP handlers, one file per resource
//! - `dto.rs`: validated request DTOs
//! - `errors.rs`: error taxonomy to JSON responses

use std::sync::Arc;

use axum::{routing::get, Extension, Router};
use tower::ServiceBuilder;

use crate::config::ApiConfig;
use crate::middleware;

pub mod dto;
pub mod errors;
pub mod routes;
pub mod services;

use services::{Services, StartupError};

/// A ready-to-serve router and the services behind it.
pub struct App {
    pub router: Router,
    pub services: Services,
}

/// Build the full HTTP router (public entrypoint used by `main.rs`).
pub async fn build_app(config: &ApiConfig) -> Result<App, StartupError> {
    let jwt = Arc::new(labstock_auth::Hs256JwtValidator::new(config.jwt_secret.as_bytes()));
    let auth_state = middleware::AuthState { jwt };

    let services = services::build_services(config).await?;

    // Protected routes: require a verified bearer token.
    let protected = routes::router().layer(
        ServiceBuilder::new()
            .layer(axum::middleware::from_fn_with_state(auth_state, middleware::auth_middleware))
            .layer(Extension(services.app.clone())),
    );

    let router = Router::new()
        .route("/health", get(routes::system::health))
        .merge(protected);

    Ok(App { router, services })
}
