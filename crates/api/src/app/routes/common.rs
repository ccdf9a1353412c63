use axum::async_trait;
use axum::extract::rejection::JsonRejection;
use axum::extract::{FromRequest, Request};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde::de::DeserializeOwned;
use serde::Serialize;
use tracing::error;
use validator::Validate;

use labstock_core::AggregateId;
use labstock_infra::read_model::PageRequest;
use labstock_infra::stock_control::StockResult;

use crate::app::errors;

/// JSON body whose rejections (unknown enum value, missing field, wrong
/// content type) answer 400 with the usual error body.
#[derive(Debug, Clone, Copy, Default)]
pub struct ValidJson<T>(pub T);

#[async_trait]
impl<T, S> FromRequest<S> for ValidJson<T>
where
    T: DeserializeOwned,
    S: Send + Sync,
{
    type Rejection = Response;

    async fn from_request(req: Request, state: &S) -> Result<Self, Self::Rejection> {
        match Json::<T>::from_request(req, state).await {
            Ok(Json(value)) => Ok(Self(value)),
            Err(rejection) => Err(body_rejection(rejection)),
        }
    }
}

fn body_rejection(rejection: JsonRejection) -> Response {
    errors::json_error(StatusCode::BAD_REQUEST, "validation_error", rejection.body_text())
}

/// Parse a path id, answering 400 on malformed input.
pub fn parse_path_id<T>(raw: &str, what: &str, wrap: impl FnOnce(AggregateId) -> T) -> Result<T, Response> {
    raw.parse::<AggregateId>()
        .map(wrap)
        .map_err(|_| errors::json_error(StatusCode::BAD_REQUEST, "invalid_id", format!("invalid {what} id")))
}

pub fn validate<T: Validate>(body: &T) -> Result<(), Response> {
    body.validate().map_err(errors::validation_error_to_response)
}

pub fn bad_query(message: impl Into<String>) -> Response {
    errors::json_error(StatusCode::BAD_REQUEST, "validation_error", message)
}

pub fn page(page: Option<usize>, limit: Option<usize>, default_limit: usize) -> PageRequest {
    PageRequest::new(page, limit, default_limit)
}

/// Run a stock workflow on the blocking pool.
///
/// Workflows wait on decision locks and, with Postgres, on the store; they
/// must not occupy an async worker while doing so.
pub async fn blocking<T, F>(work: F) -> Result<T, Response>
where
    F: FnOnce() -> T + Send + 'static,
    T: Send + 'static,
{
    tokio::task::spawn_blocking(work).await.map_err(|e| {
        error!(error = %e, "stock workflow task failed");
        errors::json_error(
            StatusCode::INTERNAL_SERVER_ERROR,
            "internal_error",
            "request could not be completed",
        )
    })
}

/// `blocking` followed by `respond`.
pub async fn respond_blocking<T, F>(status: StatusCode, work: F) -> Response
where
    F: FnOnce() -> StockResult<T> + Send + 'static,
    T: Serialize + Send + 'static,
{
    match blocking(work).await {
        Ok(result) => respond(status, result),
        Err(resp) => resp,
    }
}

/// Render a workflow result as JSON with `status` on success.
pub fn respond<T: Serialize>(status: StatusCode, result: StockResult<T>) -> Response {
    match result {
        Ok(body) => (status, Json(body)).into_response(),
        Err(e) => errors::stock_error_to_response(e),
    }
}
