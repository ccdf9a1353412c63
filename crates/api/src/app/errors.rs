use axum::http::StatusCode;
use axum::response::IntoResponse;
use serde_json::json;
use tracing::error;
use validator::ValidationErrors;

use labstock_infra::stock_control::StockError;

pub fn stock_error_to_response(err: StockError) -> axum::response::Response {
    let status = match &err {
        StockError::Authorization(_) => StatusCode::UNAUTHORIZED,
        StockError::NotFound(_) => StatusCode::NOT_FOUND,
        StockError::Validation(_) => StatusCode::BAD_REQUEST,
        StockError::State(_) | StockError::Conflict(_) => StatusCode::CONFLICT,
        StockError::Persistence(msg) => {
            error!(error = %msg, "persistence failure");
            StatusCode::INTERNAL_SERVER_ERROR
        }
    };
    json_error(status, err.code(), err.to_string())
}

pub fn validation_error_to_response(errors: ValidationErrors) -> axum::response::Response {
    json_error(StatusCode::BAD_REQUEST, "validation_error", errors.to_string())
}

pub fn json_error(
    status: StatusCode,
    code: &'static str,
    message: impl Into<String>,
) -> axum::response::Response {
    (
        status,
        axum::Json(json!({
            "error": code,
            "message": message.into(),
        })),
    )
        .into_response()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn maps_the_taxonomy_to_status_codes() {
        let cases = [
            (StockError::Authorization("no".into()), StatusCode::UNAUTHORIZED),
            (StockError::not_found("item"), StatusCode::NOT_FOUND),
            (StockError::validation("bad"), StatusCode::BAD_REQUEST),
            (StockError::State("done".into()), StatusCode::CONFLICT),
            (StockError::Conflict("busy".into()), StatusCode::CONFLICT),
            (StockError::Persistence("down".into()), StatusCode::INTERNAL_SERVER_ERROR),
        ];
        for (err, status) in cases {
            assert_eq!(stock_error_to_response(err).status(), status);
        }
    }
}
