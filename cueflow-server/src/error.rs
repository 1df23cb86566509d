//! HTTP mapping of the error taxonomy
//!
//! Every handler returns `ApiResult<T>`; the wire shape is always
//! `{ "error": { "code": <enum>, "message": <string>, "details": null } }`
//! with the status implied by the code.

use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde_json::json;

use cueflow_common::Error;

/// API error wrapper carrying the domain error
#[derive(Debug)]
pub struct ApiError(pub Error);

/// Result type for API handlers
pub type ApiResult<T> = std::result::Result<T, ApiError>;

impl From<Error> for ApiError {
    fn from(err: Error) -> Self {
        ApiError(err)
    }
}

impl From<anyhow::Error> for ApiError {
    fn from(err: anyhow::Error) -> Self {
        ApiError(Error::Internal(format!("{err:#}")))
    }
}

/// HTTP status for each wire code
fn status_for(code: &str) -> StatusCode {
    match code {
        "invalid_argument" => StatusCode::BAD_REQUEST,
        "not_found" => StatusCode::NOT_FOUND,
        "conflict" => StatusCode::CONFLICT,
        "busy" => StatusCode::TOO_MANY_REQUESTS,
        "unsupported_format" => StatusCode::UNSUPPORTED_MEDIA_TYPE,
        "corrupt_file" => StatusCode::UNPROCESSABLE_ENTITY,
        "timeout" => StatusCode::GATEWAY_TIMEOUT,
        _ => StatusCode::INTERNAL_SERVER_ERROR,
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let code = self.0.code();
        let status = status_for(code);
        if status.is_server_error() {
            tracing::error!(code, error = %self.0, "request failed");
        } else {
            tracing::debug!(code, error = %self.0, "request rejected");
        }
        let body = Json(json!({
            "error": {
                "code": code,
                "message": self.0.to_string(),
                "details": null,
            }
        }));
        (status, body).into_response()
    }
}
