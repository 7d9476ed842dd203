//! HTTP mapping for authorization core errors
//!
//! Client mistakes surface as `400` with the error's message as a plain text
//! body. A signing fault is an operator problem and surfaces as `500` with a
//! generic body so key details never reach the client.

use axum::http::{StatusCode, header};
use axum::response::{IntoResponse, Response};
use tracing::{error, warn};

/// Body returned when token signing fails
pub const SIGNING_FAILED_BODY: &str = "token signing failed\n";

/// `400` with a plain text body, for requests rejected before reaching the core.
pub fn bad_request(message: impl std::fmt::Display) -> Response {
    warn!(error = %message, "malformed request");
    (
        StatusCode::BAD_REQUEST,
        [(header::CONTENT_TYPE, "text/plain; charset=utf-8")],
        format!("{message}\n"),
    )
        .into_response()
}

/// Wrapper that lets handlers return `goliath_iam::Error` directly.
#[derive(Debug)]
pub struct ApiError(pub goliath_iam::Error);

impl From<goliath_iam::Error> for ApiError {
    fn from(err: goliath_iam::Error) -> Self {
        Self(err)
    }
}

impl ApiError {
    pub fn status(&self) -> StatusCode {
        if self.0.is_client_error() {
            StatusCode::BAD_REQUEST
        } else {
            StatusCode::INTERNAL_SERVER_ERROR
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = self.status();
        let body = if self.0.is_client_error() {
            warn!(error = %self.0, oauth_error = self.0.oauth_error_code(), "request rejected");
            format!("{}\n", self.0)
        } else {
            error!(error = %self.0, "token signing failed");
            SIGNING_FAILED_BODY.to_string()
        };

        (
            status,
            [(header::CONTENT_TYPE, "text/plain; charset=utf-8")],
            body,
        )
            .into_response()
    }
}
