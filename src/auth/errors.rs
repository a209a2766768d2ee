//! HTTP responses for rejected credentials and failed auth operations.

use axum::{
    Json,
    http::StatusCode,
    response::{IntoResponse, Response},
};
use serde::Serialize;
use tracing::error;

use super::cookie::{append_set_cookies, clear_cookies};
use crate::error::AuthError;
use crate::jwt::AccessRejection;

/// 401 with the generic sign-in message. The typed reason is kept for the
/// server side only.
#[derive(Debug)]
pub struct ApiAuthError {
    pub reason: Option<AccessRejection>,
    /// Expire the credential cookies on the response.
    pub(super) clear_cookies: bool,
    pub(super) secure_cookies: bool,
}

impl ApiAuthError {
    pub fn public_message(&self) -> &'static str {
        crate::SIGN_IN_AGAIN
    }
}

#[derive(Serialize)]
struct ErrorResponse {
    error: &'static str,
}

impl IntoResponse for ApiAuthError {
    fn into_response(self) -> Response {
        let mut response = (
            StatusCode::UNAUTHORIZED,
            Json(ErrorResponse {
                error: self.public_message(),
            }),
        )
            .into_response();

        if self.clear_cookies {
            append_set_cookies(response.headers_mut(), clear_cookies(self.secure_cookies));
        }
        response
    }
}

/// Invalid credentials get the sign-in message; transient store failures
/// ask the client to retry; everything else is a plain 500.
impl IntoResponse for AuthError {
    fn into_response(self) -> Response {
        let (status, message) = match &self {
            AuthError::InvalidCredential => (StatusCode::UNAUTHORIZED, crate::SIGN_IN_AGAIN),
            e if e.is_retryable() => {
                error!(error = %e, "Auth operation failed, retryable");
                (StatusCode::SERVICE_UNAVAILABLE, "Temporarily unavailable")
            }
            e => {
                error!(error = %e, "Auth operation failed");
                (StatusCode::INTERNAL_SERVER_ERROR, "Internal error")
            }
        };

        (status, Json(ErrorResponse { error: message })).into_response()
    }
}
