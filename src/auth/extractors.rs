//! Axum extractors for authentication.

use axum::{extract::FromRequestParts, http::request::Parts};

use super::errors::ApiAuthError;
use super::locator::{device_info, extract_access_token, is_browser_origin};
use super::state::HasSessionService;
use super::types::AuthenticatedUser;

async fn authenticate_request<S>(
    parts: &Parts,
    state: &S,
) -> Result<AuthenticatedUser, ApiAuthError>
where
    S: HasSessionService + Send + Sync,
{
    let browser = is_browser_origin(&parts.headers);
    let reject = |reason| ApiAuthError {
        reason,
        clear_cookies: browser,
        secure_cookies: state.secure_cookies(),
    };

    let token = extract_access_token(&parts.headers).ok_or_else(|| reject(None))?;
    let claims = state
        .sessions()
        .authenticate(token)
        .await
        .map_err(|reason| reject(Some(reason)))?;

    Ok(AuthenticatedUser {
        claims,
        access_token: token.to_string(),
        device: device_info(parts, state.trust_forwarded()),
    })
}

/// Requires a valid, non-revoked access token from the Bearer header or
/// the access cookie. Browser callers that fail also get their cookies
/// cleared.
pub struct Authenticated(pub AuthenticatedUser);

impl<S> FromRequestParts<S> for Authenticated
where
    S: HasSessionService + Send + Sync,
{
    type Rejection = ApiAuthError;

    async fn from_request_parts(parts: &mut Parts, state: &S) -> Result<Self, Self::Rejection> {
        authenticate_request(parts, state).await.map(Authenticated)
    }
}

/// Never fails. For endpoints that behave differently when signed in.
pub struct MaybeAuthenticated(pub Option<AuthenticatedUser>);

impl<S> FromRequestParts<S> for MaybeAuthenticated
where
    S: HasSessionService + Send + Sync,
{
    type Rejection = std::convert::Infallible;

    async fn from_request_parts(parts: &mut Parts, state: &S) -> Result<Self, Self::Rejection> {
        Ok(MaybeAuthenticated(authenticate_request(parts, state).await.ok()))
    }
}
