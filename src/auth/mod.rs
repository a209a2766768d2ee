//! HTTP side of credentials: where tokens are found on a request, cookie
//! handling for browsers, and the axum extractor that verifies them.

mod cookie;
mod errors;
mod extractors;
mod ip;
mod locator;
mod state;
mod types;

pub use cookie::{
    ACCESS_COOKIE_NAME, REFRESH_COOKIE_NAME, access_cookie, append_set_cookies, clear_cookies,
    get_cookie, refresh_cookie,
};
pub use errors::ApiAuthError;
pub use extractors::{Authenticated, MaybeAuthenticated};
pub use ip::{HasHeadersAndExtensions, extract_client_ip};
pub use locator::{
    DEVICE_NAME_HEADER, RefreshRequest, device_info, extract_access_token, extract_refresh_token,
    is_browser_origin,
};
pub use state::HasSessionService;
pub use types::AuthenticatedUser;
