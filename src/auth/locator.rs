//! Where credentials are found on an incoming request.
//!
//! API and CLI clients send explicit credentials (a Bearer header, a body
//! field); browsers rely on cookies. Explicit credentials always win. None
//! of this decides whether a request is authenticated, only which string
//! gets verified and whether cookies should be written back.

use axum::http::{HeaderMap, header};
use serde::Deserialize;

use super::cookie::{ACCESS_COOKIE_NAME, REFRESH_COOKIE_NAME, get_cookie, has_cookies};
use super::ip::{HasHeadersAndExtensions, extract_client_ip};
use crate::db::DeviceInfo;

/// Optional header a client can set to name itself in the session list.
pub const DEVICE_NAME_HEADER: &str = "x-device-name";

const MAX_DEVICE_NAME_LEN: usize = 100;

/// User agent fragments of programmatic clients.
const NON_BROWSER_AGENTS: &[&str] = &[
    "curl/",
    "wget/",
    "httpie/",
    "python-requests",
    "python-urllib",
    "aiohttp",
    "go-http-client",
    "okhttp",
    "reqwest",
    "node-fetch",
    "axios/",
    "postman",
    "insomnia",
];

/// Body of a refresh request. The field is optional so cookie-only
/// browser requests deserialize too.
#[derive(Debug, Default, Deserialize)]
pub struct RefreshRequest {
    #[serde(default)]
    pub refresh_token: Option<String>,
}

fn bearer(headers: &HeaderMap) -> Option<&str> {
    let value = headers.get(header::AUTHORIZATION)?.to_str().ok()?;
    let (scheme, token) = value.split_once(' ')?;
    let token = token.trim();
    (scheme.eq_ignore_ascii_case("bearer") && !token.is_empty()).then_some(token)
}

/// Access token from `Authorization: Bearer`, else the access cookie.
pub fn extract_access_token(headers: &HeaderMap) -> Option<&str> {
    bearer(headers).or_else(|| get_cookie(headers, ACCESS_COOKIE_NAME))
}

/// Refresh token from the request body, else the refresh cookie.
pub fn extract_refresh_token<'a>(
    headers: &'a HeaderMap,
    body_token: Option<&'a str>,
) -> Option<&'a str> {
    body_token
        .map(str::trim)
        .filter(|t| !t.is_empty())
        .or_else(|| get_cookie(headers, REFRESH_COOKIE_NAME))
}

/// Heuristic: does this look like a browser, so cookies should be set or
/// cleared on the response?
pub fn is_browser_origin(headers: &HeaderMap) -> bool {
    let user_agent = headers
        .get(header::USER_AGENT)
        .and_then(|v| v.to_str().ok())
        .map(str::to_ascii_lowercase)
        .unwrap_or_default();
    if NON_BROWSER_AGENTS.iter().any(|a| user_agent.contains(a)) {
        return false;
    }

    let accepts_html = headers
        .get_all(header::ACCEPT)
        .iter()
        .filter_map(|v| v.to_str().ok())
        .any(|v| v.contains("text/html") || v.contains("*/*"));

    accepts_html || has_cookies(headers)
}

fn header_str<'a>(headers: &'a HeaderMap, name: &str) -> Option<&'a str> {
    headers
        .get(name)
        .and_then(|v| v.to_str().ok())
        .map(str::trim)
        .filter(|v| !v.is_empty())
}

/// Session metadata for the client making this request.
pub fn device_info<T: HasHeadersAndExtensions>(source: &T, trust_forwarded: bool) -> DeviceInfo {
    let headers = source.headers();

    let device_name = header_str(headers, DEVICE_NAME_HEADER)
        .map(|n| n.chars().take(MAX_DEVICE_NAME_LEN).collect::<String>());
    let device_type = if is_browser_origin(headers) { "browser" } else { "api" };

    DeviceInfo {
        device_name,
        device_type: Some(device_type.to_string()),
        ip_address: extract_client_ip(source, trust_forwarded),
        user_agent: header_str(headers, header::USER_AGENT.as_str()).map(str::to_string),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::http::{HeaderValue, Request};

    fn headers(pairs: &[(&'static str, &'static str)]) -> HeaderMap {
        let mut map = HeaderMap::new();
        for (k, v) in pairs {
            map.append(*k, HeaderValue::from_static(v));
        }
        map
    }

    #[test]
    fn test_bearer_beats_cookie() {
        let h = headers(&[
            ("authorization", "Bearer from-header"),
            ("cookie", "access_token=from-cookie"),
        ]);
        assert_eq!(extract_access_token(&h), Some("from-header"));

        let h = headers(&[("cookie", "access_token=from-cookie")]);
        assert_eq!(extract_access_token(&h), Some("from-cookie"));

        let h = headers(&[("authorization", "Basic dXNlcjpwYXNz")]);
        assert_eq!(extract_access_token(&h), None);

        let h = headers(&[("authorization", "bearer lower")]);
        assert_eq!(extract_access_token(&h), Some("lower"));
    }

    #[test]
    fn test_body_beats_cookie() {
        let h = headers(&[("cookie", "refresh_token=from-cookie")]);
        assert_eq!(extract_refresh_token(&h, Some("from-body")), Some("from-body"));
        assert_eq!(extract_refresh_token(&h, Some("  ")), Some("from-cookie"));
        assert_eq!(extract_refresh_token(&h, None), Some("from-cookie"));
        assert_eq!(extract_refresh_token(&HeaderMap::new(), None), None);
    }

    #[test]
    fn test_browser_heuristics() {
        let firefox = headers(&[
            ("user-agent", "Mozilla/5.0 (X11; Linux x86_64) Firefox/131.0"),
            ("accept", "text/html,application/xhtml+xml"),
        ]);
        assert!(is_browser_origin(&firefox));

        // curl sends Accept: */* but is not a browser.
        let curl = headers(&[("user-agent", "curl/8.5.0"), ("accept", "*/*")]);
        assert!(!is_browser_origin(&curl));

        let fetch_with_cookie = headers(&[("accept", "application/json"), ("cookie", "a=b")]);
        assert!(is_browser_origin(&fetch_with_cookie));

        let bare = headers(&[("accept", "application/json")]);
        assert!(!is_browser_origin(&bare));
    }

    #[test]
    fn test_device_info_from_request() {
        let req = Request::builder()
            .header("user-agent", "sessioncore-cli/1.0")
            .header(DEVICE_NAME_HEADER, " laptop ")
            .header("x-forwarded-for", "198.51.100.2")
            .body(())
            .unwrap();

        let info = device_info(&req, true);
        assert_eq!(info.device_name.as_deref(), Some("laptop"));
        assert_eq!(info.device_type.as_deref(), Some("api"));
        assert_eq!(info.ip_address.as_deref(), Some("198.51.100.2"));
        assert_eq!(info.user_agent.as_deref(), Some("sessioncore-cli/1.0"));
    }
}
