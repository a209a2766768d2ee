//! Cookie parsing and `Set-Cookie` builders for browser clients.

use axum::http::{HeaderMap, HeaderValue, header};

/// Cookie carrying the access token (short-lived).
pub const ACCESS_COOKIE_NAME: &str = "access_token";

/// Cookie carrying the refresh token (long-lived, rotated on every use).
pub const REFRESH_COOKIE_NAME: &str = "refresh_token";

/// Extract a cookie value from the Cookie header.
pub fn get_cookie<'a>(headers: &'a HeaderMap, name: &str) -> Option<&'a str> {
    let cookie_header = headers.get(header::COOKIE)?.to_str().ok()?;
    cookie_header
        .split(';')
        .filter_map(|part| part.split_once('='))
        .find(|(key, _)| key.trim() == name)
        .map(|(_, value)| value.trim())
        .filter(|value| !value.is_empty())
}

pub fn has_cookies(headers: &HeaderMap) -> bool {
    headers
        .get(header::COOKIE)
        .and_then(|v| v.to_str().ok())
        .is_some_and(|v| v.contains('='))
}

fn build(name: &str, value: &str, max_age: u64, secure: bool) -> String {
    let secure = if secure { "; Secure" } else { "" };
    format!(
        "{}={}; HttpOnly; SameSite=Strict; Path=/; Max-Age={}{}",
        name, value, max_age, secure
    )
}

pub fn access_cookie(token: &str, max_age: u64, secure: bool) -> String {
    build(ACCESS_COOKIE_NAME, token, max_age, secure)
}

pub fn refresh_cookie(token: &str, max_age: u64, secure: bool) -> String {
    build(REFRESH_COOKIE_NAME, token, max_age, secure)
}

/// Expire both credential cookies.
pub fn clear_cookies(secure: bool) -> [String; 2] {
    [
        build(ACCESS_COOKIE_NAME, "", 0, secure),
        build(REFRESH_COOKIE_NAME, "", 0, secure),
    ]
}

/// Append `Set-Cookie` headers, skipping values that are not valid header text.
pub fn append_set_cookies<I>(headers: &mut HeaderMap, cookies: I)
where
    I: IntoIterator<Item = String>,
{
    for cookie in cookies {
        if let Ok(value) = HeaderValue::from_str(&cookie) {
            headers.append(header::SET_COOKIE, value);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn with_cookie(value: &'static str) -> HeaderMap {
        let mut headers = HeaderMap::new();
        headers.insert(header::COOKIE, HeaderValue::from_static(value));
        headers
    }

    #[test]
    fn test_get_cookie_multiple() {
        let headers = with_cookie("foo=bar; access_token=abc123; refresh_token=xyz789");
        assert_eq!(get_cookie(&headers, ACCESS_COOKIE_NAME), Some("abc123"));
        assert_eq!(get_cookie(&headers, REFRESH_COOKIE_NAME), Some("xyz789"));
        assert_eq!(get_cookie(&headers, "foo"), Some("bar"));
        assert_eq!(get_cookie(&headers, "missing"), None);
    }

    #[test]
    fn test_get_cookie_with_spaces_and_empty() {
        let headers = with_cookie("  access_token = abc123  ; refresh_token=");
        assert_eq!(get_cookie(&headers, ACCESS_COOKIE_NAME), Some("abc123"));
        assert_eq!(get_cookie(&headers, REFRESH_COOKIE_NAME), None);
        assert!(has_cookies(&headers));
        assert!(!has_cookies(&HeaderMap::new()));
    }

    #[test]
    fn test_set_cookie_attributes() {
        let cookie = access_cookie("tok", 900, true);
        assert_eq!(
            cookie,
            "access_token=tok; HttpOnly; SameSite=Strict; Path=/; Max-Age=900; Secure"
        );
        assert!(!refresh_cookie("tok", 60, false).contains("Secure"));
    }

    #[test]
    fn test_clear_cookies() {
        let mut headers = HeaderMap::new();
        append_set_cookies(&mut headers, clear_cookies(false));

        let values: Vec<_> = headers.get_all(header::SET_COOKIE).iter().collect();
        assert_eq!(values.len(), 2);
        assert!(values.iter().all(|v| v.to_str().unwrap().contains("Max-Age=0")));
    }
}
