//! Client IP extraction.

use std::net::SocketAddr;

use axum::extract::ConnectInfo;
use axum::http::{Extensions, HeaderMap, request::Parts};

const FORWARDED_FOR: &str = "x-forwarded-for";

/// Anything with headers and extensions: request parts or a full request.
pub trait HasHeadersAndExtensions {
    fn headers(&self) -> &HeaderMap;
    fn extensions(&self) -> &Extensions;
}

impl HasHeadersAndExtensions for Parts {
    fn headers(&self) -> &HeaderMap {
        &self.headers
    }
    fn extensions(&self) -> &Extensions {
        &self.extensions
    }
}

impl<B> HasHeadersAndExtensions for axum::extract::Request<B> {
    fn headers(&self) -> &HeaderMap {
        axum::extract::Request::headers(self)
    }
    fn extensions(&self) -> &Extensions {
        axum::extract::Request::extensions(self)
    }
}

/// Client address for session metadata.
///
/// With `trust_forwarded`, the first `X-Forwarded-For` entry wins; only
/// enable that behind a proxy that overwrites the header. Otherwise the
/// socket peer from `ConnectInfo` is used.
pub fn extract_client_ip<T: HasHeadersAndExtensions>(
    source: &T,
    trust_forwarded: bool,
) -> Option<String> {
    if trust_forwarded {
        let forwarded = source
            .headers()
            .get(FORWARDED_FOR)
            .and_then(|v| v.to_str().ok())
            .and_then(|v| v.split(',').next())
            .map(str::trim)
            .filter(|v| !v.is_empty());
        if let Some(ip) = forwarded {
            return Some(ip.to_string());
        }
    }

    source
        .extensions()
        .get::<ConnectInfo<SocketAddr>>()
        .map(|ci| ci.0.ip().to_string())
}
