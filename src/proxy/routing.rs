//! Request routing rules shared by the deployed worker scripts
//!
//! Target resolution, query filtering and header rewriting in Rust form so the
//! emulator behaves like a deployed endpoint.

use http::header::{HeaderMap, HeaderName, HeaderValue, HOST};
use http::Uri;
use rand::Rng;
use serde_json::{json, Value};
use url::Url;

use crate::cloudflare::scripts::ScriptFormat;
use crate::error::{FlareProxError, Result};

/// Request header naming the target when no `url` query parameter is given
pub const TARGET_HEADER: &str = "x-target-url";

/// Query parameters never forwarded to the target
pub const STRIPPED_PARAMS: &[&str] = &["url", "_cb", "_t"];

/// Request headers forwarded by the module-format script
pub const ALLOWED_HEADERS: &[&str] = &[
    "accept",
    "accept-language",
    "accept-encoding",
    "authorization",
    "cache-control",
    "content-type",
    "origin",
    "referer",
    "user-agent",
];

/// Client-supplied headers that could reveal the caller's address
pub const IP_HEADERS: &[&str] = &[
    "x-forwarded-for",
    "x-real-ip",
    "true-client-ip",
    "cf-connecting-ip",
    "forwarded",
    "x-client-ip",
    "x-cluster-client-ip",
    "x-original-forwarded-for",
];

/// Upstream response headers dropped because the body is re-framed
pub const DROPPED_RESPONSE_HEADERS: &[&str] =
    &["content-encoding", "content-length", "transfer-encoding"];

pub const CORS_ALLOW_ORIGIN: &str = "*";
pub const CORS_ALLOW_METHODS: &str = "GET, POST, PUT, DELETE, OPTIONS, PATCH, HEAD";
pub const CORS_ALLOW_HEADERS: &str = "*";

/// Forwarded-for address announced to the target
pub const FORWARDED_SENTINEL: &str = "0.0.0.0";

/// Target URL from, in order: `url` query parameter, `X-Target-URL` header,
/// or a path that starts with `http` once the leading slash is dropped.
pub fn resolve_target(uri: &Uri, headers: &HeaderMap) -> Option<String> {
    if let Some(query) = uri.query() {
        let from_query = url::form_urlencoded::parse(query.as_bytes())
            .find(|(key, _)| key == "url")
            .map(|(_, value)| value.into_owned())
            .filter(|value| !value.is_empty());
        if from_query.is_some() {
            return from_query;
        }
    }

    let from_header = headers
        .get(TARGET_HEADER)
        .and_then(|v| v.to_str().ok())
        .filter(|v| !v.is_empty());
    if let Some(target) = from_header {
        return Some(target.to_string());
    }

    let path = uri.path().strip_prefix('/').unwrap_or(uri.path());
    if path.starts_with("http") {
        return Some(path.to_string());
    }

    None
}

/// Inbound query pairs to forward, minus [`STRIPPED_PARAMS`]
pub fn forwarded_query(query: Option<&str>) -> Vec<(String, String)> {
    query
        .map(|q| {
            url::form_urlencoded::parse(q.as_bytes())
                .filter(|(key, _)| !STRIPPED_PARAMS.iter().any(|p| key == p))
                .map(|(key, value)| (key.into_owned(), value.into_owned()))
                .collect()
        })
        .unwrap_or_default()
}

/// Parse `target`; a non-empty forwarded query replaces the target's own query
pub fn build_target_url(target: &str, query: &[(String, String)]) -> Result<Url> {
    let mut url = Url::parse(target)?;
    if !query.is_empty() {
        url.query_pairs_mut().clear().extend_pairs(query);
    }
    Ok(url)
}

/// Headers sent upstream for `format`
pub fn forward_headers(format: ScriptFormat, inbound: &HeaderMap, target: &Url) -> HeaderMap {
    let mut headers = HeaderMap::new();

    for (name, value) in inbound {
        let keep = if format.restricts_headers() {
            ALLOWED_HEADERS.contains(&name.as_str())
        } else {
            !is_hop_by_hop_header(name.as_str())
        };
        if keep {
            headers.append(name.clone(), value.clone());
        }
    }

    headers.remove(http::header::CONTENT_LENGTH);
    if let Some(host) = target_host(target) {
        headers.insert(HOST, host);
    }

    for name in IP_HEADERS {
        headers.remove(*name);
    }
    if let Ok(value) = HeaderValue::from_str(&spoofed_forwarded_for()) {
        headers.insert(HeaderName::from_static("x-forwarded-for"), value);
    }
    if let Ok(value) = HeaderValue::from_str(&format!(
        "for=\"{}\";proto={}",
        FORWARDED_SENTINEL,
        target.scheme()
    )) {
        headers.insert(HeaderName::from_static("forwarded"), value);
    }

    headers
}

fn target_host(target: &Url) -> Option<HeaderValue> {
    let host = target.host_str()?;
    let value = match target.port() {
        Some(port) => format!("{}:{}", host, port),
        None => host.to_string(),
    };
    HeaderValue::from_str(&value).ok()
}

/// Upstream headers minus [`DROPPED_RESPONSE_HEADERS`], with CORS applied
pub fn response_headers(upstream: &HeaderMap) -> HeaderMap {
    let mut headers = HeaderMap::new();
    for (name, value) in upstream {
        let name_str = name.as_str();
        if !DROPPED_RESPONSE_HEADERS.contains(&name_str) && !is_hop_by_hop_header(name_str) {
            headers.append(name.clone(), value.clone());
        }
    }
    apply_cors(&mut headers);
    headers
}

/// Set the permissive CORS headers every response carries
pub fn apply_cors(headers: &mut HeaderMap) {
    headers.insert(
        http::header::ACCESS_CONTROL_ALLOW_ORIGIN,
        HeaderValue::from_static(CORS_ALLOW_ORIGIN),
    );
    headers.insert(
        http::header::ACCESS_CONTROL_ALLOW_METHODS,
        HeaderValue::from_static(CORS_ALLOW_METHODS),
    );
    headers.insert(
        http::header::ACCESS_CONTROL_ALLOW_HEADERS,
        HeaderValue::from_static(CORS_ALLOW_HEADERS),
    );
}

/// Four random octets in 1..=255
pub fn spoofed_forwarded_for() -> String {
    let mut rng = rand::thread_rng();
    let octets: Vec<String> = (0..4).map(|_| rng.gen_range(1..=255u8).to_string()).collect();
    octets.join(".")
}

pub fn no_target_body() -> Value {
    json!({
        "error": "No target URL",
        "usage": {
            "query": "?url=https://example.com",
            "header": "X-Target-URL",
            "path": "/https://example.com",
        }
    })
}

pub fn invalid_target_body(provided: &str) -> Value {
    json!({
        "error": "Invalid target URL",
        "provided": provided,
    })
}

/// Check if a header is a hop-by-hop header that should not be forwarded
fn is_hop_by_hop_header(name: &str) -> bool {
    matches!(
        name.to_lowercase().as_str(),
        "connection"
            | "keep-alive"
            | "proxy-authenticate"
            | "proxy-authorization"
            | "te"
            | "trailers"
            | "transfer-encoding"
            | "upgrade"
    )
}

/// JSON body for a failure the emulator reports itself
pub fn error_body(err: &FlareProxError) -> Value {
    json!({ "error": err.to_string() })
}
