use once_cell::sync::Lazy;
use regex::Regex;
use serde_json::Value;

static IPV4_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?:\b\d{1,3}\.){3}\d{1,3}\b").expect("valid IPv4 pattern"));

/// Pull the egress IP out of an IP-echo response body.
///
/// A JSON `origin` field wins; behind proxy chains it is a comma-separated list and the
/// last hop is the one the echo service saw. Otherwise the first IPv4-looking token counts.
pub fn extract_ip(body: &str) -> Option<String> {
    origin_field(body).or_else(|| {
        IPV4_RE
            .find(body)
            .map(|m| m.as_str().to_string())
    })
}

fn origin_field(body: &str) -> Option<String> {
    let value: Value = serde_json::from_str(body).ok()?;
    let origin = value.get("origin")?.as_str()?;
    origin
        .rsplit(',')
        .next()
        .map(str::trim)
        .filter(|ip| !ip.is_empty())
        .map(str::to_string)
}
