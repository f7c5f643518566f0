//! Worker request handler
//!
//! Applies the routing rules to one inbound request and relays it to the target.

use bytes::Bytes;
use http_body_util::Full;
use hyper::ext::ReasonPhrase;
use hyper::header::{HeaderValue, ACCEPT_ENCODING, CONTENT_TYPE};
use hyper::{Method, Request, Response, StatusCode};
use serde_json::Value;
use tracing::{debug, instrument, warn};

use crate::cloudflare::scripts::ScriptFormat;
use crate::cloudflare::transport::TransportError;
use crate::error::{FlareProxError, Result};
use crate::proxy::routing::{
    apply_cors, build_target_url, error_body, forward_headers, forwarded_query,
    invalid_target_body, no_target_body, resolve_target, response_headers,
};

/// Handles requests the way a deployed worker of `format` would
pub struct WorkerHandler {
    client: reqwest::Client,
    format: ScriptFormat,
}

impl WorkerHandler {
    pub fn new(client: reqwest::Client, format: ScriptFormat) -> Self {
        Self { client, format }
    }

    pub fn format(&self) -> ScriptFormat {
        self.format
    }

    /// Handle a request whose body has already been buffered
    #[instrument(skip(self, req), fields(method = %req.method(), uri = %req.uri()))]
    pub async fn handle(&self, req: Request<Bytes>) -> Result<Response<Full<Bytes>>> {
        let (parts, body) = req.into_parts();

        let Some(target) = resolve_target(&parts.uri, &parts.headers) else {
            return Ok(json_response(StatusCode::BAD_REQUEST, &no_target_body()));
        };

        let query = forwarded_query(parts.uri.query());
        let target_url = match build_target_url(&target, &query) {
            Ok(url) => url,
            Err(_) => {
                return Ok(json_response(
                    StatusCode::BAD_REQUEST,
                    &invalid_target_body(&target),
                ))
            }
        };

        if parts.method == Method::OPTIONS {
            return Ok(preflight_response());
        }

        let mut headers = forward_headers(self.format, &parts.headers, &target_url);
        // reqwest negotiates and decodes compression itself
        headers.remove(ACCEPT_ENCODING);

        debug!("Forwarding {} {}", parts.method, target_url);

        let mut builder = self
            .client
            .request(parts.method.clone(), target_url.as_str())
            .headers(headers);
        if parts.method != Method::GET && parts.method != Method::HEAD {
            builder = builder.body(body);
        }

        let upstream = builder
            .send()
            .await
            .map_err(|e| FlareProxError::Transport(TransportError::from(e)))?;

        let status = upstream.status();
        let reason = upstream.extensions().get::<ReasonPhrase>().cloned();
        let headers = response_headers(upstream.headers());
        let body = upstream
            .bytes()
            .await
            .map_err(|e| FlareProxError::Transport(TransportError::from(e)))?;

        let mut response = Response::new(Full::new(body));
        *response.status_mut() = status;
        *response.headers_mut() = headers;
        // Only present when the upstream used a non-canonical status text
        if let Some(reason) = reason {
            response.extensions_mut().insert(reason);
        }
        Ok(response)
    }
}

/// Empty 204 answering a CORS preflight
pub fn preflight_response() -> Response<Full<Bytes>> {
    let mut response = Response::new(Full::new(Bytes::new()));
    *response.status_mut() = StatusCode::NO_CONTENT;
    apply_cors(response.headers_mut());
    response
}

/// JSON error response for a failure while handling a request
pub fn error_response(err: &FlareProxError) -> Response<Full<Bytes>> {
    warn!("Worker request failed: {}", err);
    json_response(err.status_code(), &error_body(err))
}

fn json_response(status: StatusCode, body: &Value) -> Response<Full<Bytes>> {
    let mut response = Response::new(Full::new(Bytes::from(body.to_string())));
    *response.status_mut() = status;
    response
        .headers_mut()
        .insert(CONTENT_TYPE, HeaderValue::from_static("application/json"));
    response
}
