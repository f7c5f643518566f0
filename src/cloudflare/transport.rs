//! HTTP transport capability
//!
//! Every outbound call (platform REST API, IP probes) goes through [`HttpTransport`] so the
//! client and prober can be driven by a scripted transport in tests.

use std::time::Duration;

use async_trait::async_trait;
use bytes::Bytes;
use http::{HeaderMap, HeaderName, HeaderValue, Method};
use thiserror::Error;
use tracing::debug;

use crate::config::EgressProxyConfig;
use crate::error::{FlareProxError, Result};

/// Failure to obtain any HTTP response
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum TransportError {
    #[error("request timed out: {0}")]
    Timeout(String),

    #[error("connection failed: {0}")]
    Connect(String),

    #[error("request failed: {0}")]
    Request(String),
}

impl From<reqwest::Error> for TransportError {
    fn from(err: reqwest::Error) -> Self {
        if err.is_timeout() {
            TransportError::Timeout(err.to_string())
        } else if err.is_connect() {
            TransportError::Connect(err.to_string())
        } else {
            TransportError::Request(err.to_string())
        }
    }
}

/// Outbound request
#[derive(Debug, Clone)]
pub struct TransportRequest {
    pub method: Method,
    pub url: String,
    pub headers: HeaderMap,
    pub body: Option<Bytes>,
    /// Overrides the transport's default total timeout
    pub timeout: Option<Duration>,
}

impl TransportRequest {
    pub fn new(method: Method, url: impl Into<String>) -> Self {
        Self {
            method,
            url: url.into(),
            headers: HeaderMap::new(),
            body: None,
            timeout: None,
        }
    }

    pub fn get(url: impl Into<String>) -> Self {
        Self::new(Method::GET, url)
    }

    /// Add a header. Invalid names or values are dropped.
    pub fn header(mut self, name: &str, value: &str) -> Self {
        match (
            HeaderName::from_bytes(name.as_bytes()),
            HeaderValue::from_str(value),
        ) {
            (Ok(name), Ok(value)) => {
                self.headers.insert(name, value);
            }
            _ => debug!("Dropping invalid header {}", name),
        }
        self
    }

    pub fn body(mut self, body: impl Into<Bytes>) -> Self {
        self.body = Some(body.into());
        self
    }

    pub fn timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }
}

/// Response with a fully buffered body
#[derive(Debug, Clone)]
pub struct TransportResponse {
    pub status: u16,
    pub headers: HeaderMap,
    pub body: String,
}

impl TransportResponse {
    pub fn new(status: u16, body: impl Into<String>) -> Self {
        Self {
            status,
            headers: HeaderMap::new(),
            body: body.into(),
        }
    }

    pub fn is_success(&self) -> bool {
        (200..300).contains(&self.status)
    }

    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers.get(name).and_then(|v| v.to_str().ok())
    }
}

/// Capability to send a single HTTP request
#[async_trait]
pub trait HttpTransport: Send + Sync {
    async fn send(
        &self,
        request: TransportRequest,
    ) -> std::result::Result<TransportResponse, TransportError>;
}

/// Timeouts and routing for the reqwest-backed transport
#[derive(Debug, Clone)]
pub struct TransportConfig {
    pub connect_timeout: Duration,
    pub request_timeout: Duration,
    pub user_agent: String,
    pub egress_proxy: Option<EgressProxyConfig>,
}

impl Default for TransportConfig {
    fn default() -> Self {
        Self {
            connect_timeout: Duration::from_secs(15),
            request_timeout: Duration::from_secs(30),
            user_agent: format!("flareprox/{}", env!("CARGO_PKG_VERSION")),
            egress_proxy: None,
        }
    }
}

/// [`HttpTransport`] backed by a shared `reqwest::Client`
#[derive(Clone)]
pub struct ReqwestTransport {
    client: reqwest::Client,
}

impl ReqwestTransport {
    pub fn new(config: &TransportConfig) -> Result<Self> {
        let mut builder = reqwest::Client::builder()
            .connect_timeout(config.connect_timeout)
            .timeout(config.request_timeout)
            .user_agent(config.user_agent.clone());

        if let Some(egress) = &config.egress_proxy {
            builder = builder.proxy(egress_proxy(egress)?);
        }

        let client = builder.build().map_err(|e| {
            FlareProxError::InvalidConfig(format!("Failed to build HTTP client: {}", e))
        })?;

        Ok(Self { client })
    }

    pub fn client(&self) -> &reqwest::Client {
        &self.client
    }
}

fn egress_proxy(config: &EgressProxyConfig) -> Result<reqwest::Proxy> {
    let mut proxy = reqwest::Proxy::all(config.url().as_str()).map_err(|e| {
        FlareProxError::InvalidConfig(format!("Invalid egress proxy {:?}: {}", config, e))
    })?;
    // Credentials in the URL are only picked up when a password is present.
    if let (Some(username), None) = (config.username(), config.url().password()) {
        proxy = proxy.basic_auth(username, "");
    }
    debug!("Routing outbound traffic through {:?}", config);
    Ok(proxy)
}

#[async_trait]
impl HttpTransport for ReqwestTransport {
    async fn send(
        &self,
        request: TransportRequest,
    ) -> std::result::Result<TransportResponse, TransportError> {
        let mut builder = self
            .client
            .request(request.method, request.url.as_str())
            .headers(request.headers);

        if let Some(timeout) = request.timeout {
            builder = builder.timeout(timeout);
        }
        if let Some(body) = request.body {
            builder = builder.body(body);
        }

        let response = builder.send().await?;
        let status = response.status().as_u16();
        let headers = response.headers().clone();
        let body = response.text().await?;

        Ok(TransportResponse {
            status,
            headers,
            body,
        })
    }
}

#[cfg(test)]
pub(crate) mod mock {
    //! Scripted transport for tests

    use std::collections::VecDeque;

    use parking_lot::Mutex;

    use super::*;

    type Reply = std::result::Result<TransportResponse, TransportError>;

    /// Answers requests from a queue of routes matched by method and URL substring
    #[derive(Default)]
    pub struct MockTransport {
        routes: Mutex<Vec<(Method, String, VecDeque<Reply>)>>,
        requests: Mutex<Vec<TransportRequest>>,
    }

    impl MockTransport {
        pub fn new() -> Self {
            Self::default()
        }

        /// Queue a reply for the next request whose method matches and whose URL contains
        /// `url_part`. The last queued reply for a route repeats once the queue drains.
        pub fn on(&self, method: Method, url_part: &str, reply: Reply) -> &Self {
            let mut routes = self.routes.lock();
            if let Some((_, _, queue)) = routes
                .iter_mut()
                .find(|(m, u, _)| *m == method && u == url_part)
            {
                queue.push_back(reply);
            } else {
                routes.push((method, url_part.to_string(), VecDeque::from([reply])));
            }
            self
        }

        pub fn respond(&self, method: Method, url_part: &str, status: u16, body: &str) -> &Self {
            self.on(method, url_part, Ok(TransportResponse::new(status, body)))
        }

        pub fn requests(&self) -> Vec<TransportRequest> {
            self.requests.lock().clone()
        }

        pub fn count(&self, method: &Method, url_part: &str) -> usize {
            self.requests
                .lock()
                .iter()
                .filter(|r| r.method == *method && r.url.contains(url_part))
                .count()
        }
    }

    #[async_trait]
    impl HttpTransport for MockTransport {
        async fn send(&self, request: TransportRequest) -> Reply {
            self.requests.lock().push(request.clone());

            let mut routes = self.routes.lock();
            // Longest matching fragment wins so "/scripts/x/subdomain" beats "/scripts/x".
            let route = routes
                .iter_mut()
                .filter(|(m, u, _)| *m == request.method && request.url.contains(u.as_str()))
                .max_by_key(|(_, u, _)| u.len());

            match route {
                Some((_, _, queue)) if queue.len() > 1 => queue.pop_front().unwrap(),
                Some((_, _, queue)) => queue.front().cloned().unwrap(),
                None => Err(TransportError::Connect(format!(
                    "no mock route for {} {}",
                    request.method, request.url
                ))),
            }
        }
    }
}
