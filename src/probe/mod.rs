//! Egress IP probing
//!
//! Sends a request through each endpoint to an IP-echo service and reports the
//! address the outside world saw.

mod extract;
mod retry;

pub use extract::extract_ip;
pub use retry::RetryPolicy;

use std::sync::Arc;

use futures::StreamExt;
use tracing::{debug, info, instrument, warn};

use crate::cloudflare::client::preview;
use crate::cloudflare::transport::{HttpTransport, TransportRequest};
use crate::models::{Endpoint, ProbedEndpoint};

/// Reported when no attempt produced an address
pub const UNKNOWN_IP: &str = "n/a";

/// Default IP-echo URL
pub const DEFAULT_PROBE_TARGET: &str = "https://httpbin.org/ip";

/// Upper bound on concurrent probes
pub const DEFAULT_PROBE_WORKERS: usize = 4;

const BODY_PREVIEW_LEN: usize = 200;

/// Resolves the egress IP of live endpoints
pub struct IpProber {
    transport: Arc<dyn HttpTransport>,
    target: String,
    policy: RetryPolicy,
}

impl IpProber {
    pub fn new(transport: Arc<dyn HttpTransport>, target: impl Into<String>, policy: RetryPolicy) -> Self {
        Self {
            transport,
            target: target.into(),
            policy,
        }
    }

    /// URL that routes the echo target through `endpoint_url`
    pub fn probe_url(&self, endpoint_url: &str) -> String {
        format!("{}/{}", endpoint_url.trim_end_matches('/'), self.target)
    }

    /// Egress IP seen through `endpoint_url`, or [`UNKNOWN_IP`]
    #[instrument(skip(self))]
    pub async fn probe(&self, endpoint_url: &str) -> String {
        let url = self.probe_url(endpoint_url);
        let max_attempts = self.policy.max_attempts;

        self.policy
            .run(|attempt| self.attempt(&url, attempt, max_attempts))
            .await
            .unwrap_or_else(|| UNKNOWN_IP.to_string())
    }

    async fn attempt(&self, url: &str, attempt: u32, max_attempts: u32) -> Option<String> {
        debug!("IP probe attempt {}/{}", attempt, max_attempts);
        let last = attempt >= max_attempts;

        let response = match self.transport.send(TransportRequest::get(url)).await {
            Ok(response) => response,
            Err(e) => {
                warn!("IP probe error attempt {}/{}: {}", attempt, max_attempts, e);
                return None;
            }
        };

        if response.status == 200 && !response.body.trim().is_empty() {
            let ip = extract_ip(&response.body);
            if ip.is_none() && last {
                info!(
                    "IP parse failed, body preview: {}",
                    preview(&response.body, BODY_PREVIEW_LEN)
                );
            }
            return ip;
        }

        warn!(
            "IP probe failed status={} attempt {}/{}",
            response.status, attempt, max_attempts
        );
        if last && !response.body.trim().is_empty() {
            info!(
                "IP probe body preview: {}",
                preview(&response.body, BODY_PREVIEW_LEN)
            );
        }
        None
    }

    /// Probe every endpoint with at most `workers` probes in flight.
    ///
    /// Results keep the order of `endpoints`.
    #[instrument(skip(self, endpoints), fields(count = endpoints.len()))]
    pub async fn probe_all(&self, endpoints: &[Endpoint], workers: usize) -> Vec<ProbedEndpoint> {
        if endpoints.is_empty() {
            return Vec::new();
        }
        let workers = workers.max(1).min(endpoints.len());

        futures::stream::iter(endpoints.iter().cloned())
            .map(|endpoint| async move {
                let ip = self.probe(endpoint.url()).await;
                ProbedEndpoint { endpoint, ip }
            })
            .buffered(workers)
            .collect()
            .await
    }
}
