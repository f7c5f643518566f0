//! Cloudflare Workers REST client
//!
//! Uploads the proxy worker (module format first, legacy format when the platform
//! rejects the module packaging), enables and resolves the workers.dev subdomain,
//! and lists or deletes managed scripts.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use http::Method;
use parking_lot::RwLock;
use serde_json::Value;
use tracing::{debug, error, info, instrument, warn};

use crate::cloudflare::multipart::{MultipartBody, ScriptPart};
use crate::cloudflare::scripts::ScriptFormat;
use crate::cloudflare::transport::{HttpTransport, TransportError, TransportRequest, TransportResponse};
use crate::cloudflare::{DeploymentBackend, DEFAULT_API_BASE};
use crate::error::{FlareProxError, Result};
use crate::models::{
    generate_name, is_managed_name, CfEnvelope, CleanupSummary, Credentials, Endpoint,
    ScriptSummary, WorkersSubdomain,
};

const USER_AGENT: &str = concat!("flareprox/", env!("CARGO_PKG_VERSION"));

/// Platform error code for a script the runtime could not parse
const SCRIPT_PARSE_ERROR_CODE: i64 = 10021;

const BODY_PREVIEW_LEN: usize = 400;

/// Client tunables
#[derive(Debug, Clone)]
pub struct ClientSettings {
    pub api_base: String,
    pub compatibility_date: String,
    /// Total timeout for script uploads
    pub upload_timeout: Duration,
}

impl Default for ClientSettings {
    fn default() -> Self {
        Self {
            api_base: DEFAULT_API_BASE.to_string(),
            compatibility_date: "2024-07-01".to_string(),
            upload_timeout: Duration::from_secs(30),
        }
    }
}

/// REST client for one account
pub struct CloudflareClient {
    transport: Arc<dyn HttpTransport>,
    credentials: Credentials,
    settings: ClientSettings,
    /// workers.dev subdomain, resolved on first use
    subdomain: RwLock<Option<String>>,
}

impl CloudflareClient {
    pub fn new(
        transport: Arc<dyn HttpTransport>,
        credentials: Credentials,
        settings: ClientSettings,
    ) -> Self {
        Self {
            transport,
            credentials,
            settings,
            subdomain: RwLock::new(None),
        }
    }

    /// Cached subdomain, if one has been resolved
    pub fn cached_subdomain(&self) -> Option<String> {
        self.subdomain.read().clone()
    }

    /// Resolve the account's workers.dev subdomain, caching it for this client
    #[instrument(skip(self))]
    pub async fn resolve_subdomain(&self) -> Result<String> {
        if let Some(subdomain) = self.cached_subdomain() {
            return Ok(subdomain);
        }

        let request = self.request(Method::GET, &self.account_url("/workers/subdomain"));
        let response = self
            .transport
            .send(request)
            .await
            .map_err(|e| FlareProxError::SubdomainResolution(e.to_string()))?;

        info!("Get workers.dev subdomain status={}", response.status);
        if response.status != 200 {
            return Err(FlareProxError::SubdomainResolution(format!(
                "status {}",
                response.status
            )));
        }

        let subdomain = serde_json::from_str::<CfEnvelope<WorkersSubdomain>>(&response.body)
            .ok()
            .and_then(|envelope| envelope.result)
            .map(|result| result.subdomain.trim().to_string())
            .filter(|subdomain| !subdomain.is_empty())
            .ok_or_else(|| {
                warn!(
                    "Could not parse subdomain from body: {}",
                    preview(&response.body, BODY_PREVIEW_LEN)
                );
                FlareProxError::SubdomainResolution("unparseable response body".to_string())
            })?;

        info!("Resolved workers.dev subdomain={}", subdomain);
        *self.subdomain.write() = Some(subdomain.clone());
        Ok(subdomain)
    }

    fn account_url(&self, path: &str) -> String {
        format!(
            "{}/accounts/{}{}",
            self.settings.api_base.trim_end_matches('/'),
            self.credentials.account_id(),
            path
        )
    }

    fn script_url(&self, name: &str) -> String {
        self.account_url(&format!("/workers/scripts/{}", name))
    }

    fn request(&self, method: Method, url: &str) -> TransportRequest {
        TransportRequest::new(method, url)
            .header(
                "Authorization",
                &format!("Bearer {}", self.credentials.token()),
            )
            .header("Accept", "application/json")
            .header("User-Agent", USER_AGENT)
    }

    /// PUT the script in `format`; transport failures carry no response to inspect
    async fn upload(
        &self,
        name: &str,
        format: ScriptFormat,
    ) -> std::result::Result<TransportResponse, TransportError> {
        let metadata = format.metadata(&self.settings.compatibility_date);
        let script = ScriptPart::for_format(format);
        let body = MultipartBody::with_random_boundary(&metadata, &script);

        debug!(
            "Multipart preview boundary={}, body_len={}, metadata_len={}, script_len={}, field={}, content_type={}",
            body.boundary(),
            body.content_length(),
            metadata.len(),
            script.body.len(),
            script.field_name,
            script.content_type
        );

        let request = self
            .request(Method::PUT, &self.script_url(name))
            .header("Content-Type", &body.content_type())
            .timeout(self.settings.upload_timeout)
            .body(body.into_bytes());

        let response = self.transport.send(request).await?;
        info!(
            "Deploy worker ({}) status={}",
            format.as_str(),
            response.status
        );
        if let Some(ray) = response.header("cf-ray") {
            info!("CF-Ray={}", ray);
        }
        Ok(response)
    }

    /// Best-effort: the script stays deployed whatever this returns
    async fn enable_subdomain(&self, name: &str) {
        let request = self
            .request(
                Method::POST,
                &self.account_url(&format!("/workers/scripts/{}/subdomain", name)),
            )
            .header("Content-Type", "application/json")
            .body(r#"{"enabled":true}"#);

        match self.transport.send(request).await {
            Ok(response) => info!("Enable script subdomain status={}", response.status),
            Err(e) => warn!("Enable script subdomain failed for {}: {}", name, e),
        }
    }

    /// Managed script names in listing order
    async fn managed_script_names(&self) -> std::result::Result<Vec<String>, String> {
        let request = self.request(Method::GET, &self.account_url("/workers/scripts"));
        let response = self.transport.send(request).await.map_err(|e| e.to_string())?;

        info!("List workers status={}", response.status);
        if response.status != 200 {
            return Err(format!("status {}", response.status));
        }

        let envelope: CfEnvelope<Vec<ScriptSummary>> = serde_json::from_str(&response.body)
            .map_err(|e| format!("unparseable listing: {}", e))?;

        Ok(envelope
            .result
            .unwrap_or_default()
            .into_iter()
            .map(|script| script.id)
            .filter(|id| is_managed_name(id))
            .collect())
    }

    /// DELETE one script; true only on 2xx with `"success": true`
    async fn delete_script(&self, name: &str) -> bool {
        let request = self.request(Method::DELETE, &self.script_url(name));
        match self.transport.send(request).await {
            Ok(response) => {
                let ok = response.is_success()
                    && parse_envelope(&response.body)
                        .map(|envelope| envelope.success == Some(true))
                        .unwrap_or(false);
                info!(
                    "Delete {} status={} success={}",
                    name, response.status, ok
                );
                ok
            }
            Err(e) => {
                warn!("Delete failed for {}: {}", name, e);
                false
            }
        }
    }
}

#[async_trait]
impl DeploymentBackend for CloudflareClient {
    #[instrument(skip(self))]
    async fn create_deployment(&self) -> Result<Endpoint> {
        let name = generate_name();

        let response = self
            .upload(&name, ScriptFormat::Module)
            .await
            .map_err(FlareProxError::deployment_transport)?;

        if !is_module_success(&response) {
            log_upload_failure(&response, ScriptFormat::Module);

            if !is_format_rejection(&response) {
                error!(
                    "Create worker failed body={}",
                    preview(&response.body, BODY_PREVIEW_LEN)
                );
                return Err(deployment_failure(&response));
            }

            warn!("Module upload rejected for {}, retrying with legacy format", name);
            let fallback = self
                .upload(&name, ScriptFormat::Legacy)
                .await
                .map_err(FlareProxError::deployment_transport)?;

            if !is_legacy_success(&fallback) {
                log_upload_failure(&fallback, ScriptFormat::Legacy);
                error!(
                    "Create worker failed body={}",
                    preview(&fallback.body, BODY_PREVIEW_LEN)
                );
                return Err(deployment_failure(&fallback));
            }
        }

        self.enable_subdomain(&name).await;

        let subdomain = self.resolve_subdomain().await?;
        Endpoint::new(name, &subdomain)
    }

    async fn sync_endpoints(&self) {
        info!("Syncing endpoints to Cloudflare");
    }

    #[instrument(skip(self))]
    async fn list_endpoints(&self) -> Result<Vec<Endpoint>> {
        let names = self
            .managed_script_names()
            .await
            .map_err(FlareProxError::ListFailed)?;
        let subdomain = self.resolve_subdomain().await?;

        names
            .into_iter()
            .map(|name| Endpoint::new(name, &subdomain))
            .collect()
    }

    #[instrument(skip(self, names), fields(count = names.len()))]
    async fn delete_scripts(&self, names: &[String]) {
        if names.is_empty() {
            info!("No endpoints to delete");
            return;
        }

        for name in names {
            if !is_managed_name(name) {
                warn!("Refusing to delete unmanaged script {}", name);
                continue;
            }
            self.delete_script(name).await;
        }
    }

    #[instrument(skip(self))]
    async fn cleanup_all(&self) -> Result<CleanupSummary> {
        let names = self
            .managed_script_names()
            .await
            .map_err(FlareProxError::CleanupFailed)?;

        let mut summary = CleanupSummary {
            deleted: 0,
            total: names.len(),
        };
        for name in &names {
            if self.delete_script(name).await {
                summary.deleted += 1;
            }
        }

        info!(
            "Cloudflare Workers cleanup completed: {}/{}",
            summary.deleted, summary.total
        );
        Ok(summary)
    }
}

fn parse_envelope(body: &str) -> Option<CfEnvelope<Value>> {
    serde_json::from_str(body).ok()
}

fn is_module_success(response: &TransportResponse) -> bool {
    response.is_success()
        && parse_envelope(&response.body)
            .map(|envelope| envelope.success == Some(true))
            .unwrap_or(false)
}

/// Looser than the module check: a 2xx without an explicit failure marker counts.
fn is_legacy_success(response: &TransportResponse) -> bool {
    if !response.is_success() {
        return false;
    }
    match parse_envelope(&response.body) {
        Some(envelope) => {
            envelope.success == Some(true)
                || (envelope.success != Some(false) && envelope.errors.is_empty())
                || envelope.result.as_ref().map_or(false, |r| !r.is_null())
        }
        None => true,
    }
}

/// Signals that the platform refused the module packaging rather than the script
fn is_format_rejection(response: &TransportResponse) -> bool {
    let body = &response.body;
    let envelope = parse_envelope(body);

    body.contains("Unexpected token 'export'")
        || envelope
            .as_ref()
            .map_or(false, |e| e.has_error_code(SCRIPT_PARSE_ERROR_CODE))
        || response.status == 415
        || (response.status == 400 && body.contains("\"errors\""))
        || body.to_lowercase().contains("unsupported media")
        || body.contains("main_module")
}

fn deployment_failure(response: &TransportResponse) -> FlareProxError {
    let detail = parse_envelope(&response.body).and_then(|e| e.first_error().cloned());
    FlareProxError::DeploymentFailed {
        status: Some(response.status),
        code: detail.as_ref().map(|d| d.code),
        message: detail.map(|d| d.message),
    }
}

fn log_upload_failure(response: &TransportResponse, format: ScriptFormat) {
    match response.status {
        401 | 403 => error!(
            "Auth error: verify API token scope 'Edit Cloudflare Workers' and account id"
        ),
        429 => error!("Rate limited (429). Retry later"),
        status if status >= 500 => error!("Cloudflare service error {}", status),
        _ => {}
    }

    match parse_envelope(&response.body).and_then(|e| e.first_error().cloned()) {
        Some(detail) => error!(
            "Upload ({}) error detail: code={}, message={}, status={}",
            format.as_str(),
            detail.code,
            detail.message,
            response.status
        ),
        None => info!(
            "Upload ({}) response body: {}",
            format.as_str(),
            preview(&response.body, BODY_PREVIEW_LEN)
        ),
    }
}

/// First `max` characters of `body`, with an ellipsis when cut
pub(crate) fn preview(body: &str, max: usize) -> String {
    match body.char_indices().nth(max) {
        Some((idx, _)) => format!("{}...", &body[..idx]),
        None => body.to_string(),
    }
}
