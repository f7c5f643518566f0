//! Cloudflare Workers deployment backend
//!
//! This module provides:
//! - Script templates in module and legacy packaging
//! - multipart upload encoding
//! - The REST client that creates, lists and deletes proxy workers
//! - The HTTP transport capability every outbound call goes through

pub mod client;
pub mod multipart;
pub mod scripts;
pub mod transport;

pub use client::{ClientSettings, CloudflareClient};
pub use multipart::{MultipartBody, ScriptPart};
pub use scripts::ScriptFormat;
pub use transport::{HttpTransport, ReqwestTransport, TransportConfig, TransportError};

use async_trait::async_trait;

use crate::error::Result;
use crate::models::{CleanupSummary, Endpoint};

/// Default REST API base
pub const DEFAULT_API_BASE: &str = "https://api.cloudflare.com/client/v4";

/// Remote platform operations the orchestrator drives
///
/// Implementations only ever report or touch deployments whose names carry
/// [`crate::models::NAME_PREFIX`].
#[async_trait]
pub trait DeploymentBackend: Send + Sync {
    /// Upload a fresh proxy worker and return its public endpoint
    async fn create_deployment(&self) -> Result<Endpoint>;

    /// Post-batch reconciliation hook
    async fn sync_endpoints(&self);

    /// All managed endpoints currently deployed
    async fn list_endpoints(&self) -> Result<Vec<Endpoint>>;

    /// Best-effort delete by script name; failures are logged, never returned.
    /// Needs no subdomain, so it works even when the account's subdomain is unresolvable.
    async fn delete_scripts(&self, names: &[String]);

    /// Best-effort delete of known endpoints
    async fn delete_endpoints(&self, endpoints: &[Endpoint]) {
        let names: Vec<String> = endpoints.iter().map(|e| e.name().to_string()).collect();
        self.delete_scripts(&names).await;
    }

    /// Delete every managed deployment
    async fn cleanup_all(&self) -> Result<CleanupSummary>;
}
