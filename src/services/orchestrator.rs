//! Endpoint lifecycle orchestration
//!
//! Drives batch creation against a [`DeploymentBackend`] and aggregates per-item outcomes.
//! Creation is strictly sequential to stay under platform rate limits.

use std::sync::Arc;

use tracing::{info, instrument, warn};

use crate::cloudflare::DeploymentBackend;
use crate::error::{FlareProxError, Result};
use crate::models::{CleanupSummary, DeploymentResult, Endpoint};

/// Endpoint lifecycle orchestrator
///
/// `FlareProx::default()` has no backend bound; every operation then fails with `NotConfigured`.
#[derive(Clone, Default)]
pub struct FlareProx {
    backend: Option<Arc<dyn DeploymentBackend>>,
}

impl FlareProx {
    pub fn new(backend: Arc<dyn DeploymentBackend>) -> Self {
        Self {
            backend: Some(backend),
        }
    }

    fn backend(&self) -> Result<&Arc<dyn DeploymentBackend>> {
        self.backend
            .as_ref()
            .ok_or_else(|| FlareProxError::NotConfigured("FlareProx not configured".to_string()))
    }

    /// Create `count` endpoints one after another.
    ///
    /// A failed attempt is counted and the batch continues, so
    /// `created.len() + failed == count` always holds.
    #[instrument(skip(self))]
    pub async fn create_proxies(&self, count: usize) -> Result<DeploymentResult> {
        let backend = self.backend()?;

        info!(
            "Creating {} FlareProx endpoint{}",
            count,
            if count == 1 { "" } else { "s" }
        );

        let mut result = DeploymentResult::default();
        for i in 1..=count {
            match backend.create_deployment().await {
                Ok(endpoint) => {
                    info!("[{}/{}] {}", i, count, endpoint);
                    result.created.push(endpoint);
                }
                Err(e) => {
                    warn!("Failed to create endpoint {}: {}", i, e);
                    result.failed += 1;
                }
            }
        }

        backend.sync_endpoints().await;
        debug_assert_eq!(result.attempted(), count);

        info!("Created: {}, Failed: {}", result.created.len(), result.failed);
        Ok(result)
    }

    pub async fn list_endpoints(&self) -> Result<Vec<Endpoint>> {
        self.backend()?.list_endpoints().await
    }

    /// Best-effort; per-item failures are only logged
    pub async fn delete_endpoints(&self, endpoints: &[Endpoint]) -> Result<()> {
        self.backend()?.delete_endpoints(endpoints).await;
        Ok(())
    }

    /// Best-effort delete by script name, without listing or resolving the subdomain
    pub async fn delete_by_name(&self, names: &[String]) -> Result<()> {
        self.backend()?.delete_scripts(names).await;
        Ok(())
    }

    pub async fn cleanup_all(&self) -> Result<CleanupSummary> {
        self.backend()?.cleanup_all().await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use parking_lot::Mutex;

    /// Backend whose create attempts follow a fixed script of outcomes
    #[derive(Default)]
    struct FakeBackend {
        failing_attempts: Vec<usize>,
        attempts: Mutex<usize>,
        syncs: Mutex<usize>,
        deleted: Mutex<Vec<String>>,
    }

    impl FakeBackend {
        fn failing_on(attempts: &[usize]) -> Self {
            Self {
                failing_attempts: attempts.to_vec(),
                ..Self::default()
            }
        }
    }

    #[async_trait]
    impl DeploymentBackend for FakeBackend {
        async fn create_deployment(&self) -> Result<Endpoint> {
            let attempt = {
                let mut attempts = self.attempts.lock();
                *attempts += 1;
                *attempts
            };
            if self.failing_attempts.contains(&attempt) {
                return Err(FlareProxError::DeploymentFailed {
                    status: Some(400),
                    code: Some(10021),
                    message: Some("rejected".to_string()),
                });
            }
            Endpoint::new(format!("flareprox-{:08x}", attempt), "acme")
        }

        async fn sync_endpoints(&self) {
            *self.syncs.lock() += 1;
        }

        async fn list_endpoints(&self) -> Result<Vec<Endpoint>> {
            Err(FlareProxError::ListFailed("status 500".to_string()))
        }

        async fn delete_scripts(&self, names: &[String]) {
            self.deleted.lock().extend(names.iter().cloned());
        }

        async fn cleanup_all(&self) -> Result<CleanupSummary> {
            Ok(CleanupSummary { deleted: 2, total: 3 })
        }
    }

    #[tokio::test]
    async fn test_create_proxies_isolates_failures() {
        let backend = Arc::new(FakeBackend::failing_on(&[2]));
        let flareprox = FlareProx::new(backend.clone());

        let result = flareprox.create_proxies(3).await.unwrap();

        assert_eq!(result.created.len(), 2);
        assert_eq!(result.failed, 1);
        assert_eq!(result.created[0].name(), "flareprox-00000001");
        assert_eq!(result.created[1].name(), "flareprox-00000003");
        assert_eq!(*backend.syncs.lock(), 1);
    }

    #[tokio::test]
    async fn test_create_proxies_count_invariant() {
        for count in 0..6 {
            let backend = Arc::new(FakeBackend::failing_on(&[1, 4, 5]));
            let result = FlareProx::new(backend.clone())
                .create_proxies(count)
                .await
                .unwrap();

            assert_eq!(result.attempted(), count);
            assert_eq!(*backend.attempts.lock(), count);
            assert_eq!(*backend.syncs.lock(), 1);
        }
    }

    #[tokio::test]
    async fn test_create_proxies_all_failed_still_syncs() {
        let backend = Arc::new(FakeBackend::failing_on(&[1, 2]));
        let result = FlareProx::new(backend.clone()).create_proxies(2).await.unwrap();

        assert!(result.created.is_empty());
        assert_eq!(result.failed, 2);
        assert_eq!(*backend.syncs.lock(), 1);
    }

    #[tokio::test]
    async fn test_unconfigured_fails_fast() {
        let flareprox = FlareProx::default();

        assert!(matches!(
            flareprox.create_proxies(3).await.unwrap_err(),
            FlareProxError::NotConfigured(_)
        ));
        assert!(matches!(
            flareprox.list_endpoints().await.unwrap_err(),
            FlareProxError::NotConfigured(_)
        ));
        assert!(flareprox.cleanup_all().await.is_err());
        assert!(flareprox.delete_endpoints(&[]).await.is_err());
        assert!(flareprox.delete_by_name(&[]).await.is_err());
    }

    #[tokio::test]
    async fn test_delegates_list_delete_cleanup() {
        let backend = Arc::new(FakeBackend::default());
        let flareprox = FlareProx::new(backend.clone());

        assert!(matches!(
            flareprox.list_endpoints().await.unwrap_err(),
            FlareProxError::ListFailed(_)
        ));

        let endpoint = Endpoint::new("flareprox-ab12cd34", "acme").unwrap();
        flareprox.delete_endpoints(&[endpoint]).await.unwrap();
        assert_eq!(*backend.deleted.lock(), vec!["flareprox-ab12cd34".to_string()]);

        flareprox
            .delete_by_name(&["flareprox-ef56ab78".to_string()])
            .await
            .unwrap();
        assert_eq!(
            *backend.deleted.lock(),
            vec!["flareprox-ab12cd34".to_string(), "flareprox-ef56ab78".to_string()]
        );

        assert_eq!(
            flareprox.cleanup_all().await.unwrap(),
            CleanupSummary { deleted: 2, total: 3 }
        );
    }
}
