use uuid::Uuid;

use crate::error::{FlareProxError, Result};

/// Prefix every managed deployment name carries
pub const NAME_PREFIX: &str = "flareprox-";

/// Length of the random suffix after [`NAME_PREFIX`]
pub const NAME_ID_LEN: usize = 8;

/// A live proxy endpoint. The URL is always derived from the name and subdomain.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Endpoint {
    name: String,
    url: String,
}

impl Endpoint {
    /// Build an endpoint for `name` under the account's workers.dev `subdomain`.
    ///
    /// Names without [`NAME_PREFIX`] are refused so foreign deployments can never be targeted.
    pub fn new(name: impl Into<String>, subdomain: &str) -> Result<Self> {
        let name = name.into();
        if !is_managed_name(&name) {
            return Err(FlareProxError::InvalidRequest(format!(
                "{} is not a managed deployment name",
                name
            )));
        }
        if subdomain.trim().is_empty() {
            return Err(FlareProxError::SubdomainResolution(
                "empty subdomain".to_string(),
            ));
        }

        let url = format!("https://{}.{}.workers.dev", name, subdomain.trim());
        Ok(Self { name, url })
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn url(&self) -> &str {
        &self.url
    }
}

impl std::fmt::Display for Endpoint {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{} -> {}", self.name, self.url)
    }
}

/// Whether a deployment name belongs to this tool
pub fn is_managed_name(name: &str) -> bool {
    name.strip_prefix(NAME_PREFIX)
        .map(|id| !id.is_empty())
        .unwrap_or(false)
}

/// Generate a fresh deployment name: prefix plus 8 random hex characters
pub fn generate_name() -> String {
    let id = Uuid::new_v4().simple().to_string();
    format!("{}{}", NAME_PREFIX, &id[..NAME_ID_LEN])
}

/// Outcome of one batch create
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DeploymentResult {
    pub created: Vec<Endpoint>,
    pub failed: usize,
}

impl DeploymentResult {
    /// Number of attempts this result accounts for
    pub fn attempted(&self) -> usize {
        self.created.len() + self.failed
    }
}

/// Counts reported by a full cleanup
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CleanupSummary {
    pub deleted: usize,
    pub total: usize,
}

/// Endpoint paired with the egress IP observed through it
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProbedEndpoint {
    pub endpoint: Endpoint,
    pub ip: String,
}

impl std::fmt::Display for ProbedEndpoint {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{} [IP: {}]", self.endpoint, self.ip)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_endpoint_url_is_derived() {
        let endpoint = Endpoint::new("flareprox-ab12cd34", "acme").unwrap();
        assert_eq!(endpoint.name(), "flareprox-ab12cd34");
        assert_eq!(endpoint.url(), "https://flareprox-ab12cd34.acme.workers.dev");
        assert_eq!(
            endpoint.to_string(),
            "flareprox-ab12cd34 -> https://flareprox-ab12cd34.acme.workers.dev"
        );
    }

    #[test]
    fn test_endpoint_rejects_foreign_names() {
        assert!(Endpoint::new("other-script", "acme").is_err());
        assert!(Endpoint::new("flareprox-", "acme").is_err());
    }

    #[test]
    fn test_endpoint_rejects_empty_subdomain() {
        let err = Endpoint::new("flareprox-ab12cd34", " ").unwrap_err();
        assert!(matches!(err, FlareProxError::SubdomainResolution(_)));
    }

    #[test]
    fn test_generate_name_shape() {
        let name = generate_name();
        assert!(name.starts_with(NAME_PREFIX));
        let id = &name[NAME_PREFIX.len()..];
        assert_eq!(id.len(), NAME_ID_LEN);
        assert!(id.chars().all(|c| c.is_ascii_alphanumeric()));
        assert_ne!(generate_name(), generate_name());
    }

    #[test]
    fn test_is_managed_name() {
        assert!(is_managed_name("flareprox-ab12cd34"));
        assert!(!is_managed_name("flareprox"));
        assert!(!is_managed_name("my-flareprox-ab12cd34"));
    }
}
