use once_cell::sync::Lazy;
use regex::Regex;
use secrecy::{ExposeSecret, SecretString};

use crate::error::{FlareProxError, Result};

static TOKEN_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^[A-Za-z0-9_-]{20,80}$").expect("valid token pattern"));
static ACCOUNT_ID_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^[A-Fa-f0-9]{32}$").expect("valid account id pattern"));

/// Platform credentials, supplied per process from the environment
#[derive(Clone)]
pub struct Credentials {
    token: SecretString,
    account_id: String,
}

impl Credentials {
    /// Both parts must be present; format is not checked here.
    pub fn new(token: impl Into<String>, account_id: impl Into<String>) -> Result<Self> {
        let token = token.into().trim().to_string();
        let account_id = account_id.into().trim().to_string();

        if token.is_empty() {
            return Err(FlareProxError::NotConfigured(
                "CLOUDFLARE_API_TOKEN is not set".to_string(),
            ));
        }
        if account_id.is_empty() {
            return Err(FlareProxError::NotConfigured(
                "CLOUDFLARE_ACCOUNT_ID is not set".to_string(),
            ));
        }

        Ok(Self {
            token: SecretString::from(token),
            account_id,
        })
    }

    pub fn token(&self) -> &str {
        self.token.expose_secret()
    }

    pub fn account_id(&self) -> &str {
        &self.account_id
    }

    /// Check token and account id against the platform's formats
    pub fn validate_format(&self) -> Result<()> {
        if !TOKEN_RE.is_match(self.token()) {
            return Err(FlareProxError::InvalidCredentials(
                "API token must be 20-80 characters of A-Z, a-z, 0-9, '_' or '-'".to_string(),
            ));
        }
        if !ACCOUNT_ID_RE.is_match(&self.account_id) {
            return Err(FlareProxError::InvalidCredentials(
                "account id must be 32 hexadecimal characters".to_string(),
            ));
        }
        Ok(())
    }
}

impl std::fmt::Debug for Credentials {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Credentials")
            .field("token", &"[REDACTED]")
            .field("account_id", &self.account_id)
            .finish()
    }
}
