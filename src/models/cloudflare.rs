use serde::Deserialize;

/// Cloudflare API response envelope
///
/// Every field is optional on the wire; the legacy upload path accepts bodies that
/// carry only some of them.
#[derive(Debug, Deserialize)]
pub struct CfEnvelope<T> {
    #[serde(default)]
    pub success: Option<bool>,
    #[serde(default)]
    pub errors: Vec<CfApiError>,
    pub result: Option<T>,
}

#[derive(Debug, Clone, Deserialize, PartialEq, Eq)]
pub struct CfApiError {
    #[serde(default)]
    pub code: i64,
    #[serde(default)]
    pub message: String,
}

impl<T> CfEnvelope<T> {
    /// First `{code, message}` pair, if the platform reported one
    pub fn first_error(&self) -> Option<&CfApiError> {
        self.errors.first()
    }

    pub fn has_error_code(&self, code: i64) -> bool {
        self.errors.iter().any(|e| e.code == code)
    }
}

/// Entry of `GET /accounts/{id}/workers/scripts`
#[derive(Debug, Clone, Deserialize)]
pub struct ScriptSummary {
    pub id: String,
}

/// Result of `GET /accounts/{id}/workers/subdomain`
#[derive(Debug, Clone, Deserialize)]
pub struct WorkersSubdomain {
    pub subdomain: String,
}
