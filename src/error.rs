use hyper::StatusCode;
use thiserror::Error;

use crate::cloudflare::transport::TransportError;

/// Unified error type for FlareProx operations
#[derive(Error, Debug)]
pub enum FlareProxError {
    // Configuration errors
    #[error("Not configured: {0}")]
    NotConfigured(String),

    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    #[error("Invalid credentials: {0}")]
    InvalidCredentials(String),

    // Platform errors
    #[error("Deployment failed: {}", describe_failure(*.status, *.code, .message.as_deref()))]
    DeploymentFailed {
        status: Option<u16>,
        code: Option<i64>,
        message: Option<String>,
    },

    #[error("Unable to resolve workers.dev subdomain: {0}")]
    SubdomainResolution(String),

    #[error("List workers failed: {0}")]
    ListFailed(String),

    #[error("Cleanup failed: {0}")]
    CleanupFailed(String),

    // Request errors
    #[error("Invalid request: {0}")]
    InvalidRequest(String),

    #[error("Transport error: {0}")]
    Transport(#[from] TransportError),

    // I/O errors
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    // HTTP errors
    #[error("HTTP error: {0}")]
    Http(String),
}

/// Result type alias for FlareProx operations
pub type Result<T> = std::result::Result<T, FlareProxError>;

fn describe_failure(status: Option<u16>, code: Option<i64>, message: Option<&str>) -> String {
    let mut out = match status {
        Some(status) => format!("status={}", status),
        None => "no response".to_string(),
    };
    if let Some(code) = code {
        out.push_str(&format!(", code={}", code));
    }
    if let Some(message) = message {
        out.push_str(&format!(", message={}", message));
    }
    out
}

impl FlareProxError {
    /// Build a deployment failure from a transport error (no HTTP status available)
    pub fn deployment_transport(err: TransportError) -> Self {
        FlareProxError::DeploymentFailed {
            status: None,
            code: None,
            message: Some(err.to_string()),
        }
    }

    /// Errors the user fixes locally (credentials, settings) rather than on the platform
    pub fn is_configuration_error(&self) -> bool {
        matches!(
            self,
            FlareProxError::NotConfigured(_)
                | FlareProxError::InvalidConfig(_)
                | FlareProxError::InvalidCredentials(_)
        )
    }

    /// Errors reported by, or on the way to, the remote platform
    pub fn is_remote_error(&self) -> bool {
        matches!(
            self,
            FlareProxError::DeploymentFailed { .. }
                | FlareProxError::SubdomainResolution(_)
                | FlareProxError::ListFailed(_)
                | FlareProxError::CleanupFailed(_)
                | FlareProxError::Transport(_)
        )
    }

    /// HTTP status the local worker emulator answers with for this error
    pub fn status_code(&self) -> StatusCode {
        match self {
            FlareProxError::InvalidRequest(_) => StatusCode::BAD_REQUEST,

            FlareProxError::Transport(TransportError::Timeout(_)) => StatusCode::GATEWAY_TIMEOUT,

            FlareProxError::Transport(_) | FlareProxError::Http(_) => StatusCode::BAD_GATEWAY,

            _ => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl From<hyper::Error> for FlareProxError {
    fn from(err: hyper::Error) -> Self {
        FlareProxError::Http(err.to_string())
    }
}

impl From<url::ParseError> for FlareProxError {
    fn from(err: url::ParseError) -> Self {
        FlareProxError::InvalidRequest(err.to_string())
    }
}
