//! multipart/form-data encoding for script uploads
//!
//! The platform parses this body strictly: CRLF line endings, metadata part first,
//! no header folding and nothing after the closing boundary.

use bytes::Bytes;
use rand::Rng;

use crate::cloudflare::scripts::ScriptFormat;

const BOUNDARY_PREFIX: &str = "----FlareProxBoundary";

/// The script part of an upload
#[derive(Debug, Clone, Copy)]
pub struct ScriptPart<'a> {
    pub field_name: &'a str,
    pub filename: &'a str,
    pub content_type: &'a str,
    pub body: &'a str,
}

impl ScriptPart<'static> {
    /// Script part for a packaging format's bundled template
    pub fn for_format(format: ScriptFormat) -> Self {
        Self {
            field_name: format.field_name(),
            filename: format.filename(),
            content_type: format.content_type(),
            body: format.script(),
        }
    }
}

/// Encoded two-part upload body
#[derive(Debug, Clone)]
pub struct MultipartBody {
    boundary: String,
    body: String,
}

impl MultipartBody {
    /// Encode `metadata` and `script` with an explicit boundary
    pub fn encode(boundary: &str, metadata: &str, script: &ScriptPart<'_>) -> Self {
        let mut body = String::with_capacity(metadata.len() + script.body.len() + 256);

        body.push_str(&format!("--{}\r\n", boundary));
        body.push_str("Content-Disposition: form-data; name=\"metadata\"\r\n");
        body.push_str("Content-Type: application/json\r\n\r\n");
        body.push_str(metadata);
        body.push_str("\r\n");

        body.push_str(&format!("--{}\r\n", boundary));
        body.push_str(&format!(
            "Content-Disposition: form-data; name=\"{}\"; filename=\"{}\"\r\n",
            script.field_name, script.filename
        ));
        body.push_str(&format!("Content-Type: {}\r\n\r\n", script.content_type));
        body.push_str(script.body);
        body.push_str("\r\n");

        body.push_str(&format!("--{}--\r\n", boundary));

        Self {
            boundary: boundary.to_string(),
            body,
        }
    }

    /// Encode with a freshly generated boundary
    pub fn with_random_boundary(metadata: &str, script: &ScriptPart<'_>) -> Self {
        Self::encode(&random_boundary(), metadata, script)
    }

    pub fn boundary(&self) -> &str {
        &self.boundary
    }

    /// Value for the request's `Content-Type` header
    pub fn content_type(&self) -> String {
        format!("multipart/form-data; boundary={}", self.boundary)
    }

    pub fn as_str(&self) -> &str {
        &self.body
    }

    /// Encoded size in bytes
    pub fn content_length(&self) -> usize {
        self.body.len()
    }

    pub fn into_bytes(self) -> Bytes {
        Bytes::from(self.body)
    }
}

fn random_boundary() -> String {
    let token: u128 = rand::thread_rng().gen();
    format!("{}{:032x}", BOUNDARY_PREFIX, token)
}
