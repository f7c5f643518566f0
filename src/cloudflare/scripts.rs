//! Worker script templates
//!
//! Both bodies implement the same reverse-proxy contract; they differ only in how the
//! platform expects the script to be packaged.

use serde_json::json;

const MODULE_SCRIPT: &str = include_str!("templates/module.js");
const LEGACY_SCRIPT: &str = include_str!("templates/legacy.js");

/// Script packaging format
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ScriptFormat {
    /// ES module with a default `fetch` export
    #[default]
    Module,
    /// Service-worker style global `fetch` event listener
    Legacy,
}

impl ScriptFormat {
    pub fn as_str(&self) -> &'static str {
        match self {
            ScriptFormat::Module => "module",
            ScriptFormat::Legacy => "legacy",
        }
    }

    pub fn script(&self) -> &'static str {
        match self {
            ScriptFormat::Module => MODULE_SCRIPT,
            ScriptFormat::Legacy => LEGACY_SCRIPT,
        }
    }

    /// Multipart field name carrying the script part
    pub fn field_name(&self) -> &'static str {
        match self {
            ScriptFormat::Module => "worker.js",
            ScriptFormat::Legacy => "script",
        }
    }

    pub fn filename(&self) -> &'static str {
        "worker.js"
    }

    pub fn content_type(&self) -> &'static str {
        match self {
            ScriptFormat::Module => "application/javascript+module",
            ScriptFormat::Legacy => "application/javascript",
        }
    }

    /// Upload metadata JSON for this format
    pub fn metadata(&self, compatibility_date: &str) -> String {
        let value = match self {
            ScriptFormat::Module => json!({
                "main_module": self.field_name(),
                "compatibility_date": compatibility_date,
            }),
            ScriptFormat::Legacy => json!({
                "body_part": self.field_name(),
                "compatibility_date": compatibility_date,
            }),
        };
        value.to_string()
    }

    /// Whether the deployed script forwards only allow-listed request headers
    pub fn restricts_headers(&self) -> bool {
        matches!(self, ScriptFormat::Module)
    }
}

impl std::fmt::Display for ScriptFormat {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::Value;

    #[test]
    fn test_module_metadata_names_main_module() {
        let metadata: Value =
            serde_json::from_str(&ScriptFormat::Module.metadata("2024-07-01")).unwrap();
        assert_eq!(metadata["main_module"], "worker.js");
        assert_eq!(metadata["compatibility_date"], "2024-07-01");
        assert!(metadata.get("body_part").is_none());
    }

    #[test]
    fn test_legacy_metadata_names_body_part() {
        let metadata: Value =
            serde_json::from_str(&ScriptFormat::Legacy.metadata("2024-07-01")).unwrap();
        assert_eq!(metadata["body_part"], "script");
        assert!(metadata.get("main_module").is_none());
    }

    #[test]
    fn test_field_names_differ_between_formats() {
        assert_eq!(ScriptFormat::Module.field_name(), "worker.js");
        assert_eq!(ScriptFormat::Legacy.field_name(), "script");
        assert_eq!(ScriptFormat::Legacy.filename(), "worker.js");
    }

    #[test]
    fn test_scripts_use_their_packaging() {
        let module = ScriptFormat::Module.script();
        assert!(module.contains("export default"));
        assert!(!module.contains("addEventListener('fetch'"));

        let legacy = ScriptFormat::Legacy.script();
        assert!(legacy.contains("addEventListener('fetch'"));
        assert!(!legacy.contains("export default"));
    }

    #[test]
    fn test_scripts_share_the_proxy_contract() {
        for format in [ScriptFormat::Module, ScriptFormat::Legacy] {
            let script = format.script();
            assert!(script.contains("X-Target-URL"), "{}", format);
            assert!(script.contains("'url', '_cb', '_t'"), "{}", format);
            assert!(script.contains("for=\"0.0.0.0\";proto="), "{}", format);
            assert!(
                script.contains("GET, POST, PUT, DELETE, OPTIONS, PATCH, HEAD"),
                "{}",
                format
            );
            assert!(script.contains("status: 204"), "{}", format);
        }
        assert!(ScriptFormat::Module.script().contains("ALLOWED_HEADERS"));
        assert!(!ScriptFormat::Legacy.script().contains("ALLOWED_HEADERS"));
    }
}
