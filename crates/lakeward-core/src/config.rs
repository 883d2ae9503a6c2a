//! Engine configuration.

use std::time::Duration;

/// Catalog used when a table reference names neither catalog nor schema.
pub const DEFAULT_CATALOG: &str = "lake";

/// Schema used when a table reference names no schema.
pub const DEFAULT_SCHEMA: &str = "main";

/// Configuration for [`SecureQueryEngine`](crate::engine::SecureQueryEngine).
#[derive(Debug, Clone)]
pub struct EngineConfig {
    /// Catalog applied to one- and two-part table references.
    pub default_catalog: String,
    /// Schema applied to one-part table references.
    pub default_schema: String,
    /// Lifetime of issued manifests and their presigned URLs.
    pub manifest_ttl: Duration,
    /// Deadline applied to `execute` when the caller supplies none.
    pub query_timeout: Option<Duration>,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            default_catalog: DEFAULT_CATALOG.to_string(),
            default_schema: DEFAULT_SCHEMA.to_string(),
            manifest_ttl: Duration::from_secs(3600),
            query_timeout: None,
        }
    }
}

impl EngineConfig {
    /// Create a configuration with defaults.
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the default catalog and schema.
    pub fn with_defaults(mut self, catalog: impl Into<String>, schema: impl Into<String>) -> Self {
        self.default_catalog = catalog.into().to_lowercase();
        self.default_schema = schema.into().to_lowercase();
        self
    }

    /// Set the manifest lifetime.
    pub fn with_manifest_ttl(mut self, ttl: Duration) -> Self {
        self.manifest_ttl = ttl;
        self
    }

    /// Set the default query deadline.
    pub fn with_query_timeout(mut self, timeout: Duration) -> Self {
        self.query_timeout = Some(timeout);
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = EngineConfig::default();
        assert_eq!(config.default_catalog, "lake");
        assert_eq!(config.default_schema, "main");
        assert_eq!(config.manifest_ttl, Duration::from_secs(3600));
        assert!(config.query_timeout.is_none());
    }

    #[test]
    fn test_builder() {
        let config = EngineConfig::new()
            .with_defaults("Prod", "Sales")
            .with_manifest_ttl(Duration::from_secs(60))
            .with_query_timeout(Duration::from_millis(500));
        assert_eq!(config.default_catalog, "prod");
        assert_eq!(config.default_schema, "sales");
        assert_eq!(config.manifest_ttl, Duration::from_secs(60));
        assert_eq!(config.query_timeout, Some(Duration::from_millis(500)));
    }
}
