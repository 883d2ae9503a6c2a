//! Gateway configuration.

use std::path::PathBuf;
use std::time::Duration;

use clap::Parser;
use lakeward_core::config::{DEFAULT_CATALOG, DEFAULT_SCHEMA};
use lakeward_core::EngineConfig;

/// Lakeward HTTP/JSON Gateway command line arguments.
#[derive(Debug, Parser)]
#[command(name = "lakeward-gateway")]
#[command(about = "HTTP/JSON Gateway for the lakeward secure query engine")]
pub struct Args {
    /// Address to listen on for HTTP requests.
    #[arg(short, long, default_value = "0.0.0.0:8080")]
    pub listen: String,

    /// Directory of the sled database holding governance state and audit entries.
    #[arg(short, long, default_value = "./lakeward-data")]
    pub data_dir: PathBuf,

    /// SQLite database holding the governed tables. Opened read-only.
    #[arg(short, long, default_value = "./warehouse.db")]
    pub warehouse: PathBuf,

    /// JSON governance seed applied at startup.
    #[arg(long)]
    pub seed: Option<PathBuf>,

    /// Catalog for one- and two-part table references.
    #[arg(long, default_value = DEFAULT_CATALOG)]
    pub default_catalog: String,

    /// Schema for one-part table references.
    #[arg(long, default_value = DEFAULT_SCHEMA)]
    pub default_schema: String,

    /// Lifetime (seconds) of issued manifests.
    #[arg(long, default_value_t = 3600)]
    pub manifest_ttl_secs: u64,

    /// Deadline (ms) for each query. Unlimited when unset.
    #[arg(long)]
    pub query_timeout_ms: Option<u64>,

    /// Base URL for presigned manifest file links.
    #[arg(long, requires = "signing_key")]
    pub file_base_url: Option<String>,

    /// Hex-encoded 32-byte key for signing manifest file links.
    #[arg(long, requires = "file_base_url")]
    pub signing_key: Option<String>,

    /// Audit entries buffered ahead of the audit store.
    #[arg(long, default_value_t = 1024)]
    pub audit_queue_capacity: usize,
}

/// Gateway configuration.
#[derive(Debug, Clone)]
pub struct GatewayConfig {
    /// Address to listen on for HTTP requests.
    pub listen_addr: String,
    /// Sled database directory.
    pub data_dir: PathBuf,
    /// SQLite warehouse path.
    pub warehouse: PathBuf,
    /// Governance seed applied at startup.
    pub seed: Option<PathBuf>,
    /// Engine configuration.
    pub engine: EngineConfig,
    /// Base URL for presigned manifest file links.
    pub file_base_url: Option<String>,
    /// Hex-encoded signing key for manifest file links.
    pub signing_key: Option<String>,
    /// Audit entries buffered ahead of the audit store.
    pub audit_queue_capacity: usize,
}

impl From<&Args> for GatewayConfig {
    fn from(args: &Args) -> Self {
        let mut engine = EngineConfig::new()
            .with_defaults(&args.default_catalog, &args.default_schema)
            .with_manifest_ttl(Duration::from_secs(args.manifest_ttl_secs));
        if let Some(ms) = args.query_timeout_ms {
            engine = engine.with_query_timeout(Duration::from_millis(ms));
        }

        Self {
            listen_addr: args.listen.clone(),
            data_dir: args.data_dir.clone(),
            warehouse: args.warehouse.clone(),
            seed: args.seed.clone(),
            engine,
            file_base_url: args.file_base_url.clone(),
            signing_key: args.signing_key.clone(),
            audit_queue_capacity: args.audit_queue_capacity,
        }
    }
}

impl Default for GatewayConfig {
    fn default() -> Self {
        Self {
            listen_addr: "0.0.0.0:8080".to_string(),
            data_dir: PathBuf::from("./lakeward-data"),
            warehouse: PathBuf::from("./warehouse.db"),
            seed: None,
            engine: EngineConfig::default(),
            file_base_url: None,
            signing_key: None,
            audit_queue_capacity: 1024,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_args_to_config() {
        let args = Args::parse_from([
            "lakeward-gateway",
            "--default-schema",
            "Sales",
            "--query-timeout-ms",
            "2500",
            "--manifest-ttl-secs",
            "60",
        ]);
        let config = GatewayConfig::from(&args);

        assert_eq!(config.engine.default_catalog, "lake");
        assert_eq!(config.engine.default_schema, "sales");
        assert_eq!(config.engine.query_timeout, Some(Duration::from_millis(2500)));
        assert_eq!(config.engine.manifest_ttl, Duration::from_secs(60));
        assert!(config.seed.is_none());
    }

    #[test]
    fn test_signing_options_go_together() {
        let result = Args::try_parse_from([
            "lakeward-gateway",
            "--file-base-url",
            "https://files.example.com",
        ]);
        assert!(result.is_err());
    }
}
