//! Lakeward HTTP/JSON Gateway binary.

use std::sync::Arc;

use clap::Parser;
use lakeward_core::{
    AuditWriter, AuditWriterConfig, FilePresigner, GovernanceSeed, PassthroughPresigner,
    SecureQueryEngine, SignedUrlPresigner, SledAuditSink, SledGovernanceStore, SqliteExecutor,
};
use lakeward_gateway::{create_router, AppState, Args, GatewayConfig};
use tracing::info;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Initialize tracing
    tracing_subscriber::registry()
        .with(tracing_subscriber::fmt::layer())
        .with(tracing_subscriber::EnvFilter::from_default_env())
        .init();

    // Parse command line args
    let args = Args::parse();
    let config = GatewayConfig::from(&args);

    info!(
        listen = %config.listen_addr,
        data_dir = %config.data_dir.display(),
        warehouse = %config.warehouse.display(),
        "Starting lakeward gateway"
    );

    // Governance state and audit trail share one sled database
    let db = sled::open(&config.data_dir)?;
    let store = Arc::new(SledGovernanceStore::open(&db)?);

    if let Some(path) = &config.seed {
        let summary = GovernanceSeed::from_path(path)?.apply(&store, "lakeward-gateway")?;
        info!(
            seed = %path.display(),
            principals = summary.principals,
            tables = summary.tables,
            grants = summary.grants,
            row_filters = summary.row_filters,
            column_masks = summary.column_masks,
            "Applied governance seed"
        );
    }

    let executor = Arc::new(SqliteExecutor::open_read_only(&config.warehouse)?);

    let audit_sink = Arc::new(SledAuditSink::open(&db)?);
    let audit = Arc::new(AuditWriter::start(
        audit_sink,
        AuditWriterConfig {
            queue_capacity: config.audit_queue_capacity,
        },
    )?);

    let presigner: Arc<dyn FilePresigner> = match (&config.file_base_url, &config.signing_key) {
        (Some(base_url), Some(key)) => {
            Arc::new(SignedUrlPresigner::from_hex_key(base_url.clone(), key)?)
        }
        (None, None) => Arc::new(PassthroughPresigner),
        _ => anyhow::bail!("--file-base-url and --signing-key must be set together"),
    };

    let engine = SecureQueryEngine::new(store.clone(), executor)
        .with_config(config.engine.clone())
        .with_audit_sink(audit.clone())
        .with_presigner(presigner);

    // Create application state and router
    let state = AppState::new(engine, config.clone());
    let app = create_router(state);

    // Start server
    let listener = tokio::net::TcpListener::bind(&config.listen_addr).await?;
    info!("Gateway listening on {}", config.listen_addr);

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    info!(dropped = audit.dropped(), "Draining audit queue");
    audit.stop();
    store.flush()?;

    Ok(())
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::warn!(error = %e, "failed to listen for shutdown signal");
    }
}
