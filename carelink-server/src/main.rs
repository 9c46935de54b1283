use anyhow::Context;
use carelink_core::auth::{SigningKey, TokenCodec};
use carelink_engine::{ClinicStore, StorageEngine};
use carelink_server::{bootstrap_admin, AppState, CarelinkServer, LogFormat, ServerConfig};
use std::sync::Arc;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let config = ServerConfig::from_env()?;
    init_tracing(config.log_format);

    info!(bind = %config.bind, data_dir = %config.data_dir.display(), "starting carelink server");

    if !config.data_dir.exists() {
        std::fs::create_dir_all(&config.data_dir)
            .with_context(|| format!("creating data directory {}", config.data_dir.display()))?;
        info!(data_dir = %config.data_dir.display(), "created data directory");
    }

    let engine = StorageEngine::new(&config.data_dir).context("opening storage engine")?;
    let store = Arc::new(ClinicStore::open(engine).context("opening clinic store")?);

    if let Some(admin) = &config.bootstrap_admin {
        if !bootstrap_admin(&store, admin).context("creating bootstrap admin")? {
            info!("bootstrap admin already present");
        }
    }

    let key = SigningKey::from_bytes(&config.jwt_secret).context("loading signing key")?;
    let codec = Arc::new(TokenCodec::new(key, config.token_ttl));
    info!(token_ttl_secs = codec.ttl().as_secs(), "token codec ready");
    let state = Arc::new(AppState::new(store, codec).context("building route table")?);

    let shutdown = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            warn!(error = %e, "failed to listen for shutdown signal");
            std::future::pending::<()>().await;
        }
    };

    CarelinkServer::new(state)
        .serve(config.bind, shutdown)
        .await
        .context("server error")?;

    info!("server shut down");
    Ok(())
}

fn init_tracing(format: LogFormat) {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    let builder = tracing_subscriber::fmt().with_env_filter(filter);
    match format {
        LogFormat::Json => builder.json().init(),
        LogFormat::Text => builder.init(),
    }
}
