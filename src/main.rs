use anyhow::Result;
use axum::Router;
use metabase::{
    adapters::{Adapter, PostgresAdapter, SqliteAdapter},
    config::AppConfig,
    routes,
    services::{metabase::Metabase, retry::RetryPolicy},
    state::{AppState, cancel_on_signal},
};
use std::{io::ErrorKind, path::Path, sync::Arc};
use tokio::net::TcpListener;
use tokio_util::sync::CancellationToken;
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> Result<()> {
    // --- Logging setup ---
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .init();

    // --- Parse config + migrate flag ---
    let (cfg, migrate) = AppConfig::from_env_and_args()?;

    tracing::info!("Starting metabase with config: {:?}", cfg);

    // --- Open the metadata backend ---
    let Some(adapter) = open_adapter(&cfg, migrate).await? else {
        tracing::info!("Database migration complete.");
        return Ok(()); // exit after migration
    };

    // --- Initialize core service ---
    let retry = RetryPolicy::default().with_max_attempts(cfg.retry_max_attempts);
    let metabase = Metabase::new(adapter, retry);
    let shutdown = CancellationToken::new();
    let state = AppState::new(metabase, shutdown.clone(), cfg.list_batch_size);

    // --- Build router ---
    let app: Router = routes::routes::routes().with_state(state);

    // --- Start server ---
    let addr = cfg.addr();
    let listener = match TcpListener::bind(&addr).await {
        Ok(listener) => listener,
        Err(err)
            if err.kind() == ErrorKind::PermissionDenied
                && matches!(cfg.host.as_str(), "0.0.0.0" | "::") =>
        {
            let fallback_addr = format!("127.0.0.1:{}", cfg.port);
            tracing::warn!(
                "Permission denied binding to {} ({}). Falling back to {}",
                addr,
                err,
                fallback_addr
            );
            TcpListener::bind(&fallback_addr).await?
        }
        Err(err) => return Err(err.into()),
    };

    tracing::info!("Server listening on http://{}", listener.local_addr()?);
    axum::serve(listener, app)
        .with_graceful_shutdown(cancel_on_signal(tokio::signal::ctrl_c(), shutdown))
        .await?;

    Ok(())
}

/// Connect to the backend named by the database URL scheme.
///
/// In migrate mode the schema is applied and `None` is returned.
async fn open_adapter(cfg: &AppConfig, migrate: bool) -> Result<Option<Arc<dyn Adapter>>> {
    let db_url = cfg.database_url.as_str();
    tracing::debug!("Connecting using raw URL => {}", db_url);

    if db_url.starts_with("postgres://") || db_url.starts_with("postgresql://") {
        let adapter = PostgresAdapter::connect(db_url, cfg.max_connections).await?;
        if migrate {
            adapter.migrate().await?;
            return Ok(None);
        }
        return Ok(Some(Arc::new(adapter)));
    }

    if !db_url.starts_with("sqlite:") {
        anyhow::bail!("unsupported database URL: {}", db_url);
    }

    // Extract the local file path SQLx will use and create its directory
    let db_path = db_url
        .trim_start_matches("sqlite://")
        .trim_start_matches("sqlite:");
    if !db_path.starts_with(":memory:") {
        if let Some(parent) = Path::new(db_path).parent() {
            if !parent.as_os_str().is_empty() && !parent.exists() {
                std::fs::create_dir_all(parent)?;
                tracing::info!("Created missing directory {:?}", parent);
            }
        }
    }

    let adapter = SqliteAdapter::connect(db_url, cfg.max_connections).await?;
    if migrate {
        adapter.migrate().await?;
        return Ok(None);
    }
    Ok(Some(Arc::new(adapter)))
}
