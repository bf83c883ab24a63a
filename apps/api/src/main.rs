use std::net::SocketAddr;
use std::sync::Arc;

use api::analysis::AnalysisClient;
use api::execution::SandboxExecutor;
use api::metrics::AppMetrics;
use api::storage::{build_pool, PgProgramStore};
use api::templates::FsTemplateStore;
use api::{build_router, ApiConfig, AppState};
use dispatcher::{Collaborators, Dispatcher, TracingDiagnostics};
use tracing::{dispatcher as tracing_dispatcher, info, warn};
use tracing_subscriber::prelude::*;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    init_tracing()?;
    let config = ApiConfig::from_env()?;

    let pool = build_pool(&config.database_url, config.database_max_connections).await?;
    let programs = PgProgramStore::new(pool);
    programs.ensure_schema().await?;

    let templates = FsTemplateStore::load(&config.templates_root)?;
    let analysis = Arc::new(AnalysisClient::new(
        config.analysis_url.clone(),
        config.analysis_timeout,
    )?);
    let executor = SandboxExecutor::from_config(&config)?;

    let collaborators = Collaborators {
        programs: Arc::new(programs),
        templates: Arc::new(templates),
        executor: Arc::new(executor),
        highlighter: analysis.clone(),
        completer: analysis.clone(),
        converter: analysis,
        diagnostics: Arc::new(TracingDiagnostics),
    };

    let state = AppState {
        dispatcher: Arc::new(Dispatcher::new(collaborators)),
        metrics: Arc::new(AppMetrics::new()?),
        max_body_bytes: config.max_body_bytes,
    };
    let app = build_router(state);

    let listener = tokio::net::TcpListener::bind(config.bind_addr).await?;
    info!(bind_addr = %config.bind_addr, "server starting");
    axum::serve(
        listener,
        app.into_make_service_with_connect_info::<SocketAddr>(),
    )
    .with_graceful_shutdown(shutdown_signal())
    .await?;
    info!("server stopped");
    Ok(())
}

fn init_tracing() -> anyhow::Result<()> {
    if tracing_dispatcher::has_been_set() {
        return Ok(());
    }

    let env_filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| "info,tower_http=info".into());
    let fmt_layer = tracing_subscriber::fmt::layer()
        .json()
        .with_timer(tracing_subscriber::fmt::time::UtcTime::rfc_3339());
    tracing_subscriber::registry()
        .with(env_filter)
        .with(fmt_layer)
        .try_init()?;
    Ok(())
}

async fn shutdown_signal() {
    if let Err(err) = tokio::signal::ctrl_c().await {
        warn!(error = %err, "failed to listen for shutdown signal");
        std::future::pending::<()>().await;
    }
    info!("shutdown signal received");
}
