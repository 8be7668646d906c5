mod api;
mod catalog;
mod catcher;
mod config;
mod dispatch;
mod error;
mod escape;
mod file_type;
mod metrics;
mod path_format;
mod state;
mod storage;
mod upload;

use std::sync::Arc;
use std::time::Duration;
use tokio::net::TcpListener;
use tower_http::trace::TraceLayer;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use crate::catcher::HttpFetcher;
use crate::config::{Config, ConfigManager};
use crate::dispatch::{ActionTable, Dispatcher};
use crate::metrics::SharedMetrics;
use crate::storage::{local::LocalStorage, Storage};

pub struct AppState {
    pub dispatcher: Dispatcher,
    pub editor_config: Arc<ConfigManager>,
    pub storage: Arc<dyn Storage>,
    pub metrics: SharedMetrics,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Initialize tracing
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "editor_upload_api=debug,tower_http=debug".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    // Load configuration
    let config_path = std::env::var("CONFIG_PATH").unwrap_or_else(|_| "config.yaml".to_string());
    tracing::info!("Loading configuration from: {}", config_path);

    let config = Config::from_file(&config_path)?;

    // A broken editor config is reported per request rather than at startup
    let editor_config = Arc::new(ConfigManager::load(&config.editor.config_path));

    let storage: Arc<dyn Storage> = Arc::new(LocalStorage::new(&config.editor.root_path).await?);
    tracing::info!("Serving uploads from: {}", config.editor.root_path);

    let fetcher = Arc::new(HttpFetcher::new(Duration::from_secs(
        config.editor.fetch_timeout_seconds,
    ))?);

    // Initialize metrics
    let metrics = Arc::new(metrics::Metrics::new()?);
    tracing::info!("Initialized Prometheus metrics");

    let dispatcher = Dispatcher::new(
        ActionTable::new(),
        editor_config.clone(),
        storage.clone(),
        fetcher,
        metrics.clone(),
    );

    // Create application state
    let state = Arc::new(AppState {
        dispatcher,
        editor_config,
        storage,
        metrics,
    });

    // Create router
    let app = api::create_router(state, &config.server).layer(TraceLayer::new_for_http());

    // Start server
    let addr = format!("{}:{}", config.server.host, config.server.port);
    tracing::info!("Starting server on {} (controller at {})", addr, config.server.route);

    let listener = TcpListener::bind(&addr).await?;

    axum::serve(listener, app).await?;

    Ok(())
}
