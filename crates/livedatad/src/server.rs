//! HTTP server for livedatad

use crate::queue::JobQueue;
use crate::routes;
use anyhow::{Context, Result};
use axum::Router;
use livedata_common::config::LivedataConfig;
use livedata_common::directory::DeviceDirectory;
use livedata_common::result_store::SqliteResultStore;
use std::future::Future;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Instant;
use tower_http::trace::TraceLayer;
use tracing::info;

/// Application state shared across handlers
pub struct AppState {
    pub directory: Arc<dyn DeviceDirectory>,
    pub store: Arc<SqliteResultStore>,
    pub queue: JobQueue,
    pub config: LivedataConfig,
    pub start_time: Instant,
}

impl AppState {
    pub fn new(
        directory: Arc<dyn DeviceDirectory>,
        store: Arc<SqliteResultStore>,
        queue: JobQueue,
        config: LivedataConfig,
    ) -> Self {
        Self {
            directory,
            store,
            queue,
            config,
            start_time: Instant::now(),
        }
    }
}

pub fn router(state: Arc<AppState>) -> Router {
    Router::new()
        .merge(routes::health_routes())
        .merge(routes::managed_device_routes())
        .merge(routes::job_routes())
        .with_state(state)
        .layer(TraceLayer::new_for_http())
}

/// Run the HTTP server until `shutdown` resolves
pub async fn run<F>(state: AppState, shutdown: F) -> Result<()>
where
    F: Future<Output = ()> + Send + 'static,
{
    let addr = state.config.server.listen.clone();
    let app = router(Arc::new(state));

    let listener = tokio::net::TcpListener::bind(&addr)
        .await
        .with_context(|| format!("Failed to bind {}", addr))?;
    info!("Listening on http://{}", addr);

    axum::serve(
        listener,
        app.into_make_service_with_connect_info::<SocketAddr>(),
    )
    .with_graceful_shutdown(shutdown)
    .await
    .context("HTTP server failed")?;
    Ok(())
}
