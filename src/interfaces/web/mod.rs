pub(crate) mod auth;
mod error;
mod handlers;
mod router;

use anyhow::Result;
use async_trait::async_trait;
use std::sync::Arc;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::info;

use crate::core::backend::Backend;
use crate::core::lifecycle::LifecycleComponent;
use crate::core::store::ChatStore;

pub use router::build_api_router;

#[derive(Clone)]
pub(crate) struct AppState {
    pub(crate) store: ChatStore,
    pub(crate) backend: Arc<dyn Backend>,
    pub(crate) api_port: u16,
}

pub struct ApiServerConfig {
    pub store: ChatStore,
    pub backend: Arc<dyn Backend>,
    pub api_host: String,
    pub api_port: u16,
}

/// The chat gateway: submission, history and the job stream relay.
pub struct ApiServer {
    store: ChatStore,
    backend: Arc<dyn Backend>,
    api_host: String,
    api_port: u16,
    shutdown: CancellationToken,
    handle: Option<JoinHandle<()>>,
}

impl ApiServer {
    pub fn new(config: ApiServerConfig) -> Self {
        Self {
            store: config.store,
            backend: config.backend,
            api_host: config.api_host,
            api_port: config.api_port,
            shutdown: CancellationToken::new(),
            handle: None,
        }
    }
}

#[async_trait]
impl LifecycleComponent for ApiServer {
    async fn on_init(&mut self) -> Result<()> {
        info!("API Server Interface initializing...");
        Ok(())
    }

    async fn on_start(&mut self) -> Result<()> {
        let addr = format!("{}:{}", self.api_host, self.api_port);
        let listener = tokio::net::TcpListener::bind(&addr).await?;
        let state = AppState {
            store: self.store.clone(),
            backend: self.backend.clone(),
            api_port: self.api_port,
        };
        let app = build_api_router(state);
        let shutdown = self.shutdown.clone();

        info!("API Server running at http://{addr}");
        self.handle = Some(tokio::spawn(async move {
            if let Err(e) = axum::serve(listener, app)
                .with_graceful_shutdown(async move { shutdown.cancelled().await })
                .await
            {
                tracing::error!("API Server crashed: {}", e);
            }
        }));
        Ok(())
    }

    async fn on_shutdown(&mut self) -> Result<()> {
        info!("API Server Interface shutting down...");
        self.shutdown.cancel();
        if let Some(handle) = self.handle.take() {
            let _ = handle.await;
        }
        Ok(())
    }
}
