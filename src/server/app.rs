//! # Relay Server
//!
//! Wires the relay hub, the sprite core, chat and diagnostics into one axum
//! application and serves it.

use anyhow::{Context, Result};
use log::info;
use std::sync::Arc;
use tokio::net::TcpListener;

use super::chat::{ChatService, CompletionClient};
use super::http::{router, AppState};
use super::hub::RelayHub;
use super::info::SystemInfo;
use super::pokemon::SpriteCore;
use crate::common::config::RelayConfig;

/// The assembled server: configuration plus shared application state.
pub struct RelayServer {
    config: RelayConfig,
    state: Arc<AppState>,
}

impl RelayServer {
    /// Build all components from configuration.
    ///
    /// # Example
    /// ```ignore
    /// let config: RelayConfig = load_config("config/server.toml")?;
    /// RelayServer::new(config)?.run().await?;
    /// ```
    pub fn new(config: RelayConfig) -> Result<Self> {
        let chat = ChatService::new(CompletionClient::from_env(&config.chat)?);
        let state = Arc::new(AppState {
            hub: Arc::new(RelayHub::new(config.relay.clone())),
            core: SpriteCore::new(&config.upstream, config.display)?,
            chat,
            info: SystemInfo::new(),
        });
        Ok(Self { config, state })
    }

    pub fn hub(&self) -> Arc<RelayHub> {
        Arc::clone(&self.state.hub)
    }

    /// Bind the configured address and serve until the process exits.
    pub async fn run(&self) -> Result<()> {
        let listener = TcpListener::bind(&self.config.server.address)
            .await
            .with_context(|| format!("failed to bind {}", self.config.server.address))?;
        self.serve(listener).await
    }

    /// Serve on an already-bound listener.
    pub async fn serve(&self, listener: TcpListener) -> Result<()> {
        let addr = listener.local_addr()?;
        info!("🚀 HTTP server running on http://{}", addr);
        info!("🔌 WebSocket relay ready on ws://{}", addr);

        axum::serve(listener, router(Arc::clone(&self.state)))
            .await
            .context("server terminated")
    }
}
