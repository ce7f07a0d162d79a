//! API Server Module
//!
//! This module contains the server setup functionality for the API system.

use std::sync::Arc;

use anyhow::Result;
use axum::{routing::get, Router};
use tower_http::trace::TraceLayer;
use tracing::info;

use jobscan::Manager;

use crate::handlers::{health_check, query_job_artifacts, ApiState};
use crate::models::ApiConfig;

/// Main API server
pub struct ApiServer {
    /// Server configuration
    config: ApiConfig,
    /// Shared state
    state: Arc<ApiState>,
}

impl ApiServer {
    /// Create a new API server; without a manager the query route answers 503
    pub fn new(config: ApiConfig, manager: Option<Arc<Manager>>) -> Self {
        let state = Arc::new(ApiState { manager });
        Self { config, state }
    }

    /// Routes with shared state attached
    pub fn router(&self) -> Router {
        Router::new()
            .route("/api/jobs/artifacts", get(query_job_artifacts))
            // Health check
            .route("/health", get(health_check))
            .layer(TraceLayer::new_for_http())
            .with_state(self.state.clone())
    }

    /// Serve until Ctrl-C
    pub async fn start(&self) -> Result<()> {
        let listener = tokio::net::TcpListener::bind((self.config.host.as_str(), self.config.port)).await?;
        info!(addr = %listener.local_addr()?, "jobscan API server listening");

        axum::serve(listener, self.router())
            .with_graceful_shutdown(async {
                let _ = tokio::signal::ctrl_c().await;
                info!("shutdown signal received");
            })
            .await
            .map_err(|e| anyhow::anyhow!("Failed to start API server: {}", e))?;

        Ok(())
    }
}
