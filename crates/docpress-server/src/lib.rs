//! HTTP interface for docpress
//!
//! Accepts multipart uploads on the compression route and streams back the
//! compressed document with its statistics in response headers. Failures are
//! returned as `{ kind, error, details, hint? }` JSON bodies.
//!
//! # Routes
//!
//! - `POST /api/compress-pdf` (configurable): fields `pdf`, `quality`, `user_id`
//! - `GET /api/usage`: usage history for the session's user
//! - `GET /health`: liveness and engine availability

#![deny(missing_docs)]
#![warn(clippy::all, clippy::pedantic, clippy::nursery)]
#![allow(clippy::module_name_repetitions)]

pub mod error;
pub mod handlers;
pub mod session;

pub use error::{status_for, ApiError, ErrorBody};

use axum::extract::DefaultBodyLimit;
use axum::routing::{get, post};
use axum::Router;
use docpress_config::Config;
use docpress_engine::{CompressionPipeline, StaticSessionResolver};
use docpress_types::{Result, SessionResolver};
use std::future::Future;
use std::net::SocketAddr;
use std::sync::Arc;
use tower_http::trace::TraceLayer;
use tracing::{info, warn};

/// Shared handler state
#[derive(Clone)]
pub struct AppState {
    pipeline: Arc<CompressionPipeline>,
    sessions: Arc<dyn SessionResolver>,
    session_cookie: String,
}

/// HTTP server wrapping a compression pipeline
pub struct HttpServer {
    state: AppState,
    route: String,
    max_body_bytes: usize,
}

impl HttpServer {
    /// Create a server around `pipeline`
    pub fn new(
        pipeline: Arc<CompressionPipeline>,
        sessions: Arc<dyn SessionResolver>,
        config: &Config,
    ) -> Self {
        Self {
            state: AppState {
                pipeline,
                sessions,
                session_cookie: config.auth.session_cookie.clone(),
            },
            route: config.server.route.clone(),
            max_body_bytes: usize::try_from(config.server.max_body_bytes).unwrap_or(usize::MAX),
        }
    }

    /// Server with the bundled pipeline and session table for `config`
    pub fn from_config(config: &Config) -> Self {
        let pipeline = Arc::new(CompressionPipeline::from_config(config.clone()));
        let sessions = Arc::new(StaticSessionResolver::from_config(&config.auth));
        Self::new(pipeline, sessions, config)
    }

    /// The pipeline requests are handed to
    pub fn pipeline(&self) -> &Arc<CompressionPipeline> {
        &self.state.pipeline
    }

    /// Build the Axum router
    pub fn router(&self) -> Router {
        Router::new()
            .route(&self.route, post(handlers::compress_handler))
            .route("/api/usage", get(handlers::usage_handler))
            .route("/health", get(handlers::health_handler))
            .layer(DefaultBodyLimit::max(self.max_body_bytes))
            .layer(TraceLayer::new_for_http())
            .with_state(self.state.clone())
    }

    /// Serve until `shutdown` resolves
    pub async fn run<F>(self, addr: SocketAddr, shutdown: F) -> Result<()>
    where
        F: Future<Output = ()> + Send + 'static,
    {
        let router = self.router();
        let listener = tokio::net::TcpListener::bind(addr).await?;

        info!("HTTP server listening on http://{}", listener.local_addr()?);
        if let Ok(engine) = self.state.pipeline.locator().locate().await {
            info!("Using Ghostscript at {}", engine.display());
        } else {
            warn!("Ghostscript not found; compression requests will fail until it is installed");
        }

        axum::serve(listener, router)
            .with_graceful_shutdown(async move {
                shutdown.await;
                info!("HTTP server shutting down");
            })
            .await?;

        Ok(())
    }
}
