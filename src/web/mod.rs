//! HTTP API for the hazard relay.
//!
//! Exposes the point query, the ingest endpoint, two flavours of the
//! continuous feed (WebSocket and newline-delimited JSON) and the actuator
//! control endpoint.

pub mod config;
pub mod handlers;
pub mod router;
pub mod websocket;

// Re-export commonly used items
pub use config::WebConfig;
pub use router::create_app;

use crate::error::{HazardError, Result};
use crate::feed::FeedService;
use crate::monitor::{ActuatorController, DeviceLink};
use std::net::SocketAddr;
use std::sync::Arc;
use tokio::sync::{OwnedSemaphorePermit, Semaphore};
use tokio_util::sync::CancellationToken;
use tracing::info;

/// Shared state handed to every handler.
#[derive(Clone)]
pub struct AppState {
    pub feed: FeedService,
    /// Present when the process owns the sensor device
    pub actuator: Option<Arc<ActuatorController<DeviceLink>>>,
    subscriber_slots: Arc<Semaphore>,
    max_subscribers: usize,
    shutdown: CancellationToken,
}

impl AppState {
    pub fn new(feed: FeedService, config: &WebConfig) -> Self {
        Self {
            feed,
            actuator: None,
            subscriber_slots: Arc::new(Semaphore::new(config.max_websocket_connections)),
            max_subscribers: config.max_websocket_connections,
            shutdown: CancellationToken::new(),
        }
    }

    pub fn with_actuator(mut self, actuator: Arc<ActuatorController<DeviceLink>>) -> Self {
        self.actuator = Some(actuator);
        self
    }

    /// Feeds and the server stop once `shutdown` fires.
    pub fn with_shutdown(mut self, shutdown: CancellationToken) -> Self {
        self.shutdown = shutdown;
        self
    }

    pub fn shutdown(&self) -> &CancellationToken {
        &self.shutdown
    }

    /// Reserve a feed subscriber slot; `None` when all are taken.
    pub fn try_subscribe(&self) -> Option<OwnedSemaphorePermit> {
        self.subscriber_slots.clone().try_acquire_owned().ok()
    }

    pub fn active_subscribers(&self) -> usize {
        self.max_subscribers
            .saturating_sub(self.subscriber_slots.available_permits())
    }
}

/// Serve the API until the state's shutdown token fires.
pub async fn start_web_server(config: WebConfig, state: AppState) -> Result<()> {
    let shutdown = state.shutdown.clone();
    let app = create_app(&config, state);

    let addr = config
        .bind_address()
        .parse::<SocketAddr>()
        .map_err(|e| HazardError::config_error(format!("Invalid bind address: {}", e)))?;

    let listener = tokio::net::TcpListener::bind(&addr).await.map_err(|e| {
        HazardError::web_server_error(format!("Failed to bind to address: {}", e))
    })?;

    info!("Hazard relay API listening on http://{}", addr);
    info!("Point query: http://{}/readings", addr);
    info!("WebSocket feed: ws://{}/readings/latest", addr);

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown.cancelled_owned())
        .await
        .map_err(|e| HazardError::web_server_error(format!("Server error: {}", e)))?;

    info!("Web server stopped");
    Ok(())
}
