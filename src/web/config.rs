//! Web server configuration.

use crate::feed::FeedService;
use crate::readings::ReadingStore;
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Configuration for the web server.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WebConfig {
    /// Host to bind the server to
    pub host: String,
    /// Port to bind the server to
    pub port: u16,
    /// Whether to enable CORS
    pub enable_cors: bool,
    /// Maximum number of concurrent feed subscribers (WebSocket and stream)
    pub max_websocket_connections: usize,
    /// Readings returned by `GET /readings`
    pub recent_limit: usize,
    /// Tick interval of the continuous feed
    pub feed_interval: Duration,
}

impl Default for WebConfig {
    fn default() -> Self {
        Self {
            host: "0.0.0.0".to_string(),
            port: crate::DEFAULT_WEB_PORT,
            enable_cors: true,
            max_websocket_connections: 100,
            recent_limit: crate::DEFAULT_RECENT_LIMIT,
            feed_interval: Duration::from_millis(crate::DEFAULT_FEED_INTERVAL_MS),
        }
    }
}

impl WebConfig {
    /// Create a new web configuration with custom host and port.
    pub fn new(host: impl Into<String>, port: u16) -> Self {
        Self {
            host: host.into(),
            port,
            ..Default::default()
        }
    }

    /// Enable or disable CORS.
    pub fn with_cors(mut self, enable_cors: bool) -> Self {
        self.enable_cors = enable_cors;
        self
    }

    pub fn with_max_websocket_connections(mut self, max: usize) -> Self {
        self.max_websocket_connections = max;
        self
    }

    pub fn with_recent_limit(mut self, limit: usize) -> Self {
        self.recent_limit = limit;
        self
    }

    pub fn with_feed_interval(mut self, interval: Duration) -> Self {
        self.feed_interval = interval;
        self
    }

    /// Feed service over `store` using this configuration's query limit and
    /// tick interval.
    pub fn feed_service(&self, store: ReadingStore) -> FeedService {
        FeedService::new(store)
            .with_recent_limit(self.recent_limit)
            .with_interval(self.feed_interval)
    }

    /// Get the full bind address.
    pub fn bind_address(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }
}
