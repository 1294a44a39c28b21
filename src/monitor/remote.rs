//! HTTP bindings for running the monitor apart from the API process.

use crate::error::{HazardError, Result};
use crate::monitor::actuator::{ActuatorCommand, CommandLink};
use crate::monitor::source::ReadingSource;
use crate::readings::FeedFrame;
use serde::Deserialize;
use std::time::Duration;
use tracing::debug;

fn build_client(timeout: Duration) -> Result<reqwest::Client> {
    reqwest::Client::builder()
        .timeout(timeout)
        .build()
        .map_err(|e| HazardError::config_error(format!("failed to build HTTP client: {e}")))
}

fn normalize_base(base_url: &str) -> String {
    base_url.trim_end_matches('/').to_string()
}

/// Reads the latest reading through the API point query (`GET /readings`).
#[derive(Clone)]
pub struct HttpReadingSource {
    client: reqwest::Client,
    base_url: String,
}

impl HttpReadingSource {
    pub fn new(base_url: &str, timeout: Duration) -> Result<Self> {
        Ok(Self {
            client: build_client(timeout)?,
            base_url: normalize_base(base_url),
        })
    }
}

impl ReadingSource for HttpReadingSource {
    async fn current(&self) -> Result<FeedFrame> {
        let url = format!("{}/readings", self.base_url);
        let frames: Vec<FeedFrame> = self
            .client
            .get(&url)
            .send()
            .await?
            .error_for_status()?
            .json()
            .await?;

        debug!(count = frames.len(), "Fetched recent readings");
        Ok(frames.into_iter().next().unwrap_or_default())
    }
}

#[derive(Debug, Deserialize)]
struct CommandReply {
    status: String,
}

/// Delivers commands through the API actuator endpoint
/// (`GET /response_system/{command}`).
#[derive(Clone)]
pub struct HttpCommandLink {
    client: reqwest::Client,
    base_url: String,
}

impl HttpCommandLink {
    pub fn new(base_url: &str, timeout: Duration) -> Result<Self> {
        Ok(Self {
            client: build_client(timeout)?,
            base_url: normalize_base(base_url),
        })
    }
}

impl CommandLink for HttpCommandLink {
    async fn send(&self, command: ActuatorCommand) -> Result<()> {
        let url = format!("{}/response_system/{}", self.base_url, command);
        let reply: CommandReply = self
            .client
            .get(&url)
            .send()
            .await?
            .error_for_status()?
            .json()
            .await?;

        let expected = command.target_state().as_str();
        if reply.status == expected {
            Ok(())
        } else {
            Err(HazardError::command_error(format!(
                "API answered {:?} to {command}, expected {expected:?}",
                reply.status
            )))
        }
    }
}
