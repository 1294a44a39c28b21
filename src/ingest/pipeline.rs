use crate::device::SensorDevice;
use crate::error::{HazardError, Result};
use crate::readings::{parse_frame, NewReading, RawLine, Reading, ReadingStore};
use serde::{Deserialize, Serialize};
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;
use tokio::time::sleep;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

/// Timing and retry bounds for the ingestion pipeline.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct IngestConfig {
    /// Pause between polls while the device has no complete line
    pub poll_backoff: Duration,
    /// Consecutive device failures tolerated before giving up
    pub max_device_retries: u32,
    /// First delay after a device failure; doubles per consecutive failure
    pub retry_backoff: Duration,
    /// Cap on the device retry delay
    pub max_retry_backoff: Duration,
    /// Extra append attempts after a failed store write
    pub store_retries: u32,
    /// Delay between append attempts
    pub store_retry_delay: Duration,
}

impl Default for IngestConfig {
    fn default() -> Self {
        Self {
            poll_backoff: Duration::from_millis(crate::DEFAULT_POLL_BACKOFF_MS),
            max_device_retries: 5,
            retry_backoff: Duration::from_millis(500),
            max_retry_backoff: Duration::from_secs(8),
            store_retries: 1,
            store_retry_delay: Duration::from_millis(200),
        }
    }
}

impl IngestConfig {
    pub fn with_poll_backoff(mut self, poll_backoff: Duration) -> Self {
        self.poll_backoff = poll_backoff;
        self
    }

    pub fn with_max_device_retries(mut self, retries: u32) -> Self {
        self.max_device_retries = retries;
        self
    }

    pub fn with_retry_backoff(mut self, initial: Duration, max: Duration) -> Self {
        self.retry_backoff = initial;
        self.max_retry_backoff = max;
        self
    }

    pub fn with_store_retries(mut self, retries: u32, delay: Duration) -> Self {
        self.store_retries = retries;
        self.store_retry_delay = delay;
        self
    }

    /// Delay before retrying after `failures` consecutive device errors.
    fn device_backoff(&self, failures: u32) -> Duration {
        let factor = 2u32.saturating_pow(failures.saturating_sub(1));
        self.retry_backoff
            .saturating_mul(factor)
            .min(self.max_retry_backoff)
    }
}

/// Result of processing one frame.
#[derive(Debug, Clone, PartialEq)]
pub enum IngestOutcome {
    /// Frame parsed and appended
    Stored(Reading),
    /// Frame was malformed or failed validation
    Dropped,
    /// Frame was valid but every append attempt failed
    StoreFailed,
}

/// Where validated readings are written.
pub trait ReadingSink {
    /// Persist one reading and return it with its assigned id.
    fn append(&self, reading: &NewReading) -> impl Future<Output = Result<Reading>> + Send;
}

impl ReadingSink for ReadingStore {
    async fn append(&self, reading: &NewReading) -> Result<Reading> {
        ReadingStore::append(self, reading).await
    }
}

/// Owns the device read side and the store write side.
pub struct IngestPipeline<S = ReadingStore> {
    device: Arc<dyn SensorDevice>,
    store: S,
    config: IngestConfig,
}

impl<S: ReadingSink + Sync> IngestPipeline<S> {
    pub fn new(device: Arc<dyn SensorDevice>, store: S, config: IngestConfig) -> Self {
        Self {
            device,
            store,
            config,
        }
    }

    /// Wait for the next complete line.
    ///
    /// Fails with [`HazardError::DeviceIo`] once more than
    /// `max_device_retries` consecutive reads have failed.
    pub async fn next_line(&self) -> Result<RawLine> {
        let mut failures = 0u32;

        loop {
            match self.device.read_line().await {
                Ok(Some(line)) => return Ok(line),
                Ok(None) => sleep(self.config.poll_backoff).await,
                Err(e) => {
                    failures += 1;
                    if failures > self.config.max_device_retries {
                        return Err(HazardError::device_io(format!(
                            "{} failed {failures} times in a row, last error: {e}",
                            self.device.describe()
                        )));
                    }

                    let delay = self.config.device_backoff(failures);
                    warn!(
                        error = %e,
                        attempt = failures,
                        "Device read failed, retrying in {:?}",
                        delay
                    );
                    sleep(delay).await;
                }
            }
        }
    }

    /// Decode, parse, validate and store one line.
    pub async fn process(&self, raw: &RawLine) -> IngestOutcome {
        let parsed = raw.decode().and_then(|line| {
            debug!(frame = line, "Frame extracted");
            parse_frame(line)
        });

        let reading = match parsed {
            Ok(reading) => reading,
            Err(e) => {
                warn!(error = %e, "Dropping frame");
                return IngestOutcome::Dropped;
            }
        };

        let attempts = self.config.store_retries + 1;
        for attempt in 1..=attempts {
            match self.store.append(&reading).await {
                Ok(stored) => {
                    debug!(id = stored.id, "Frame stored");
                    return IngestOutcome::Stored(stored);
                }
                Err(e) if attempt < attempts => {
                    warn!(error = %e, attempt, "Append failed, retrying");
                    sleep(self.config.store_retry_delay).await;
                }
                Err(e) => {
                    error!(error = %e, ?reading, "Append failed, reading lost for this cycle");
                }
            }
        }

        IngestOutcome::StoreFailed
    }

    /// Run a single ingestion cycle.
    pub async fn run_once(&self) -> Result<IngestOutcome> {
        let raw = self.next_line().await?;
        Ok(self.process(&raw).await)
    }

    /// Ingest until `shutdown` fires or the device fails for good.
    pub async fn run(&self, shutdown: CancellationToken) -> Result<()> {
        info!("Ingestion pipeline started on {}", self.device.describe());

        loop {
            tokio::select! {
                biased;
                _ = shutdown.cancelled() => {
                    info!("Ingestion pipeline stopped");
                    return Ok(());
                }
                cycle = self.run_once() => {
                    if let Err(e) = cycle {
                        error!(error = %e, "Ingestion pipeline giving up");
                        return Err(e);
                    }
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn device_backoff_doubles_and_caps() {
        let config = IngestConfig::default()
            .with_retry_backoff(Duration::from_millis(100), Duration::from_millis(500));

        assert_eq!(config.device_backoff(1), Duration::from_millis(100));
        assert_eq!(config.device_backoff(2), Duration::from_millis(200));
        assert_eq!(config.device_backoff(3), Duration::from_millis(400));
        assert_eq!(config.device_backoff(4), Duration::from_millis(500));
        assert_eq!(config.device_backoff(40), Duration::from_millis(500));
    }
}
