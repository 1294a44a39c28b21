//! # Hazard Edge - Sensor Relay and Safety Actuator Control
//!
//! Relays hazard-sensor readings (LPG, methane, carbon monoxide,
//! temperature) from a serial-attached board into a persisted time series,
//! serves them over HTTP, and drives a safety actuator whenever a reading
//! crosses its configured limit.
//!
//! ## Stages
//!
//! - **Ingestion**: serial line -> parsed reading -> append-only store
//! - **Feed**: point query and continuous per-subscriber feed of the latest reading
//! - **Monitoring**: limit evaluation and idempotent actuator commands
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use hazard_edge::{FeedService, ReadingStore, StoreConfig, SimulatedDevice};
//! use hazard_edge::{IngestConfig, IngestPipeline};
//! use std::sync::Arc;
//! use tokio_util::sync::CancellationToken;
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let store = ReadingStore::open(&StoreConfig::default()).await?;
//!     let device = Arc::new(SimulatedDevice::default());
//!
//!     let pipeline = IngestPipeline::new(device, store.clone(), IngestConfig::default());
//!     tokio::spawn(async move { pipeline.run(CancellationToken::new()).await });
//!
//!     let feed = FeedService::new(store);
//!     println!("{:?}", feed.latest_frame().await?);
//!     Ok(())
//! }
//! ```

pub mod device;
pub mod error;
pub mod feed;
pub mod ingest;
pub mod monitor;
pub mod readings;
pub mod web;

// Re-export public API
pub use device::{DeviceConfig, SensorDevice, SerialDevice, SimulatedDevice};
pub use error::{HazardError, Result};
pub use feed::FeedService;
pub use ingest::{IngestConfig, IngestOutcome, IngestPipeline, ReadingSink};
pub use monitor::{
    ActuatorCommand, ActuatorController, ActuatorState, CommandLink, CycleOutcome, DeviceLink,
    HttpCommandLink, HttpReadingSource, Monitor, MonitorConfig, ReadingSource, SafetyLimits,
};
pub use readings::{
    parse_frame, FeedFrame, Metric, NewReading, RawLine, Reading, ReadingStore, StoreConfig,
};
pub use web::{create_app, start_web_server, AppState, WebConfig};

/// The default web server port
pub const DEFAULT_WEB_PORT: u16 = 8000;

/// Interval between frames of the continuous feed, in milliseconds
pub const DEFAULT_FEED_INTERVAL_MS: u64 = 4000;

/// Interval between monitoring cycles, in milliseconds
pub const DEFAULT_MONITOR_INTERVAL_MS: u64 = 4000;

/// Pause between device polls while no complete line is available
pub const DEFAULT_POLL_BACKOFF_MS: u64 = 1000;

/// Number of readings returned by the point query
pub const DEFAULT_RECENT_LIMIT: usize = 10;

pub const DEFAULT_DATABASE_FILE: &str = "edge-database/sqlite.db";

pub const DEFAULT_TABLE: &str = "readings";

pub const DEFAULT_SERIAL_PORT: &str = "/dev/ttyACM0";

pub const DEFAULT_BAUD_RATE: u32 = 9600;

/// Safety limits in `metric=limit` form
pub const DEFAULT_SAFE_LIMITS: &str = "lpg=1000,ch4=1000,co=50,temp=50";
