//! Serial ingestion pipeline.
//!
//! Each cycle waits for one full frame from the device, decodes and parses
//! it, and appends the resulting reading to the store:
//!
//! ```text
//! Idle -> Waiting-for-data -> Extracted -> Parsed -> Validated -> Stored -> Idle
//! ```
//!
//! Malformed frames are logged and dropped. Device errors are retried with a
//! capped exponential backoff and become fatal once the retry bound is hit.

pub mod pipeline;

pub use pipeline::{IngestConfig, IngestOutcome, IngestPipeline, ReadingSink};
