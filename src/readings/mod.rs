//! Sensor readings: data model, serial frame parsing and the persisted
//! time series.

pub mod data;
pub mod frame;
pub mod store;

// Re-export commonly used items
pub use data::{FeedFrame, Metric, NewReading, Reading};
pub use frame::{parse_frame, RawLine};
pub use store::{ReadingStore, StoreConfig};
