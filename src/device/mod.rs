//! Sensor device access.
//!
//! A single owning [`SensorDevice`] exposes the two narrow operations the
//! rest of the relay needs: reading one frame and writing one actuator
//! command. Implementations serialize the two internally so that a read and
//! a write never interleave partial frames on the wire.

pub mod serial;
pub mod simulated;

pub use serial::{DeviceConfig, SerialDevice};
pub use simulated::SimulatedDevice;

use crate::error::Result;
use crate::monitor::actuator::ActuatorCommand;
use crate::readings::RawLine;
use async_trait::async_trait;

/// A serial-attached sensor and actuator board.
#[async_trait]
pub trait SensorDevice: Send + Sync {
    /// Read one complete line.
    ///
    /// Returns `Ok(None)` when no full line arrived within the device's read
    /// timeout; partially received bytes are kept for the next call.
    async fn read_line(&self) -> Result<Option<RawLine>>;

    /// Write one actuator command byte and flush it.
    async fn write_command(&self, command: ActuatorCommand) -> Result<()>;

    /// Human readable name for logs.
    fn describe(&self) -> String;
}
