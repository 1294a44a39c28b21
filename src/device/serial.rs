//! `tokio-serial` backed sensor device.

use crate::device::SensorDevice;
use crate::error::{HazardError, Result};
use crate::monitor::actuator::ActuatorCommand;
use crate::readings::RawLine;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::mem;
use std::time::Duration;
use tokio::io::{AsyncBufRead, AsyncBufReadExt, AsyncReadExt, AsyncWriteExt, BufReader};
use tokio::sync::Mutex;
use tokio::time::timeout;
use tokio_serial::{SerialPortBuilderExt, SerialStream};
use tracing::{debug, info, warn};

/// Serial port configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DeviceConfig {
    /// Serial port path (e.g., "/dev/ttyACM0", "COM7")
    pub port: String,
    /// Baud rate
    pub baud_rate: u32,
    /// Upper bound on a single wait for a line
    pub read_timeout: Duration,
    /// Upper bound on writing and flushing one command
    pub write_timeout: Duration,
}

impl Default for DeviceConfig {
    fn default() -> Self {
        Self {
            port: crate::DEFAULT_SERIAL_PORT.to_string(),
            baud_rate: crate::DEFAULT_BAUD_RATE,
            read_timeout: Duration::from_millis(500),
            write_timeout: Duration::from_millis(1000),
        }
    }
}

impl DeviceConfig {
    pub fn new(port: impl Into<String>) -> Self {
        Self {
            port: port.into(),
            ..Default::default()
        }
    }

    pub fn with_baud_rate(mut self, baud_rate: u32) -> Self {
        self.baud_rate = baud_rate;
        self
    }

    pub fn with_read_timeout(mut self, read_timeout: Duration) -> Self {
        self.read_timeout = read_timeout;
        self
    }

    pub fn with_write_timeout(mut self, write_timeout: Duration) -> Self {
        self.write_timeout = write_timeout;
        self
    }

    pub fn validate(&self) -> Result<()> {
        if self.port.is_empty() {
            return Err(HazardError::config_error("serial port path cannot be empty"));
        }
        if self.baud_rate == 0 {
            return Err(HazardError::config_error("baud rate must be greater than zero"));
        }
        if self.read_timeout.is_zero() || self.write_timeout.is_zero() {
            return Err(HazardError::config_error("serial timeouts must be non-zero"));
        }
        Ok(())
    }
}

/// Longest line accepted from the board, terminator included.
const MAX_LINE_BYTES: usize = 1024;

/// Bytes of a line whose terminator has not arrived yet.
#[derive(Debug, Default)]
struct LineBuffer {
    bytes: Vec<u8>,
    /// Set while skipping the rest of an overlong line.
    discarding: bool,
}

impl LineBuffer {
    /// Bytes the next read may append.
    fn budget(&self) -> u64 {
        MAX_LINE_BYTES.saturating_sub(self.bytes.len()).max(1) as u64
    }

    /// Split off a complete line, if one has arrived.
    ///
    /// A line reaching `MAX_LINE_BYTES` without a terminator is dropped
    /// together with everything up to the next newline.
    fn take_line(&mut self) -> Option<RawLine> {
        if self.bytes.ends_with(b"\n") {
            let bytes = mem::take(&mut self.bytes);
            if mem::take(&mut self.discarding) {
                debug!("Skipped tail of overlong serial line");
                return None;
            }
            return Some(RawLine::new(bytes));
        }

        if self.bytes.len() >= MAX_LINE_BYTES {
            if !self.discarding {
                warn!(
                    "Serial line exceeds {} bytes without a terminator, discarding it",
                    MAX_LINE_BYTES
                );
            }
            self.discarding = true;
            self.bytes.clear();
        }
        None
    }
}

/// Read towards the next newline without growing `line` past its budget.
///
/// Cancel safe: bytes read before a cancellation stay in `line`.
async fn fill_line<R>(reader: &mut R, line: &mut LineBuffer) -> std::io::Result<usize>
where
    R: AsyncBufRead + Unpin,
{
    let budget = line.budget();
    reader.take(budget).read_until(b'\n', &mut line.bytes).await
}

struct PortState {
    reader: BufReader<SerialStream>,
    line: LineBuffer,
}

/// Sensor board on a serial port.
pub struct SerialDevice {
    config: DeviceConfig,
    port: Mutex<PortState>,
}

impl SerialDevice {
    /// Open the configured serial port.
    pub fn open(config: DeviceConfig) -> Result<Self> {
        config.validate()?;

        let stream = tokio_serial::new(&config.port, config.baud_rate)
            .timeout(config.read_timeout)
            .open_native_async()
            .map_err(|e| {
                HazardError::device_io(format!("failed to open serial port {}: {e}", config.port))
            })?;

        info!(
            "Opened serial port {} at {} baud",
            config.port, config.baud_rate
        );

        Ok(Self {
            config,
            port: Mutex::new(PortState {
                reader: BufReader::new(stream),
                line: LineBuffer::default(),
            }),
        })
    }
}

#[async_trait]
impl SensorDevice for SerialDevice {
    async fn read_line(&self) -> Result<Option<RawLine>> {
        let mut guard = self.port.lock().await;
        let PortState { reader, line } = &mut *guard;

        // A timeout keeps the partial line for the next call.
        let result = timeout(self.config.read_timeout, fill_line(reader, line)).await;
        match result {
            Err(_) => Ok(None),
            Ok(Ok(0)) => Err(HazardError::device_io(format!(
                "serial port {} closed",
                self.config.port
            ))),
            Ok(Ok(_)) => {
                let complete = line.take_line();
                if let Some(raw) = &complete {
                    debug!(bytes = raw.as_bytes().len(), "Serial line received");
                }
                Ok(complete)
            }
            Ok(Err(e)) => Err(HazardError::device_io(format!(
                "read from {} failed: {e}",
                self.config.port
            ))),
        }
    }

    async fn write_command(&self, command: ActuatorCommand) -> Result<()> {
        let mut guard = self.port.lock().await;
        let stream = guard.reader.get_mut();

        let write = async {
            stream.write_all(&[command.code()]).await?;
            stream.flush().await
        };

        match timeout(self.config.write_timeout, write).await {
            Ok(Ok(())) => {
                debug!(code = command.code(), "Command byte written");
                Ok(())
            }
            Ok(Err(e)) => Err(HazardError::command_error(format!(
                "write of {command} to {} failed: {e}",
                self.config.port
            ))),
            Err(_) => {
                warn!(
                    "Write of {command} to {} timed out after {:?}",
                    self.config.port, self.config.write_timeout
                );
                Err(HazardError::command_error(format!(
                    "write of {command} timed out"
                )))
            }
        }
    }

    fn describe(&self) -> String {
        format!("serial:{}@{}", self.config.port, self.config.baud_rate)
    }
}
