//! Simulated sensor board for running the relay without hardware.

use crate::device::SensorDevice;
use crate::error::Result;
use crate::monitor::actuator::ActuatorCommand;
use crate::readings::RawLine;
use async_trait::async_trait;
use rand::Rng;
use std::time::Duration;
use tokio::sync::Mutex;
use tokio::time::{sleep_until, Instant};
use tracing::info;

/// Emits a random frame every `interval` and records actuator commands.
pub struct SimulatedDevice {
    interval: Duration,
    next_frame: Mutex<Instant>,
    commands: Mutex<Vec<ActuatorCommand>>,
}

impl SimulatedDevice {
    pub fn new(interval: Duration) -> Self {
        Self {
            interval,
            next_frame: Mutex::new(Instant::now() + interval),
            commands: Mutex::new(Vec::new()),
        }
    }

    /// Commands received so far, oldest first.
    pub async fn commands(&self) -> Vec<ActuatorCommand> {
        self.commands.lock().await.clone()
    }

    fn generate_frame() -> String {
        let mut rng = rand::thread_rng();
        let lpg: u32 = rng.gen_range(0..=100);
        let ch4: u32 = rng.gen_range(0..=100);
        let co: u32 = rng.gen_range(0..=100);
        let temperature: f64 = rng.gen_range(20.0..60.0);
        format!("LPG:{lpg},CH4:{ch4},CO:{co},Temperature:{temperature:.2}\n")
    }
}

impl Default for SimulatedDevice {
    fn default() -> Self {
        Self::new(Duration::from_millis(crate::DEFAULT_FEED_INTERVAL_MS))
    }
}

#[async_trait]
impl SensorDevice for SimulatedDevice {
    async fn read_line(&self) -> Result<Option<RawLine>> {
        let mut next_frame = self.next_frame.lock().await;
        sleep_until(*next_frame).await;
        *next_frame = Instant::now() + self.interval;

        Ok(Some(RawLine::new(Self::generate_frame())))
    }

    async fn write_command(&self, command: ActuatorCommand) -> Result<()> {
        info!(command = %command, "Simulated actuator received command");
        self.commands.lock().await.push(command);
        Ok(())
    }

    fn describe(&self) -> String {
        format!("simulated ({:?} cadence)", self.interval)
    }
}
