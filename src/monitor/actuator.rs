//! Safety actuator controller.
//!
//! The controller turns a target state into a single command byte on its
//! [`CommandLink`] and remembers the state only after the link confirms the
//! write. Until the first confirmed write the state is unknown, which makes
//! the first [`ActuatorController::set_state`] after a restart always reach
//! the device.

use crate::device::SensorDevice;
use crate::error::{HazardError, Result};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::future::Future;
use std::str::FromStr;
use std::sync::Arc;
use tokio::sync::Mutex;
use tracing::{debug, info};

/// Physical state of the safety actuator.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ActuatorState {
    Engaged,
    Disengaged,
}

impl ActuatorState {
    /// Command that drives the actuator into this state.
    pub fn command(self) -> ActuatorCommand {
        match self {
            ActuatorState::Engaged => ActuatorCommand::Engage,
            ActuatorState::Disengaged => ActuatorCommand::Disengage,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            ActuatorState::Engaged => "engaged",
            ActuatorState::Disengaged => "disengaged",
        }
    }
}

impl fmt::Display for ActuatorState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Command sent to the actuator.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ActuatorCommand {
    Engage,
    Disengage,
}

impl ActuatorCommand {
    /// Wire byte: `'2'` engages, `'0'` disengages.
    pub fn code(self) -> u8 {
        match self {
            ActuatorCommand::Engage => b'2',
            ActuatorCommand::Disengage => b'0',
        }
    }

    /// State the actuator is in once this command is applied.
    pub fn target_state(self) -> ActuatorState {
        match self {
            ActuatorCommand::Engage => ActuatorState::Engaged,
            ActuatorCommand::Disengage => ActuatorState::Disengaged,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            ActuatorCommand::Engage => "engage",
            ActuatorCommand::Disengage => "disengage",
        }
    }
}

impl fmt::Display for ActuatorCommand {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ActuatorCommand {
    type Err = HazardError;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "engage" => Ok(ActuatorCommand::Engage),
            "disengage" => Ok(ActuatorCommand::Disengage),
            other => Err(HazardError::command_error(format!(
                "invalid command {other:?}"
            ))),
        }
    }
}

/// Outbound channel that delivers actuator commands.
pub trait CommandLink {
    /// Deliver one command. `Ok` means the write was confirmed.
    fn send(&self, command: ActuatorCommand) -> impl Future<Output = Result<()>> + Send;
}

/// Command link writing straight to the shared sensor device.
#[derive(Clone)]
pub struct DeviceLink {
    device: Arc<dyn SensorDevice>,
}

impl DeviceLink {
    pub fn new(device: Arc<dyn SensorDevice>) -> Self {
        Self { device }
    }
}

impl CommandLink for DeviceLink {
    async fn send(&self, command: ActuatorCommand) -> Result<()> {
        self.device.write_command(command).await
    }
}

/// Owns the command link and the last confirmed actuator state.
pub struct ActuatorController<L> {
    link: L,
    state: Mutex<Option<ActuatorState>>,
}

impl<L: CommandLink> ActuatorController<L> {
    /// New controller with unknown actuator state.
    pub fn new(link: L) -> Self {
        Self {
            link,
            state: Mutex::new(None),
        }
    }

    /// Last confirmed state, or `None` while unknown.
    pub async fn current_state(&self) -> Option<ActuatorState> {
        *self.state.lock().await
    }

    /// Drive the actuator to `target`, skipping the write when the last
    /// confirmed state already matches.
    ///
    /// Returns whether a command was written. On failure the recorded state
    /// is left untouched so the next call retries.
    pub async fn set_state(&self, target: ActuatorState) -> Result<bool> {
        let mut state = self.state.lock().await;
        if *state == Some(target) {
            debug!(state = %target, "Actuator already in target state");
            return Ok(false);
        }

        self.deliver(target).await?;
        *state = Some(target);
        Ok(true)
    }

    /// Write the command for `target` regardless of the recorded state.
    pub async fn force_state(&self, target: ActuatorState) -> Result<()> {
        let mut state = self.state.lock().await;
        self.deliver(target).await?;
        *state = Some(target);
        Ok(())
    }

    async fn deliver(&self, target: ActuatorState) -> Result<()> {
        let command = target.command();
        self.link.send(command).await?;
        info!(command = %command, "Actuator command delivered");
        Ok(())
    }
}
