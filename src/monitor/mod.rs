//! Monitoring loop and safety actuator control.
//!
//! Every interval the monitor fetches the current reading, compares it to
//! the configured [`SafetyLimits`] and asks the [`ActuatorController`] for
//! `Engaged` when any metric is over its limit, `Disengaged` otherwise:
//!
//! ```text
//! Polling -> Evaluating -> Deciding -> Commanding -> Polling
//! ```
//!
//! Fetch and command failures are logged and the cycle is skipped; only a
//! configuration error ends the loop.

pub mod actuator;
pub mod limits;
pub mod remote;
pub mod source;

pub use actuator::{ActuatorCommand, ActuatorController, ActuatorState, CommandLink, DeviceLink};
pub use limits::SafetyLimits;
pub use remote::{HttpCommandLink, HttpReadingSource};
pub use source::ReadingSource;

use crate::error::Result;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::Duration;
use tokio::time::{self, MissedTickBehavior};
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

/// Monitoring loop settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MonitorConfig {
    /// Time between cycles
    pub interval: Duration,
    /// Per-metric safe limits
    pub limits: SafetyLimits,
}

impl Default for MonitorConfig {
    fn default() -> Self {
        Self {
            interval: Duration::from_millis(crate::DEFAULT_MONITOR_INTERVAL_MS),
            limits: SafetyLimits::default(),
        }
    }
}

impl MonitorConfig {
    pub fn with_interval(mut self, interval: Duration) -> Self {
        self.interval = interval;
        self
    }

    pub fn with_limits(mut self, limits: SafetyLimits) -> Self {
        self.limits = limits;
        self
    }
}

/// What a single monitoring cycle did.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CycleOutcome {
    /// No reading stored yet
    NoData,
    /// Actuator already in the target state
    Steady(ActuatorState),
    /// A command was delivered
    Commanded(ActuatorState),
    /// The reading could not be fetched
    FetchFailed,
    /// The command for this target could not be delivered
    CommandFailed(ActuatorState),
}

/// Drives the actuator from the readings of a [`ReadingSource`].
pub struct Monitor<S, L> {
    source: S,
    controller: Arc<ActuatorController<L>>,
    config: MonitorConfig,
}

impl<S, L> Monitor<S, L>
where
    S: ReadingSource + Sync,
    L: CommandLink + Send + Sync,
{
    pub fn new(source: S, controller: Arc<ActuatorController<L>>, config: MonitorConfig) -> Self {
        Self {
            source,
            controller,
            config,
        }
    }

    pub fn controller(&self) -> &Arc<ActuatorController<L>> {
        &self.controller
    }

    /// Run one cycle.
    ///
    /// Only a configuration error is returned as `Err`; every other failure
    /// is reported through the outcome and retried next cycle.
    pub async fn step(&self) -> Result<CycleOutcome> {
        let frame = match self.source.current().await {
            Ok(frame) => frame,
            Err(e) => {
                warn!(error = %e, "Failed to fetch current reading, skipping cycle");
                return Ok(CycleOutcome::FetchFailed);
            }
        };

        if frame.is_empty() {
            debug!("No reading available yet");
            return Ok(CycleOutcome::NoData);
        }

        let exceeded = self.config.limits.exceeded(&frame)?;
        let target = if exceeded.is_empty() {
            ActuatorState::Disengaged
        } else {
            warn!(?exceeded, ?frame, "Safety limit exceeded");
            ActuatorState::Engaged
        };

        match self.controller.set_state(target).await {
            Ok(true) => {
                info!(state = %target, ?frame, "Actuator state changed");
                Ok(CycleOutcome::Commanded(target))
            }
            Ok(false) => Ok(CycleOutcome::Steady(target)),
            Err(e) => {
                warn!(error = %e, target = %target, "Failed to deliver actuator command");
                Ok(CycleOutcome::CommandFailed(target))
            }
        }
    }

    /// Run cycles until `shutdown` fires or configuration proves invalid.
    pub async fn run(&self, shutdown: CancellationToken) -> Result<()> {
        info!(
            "Monitoring loop started (interval {:?}, limits {})",
            self.config.interval, self.config.limits
        );

        let mut ticker = time::interval(self.config.interval.max(Duration::from_millis(1)));
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

        loop {
            tokio::select! {
                biased;
                _ = shutdown.cancelled() => {
                    info!("Monitoring loop stopped");
                    return Ok(());
                }
                _ = ticker.tick() => {}
            }

            let cycle = tokio::select! {
                biased;
                _ = shutdown.cancelled() => {
                    info!("Monitoring loop stopped");
                    return Ok(());
                }
                cycle = self.step() => cycle,
            };

            if let Err(e) = cycle {
                error!(error = %e, "Monitoring loop cannot continue");
                return Err(e);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::HazardError;
    use crate::readings::FeedFrame;
    use std::sync::atomic::{AtomicBool, Ordering};
    use std::sync::Mutex as StdMutex;

    #[derive(Default)]
    struct FixedSource {
        frame: StdMutex<Option<FeedFrame>>,
    }

    impl ReadingSource for FixedSource {
        async fn current(&self) -> Result<FeedFrame> {
            let frame = *self.frame.lock().unwrap();
            frame.ok_or_else(|| HazardError::network_error("feed unavailable"))
        }
    }

    #[derive(Default)]
    struct NullLink;

    impl CommandLink for NullLink {
        async fn send(&self, _command: ActuatorCommand) -> Result<()> {
            Ok(())
        }
    }

    /// Link that refuses every command while `down` is set.
    #[derive(Default)]
    struct FlakyLink {
        down: AtomicBool,
    }

    impl CommandLink for Arc<FlakyLink> {
        async fn send(&self, _command: ActuatorCommand) -> Result<()> {
            if self.down.load(Ordering::SeqCst) {
                return Err(HazardError::command_error("link down"));
            }
            Ok(())
        }
    }

    fn hazardous_source() -> FixedSource {
        let source = FixedSource::default();
        *source.frame.lock().unwrap() = Some(FeedFrame {
            lpg: Some(10.0),
            ch4: Some(10.0),
            co: Some(75.0),
            temp: Some(25.0),
        });
        source
    }

    fn monitor(source: FixedSource) -> Monitor<FixedSource, NullLink> {
        Monitor::new(
            source,
            Arc::new(ActuatorController::new(NullLink)),
            MonitorConfig::default(),
        )
    }

    #[tokio::test]
    async fn fetch_failure_skips_cycle() {
        let monitor = monitor(FixedSource::default());
        assert_eq!(monitor.step().await.unwrap(), CycleOutcome::FetchFailed);
        assert_eq!(monitor.controller().current_state().await, None);
    }

    #[tokio::test]
    async fn sentinel_frame_is_no_data() {
        let source = FixedSource::default();
        *source.frame.lock().unwrap() = Some(FeedFrame::empty());
        let monitor = monitor(source);
        assert_eq!(monitor.step().await.unwrap(), CycleOutcome::NoData);
    }

    #[tokio::test]
    async fn partial_frame_is_fatal() {
        let source = FixedSource::default();
        *source.frame.lock().unwrap() = Some(FeedFrame {
            lpg: Some(1.0),
            ..FeedFrame::empty()
        });
        let monitor = monitor(source);
        let err = monitor.step().await.unwrap_err();
        assert!(err.is_fatal());
    }

    #[tokio::test]
    async fn failed_command_is_resent_next_cycle() {
        let link = Arc::new(FlakyLink::default());
        link.down.store(true, Ordering::SeqCst);
        let monitor = Monitor::new(
            hazardous_source(),
            Arc::new(ActuatorController::new(link.clone())),
            MonitorConfig::default(),
        );

        assert_eq!(
            monitor.step().await.unwrap(),
            CycleOutcome::CommandFailed(ActuatorState::Engaged)
        );
        assert_eq!(monitor.controller().current_state().await, None);

        link.down.store(false, Ordering::SeqCst);
        assert_eq!(
            monitor.step().await.unwrap(),
            CycleOutcome::Commanded(ActuatorState::Engaged)
        );
        assert_eq!(
            monitor.controller().current_state().await,
            Some(ActuatorState::Engaged)
        );
        assert_eq!(
            monitor.step().await.unwrap(),
            CycleOutcome::Steady(ActuatorState::Engaged)
        );
    }

    #[tokio::test]
    async fn run_stops_on_shutdown() {
        let monitor = monitor(FixedSource::default());
        let shutdown = CancellationToken::new();
        shutdown.cancel();
        assert!(monitor.run(shutdown).await.is_ok());
    }
}
