//! Controller daemon - startup, trigger service loop, shutdown.
//!
//! Startup order is fixed:
//! 1. calibrate every channel's pulse range
//! 2. drive the arm to the default pose and settle
//! 3. read the status key once (bounded by the connect timeout)
//! 4. subscribe to the status and reserved servo keys
//!
//! The service then runs until the shutdown future resolves. On shutdown the
//! arm is set directly to the neutral angle once.

pub mod listener;

use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use colored::*;
use tokio::sync::mpsc;

use crate::bridge::{TriggerBridge, trigger_channel};
use crate::cloud::StatusStore;
use crate::error::{ArmError, Result};
use crate::motion::Sequencer;
use crate::servo::{PulseRange, ServoBus};

pub use listener::{forward_status, watch_reserved};

/// Keys and values the controller works with.
#[derive(Debug, Clone)]
pub struct ControllerConfig {
    pub status_key: String,
    pub servo_key: String,
    pub trigger_value: String,
    pub pulse_range: PulseRange,
    pub connect_timeout: Duration,
}

impl Default for ControllerConfig {
    fn default() -> Self {
        Self {
            status_key: "robot/status".to_string(),
            servo_key: "arm/servos".to_string(),
            trigger_value: "waiting".to_string(),
            pulse_range: PulseRange::default(),
            connect_timeout: Duration::from_secs(10),
        }
    }
}

/// Why the service loop ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StopReason {
    /// Shutdown requested (Ctrl-C)
    Interrupted,
    /// The status subscription ended without error
    StreamEnded,
}

/// Summary returned when the controller stops cleanly.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ShutdownReport {
    pub reason: StopReason,
    pub tasks_completed: u64,
}

/// Owns the arm and the store for the lifetime of the service.
pub struct Controller<S, P>
where
    S: ServoBus + 'static,
    P: StatusStore + 'static,
{
    sequencer: Sequencer<S, P>,
    store: Arc<P>,
    config: ControllerConfig,
}

impl<S, P> Controller<S, P>
where
    S: ServoBus + 'static,
    P: StatusStore + 'static,
{
    pub fn new(sequencer: Sequencer<S, P>, store: Arc<P>, config: ControllerConfig) -> Self {
        Self {
            sequencer,
            store,
            config,
        }
    }

    /// Calibrate and reset the arm. Runs before anything touches the cloud.
    pub async fn prepare(&mut self) -> Result<()> {
        self.sequencer.calibrate(self.config.pulse_range)?;
        self.sequencer.reset_to_default().await
    }

    /// Run the service until `shutdown` resolves.
    ///
    /// Servo and startup cloud errors are returned; the arm is left where it
    /// was. On shutdown the arm goes to neutral and a report is returned.
    pub async fn run_until<F>(mut self, shutdown: F) -> Result<ShutdownReport>
    where
        F: Future<Output = ()>,
    {
        self.prepare().await?;

        let status_key = self.config.status_key.clone();
        let initial = tokio::time::timeout(self.config.connect_timeout, self.store.get(&status_key))
            .await
            .map_err(|_| {
                ArmError::Cloud(format!(
                    "store not ready after {:?}",
                    self.config.connect_timeout
                ))
            })??;
        log::info!("Current {} = {:?}", status_key, initial);

        let status_changes = self.store.subscribe(&status_key).await?;
        let servo_changes = self.store.subscribe(&self.config.servo_key).await?;

        let (sender, receiver) = trigger_channel(&self.config.trigger_value);
        let status_task = tokio::spawn(forward_status(status_changes, sender));
        let servo_task = tokio::spawn(watch_reserved(servo_changes, self.config.servo_key.clone()));

        println!(
            "{} '{}'...",
            format!("Listening to {} for status:", status_key).cyan(),
            self.config.trigger_value
        );

        let bridge = TriggerBridge::new(self.sequencer, self.config.trigger_value.clone());
        let (stop_tx, stop_rx) = mpsc::channel(1);
        let service = bridge.run(receiver, stop_rx);
        tokio::pin!(service);
        tokio::pin!(shutdown);

        let outcome = tokio::select! {
            result = &mut service => match result {
                Err(e) => {
                    status_task.abort();
                    Err(e)
                }
                // Every sender gone: the status listener already returned
                Ok(bridge) => match status_task.await {
                    Ok(Ok(())) => Ok((bridge, StopReason::StreamEnded)),
                    Ok(Err(e)) => Err(e),
                    Err(e) => Err(ArmError::Cloud(format!("status listener panicked: {}", e))),
                },
            },
            _ = &mut shutdown => {
                println!("{}", "Shutting down...".yellow());
                log::info!("Shutdown requested");
                status_task.abort();
                let _ = stop_tx.send(()).await;
                service.await.map(|bridge| (bridge, StopReason::Interrupted))
            }
        };
        servo_task.abort();
        let (bridge, reason) = outcome?;

        let tasks_completed = bridge.completed();
        let mut sequencer = bridge.into_sequencer();
        sequencer.neutral()?;

        Ok(ShutdownReport {
            reason,
            tasks_completed,
        })
    }
}
