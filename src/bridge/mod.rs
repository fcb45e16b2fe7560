//! Trigger bridge - turns observed status values into task runs.
//!
//! The subscription side holds a `TriggerSender` and offers every observed
//! value. A single `TriggerBridge` loop owns the sequencer and runs one task
//! per accepted trigger.
//!
//! ```text
//! status stream ──offer()──▶ [run state + 1-slot channel] ──▶ TriggerBridge::run
//!                                                              └─▶ Sequencer
//! ```
//!
//! `offer()` moves the shared run state from idle to running before a trigger
//! is queued. Triggers observed while a task is queued or running collapse
//! into one deferred run, which the loop starts as soon as the current task
//! ends. A task never runs concurrently with another.

pub mod signal;

use std::sync::Arc;
use std::sync::atomic::{AtomicU8, Ordering};

use chrono::{DateTime, Utc};
use colored::*;
use tokio::sync::mpsc;

use crate::cloud::StatusStore;
use crate::error::Result;
use crate::motion::{SequenceReport, Sequencer};
use crate::servo::ServoBus;

pub use signal::{is_trigger, observed_text};

const IDLE: u8 = 0;
const RUNNING: u8 = 1;
const DEFERRED: u8 = 2;

/// Bridge state as seen from the subscription side.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BridgeState {
    /// Waiting for a trigger
    Idle,
    /// A task is queued or running
    Running,
    /// A task is queued or running and one more run follows it
    Deferred,
}

/// Result of offering an observed value.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Offer {
    /// Not the trigger value
    Ignored,
    /// Accepted; one task run will follow
    Queued,
    /// Trigger observed while a task is queued or running; runs once after it
    Deferred,
    /// The bridge loop is gone
    Closed,
}

/// An accepted trigger.
#[derive(Debug, Clone)]
pub struct Trigger {
    pub observed: String,
    pub received_at: DateTime<Utc>,
}

/// Producer half, cloneable across subscription tasks.
#[derive(Debug, Clone)]
pub struct TriggerSender {
    tx: mpsc::Sender<Trigger>,
    state: Arc<AtomicU8>,
    trigger_value: Arc<str>,
}

impl TriggerSender {
    /// Offer an observed status value to the bridge.
    pub fn offer(&self, observed: Option<&str>) -> Offer {
        let Some(value) = observed.filter(|v| is_trigger(Some(v), &self.trigger_value)) else {
            return Offer::Ignored;
        };
        if self.tx.is_closed() {
            return Offer::Closed;
        }

        let previous = match self
            .state
            .fetch_update(Ordering::AcqRel, Ordering::Acquire, |state| match state {
                IDLE => Some(RUNNING),
                _ => Some(DEFERRED),
            }) {
            Ok(previous) | Err(previous) => previous,
        };
        if previous != IDLE {
            return Offer::Deferred;
        }

        let trigger = Trigger {
            observed: value.to_string(),
            received_at: Utc::now(),
        };
        match self.tx.try_send(trigger) {
            Ok(()) => Offer::Queued,
            Err(_) => {
                self.state.store(IDLE, Ordering::Release);
                Offer::Closed
            }
        }
    }

    pub fn state(&self) -> BridgeState {
        match self.state.load(Ordering::Acquire) {
            IDLE => BridgeState::Idle,
            RUNNING => BridgeState::Running,
            _ => BridgeState::Deferred,
        }
    }
}

/// Consumer half, handed to `TriggerBridge::run`.
#[derive(Debug)]
pub struct TriggerReceiver {
    rx: mpsc::Receiver<Trigger>,
    state: Arc<AtomicU8>,
}

impl TriggerReceiver {
    /// Next queued trigger; `None` once every sender is gone.
    pub async fn recv(&mut self) -> Option<Trigger> {
        self.rx.recv().await
    }

    /// Mark the current task finished.
    ///
    /// Returns `true` when a trigger was deferred during the task; the state
    /// then stays running for the follow-up run.
    fn finish(&self) -> bool {
        match self
            .state
            .compare_exchange(RUNNING, IDLE, Ordering::AcqRel, Ordering::Acquire)
        {
            Ok(_) => false,
            Err(_) => {
                self.state.store(RUNNING, Ordering::Release);
                true
            }
        }
    }

    /// Back to idle, discarding any deferred run.
    fn release(&self) {
        self.state.store(IDLE, Ordering::Release);
    }
}

/// Create the trigger channel for a trigger value (e.g. "waiting").
pub fn trigger_channel(trigger_value: &str) -> (TriggerSender, TriggerReceiver) {
    let (tx, rx) = mpsc::channel(1);
    let state = Arc::new(AtomicU8::new(IDLE));
    (
        TriggerSender {
            tx,
            state: Arc::clone(&state),
            trigger_value: Arc::from(trigger_value),
        },
        TriggerReceiver { rx, state },
    )
}

/// Runs the task script once per accepted trigger.
pub struct TriggerBridge<S, P>
where
    S: ServoBus,
    P: StatusStore,
{
    sequencer: Sequencer<S, P>,
    trigger_value: String,
    completed: u64,
}

impl<S, P> TriggerBridge<S, P>
where
    S: ServoBus,
    P: StatusStore,
{
    pub fn new(sequencer: Sequencer<S, P>, trigger_value: impl Into<String>) -> Self {
        Self {
            sequencer,
            trigger_value: trigger_value.into(),
            completed: 0,
        }
    }

    /// Handle one observed value inline.
    ///
    /// Returns `true` when the value was the trigger and the task ran.
    pub async fn on_signal(&mut self, observed: Option<&str>) -> Result<bool> {
        if !is_trigger(observed, &self.trigger_value) {
            log::debug!("Ignoring status {:?}", observed);
            return Ok(false);
        }
        self.execute().await?;
        Ok(true)
    }

    /// Process queued triggers until shutdown or until every sender is gone.
    ///
    /// Shutdown is only observed between tasks; a running task always
    /// finishes first and a pending deferred run is dropped. A task error
    /// ends the loop and is returned.
    pub async fn run(
        mut self,
        mut triggers: TriggerReceiver,
        mut shutdown: mpsc::Receiver<()>,
    ) -> Result<Self> {
        loop {
            let trigger = tokio::select! {
                biased;
                _ = shutdown.recv() => {
                    log::info!("Trigger bridge shutting down");
                    break;
                }
                trigger = triggers.recv() => trigger,
            };
            let Some(trigger) = trigger else {
                log::info!("Trigger channel closed");
                break;
            };
            log::info!(
                "Trigger '{}' received at {}",
                trigger.observed,
                trigger.received_at.to_rfc3339()
            );

            loop {
                if let Err(e) = self.execute().await {
                    triggers.release();
                    return Err(e);
                }
                if !triggers.finish() {
                    break;
                }
                if shutdown.try_recv().is_ok() {
                    log::info!("Trigger bridge shutting down, deferred trigger dropped");
                    triggers.release();
                    return Ok(self);
                }
                log::info!("Running deferred trigger");
            }
        }
        Ok(self)
    }

    /// Number of completed task runs
    pub fn completed(&self) -> u64 {
        self.completed
    }

    pub fn sequencer(&self) -> &Sequencer<S, P> {
        &self.sequencer
    }

    pub fn into_sequencer(self) -> Sequencer<S, P> {
        self.sequencer
    }

    async fn execute(&mut self) -> Result<SequenceReport> {
        println!(
            "{}",
            "Checkpoint reached - starting arm task sequence...".green()
        );
        match self.sequencer.run_default_sequence().await {
            Ok(report) => {
                self.completed += 1;
                log::info!(
                    "Task #{} done: {} writes, active {:?}, total {:?}",
                    self.completed,
                    report.writes,
                    report.active,
                    report.total
                );
                Ok(report)
            }
            Err(e) => {
                log::error!("Task sequence failed: {}", e);
                Err(e)
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cloud::MemoryStore;
    use crate::error::ArmError;
    use crate::motion::MotionSettings;
    use crate::servo::MockServoBus;
    use serde_json::json;
    use std::time::Duration;

    fn bridge(bus: MockServoBus) -> (TriggerBridge<MockServoBus, MemoryStore>, Arc<MemoryStore>) {
        let store = Arc::new(MemoryStore::new());
        let sequencer = Sequencer::new(bus, Arc::clone(&store), MotionSettings::default());
        (TriggerBridge::new(sequencer, "waiting"), store)
    }

    #[tokio::test(start_paused = true)]
    async fn test_on_signal_trigger_variants_run_once_each() {
        let (mut bridge, store) = bridge(MockServoBus::new(16));

        for value in ["WAITING", "Waiting", "waiting"] {
            let before = store.writes().len();
            assert!(bridge.on_signal(Some(value)).await.unwrap());
            assert_eq!(store.writes().len(), before + 1);
        }
        assert_eq!(bridge.completed(), 3);
        assert_eq!(store.writes_to("robot/status").len(), 3);
    }

    #[tokio::test(start_paused = true)]
    async fn test_on_signal_ignores_other_values() {
        let bus = MockServoBus::new(16);
        let log = bus.log();
        let (mut bridge, store) = bridge(bus);

        for value in [Some("idle"), None, Some("")] {
            assert!(!bridge.on_signal(value).await.unwrap());
        }
        assert_eq!(bridge.completed(), 0);
        assert!(store.writes().is_empty());
        assert!(log.writes().is_empty());
    }

    #[tokio::test]
    async fn test_offer_defers_while_running() {
        let (tx, _rx) = trigger_channel("waiting");

        assert_eq!(tx.state(), BridgeState::Idle);
        assert_eq!(tx.offer(Some("idle")), Offer::Ignored);
        assert_eq!(tx.offer(None), Offer::Ignored);
        assert_eq!(tx.offer(Some("Waiting")), Offer::Queued);
        assert_eq!(tx.state(), BridgeState::Running);
        assert_eq!(tx.offer(Some("waiting")), Offer::Deferred);
        assert_eq!(tx.state(), BridgeState::Deferred);
        assert_eq!(tx.offer(Some("WAITING")), Offer::Deferred);
        assert_eq!(tx.offer(Some("idle")), Offer::Ignored);
        assert_eq!(tx.state(), BridgeState::Deferred);
    }

    #[tokio::test]
    async fn test_offer_after_bridge_gone() {
        let (tx, rx) = trigger_channel("waiting");
        drop(rx);
        assert_eq!(tx.offer(Some("waiting")), Offer::Closed);
        assert_eq!(tx.state(), BridgeState::Idle);
    }

    #[tokio::test(start_paused = true)]
    async fn test_run_processes_one_trigger_and_returns_to_idle() {
        let (bridge, store) = bridge(MockServoBus::new(16));
        let (tx, rx) = trigger_channel("waiting");
        let (stop_tx, stop_rx) = mpsc::channel(1);

        assert_eq!(tx.offer(Some("waiting")), Offer::Queued);
        let handle = tokio::spawn(bridge.run(rx, stop_rx));

        tokio::time::sleep(Duration::from_secs(60)).await;
        assert_eq!(tx.state(), BridgeState::Idle);
        assert_eq!(store.writes_to("robot/status"), vec![json!("task_done")]);

        stop_tx.send(()).await.unwrap();
        let bridge = handle.await.unwrap().unwrap();
        assert_eq!(bridge.completed(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_trigger_during_homing_runs_after_task() {
        let (bridge, store) = bridge(MockServoBus::new(16));
        let (tx, rx) = trigger_channel("waiting");
        let (stop_tx, stop_rx) = mpsc::channel(1);

        assert_eq!(tx.offer(Some("waiting")), Offer::Queued);
        let handle = tokio::spawn(bridge.run(rx, stop_rx));

        // task_done is published before the arm homes
        while store.writes_to("robot/status").is_empty() {
            tokio::time::sleep(Duration::from_millis(100)).await;
        }
        tokio::time::sleep(Duration::from_secs(2)).await;
        assert_eq!(tx.state(), BridgeState::Running);
        assert_eq!(tx.offer(Some("waiting")), Offer::Deferred);

        tokio::time::sleep(Duration::from_secs(60)).await;
        assert_eq!(tx.state(), BridgeState::Idle);
        assert_eq!(
            store.writes_to("robot/status"),
            vec![json!("task_done"), json!("task_done")]
        );

        stop_tx.send(()).await.unwrap();
        let bridge = handle.await.unwrap().unwrap();
        assert_eq!(bridge.completed(), 2);
    }

    #[tokio::test(start_paused = true)]
    async fn test_deferred_triggers_collapse_into_one_run() {
        let (bridge, store) = bridge(MockServoBus::new(16));
        let (tx, rx) = trigger_channel("waiting");
        let (stop_tx, stop_rx) = mpsc::channel(1);

        assert_eq!(tx.offer(Some("waiting")), Offer::Queued);
        let handle = tokio::spawn(bridge.run(rx, stop_rx));

        tokio::time::sleep(Duration::from_secs(1)).await;
        for value in ["waiting", "Waiting", "WAITING"] {
            assert_eq!(tx.offer(Some(value)), Offer::Deferred);
        }

        tokio::time::sleep(Duration::from_secs(120)).await;
        assert_eq!(tx.state(), BridgeState::Idle);
        assert_eq!(store.writes_to("robot/status").len(), 2);

        stop_tx.send(()).await.unwrap();
        let bridge = handle.await.unwrap().unwrap();
        assert_eq!(bridge.completed(), 2);
    }

    #[tokio::test(start_paused = true)]
    async fn test_shutdown_drops_deferred_run() {
        let (bridge, store) = bridge(MockServoBus::new(16));
        let (tx, rx) = trigger_channel("waiting");
        let (stop_tx, stop_rx) = mpsc::channel(1);

        assert_eq!(tx.offer(Some("waiting")), Offer::Queued);
        let handle = tokio::spawn(bridge.run(rx, stop_rx));

        tokio::time::sleep(Duration::from_secs(1)).await;
        assert_eq!(tx.offer(Some("waiting")), Offer::Deferred);
        stop_tx.send(()).await.unwrap();

        let bridge = handle.await.unwrap().unwrap();
        assert_eq!(bridge.completed(), 1);
        assert_eq!(tx.state(), BridgeState::Idle);
        assert_eq!(store.writes_to("robot/status"), vec![json!("task_done")]);
    }

    #[tokio::test(start_paused = true)]
    async fn test_run_stops_when_senders_dropped() {
        let (bridge, _) = bridge(MockServoBus::new(16));
        let (tx, rx) = trigger_channel("waiting");
        let (_stop_tx, stop_rx) = mpsc::channel(1);

        assert_eq!(tx.offer(Some("waiting")), Offer::Queued);
        drop(tx);

        let bridge = bridge.run(rx, stop_rx).await.unwrap();
        assert_eq!(bridge.completed(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_run_returns_task_error_and_goes_idle() {
        let (bridge, store) = bridge(MockServoBus::new(16).fail_on_write(5));
        let (tx, rx) = trigger_channel("waiting");
        let (_stop_tx, stop_rx) = mpsc::channel(1);

        assert_eq!(tx.offer(Some("waiting")), Offer::Queued);
        assert_eq!(tx.offer(Some("waiting")), Offer::Deferred);
        let result = bridge.run(rx, stop_rx).await;

        assert!(matches!(result, Err(ArmError::Servo(_))));
        assert_eq!(tx.state(), BridgeState::Idle);
        assert!(store.writes().is_empty());
    }
}
