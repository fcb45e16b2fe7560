//! Controller integration tests
//!
//! Drives the full startup, trigger and shutdown flow against the recording
//! servo bus and the in-process status store.

use std::io::Write;
use std::sync::Arc;
use std::time::Duration;

use pickarm::ArmError;
use pickarm::cloud::{MemoryStore, StatusStore};
use pickarm::config::GlobalConfig;
use pickarm::daemon::{Controller, ControllerConfig, StopReason};
use pickarm::motion::Sequencer;
use pickarm::servo::MockServoBus;
use serde_json::json;
use tempfile::NamedTempFile;
use tokio::sync::oneshot;

const CONFIG: &str = r#"
log-level: debug
motion:
  step-delay-ms: 10
  settle-ms: 500
  script:
    name: tap
    steps:
      - op: interpolate
        joint: 2
        target: 120
        steps: 4
      - op: say
        message: tapping
      - op: set
        joint: 5
        angle: 180
      - op: hold
        ms: 200
      - op: publish
      - op: home
cloud:
  status-path: factory/cell-3/status
  servo-path: factory/cell-3/servos
  trigger-value: go
  completion-value: done
"#;

fn load_config() -> GlobalConfig {
    let mut file = NamedTempFile::new().unwrap();
    file.write_all(CONFIG.as_bytes()).unwrap();
    let config = GlobalConfig::load_from_file(file.path()).unwrap();
    config.validate().unwrap();
    config
}

fn controller_config(config: &GlobalConfig) -> ControllerConfig {
    ControllerConfig {
        status_key: config.cloud.status_path.clone(),
        servo_key: config.cloud.servo_path.clone(),
        trigger_value: config.cloud.trigger_value.clone(),
        pulse_range: config.pulse_range().unwrap(),
        connect_timeout: config.cloud.connect_timeout(),
    }
}

fn build(
    config: &GlobalConfig,
    bus: MockServoBus,
    store: Arc<MemoryStore>,
) -> Controller<MockServoBus, MemoryStore> {
    let sequencer = Sequencer::new(bus, Arc::clone(&store), config.motion_settings())
        .with_script(config.script())
        .unwrap();
    Controller::new(sequencer, store, controller_config(config))
}

/// Integration test: configured keys, values and script flow end to end
#[tokio::test(start_paused = true)]
async fn test_configured_trigger_runs_script() {
    let config = load_config();
    let bus = MockServoBus::new(config.servo.channels);
    let log = bus.log();
    let store = Arc::new(MemoryStore::new().with_value("factory/cell-3/status", json!("idle")));
    let (tx, rx) = oneshot::channel::<()>();

    let handle = tokio::spawn(build(&config, bus, Arc::clone(&store)).run_until(async {
        let _ = rx.await;
    }));

    tokio::time::sleep(Duration::from_secs(2)).await;
    // The default trigger value means nothing here
    store.set("factory/cell-3/status", json!("waiting")).await.unwrap();
    tokio::time::sleep(Duration::from_secs(2)).await;
    assert_eq!(store.writes_to("factory/cell-3/status").len(), 1);

    store.set("factory/cell-3/status", json!("GO")).await.unwrap();
    tokio::time::sleep(Duration::from_secs(10)).await;
    tx.send(()).unwrap();

    let report = handle.await.unwrap().unwrap();
    assert_eq!(report.reason, StopReason::Interrupted);
    assert_eq!(report.tasks_completed, 1);
    assert_eq!(
        store.writes_to("factory/cell-3/status"),
        vec![json!("waiting"), json!("GO"), json!("done")]
    );

    // Ramp of joint 2 from the default 90 to 120 in 4 steps
    let joint2 = log.angles_for(2);
    assert_eq!(&joint2[1..6], &[90.0, 97.5, 105.0, 112.5, 120.0]);

    // Last six writes are the neutral reset
    let writes = log.writes();
    let tail = &writes[writes.len() - 6..];
    assert!(tail.iter().all(|w| w.angle == 90.0));
}

/// Integration test: a trigger during a run queues exactly one more run
#[tokio::test(start_paused = true)]
async fn test_trigger_while_running_runs_once_more() {
    let config = GlobalConfig::default();
    let store = Arc::new(MemoryStore::new().with_value("robot/status", json!("waiting")));
    let (tx, rx) = oneshot::channel::<()>();

    let handle = tokio::spawn(
        build(&config, MockServoBus::new(16), Arc::clone(&store)).run_until(async {
            let _ = rx.await;
        }),
    );

    // Startup settles for 1 s, the task takes roughly 15 s
    tokio::time::sleep(Duration::from_secs(4)).await;
    store.set("robot/status", json!("waiting")).await.unwrap();
    store.set("robot/status", json!("Waiting")).await.unwrap();
    tokio::time::sleep(Duration::from_secs(60)).await;
    tx.send(()).unwrap();

    let report = handle.await.unwrap().unwrap();
    assert_eq!(report.tasks_completed, 2);
    assert_eq!(
        store.writes_to("robot/status"),
        vec![
            json!("waiting"),
            json!("Waiting"),
            json!("task_done"),
            json!("task_done")
        ]
    );
}

/// Integration test: the car asks again while the arm is still homing
#[tokio::test(start_paused = true)]
async fn test_trigger_during_homing_is_not_lost() {
    let config = GlobalConfig::default();
    let store = Arc::new(MemoryStore::new().with_value("robot/status", json!("idle")));
    let (tx, rx) = oneshot::channel::<()>();

    let handle = tokio::spawn(
        build(&config, MockServoBus::new(16), Arc::clone(&store)).run_until(async {
            let _ = rx.await;
        }),
    );

    tokio::time::sleep(Duration::from_secs(2)).await;
    store.set("robot/status", json!("waiting")).await.unwrap();

    while !store.writes_to("robot/status").contains(&json!("task_done")) {
        tokio::time::sleep(Duration::from_millis(100)).await;
    }
    // Homing takes about 6 s after the completion write
    tokio::time::sleep(Duration::from_secs(2)).await;
    store.set("robot/status", json!("waiting")).await.unwrap();

    tokio::time::sleep(Duration::from_secs(120)).await;
    tx.send(()).unwrap();

    let report = handle.await.unwrap().unwrap();
    assert_eq!(report.tasks_completed, 2);
    assert_eq!(
        store.get("robot/status").await.unwrap(),
        Some(json!("task_done"))
    );
}

/// Integration test: a servo failure mid-task ends the controller with an error
#[tokio::test(start_paused = true)]
async fn test_servo_failure_is_fatal() {
    let config = GlobalConfig::default();
    let bus = MockServoBus::new(16).fail_on_write(40);
    let log = bus.log();
    let store = Arc::new(MemoryStore::new().with_value("robot/status", json!("Waiting")));

    let result = build(&config, bus, Arc::clone(&store))
        .run_until(std::future::pending())
        .await;

    assert!(matches!(result, Err(ArmError::Servo(_))));
    assert!(store.writes().is_empty());
    // No neutral reset after a failure
    assert_eq!(log.writes().len(), 40);
}
