//! End-to-end launch sequence with real child processes.
//!
//! The heuristic locator diffs this process's children, so the tests here
//! run one at a time.

use std::fs;
use std::path::Path;
use std::sync::Arc;

use tokio::net::TcpListener;
use tokio::sync::Mutex;

use deploywatch::config::{DetectorEntry, ServiceConfig};
use deploywatch::error::Error;
use deploywatch::liveness::plugin::{PluginConfig, FILE_PATH_KEY, PORT_KEY, REGEX_KEY};
use deploywatch::liveness::DetectorKind;
use deploywatch::process::SysinfoProvider;
use deploywatch::startup::Launch;

static SERIAL: Mutex<()> = Mutex::const_new(());

fn service(dir: &Path, detectors: Vec<DetectorEntry>) -> ServiceConfig {
    ServiceConfig {
        name: "web".to_string(),
        working_dir: dir.to_path_buf(),
        post_launch_wait_ms: 100,
        start_detection_timeout_secs: 10,
        detectors,
        ..ServiceConfig::default()
    }
}

fn sh(script: &str) -> Vec<String> {
    vec!["sh".to_string(), "-c".to_string(), script.to_string()]
}

fn ready_line_detector() -> DetectorEntry {
    DetectorEntry {
        kind: DetectorKind::File,
        settings: PluginConfig::new()
            .with(FILE_PATH_KEY, "logs/web.out")
            .with(REGEX_KEY, "^ready$"),
    }
}

#[tokio::test]
async fn launched_service_is_detected_and_located() {
    let _serial = SERIAL.lock().await;
    let dir = tempfile::tempdir().unwrap();
    let config = service(dir.path(), vec![ready_line_detector()]);

    let launch = Launch::from_config(&config, Arc::new(SysinfoProvider::new())).unwrap();
    let launched = launch.run(&sh("echo ready; sleep 1")).await.unwrap();

    assert!(!launched.pids.is_empty());
    let status = launched.wait().await.unwrap();
    assert!(status.success());

    let out = fs::read_to_string(dir.path().join("logs/web.out")).unwrap();
    assert_eq!(out, "ready\n");
}

#[tokio::test]
async fn failing_command_reports_exit_code() {
    let _serial = SERIAL.lock().await;
    let dir = tempfile::tempdir().unwrap();
    let config = service(dir.path(), vec![ready_line_detector()]);

    let launch = Launch::from_config(&config, Arc::new(SysinfoProvider::new())).unwrap();
    let err = launch
        .run(&sh("echo boom >&2; exit 4"))
        .await
        .err()
        .unwrap();

    assert!(matches!(err, Error::LaunchFailed { code: 4 }));
    let stderr = fs::read_to_string(dir.path().join("logs/web.err")).unwrap();
    assert_eq!(stderr, "boom\n");
}

#[tokio::test]
async fn busy_port_blocks_the_launch() {
    let _serial = SERIAL.lock().await;
    let dir = tempfile::tempdir().unwrap();
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let port = listener.local_addr().unwrap().port();
    let config = service(
        dir.path(),
        vec![DetectorEntry {
            kind: DetectorKind::Port,
            settings: PluginConfig::new().with(PORT_KEY, vec![u64::from(port)]),
        }],
    );

    let launch = Launch::from_config(&config, Arc::new(SysinfoProvider::new())).unwrap();
    let err = launch.run(&sh("sleep 5")).await.err().unwrap();

    assert!(matches!(err, Error::PortInUse { .. }));
    assert!(!dir.path().join("logs").exists());
}

#[cfg(target_os = "linux")]
#[tokio::test]
async fn undetected_service_is_killed() {
    let _serial = SERIAL.lock().await;
    let dir = tempfile::tempdir().unwrap();
    let config = ServiceConfig {
        start_detection_timeout_secs: 1,
        ..service(dir.path(), vec![ready_line_detector()])
    };

    let launch = Launch::from_config(&config, Arc::new(SysinfoProvider::new())).unwrap();
    let err = launch
        .run(&sh("echo $$ > marker; while true; do sleep 0.2; done"))
        .await
        .err()
        .unwrap();

    assert!(err.is_timeout());
    assert_eq!(
        err.to_string(),
        "Service web was not detected as started within 1s"
    );
    let pid = fs::read_to_string(dir.path().join("marker")).unwrap();
    let proc_dir = format!("/proc/{}", pid.trim());
    assert!(!Path::new(&proc_dir).exists(), "{proc_dir} still running");
}

#[tokio::test]
async fn empty_command_is_rejected() {
    let dir = tempfile::tempdir().unwrap();
    let config = service(dir.path(), Vec::new());

    let launch = Launch::from_config(&config, Arc::new(SysinfoProvider::new())).unwrap();
    let err = launch.run(&[]).await.err().unwrap();

    assert!(matches!(err, Error::Config(_)));
}
