//! Rolling file reader and directory tailer tests on real temp files.

use std::fs;
use std::io::Write;
use std::sync::Arc;
use std::time::Duration;

use parking_lot::Mutex;

use deploywatch::tail::{service_log_pattern, DirectoryTailer, RollingFileReader};

type Lines = Arc<Mutex<Vec<(String, String)>>>;

fn collector() -> (Lines, impl Fn(&str, &str) + Send + Sync + 'static) {
    let lines: Lines = Arc::default();
    let sink = lines.clone();
    let handler = move |file: &str, line: &str| {
        sink.lock().push((file.to_string(), line.to_string()));
    };
    (lines, handler)
}

fn append(path: &std::path::Path, text: &str) {
    let mut file = fs::OpenOptions::new()
        .create(true)
        .append(true)
        .open(path)
        .unwrap();
    file.write_all(text.as_bytes()).unwrap();
}

#[test]
fn content_is_read_once() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("svc.out");
    fs::write(&path, "abc").unwrap();
    let mut reader = RollingFileReader::new(&path);

    assert_eq!(reader.read_new().unwrap(), "abc");
    assert_eq!(reader.read_new().unwrap(), "");
}

#[test]
fn rotation_to_shorter_file_restarts_at_zero() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("svc.out");
    fs::write(&path, "a long first generation\n").unwrap();
    let mut reader = RollingFileReader::new(&path);
    reader.read_new().unwrap();

    fs::write(&path, "new\n").unwrap();

    assert_eq!(reader.read_new().unwrap(), "new\n");
    assert_eq!(reader.state().file_pointer, 4);
}

#[test]
fn recreated_file_is_picked_up_within_retries() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("svc.out");
    fs::write(&path, "old generation\n").unwrap();
    let mut reader =
        RollingFileReader::new(&path).with_retry_policy(50, Duration::from_millis(10));
    reader.read_new().unwrap();
    fs::remove_file(&path).unwrap();

    let writer_path = path.clone();
    let writer = std::thread::spawn(move || {
        std::thread::sleep(Duration::from_millis(50));
        fs::write(writer_path, "fresh\n").unwrap();
    });

    assert_eq!(reader.read_new().unwrap(), "fresh\n");
    assert!(reader.exists());
    writer.join().unwrap();
}

#[test]
fn tailer_dispatches_lines_per_file() {
    let dir = tempfile::tempdir().unwrap();
    fs::write(dir.path().join("web.out"), "started\nlistening\n").unwrap();
    fs::write(dir.path().join("web.err"), "deprecated flag\n").unwrap();
    fs::write(dir.path().join("other.out"), "ignored\n").unwrap();
    let (lines, handler) = collector();

    let tailer = DirectoryTailer::new(dir.path(), &service_log_pattern("web"), handler).unwrap();
    tailer.poll().unwrap();

    assert_eq!(tailer.tracked(), vec!["web.err", "web.out"]);
    let mut seen = lines.lock().clone();
    seen.sort();
    assert_eq!(
        seen,
        vec![
            ("web.err".to_string(), "deprecated flag".to_string()),
            ("web.out".to_string(), "listening".to_string()),
            ("web.out".to_string(), "started".to_string()),
        ]
    );
}

#[test]
fn tailer_only_reports_new_lines() {
    let dir = tempfile::tempdir().unwrap();
    let out = dir.path().join("web.out");
    fs::write(&out, "one\n").unwrap();
    let (lines, handler) = collector();
    let tailer = DirectoryTailer::new(dir.path(), r"web\.out", handler).unwrap();
    tailer.poll().unwrap();

    append(&out, "two\n");
    tailer.poll().unwrap();
    tailer.poll().unwrap();

    let seen: Vec<String> = lines.lock().iter().map(|(_, l)| l.clone()).collect();
    assert_eq!(seen, vec!["one", "two"]);
}

#[test]
fn files_appearing_later_are_tracked() {
    let dir = tempfile::tempdir().unwrap();
    let (lines, handler) = collector();
    let tailer = DirectoryTailer::new(dir.path(), r"web\.(out|err)", handler).unwrap();
    tailer.poll().unwrap();
    assert!(tailer.tracked().is_empty());

    fs::write(dir.path().join("web.out"), "hello\n").unwrap();
    tailer.poll().unwrap();

    assert_eq!(tailer.tracked(), vec!["web.out"]);
    assert_eq!(lines.lock().len(), 1);
}

#[test]
fn removed_files_are_dropped() {
    let dir = tempfile::tempdir().unwrap();
    let out = dir.path().join("web.out");
    fs::write(&out, "hello\n").unwrap();
    let (_, handler) = collector();
    let tailer = DirectoryTailer::new(dir.path(), r"web\.out", handler)
        .unwrap()
        .with_retry_policy(0, Duration::ZERO);
    tailer.poll().unwrap();

    fs::remove_file(&out).unwrap();
    tailer.poll().unwrap();

    assert!(tailer.tracked().is_empty());
}

#[tokio::test]
async fn background_tailer_stops_cleanly() {
    let dir = tempfile::tempdir().unwrap();
    let out = dir.path().join("web.out");
    fs::write(&out, "boot\n").unwrap();
    let (lines, handler) = collector();
    let tailer = Arc::new(DirectoryTailer::new(dir.path(), r"web\.out", handler).unwrap());

    let handle = Arc::clone(&tailer).spawn(Duration::from_millis(10));
    for _ in 0..200 {
        if !lines.lock().is_empty() {
            break;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    handle.stop().await.unwrap();

    assert_eq!(lines.lock()[0].1, "boot");
}
