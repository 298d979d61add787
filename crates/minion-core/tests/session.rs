//! End-to-end tests for the build session facade.

#![cfg(unix)]

use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use minion_core::{
    BuildConfig, BuildOptions, BuildSession, BuildStatus, EngineConfig, FileOpener, OutputBuffer,
    Patterns, StatusSink,
};

const WAIT: Duration = Duration::from_secs(10);

#[derive(Default)]
struct Host {
    statuses: Mutex<Vec<String>>,
    opened: Mutex<Vec<(PathBuf, usize, usize)>>,
}

impl StatusSink for Host {
    fn status(&self, message: &str) {
        self.statuses.lock().unwrap().push(message.to_string());
    }
}

impl FileOpener for Host {
    fn open(&self, path: &Path, line: usize, column: usize) {
        self.opened.lock().unwrap().push((path.to_path_buf(), line, column));
    }
}

fn session() -> (BuildSession, OutputBuffer, Arc<Host>) {
    let buffer = OutputBuffer::new();
    let host = Arc::new(Host::default());
    let config = EngineConfig {
        poll_interval_ms: 20,
        ..EngineConfig::default()
    };
    let session = BuildSession::new(Arc::new(buffer.clone()), host.clone(), host.clone(), config).unwrap();
    (session, buffer, host)
}

fn sh(script: &str) -> Vec<String> {
    vec!["sh".to_string(), "-c".to_string(), script.to_string()]
}

#[test]
fn test_build_then_navigate_wraps() {
    let dir = tempfile::tempdir().unwrap();
    let (session, buffer, host) = session();

    let script = "echo 'src/a.c:10:5: error: foo'; echo 'src/b.c:2: warning: bar'; exit 1";
    let report = session
        .submit(sh(script), dir.path(), BuildOptions::default())
        .unwrap()
        .wait_timeout(WAIT)
        .unwrap();
    assert_eq!(report.status, BuildStatus::Finished);
    assert_eq!(report.diagnostics, 2);

    let text = buffer.snapshot();
    let first = session.navigate(true).unwrap();
    assert_eq!(first.record.span.slice(&text), Some("src/a.c:10:5: error: foo\n"));
    assert_eq!(session.navigate(true).unwrap().record.line, 2);
    assert_eq!(session.navigate(true).unwrap().record.line, 10);
    assert_eq!(session.navigate(false).unwrap().record.line, 2);

    let opened = host.opened.lock().unwrap();
    assert_eq!(opened.len(), 4);
    assert_eq!(opened[0], (dir.path().join("src/a.c"), 10, 5));
    assert_eq!(buffer.highlights().len(), 4);
}

#[test]
fn test_ignore_patterns_and_verbose() {
    let dir = tempfile::tempdir().unwrap();
    let (session, buffer, _) = session();
    let script = "echo 'make: Entering directory'; echo kept";

    let options = BuildOptions {
        ignore_errors: Some(Patterns::from("make: ")),
        ..BuildOptions::default()
    };
    session.submit(sh(script), dir.path(), options.clone()).unwrap().wait_timeout(WAIT).unwrap();
    assert!(!buffer.snapshot().contains("Entering"));
    assert!(buffer.snapshot().contains("kept\n"));

    let verbose = BuildOptions {
        verbose: true,
        ..options
    };
    session.submit(sh(script), dir.path(), verbose).unwrap().wait_timeout(WAIT).unwrap();
    assert!(buffer.snapshot().contains("make: Entering directory\n"));
}

#[test]
fn test_file_regex_and_env_from_config() {
    let dir = tempfile::tempdir().unwrap();
    let (session, _, _) = session();

    let json = format!(
        r#"{{
            "cmd": ["sh", "-c", "echo \"ERROR $FILE($LINE,7): broken\"; exit 3"],
            "working_dir": {:?},
            "file_regex": "^ERROR (\\S+)\\((\\d+),(\\d+)\\): (.*)$",
            "env": {{"FILE": "x.ts", "LINE": "12"}}
        }}"#,
        dir.path().display().to_string()
    );
    let config = BuildConfig::from_json(&json).unwrap();

    let report = session.submit_config(config).unwrap().wait_timeout(WAIT).unwrap();
    assert_eq!(report.exit_code, Some(3));

    let diagnostics = session.diagnostics();
    assert_eq!(diagnostics.len(), 1);
    assert_eq!(diagnostics[0].file, dir.path().join("x.ts"));
    assert_eq!((diagnostics[0].line, diagnostics[0].column), (12, 7));
    assert_eq!(diagnostics[0].message, "broken");
}

#[test]
fn test_new_build_clears_diagnostics() {
    let dir = tempfile::tempdir().unwrap();
    let (session, buffer, host) = session();

    session
        .submit(sh("echo 'a.c:1:1: error: x'"), dir.path(), BuildOptions::default())
        .unwrap()
        .wait_timeout(WAIT)
        .unwrap();
    assert_eq!(session.diagnostics().len(), 1);

    let slow = session
        .submit(sh("echo started; exec sleep 30"), dir.path(), BuildOptions::default())
        .unwrap();
    let start = std::time::Instant::now();
    while !buffer.snapshot().contains("started") {
        assert!(start.elapsed() < WAIT);
        std::thread::sleep(Duration::from_millis(10));
    }
    assert!(session.diagnostics().is_empty());
    assert!(session.navigate(true).is_none());
    assert_eq!(host.statuses.lock().unwrap().last().map(String::as_str), Some("No more errors"));

    session.cancel_current();
    let report = slow.wait_timeout(WAIT).unwrap();
    assert_eq!(report.status, BuildStatus::Cancelled);
    assert!(buffer.snapshot().ends_with("[Cancelled build.]\n"));
}

#[test]
fn test_submit_after_shutdown_fails() {
    let (session, _, _) = session();
    session.shutdown();
    let err = session.submit(sh("true"), "/", BuildOptions::default()).unwrap_err();
    assert!(matches!(err, minion_core::Error::WorkerUnavailable));
}
