//! End-to-end tests for build orchestration.

#![cfg(unix)]

use std::sync::mpsc;
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

use minion_core::{
    BuildOrchestrator, BuildRequest, BuildSpec, BuildStatus, EngineConfig, OrchestratorState,
    OutputBuffer,
};

const WAIT: Duration = Duration::from_secs(10);

fn config() -> EngineConfig {
    EngineConfig {
        poll_interval_ms: 20,
        ..EngineConfig::default()
    }
}

fn sh(script: &str) -> BuildSpec {
    BuildSpec::new(["sh", "-c", script], std::env::temp_dir())
}

#[derive(Debug, Clone, PartialEq, Eq)]
enum Event {
    Started(usize),
    Finished(usize, BuildStatus),
    Cancelled(usize),
}

fn tracked(index: usize, spec: BuildSpec, events: &Arc<Mutex<Vec<Event>>>) -> BuildRequest {
    let started = Arc::clone(events);
    let finished = Arc::clone(events);
    let cancelled = Arc::clone(events);
    BuildRequest::new(spec)
        .on_started(move |_| started.lock().unwrap().push(Event::Started(index)))
        .on_finished(move |outcome, _| finished.lock().unwrap().push(Event::Finished(index, outcome.status)))
        .on_cancelled(move |_, _| cancelled.lock().unwrap().push(Event::Cancelled(index)))
}

fn wait_for(mut condition: impl FnMut() -> bool) {
    let start = Instant::now();
    while !condition() {
        assert!(start.elapsed() < WAIT, "timed out");
        std::thread::sleep(Duration::from_millis(10));
    }
}

#[test]
fn test_every_request_gets_one_terminal_callback_in_order() {
    let orchestrator = BuildOrchestrator::new(Arc::new(OutputBuffer::new()), &config()).unwrap();
    let events = Arc::new(Mutex::new(Vec::new()));

    for index in 0..5 {
        orchestrator.submit(tracked(index, sh("echo hi"), &events)).unwrap();
    }
    wait_for(|| events.lock().unwrap().len() == 10);

    let events = events.lock().unwrap().clone();
    for (index, pair) in events.chunks(2).enumerate() {
        assert_eq!(pair[0], Event::Started(index));
        match &pair[1] {
            Event::Finished(i, _) | Event::Cancelled(i) => assert_eq!(*i, index),
            other => panic!("unexpected {other:?}"),
        }
    }
    assert_eq!(events[9], Event::Finished(4, BuildStatus::Finished));
}

#[test]
fn test_new_submission_supersedes_running_build() {
    let buffer = OutputBuffer::new();
    let orchestrator = BuildOrchestrator::new(Arc::new(buffer.clone()), &config()).unwrap();
    let events = Arc::new(Mutex::new(Vec::new()));
    let start = Instant::now();

    orchestrator
        .submit(tracked(0, sh("echo first; exec sleep 30"), &events))
        .unwrap();
    wait_for(|| buffer.snapshot().contains("first"));
    assert_eq!(orchestrator.state(), OrchestratorState::Running);

    orchestrator.submit(tracked(1, sh("echo second"), &events)).unwrap();
    wait_for(|| events.lock().unwrap().len() == 4);

    assert_eq!(
        *events.lock().unwrap(),
        vec![
            Event::Started(0),
            Event::Cancelled(0),
            Event::Started(1),
            Event::Finished(1, BuildStatus::Finished),
        ]
    );
    assert!(start.elapsed() < WAIT);
    assert!(buffer.snapshot().starts_with("[Building...]\nsecond\n"));
}

#[test]
fn test_cancel_current_stops_build() {
    let buffer = OutputBuffer::new();
    let orchestrator = BuildOrchestrator::new(Arc::new(buffer.clone()), &config()).unwrap();
    let (tx, rx) = mpsc::channel();

    orchestrator
        .submit(BuildRequest::new(sh("echo waiting; exec sleep 30")).on_cancelled(move |outcome, cx| {
            cx.append("[Cancelled build.]\n");
            tx.send((outcome.status, outcome.exit_code)).unwrap();
        }))
        .unwrap();
    wait_for(|| buffer.snapshot().contains("waiting"));

    orchestrator.cancel_current();
    assert_eq!(rx.recv_timeout(WAIT).unwrap(), (BuildStatus::Cancelled, None));
    wait_for(|| !orchestrator.is_busy());
    assert_eq!(buffer.snapshot(), "[Building...]\nwaiting\n[Cancelled build.]\n");
}

#[test]
fn test_drop_cancels_in_flight_build() {
    let events = Arc::new(Mutex::new(Vec::new()));
    let buffer = OutputBuffer::new();
    let start = Instant::now();
    {
        let orchestrator = BuildOrchestrator::new(Arc::new(buffer.clone()), &config()).unwrap();
        orchestrator
            .submit(tracked(0, sh("echo busy; exec sleep 30"), &events))
            .unwrap();
        wait_for(|| buffer.snapshot().contains("busy"));
    }
    assert!(start.elapsed() < WAIT);
    assert_eq!(*events.lock().unwrap(), vec![Event::Started(0), Event::Cancelled(0)]);
}

#[test]
fn test_outcome_carries_output_and_exit_code() {
    let orchestrator = BuildOrchestrator::new(Arc::new(OutputBuffer::new()), &config()).unwrap();
    let (tx, rx) = mpsc::channel();

    orchestrator
        .submit(
            BuildRequest::new(sh("echo out; echo err >&2; exit 4")).on_finished(move |outcome, _| {
                tx.send(outcome.clone()).unwrap();
            }),
        )
        .unwrap();

    let outcome = rx.recv_timeout(WAIT).unwrap();
    assert_eq!(outcome.status, BuildStatus::Finished);
    assert_eq!(outcome.exit_code, Some(4));
    assert!(outcome.output.starts_with("[Building...]\n"));
    assert!(outcome.output.contains("out\n"));
    assert!(outcome.output.contains("err\n"));
    assert!(!outcome.succeeded());
}
