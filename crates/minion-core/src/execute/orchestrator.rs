//! Serialized build execution on a single worker thread.
//!
//! Requests are served strictly in submission order and at most one build
//! process is alive at any time. Submitting a build cancels the one currently
//! streaming, so the newest request always wins; a build with a newer build
//! already queued behind it is cancelled before it starts. `cancel_current`
//! only aborts the streaming build and never drops a queued one. Every
//! request receives exactly one terminal callback.

use std::collections::VecDeque;
use std::panic::{AssertUnwindSafe, catch_unwind};
use std::sync::{Arc, Condvar, Mutex, MutexGuard};
use std::thread::{self, JoinHandle};
use std::time::Instant;

use crate::config::EngineConfig;
use crate::error::{Error, Result};
use crate::sink::OutputSink;

use super::cancel::CancelToken;
use super::request::{
    BuildContext, BuildOutcome, BuildRequest, BuildSpec, BuildStatus, FilterAction, LineFilter,
    SYNTHETIC_EXIT_CODE,
};
use super::task::{ProcessTask, TaskConfig, TaskPoll};

/// Observable phase of the worker.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OrchestratorState {
    /// Waiting for work.
    Idle,
    /// Streaming a build's output.
    Running,
    /// Output ended; running the finish callbacks.
    Finishing,
    /// Build was superseded; running the cancel callback.
    Cancelling,
    /// Worker has exited.
    Stopped,
}

enum QueueItem {
    Build(BuildRequest),
    Shutdown,
}

impl QueueItem {
    /// Whether this item supersedes a build dequeued ahead of it.
    fn supersedes(&self) -> bool {
        matches!(self, QueueItem::Build(_) | QueueItem::Shutdown)
    }
}

struct Inner {
    queue: VecDeque<QueueItem>,
    /// Token of the build being processed, if any.
    current: Option<CancelToken>,
    state: OrchestratorState,
    accepting: bool,
}

struct Shared {
    inner: Mutex<Inner>,
    ready: Condvar,
    sink: Arc<dyn OutputSink>,
    task_config: TaskConfig,
}

impl Shared {
    fn lock(&self) -> MutexGuard<'_, Inner> {
        self.inner.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    fn set_state(&self, state: OrchestratorState) {
        self.lock().state = state;
    }

    fn enqueue(&self, item: QueueItem) -> Result<()> {
        let mut inner = self.lock();
        if !inner.accepting {
            return Err(Error::WorkerUnavailable);
        }
        inner.queue.push_back(item);
        if let Some(token) = &inner.current {
            token.cancel();
        }
        self.ready.notify_one();
        Ok(())
    }
}

/// Owns the build queue and the worker thread draining it.
pub struct BuildOrchestrator {
    shared: Arc<Shared>,
    worker: Mutex<Option<JoinHandle<()>>>,
}

impl BuildOrchestrator {
    /// Start a worker that writes build output to `sink`.
    pub fn new(sink: Arc<dyn OutputSink>, config: &EngineConfig) -> Result<Self> {
        let shared = Arc::new(Shared {
            inner: Mutex::new(Inner {
                queue: VecDeque::new(),
                current: None,
                state: OrchestratorState::Idle,
                accepting: true,
            }),
            ready: Condvar::new(),
            sink,
            task_config: TaskConfig::from(config),
        });

        let worker_shared = Arc::clone(&shared);
        let worker = thread::Builder::new()
            .name("minion-build-worker".to_string())
            .spawn(move || run_worker(&worker_shared))?;

        Ok(Self {
            shared,
            worker: Mutex::new(Some(worker)),
        })
    }

    /// Queue a build and cancel whatever is currently streaming.
    ///
    /// Returns immediately; fails only after `shutdown`.
    pub fn submit(&self, request: BuildRequest) -> Result<()> {
        tracing::debug!("queueing build {}", request.spec().display_command());
        self.shared.enqueue(QueueItem::Build(request))
    }

    /// Cancel the in-flight build without starting a replacement.
    ///
    /// Queued builds are left alone and run next.
    pub fn cancel_current(&self) {
        match &self.shared.lock().current {
            Some(token) => token.cancel(),
            None => tracing::debug!("cancel ignored: no build in progress"),
        }
    }

    /// Cancel outstanding work and stop the worker. Idempotent.
    pub fn shutdown(&self) {
        {
            let mut inner = self.shared.lock();
            if inner.accepting {
                inner.accepting = false;
                inner.queue.push_back(QueueItem::Shutdown);
                if let Some(token) = &inner.current {
                    token.cancel();
                }
                self.shared.ready.notify_one();
            }
        }

        let handle = self
            .worker
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .take();
        if let Some(handle) = handle {
            tracing::debug!("waiting for build worker to stop");
            if handle.join().is_err() {
                tracing::error!("build worker panicked");
            }
        }
    }

    pub fn state(&self) -> OrchestratorState {
        self.shared.lock().state
    }

    /// Number of builds waiting behind the current one.
    pub fn pending(&self) -> usize {
        self.shared
            .lock()
            .queue
            .iter()
            .filter(|item| matches!(item, QueueItem::Build(_)))
            .count()
    }

    /// Whether a build is in progress or waiting.
    pub fn is_busy(&self) -> bool {
        let inner = self.shared.lock();
        inner.current.is_some() || inner.queue.iter().any(|item| matches!(item, QueueItem::Build(_)))
    }
}

impl Drop for BuildOrchestrator {
    fn drop(&mut self) {
        self.shutdown();
    }
}

fn run_worker(shared: &Shared) {
    tracing::debug!("build worker started");

    loop {
        let (request, token) = {
            let mut inner = shared.lock();
            let item = loop {
                if let Some(item) = inner.queue.pop_front() {
                    break item;
                }
                inner = shared.ready.wait(inner).unwrap_or_else(|poisoned| poisoned.into_inner());
            };

            match item {
                QueueItem::Build(request) => {
                    let token = CancelToken::new();
                    if inner.queue.iter().any(QueueItem::supersedes) {
                        token.cancel();
                    }
                    inner.current = Some(token.clone());
                    inner.state = OrchestratorState::Running;
                    (request, token)
                }
                QueueItem::Shutdown => {
                    inner.state = OrchestratorState::Stopped;
                    inner.accepting = false;
                    break;
                }
            }
        };

        // Filters are guarded inside run_build; this catches panicking callbacks.
        let command = request.spec().display_command();
        if let Err(reason) = guarded(|| run_build(shared, request, &token)) {
            tracing::error!("callback for build {command} panicked: {reason}");
            shared
                .sink
                .append(&format!("[Running task {command} failed: {reason}]\n"));
        }

        let mut inner = shared.lock();
        inner.current = None;
        inner.state = OrchestratorState::Idle;
    }

    tracing::debug!("build worker stopped");
}

/// How a build's streaming phase ended.
enum Ending {
    Finished(Option<i32>),
    Cancelled,
    /// Could not start, or a filter panicked.
    Failed(String),
}

/// Drive one request to its terminal callback.
fn run_build(shared: &Shared, request: BuildRequest, token: &CancelToken) {
    let BuildRequest {
        spec,
        mut filter,
        on_started,
        on_finished,
        on_cancelled,
    } = request;

    let start = Instant::now();
    let mut cx = BuildContext::new(shared.sink.as_ref());

    if let Some(on_started) = on_started {
        on_started(&spec);
    }
    cx.clear();
    cx.append("[Building...]\n");

    let ending = if token.is_cancelled() {
        tracing::debug!("build {} superseded before start", spec.display_command());
        Ending::Cancelled
    } else {
        stream(shared, &spec, &mut filter, token, &mut cx)
    };

    let outcome = |status, exit_code, cx: &BuildContext<'_>| BuildOutcome {
        spec: spec.clone(),
        status,
        output: cx.output().to_string(),
        exit_code,
        elapsed: start.elapsed(),
    };

    match ending {
        Ending::Finished(exit_code) => {
            shared.set_state(OrchestratorState::Finishing);
            let outcome = outcome(BuildStatus::Finished, exit_code, &cx);
            tracing::info!(
                "finished {} with {:?} after {:.2?}",
                spec.display_command(),
                outcome.exit_code,
                outcome.elapsed
            );
            on_finished(&outcome, &mut cx);
        }
        Ending::Cancelled => {
            tracing::info!("cancelled {} after {:.2?}", spec.display_command(), start.elapsed());
            shared.set_state(OrchestratorState::Cancelling);
            let outcome = outcome(BuildStatus::Cancelled, None, &cx);
            on_cancelled(&outcome, &mut cx);
        }
        Ending::Failed(reason) => {
            tracing::error!("build {} failed: {reason}", spec.display_command());
            cx.append(&format!("[Running task {} failed: {reason}]\n", spec.display_command()));
            shared.set_state(OrchestratorState::Finishing);
            let outcome = outcome(BuildStatus::Failed, Some(SYNTHETIC_EXIT_CODE), &cx);
            on_finished(&outcome, &mut cx);
        }
    }
}

/// Spawn the build and push its output through the filter.
fn stream(
    shared: &Shared,
    spec: &BuildSpec,
    filter: &mut Box<dyn LineFilter>,
    token: &CancelToken,
    cx: &mut BuildContext<'_>,
) -> Ending {
    let mut task = match ProcessTask::start(spec, &shared.task_config) {
        Ok(task) => task,
        Err(Error::Spawn { source, .. }) => return Ending::Failed(source.to_string()),
        Err(e) => return Ending::Failed(e.to_string()),
    };

    tracing::info!("building {} in {}", spec.display_command(), spec.working_dir.display());

    loop {
        if token.is_cancelled() {
            task.terminate();
            return Ending::Cancelled;
        }

        match task.next() {
            Some(TaskPoll::Line(line)) => match guarded(|| filter.filter(&line, cx)) {
                Ok(FilterAction::Emit) => cx.append(&line),
                Ok(FilterAction::Suppress) => {}
                Err(reason) => {
                    task.terminate();
                    return Ending::Failed(format!("filter panicked: {reason}"));
                }
            },
            Some(TaskPoll::Idle) => {}
            None => break,
        }
    }

    shared.set_state(OrchestratorState::Finishing);
    match guarded(|| filter.finish(cx)) {
        Ok(()) => Ending::Finished(task.exit_code()),
        Err(reason) => Ending::Failed(format!("filter panicked: {reason}")),
    }
}

/// Run user code, turning a panic into its message.
fn guarded<T>(f: impl FnOnce() -> T) -> std::result::Result<T, String> {
    catch_unwind(AssertUnwindSafe(f)).map_err(|panic| panic_message(panic.as_ref()))
}

fn panic_message(panic: &(dyn std::any::Any + Send)) -> String {
    if let Some(message) = panic.downcast_ref::<&str>() {
        (*message).to_string()
    } else if let Some(message) = panic.downcast_ref::<String>() {
        message.clone()
    } else {
        "panic".to_string()
    }
}
