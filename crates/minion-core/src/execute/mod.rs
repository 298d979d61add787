//! Build execution: process tasks and the serializing orchestrator.
//!
//! # Architecture
//!
//! ```text
//! BuildOrchestrator::submit(BuildRequest)
//!     │   (cancels the current build's CancelToken)
//!     ▼
//! queue ──► minion-build-worker
//!               │
//!               ├── on_started
//!               ├── ProcessTask::start ──► reader thread (stdout + stderr)
//!               │       │
//!               │       └── TaskPoll::Line / TaskPoll::Idle
//!               │               └── LineFilter ──► OutputSink
//!               │
//!               └── exactly one of on_finished / on_cancelled
//! ```
//!
//! # Module Structure
//!
//! - `cancel` - Cooperative cancellation token
//! - `orchestrator` - Queue and worker thread
//! - `request` - Build specs, filters, callbacks and outcomes
//! - `task` - Child process with a polled line stream

mod cancel;
mod orchestrator;
mod request;
mod task;

pub use cancel::CancelToken;
pub use orchestrator::{BuildOrchestrator, OrchestratorState};
pub use request::{
    BuildContext, BuildOutcome, BuildRequest, BuildSpec, BuildStatus, FilterAction, IgnoreFilter,
    LineFilter, OutcomeCallback, PassThrough, SYNTHETIC_EXIT_CODE, StartedCallback,
    default_on_cancelled, default_on_finished,
};
pub use task::{ProcessTask, TaskConfig, TaskPoll};
