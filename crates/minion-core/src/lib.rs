//! Core engine for the minion build runner.
//!
//! This crate provides:
//! - Serialized, cancellable execution of build commands
//! - Streaming of merged stdout/stderr through per-build line filters
//! - Diagnostic extraction (heuristic or pattern-driven) from build output
//! - Wrapping navigation over diagnostics, with path containment checks
//!
//! Hosts embed a [`BuildSession`] and implement the collaborator traits in
//! [`sink`] to receive output, status notices and "open file" requests.

pub mod config;
pub mod diagnostics;
pub mod error;
pub mod execute;
pub mod paths;
pub mod session;
pub mod sink;

pub use config::{BuildConfig, BuildOptions, EngineConfig, HeuristicConfig, Patterns};
pub use diagnostics::{
    Annotation, DiagnosticNavigator, DiagnosticRecord, HeuristicParser, Navigation, Overlay, Span,
    compile_pattern, extract,
};
pub use error::{Error, NavigationError, Result};
pub use execute::{
    BuildContext, BuildOrchestrator, BuildOutcome, BuildRequest, BuildSpec, BuildStatus,
    CancelToken, FilterAction, IgnoreFilter, LineFilter, OrchestratorState, ProcessTask, TaskPoll,
};
pub use session::{BuildHandle, BuildReport, BuildSession, DiagnosticSource};
pub use sink::{FileOpener, LogStatus, NoopOpener, OutputBuffer, OutputSink, StatusSink};
