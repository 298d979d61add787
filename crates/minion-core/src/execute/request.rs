//! Build requests, per-build filter state, and terminal outcomes.

use std::path::{Path, PathBuf};
use std::time::Duration;

use regex::Regex;

use crate::error::{Error, Result};
use crate::sink::OutputSink;

/// Immutable description of one build.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BuildSpec {
    /// Program followed by its arguments.
    pub command: Vec<String>,

    /// Directory the command runs in.
    pub working_dir: PathBuf,

    /// Extra environment variables layered over the inherited environment.
    pub env: Vec<(String, String)>,
}

impl BuildSpec {
    pub fn new<I, S>(command: I, working_dir: impl Into<PathBuf>) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            command: command.into_iter().map(Into::into).collect(),
            working_dir: working_dir.into(),
            env: Vec::new(),
        }
    }

    /// Add an environment variable for the child process.
    pub fn with_env(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.env.push((key.into(), value.into()));
        self
    }

    /// Command rendered as a list, e.g. `["make", "-j8"]`.
    pub fn display_command(&self) -> String {
        format!("{:?}", self.command)
    }

    pub(crate) fn validate(&self) -> Result<()> {
        match self.command.first() {
            Some(program) if !program.is_empty() => Ok(()),
            _ => Err(Error::InvalidRequest("command is empty".to_string())),
        }
    }
}

/// Whether a filtered line should be appended to the sink.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FilterAction {
    Emit,
    Suppress,
}

/// Per-build view of the output sink handed to filters and callbacks.
///
/// Everything appended through the context is also recorded in the build
/// transcript that `on_finished` receives.
pub struct BuildContext<'a> {
    sink: &'a dyn OutputSink,
    transcript: String,
}

impl<'a> BuildContext<'a> {
    pub(crate) fn new(sink: &'a dyn OutputSink) -> Self {
        Self {
            sink,
            transcript: String::new(),
        }
    }

    /// Append text to the sink.
    pub fn append(&mut self, text: &str) {
        self.transcript.push_str(text);
        self.sink.append(text);
    }

    /// Text appended so far during this build.
    pub fn output(&self) -> &str {
        &self.transcript
    }

    pub(crate) fn clear(&mut self) {
        self.transcript.clear();
        self.sink.clear();
    }

    pub(crate) fn take_output(&mut self) -> String {
        std::mem::take(&mut self.transcript)
    }
}

/// Decides what of a build's output reaches the sink.
///
/// A filter value lives for exactly one build; whatever state it keeps
/// (lookahead buffers, counters) is dropped with the request.
pub trait LineFilter: Send {
    /// Inspect one line. The line is appended when `Emit` is returned;
    /// filters holding lines back may append earlier ones through `cx`.
    fn filter(&mut self, line: &str, cx: &mut BuildContext<'_>) -> FilterAction;

    /// Called once after natural end of output, before `on_finished`.
    fn finish(&mut self, _cx: &mut BuildContext<'_>) {}
}

/// Emits every line.
#[derive(Debug, Default, Clone, Copy)]
pub struct PassThrough;

impl LineFilter for PassThrough {
    fn filter(&mut self, _line: &str, _cx: &mut BuildContext<'_>) -> FilterAction {
        FilterAction::Emit
    }
}

/// Suppresses lines matching any ignore pattern at their start.
#[derive(Debug, Clone, Default)]
pub struct IgnoreFilter {
    patterns: Vec<Regex>,
    ignored: usize,
}

impl IgnoreFilter {
    pub fn new(patterns: Vec<Regex>) -> Self {
        Self {
            patterns,
            ignored: 0,
        }
    }

    /// Number of lines suppressed so far.
    pub fn ignored(&self) -> usize {
        self.ignored
    }
}

impl LineFilter for IgnoreFilter {
    fn filter(&mut self, line: &str, _cx: &mut BuildContext<'_>) -> FilterAction {
        let matched = self
            .patterns
            .iter()
            .any(|pattern| pattern.find(line).is_some_and(|m| m.start() == 0));

        if matched {
            self.ignored += 1;
            FilterAction::Suppress
        } else {
            FilterAction::Emit
        }
    }
}

/// How a build ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BuildStatus {
    /// Output ended and the process exited on its own.
    Finished,
    /// Superseded by a later request or an explicit cancel.
    Cancelled,
    /// The process could not be started or streamed.
    Failed,
}

/// Exit code reported for builds that never produced one.
pub const SYNTHETIC_EXIT_CODE: i32 = -1;

/// Terminal outcome of a build, handed to `on_finished` / `on_cancelled`.
#[derive(Debug, Clone)]
pub struct BuildOutcome {
    pub spec: BuildSpec,
    pub status: BuildStatus,
    /// Text appended to the sink during the build.
    pub output: String,
    /// `None` when the process was killed by a signal or cancelled.
    pub exit_code: Option<i32>,
    pub elapsed: Duration,
}

impl BuildOutcome {
    pub fn working_dir(&self) -> &Path {
        &self.spec.working_dir
    }

    pub fn succeeded(&self) -> bool {
        self.status == BuildStatus::Finished && self.exit_code == Some(0)
    }

    /// The `[Finished ...]` trailer appended by the default `on_finished`.
    pub fn finish_message(&self) -> String {
        let elapsed = self.elapsed.as_secs_f64();
        match self.exit_code {
            Some(0) => format!("[Finished in {elapsed:.2}s]\n"),
            code => {
                let code = code.map_or_else(|| "none (terminated)".to_string(), |c| c.to_string());
                format!(
                    "[Finished in {elapsed:.2}s with exit code {code}]\n[cmd: {}]\n[dir: {}]\n",
                    self.spec.display_command(),
                    self.spec.working_dir.display()
                )
            }
        }
    }
}

/// Called once when the worker picks the request up.
pub type StartedCallback = Box<dyn FnOnce(&BuildSpec) + Send>;

/// Called once with the terminal outcome.
pub type OutcomeCallback = Box<dyn FnOnce(&BuildOutcome, &mut BuildContext<'_>) + Send>;

/// One queued build: what to run plus how to present it.
pub struct BuildRequest {
    pub(crate) spec: BuildSpec,
    pub(crate) filter: Box<dyn LineFilter>,
    pub(crate) on_started: Option<StartedCallback>,
    pub(crate) on_finished: OutcomeCallback,
    pub(crate) on_cancelled: OutcomeCallback,
}

impl BuildRequest {
    /// A request with the default filter and callbacks.
    pub fn new(spec: BuildSpec) -> Self {
        Self {
            spec,
            filter: Box::new(PassThrough),
            on_started: None,
            on_finished: Box::new(default_on_finished),
            on_cancelled: Box::new(default_on_cancelled),
        }
    }

    pub fn spec(&self) -> &BuildSpec {
        &self.spec
    }

    pub fn with_filter(mut self, filter: impl LineFilter + 'static) -> Self {
        self.filter = Box::new(filter);
        self
    }

    pub fn on_started(mut self, callback: impl FnOnce(&BuildSpec) + Send + 'static) -> Self {
        self.on_started = Some(Box::new(callback));
        self
    }

    pub fn on_finished(
        mut self,
        callback: impl FnOnce(&BuildOutcome, &mut BuildContext<'_>) + Send + 'static,
    ) -> Self {
        self.on_finished = Box::new(callback);
        self
    }

    pub fn on_cancelled(
        mut self,
        callback: impl FnOnce(&BuildOutcome, &mut BuildContext<'_>) + Send + 'static,
    ) -> Self {
        self.on_cancelled = Box::new(callback);
        self
    }
}

impl std::fmt::Debug for BuildRequest {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("BuildRequest").field("spec", &self.spec).finish_non_exhaustive()
    }
}

/// Appends the `[Finished ...]` trailer.
pub fn default_on_finished(outcome: &BuildOutcome, cx: &mut BuildContext<'_>) {
    cx.append(&outcome.finish_message());
}

/// Appends `[Cancelled build.]`.
pub fn default_on_cancelled(_outcome: &BuildOutcome, cx: &mut BuildContext<'_>) {
    cx.append("[Cancelled build.]\n");
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::sink::OutputBuffer;

    fn outcome(exit_code: Option<i32>) -> BuildOutcome {
        BuildOutcome {
            spec: BuildSpec::new(["make", "-j8"], "/work"),
            status: BuildStatus::Finished,
            output: String::new(),
            exit_code,
            elapsed: Duration::from_millis(1250),
        }
    }

    #[test]
    fn test_finish_message_success() {
        assert_eq!(outcome(Some(0)).finish_message(), "[Finished in 1.25s]\n");
        assert!(outcome(Some(0)).succeeded());
    }

    #[test]
    fn test_finish_message_failure() {
        let message = outcome(Some(2)).finish_message();
        assert_eq!(
            message,
            "[Finished in 1.25s with exit code 2]\n[cmd: [\"make\", \"-j8\"]]\n[dir: /work]\n"
        );
    }

    #[test]
    fn test_empty_command_is_invalid() {
        let spec = BuildSpec::new(Vec::<String>::new(), "/work");
        assert!(matches!(spec.validate(), Err(Error::InvalidRequest(_))));
        assert!(BuildSpec::new([""], "/work").validate().is_err());
    }

    #[test]
    fn test_ignore_filter_anchors_at_line_start() {
        let buffer = OutputBuffer::new();
        let mut cx = BuildContext::new(&buffer);
        let mut filter = IgnoreFilter::new(vec![Regex::new("make: Entering").unwrap()]);

        assert_eq!(filter.filter("make: Entering directory\n", &mut cx), FilterAction::Suppress);
        assert_eq!(filter.filter("  make: Entering directory\n", &mut cx), FilterAction::Emit);
        assert_eq!(filter.ignored(), 1);
    }

    #[test]
    fn test_context_records_transcript() {
        let buffer = OutputBuffer::new();
        let mut cx = BuildContext::new(&buffer);
        cx.append("one\n");
        cx.append("two\n");
        assert_eq!(cx.output(), "one\ntwo\n");
        assert_eq!(buffer.snapshot(), "one\ntwo\n");

        assert_eq!(cx.take_output(), "one\ntwo\n");
        assert!(cx.output().is_empty());
    }
}
