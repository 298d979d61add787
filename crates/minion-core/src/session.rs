//! The facade hosts talk to: build submission plus diagnostic navigation.
//!
//! A [`BuildSession`] owns one [`BuildOrchestrator`] and one
//! [`DiagnosticNavigator`]. Builds submitted through [`BuildSession::submit`]
//! get ignore-pattern filtering and, once finished, have their output
//! parsed into the navigator's list. Starting a build clears the list, so
//! navigation never sees a partially streamed build.

use std::path::PathBuf;
use std::sync::mpsc::{self, Receiver, RecvTimeoutError};
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;

use regex::Regex;

use crate::config::{BuildConfig, BuildOptions, EngineConfig, HeuristicConfig, Patterns};
use crate::diagnostics::{
    DiagnosticNavigator, DiagnosticRecord, HeuristicParser, Navigation, Overlay, compile_pattern,
    parse_with_pattern,
};
use crate::error::Result;
use crate::execute::{BuildOrchestrator, BuildRequest, BuildSpec, BuildStatus, IgnoreFilter};
use crate::sink::{FileOpener, LogStatus, NoopOpener, OutputSink, StatusSink};

/// Input for [`BuildSession::set_diagnostics`].
#[derive(Debug, Clone)]
pub enum DiagnosticSource {
    /// Raw output text to parse.
    Text(String),
    /// Records produced elsewhere.
    List(Vec<DiagnosticRecord>),
}

/// Summary of a build submitted through the session.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BuildReport {
    pub status: BuildStatus,
    pub exit_code: Option<i32>,
    pub elapsed: Duration,
    /// Number of diagnostics extracted from the output.
    pub diagnostics: usize,
}

/// Waits for the terminal outcome of one submitted build.
#[derive(Debug)]
pub struct BuildHandle {
    report: Receiver<BuildReport>,
}

impl BuildHandle {
    /// Block until the build ends. `None` if the worker dropped the build
    /// without an outcome.
    pub fn wait(self) -> Option<BuildReport> {
        self.report.recv().ok()
    }

    /// Like `wait`, giving up after `timeout`.
    pub fn wait_timeout(&self, timeout: Duration) -> Option<BuildReport> {
        match self.report.recv_timeout(timeout) {
            Ok(report) => Some(report),
            Err(RecvTimeoutError::Timeout | RecvTimeoutError::Disconnected) => None,
        }
    }
}

/// Build orchestration and diagnostic navigation for one host.
pub struct BuildSession {
    orchestrator: BuildOrchestrator,
    sink: Arc<dyn OutputSink>,
    status: Arc<dyn StatusSink>,
    opener: Arc<dyn FileOpener>,
    navigator: Arc<Mutex<DiagnosticNavigator>>,
    heuristic: HeuristicConfig,
}

impl BuildSession {
    pub fn new(
        sink: Arc<dyn OutputSink>,
        status: Arc<dyn StatusSink>,
        opener: Arc<dyn FileOpener>,
        config: EngineConfig,
    ) -> Result<Self> {
        let orchestrator = BuildOrchestrator::new(Arc::clone(&sink), &config)?;
        Ok(Self {
            orchestrator,
            sink,
            status,
            opener,
            navigator: Arc::new(Mutex::new(DiagnosticNavigator::new())),
            heuristic: config.heuristic,
        })
    }

    /// A session that logs status notices and never opens files.
    pub fn headless(sink: Arc<dyn OutputSink>, config: EngineConfig) -> Result<Self> {
        Self::new(sink, Arc::new(LogStatus), Arc::new(NoopOpener), config)
    }

    /// Queue a build, cancelling the one in progress.
    ///
    /// Patterns in `options` are compiled here; a malformed one rejects the
    /// submission with `Error::MalformedPattern` and nothing is queued.
    pub fn submit(
        &self,
        command: Vec<String>,
        working_dir: impl Into<PathBuf>,
        options: BuildOptions,
    ) -> Result<BuildHandle> {
        let ignore = options
            .ignore_errors
            .iter()
            .flat_map(Patterns::iter)
            .map(compile_pattern)
            .collect::<Result<Vec<Regex>>>()?;
        let pattern = options.file_regex.as_deref().map(compile_pattern).transpose()?;

        let spec = options
            .env
            .into_iter()
            .fold(BuildSpec::new(command, working_dir), |spec, (key, value)| spec.with_env(key, value));

        let filter = if options.verbose {
            IgnoreFilter::default()
        } else {
            IgnoreFilter::new(ignore)
        };

        let (tx, rx) = mpsc::channel();
        let cancelled_tx = tx.clone();
        let started_navigator = Arc::clone(&self.navigator);
        let finished_navigator = Arc::clone(&self.navigator);
        let parser = HeuristicParser::new(self.heuristic.clone());

        let request = BuildRequest::new(spec)
            .with_filter(filter)
            .on_started(move |_| lock(&started_navigator).clear())
            .on_finished(move |outcome, cx| {
                cx.append(&outcome.finish_message());

                // Spans index the sink text, which is the transcript since clear.
                let records = match &pattern {
                    Some(pattern) => parse_with_pattern(cx.output(), outcome.working_dir(), pattern),
                    None => parser.parse(cx.output(), outcome.working_dir()),
                };
                tracing::debug!("extracted {} diagnostics", records.len());

                let count = records.len();
                lock(&finished_navigator).set_list(records, outcome.working_dir());
                let _ = tx.send(BuildReport {
                    status: outcome.status,
                    exit_code: outcome.exit_code,
                    elapsed: outcome.elapsed,
                    diagnostics: count,
                });
            })
            .on_cancelled(move |outcome, cx| {
                cx.append("[Cancelled build.]\n");
                let _ = cancelled_tx.send(BuildReport {
                    status: outcome.status,
                    exit_code: outcome.exit_code,
                    elapsed: outcome.elapsed,
                    diagnostics: 0,
                });
            });

        self.orchestrator.submit(request)?;
        Ok(BuildHandle { report: rx })
    }

    /// Submit a build described by a build config.
    pub fn submit_config(&self, config: BuildConfig) -> Result<BuildHandle> {
        self.submit(config.cmd, config.working_dir, config.options)
    }

    /// Queue a request with custom filter and callbacks.
    ///
    /// The navigator is left untouched by such builds.
    pub fn submit_request(&self, request: BuildRequest) -> Result<()> {
        self.orchestrator.submit(request)
    }

    pub fn cancel_current(&self) {
        self.orchestrator.cancel_current();
    }

    /// Cancel outstanding work and stop the worker.
    pub fn shutdown(&self) {
        self.orchestrator.shutdown();
    }

    pub fn is_busy(&self) -> bool {
        self.orchestrator.is_busy()
    }

    /// Step to the next (or previous) diagnostic and present it.
    ///
    /// Highlights and scrolls to the record in the sink, then asks the
    /// opener to show the file if it lies inside the build's working
    /// directory. Posts a status notice instead when the list is empty or
    /// the path escapes.
    pub fn navigate(&self, forward: bool) -> Option<Navigation> {
        let (step, working_dir) = {
            let mut navigator = lock(&self.navigator);
            let step = navigator.advance(forward);
            (step, navigator.working_dir().to_path_buf())
        };

        let navigation = match step {
            Ok(navigation) => navigation,
            Err(e) => {
                self.status.status(&e.to_string());
                return None;
            }
        };

        let span = navigation.record.span;
        self.sink.scroll_to(span);
        self.sink.add_highlight(span);

        if navigation.openable {
            self.opener
                .open(&navigation.path, navigation.record.line, navigation.record.column);
        } else {
            self.status.status(&format!(
                "Not opening {}: outside {}",
                navigation.path.display(),
                working_dir.display()
            ));
        }

        Some(navigation)
    }

    /// Replace the diagnostic list without running a build.
    ///
    /// With `Text`, `pattern` selects the pattern parser. The current list is
    /// kept if `pattern` does not compile.
    pub fn set_diagnostics(
        &self,
        source: DiagnosticSource,
        working_dir: impl Into<PathBuf>,
        pattern: Option<&str>,
    ) -> Result<()> {
        let working_dir = working_dir.into();
        let pattern = pattern.map(compile_pattern).transpose()?;

        let records = match source {
            DiagnosticSource::Text(text) => match &pattern {
                Some(pattern) => parse_with_pattern(&text, &working_dir, pattern),
                None => HeuristicParser::new(self.heuristic.clone()).parse(&text, &working_dir),
            },
            DiagnosticSource::List(records) => records,
        };

        lock(&self.navigator).set_list(records, working_dir);
        Ok(())
    }

    /// Current diagnostic list.
    pub fn diagnostics(&self) -> Arc<[DiagnosticRecord]> {
        lock(&self.navigator).diagnostics()
    }

    /// Per-file annotations for the current list.
    pub fn overlay(&self) -> Overlay {
        lock(&self.navigator).overlay().clone()
    }
}

fn lock(navigator: &Mutex<DiagnosticNavigator>) -> MutexGuard<'_, DiagnosticNavigator> {
    navigator.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::Error;
    use crate::sink::OutputBuffer;
    use std::path::Path;

    #[derive(Default)]
    struct Recorder {
        statuses: Mutex<Vec<String>>,
        opened: Mutex<Vec<(PathBuf, usize, usize)>>,
    }

    impl StatusSink for Recorder {
        fn status(&self, message: &str) {
            self.statuses.lock().unwrap().push(message.to_string());
        }
    }

    impl FileOpener for Recorder {
        fn open(&self, path: &Path, line: usize, column: usize) {
            self.opened.lock().unwrap().push((path.to_path_buf(), line, column));
        }
    }

    fn session() -> (BuildSession, OutputBuffer, Arc<Recorder>) {
        let buffer = OutputBuffer::new();
        let recorder = Arc::new(Recorder::default());
        let session = BuildSession::new(
            Arc::new(buffer.clone()),
            recorder.clone(),
            recorder.clone(),
            EngineConfig::default(),
        )
        .unwrap();
        (session, buffer, recorder)
    }

    #[test]
    fn test_empty_navigation_posts_status() {
        let (session, _, recorder) = session();
        assert!(session.navigate(true).is_none());
        assert!(session.navigate(false).is_none());
        assert_eq!(*recorder.statuses.lock().unwrap(), vec!["No more errors", "No more errors"]);
    }

    #[test]
    fn test_set_diagnostics_and_navigate() {
        let (session, buffer, recorder) = session();
        let text = "a.c:10:5: error: foo\nb.c:2:1: error: bar\n";
        session
            .set_diagnostics(DiagnosticSource::Text(text.to_string()), "/w", None)
            .unwrap();
        assert_eq!(session.diagnostics().len(), 2);

        let first = session.navigate(true).unwrap();
        assert_eq!(first.path, Path::new("/w/a.c"));
        assert_eq!(buffer.scrolled_to(), Some(first.record.span));
        assert_eq!(*recorder.opened.lock().unwrap(), vec![(PathBuf::from("/w/a.c"), 10, 5)]);

        assert_eq!(session.navigate(true).unwrap().record.line, 2);
        assert_eq!(session.navigate(true).unwrap().record.line, 10);
    }

    #[test]
    fn test_escaping_path_is_not_opened() {
        let (session, _, recorder) = session();
        session
            .set_diagnostics(DiagnosticSource::Text("../../etc/passwd:1: oops\n".to_string()), "/w/x", None)
            .unwrap();

        let navigation = session.navigate(true).unwrap();
        assert!(!navigation.openable);
        assert!(recorder.opened.lock().unwrap().is_empty());
        assert!(recorder.statuses.lock().unwrap()[0].starts_with("Not opening /etc/passwd"));
    }

    #[test]
    fn test_bad_pattern_keeps_list() {
        let (session, _, _) = session();
        session
            .set_diagnostics(DiagnosticSource::Text("a.c:1:1: error\n".to_string()), "/w", None)
            .unwrap();

        let err = session
            .set_diagnostics(DiagnosticSource::List(Vec::new()), "/w", Some("(unclosed"))
            .unwrap_err();
        assert!(matches!(err, Error::MalformedPattern { .. }));
        assert_eq!(session.diagnostics().len(), 1);
    }

    #[test]
    fn test_submit_rejects_bad_ignore_pattern() {
        let (session, _, _) = session();
        let options = BuildOptions {
            ignore_errors: Some(Patterns::from("[")),
            ..BuildOptions::default()
        };
        let err = session.submit(vec!["true".to_string()], "/", options).err().unwrap();
        assert!(matches!(err, Error::MalformedPattern { .. }));
        assert!(!session.is_busy());
    }

    #[cfg(unix)]
    #[test]
    fn test_build_populates_diagnostics() {
        let (session, buffer, _) = session();
        let dir = std::env::temp_dir();
        let handle = session
            .submit(
                vec!["sh".into(), "-c".into(), "echo 'a.c:10:5: error: foo'; exit 1".into()],
                &dir,
                BuildOptions::default(),
            )
            .unwrap();

        let report = handle.wait_timeout(Duration::from_secs(10)).unwrap();
        assert_eq!(report.status, BuildStatus::Finished);
        assert_eq!(report.exit_code, Some(1));
        assert_eq!(report.diagnostics, 1);

        let diagnostics = session.diagnostics();
        let record = &diagnostics[0];
        assert_eq!(record.file, crate::paths::normalize(&dir.join("a.c")));
        assert_eq!(record.span.slice(&buffer.snapshot()), Some("a.c:10:5: error: foo\n"));
        assert_eq!(session.overlay().len(), 1);
    }
}
