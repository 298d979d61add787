//! Collaborator interfaces implemented by the embedding host.
//!
//! The core never draws anything itself. Build output goes to an
//! [`OutputSink`], non-fatal notices to a [`StatusSink`], and "jump to
//! location" requests to a [`FileOpener`]. [`OutputBuffer`] is an in-memory
//! sink usable by headless hosts and tests.

use std::path::Path;
use std::sync::{Arc, Mutex, RwLock};

use crate::diagnostics::Span;

/// Append-only text sink receiving build output.
///
/// Only the build worker writes; presentation code may read concurrently.
pub trait OutputSink: Send + Sync {
    /// Discard all text.
    fn clear(&self);

    /// Append text at the end.
    fn append(&self, text: &str);

    /// Mark a region of the current text, e.g. the selected diagnostic.
    fn add_highlight(&self, _span: Span) {}

    /// Bring a region of the current text into view.
    fn scroll_to(&self, _span: Span) {}
}

/// Receiver for short, non-fatal notices such as "No more errors".
pub trait StatusSink: Send + Sync {
    fn status(&self, message: &str);
}

/// Host action that opens a file at a location.
pub trait FileOpener: Send + Sync {
    /// `line` is 1-based, `column` 0-based (0 when unknown).
    fn open(&self, path: &Path, line: usize, column: usize);
}

/// Status sink that forwards notices to `tracing`.
#[derive(Debug, Default, Clone, Copy)]
pub struct LogStatus;

impl StatusSink for LogStatus {
    fn status(&self, message: &str) {
        tracing::info!(target: "minion::status", "{message}");
    }
}

/// File opener that does nothing; for hosts without an editor.
#[derive(Debug, Default, Clone, Copy)]
pub struct NoopOpener;

impl FileOpener for NoopOpener {
    fn open(&self, _path: &Path, _line: usize, _column: usize) {}
}

/// In-memory output sink.
///
/// Clones share the same buffer.
#[derive(Debug, Default, Clone)]
pub struct OutputBuffer {
    text: Arc<RwLock<String>>,
    highlights: Arc<Mutex<Vec<Span>>>,
    scrolled_to: Arc<Mutex<Option<Span>>>,
}

impl OutputBuffer {
    pub fn new() -> Self {
        Self::default()
    }

    /// Copy of the full current text.
    pub fn snapshot(&self) -> String {
        match self.text.read() {
            Ok(text) => text.clone(),
            Err(poisoned) => poisoned.into_inner().clone(),
        }
    }

    /// Highlights added since the last `clear`.
    pub fn highlights(&self) -> Vec<Span> {
        self.highlights.lock().map(|h| h.clone()).unwrap_or_default()
    }

    /// Most recent `scroll_to` target since the last `clear`.
    pub fn scrolled_to(&self) -> Option<Span> {
        self.scrolled_to.lock().ok().and_then(|s| *s)
    }
}

impl OutputSink for OutputBuffer {
    fn clear(&self) {
        if let Ok(mut text) = self.text.write() {
            text.clear();
        }
        if let Ok(mut highlights) = self.highlights.lock() {
            highlights.clear();
        }
        if let Ok(mut scrolled) = self.scrolled_to.lock() {
            *scrolled = None;
        }
    }

    fn append(&self, text: &str) {
        if let Ok(mut buffer) = self.text.write() {
            buffer.push_str(text);
        }
    }

    fn add_highlight(&self, span: Span) {
        if let Ok(mut highlights) = self.highlights.lock() {
            highlights.push(span);
        }
    }

    fn scroll_to(&self, span: Span) {
        if let Ok(mut scrolled) = self.scrolled_to.lock() {
            *scrolled = Some(span);
        }
    }
}
