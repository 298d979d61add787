//! Cyclic cursor over the diagnostics of the last finished build.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use crate::error::NavigationError;
use crate::paths;

use super::overlay::{self, Overlay};
use super::record::DiagnosticRecord;

/// Result of one navigation step.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Navigation {
    /// The record now under the cursor.
    pub record: DiagnosticRecord,

    /// Record file re-joined with the working directory and normalized.
    pub path: PathBuf,

    /// Whether `path` lies inside the working directory. Hosts must not
    /// open the file otherwise.
    pub openable: bool,
}

/// Stateful, wrapping cursor over a diagnostic list.
#[derive(Debug, Clone)]
pub struct DiagnosticNavigator {
    diagnostics: Arc<[DiagnosticRecord]>,
    /// `None` is "before first".
    cursor: Option<usize>,
    working_dir: PathBuf,
    overlay: Overlay,
}

impl Default for DiagnosticNavigator {
    fn default() -> Self {
        Self {
            diagnostics: Arc::from(Vec::new()),
            cursor: None,
            working_dir: PathBuf::new(),
            overlay: Overlay::new(),
        }
    }
}

impl DiagnosticNavigator {
    pub fn new() -> Self {
        Self::default()
    }

    /// Replace the list and reset the cursor to "before first".
    pub fn set_list(&mut self, diagnostics: Vec<DiagnosticRecord>, working_dir: impl Into<PathBuf>) {
        self.working_dir = working_dir.into();
        self.overlay = overlay::project(&diagnostics, &self.working_dir);
        self.diagnostics = Arc::from(diagnostics);
        self.cursor = None;
    }

    /// Drop all diagnostics, e.g. when a new build starts.
    pub fn clear(&mut self) {
        self.diagnostics = Arc::from(Vec::new());
        self.overlay.clear();
        self.cursor = None;
    }

    /// Move one step forward or backward, wrapping at both ends.
    ///
    /// From "before first", forward lands on the first record and backward
    /// on the last.
    pub fn advance(&mut self, forward: bool) -> Result<Navigation, NavigationError> {
        let len = self.diagnostics.len();
        if len == 0 {
            return Err(NavigationError::EmptyList);
        }

        let next = match (self.cursor, forward) {
            (None, true) => 0,
            (None, false) => len - 1,
            (Some(i), true) => (i + 1) % len,
            (Some(i), false) => (i + len - 1) % len,
        };
        self.cursor = Some(next);

        let record = self.diagnostics[next].clone();
        let path = paths::resolve(&self.working_dir, &record.file);
        let openable = paths::is_contained(&self.working_dir, &path);
        if !openable {
            tracing::warn!("diagnostic path {} escapes {}", path.display(), self.working_dir.display());
        }

        Ok(Navigation {
            record,
            path,
            openable,
        })
    }

    /// Record under the cursor, if any.
    pub fn current(&self) -> Option<&DiagnosticRecord> {
        self.cursor.and_then(|i| self.diagnostics.get(i))
    }

    pub fn cursor(&self) -> Option<usize> {
        self.cursor
    }

    /// Shared handle to the current list.
    pub fn diagnostics(&self) -> Arc<[DiagnosticRecord]> {
        Arc::clone(&self.diagnostics)
    }

    pub fn working_dir(&self) -> &Path {
        &self.working_dir
    }

    pub fn overlay(&self) -> &Overlay {
        &self.overlay
    }

    pub fn len(&self) -> usize {
        self.diagnostics.len()
    }

    pub fn is_empty(&self) -> bool {
        self.diagnostics.is_empty()
    }
}
