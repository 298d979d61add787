//! Inline annotation projection of a diagnostic list.
//!
//! Derived data only: recomputed from the list whenever it changes.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use crate::paths;

use super::record::DiagnosticRecord;

/// One inline annotation to render inside a source file.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Annotation {
    /// 1-based line the annotation belongs to.
    pub line: usize,

    /// Column where the annotation starts, centred on the diagnostic column.
    pub column: usize,

    /// Trimmed diagnostic message.
    pub text: String,

    /// Index of the record in the diagnostic list.
    pub index: usize,
}

/// Annotations grouped by absolute file path.
pub type Overlay = BTreeMap<PathBuf, Vec<Annotation>>;

/// Group diagnostics by file and position each message around its column.
pub fn project(diagnostics: &[DiagnosticRecord], working_dir: &Path) -> Overlay {
    let mut overlay = Overlay::new();

    for (index, record) in diagnostics.iter().enumerate() {
        let text = record.message.trim().to_string();
        let half_width = text.chars().count() / 2;

        overlay
            .entry(paths::resolve(working_dir, &record.file))
            .or_default()
            .push(Annotation {
                line: record.line,
                column: record.column.saturating_sub(half_width),
                text,
                index,
            });
    }

    overlay
}
