//! Diagnostic extraction and navigation.
//!
//! # Architecture
//!
//! ```text
//! build output (snapshot of the sink text)
//!     │
//!     ├── HeuristicParser ──┐
//!     │                     ├──► Vec<DiagnosticRecord> ──► DiagnosticNavigator
//!     └── pattern parser ───┘                                   │
//!                                                               ├── advance(±1, wrapping)
//!                                                               └── overlay (per-file annotations)
//! ```

mod extract;
mod navigator;
mod overlay;
mod record;

pub use extract::{HeuristicParser, compile_pattern, extract, parse_with_pattern};
pub use navigator::{DiagnosticNavigator, Navigation};
pub use overlay::{Annotation, Overlay, project};
pub use record::{DiagnosticRecord, Span};
