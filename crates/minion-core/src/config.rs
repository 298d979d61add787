//! Engine and build configuration.
//!
//! Build configurations use the same JSON shape as editor build-system
//! entries:
//!
//! ```json
//! {
//!     "cmd": ["make", "-j8"],
//!     "working_dir": "/home/me/project",
//!     "ignore_errors": ["^make\\[\\d\\]: Entering", "^make\\[\\d\\]: Leaving"],
//!     "file_regex": "^(.+?):(\\d+):(\\d+): (.*)$",
//!     "verbose": false,
//!     "env": { "max_print_line": "1048576" }
//! }
//! ```

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::Deserialize;

use crate::error::{Error, Result};

/// Tuning for the orchestrator and its process tasks.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    /// Upper bound on how long one poll of a running task may block.
    /// This is also the cancellation latency.
    pub poll_interval_ms: u64,

    /// Capacity of the line channel between reader threads and the worker.
    pub line_buffer: usize,

    /// Thresholds for the heuristic diagnostic parser.
    pub heuristic: HeuristicConfig,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            poll_interval_ms: 500,
            line_buffer: 4096,
            heuristic: HeuristicConfig::default(),
        }
    }
}

impl EngineConfig {
    /// Parse a config from JSON, filling omitted fields with defaults.
    pub fn from_json(json: &str) -> Result<Self> {
        let config: Self = serde_json::from_str(json)?;
        config.validate()?;
        Ok(config)
    }

    /// Poll interval as a `Duration`.
    pub fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.poll_interval_ms)
    }

    fn validate(&self) -> Result<()> {
        if self.poll_interval_ms == 0 {
            return Err(Error::Config("poll_interval_ms must be positive".to_string()));
        }
        if self.line_buffer == 0 {
            return Err(Error::Config("line_buffer must be positive".to_string()));
        }
        self.heuristic.validate()
    }
}

/// Thresholds for the multi-line lookahead of the heuristic parser.
///
/// Tuned against GCC and Clang output; these are not a grammar.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct HeuristicConfig {
    /// Offset from the header line to the candidate underline line.
    pub underline_offset: usize,

    /// A hint line joins the message only if its stripped length is below
    /// this fraction of the underline's stripped length.
    pub hint_ratio: f64,
}

impl Default for HeuristicConfig {
    fn default() -> Self {
        Self {
            underline_offset: 2,
            hint_ratio: 0.5,
        }
    }
}

impl HeuristicConfig {
    fn validate(&self) -> Result<()> {
        if self.underline_offset == 0 {
            return Err(Error::Config("underline_offset must be at least 1".to_string()));
        }
        if !(self.hint_ratio > 0.0 && self.hint_ratio.is_finite()) {
            return Err(Error::Config("hint_ratio must be a positive number".to_string()));
        }
        Ok(())
    }
}

/// One pattern or a list of patterns.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(untagged)]
pub enum Patterns {
    One(String),
    Many(Vec<String>),
}

impl Patterns {
    /// The patterns as a slice-like iterator.
    pub fn iter(&self) -> impl Iterator<Item = &str> {
        let items: &[String] = match self {
            Patterns::One(p) => std::slice::from_ref(p),
            Patterns::Many(ps) => ps,
        };
        items.iter().map(String::as_str)
    }
}

impl From<&str> for Patterns {
    fn from(pattern: &str) -> Self {
        Patterns::One(pattern.to_string())
    }
}

impl From<Vec<String>> for Patterns {
    fn from(patterns: Vec<String>) -> Self {
        Patterns::Many(patterns)
    }
}

/// Per-build options accepted by `BuildSession::submit`.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct BuildOptions {
    /// Output lines matching any of these (anchored at line start) are
    /// dropped from the sink.
    pub ignore_errors: Option<Patterns>,

    /// Pattern for the regex diagnostic parser; the heuristic parser is used
    /// when absent.
    pub file_regex: Option<String>,

    /// Disable `ignore_errors` filtering.
    pub verbose: bool,

    /// Extra environment variables for the child process.
    pub env: BTreeMap<String, String>,
}

/// A complete build description in build-system JSON form.
#[derive(Debug, Clone, Deserialize)]
pub struct BuildConfig {
    /// Program and arguments.
    pub cmd: Vec<String>,

    /// Directory the command runs in and diagnostics resolve against.
    pub working_dir: PathBuf,

    #[serde(flatten)]
    pub options: BuildOptions,
}

impl BuildConfig {
    /// Parse a build config from JSON.
    pub fn from_json(json: &str) -> Result<Self> {
        let config: Self = serde_json::from_str(json)?;
        if config.cmd.is_empty() {
            return Err(Error::Config("`cmd` must not be empty".to_string()));
        }
        Ok(config)
    }

    /// Read and parse a build config file.
    pub fn from_file(path: &Path) -> Result<Self> {
        let json = std::fs::read_to_string(path)?;
        Self::from_json(&json)
    }
}
