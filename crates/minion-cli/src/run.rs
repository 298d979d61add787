//! Run command implementation for Minion CLI.
//!
//! Runs one build, streaming its output to the terminal, then prints the
//! diagnostics extracted from that output.

use std::io::Write;
use std::path::PathBuf;
use std::sync::Arc;

use anyhow::Context;
use minion_core::paths;
use minion_core::{BuildConfig, BuildReport, BuildSession, BuildStatus, EngineConfig, OutputSink, Patterns};

use crate::colors;

/// Arguments of `minion run`.
#[derive(Debug, Default)]
pub struct RunArgs {
    pub cmd: Vec<String>,
    pub config: Option<PathBuf>,
    pub dir: Option<PathBuf>,
    pub file_regex: Option<String>,
    pub ignore: Vec<String>,
    pub all_output: bool,
    pub env: Vec<(String, String)>,
    pub engine_config: Option<PathBuf>,
    pub json: bool,
}

/// Writes build output straight to the terminal.
struct TerminalSink {
    to_stderr: bool,
}

impl OutputSink for TerminalSink {
    // Scrollback is left alone.
    fn clear(&self) {}

    fn append(&self, text: &str) {
        let result = if self.to_stderr {
            let mut stderr = std::io::stderr().lock();
            stderr.write_all(text.as_bytes()).and_then(|()| stderr.flush())
        } else {
            let mut stdout = std::io::stdout().lock();
            stdout.write_all(text.as_bytes()).and_then(|()| stdout.flush())
        };
        if let Err(e) = result {
            tracing::debug!("failed to write build output: {e}");
        }
    }
}

/// Run a build and return the process exit code to use.
pub fn execute(args: RunArgs) -> anyhow::Result<i32> {
    let engine = match &args.engine_config {
        Some(path) => {
            let json = std::fs::read_to_string(path)
                .with_context(|| format!("failed to read {}", path.display()))?;
            EngineConfig::from_json(&json)?
        }
        None => EngineConfig::default(),
    };

    let json = args.json;
    let build = resolve_build(args)?;
    check_program(&build.cmd[0]);

    eprintln!(
        "{}Running{} {:?} {}in {}{}",
        colors::BOLD,
        colors::RESET,
        build.cmd,
        colors::DIM,
        build.working_dir.display(),
        colors::RESET
    );

    let session = BuildSession::headless(Arc::new(TerminalSink { to_stderr: json }), engine)?;
    let handle = session.submit_config(build)?;
    let report = handle.wait().context("build ended without an outcome")?;
    let diagnostics = session.diagnostics();
    session.shutdown();

    if json {
        let records: Vec<_> = diagnostics.iter().map(|d| d.to_json()).collect();
        println!("{}", serde_json::to_string_pretty(&records)?);
    } else {
        if !diagnostics.is_empty() {
            println!("\n{}Diagnostics:{}", colors::BOLD, colors::RESET);
            for diagnostic in diagnostics.iter() {
                print!("{}", diagnostic.format_terminal());
            }
        }
        println!("\n{}", summary(&report));
    }

    Ok(exit_code(&report))
}

/// Merge a config file (if any) with command-line overrides.
fn resolve_build(args: RunArgs) -> anyhow::Result<BuildConfig> {
    let mut build = match &args.config {
        Some(path) => BuildConfig::from_file(path)
            .with_context(|| format!("failed to load build config {}", path.display()))?,
        None => {
            if args.cmd.is_empty() {
                anyhow::bail!("no command given; pass one after `--` or use --config");
            }
            BuildConfig {
                cmd: Vec::new(),
                working_dir: PathBuf::new(),
                options: Default::default(),
            }
        }
    };

    if !args.cmd.is_empty() {
        build.cmd = args.cmd;
    }

    let cwd = std::env::current_dir().context("failed to get current directory")?;
    if let Some(dir) = args.dir {
        build.working_dir = dir;
    }
    if build.working_dir.as_os_str().is_empty() {
        build.working_dir = cwd.clone();
    }
    build.working_dir = paths::resolve(&cwd, &build.working_dir);

    if args.file_regex.is_some() {
        build.options.file_regex = args.file_regex;
    }

    if !args.ignore.is_empty() {
        let mut ignore: Vec<String> = build
            .options
            .ignore_errors
            .iter()
            .flat_map(Patterns::iter)
            .map(String::from)
            .collect();
        ignore.extend(args.ignore);
        build.options.ignore_errors = Some(Patterns::Many(ignore));
    }

    build.options.verbose |= args.all_output;
    build.options.env.extend(args.env);

    Ok(build)
}

/// Warn early when the program is not on PATH.
fn check_program(program: &str) {
    if program.contains(std::path::MAIN_SEPARATOR) || program.contains('/') {
        return;
    }
    if which::which(program).is_err() {
        tracing::warn!("`{program}` was not found on PATH");
    }
}

fn summary(report: &BuildReport) -> String {
    let count = match report.diagnostics {
        1 => "1 diagnostic".to_string(),
        n => format!("{n} diagnostics"),
    };
    let elapsed = report.elapsed.as_secs_f64();

    match (report.status, report.exit_code) {
        (BuildStatus::Finished, Some(0)) => format!(
            "{}Build succeeded{} in {elapsed:.2}s ({count})",
            colors::GREEN,
            colors::RESET
        ),
        (BuildStatus::Finished, Some(code)) => format!(
            "{}Build failed{} with exit code {code} in {elapsed:.2}s ({count})",
            colors::RED,
            colors::RESET
        ),
        (BuildStatus::Finished, None) => format!(
            "{}Build terminated{} by a signal after {elapsed:.2}s ({count})",
            colors::RED,
            colors::RESET
        ),
        (BuildStatus::Failed, _) => format!("{}Build could not be started{}", colors::RED, colors::RESET),
        (BuildStatus::Cancelled, _) => format!("{}Build cancelled{}", colors::YELLOW, colors::RESET),
    }
}

fn exit_code(report: &BuildReport) -> i32 {
    match (report.status, report.exit_code) {
        (BuildStatus::Finished, Some(code)) => code,
        (BuildStatus::Failed, _) => 127,
        _ => 1,
    }
}
