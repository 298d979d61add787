//! Diagnostics command implementation for Minion CLI.
//!
//! Extracts diagnostics from build output saved to a file or piped in.

use std::io::Read;
use std::path::{Path, PathBuf};

use anyhow::Context;
use minion_core::diagnostics::{HeuristicParser, parse_with_pattern};
use minion_core::{DiagnosticRecord, compile_pattern};

use crate::colors;

/// Parse saved output and print the records found.
pub fn execute(
    file: Option<&Path>,
    dir: Option<PathBuf>,
    file_regex: Option<&str>,
    json: bool,
) -> anyhow::Result<()> {
    let output = match file {
        Some(path) => std::fs::read_to_string(path)
            .with_context(|| format!("failed to read {}", path.display()))?,
        None => {
            let mut text = String::new();
            std::io::stdin()
                .read_to_string(&mut text)
                .context("failed to read stdin")?;
            text
        }
    };

    let cwd = std::env::current_dir().context("failed to get current directory")?;
    let working_dir = minion_core::paths::resolve(&cwd, &dir.unwrap_or_default());

    let records = extract(&output, &working_dir, file_regex)?;

    if json {
        let records: Vec<_> = records.iter().map(DiagnosticRecord::to_json).collect();
        println!("{}", serde_json::to_string_pretty(&records)?);
        return Ok(());
    }

    if records.is_empty() {
        println!("{}No diagnostics found.{}", colors::YELLOW, colors::RESET);
        return Ok(());
    }

    for record in &records {
        print!("{}", record.format_terminal());
    }
    println!("\n{} diagnostic(s)", records.len());

    Ok(())
}

fn extract(output: &str, working_dir: &Path, file_regex: Option<&str>) -> minion_core::Result<Vec<DiagnosticRecord>> {
    Ok(match file_regex {
        Some(pattern) => parse_with_pattern(output, working_dir, &compile_pattern(pattern)?),
        None => HeuristicParser::default().parse(output, working_dir),
    })
}
