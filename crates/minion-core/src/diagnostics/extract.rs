//! Turning build output into diagnostic records.
//!
//! Two parsers are available. The heuristic parser needs no configuration
//! and recovers GCC/Clang style messages, including the source excerpt and
//! caret underline that follow a `file:line:column:` header. The pattern
//! parser applies a caller-supplied regex to each line independently.

use std::path::Path;

use regex::Regex;

use crate::config::HeuristicConfig;
use crate::error::{Error, Result};
use crate::paths;

use super::record::{DiagnosticRecord, Span};

/// Prefixes of include-trace lines, which look like headers but are not.
const CONTINUATION_PREFIXES: [&str; 2] = ["In file included from ", "                 from "];

/// Extract diagnostics with the default heuristic thresholds.
///
/// Uses the pattern parser when `pattern` is given.
pub fn extract(output: &str, working_dir: &Path, pattern: Option<&Regex>) -> Vec<DiagnosticRecord> {
    match pattern {
        Some(pattern) => parse_with_pattern(output, working_dir, pattern),
        None => HeuristicParser::default().parse(output, working_dir),
    }
}

/// Compile a user-supplied diagnostic or filter pattern.
pub fn compile_pattern(pattern: &str) -> Result<Regex> {
    Regex::new(pattern).map_err(|source| Error::MalformedPattern {
        pattern: pattern.to_string(),
        source,
    })
}

/// A line of output with its byte offset.
#[derive(Debug, Clone, Copy)]
struct OutputLine<'a> {
    start: usize,
    /// Line including its terminator, if any.
    raw: &'a str,
}

impl<'a> OutputLine<'a> {
    /// Line without `\n` / `\r\n`.
    fn content(&self) -> &'a str {
        self.raw.trim_end_matches(['\n', '\r'])
    }

    fn end(&self) -> usize {
        self.start + self.raw.len()
    }
}

fn split_lines(output: &str) -> Vec<OutputLine<'_>> {
    let mut start = 0;
    output
        .split_inclusive('\n')
        .map(|raw| {
            let line = OutputLine { start, raw };
            start += raw.len();
            line
        })
        .collect()
}

/// Location fields parsed from a header line.
#[derive(Debug, Clone, PartialEq, Eq)]
struct Header<'a> {
    file: &'a str,
    line: usize,
    column: usize,
}

/// Heuristic parser for raw compiler text.
#[derive(Debug, Clone, Default)]
pub struct HeuristicParser {
    config: HeuristicConfig,
}

impl HeuristicParser {
    pub fn new(config: HeuristicConfig) -> Self {
        Self { config }
    }

    /// Scan `output` and return diagnostics in order of appearance.
    pub fn parse(&self, output: &str, working_dir: &Path) -> Vec<DiagnosticRecord> {
        let lines = split_lines(output);
        let mut records = Vec::new();
        let mut index = 0;

        while index < lines.len() {
            let Some(header) = parse_header(lines[index].content()) else {
                index += 1;
                continue;
            };

            let last = self.message_end(&lines, index);
            let span = Span::new(lines[index].start, lines[last].end());

            records.push(DiagnosticRecord {
                file: paths::resolve(working_dir, Path::new(header.file)),
                line: header.line,
                column: header.column,
                span,
                message: output[span.range()].to_string(),
            });

            index = last + 1;
        }

        tracing::debug!("heuristic parser found {} diagnostics", records.len());
        records
    }

    /// Index of the last line belonging to the message headed at `header`.
    fn message_end(&self, lines: &[OutputLine<'_>], header: usize) -> usize {
        let underline_index = header + self.config.underline_offset;
        let Some(underline) = lines.get(underline_index).map(OutputLine::content) else {
            return header;
        };
        if !is_underline(underline) {
            return header;
        }

        match lines.get(underline_index + 1).map(OutputLine::content) {
            Some(hint) if self.is_hint(hint, underline) => underline_index + 1,
            _ => underline_index,
        }
    }

    /// A hint is a short line (e.g. a fix-it suggestion) placed under the
    /// underline, starting to its right.
    fn is_hint(&self, hint: &str, underline: &str) -> bool {
        let hint_len = hint.trim().chars().count();
        if hint_len == 0 || indentation(hint) <= indentation(underline) {
            return false;
        }
        (hint_len as f64) < self.config.hint_ratio * underline.trim().chars().count() as f64
    }
}

/// Parse `path:line:column:message` or `path:line:message`.
fn parse_header(line: &str) -> Option<Header<'_>> {
    if CONTINUATION_PREFIXES.iter().any(|prefix| line.starts_with(prefix)) {
        return None;
    }

    // Keep a drive prefix such as `C:\` as part of the path.
    let bytes = line.as_bytes();
    let path_search_start = if bytes.len() > 2
        && bytes[0].is_ascii_alphabetic()
        && bytes[1] == b':'
        && matches!(bytes[2], b'\\' | b'/')
    {
        2
    } else {
        0
    };

    let path_end = path_search_start + line[path_search_start..].find(':')?;
    let file = &line[..path_end];
    if file.is_empty() || file.starts_with(char::is_whitespace) {
        return None;
    }

    let rest = &line[path_end + 1..];
    let line_end = rest.find(':')?;
    let line_number = parse_number(&rest[..line_end]).filter(|&n| n >= 1)?;

    let rest = &rest[line_end + 1..];
    let column_field = rest.find(':').map_or(rest, |end| &rest[..end]);
    let column = parse_number(column_field).unwrap_or(0);

    Some(Header {
        file,
        line: line_number,
        column,
    })
}

/// Digits only, no sign or whitespace.
fn parse_number(field: &str) -> Option<usize> {
    if field.is_empty() || !field.bytes().all(|b| b.is_ascii_digit()) {
        return None;
    }
    field.parse().ok()
}

/// A line made of `~` and `^` markers (whitespace between them allowed).
fn is_underline(line: &str) -> bool {
    let mut has_marker = false;
    for c in line.chars() {
        match c {
            '~' | '^' => has_marker = true,
            c if c.is_whitespace() => {}
            _ => return false,
        }
    }
    has_marker
}

/// Leading whitespace, in characters.
fn indentation(line: &str) -> usize {
    line.chars().take_while(|c| c.is_whitespace()).count()
}

/// Apply `pattern` to every line of `output`.
///
/// Capture groups map positionally to `(file, line, column, message)`.
/// Lines where the first group does not participate are skipped.
pub fn parse_with_pattern(output: &str, working_dir: &Path, pattern: &Regex) -> Vec<DiagnosticRecord> {
    split_lines(output)
        .into_iter()
        .filter_map(|line| {
            let content = line.content();
            let captures = pattern.captures(content)?;
            let file = captures.get(1).map(|m| m.as_str()).filter(|f| !f.is_empty())?;
            let number = |group: usize| {
                captures
                    .get(group)
                    .and_then(|m| m.as_str().trim().parse::<usize>().ok())
                    .unwrap_or(0)
            };
            let message = captures
                .get(4)
                .map(|m| m.as_str().to_string())
                .unwrap_or_else(|| content.trim().to_string());

            Some(DiagnosticRecord {
                file: paths::resolve(working_dir, Path::new(file)),
                line: number(2),
                column: number(3),
                span: Span::new(line.start, line.start + content.len()),
                message,
            })
        })
        .collect()
}
