//! Diagnostic records extracted from build output.

use std::ops::Range;
use std::path::PathBuf;

/// A half-open byte range into a text buffer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Span {
    /// First byte of the range.
    pub start: usize,

    /// One past the last byte.
    pub end: usize,
}

impl Span {
    pub fn new(start: usize, end: usize) -> Self {
        debug_assert!(start <= end, "span start {start} after end {end}");
        Self { start, end }
    }

    pub fn len(&self) -> usize {
        self.end - self.start
    }

    pub fn is_empty(&self) -> bool {
        self.start == self.end
    }

    pub fn range(&self) -> Range<usize> {
        self.start..self.end
    }

    /// The covered substring of `text`, or `None` if the span does not fit
    /// or does not fall on character boundaries.
    pub fn slice<'a>(&self, text: &'a str) -> Option<&'a str> {
        text.get(self.range())
    }
}

impl From<Range<usize>> for Span {
    fn from(range: Range<usize>) -> Self {
        Self::new(range.start, range.end)
    }
}

/// One error location found in build output.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DiagnosticRecord {
    /// Absolute, normalized path of the offending file.
    pub file: PathBuf,

    /// Line number (1-indexed; 0 only when a custom pattern captured none)
    pub line: usize,

    /// Column number (0 when unknown)
    pub column: usize,

    /// Location of `message` inside the build output.
    pub span: Span,

    /// Message text as it appeared, possibly spanning several lines.
    pub message: String,
}

impl DiagnosticRecord {
    /// Format the record for terminal display.
    pub fn format_terminal(&self) -> String {
        let mut output = format!(
            "\x1b[1;34m-->\x1b[0m {}:{}:{}\n",
            self.file.display(),
            self.line,
            self.column
        );

        for line in self.message.lines() {
            output.push_str("    ");
            output.push_str(line);
            output.push('\n');
        }

        output
    }

    /// Format the record for JSON output.
    pub fn to_json(&self) -> serde_json::Value {
        serde_json::json!({
            "file": self.file.display().to_string(),
            "line": self.line,
            "column": self.column,
            "span": [self.span.start, self.span.end],
            "message": self.message,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample() -> DiagnosticRecord {
        DiagnosticRecord {
            file: PathBuf::from("/work/a.c"),
            line: 10,
            column: 5,
            span: Span::new(0, 21),
            message: "a.c:10:5: error: foo\n".to_string(),
        }
    }

    #[test]
    fn test_span_slice() {
        let text = "héllo world";
        assert_eq!(Span::new(0, 6).slice(text), Some("héllo"));
        // Inside the two-byte 'é'.
        assert_eq!(Span::new(0, 2).slice(text), None);
        assert_eq!(Span::new(4, 40).slice(text), None);
        assert_eq!(Span::from(7..12).len(), 5);
    }

    #[test]
    fn test_record_format() {
        let formatted = sample().format_terminal();
        assert!(formatted.contains("/work/a.c:10:5"));
        assert!(formatted.contains("    a.c:10:5: error: foo\n"));
    }

    #[test]
    fn test_record_json() {
        let json = sample().to_json();
        assert_eq!(json["line"], 10);
        assert_eq!(json["column"], 5);
        assert_eq!(json["span"][1], 21);
        assert_eq!(json["file"], "/work/a.c");
    }
}
