//! Rendering of compiler diagnostics for the user-facing logger.

use std::fmt::Write;
use std::ops::Range;

/// Render `message` with the `filename:line:col` of `range` and a one-line
/// code frame underlined with carets.
///
/// Without a range only the file name and the message are printed.
pub fn format_diagnostic(
    message: &str,
    filename: &str,
    source: &str,
    range: Option<Range<usize>>,
) -> String {
    let Some(range) = range else {
        return format!("{filename}\n{message}");
    };

    let start = floor_char_boundary(source, range.start);
    let before = &source[..start];
    let line = before.matches('\n').count() + 1;
    let line_start = before.rfind('\n').map_or(0, |i| i + 1);
    let line_end = source[start..].find('\n').map_or(source.len(), |i| start + i);
    let column = source[line_start..start].chars().count() + 1;

    let end = floor_char_boundary(source, range.end.clamp(start, line_end));
    let width = source[start..end].chars().count().max(1);
    let text = source[line_start..line_end].trim_end_matches('\r');

    let gutter = line.to_string();
    let pad = " ".repeat(gutter.len());
    let mut out = String::new();
    let _ = writeln!(out, "{filename}:{line}:{column}");
    let _ = writeln!(out, "{message}");
    let _ = writeln!(out, "{gutter} | {text}");
    let _ = write!(
        out,
        "{pad} | {}{}",
        " ".repeat(column - 1),
        "^".repeat(width)
    );
    out
}

fn floor_char_boundary(source: &str, offset: usize) -> usize {
    let mut offset = offset.min(source.len());
    while !source.is_char_boundary(offset) {
        offset -= 1;
    }
    offset
}
