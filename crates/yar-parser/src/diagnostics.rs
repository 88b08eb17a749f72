//! Ariadne-based rendering of library errors.
//!
//! Turns an [`Error`] into a formatted, labeled report against the source
//! text. Output is colorless so it can be asserted on in tests and logged
//! verbatim.

use std::ops::Range;

use ariadne::{Config, Label, Report, ReportKind, Source};

use yar_common::{Error, ErrorKind, LineIndex};

/// Stable error code per error kind.
fn error_code(kind: ErrorKind) -> &'static str {
    match kind {
        ErrorKind::Lex => "E0001",
        ErrorKind::Syntax => "E0002",
        ErrorKind::Semantic => "E0003",
        ErrorKind::Include => "E0004",
        ErrorKind::IntegerOverflow => "E0005",
    }
}

/// Render an error into a formatted diagnostic string.
///
/// The error's line/column location is mapped back to a byte range via
/// [`LineIndex`]; the range is clamped into the source and widened to one
/// character so the label always points somewhere visible.
pub fn render_diagnostic(error: &Error, source: &str, _filename: &str) -> String {
    let config = Config::default().with_color(false);
    let index = LineIndex::new(source);
    let source_len = source.len();

    let start = (index.offset(error.location) as usize).min(source_len);
    let end = start.saturating_add(1).min(source_len).max(start);
    let span: Range<usize> = start..end;

    let report = Report::build(ReportKind::Error, span.clone())
        .with_code(error_code(error.kind))
        .with_message(&error.message)
        .with_config(config)
        .with_label(Label::new(span).with_message(error.kind.to_string()))
        .finish();

    let mut buf = Vec::new();
    if report.write(Source::from(source), &mut buf).is_err() {
        return error.to_string();
    }
    String::from_utf8(buf).unwrap_or_else(|_| error.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;
    use yar_common::Location;

    #[test]
    fn report_carries_code_and_message() {
        let source = "rule r { condition: }";
        let error = Error::syntax(Location::new(1, 21), "expected expression, found `}`");
        let rendered = render_diagnostic(&error, source, "test.yar");
        assert!(rendered.contains("E0002"));
        assert!(rendered.contains("expected expression"));
    }

    #[test]
    fn location_past_end_is_clamped() {
        let error = Error::lex(Location::new(9, 9), "unexpected character");
        let rendered = render_diagnostic(&error, "x", "test.yar");
        assert!(rendered.contains("E0001"));
    }
}
