//! YARA auto-formatter.
//!
//! Works directly on the token stream that backs a parsed file:
//!
//! 1. Synthetic parentheses a builder added purely for precedence are
//!    elided where the operand binds tightly enough on its own.
//! 2. Token boundaries are classified into newline sectors (rule headers,
//!    section starts, meta and string entries, over-long condition lines)
//!    and exactly the missing newline tokens are inserted.
//! 3. Rendering with comment alignment happens in the stream's own
//!    `get_text`, shared with unformatted printing.
//!
//! Formatting runs at most once per stream: the stream's `formatted` flag
//! short-circuits a second pass, and the sector classification is a pure
//! function of token kinds, so re-running it on its own output inserts
//! nothing new.

mod parens;
mod sectors;

use yar_common::Result;
use yar_common::TokenStream;
use yar_parser::YaraFile;

pub use parens::elide_synthetic_parens;
pub use sectors::autoformat;

/// Format a parsed file in place: elide redundant synthetic parens, then
/// auto-format the master stream.
pub fn format_file(file: &mut YaraFile) {
    elide_synthetic_parens(file);
    autoformat(file.stream_mut());
}

/// Auto-format a stand-alone stream (no paren elision without an AST).
pub fn format_stream(stream: &mut TokenStream) {
    autoformat(stream);
}

/// Parse, format and re-render source text.
///
/// # Example
///
/// ```
/// let formatted = yar_fmt::format_source("rule r { condition: true }").unwrap();
/// assert_eq!(
///     formatted,
///     "rule r\n{\n    condition:\n        true\n}"
/// );
/// ```
pub fn format_source(source: &str) -> Result<String> {
    let mut file = yar_parser::parse_str(source)?;
    format_file(&mut file);
    Ok(file.get_text(false, true))
}
