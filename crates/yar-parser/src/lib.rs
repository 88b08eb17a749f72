//! Parser, AST, visitors and builders for YARA rule files.
//!
//! A parsed [`YaraFile`] pairs a typed AST with the token stream its text
//! came from; AST edits made through the visitor layer re-splice the
//! stream, so printing the file back preserves comments and every token's
//! written spelling.
//!
//! ```
//! let file = yar_parser::parse_str(
//!     "rule example\n{\n    condition:\n        true\n}\n",
//! )
//! .unwrap();
//! assert_eq!(file.rules().len(), 1);
//! assert_eq!(file.rules()[0].name(file.stream()), "example");
//! ```

pub mod ast;
pub mod builder;
pub mod diagnostics;
mod include;
mod parser;
pub mod uid;
pub mod visitor;

use std::fs;
use std::path::Path;

use rustc_hash::FxHashSet;

use yar_common::{Error, Location, Result};

pub use ast::{
    BinaryOp, ExprKind, Expression, ExpressionType, HexUnit, Import, Meta, Rule, RuleModifier,
    StringModifiers, StringValue, YaraFile, YaraString,
};
pub use builder::{Built, BuiltRule, ExprBuilder, HexStringBuilder, RuleBuilder, YaraFileBuilder};
pub use uid::UidGenerator;
pub use visitor::{
    promote_left, promote_right, ModifyingVisitor, ObservingVisitor, Replacement, VisitResult,
    Visitor,
};

/// How `include` directives are treated during parsing.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ParserMode {
    /// Follow every include; a cycle is an error.
    #[default]
    Regular,
    /// Expand each file at most once per parse; cycles terminate silently.
    IncludeGuarded,
}

/// Parse an in-memory buffer in [`ParserMode::Regular`].
pub fn parse_str(source: &str) -> Result<YaraFile> {
    parse_str_in_mode(source, ParserMode::Regular)
}

/// Parse an in-memory buffer. Include paths resolve relative to the
/// working directory.
pub fn parse_str_in_mode(source: &str, mode: ParserMode) -> Result<YaraFile> {
    let mut ctx = include::IncludeContext::new(mode);
    let file = include::parse_source(source, None, &mut ctx)?;
    check_duplicate_rules(&file)?;
    Ok(file)
}

/// Parse a file in [`ParserMode::Regular`].
pub fn parse_file(path: impl AsRef<Path>) -> Result<YaraFile> {
    parse_file_in_mode(path, ParserMode::Regular)
}

/// Parse a file. Include paths resolve relative to the including file.
pub fn parse_file_in_mode(path: impl AsRef<Path>, mode: ParserMode) -> Result<YaraFile> {
    let path = path.as_ref();
    let source = fs::read_to_string(path).map_err(|_| {
        Error::include(
            Location::default(),
            format!("cannot open file \"{}\"", path.display()),
        )
    })?;
    let mut ctx = include::IncludeContext::new(mode);
    ctx.seed(path);
    let file = include::parse_source(&source, Some(path), &mut ctx)?;
    check_duplicate_rules(&file)?;
    Ok(file)
}

/// Rule names are unique across a file and everything it includes.
fn check_duplicate_rules(file: &YaraFile) -> Result<()> {
    let mut seen = FxHashSet::default();
    for rule in file.rules() {
        let Some(stream) = file.stream_containing(rule.name_token()) else {
            continue;
        };
        let name = rule.name(stream);
        if !seen.insert(name.clone()) {
            let mut error =
                Error::semantic(rule.location(), format!("redefinition of rule {name}"));
            if let Some(path) = rule.file() {
                error = error.in_file(path);
            }
            return Err(error);
        }
    }
    Ok(())
}
