use std::fmt;

use serde::Serialize;

use crate::location::Location;

/// Convenience alias used by every fallible API in the toolkit.
pub type Result<T> = std::result::Result<T, Error>;

/// The category of a library error.
///
/// Errors are returned, never thrown past crate boundaries. Each kind maps
/// to one failure family of the pipeline: tokenization, grammar, semantic
/// validation, include resolution, and literal range checks.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum ErrorKind {
    /// Malformed token in the input text.
    Lex,
    /// The token sequence does not match the YARA grammar.
    Syntax,
    /// Duplicate rule name, duplicate string id, unknown identifier.
    Semantic,
    /// Missing or cyclic include.
    Include,
    /// An integer literal exceeds its target width.
    IntegerOverflow,
}

impl fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Lex => "lex error",
            Self::Syntax => "syntax error",
            Self::Semantic => "semantic error",
            Self::Include => "include error",
            Self::IntegerOverflow => "integer overflow",
        };
        f.write_str(name)
    }
}

/// An error produced anywhere in the parse/edit/print pipeline.
///
/// Carries a single source location and, when known, the path of the file
/// at the top of the include stack at the time of failure.
#[derive(Debug, Clone, PartialEq)]
pub struct Error {
    pub kind: ErrorKind,
    pub file: Option<String>,
    pub location: Location,
    pub message: String,
}

impl Error {
    pub fn new(
        kind: ErrorKind,
        file: Option<String>,
        location: Location,
        message: impl Into<String>,
    ) -> Self {
        Self {
            kind,
            file,
            location,
            message: message.into(),
        }
    }

    pub fn lex(location: Location, message: impl Into<String>) -> Self {
        Self::new(ErrorKind::Lex, None, location, message)
    }

    pub fn syntax(location: Location, message: impl Into<String>) -> Self {
        Self::new(ErrorKind::Syntax, None, location, message)
    }

    pub fn semantic(location: Location, message: impl Into<String>) -> Self {
        Self::new(ErrorKind::Semantic, None, location, message)
    }

    pub fn include(location: Location, message: impl Into<String>) -> Self {
        Self::new(ErrorKind::Include, None, location, message)
    }

    pub fn integer_overflow(location: Location, literal: &str) -> Self {
        Self::new(
            ErrorKind::IntegerOverflow,
            None,
            location,
            format!("integer literal {literal} is out of range"),
        )
    }

    /// Attach the file the error originated in, keeping an already-set file.
    ///
    /// Errors bubbling out of included files keep the innermost include site.
    pub fn in_file(mut self, file: &str) -> Self {
        if self.file.is_none() {
            self.file = Some(file.to_string());
        }
        self
    }
}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.file {
            Some(file) => write!(
                f,
                "{}:{}: {}: {}",
                file, self.location, self.kind, self.message
            ),
            None => write!(f, "{}: {}: {}", self.location, self.kind, self.message),
        }
    }
}

impl std::error::Error for Error {}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn error_display_without_file() {
        let err = Error::syntax(Location::new(2, 5), "unexpected token");
        assert_eq!(err.to_string(), "2.5: syntax error: unexpected token");
    }

    #[test]
    fn error_display_with_file() {
        let err = Error::include(Location::new(1, 9), "cyclic include of \"a.yar\"")
            .in_file("rules/b.yar");
        assert_eq!(
            err.to_string(),
            "rules/b.yar:1.9: include error: cyclic include of \"a.yar\""
        );
    }

    #[test]
    fn in_file_keeps_innermost_include_site() {
        let err = Error::lex(Location::new(4, 2), "bad byte")
            .in_file("inner.yar")
            .in_file("outer.yar");
        assert_eq!(err.file.as_deref(), Some("inner.yar"));
    }

    #[test]
    fn overflow_message_names_the_literal() {
        let err = Error::integer_overflow(Location::new(1, 1), "18446744073709551616");
        assert_eq!(err.kind, ErrorKind::IntegerOverflow);
        assert!(err.message.contains("18446744073709551616"));
    }
}
