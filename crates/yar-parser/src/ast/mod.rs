//! Typed AST layer over the token stream.
//!
//! Every node holds a half-open `[first, last)` pair of token iterators
//! delimiting its text in the owning stream; the stream itself is owned by
//! the [`YaraFile`](file::YaraFile) (or, during construction, a builder)
//! and passed explicitly to the APIs that read or rewrite text.

pub mod expr;
pub mod file;
pub mod rule;

pub use expr::{BinaryOp, ExprKind, Expression, ExpressionType};
pub use file::{Import, YaraFile};
pub use rule::{HexUnit, Meta, Rule, RuleModifier, StringModifiers, StringValue, YaraString};
