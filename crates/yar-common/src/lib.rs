// Shared types for the yar toolkit.
//
// Everything downstream crates agree on lives here: source locations,
// literal values, tokens, the splice-friendly token stream that backs all
// textual output, and the library-wide error type.

pub mod error;
pub mod literal;
pub mod location;
pub mod stream;
pub mod symbol;
pub mod token;

pub use error::{Error, ErrorKind, Result};
pub use literal::{Literal, LiteralValue};
pub use location::{LineIndex, Location};
pub use stream::{TokenIt, TokenStream};
pub use symbol::{StaticSymbolTable, Symbol, SymbolKind, SymbolTable};
pub use token::{keyword_from_str, Token, TokenKind};
