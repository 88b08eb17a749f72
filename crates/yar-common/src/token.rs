use serde::Serialize;

use crate::literal::Literal;
use crate::location::Location;
use crate::stream::TokenStream;

/// Every kind of token in a YARA source file.
///
/// This enum is the complete lexical vocabulary: keywords, operators,
/// delimiters, string references, literal categories, hex-string atoms,
/// comments, and layout. Exactly one kind per token.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
pub enum TokenKind {
    // ── Structure keywords ─────────────────────────────────────────────
    RuleKw,
    GlobalKw,
    PrivateKw,
    MetaKw,
    StringsKw,
    ConditionKw,
    ImportKw,
    IncludeKw,

    // ── Condition keywords ─────────────────────────────────────────────
    TrueKw,
    FalseKw,
    NotKw,
    AndKw,
    OrKw,
    AtKw,
    InKw,
    OfKw,
    ForKw,
    AllKw,
    AnyKw,
    NoneKw,
    ThemKw,
    ContainsKw,
    MatchesKw,
    FilesizeKw,
    EntrypointKw,

    // ── String modifier keywords ───────────────────────────────────────
    AsciiKw,
    WideKw,
    NocaseKw,
    FullwordKw,
    XorKw,
    Base64Kw,
    Base64WideKw,

    // ── Operators ──────────────────────────────────────────────────────
    /// `=`
    Assign,
    /// `==`
    Eq,
    /// `!=`
    Neq,
    /// `<`
    Lt,
    /// `>`
    Gt,
    /// `<=`
    Le,
    /// `>=`
    Ge,
    /// `+`
    Plus,
    /// `-`
    Minus,
    /// `-` applied as a prefix; the parser retags `Minus` so the printer
    /// can attach it to its operand.
    UnaryMinus,
    /// `*`
    Star,
    /// `\`
    Backslash,
    /// `%`
    Percent,
    /// `&`
    BitAnd,
    /// `|`
    BitOr,
    /// `^`
    BitXor,
    /// `~`
    BitNot,
    /// `<<`
    Shl,
    /// `>>`
    Shr,

    // ── Delimiters and punctuation ─────────────────────────────────────
    LBrace,
    RBrace,
    LParen,
    RParen,
    LBracket,
    RBracket,
    Colon,
    Comma,
    Dot,
    /// `..` in integer ranges.
    DotDot,

    // ── String references ──────────────────────────────────────────────
    /// `$id`
    StringId,
    /// `$id*` or bare `$*`
    StringWildcard,
    /// `#id` or bare `#`
    StringCount,
    /// `@id`
    StringOffset,
    /// `!id`
    StringLength,

    // ── Value-bearing tokens ───────────────────────────────────────────
    IntLit,
    DoubleLit,
    StringLit,
    /// Regular expression literal; value is the pattern, formatted text
    /// keeps the `/.../<mods>` spelling.
    Regexp,
    Ident,
    /// `int8`/`uint32be`-family conversion function name.
    IntegerFunction,
    /// Quoted path of an `include` statement; after expansion the token
    /// carries the included file's tokens as its sub-stream.
    IncludePath,

    // ── Hex strings ────────────────────────────────────────────────────
    /// `{` opening a hex string body.
    HexStart,
    /// `}` closing a hex string body.
    HexEnd,
    /// One byte pattern: `AB`, `?A`, `A?` or `??`.
    HexByte,
    /// Jump specifier: `[n]`, `[n-m]`, `[n-]`, `[-m]` or `[-]`.
    HexJump,
    /// `(` opening a hex alternation group.
    HexAltStart,
    /// `)` closing a hex alternation group.
    HexAltEnd,
    /// `|` separating hex alternatives.
    HexAlt,

    // ── Comments and layout ────────────────────────────────────────────
    /// `// …`; the value holds the comment verbatim.
    CommentLine,
    /// `/* … */`; the value holds the comment verbatim.
    CommentBlock,
    Newline,
}

impl TokenKind {
    /// Fixed source text for kinds whose spelling never varies.
    ///
    /// Value-bearing kinds return `None`; their text comes from the literal.
    pub fn lexeme(self) -> Option<&'static str> {
        use TokenKind::*;
        let text = match self {
            RuleKw => "rule",
            GlobalKw => "global",
            PrivateKw => "private",
            MetaKw => "meta",
            StringsKw => "strings",
            ConditionKw => "condition",
            ImportKw => "import",
            IncludeKw => "include",
            TrueKw => "true",
            FalseKw => "false",
            NotKw => "not",
            AndKw => "and",
            OrKw => "or",
            AtKw => "at",
            InKw => "in",
            OfKw => "of",
            ForKw => "for",
            AllKw => "all",
            AnyKw => "any",
            NoneKw => "none",
            ThemKw => "them",
            ContainsKw => "contains",
            MatchesKw => "matches",
            FilesizeKw => "filesize",
            EntrypointKw => "entrypoint",
            AsciiKw => "ascii",
            WideKw => "wide",
            NocaseKw => "nocase",
            FullwordKw => "fullword",
            XorKw => "xor",
            Base64Kw => "base64",
            Base64WideKw => "base64wide",
            Assign => "=",
            Eq => "==",
            Neq => "!=",
            Lt => "<",
            Gt => ">",
            Le => "<=",
            Ge => ">=",
            Plus => "+",
            Minus | UnaryMinus => "-",
            Star => "*",
            Backslash => "\\",
            Percent => "%",
            BitAnd => "&",
            BitOr => "|",
            BitXor => "^",
            BitNot => "~",
            Shl => "<<",
            Shr => ">>",
            LBrace | HexStart => "{",
            RBrace | HexEnd => "}",
            LParen | HexAltStart => "(",
            RParen | HexAltEnd => ")",
            LBracket => "[",
            RBracket => "]",
            Colon => ":",
            Comma => ",",
            Dot => ".",
            DotDot => "..",
            HexAlt => "|",
            Newline => "\n",
            _ => return None,
        };
        Some(text)
    }

    pub fn is_comment(self) -> bool {
        matches!(self, TokenKind::CommentLine | TokenKind::CommentBlock)
    }

    /// Tokens the parser skips but the stream keeps.
    pub fn is_trivia(self) -> bool {
        self.is_comment() || self == TokenKind::Newline
    }

    /// Section-introducing keywords (`meta`, `strings`, `condition`).
    pub fn is_section_keyword(self) -> bool {
        matches!(
            self,
            TokenKind::MetaKw | TokenKind::StringsKw | TokenKind::ConditionKw
        )
    }

    /// Keywords acceptable as string modifiers.
    pub fn is_string_modifier(self) -> bool {
        matches!(
            self,
            TokenKind::AsciiKw
                | TokenKind::WideKw
                | TokenKind::NocaseKw
                | TokenKind::FullwordKw
                | TokenKind::XorKw
                | TokenKind::Base64Kw
                | TokenKind::Base64WideKw
                | TokenKind::PrivateKw
        )
    }
}

/// Look up a keyword from its identifier spelling.
///
/// The lexer scans an identifier-shaped token first and then calls this to
/// decide between keyword and `Ident`; an exact, whole-token match is what
/// gives keywords their longest-match behavior.
pub fn keyword_from_str(s: &str) -> Option<TokenKind> {
    let kind = match s {
        "rule" => TokenKind::RuleKw,
        "global" => TokenKind::GlobalKw,
        "private" => TokenKind::PrivateKw,
        "meta" => TokenKind::MetaKw,
        "strings" => TokenKind::StringsKw,
        "condition" => TokenKind::ConditionKw,
        "import" => TokenKind::ImportKw,
        "include" => TokenKind::IncludeKw,
        "true" => TokenKind::TrueKw,
        "false" => TokenKind::FalseKw,
        "not" => TokenKind::NotKw,
        "and" => TokenKind::AndKw,
        "or" => TokenKind::OrKw,
        "at" => TokenKind::AtKw,
        "in" => TokenKind::InKw,
        "of" => TokenKind::OfKw,
        "for" => TokenKind::ForKw,
        "all" => TokenKind::AllKw,
        "any" => TokenKind::AnyKw,
        "none" => TokenKind::NoneKw,
        "them" => TokenKind::ThemKw,
        "contains" => TokenKind::ContainsKw,
        "matches" => TokenKind::MatchesKw,
        "filesize" => TokenKind::FilesizeKw,
        "entrypoint" => TokenKind::EntrypointKw,
        "ascii" => TokenKind::AsciiKw,
        "wide" => TokenKind::WideKw,
        "nocase" => TokenKind::NocaseKw,
        "fullword" => TokenKind::FullwordKw,
        "xor" => TokenKind::XorKw,
        "base64" => TokenKind::Base64Kw,
        "base64wide" => TokenKind::Base64WideKw,
        _ => return None,
    };
    Some(kind)
}

/// Recognize the `intN`/`uintN[be]` conversion function names.
pub fn integer_function_from_str(s: &str) -> bool {
    matches!(
        s,
        "int8"
            | "int16"
            | "int32"
            | "uint8"
            | "uint16"
            | "uint32"
            | "int8be"
            | "int16be"
            | "int32be"
            | "uint8be"
            | "uint16be"
            | "uint32be"
    )
}

/// A single lexical element of a YARA file.
#[derive(Debug, Clone, PartialEq)]
pub struct Token {
    kind: TokenKind,
    value: Option<Literal>,
    location: Location,
    sub_stream: Option<TokenStream>,
}

impl Token {
    pub fn new(kind: TokenKind, value: Option<Literal>, location: Location) -> Self {
        Self {
            kind,
            value,
            location,
            sub_stream: None,
        }
    }

    pub fn kind(&self) -> TokenKind {
        self.kind
    }

    /// Retag this token. The parser uses this to turn a binary `-` into
    /// [`TokenKind::UnaryMinus`] once context is known.
    pub fn set_kind(&mut self, kind: TokenKind) {
        self.kind = kind;
    }

    pub fn literal(&self) -> Option<&Literal> {
        self.value.as_ref()
    }

    pub fn location(&self) -> Location {
        self.location
    }

    pub fn set_literal(&mut self, literal: Literal) {
        self.value = Some(literal);
    }

    /// The included file's tokens, when this is an expanded include path.
    pub fn sub_stream(&self) -> Option<&TokenStream> {
        self.sub_stream.as_ref()
    }

    pub fn set_sub_stream(&mut self, stream: TokenStream) {
        self.sub_stream = Some(stream);
    }

    /// Source text of this token as the printer emits it.
    ///
    /// Only plain string literals and include paths are quoted; every other
    /// value-bearing kind (identifiers, string references, comments, hex
    /// atoms, numbers) prints its remembered spelling verbatim.
    pub fn text(&self) -> String {
        let Some(literal) = &self.value else {
            return self.kind.lexeme().unwrap_or("").to_string();
        };
        match self.kind {
            TokenKind::StringLit => literal.text(),
            TokenKind::IncludePath => literal.formatted().map_or_else(
                || format!("\"{}\"", crate::literal::escape_string(&literal.pure_text())),
                str::to_string,
            ),
            _ => literal
                .formatted()
                .map_or_else(|| literal.pure_text(), str::to_string),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::literal::LiteralValue;

    #[test]
    fn keyword_lookup_is_exact() {
        assert_eq!(keyword_from_str("rule"), Some(TokenKind::RuleKw));
        assert_eq!(keyword_from_str("rules"), None);
        assert_eq!(keyword_from_str("Rule"), None);
    }

    #[test]
    fn fixed_lexemes_cover_operators() {
        assert_eq!(TokenKind::Shl.lexeme(), Some("<<"));
        assert_eq!(TokenKind::DotDot.lexeme(), Some(".."));
        assert_eq!(TokenKind::IntLit.lexeme(), None);
    }

    #[test]
    fn token_text_prefers_literal_spelling() {
        let tok = Token::new(
            TokenKind::IntLit,
            Some(Literal::with_format(LiteralValue::Uint(255), "0xFF")),
            Location::default(),
        );
        assert_eq!(tok.text(), "0xFF");
    }

    #[test]
    fn include_path_text_requotes() {
        let tok = Token::new(
            TokenKind::IncludePath,
            Some(Literal::from("other.yar")),
            Location::default(),
        );
        assert_eq!(tok.text(), "\"other.yar\"");
    }

    #[test]
    fn string_modifier_classification() {
        assert!(TokenKind::Base64Kw.is_string_modifier());
        assert!(TokenKind::PrivateKw.is_string_modifier());
        assert!(!TokenKind::GlobalKw.is_string_modifier());
    }
}
