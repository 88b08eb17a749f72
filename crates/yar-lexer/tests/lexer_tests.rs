//! Lexer integration tests.
//!
//! Each test tokenizes a snippet and snapshots a compact rendering of
//! kind, text and location, or asserts on the specific property under
//! test (longest match, tie-breaking, error locations).

use insta::assert_snapshot;
use yar_common::{ErrorKind, TokenKind};
use yar_lexer::Lexer;

/// One line per token: kind, backquoted text, line.column.
fn render(source: &str) -> String {
    Lexer::tokenize(source)
        .unwrap()
        .tokens()
        .map(|t| {
            let text = if t.kind() == TokenKind::Newline {
                "\\n".to_string()
            } else {
                t.text()
            };
            format!("{:?} `{}` {}", t.kind(), text, t.location())
        })
        .collect::<Vec<_>>()
        .join("\n")
}

#[test]
fn rule_header_tokens() {
    assert_snapshot!(render("private rule demo : win32 {"), @r"
    PrivateKw `private` 1.1
    RuleKw `rule` 1.9
    Ident `demo` 1.14
    Colon `:` 1.19
    Ident `win32` 1.21
    LBrace `{` 1.27
    ");
}

#[test]
fn condition_operator_tokens() {
    assert_snapshot!(render("filesize < 100KB and not true"), @r"
    FilesizeKw `filesize` 1.1
    Lt `<` 1.10
    IntLit `100KB` 1.12
    AndKw `and` 1.18
    NotKw `not` 1.22
    TrueKw `true` 1.26
    ");
}

#[test]
fn hex_string_tokens() {
    assert_snapshot!(render("strings: $h = { 4D ?A [2-4] }"), @r"
    StringsKw `strings` 1.1
    Colon `:` 1.8
    StringId `$h` 1.10
    Assign `=` 1.13
    HexStart `{` 1.15
    HexByte `4D` 1.17
    HexByte `?A` 1.20
    HexJump `[2-4]` 1.23
    HexEnd `}` 1.29
    ");
}

// ── Longest match and tie-breaking ─────────────────────────────────────

#[test]
fn longest_match_wins_on_compound_operators() {
    let kinds: Vec<TokenKind> = Lexer::tokenize("<< <= < == = .. . != !x")
        .unwrap()
        .tokens()
        .map(|t| t.kind())
        .collect();
    assert_eq!(
        kinds,
        vec![
            TokenKind::Shl,
            TokenKind::Le,
            TokenKind::Lt,
            TokenKind::Eq,
            TokenKind::Assign,
            TokenKind::DotDot,
            TokenKind::Dot,
            TokenKind::Neq,
            TokenKind::StringLength,
        ]
    );
}

#[test]
fn keywords_win_only_on_exact_match() {
    let kinds: Vec<TokenKind> = Lexer::tokenize("rule rules ruler all allx")
        .unwrap()
        .tokens()
        .map(|t| t.kind())
        .collect();
    assert_eq!(
        kinds,
        vec![
            TokenKind::RuleKw,
            TokenKind::Ident,
            TokenKind::Ident,
            TokenKind::AllKw,
            TokenKind::Ident,
        ]
    );
}

#[test]
fn integer_function_is_one_token_not_ident_and_digits() {
    let stream = Lexer::tokenize("uint32be").unwrap();
    let token = stream.tokens().next().unwrap();
    assert_eq!(token.kind(), TokenKind::IntegerFunction);
    assert_eq!(token.text(), "uint32be");
}

// ── Literal shapes ─────────────────────────────────────────────────────

#[test]
fn numeric_literals_keep_their_spelling() {
    let stream = Lexer::tokenize("10 0x10 0o10 10KB 10MB 1.5").unwrap();
    let texts: Vec<String> = stream.get_tokens_as_text();
    assert_eq!(texts, vec!["10", "0x10", "0o10", "10KB", "10MB", "1.5"]);

    let values: Vec<_> = stream
        .tokens()
        .map(|t| t.literal().unwrap().pure_text())
        .collect();
    assert_eq!(
        values,
        vec!["10", "16", "8", "10240", "10485760", "1.5"]
    );
}

#[test]
fn range_does_not_eat_a_double() {
    let kinds: Vec<TokenKind> = Lexer::tokenize("(1..10)")
        .unwrap()
        .tokens()
        .map(|t| t.kind())
        .collect();
    assert_eq!(
        kinds,
        vec![
            TokenKind::LParen,
            TokenKind::IntLit,
            TokenKind::DotDot,
            TokenKind::IntLit,
            TokenKind::RParen,
        ]
    );
}

// ── Errors ─────────────────────────────────────────────────────────────

#[test]
fn two_to_the_sixty_fourth_overflows_with_location() {
    let err = Lexer::tokenize("x = 18446744073709551616").unwrap_err();
    assert_eq!(err.kind, ErrorKind::IntegerOverflow);
    assert_eq!((err.location.line, err.location.column), (1, 5));
    assert!(err.message.contains("18446744073709551616"));
}

#[test]
fn unterminated_constructs_error() {
    assert_eq!(
        Lexer::tokenize("\"open").unwrap_err().kind,
        ErrorKind::Lex
    );
    assert_eq!(
        Lexer::tokenize("/* open").unwrap_err().kind,
        ErrorKind::Lex
    );
    assert_eq!(
        Lexer::tokenize("x = /open").unwrap_err().kind,
        ErrorKind::Lex
    );
}

#[test]
fn stray_characters_are_rejected() {
    let err = Lexer::tokenize("rule ;").unwrap_err();
    assert_eq!(err.kind, ErrorKind::Lex);
    assert_eq!((err.location.line, err.location.column), (1, 6));
}
