//! Newline sector classification and insertion.
//!
//! A "sector" boundary is a pair of adjacent significant tokens that must
//! not share a line: the edges of a rule body, the start of a section, the
//! entries of `meta:` and `strings:`, top-level statements, and `and`/`or`
//! operators in condition lines that have outgrown the soft width. The
//! pass records every boundary that lacks a newline token, then inserts
//! exactly those.

use yar_common::stream::INDENT;
use yar_common::{TokenIt, TokenKind, TokenStream};

/// Soft maximum line width for condition expressions.
const SOFT_WIDTH: usize = 100;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Section {
    None,
    Meta,
    Strings,
    Condition,
}

/// Insert the missing newline tokens. Runs at most once per stream.
pub fn autoformat(stream: &mut TokenStream) {
    if stream.is_formatted() {
        return;
    }
    let breaks = classify_breaks(stream);
    for before in breaks {
        stream.emplace(before, TokenKind::Newline, None);
    }
    stream.mark_formatted();
}

/// Walk the stream and collect the tokens that must start a new line but
/// currently do not.
fn classify_breaks(stream: &TokenStream) -> Vec<TokenIt> {
    let mut breaks = Vec::new();

    let mut prev: Option<TokenKind> = None;
    let mut newline_between = true;
    let mut brace_depth: usize = 0;
    let mut paren_depth: usize = 0;
    let mut section = Section::None;
    // Estimated width of the current output line.
    let mut line_len: usize = 0;
    // Set when the previous significant token requires a break after it.
    let mut break_after_prev = false;

    for it in stream.iter() {
        let token = &stream[it];
        let kind = token.kind();
        if kind == TokenKind::Newline {
            newline_between = true;
            line_len = 0;
            break_after_prev = false;
            continue;
        }
        if kind.is_comment() {
            continue;
        }

        // Effects of the upcoming token on bookkeeping that the break
        // decision needs up front.
        if kind == TokenKind::RBrace {
            brace_depth = brace_depth.saturating_sub(1);
        }

        let needs_break = prev.is_some()
            && !newline_between
            && (break_after_prev || starts_line(kind, prev, brace_depth, section));
        if needs_break {
            breaks.push(it);
            line_len = (brace_depth + usize::from(section != Section::None)) * INDENT;
        }

        line_len += token.text().len() + 1;

        // Bookkeeping after placing the token.
        match kind {
            TokenKind::LBrace => {
                brace_depth += 1;
                section = Section::None;
            }
            TokenKind::RBrace => section = Section::None,
            TokenKind::MetaKw if brace_depth > 0 => section = Section::Meta,
            TokenKind::StringsKw if brace_depth > 0 => section = Section::Strings,
            TokenKind::ConditionKw if brace_depth > 0 => section = Section::Condition,
            TokenKind::LParen => paren_depth += 1,
            TokenKind::RParen => paren_depth = paren_depth.saturating_sub(1),
            _ => {}
        }

        break_after_prev = match kind {
            // `{` of a rule body and `:` of a section open their own line.
            TokenKind::LBrace => true,
            TokenKind::Colon
                if matches!(prev, Some(p) if p.is_section_keyword()) =>
            {
                true
            }
            // Long condition lines break after a top-level `and`/`or`.
            TokenKind::AndKw | TokenKind::OrKw
                if section == Section::Condition
                    && paren_depth == 0
                    && line_len > SOFT_WIDTH =>
            {
                true
            }
            _ => false,
        };

        prev = Some(kind);
        newline_between = false;
    }

    breaks
}

/// Whether `kind` must start its own line given what precedes it.
fn starts_line(
    kind: TokenKind,
    prev: Option<TokenKind>,
    brace_depth: usize,
    section: Section,
) -> bool {
    match kind {
        // Top-level statements and rule headers.
        TokenKind::ImportKw | TokenKind::IncludeKw => brace_depth == 0,
        TokenKind::RuleKw => {
            brace_depth == 0
                && !matches!(prev, Some(TokenKind::GlobalKw) | Some(TokenKind::PrivateKw))
        }
        TokenKind::GlobalKw | TokenKind::PrivateKw => {
            brace_depth == 0
                && !matches!(prev, Some(TokenKind::GlobalKw) | Some(TokenKind::PrivateKw))
        }
        // Rule-body braces, section keywords and the closing brace sit on
        // their own lines.
        TokenKind::LBrace => brace_depth == 0,
        TokenKind::MetaKw | TokenKind::StringsKw | TokenKind::ConditionKw => brace_depth > 0,
        TokenKind::RBrace => true,
        // A fresh meta entry follows a completed `key = value`.
        TokenKind::Ident if section == Section::Meta => matches!(
            prev,
            Some(TokenKind::StringLit)
                | Some(TokenKind::IntLit)
                | Some(TokenKind::DoubleLit)
                | Some(TokenKind::TrueKw)
                | Some(TokenKind::FalseKw)
        ),
        // A fresh string declaration; `$x` after `=` would be a value.
        TokenKind::StringId if section == Section::Strings => {
            !matches!(prev, Some(TokenKind::Assign))
        }
        _ => false,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use yar_common::Literal;

    /// Build a stream from (kind, text) pairs; empty text means the
    /// kind's fixed lexeme.
    fn tokenize(tokens: &[(TokenKind, &str)]) -> TokenStream {
        let mut stream = TokenStream::new();
        for (kind, text) in tokens {
            if text.is_empty() {
                stream.emplace_back(*kind, None);
            } else {
                stream.emplace_back(*kind, Literal::from(*text));
            }
        }
        stream
    }

    use TokenKind::*;

    #[test]
    fn single_line_rule_gains_structure() {
        let mut stream = tokenize(&[
            (RuleKw, ""),
            (Ident, "r"),
            (LBrace, ""),
            (ConditionKw, ""),
            (Colon, ""),
            (TrueKw, ""),
            (RBrace, ""),
        ]);
        autoformat(&mut stream);
        assert_eq!(
            stream.get_text(false, true),
            "rule r\n{\n    condition:\n        true\n}"
        );
    }

    #[test]
    fn autoformat_is_idempotent() {
        let mut stream = tokenize(&[
            (RuleKw, ""),
            (Ident, "r"),
            (LBrace, ""),
            (ConditionKw, ""),
            (Colon, ""),
            (TrueKw, ""),
            (RBrace, ""),
        ]);
        autoformat(&mut stream);
        let once = stream.get_text(false, true);
        autoformat(&mut stream);
        assert_eq!(stream.get_text(false, true), once);
    }

    #[test]
    fn classification_converges_without_the_flag() {
        let mut stream = tokenize(&[
            (RuleKw, ""),
            (Ident, "r"),
            (LBrace, ""),
            (ConditionKw, ""),
            (Colon, ""),
            (TrueKw, ""),
            (RBrace, ""),
        ]);
        autoformat(&mut stream);
        assert!(classify_breaks(&stream).is_empty());
    }

    #[test]
    fn existing_newlines_are_respected() {
        let mut stream = tokenize(&[
            (RuleKw, ""),
            (Ident, "r"),
            (Newline, ""),
            (LBrace, ""),
            (Newline, ""),
            (ConditionKw, ""),
            (Colon, ""),
            (Newline, ""),
            (TrueKw, ""),
            (Newline, ""),
            (RBrace, ""),
        ]);
        let before = stream.len();
        autoformat(&mut stream);
        assert_eq!(stream.len(), before);
    }

    #[test]
    fn rules_separate_and_strings_split() {
        let mut stream = tokenize(&[
            (RuleKw, ""),
            (Ident, "a"),
            (LBrace, ""),
            (StringsKw, ""),
            (Colon, ""),
            (StringId, "$x"),
            (Assign, ""),
            (StringLit, "x"),
            (StringId, "$y"),
            (Assign, ""),
            (StringLit, "y"),
            (ConditionKw, ""),
            (Colon, ""),
            (StringId, "$x"),
            (RBrace, ""),
            (RuleKw, ""),
            (Ident, "b"),
            (LBrace, ""),
            (ConditionKw, ""),
            (Colon, ""),
            (TrueKw, ""),
            (RBrace, ""),
        ]);
        autoformat(&mut stream);
        let text = stream.get_text(false, true);
        assert!(text.contains("        $x = \"x\"\n        $y = \"y\"\n"));
        assert!(text.contains("}\nrule b\n"));
    }
}
