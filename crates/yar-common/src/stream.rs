use std::fmt;
use std::ops::Index;
use std::sync::atomic::{AtomicU64, Ordering};

use rustc_hash::FxHashMap;

use crate::literal::Literal;
use crate::location::Location;
use crate::token::{Token, TokenKind};

/// Number of spaces per indentation level in rendered output.
pub const INDENT: usize = 4;

/// Token ids are drawn from a process-wide counter so that ids never
/// collide between streams. This is what lets `move_append` transfer
/// tokens without invalidating iterators held by AST nodes built against
/// the donor stream.
static NEXT_TOKEN_ID: AtomicU64 = AtomicU64::new(1);

fn fresh_id() -> u64 {
    NEXT_TOKEN_ID.fetch_add(1, Ordering::Relaxed)
}

/// A stable iterator into a [`TokenStream`].
///
/// Remains valid across insertions and erasures of *other* tokens, and
/// across `move_append` into another stream. Only erasing the token it
/// denotes invalidates it. `TokenIt::END` is the shared past-the-end value
/// used by half-open spans.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct TokenIt(u64);

impl TokenIt {
    /// The past-the-end sentinel.
    pub const END: TokenIt = TokenIt(u64::MAX);

    pub fn is_end(self) -> bool {
        self == Self::END
    }
}

#[derive(Debug, Clone, PartialEq)]
struct Node {
    token: Token,
    prev: Option<u64>,
    next: Option<u64>,
}

/// The ordered sequence of lexical tokens backing a parsed file.
///
/// The stream is the single source of truth for textual output: AST nodes
/// hold `[first, last)` spans of `TokenIt` into it, and every edit API keeps
/// those spans valid. Storage is a doubly linked order over a slot table, so
/// insert and erase are O(1) and token addresses are stable.
#[derive(Debug, Clone, Default)]
pub struct TokenStream {
    nodes: FxHashMap<u64, Node>,
    head: Option<u64>,
    tail: Option<u64>,
    /// Set once auto-formatting has run, making it idempotent.
    formatted: bool,
}

impl PartialEq for TokenStream {
    fn eq(&self, other: &Self) -> bool {
        self.formatted == other.formatted
            && self.len() == other.len()
            && self.tokens().zip(other.tokens()).all(|(a, b)| a == b)
    }
}

impl TokenStream {
    pub fn new() -> Self {
        Self::default()
    }

    // ── Capacity ───────────────────────────────────────────────────────

    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    pub fn clear(&mut self) {
        self.nodes.clear();
        self.head = None;
        self.tail = None;
        self.formatted = false;
    }

    /// Whether auto-formatting has already run on this stream.
    pub fn is_formatted(&self) -> bool {
        self.formatted
    }

    pub fn mark_formatted(&mut self) {
        self.formatted = true;
    }

    // ── Insertion ──────────────────────────────────────────────────────

    pub fn push_back(&mut self, token: Token) -> TokenIt {
        self.insert_before(TokenIt::END, token)
    }

    /// Append a token built from a kind and an optional literal.
    pub fn emplace_back(
        &mut self,
        kind: TokenKind,
        value: impl Into<Option<Literal>>,
    ) -> TokenIt {
        self.push_back(Token::new(kind, value.into(), Location::default()))
    }

    /// Insert a token built from a kind and an optional literal before
    /// `before` (which may be `END`), returning an iterator to it.
    pub fn emplace(
        &mut self,
        before: TokenIt,
        kind: TokenKind,
        value: impl Into<Option<Literal>>,
    ) -> TokenIt {
        self.insert_before(before, Token::new(kind, value.into(), Location::default()))
    }

    /// Insert `token` before `before` (which may be `END`).
    pub fn insert_before(&mut self, before: TokenIt, token: Token) -> TokenIt {
        let id = fresh_id();
        let (prev, next) = if before.is_end() {
            (self.tail, None)
        } else {
            let node = self
                .nodes
                .get(&before.0)
                .expect("insert position must be a live token of this stream");
            (node.prev, Some(before.0))
        };
        self.link(id, Node { token, prev, next });
        TokenIt(id)
    }

    fn link(&mut self, id: u64, node: Node) {
        match node.prev {
            Some(p) => self.nodes.get_mut(&p).unwrap().next = Some(id),
            None => self.head = Some(id),
        }
        match node.next {
            Some(n) => self.nodes.get_mut(&n).unwrap().prev = Some(id),
            None => self.tail = Some(id),
        }
        self.nodes.insert(id, node);
    }

    // ── Erasure ────────────────────────────────────────────────────────

    /// Erase one token, returning the iterator following it.
    pub fn erase(&mut self, it: TokenIt) -> TokenIt {
        let node = self
            .nodes
            .remove(&it.0)
            .expect("erase target must be a live token of this stream");
        match node.prev {
            Some(p) => self.nodes.get_mut(&p).unwrap().next = node.next,
            None => self.head = node.next,
        }
        match node.next {
            Some(n) => self.nodes.get_mut(&n).unwrap().prev = node.prev,
            None => self.tail = node.prev,
        }
        node.next.map_or(TokenIt::END, TokenIt)
    }

    /// Erase the half-open range `[first, last)`, returning `last`.
    pub fn erase_range(&mut self, first: TokenIt, last: TokenIt) -> TokenIt {
        let mut cur = first;
        while cur != last && !cur.is_end() {
            cur = self.erase(cur);
        }
        last
    }

    // ── Transfer ───────────────────────────────────────────────────────

    /// Move every token of `donor` to the end of this stream, emptying the
    /// donor. Iterators into the donor stay valid and now denote tokens in
    /// this stream.
    pub fn move_append(&mut self, donor: &mut TokenStream) {
        self.move_append_before(donor, TokenIt::END);
    }

    /// Like [`move_append`](Self::move_append), inserting before `before`.
    pub fn move_append_before(&mut self, donor: &mut TokenStream, before: TokenIt) {
        let mut cur = donor.head;
        while let Some(id) = cur {
            let node = donor.nodes.remove(&id).unwrap();
            cur = node.next;
            let token = node.token;
            let (prev, next) = if before.is_end() {
                (self.tail, None)
            } else {
                let at = self.nodes.get(&before.0).unwrap();
                (at.prev, Some(before.0))
            };
            self.link(id, Node { token, prev, next });
        }
        donor.head = None;
        donor.tail = None;
    }

    // ── Navigation ─────────────────────────────────────────────────────

    /// Iterator to the first token, or `END` when empty.
    pub fn begin(&self) -> TokenIt {
        self.head.map_or(TokenIt::END, TokenIt)
    }

    /// The token after `it`, or `END`.
    pub fn successor(&self, it: TokenIt) -> TokenIt {
        if it.is_end() {
            return TokenIt::END;
        }
        self.nodes
            .get(&it.0)
            .and_then(|n| n.next)
            .map_or(TokenIt::END, TokenIt)
    }

    /// The token before `it`, treating `END` as past-the-end, or `None`
    /// when `it` is the first token.
    pub fn predecessor(&self, it: TokenIt) -> Option<TokenIt> {
        if it.is_end() {
            return self.tail.map(TokenIt);
        }
        self.nodes.get(&it.0).and_then(|n| n.prev).map(TokenIt)
    }

    pub fn get(&self, it: TokenIt) -> Option<&Token> {
        self.nodes.get(&it.0).map(|n| &n.token)
    }

    pub fn get_mut(&mut self, it: TokenIt) -> Option<&mut Token> {
        self.nodes.get_mut(&it.0).map(|n| &mut n.token)
    }

    /// Whether `it` denotes a live token of this stream.
    pub fn contains(&self, it: TokenIt) -> bool {
        self.nodes.contains_key(&it.0)
    }

    /// Ordinal position of `it`, with `END` mapping to `len()`. O(n); meant
    /// for assertions and span checks, not hot paths.
    pub fn position(&self, it: TokenIt) -> Option<usize> {
        if it.is_end() {
            return Some(self.len());
        }
        self.iter().position(|cur| cur == it)
    }

    /// Find the first token of `kind` in `[from, to)`.
    pub fn find_in(&self, kind: TokenKind, from: TokenIt, to: TokenIt) -> Option<TokenIt> {
        let mut cur = from;
        while cur != to && !cur.is_end() {
            if self[cur].kind() == kind {
                return Some(cur);
            }
            cur = self.successor(cur);
        }
        None
    }

    pub fn find(&self, kind: TokenKind) -> Option<TokenIt> {
        self.find_in(kind, self.begin(), TokenIt::END)
    }

    /// Find the last token of `kind` in `[from, to)`.
    pub fn find_backwards_in(
        &self,
        kind: TokenKind,
        from: TokenIt,
        to: TokenIt,
    ) -> Option<TokenIt> {
        let mut found = None;
        let mut cur = from;
        while cur != to && !cur.is_end() {
            if self[cur].kind() == kind {
                found = Some(cur);
            }
            cur = self.successor(cur);
        }
        found
    }

    pub fn find_backwards(&self, kind: TokenKind) -> Option<TokenIt> {
        self.find_backwards_in(kind, self.begin(), TokenIt::END)
    }

    /// Iterate token iterators in stream order.
    pub fn iter(&self) -> StreamIter<'_> {
        StreamIter {
            stream: self,
            cur: self.head,
        }
    }

    /// Iterate tokens in stream order.
    pub fn tokens(&self) -> impl Iterator<Item = &Token> {
        self.iter().map(move |it| &self[it])
    }

    // ── Text representation ────────────────────────────────────────────

    /// Each token's text, in order, without any layout.
    pub fn get_tokens_as_text(&self) -> Vec<String> {
        self.tokens().map(Token::text).collect()
    }

    /// Render the stream as source text.
    ///
    /// With `with_includes`, include directives are replaced by the included
    /// file's tokens; otherwise they print as written. With `align_comments`,
    /// trailing comments across the output share one start column (the
    /// maximum natural column over all lines that carry one).
    pub fn get_text(&self, with_includes: bool, align_comments: bool) -> String {
        let flat = self.flatten(with_includes);
        let (text, max_col, saw_trailing) = render(&flat, None);
        if align_comments && saw_trailing {
            render(&flat, Some(max_col)).0
        } else {
            text
        }
    }

    /// Render the token range `[first, last)` on a single line.
    ///
    /// Newline tokens inside the span collapse to spaces; used for the text
    /// of individual AST nodes.
    pub fn span_text(&self, first: TokenIt, last: TokenIt) -> String {
        let mut out = String::new();
        let mut prev: Option<&Token> = None;
        let mut cur = first;
        while cur != last && !cur.is_end() {
            let tok = &self[cur];
            if tok.kind() == TokenKind::Newline {
                cur = self.successor(cur);
                continue;
            }
            if let Some(p) = prev {
                if needs_space(p, tok) {
                    out.push(' ');
                }
            }
            out.push_str(&tok.text());
            prev = Some(tok);
            cur = self.successor(cur);
        }
        out
    }

    /// Resolve includes into a flat token list for printing.
    fn flatten(&self, with_includes: bool) -> Vec<Token> {
        let mut out = Vec::with_capacity(self.len());
        let mut cur = self.begin();
        while !cur.is_end() {
            let tok = &self[cur];
            let next = self.successor(cur);
            if with_includes {
                if tok.kind() == TokenKind::IncludeKw {
                    if let Some(path) = self.get(next) {
                        if path.kind() == TokenKind::IncludePath && path.sub_stream().is_some() {
                            // The include directive itself is replaced by the
                            // included tokens hanging off the path token.
                            cur = next;
                            continue;
                        }
                    }
                }
                if tok.kind() == TokenKind::IncludePath {
                    if let Some(sub) = tok.sub_stream() {
                        out.extend(sub.flatten(true));
                        cur = next;
                        continue;
                    }
                }
            }
            out.push(tok.clone());
            cur = next;
        }
        out
    }
}

impl Index<TokenIt> for TokenStream {
    type Output = Token;

    fn index(&self, it: TokenIt) -> &Token {
        self.get(it)
            .expect("token iterator must denote a live token of this stream")
    }
}

impl fmt::Display for TokenStream {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.get_text(false, true))
    }
}

pub struct StreamIter<'a> {
    stream: &'a TokenStream,
    cur: Option<u64>,
}

impl<'a> Iterator for StreamIter<'a> {
    type Item = TokenIt;

    fn next(&mut self) -> Option<TokenIt> {
        let id = self.cur?;
        self.cur = self.stream.nodes.get(&id).and_then(|n| n.next);
        Some(TokenIt(id))
    }
}

// ── Printing ───────────────────────────────────────────────────────────

/// Whether a single space separates `prev` and `next` on one line.
pub(crate) fn needs_space(prev: &Token, next: &Token) -> bool {
    use TokenKind::*;
    let p = prev.kind();
    let n = next.kind();

    // Openers and tight prefixes glue to what follows.
    if matches!(p, LParen | LBracket | Dot | DotDot | BitNot | UnaryMinus) {
        return false;
    }
    // Closers and tight suffixes glue to what precedes.
    if matches!(n, RParen | RBracket | Comma | Dot | DotDot) {
        return false;
    }
    // Section headers: `meta:` not `meta :`.
    if n == Colon && p.is_section_keyword() {
        return false;
    }
    // Calls and subscripts: `uint32(0)`, `@a[1]`, `pe.sections[0]`.
    if n == LParen && matches!(p, Ident | IntegerFunction) {
        return false;
    }
    if n == LBracket {
        return false;
    }
    true
}

/// Emit a flat token list, tracking (line, column).
///
/// Returns the text, the maximum natural start column of trailing comments,
/// and whether any trailing comment was seen. When `shared_col` is set,
/// trailing comments are padded out to that column.
fn render(tokens: &[Token], shared_col: Option<usize>) -> (String, usize, bool) {
    use TokenKind::*;

    let mut out = String::new();
    let mut line_len: usize = 0;
    let mut at_line_start = true;
    let mut brace_depth: usize = 0;
    let mut in_section = false;
    let mut max_comment_col: usize = 0;
    let mut saw_trailing = false;
    let mut prev: Option<&Token> = None;

    for (i, tok) in tokens.iter().enumerate() {
        match tok.kind() {
            Newline => {
                out.push('\n');
                line_len = 0;
                at_line_start = true;
                prev = None;
                continue;
            }
            RBrace => {
                brace_depth = brace_depth.saturating_sub(1);
                in_section = false;
            }
            _ => {}
        }

        // A comment is end-of-line only when a newline (or the end of the
        // stream) follows; mid-line comments flow like ordinary tokens.
        let ends_line = tokens
            .get(i + 1)
            .map_or(true, |next| next.kind() == Newline);

        if at_line_start {
            let extra = usize::from(in_section && !tok.kind().is_section_keyword());
            let indent = (brace_depth + extra) * INDENT;
            out.push_str(&" ".repeat(indent));
            line_len = indent;
            at_line_start = false;
        } else if tok.kind().is_comment() && ends_line {
            // A comment following code on its line: candidate for alignment.
            saw_trailing = true;
            let natural = line_len + 1;
            max_comment_col = max_comment_col.max(natural);
            let target = shared_col.map_or(natural, |c| c.max(natural));
            out.push_str(&" ".repeat(target - line_len));
            line_len = target;
            emit_token(tok, &mut out, &mut line_len, brace_depth, in_section);
            prev = Some(tok);
            continue;
        } else if let Some(p) = prev {
            if needs_space(p, tok) {
                out.push(' ');
                line_len += 1;
            }
        }

        emit_token(tok, &mut out, &mut line_len, brace_depth, in_section);

        match tok.kind() {
            LBrace => {
                brace_depth += 1;
                in_section = false;
            }
            Colon => {
                if prev.is_some_and(|p| p.kind().is_section_keyword()) {
                    in_section = true;
                }
            }
            _ => {}
        }
        prev = Some(tok);
    }

    (out, max_comment_col, saw_trailing)
}

/// Write one token's text, re-indenting the continuation lines of
/// multi-line block comments.
fn emit_token(
    tok: &Token,
    out: &mut String,
    line_len: &mut usize,
    brace_depth: usize,
    in_section: bool,
) {
    let text = tok.text();
    if tok.kind() == TokenKind::CommentBlock && text.contains('\n') {
        let indent = (brace_depth + usize::from(in_section)) * INDENT;
        for (i, comment_line) in text.split('\n').enumerate() {
            if i > 0 {
                out.push('\n');
                out.push_str(&" ".repeat(indent));
                *line_len = indent;
            }
            out.push_str(comment_line);
            *line_len += comment_line.len();
        }
    } else {
        out.push_str(&text);
        *line_len += text.len();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::literal::Literal;

    fn ident(name: &str) -> Token {
        Token::new(TokenKind::Ident, Some(Literal::from(name)), Location::default())
    }

    fn stream_of_kinds(kinds: &[TokenKind]) -> TokenStream {
        let mut ts = TokenStream::new();
        for &k in kinds {
            ts.emplace_back(k, None);
        }
        ts
    }

    #[test]
    fn push_back_then_erase_restores_prior_state() {
        let mut ts = TokenStream::new();
        ts.emplace_back(TokenKind::RuleKw, None);
        let snapshot = ts.clone();
        let it = ts.push_back(ident("r"));
        assert_eq!(ts.len(), 2);
        ts.erase(it);
        assert_eq!(ts, snapshot);
    }

    #[test]
    fn iterators_survive_unrelated_edits() {
        let mut ts = TokenStream::new();
        let a = ts.push_back(ident("a"));
        let b = ts.push_back(ident("b"));
        let c = ts.push_back(ident("c"));
        ts.erase(b);
        ts.emplace(c, TokenKind::Comma, None);
        assert_eq!(ts[a].text(), "a");
        assert_eq!(ts[c].text(), "c");
        assert_eq!(ts.get_tokens_as_text(), vec!["a", ",", "c"]);
    }

    #[test]
    fn emplace_before_end_appends() {
        let mut ts = TokenStream::new();
        ts.emplace(TokenIt::END, TokenKind::RuleKw, None);
        let it = ts.emplace(TokenIt::END, TokenKind::LBrace, None);
        assert_eq!(ts.successor(it), TokenIt::END);
        assert_eq!(ts.len(), 2);
    }

    #[test]
    fn erase_range_is_half_open() {
        let mut ts = TokenStream::new();
        let a = ts.push_back(ident("a"));
        ts.push_back(ident("b"));
        let c = ts.push_back(ident("c"));
        let ret = ts.erase_range(a, c);
        assert_eq!(ret, c);
        assert_eq!(ts.get_tokens_as_text(), vec!["c"]);
    }

    #[test]
    fn find_and_find_backwards() {
        let ts = stream_of_kinds(&[
            TokenKind::LParen,
            TokenKind::Comma,
            TokenKind::Comma,
            TokenKind::RParen,
        ]);
        let first = ts.find(TokenKind::Comma).unwrap();
        let last = ts.find_backwards(TokenKind::Comma).unwrap();
        assert_ne!(first, last);
        assert_eq!(ts.successor(first), last);
        assert_eq!(ts.find(TokenKind::RuleKw), None);
    }

    #[test]
    fn predecessor_of_end_is_tail() {
        let mut ts = TokenStream::new();
        let a = ts.push_back(ident("a"));
        let b = ts.push_back(ident("b"));
        assert_eq!(ts.predecessor(TokenIt::END), Some(b));
        assert_eq!(ts.predecessor(b), Some(a));
        assert_eq!(ts.predecessor(a), None);
    }

    #[test]
    fn move_append_keeps_donor_iterators_valid() {
        let mut master = TokenStream::new();
        master.push_back(ident("head"));
        let mut donor = TokenStream::new();
        let x = donor.push_back(ident("x"));
        let y = donor.push_back(ident("y"));
        master.move_append(&mut donor);
        assert!(donor.is_empty());
        assert_eq!(master[x].text(), "x");
        assert_eq!(master[y].text(), "y");
        assert_eq!(master.get_tokens_as_text(), vec!["head", "x", "y"]);
    }

    #[test]
    fn move_append_before_splices_mid_stream() {
        let mut master = TokenStream::new();
        master.push_back(ident("a"));
        let end = master.push_back(ident("z"));
        let mut donor = TokenStream::new();
        donor.push_back(ident("m"));
        master.move_append_before(&mut donor, end);
        assert_eq!(master.get_tokens_as_text(), vec!["a", "m", "z"]);
    }

    #[test]
    fn move_append_preserves_comment_multiset() {
        let mut master = TokenStream::new();
        master.emplace_back(TokenKind::CommentLine, Literal::from("// one"));
        let mut donor = TokenStream::new();
        donor.emplace_back(TokenKind::CommentLine, Literal::from("// two"));
        master.move_append(&mut donor);
        let comments: Vec<_> = master
            .tokens()
            .filter(|t| t.kind().is_comment())
            .map(Token::text)
            .collect();
        assert_eq!(comments, vec!["// one", "// two"]);
    }

    #[test]
    fn position_orders_spans() {
        let mut ts = TokenStream::new();
        let a = ts.push_back(ident("a"));
        let b = ts.push_back(ident("b"));
        assert!(ts.position(a).unwrap() < ts.position(b).unwrap());
        assert_eq!(ts.position(TokenIt::END), Some(2));
    }

    #[test]
    fn render_spacing_rules() {
        let mut ts = TokenStream::new();
        ts.emplace_back(TokenKind::IntegerFunction, Literal::from("uint32"));
        ts.emplace_back(TokenKind::LParen, None);
        ts.emplace_back(TokenKind::IntLit, Literal::from(0i64));
        ts.emplace_back(TokenKind::RParen, None);
        ts.emplace_back(TokenKind::Eq, None);
        ts.emplace_back(
            TokenKind::IntLit,
            Literal::with_format(crate::literal::LiteralValue::Uint(0x5a4d), "0x5A4D"),
        );
        assert_eq!(ts.get_text(false, true), "uint32(0) == 0x5A4D");
    }

    #[test]
    fn render_indents_rule_body() {
        let mut ts = TokenStream::new();
        ts.emplace_back(TokenKind::RuleKw, None);
        ts.emplace_back(TokenKind::Ident, Literal::from("r"));
        ts.emplace_back(TokenKind::Newline, None);
        ts.emplace_back(TokenKind::LBrace, None);
        ts.emplace_back(TokenKind::Newline, None);
        ts.emplace_back(TokenKind::ConditionKw, None);
        ts.emplace_back(TokenKind::Colon, None);
        ts.emplace_back(TokenKind::Newline, None);
        ts.emplace_back(TokenKind::TrueKw, None);
        ts.emplace_back(TokenKind::Newline, None);
        ts.emplace_back(TokenKind::RBrace, None);
        ts.emplace_back(TokenKind::Newline, None);
        assert_eq!(
            ts.get_text(false, true),
            "rule r\n{\n    condition:\n        true\n}\n"
        );
    }

    #[test]
    fn trailing_comments_share_a_column() {
        let mut ts = TokenStream::new();
        ts.emplace_back(TokenKind::StringId, Literal::from("$alpha"));
        ts.emplace_back(TokenKind::CommentLine, Literal::from("// first"));
        ts.emplace_back(TokenKind::Newline, None);
        ts.emplace_back(TokenKind::StringId, Literal::from("$b"));
        ts.emplace_back(TokenKind::CommentLine, Literal::from("// second"));
        ts.emplace_back(TokenKind::Newline, None);
        let text = ts.get_text(false, true);
        let cols: Vec<_> = text
            .lines()
            .filter_map(|l| l.find("//"))
            .collect();
        assert_eq!(cols, vec![7, 7]);
    }

    #[test]
    fn lone_comments_are_not_aligned() {
        let mut ts = TokenStream::new();
        ts.emplace_back(TokenKind::CommentLine, Literal::from("// alone"));
        ts.emplace_back(TokenKind::Newline, None);
        ts.emplace_back(TokenKind::StringId, Literal::from("$a"));
        ts.emplace_back(TokenKind::CommentLine, Literal::from("// trailing"));
        ts.emplace_back(TokenKind::Newline, None);
        let text = ts.get_text(false, true);
        assert!(text.starts_with("// alone\n"));
    }

    #[test]
    fn include_expansion_splices_sub_stream() {
        let mut included = TokenStream::new();
        included.emplace_back(TokenKind::Ident, Literal::from("inner"));
        included.emplace_back(TokenKind::Newline, None);

        let mut ts = TokenStream::new();
        ts.emplace_back(TokenKind::IncludeKw, None);
        let path = ts.emplace_back(TokenKind::IncludePath, Literal::from("b.yar"));
        ts.emplace_back(TokenKind::Newline, None);
        ts.get_mut(path).unwrap().set_sub_stream(included);

        assert_eq!(ts.get_text(false, true), "include \"b.yar\"\n");
        assert_eq!(ts.get_text(true, true), "inner\n\n");
    }

    #[test]
    fn span_text_collapses_newlines() {
        let mut ts = TokenStream::new();
        let first = ts.emplace_back(TokenKind::StringId, Literal::from("$a"));
        ts.emplace_back(TokenKind::OrKw, None);
        ts.emplace_back(TokenKind::Newline, None);
        ts.emplace_back(TokenKind::StringId, Literal::from("$b"));
        assert_eq!(ts.span_text(first, TokenIt::END), "$a or $b");
    }

    #[test]
    fn clear_resets_formatted_flag() {
        let mut ts = TokenStream::new();
        ts.emplace_back(TokenKind::RuleKw, None);
        ts.mark_formatted();
        ts.clear();
        assert!(ts.is_empty());
        assert!(!ts.is_formatted());
    }
}
