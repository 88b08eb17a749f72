//! Recursive-descent parser over a lexed token stream.
//!
//! The stream is the lossless layer: the parser walks it by iterator,
//! skipping newline and comment tokens as trivia while leaving them in
//! place, and records every AST node's `[first, last)` span as it goes.
//! Includes are resolved through a caller-supplied callback so the include
//! graph and guard set stay with the driver.

pub(crate) mod expressions;

use rustc_hash::FxHashSet;
use yar_common::literal::LiteralValue;
use yar_common::{Error, Literal, Location, Result, TokenIt, TokenKind, TokenStream};

use crate::ast::expr::Expression;
use crate::ast::file::Import;
use crate::ast::rule::{
    HexUnit, Meta, Rule, RuleModifier, StringModifiers, StringValue, YaraString,
};
use crate::include::IncludedFile;
use crate::uid::UidGenerator;
use crate::visitor::ObservingVisitor;

/// Callback used to expand one `include "path"` directive.
///
/// Returns `Ok(None)` when the include is skipped (guarded mode).
pub(crate) trait IncludeResolver {
    fn resolve(&mut self, path: &str, location: Location) -> Result<Option<IncludedFile>>;
}

impl<F> IncludeResolver for F
where
    F: FnMut(&str, Location) -> Result<Option<IncludedFile>>,
{
    fn resolve(&mut self, path: &str, location: Location) -> Result<Option<IncludedFile>> {
        self(path, location)
    }
}

/// Parse every item of `stream`, resolving includes through `resolver`.
pub(crate) fn parse_stream(
    stream: &mut TokenStream,
    file: Option<String>,
    resolver: &mut dyn IncludeResolver,
) -> Result<(Vec<Import>, Vec<Rule>)> {
    let mut parser = Parser::new(stream, file, resolver);
    parser.parse_file_items()
}

pub(crate) struct Parser<'a> {
    stream: &'a mut TokenStream,
    /// Current significant token, or `END`.
    pos: TokenIt,
    /// Successor of the last consumed token; span ends land here.
    after_last: TokenIt,
    /// Location of the last consumed token, for end-of-input errors.
    last_location: Location,
    file: Option<String>,
    uid: UidGenerator,
    resolver: &'a mut dyn IncludeResolver,
}

impl<'a> Parser<'a> {
    fn new(
        stream: &'a mut TokenStream,
        file: Option<String>,
        resolver: &'a mut dyn IncludeResolver,
    ) -> Self {
        let begin = stream.begin();
        let pos = skip_trivia(stream, begin);
        let mut uid = UidGenerator::new();
        uid.reset();
        Self {
            stream,
            pos,
            after_last: begin,
            last_location: Location::default(),
            file,
            uid,
            resolver,
        }
    }

    // ── Cursor ─────────────────────────────────────────────────────────

    pub(crate) fn peek_kind(&self) -> Option<TokenKind> {
        self.stream.get(self.pos).map(|t| t.kind())
    }

    pub(crate) fn at(&self, kind: TokenKind) -> bool {
        self.peek_kind() == Some(kind)
    }

    /// Consume the current significant token.
    pub(crate) fn advance(&mut self) -> TokenIt {
        let it = self.pos;
        if let Some(token) = self.stream.get(it) {
            self.last_location = token.location();
        }
        self.after_last = self.stream.successor(it);
        self.pos = skip_trivia(self.stream, self.after_last);
        it
    }

    pub(crate) fn eat(&mut self, kind: TokenKind) -> Option<TokenIt> {
        if self.at(kind) {
            Some(self.advance())
        } else {
            None
        }
    }

    pub(crate) fn expect(&mut self, kind: TokenKind) -> Result<TokenIt> {
        if self.at(kind) {
            Ok(self.advance())
        } else {
            let expected = kind
                .lexeme()
                .map(|l| format!("`{l}`"))
                .unwrap_or_else(|| format!("{kind:?}"));
            Err(self.err_here(format!("expected {expected}")))
        }
    }

    /// Location of the current token, or of the last consumed one at the
    /// end of input.
    pub(crate) fn location(&self) -> Location {
        self.stream
            .get(self.pos)
            .map(|t| t.location())
            .unwrap_or(self.last_location)
    }

    pub(crate) fn err_here(&self, message: impl Into<String>) -> Error {
        let message = match self.stream.get(self.pos) {
            Some(token) => format!("{}, found `{}`", message.into(), token.text()),
            None => format!("{}, found end of file", message.into()),
        };
        Error::syntax(self.location(), message)
    }

    /// Span start for the node about to be parsed.
    pub(crate) fn mark(&self) -> TokenIt {
        self.pos
    }

    /// Span end for the node just parsed.
    pub(crate) fn span_end(&self) -> TokenIt {
        self.after_last
    }

    pub(crate) fn stream(&mut self) -> &mut TokenStream {
        self.stream
    }

    pub(crate) fn next_uid(&mut self) -> u64 {
        self.uid.next()
    }

    pub(crate) fn token_text(&self, it: TokenIt) -> String {
        self.stream.get(it).map(|t| t.text()).unwrap_or_default()
    }

    // ── File items ─────────────────────────────────────────────────────

    fn parse_file_items(&mut self) -> Result<(Vec<Import>, Vec<Rule>)> {
        let mut imports = Vec::new();
        let mut rules = Vec::new();
        while let Some(kind) = self.peek_kind() {
            match kind {
                TokenKind::ImportKw => {
                    self.advance();
                    let token = self.expect(TokenKind::StringLit)?;
                    let name = self.stream[token]
                        .literal()
                        .map(|l| l.pure_text())
                        .unwrap_or_default();
                    imports.push(Import::new(name, token));
                }
                TokenKind::IncludeKw => {
                    let include_it = self.advance();
                    let location = self.stream[include_it].location();
                    let path_it = self.expect(TokenKind::IncludePath)?;
                    let path = self.stream[path_it]
                        .literal()
                        .map(|l| l.pure_text())
                        .unwrap_or_default();
                    if let Some(included) = self.resolver.resolve(&path, location)? {
                        let IncludedFile {
                            stream,
                            imports: inner_imports,
                            rules: inner_rules,
                        } = included;
                        self.stream
                            .get_mut(path_it)
                            .expect("include path token is live")
                            .set_sub_stream(stream);
                        imports.extend(inner_imports);
                        rules.extend(inner_rules);
                    }
                }
                TokenKind::RuleKw | TokenKind::GlobalKw | TokenKind::PrivateKw => {
                    rules.push(self.parse_rule()?);
                }
                _ => return Err(self.err_here("expected `rule`, `import` or `include`")),
            }
        }
        Ok((imports, rules))
    }

    // ── Rules ──────────────────────────────────────────────────────────

    fn parse_rule(&mut self) -> Result<Rule> {
        let first = self.mark();

        let mut is_global = false;
        let mut is_private = false;
        loop {
            if self.eat(TokenKind::GlobalKw).is_some() {
                is_global = true;
            } else if self.eat(TokenKind::PrivateKw).is_some() {
                is_private = true;
            } else {
                break;
            }
        }
        let modifier = match (is_global, is_private) {
            (false, false) => RuleModifier::None,
            (true, false) => RuleModifier::Global,
            (false, true) => RuleModifier::Private,
            (true, true) => RuleModifier::GlobalPrivate,
        };

        let rule_it = self.expect(TokenKind::RuleKw)?;
        let location = self.stream[rule_it].location();
        let name = self.expect(TokenKind::Ident)?;

        let mut tags = Vec::new();
        if self.eat(TokenKind::Colon).is_some() {
            tags.push(self.expect(TokenKind::Ident)?);
            while self.at(TokenKind::Ident) {
                tags.push(self.advance());
            }
        }

        self.expect(TokenKind::LBrace)?;

        let mut metas = Vec::new();
        if self.eat(TokenKind::MetaKw).is_some() {
            self.expect(TokenKind::Colon)?;
            while self.at(TokenKind::Ident) {
                metas.push(self.parse_meta()?);
            }
        }

        let mut strings = Vec::new();
        if self.eat(TokenKind::StringsKw).is_some() {
            self.expect(TokenKind::Colon)?;
            let mut seen = FxHashSet::default();
            while self.at(TokenKind::StringId) {
                let string = self.parse_string_decl()?;
                let id = string.id(self.stream);
                if !seen.insert(id.clone()) {
                    let location = self.stream[string.id_token()].location();
                    return Err(Error::semantic(
                        location,
                        format!("duplicate string identifier {id}"),
                    ));
                }
                strings.push(string);
            }
        }

        self.expect(TokenKind::ConditionKw)?;
        self.expect(TokenKind::Colon)?;
        let condition = expressions::parse_expression(self)?;
        self.expect(TokenKind::RBrace)?;
        let last = self.span_end();

        check_string_references(self.stream, &condition, &strings)?;

        Ok(Rule::new(
            modifier,
            name,
            tags,
            metas,
            strings,
            condition,
            location,
            self.file.clone(),
            first,
            last,
        ))
    }

    fn parse_meta(&mut self) -> Result<Meta> {
        let key = self.expect(TokenKind::Ident)?;
        self.expect(TokenKind::Assign)?;
        let value = match self.peek_kind() {
            Some(TokenKind::StringLit)
            | Some(TokenKind::IntLit)
            | Some(TokenKind::DoubleLit) => {
                let it = self.advance();
                self.stream[it].literal().cloned().unwrap_or_default()
            }
            Some(TokenKind::TrueKw) => {
                self.advance();
                Literal::from(true)
            }
            Some(TokenKind::FalseKw) => {
                self.advance();
                Literal::from(false)
            }
            Some(TokenKind::Minus) => {
                let minus = self.advance();
                self.stream
                    .get_mut(minus)
                    .expect("just-consumed token is live")
                    .set_kind(TokenKind::UnaryMinus);
                let it = self.expect(TokenKind::IntLit)?;
                let value = self.stream[it]
                    .literal()
                    .and_then(|l| l.as_int())
                    .ok_or_else(|| {
                        Error::syntax(self.stream[it].location(), "expected integer meta value")
                    })?;
                Literal::new(LiteralValue::Int(-value))
            }
            _ => return Err(self.err_here("expected meta value")),
        };
        Ok(Meta::new(key, value))
    }

    // ── Strings ────────────────────────────────────────────────────────

    fn parse_string_decl(&mut self) -> Result<YaraString> {
        let first = self.mark();
        let id = self.expect(TokenKind::StringId)?;
        self.expect(TokenKind::Assign)?;

        let value = match self.peek_kind() {
            Some(TokenKind::StringLit) => StringValue::Plain {
                value: self.advance(),
            },
            Some(TokenKind::Regexp) => StringValue::Regexp {
                value: self.advance(),
            },
            Some(TokenKind::HexStart) => {
                self.advance();
                let units = self.parse_hex_units(TokenKind::HexEnd)?;
                self.expect(TokenKind::HexEnd)?;
                StringValue::Hex { units }
            }
            _ => return Err(self.err_here("expected string value")),
        };

        let mut modifiers = StringModifiers::empty();
        while let Some(kind) = self.peek_kind() {
            let flag = match kind {
                TokenKind::AsciiKw => StringModifiers::ASCII,
                TokenKind::WideKw => StringModifiers::WIDE,
                TokenKind::NocaseKw => StringModifiers::NOCASE,
                TokenKind::FullwordKw => StringModifiers::FULLWORD,
                TokenKind::XorKw => StringModifiers::XOR,
                TokenKind::Base64Kw => StringModifiers::BASE64,
                TokenKind::Base64WideKw => StringModifiers::BASE64_WIDE,
                TokenKind::PrivateKw => StringModifiers::PRIVATE,
                _ => break,
            };
            self.advance();
            modifiers.insert(flag);
        }

        let last = self.span_end();
        Ok(YaraString::new(id, value, modifiers, first, last))
    }

    /// Parse hex atoms until `terminator` is the current token.
    fn parse_hex_units(&mut self, terminator: TokenKind) -> Result<Vec<HexUnit>> {
        let mut units = Vec::new();
        loop {
            match self.peek_kind() {
                Some(kind) if kind == terminator => break,
                Some(TokenKind::HexByte) => {
                    let it = self.advance();
                    units.push(decode_hex_byte(&self.token_text(it), self.stream[it].location())?);
                }
                Some(TokenKind::HexJump) => {
                    let it = self.advance();
                    units.push(decode_hex_jump(&self.token_text(it), self.stream[it].location())?);
                }
                Some(TokenKind::HexAltStart) => {
                    self.advance();
                    let mut alternatives = Vec::new();
                    loop {
                        alternatives.push(self.parse_hex_alternative()?);
                        if self.eat(TokenKind::HexAlt).is_none() {
                            break;
                        }
                    }
                    self.expect(TokenKind::HexAltEnd)?;
                    units.push(HexUnit::Alternation { alternatives });
                }
                _ => return Err(self.err_here("expected hex string atom")),
            }
        }
        Ok(units)
    }

    /// One branch of a hex alternation: atoms up to `|` or `)`.
    fn parse_hex_alternative(&mut self) -> Result<Vec<HexUnit>> {
        let mut units = Vec::new();
        loop {
            match self.peek_kind() {
                Some(TokenKind::HexAlt) | Some(TokenKind::HexAltEnd) => break,
                Some(TokenKind::HexByte) => {
                    let it = self.advance();
                    units.push(decode_hex_byte(&self.token_text(it), self.stream[it].location())?);
                }
                Some(TokenKind::HexJump) => {
                    let it = self.advance();
                    units.push(decode_hex_jump(&self.token_text(it), self.stream[it].location())?);
                }
                Some(TokenKind::HexAltStart) => {
                    self.advance();
                    let mut alternatives = Vec::new();
                    loop {
                        alternatives.push(self.parse_hex_alternative()?);
                        if self.eat(TokenKind::HexAlt).is_none() {
                            break;
                        }
                    }
                    self.expect(TokenKind::HexAltEnd)?;
                    units.push(HexUnit::Alternation { alternatives });
                }
                _ => return Err(self.err_here("expected hex string atom")),
            }
        }
        Ok(units)
    }
}

fn skip_trivia(stream: &TokenStream, mut it: TokenIt) -> TokenIt {
    while let Some(token) = stream.get(it) {
        if token.kind().is_trivia() {
            it = stream.successor(it);
        } else {
            break;
        }
    }
    it
}

/// Decode `AB`, `?A`, `A?`, `??` into value/mask nibbles.
fn decode_hex_byte(text: &str, location: Location) -> Result<HexUnit> {
    let mut chars = text.chars();
    let (hi, lo) = (chars.next(), chars.next());
    let nibble = |c: Option<char>| -> Result<(u8, u8)> {
        match c {
            Some('?') => Ok((0, 0)),
            Some(c) => c
                .to_digit(16)
                .map(|d| (d as u8, 0xF))
                .ok_or_else(|| Error::lex(location, format!("invalid hex byte {text}"))),
            None => Err(Error::lex(location, format!("invalid hex byte {text}"))),
        }
    };
    let (hi_val, hi_mask) = nibble(hi)?;
    let (lo_val, lo_mask) = nibble(lo)?;
    Ok(HexUnit::Byte {
        value: (hi_val << 4) | lo_val,
        mask: (hi_mask << 4) | lo_mask,
    })
}

/// Decode `[n]`, `[n-m]`, `[n-]`, `[-m]`, `[-]`; a missing low bound is 0,
/// a missing high bound is unbounded.
fn decode_hex_jump(text: &str, location: Location) -> Result<HexUnit> {
    let inner: String = text[1..text.len() - 1]
        .chars()
        .filter(|c| *c != ' ')
        .collect();
    let parse = |s: &str| -> Result<u64> {
        s.parse()
            .map_err(|_| Error::lex(location, format!("invalid hex string jump {text}")))
    };
    let unit = match inner.split_once('-') {
        None => {
            let n = parse(&inner)?;
            HexUnit::Jump {
                low: n,
                high: Some(n),
            }
        }
        Some((low, high)) => {
            let low = if low.is_empty() { 0 } else { parse(low)? };
            let high = if high.is_empty() {
                None
            } else {
                Some(parse(high)?)
            };
            if let Some(high) = high {
                if high < low {
                    return Err(Error::lex(
                        location,
                        format!("hex string jump bounds are inverted in {text}"),
                    ));
                }
            }
            HexUnit::Jump { low, high }
        }
    };
    Ok(unit)
}

// ── String reference validation ────────────────────────────────────────

struct StringRefCheck<'a> {
    stream: &'a TokenStream,
    declared: Vec<String>,
    missing: Option<(String, Location)>,
}

impl StringRefCheck<'_> {
    fn check(&mut self, it: TokenIt) {
        if self.missing.is_some() {
            return;
        }
        let Some(token) = self.stream.get(it) else {
            return;
        };
        let text = token.text();
        let name = text.trim_start_matches(['$', '#', '@', '!']);
        // Bare sigils inside `for` bodies refer to the loop string.
        if name.is_empty() || name == "*" {
            return;
        }
        let found = if let Some(prefix) = name.strip_suffix('*') {
            self.declared.iter().any(|d| d.starts_with(prefix))
        } else {
            self.declared.iter().any(|d| d == name)
        };
        if !found {
            self.missing = Some((text, token.location()));
        }
    }
}

impl ObservingVisitor for StringRefCheck<'_> {
    fn visit_string_ref(&mut self, expr: &Expression) {
        if let crate::ast::expr::ExprKind::StringRef { id } = &expr.kind {
            self.check(*id);
        }
    }

    fn visit_string_wildcard(&mut self, expr: &Expression) {
        if let crate::ast::expr::ExprKind::StringWildcard { id } = &expr.kind {
            self.check(*id);
        }
    }

    fn visit_string_at(&mut self, expr: &Expression) {
        if let crate::ast::expr::ExprKind::StringAt { id, .. } = &expr.kind {
            self.check(*id);
        }
        self.walk(expr);
    }

    fn visit_string_in_range(&mut self, expr: &Expression) {
        if let crate::ast::expr::ExprKind::StringInRange { id, .. } = &expr.kind {
            self.check(*id);
        }
        self.walk(expr);
    }

    fn visit_string_count(&mut self, expr: &Expression) {
        if let crate::ast::expr::ExprKind::StringCount { id } = &expr.kind {
            self.check(*id);
        }
    }

    fn visit_string_offset(&mut self, expr: &Expression) {
        if let crate::ast::expr::ExprKind::StringOffset { id, .. } = &expr.kind {
            self.check(*id);
        }
        self.walk(expr);
    }

    fn visit_string_length(&mut self, expr: &Expression) {
        if let crate::ast::expr::ExprKind::StringLength { id, .. } = &expr.kind {
            self.check(*id);
        }
        self.walk(expr);
    }
}

/// Every string referenced by the condition must be declared.
fn check_string_references(
    stream: &TokenStream,
    condition: &Expression,
    strings: &[YaraString],
) -> Result<()> {
    let declared: Vec<String> = strings
        .iter()
        .map(|s| s.id(stream).trim_start_matches('$').to_string())
        .collect();
    let mut checker = StringRefCheck {
        stream,
        declared,
        missing: None,
    };
    checker.observe(condition);
    match checker.missing {
        Some((name, location)) => Err(Error::semantic(
            location,
            format!("undefined string {name}"),
        )),
        None => Ok(()),
    }
}
