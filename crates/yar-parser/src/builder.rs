//! Fluent builders for expressions, hex strings, rules and files.
//!
//! Each builder writes canonical tokens into a private stream as it goes
//! and hands back the finished piece together with that stream. Combining
//! two builders transfers the right stream into the left with
//! `move_append`, so recorded spans survive; the containing file builder
//! merges every rule stream into the master stream the same way.
//!
//! Binary constructors wrap operands that are themselves binary
//! expressions in parentheses marked synthetic; the formatter elides the
//! redundant ones.

use std::sync::atomic::{AtomicU64, Ordering};

use yar_common::literal::LiteralValue;
use yar_common::{Error, Literal, Location, Result, TokenIt, TokenKind, TokenStream};

use crate::ast::expr::{BinaryOp, ExprKind, Expression, ExpressionType};
use crate::ast::file::{Import, YaraFile};
use crate::ast::rule::{
    HexUnit, Meta, Rule, RuleModifier, StringModifiers, StringValue, YaraString,
};
use crate::visitor::Replacement;

/// Builder node ids come from their own counter, offset away from the
/// parser's per-file range so mixing parsed and built nodes in one map
/// stays collision-free.
static BUILDER_UID: AtomicU64 = AtomicU64::new(1 << 32);

fn next_uid() -> u64 {
    BUILDER_UID.fetch_add(1, Ordering::Relaxed)
}

/// A finished expression together with the stream holding its tokens.
pub struct Built {
    pub expr: Expression,
    pub tokens: TokenStream,
}

impl Built {
    /// Render the built expression.
    pub fn text(&self) -> String {
        self.expr.text(&self.tokens)
    }
}

impl From<Built> for Replacement {
    fn from(built: Built) -> Replacement {
        Replacement::built(built.expr, built.tokens)
    }
}

/// Fluent constructor for condition expressions.
///
/// The expression under construction is always the tail of the private
/// stream; its open span ends are pinned whenever a token is appended
/// after it.
pub struct ExprBuilder {
    expr: Expression,
    stream: TokenStream,
}

impl ExprBuilder {
    fn leaf(
        token: TokenKind,
        value: Option<Literal>,
        make: impl FnOnce(TokenIt) -> ExprKind,
        ty: ExpressionType,
    ) -> Self {
        let mut stream = TokenStream::new();
        let it = stream.emplace_back(token, value);
        let expr = Expression::new(make(it), ty, next_uid(), it, TokenIt::END);
        Self { expr, stream }
    }

    fn nullary(token: TokenKind, kind: ExprKind, ty: ExpressionType) -> Self {
        let mut stream = TokenStream::new();
        let it = stream.emplace_back(token, None);
        let expr = Expression::new(kind, ty, next_uid(), it, TokenIt::END);
        Self { expr, stream }
    }

    // ── Literals ───────────────────────────────────────────────────────

    pub fn bool_lit(value: bool) -> Self {
        let token = if value {
            TokenKind::TrueKw
        } else {
            TokenKind::FalseKw
        };
        Self::leaf(token, None, ExprKind::BoolLit, ExpressionType::Bool)
    }

    pub fn int_lit(value: i64) -> Self {
        Self::leaf(
            TokenKind::IntLit,
            Some(Literal::new(LiteralValue::Int(value))),
            ExprKind::IntLit,
            ExpressionType::Int,
        )
    }

    /// An unsigned literal rendered in hex (`0x1A`).
    pub fn hex_int_lit(value: u64) -> Self {
        Self::leaf(
            TokenKind::IntLit,
            Some(Literal::with_format(
                LiteralValue::Uint(value),
                format!("0x{value:X}"),
            )),
            ExprKind::IntLit,
            ExpressionType::Int,
        )
    }

    pub fn double_lit(value: f64) -> Self {
        Self::leaf(
            TokenKind::DoubleLit,
            Some(Literal::new(LiteralValue::Double(value))),
            ExprKind::DoubleLit,
            ExpressionType::Float,
        )
    }

    pub fn string_lit(value: impl Into<String>) -> Self {
        Self::leaf(
            TokenKind::StringLit,
            Some(Literal::from(value.into())),
            ExprKind::StringLit,
            ExpressionType::String,
        )
    }

    pub fn regexp(pattern: impl Into<String>, suffix_mods: &str) -> Self {
        let pattern = pattern.into();
        let spelled = format!("/{pattern}/{suffix_mods}");
        Self::leaf(
            TokenKind::Regexp,
            Some(Literal::with_format(LiteralValue::String(pattern), spelled)),
            ExprKind::Regexp,
            ExpressionType::Regexp,
        )
    }

    // ── References and keywords ────────────────────────────────────────

    pub fn string_ref(id: &str) -> Self {
        Self::leaf(
            TokenKind::StringId,
            Some(Literal::from(with_sigil('$', id))),
            |it| ExprKind::StringRef { id: it },
            ExpressionType::Bool,
        )
    }

    pub fn string_count(id: &str) -> Self {
        Self::leaf(
            TokenKind::StringCount,
            Some(Literal::from(with_sigil('#', id))),
            |it| ExprKind::StringCount { id: it },
            ExpressionType::Int,
        )
    }

    pub fn string_offset(id: &str) -> Self {
        Self::leaf(
            TokenKind::StringOffset,
            Some(Literal::from(with_sigil('@', id))),
            |it| ExprKind::StringOffset { id: it, index: None },
            ExpressionType::Int,
        )
    }

    pub fn string_length(id: &str) -> Self {
        Self::leaf(
            TokenKind::StringLength,
            Some(Literal::from(with_sigil('!', id))),
            |it| ExprKind::StringLength { id: it, index: None },
            ExpressionType::Int,
        )
    }

    pub fn id(name: &str) -> Self {
        let symbol = yar_common::Symbol::value(name);
        Self::leaf(
            TokenKind::Ident,
            Some(Literal::from(name)),
            |it| ExprKind::Id { symbol, name: it },
            ExpressionType::Object,
        )
    }

    pub fn filesize() -> Self {
        Self::nullary(TokenKind::FilesizeKw, ExprKind::Filesize, ExpressionType::Int)
    }

    pub fn entrypoint() -> Self {
        Self::nullary(
            TokenKind::EntrypointKw,
            ExprKind::Entrypoint,
            ExpressionType::Int,
        )
    }

    pub fn all() -> Self {
        Self::nullary(TokenKind::AllKw, ExprKind::All, ExpressionType::Int)
    }

    pub fn any() -> Self {
        Self::nullary(TokenKind::AnyKw, ExprKind::Any, ExpressionType::Int)
    }

    // ── String position tests ──────────────────────────────────────────

    /// `$id at <offset>`
    pub fn string_at(id: &str, offset: ExprBuilder) -> Self {
        let mut this = Self::string_ref(id);
        let id_it = this.expr.first();
        let at_it = this.stream.emplace_back(TokenKind::AtKw, None);
        this.expr.close_end_spans(at_it);
        let offset = offset.merge_into(&mut this.stream);
        this.expr = Expression::new(
            ExprKind::StringAt {
                id: id_it,
                offset: Box::new(offset),
            },
            ExpressionType::Bool,
            next_uid(),
            id_it,
            TokenIt::END,
        );
        this
    }

    /// `$id in (<low> .. <high>)`
    pub fn string_in_range(id: &str, low: ExprBuilder, high: ExprBuilder) -> Self {
        let mut this = Self::string_ref(id);
        let id_it = this.expr.first();
        let in_it = this.stream.emplace_back(TokenKind::InKw, None);
        this.expr.close_end_spans(in_it);
        let lparen = this.stream.emplace_back(TokenKind::LParen, None);
        let low = low.merge_into(&mut this.stream);
        let dots = this.stream.emplace_back(TokenKind::DotDot, None);
        let mut low = low;
        low.close_end_spans(dots);
        let high = high.merge_into(&mut this.stream);
        let rparen = this.stream.emplace_back(TokenKind::RParen, None);
        let mut high = high;
        high.close_end_spans(rparen);
        let range = Expression::new(
            ExprKind::Range {
                low: Box::new(low),
                high: Box::new(high),
            },
            ExpressionType::Int,
            next_uid(),
            lparen,
            TokenIt::END,
        );
        this.expr = Expression::new(
            ExprKind::StringInRange {
                id: id_it,
                range: Box::new(range),
            },
            ExpressionType::Bool,
            next_uid(),
            id_it,
            TokenIt::END,
        );
        this
    }

    // ── Unary operators ────────────────────────────────────────────────

    fn prefix(
        operand: ExprBuilder,
        token: TokenKind,
        make: impl FnOnce(Box<Expression>) -> ExprKind,
        ty: ExpressionType,
    ) -> Self {
        let mut stream = operand.stream;
        let op_it = stream.emplace(operand.expr.first(), token, None);
        let expr = Expression::new(
            make(Box::new(operand.expr)),
            ty,
            next_uid(),
            op_it,
            TokenIt::END,
        );
        Self { expr, stream }
    }

    pub fn not(operand: ExprBuilder) -> Self {
        Self::prefix(operand, TokenKind::NotKw, ExprKind::Not, ExpressionType::Bool)
    }

    pub fn negate(operand: ExprBuilder) -> Self {
        let ty = operand.expr.ty();
        Self::prefix(operand, TokenKind::UnaryMinus, ExprKind::UnaryMinus, ty)
    }

    pub fn bitwise_not(operand: ExprBuilder) -> Self {
        Self::prefix(
            operand,
            TokenKind::BitNot,
            ExprKind::BitwiseNot,
            ExpressionType::Int,
        )
    }

    /// Explicit parentheses requested by the caller; never elided.
    pub fn paren(operand: ExprBuilder) -> Self {
        Self::paren_inner(operand, false)
    }

    fn paren_inner(operand: ExprBuilder, synthetic: bool) -> Self {
        let mut stream = operand.stream;
        let mut inner = operand.expr;
        let lparen = stream.emplace(inner.first(), TokenKind::LParen, None);
        let rparen = stream.emplace_back(TokenKind::RParen, None);
        inner.close_end_spans(rparen);
        let ty = inner.ty();
        let expr = Expression::new(
            ExprKind::Paren {
                inner: Box::new(inner),
                synthetic,
            },
            ty,
            next_uid(),
            lparen,
            TokenIt::END,
        );
        Self { expr, stream }
    }

    // ── Binary operators ───────────────────────────────────────────────

    /// Wrap in synthetic parens when the operand is itself binary; the
    /// formatter removes the ones precedence does not require.
    fn shielded(operand: ExprBuilder) -> ExprBuilder {
        if operand.expr.kind.binary().is_some() {
            Self::paren_inner(operand, true)
        } else {
            operand
        }
    }

    fn binary(
        self,
        rhs: ExprBuilder,
        token: TokenKind,
        make: impl FnOnce(BinaryOp) -> ExprKind,
        ty: Option<ExpressionType>,
    ) -> Self {
        let mut lhs = Self::shielded(self);
        let rhs = Self::shielded(rhs);
        let op_it = lhs.stream.emplace_back(token, None);
        lhs.expr.close_end_spans(op_it);
        let right = rhs.merge_into(&mut lhs.stream);
        let ty = ty.unwrap_or({
            if lhs.expr.ty() == ExpressionType::Float || right.ty() == ExpressionType::Float {
                ExpressionType::Float
            } else {
                ExpressionType::Int
            }
        });
        let first = lhs.expr.first();
        let expr = Expression::new(
            make(BinaryOp {
                left: Box::new(lhs.expr),
                right: Box::new(right),
            }),
            ty,
            next_uid(),
            first,
            TokenIt::END,
        );
        Self {
            expr,
            stream: lhs.stream,
        }
    }

    pub fn and(self, rhs: ExprBuilder) -> Self {
        self.binary(rhs, TokenKind::AndKw, ExprKind::And, Some(ExpressionType::Bool))
    }

    pub fn or(self, rhs: ExprBuilder) -> Self {
        self.binary(rhs, TokenKind::OrKw, ExprKind::Or, Some(ExpressionType::Bool))
    }

    pub fn lt(self, rhs: ExprBuilder) -> Self {
        self.binary(rhs, TokenKind::Lt, ExprKind::Lt, Some(ExpressionType::Bool))
    }

    pub fn gt(self, rhs: ExprBuilder) -> Self {
        self.binary(rhs, TokenKind::Gt, ExprKind::Gt, Some(ExpressionType::Bool))
    }

    pub fn le(self, rhs: ExprBuilder) -> Self {
        self.binary(rhs, TokenKind::Le, ExprKind::Le, Some(ExpressionType::Bool))
    }

    pub fn ge(self, rhs: ExprBuilder) -> Self {
        self.binary(rhs, TokenKind::Ge, ExprKind::Ge, Some(ExpressionType::Bool))
    }

    pub fn eq(self, rhs: ExprBuilder) -> Self {
        self.binary(rhs, TokenKind::Eq, ExprKind::Eq, Some(ExpressionType::Bool))
    }

    pub fn neq(self, rhs: ExprBuilder) -> Self {
        self.binary(rhs, TokenKind::Neq, ExprKind::Neq, Some(ExpressionType::Bool))
    }

    pub fn contains(self, rhs: ExprBuilder) -> Self {
        self.binary(
            rhs,
            TokenKind::ContainsKw,
            ExprKind::Contains,
            Some(ExpressionType::Bool),
        )
    }

    pub fn matches(self, rhs: ExprBuilder) -> Self {
        self.binary(
            rhs,
            TokenKind::MatchesKw,
            ExprKind::Matches,
            Some(ExpressionType::Bool),
        )
    }

    pub fn plus(self, rhs: ExprBuilder) -> Self {
        self.binary(rhs, TokenKind::Plus, ExprKind::Plus, None)
    }

    pub fn minus(self, rhs: ExprBuilder) -> Self {
        self.binary(rhs, TokenKind::Minus, ExprKind::Minus, None)
    }

    pub fn multiply(self, rhs: ExprBuilder) -> Self {
        self.binary(rhs, TokenKind::Star, ExprKind::Multiply, None)
    }

    pub fn divide(self, rhs: ExprBuilder) -> Self {
        self.binary(rhs, TokenKind::Backslash, ExprKind::Divide, None)
    }

    pub fn modulo(self, rhs: ExprBuilder) -> Self {
        self.binary(rhs, TokenKind::Percent, ExprKind::Modulo, Some(ExpressionType::Int))
    }

    pub fn bitwise_and(self, rhs: ExprBuilder) -> Self {
        self.binary(
            rhs,
            TokenKind::BitAnd,
            ExprKind::BitwiseAnd,
            Some(ExpressionType::Int),
        )
    }

    pub fn bitwise_or(self, rhs: ExprBuilder) -> Self {
        self.binary(
            rhs,
            TokenKind::BitOr,
            ExprKind::BitwiseOr,
            Some(ExpressionType::Int),
        )
    }

    pub fn bitwise_xor(self, rhs: ExprBuilder) -> Self {
        self.binary(
            rhs,
            TokenKind::BitXor,
            ExprKind::BitwiseXor,
            Some(ExpressionType::Int),
        )
    }

    pub fn shift_left(self, rhs: ExprBuilder) -> Self {
        self.binary(
            rhs,
            TokenKind::Shl,
            ExprKind::ShiftLeft,
            Some(ExpressionType::Int),
        )
    }

    pub fn shift_right(self, rhs: ExprBuilder) -> Self {
        self.binary(
            rhs,
            TokenKind::Shr,
            ExprKind::ShiftRight,
            Some(ExpressionType::Int),
        )
    }

    // ── Access and calls ───────────────────────────────────────────────

    /// `<self>.<name>`
    pub fn field(mut self, name: &str) -> Self {
        let dot = self.stream.emplace_back(TokenKind::Dot, None);
        self.expr.close_end_spans(dot);
        let field = self
            .stream
            .emplace_back(TokenKind::Ident, Literal::from(name));
        let first = self.expr.first();
        self.expr = Expression::new(
            ExprKind::StructAccess {
                base: Box::new(self.expr),
                field,
            },
            ExpressionType::Object,
            next_uid(),
            first,
            TokenIt::END,
        );
        self
    }

    /// `<self>[<index>]`
    pub fn index(mut self, index: ExprBuilder) -> Self {
        let lbracket = self.stream.emplace_back(TokenKind::LBracket, None);
        self.expr.close_end_spans(lbracket);
        let index = index.merge_into(&mut self.stream);
        let rbracket = self.stream.emplace_back(TokenKind::RBracket, None);
        let mut index = index;
        index.close_end_spans(rbracket);
        let first = self.expr.first();
        self.expr = Expression::new(
            ExprKind::ArrayAccess {
                base: Box::new(self.expr),
                index: Box::new(index),
            },
            ExpressionType::Undefined,
            next_uid(),
            first,
            TokenIt::END,
        );
        self
    }

    /// `<self>(<args>)`
    pub fn call(mut self, args: Vec<ExprBuilder>) -> Self {
        let lparen = self.stream.emplace_back(TokenKind::LParen, None);
        self.expr.close_end_spans(lparen);
        let mut built_args = Vec::with_capacity(args.len());
        let mut previous: Option<Expression> = None;
        for arg in args {
            if previous.is_some() {
                let comma = self.stream.emplace_back(TokenKind::Comma, None);
                if let Some(mut done) = previous.take() {
                    done.close_end_spans(comma);
                    built_args.push(done);
                }
            }
            previous = Some(arg.merge_into(&mut self.stream));
        }
        let rparen = self.stream.emplace_back(TokenKind::RParen, None);
        if let Some(mut done) = previous.take() {
            done.close_end_spans(rparen);
            built_args.push(done);
        }
        let first = self.expr.first();
        self.expr = Expression::new(
            ExprKind::FunctionCall {
                callee: Box::new(self.expr),
                args: built_args,
            },
            ExpressionType::Undefined,
            next_uid(),
            first,
            TokenIt::END,
        );
        self
    }

    /// `uint32(<arg>)` and friends.
    pub fn int_function(name: &str, arg: ExprBuilder) -> Self {
        let mut stream = TokenStream::new();
        let function = stream.emplace_back(TokenKind::IntegerFunction, Literal::from(name));
        stream.emplace_back(TokenKind::LParen, None);
        let arg = arg.merge_into(&mut stream);
        let rparen = stream.emplace_back(TokenKind::RParen, None);
        let mut arg = arg;
        arg.close_end_spans(rparen);
        let expr = Expression::new(
            ExprKind::IntFunction {
                function,
                arg: Box::new(arg),
            },
            ExpressionType::Int,
            next_uid(),
            function,
            TokenIt::END,
        );
        Self { expr, stream }
    }

    // ── Quantified expressions ─────────────────────────────────────────

    /// `<quantity> of them`
    pub fn of_them(quantity: ExprBuilder) -> Self {
        let mut this = quantity;
        let of_it = this.stream.emplace_back(TokenKind::OfKw, None);
        this.expr.close_end_spans(of_it);
        let them = this.stream.emplace_back(TokenKind::ThemKw, None);
        let set = Expression::new(
            ExprKind::Them,
            ExpressionType::Undefined,
            next_uid(),
            them,
            TokenIt::END,
        );
        let first = this.expr.first();
        this.expr = Expression::new(
            ExprKind::Of {
                quantity: Box::new(this.expr),
                set: Box::new(set),
            },
            ExpressionType::Bool,
            next_uid(),
            first,
            TokenIt::END,
        );
        this
    }

    /// `<quantity> of ($a, $b*, ...)`; a trailing `*` marks a wildcard.
    pub fn of_set(quantity: ExprBuilder, ids: &[&str]) -> Self {
        let mut this = quantity;
        let of_it = this.stream.emplace_back(TokenKind::OfKw, None);
        this.expr.close_end_spans(of_it);
        let lparen = this.stream.emplace_back(TokenKind::LParen, None);
        let mut elements = Vec::with_capacity(ids.len());
        let mut pending: Vec<TokenIt> = Vec::new();
        for (i, id) in ids.iter().enumerate() {
            if i > 0 {
                this.stream.emplace_back(TokenKind::Comma, None);
            }
            let wildcard = id.ends_with('*');
            let token = if wildcard {
                TokenKind::StringWildcard
            } else {
                TokenKind::StringId
            };
            let it = this
                .stream
                .emplace_back(token, Literal::from(with_sigil('$', id)));
            pending.push(it);
            let kind = if wildcard {
                ExprKind::StringWildcard { id: it }
            } else {
                ExprKind::StringRef { id: it }
            };
            elements.push(Expression::new(
                kind,
                ExpressionType::Bool,
                next_uid(),
                it,
                TokenIt::END,
            ));
        }
        this.stream.emplace_back(TokenKind::RParen, None);
        for (element, it) in elements.iter_mut().zip(pending) {
            let end = this.stream.successor(it);
            element.set_span(it, end);
        }
        let set = Expression::new(
            ExprKind::Set { elements },
            ExpressionType::Undefined,
            next_uid(),
            lparen,
            TokenIt::END,
        );
        let first = this.expr.first();
        this.expr = Expression::new(
            ExprKind::Of {
                quantity: Box::new(this.expr),
                set: Box::new(set),
            },
            ExpressionType::Bool,
            next_uid(),
            first,
            TokenIt::END,
        );
        this
    }

    /// `for <quantifier> <var> in (<low>..<high>) : ( <body> )`
    pub fn for_int(
        quantifier: ExprBuilder,
        var: &str,
        low: ExprBuilder,
        high: ExprBuilder,
        body: ExprBuilder,
    ) -> Self {
        let mut quantifier = quantifier;
        let for_it = quantifier
            .stream
            .emplace(quantifier.expr.first(), TokenKind::ForKw, None);
        let mut stream = quantifier.stream;
        let var_it = stream.emplace_back(TokenKind::Ident, Literal::from(var));
        quantifier.expr.close_end_spans(var_it);
        stream.emplace_back(TokenKind::InKw, None);
        let lparen = stream.emplace_back(TokenKind::LParen, None);
        let mut low = low.merge_into(&mut stream);
        let dots = stream.emplace_back(TokenKind::DotDot, None);
        low.close_end_spans(dots);
        let mut high = high.merge_into(&mut stream);
        let range_rparen = stream.emplace_back(TokenKind::RParen, None);
        high.close_end_spans(range_rparen);
        let colon = stream.emplace_back(TokenKind::Colon, None);
        let iterable = Expression::new(
            ExprKind::Range {
                low: Box::new(low),
                high: Box::new(high),
            },
            ExpressionType::Int,
            next_uid(),
            lparen,
            colon,
        );
        stream.emplace_back(TokenKind::LParen, None);
        let body = body.merge_into(&mut stream);
        let body_rparen = stream.emplace_back(TokenKind::RParen, None);
        let mut body = body;
        body.close_end_spans(body_rparen);
        let expr = Expression::new(
            ExprKind::ForInt {
                quantifier: Box::new(quantifier.expr),
                var: var_it,
                iterable: Box::new(iterable),
                body: Box::new(body),
            },
            ExpressionType::Bool,
            next_uid(),
            for_it,
            TokenIt::END,
        );
        Self { expr, stream }
    }

    // ── Finalization ───────────────────────────────────────────────────

    /// Merge this builder's tokens into `target`, returning the expression
    /// with its open span ends still pointing at the sentinel; the caller
    /// pins them once the next token lands.
    fn merge_into(self, target: &mut TokenStream) -> Expression {
        let mut donor = self.tokens_into();
        target.move_append(&mut donor.1);
        donor.0
    }

    fn tokens_into(self) -> (Expression, TokenStream) {
        (self.expr, self.stream)
    }

    /// Finish building.
    pub fn build(self) -> Built {
        Built {
            expr: self.expr,
            tokens: self.stream,
        }
    }
}

fn with_sigil(sigil: char, id: &str) -> String {
    if id.starts_with(sigil) {
        id.to_string()
    } else {
        format!("{sigil}{id}")
    }
}

// ── Hex strings ────────────────────────────────────────────────────────

/// Constructor for hex string bodies.
#[derive(Debug, Default)]
pub struct HexStringBuilder {
    units: Vec<HexUnit>,
}

impl HexStringBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    /// A fully known byte.
    pub fn add_byte(mut self, value: u8) -> Self {
        self.units.push(HexUnit::Byte { value, mask: 0xFF });
        self
    }

    /// `??`
    pub fn add_wildcard(mut self) -> Self {
        self.units.push(HexUnit::Byte {
            value: 0,
            mask: 0x00,
        });
        self
    }

    /// `?X` — only the low nibble is known.
    pub fn add_wildcard_high(mut self, low: u8) -> Self {
        self.units.push(HexUnit::Byte {
            value: low & 0x0F,
            mask: 0x0F,
        });
        self
    }

    /// `X?` — only the high nibble is known.
    pub fn add_wildcard_low(mut self, high: u8) -> Self {
        self.units.push(HexUnit::Byte {
            value: (high & 0x0F) << 4,
            mask: 0xF0,
        });
        self
    }

    /// `[n]`
    pub fn add_jump_fixed(mut self, n: u64) -> Self {
        self.units.push(HexUnit::Jump {
            low: n,
            high: Some(n),
        });
        self
    }

    /// `[low-high]`
    pub fn add_jump_range(mut self, low: u64, high: u64) -> Self {
        self.units.push(HexUnit::Jump {
            low,
            high: Some(high),
        });
        self
    }

    /// `[low-]`
    pub fn add_jump_varying_range(mut self, low: u64) -> Self {
        self.units.push(HexUnit::Jump { low, high: None });
        self
    }

    /// `[-]`
    pub fn add_jump_varying(mut self) -> Self {
        self.units.push(HexUnit::Jump { low: 0, high: None });
        self
    }

    /// `( a | b | ... )`
    pub fn add_alternatives(mut self, alternatives: Vec<HexStringBuilder>) -> Self {
        self.units.push(HexUnit::Alternation {
            alternatives: alternatives.into_iter().map(|b| b.units).collect(),
        });
        self
    }

    pub fn units(self) -> Vec<HexUnit> {
        self.units
    }
}

/// Render one hex unit's token text.
fn hex_byte_text(value: u8, mask: u8) -> String {
    let nibble = |v: u8, m: u8| -> char {
        if m == 0 {
            '?'
        } else {
            char::from_digit(v as u32, 16)
                .map(|c| c.to_ascii_uppercase())
                .unwrap_or('0')
        }
    };
    format!(
        "{}{}",
        nibble(value >> 4, mask >> 4),
        nibble(value & 0x0F, mask & 0x0F)
    )
}

fn hex_jump_text(low: u64, high: Option<u64>) -> String {
    match high {
        Some(high) if high == low => format!("[{low}]"),
        Some(high) => format!("[{low}-{high}]"),
        None if low == 0 => "[-]".to_string(),
        None => format!("[{low}-]"),
    }
}

fn emit_hex_units(stream: &mut TokenStream, units: &[HexUnit]) {
    for unit in units {
        match unit {
            HexUnit::Byte { value, mask } => {
                stream.emplace_back(
                    TokenKind::HexByte,
                    Literal::from(hex_byte_text(*value, *mask)),
                );
            }
            HexUnit::Jump { low, high } => {
                stream.emplace_back(
                    TokenKind::HexJump,
                    Literal::from(hex_jump_text(*low, *high)),
                );
            }
            HexUnit::Alternation { alternatives } => {
                stream.emplace_back(TokenKind::HexAltStart, None);
                for (i, alternative) in alternatives.iter().enumerate() {
                    if i > 0 {
                        stream.emplace_back(TokenKind::HexAlt, None);
                    }
                    emit_hex_units(stream, alternative);
                }
                stream.emplace_back(TokenKind::HexAltEnd, None);
            }
        }
    }
}

// ── Rules ──────────────────────────────────────────────────────────────

enum StringSpec {
    Plain {
        text: String,
        modifiers: StringModifiers,
    },
    Hex {
        units: Vec<HexUnit>,
    },
    Regexp {
        pattern: String,
        suffix_mods: String,
        modifiers: StringModifiers,
    },
}

/// A finished rule together with the stream holding its tokens, ready for
/// [`YaraFile::add_rule`].
#[derive(Debug)]
pub struct BuiltRule {
    pub rule: Rule,
    pub tokens: TokenStream,
}

/// Fluent constructor for whole rules.
pub struct RuleBuilder {
    name: String,
    modifier: RuleModifier,
    tags: Vec<String>,
    metas: Vec<(String, Literal)>,
    strings: Vec<(String, StringSpec)>,
    condition: Option<Built>,
}

impl RuleBuilder {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            modifier: RuleModifier::None,
            tags: Vec::new(),
            metas: Vec::new(),
            strings: Vec::new(),
            condition: None,
        }
    }

    pub fn with_modifier(mut self, modifier: RuleModifier) -> Self {
        self.modifier = modifier;
        self
    }

    pub fn with_tag(mut self, tag: impl Into<String>) -> Self {
        self.tags.push(tag.into());
        self
    }

    pub fn with_meta(mut self, key: impl Into<String>, value: impl Into<Literal>) -> Self {
        self.metas.push((key.into(), value.into()));
        self
    }

    pub fn with_plain_string(
        mut self,
        id: impl Into<String>,
        text: impl Into<String>,
        modifiers: StringModifiers,
    ) -> Self {
        self.strings.push((
            with_sigil('$', &id.into()),
            StringSpec::Plain {
                text: text.into(),
                modifiers,
            },
        ));
        self
    }

    pub fn with_hex_string(mut self, id: impl Into<String>, hex: HexStringBuilder) -> Self {
        self.strings.push((
            with_sigil('$', &id.into()),
            StringSpec::Hex { units: hex.units() },
        ));
        self
    }

    pub fn with_regexp_string(
        mut self,
        id: impl Into<String>,
        pattern: impl Into<String>,
        suffix_mods: impl Into<String>,
        modifiers: StringModifiers,
    ) -> Self {
        self.strings.push((
            with_sigil('$', &id.into()),
            StringSpec::Regexp {
                pattern: pattern.into(),
                suffix_mods: suffix_mods.into(),
                modifiers,
            },
        ));
        self
    }

    pub fn with_condition(mut self, condition: ExprBuilder) -> Self {
        self.condition = Some(condition.build());
        self
    }

    /// Emit the rule's canonical tokens and hand back the rule plus its
    /// private stream.
    pub fn get(self) -> Result<BuiltRule> {
        let Some(condition) = self.condition else {
            return Err(Error::semantic(
                Location::default(),
                format!("rule {} has no condition", self.name),
            ));
        };

        let mut stream = TokenStream::new();
        let mut first: Option<TokenIt> = None;

        if self.modifier.is_global() {
            let it = stream.emplace_back(TokenKind::GlobalKw, None);
            first.get_or_insert(it);
        }
        if self.modifier.is_private() {
            let it = stream.emplace_back(TokenKind::PrivateKw, None);
            first.get_or_insert(it);
        }
        let rule_it = stream.emplace_back(TokenKind::RuleKw, None);
        first.get_or_insert(rule_it);
        let name_it = stream.emplace_back(TokenKind::Ident, Literal::from(self.name.as_str()));

        let mut tag_its = Vec::with_capacity(self.tags.len());
        if !self.tags.is_empty() {
            stream.emplace_back(TokenKind::Colon, None);
            for tag in &self.tags {
                tag_its.push(stream.emplace_back(TokenKind::Ident, Literal::from(tag.as_str())));
            }
        }
        stream.emplace_back(TokenKind::Newline, None);
        stream.emplace_back(TokenKind::LBrace, None);
        stream.emplace_back(TokenKind::Newline, None);

        let mut metas = Vec::with_capacity(self.metas.len());
        if !self.metas.is_empty() {
            stream.emplace_back(TokenKind::MetaKw, None);
            stream.emplace_back(TokenKind::Colon, None);
            stream.emplace_back(TokenKind::Newline, None);
            for (key, value) in &self.metas {
                let key_it = stream.emplace_back(TokenKind::Ident, Literal::from(key.as_str()));
                stream.emplace_back(TokenKind::Assign, None);
                emit_literal_token(&mut stream, value);
                stream.emplace_back(TokenKind::Newline, None);
                metas.push(Meta::new(key_it, value.clone()));
            }
        }

        let mut strings = Vec::with_capacity(self.strings.len());
        if !self.strings.is_empty() {
            stream.emplace_back(TokenKind::StringsKw, None);
            stream.emplace_back(TokenKind::Colon, None);
            stream.emplace_back(TokenKind::Newline, None);
            for (id, spec) in &self.strings {
                let string_first = stream
                    .emplace_back(TokenKind::StringId, Literal::from(id.as_str()));
                stream.emplace_back(TokenKind::Assign, None);
                let (value, modifiers) = match spec {
                    StringSpec::Plain { text, modifiers } => {
                        let value_it = stream
                            .emplace_back(TokenKind::StringLit, Literal::from(text.as_str()));
                        (StringValue::Plain { value: value_it }, *modifiers)
                    }
                    StringSpec::Hex { units } => {
                        stream.emplace_back(TokenKind::HexStart, None);
                        emit_hex_units(&mut stream, units);
                        stream.emplace_back(TokenKind::HexEnd, None);
                        (
                            StringValue::Hex {
                                units: units.clone(),
                            },
                            StringModifiers::empty(),
                        )
                    }
                    StringSpec::Regexp {
                        pattern,
                        suffix_mods,
                        modifiers,
                    } => {
                        let spelled = format!("/{pattern}/{suffix_mods}");
                        let value_it = stream.emplace_back(
                            TokenKind::Regexp,
                            Literal::with_format(
                                LiteralValue::String(pattern.clone()),
                                spelled,
                            ),
                        );
                        (StringValue::Regexp { value: value_it }, *modifiers)
                    }
                };
                emit_modifier_tokens(&mut stream, modifiers);
                let newline = stream.emplace_back(TokenKind::Newline, None);
                strings.push(YaraString::new(
                    string_first,
                    value,
                    modifiers,
                    string_first,
                    newline,
                ));
            }
        }

        stream.emplace_back(TokenKind::ConditionKw, None);
        stream.emplace_back(TokenKind::Colon, None);
        stream.emplace_back(TokenKind::Newline, None);
        let mut condition_tokens = condition.tokens;
        let mut condition_expr = condition.expr;
        stream.move_append(&mut condition_tokens);
        let newline = stream.emplace_back(TokenKind::Newline, None);
        condition_expr.close_end_spans(newline);
        stream.emplace_back(TokenKind::RBrace, None);
        let trailing = stream.emplace_back(TokenKind::Newline, None);

        let first = first.unwrap_or(rule_it);
        let rule = Rule::new(
            self.modifier,
            name_it,
            tag_its,
            metas,
            strings,
            condition_expr,
            Location::default(),
            None,
            first,
            trailing,
        );
        Ok(BuiltRule {
            rule,
            tokens: stream,
        })
    }
}

fn emit_literal_token(stream: &mut TokenStream, value: &Literal) {
    let kind = match value.value() {
        LiteralValue::Bool(true) => {
            stream.emplace_back(TokenKind::TrueKw, None);
            return;
        }
        LiteralValue::Bool(false) => {
            stream.emplace_back(TokenKind::FalseKw, None);
            return;
        }
        LiteralValue::Int(_) | LiteralValue::Uint(_) => TokenKind::IntLit,
        LiteralValue::Double(_) => TokenKind::DoubleLit,
        _ => TokenKind::StringLit,
    };
    stream.emplace_back(kind, value.clone());
}

fn emit_modifier_tokens(stream: &mut TokenStream, modifiers: StringModifiers) {
    let named = [
        (StringModifiers::ASCII, TokenKind::AsciiKw),
        (StringModifiers::WIDE, TokenKind::WideKw),
        (StringModifiers::NOCASE, TokenKind::NocaseKw),
        (StringModifiers::FULLWORD, TokenKind::FullwordKw),
        (StringModifiers::XOR, TokenKind::XorKw),
        (StringModifiers::BASE64, TokenKind::Base64Kw),
        (StringModifiers::BASE64_WIDE, TokenKind::Base64WideKw),
        (StringModifiers::PRIVATE, TokenKind::PrivateKw),
    ];
    for (flag, kind) in named {
        if modifiers.contains(flag) {
            stream.emplace_back(kind, None);
        }
    }
}

// ── Files ──────────────────────────────────────────────────────────────

/// Fluent constructor for whole files. Rule streams merge into the master
/// stream at finalization.
#[derive(Default)]
pub struct YaraFileBuilder {
    imports: Vec<String>,
    rules: Vec<RuleBuilder>,
}

impl YaraFileBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_module(mut self, name: impl Into<String>) -> Self {
        self.imports.push(name.into());
        self
    }

    pub fn with_rule(mut self, rule: RuleBuilder) -> Self {
        self.rules.push(rule);
        self
    }

    pub fn get(self) -> Result<YaraFile> {
        let mut stream = TokenStream::new();
        let mut imports = Vec::with_capacity(self.imports.len());
        for module in &self.imports {
            stream.emplace_back(TokenKind::ImportKw, None);
            let token =
                stream.emplace_back(TokenKind::StringLit, Literal::from(module.as_str()));
            stream.emplace_back(TokenKind::Newline, None);
            imports.push(Import::new(module.clone(), token));
        }
        if !self.imports.is_empty() {
            stream.emplace_back(TokenKind::Newline, None);
        }

        let count = self.rules.len();
        let mut rules = Vec::with_capacity(count);
        for (i, builder) in self.rules.into_iter().enumerate() {
            let BuiltRule { rule, mut tokens } = builder.get()?;
            stream.move_append(&mut tokens);
            if i + 1 < count {
                stream.emplace_back(TokenKind::Newline, None);
            }
            rules.push(rule);
        }

        Ok(YaraFile::new(stream, imports, rules))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn leaf_and_binary_text() {
        let built = ExprBuilder::int_lit(1)
            .plus(ExprBuilder::int_lit(2).multiply(ExprBuilder::int_lit(3)))
            .build();
        assert_eq!(built.text(), "1 + (2 * 3)");
    }

    #[test]
    fn synthetic_parens_mark_builder_wrapping() {
        let built = ExprBuilder::bool_lit(true)
            .and(ExprBuilder::string_ref("a").or(ExprBuilder::string_ref("b")))
            .build();
        let ExprKind::And(op) = &built.expr.kind else {
            panic!("expected And at the root");
        };
        assert!(matches!(
            op.right.kind,
            ExprKind::Paren { synthetic: true, .. }
        ));
        assert_eq!(built.text(), "true and ($a or $b)");
    }

    #[test]
    fn explicit_parens_are_not_synthetic() {
        let built =
            ExprBuilder::paren(ExprBuilder::filesize().lt(ExprBuilder::int_lit(100))).build();
        assert!(matches!(
            built.expr.kind,
            ExprKind::Paren {
                synthetic: false,
                ..
            }
        ));
        assert_eq!(built.text(), "(filesize < 100)");
    }

    #[test]
    fn of_them_text() {
        let built = ExprBuilder::of_them(ExprBuilder::any()).build();
        assert_eq!(built.text(), "any of them");
    }

    #[test]
    fn of_set_with_wildcards() {
        let built = ExprBuilder::of_set(ExprBuilder::all(), &["a", "b*"]).build();
        assert_eq!(built.text(), "all of ($a, $b*)");
    }

    #[test]
    fn string_in_range_text() {
        let built = ExprBuilder::string_in_range(
            "a",
            ExprBuilder::int_lit(0),
            ExprBuilder::filesize(),
        )
        .build();
        assert_eq!(built.text(), "$a in (0..filesize)");
    }

    #[test]
    fn int_function_call() {
        let built = ExprBuilder::int_function(
            "uint16be",
            ExprBuilder::entrypoint(),
        )
        .eq(ExprBuilder::hex_int_lit(0x5A4D))
        .build();
        assert_eq!(built.text(), "uint16be(entrypoint) == 0x5A4D");
    }

    #[test]
    fn struct_access_and_call() {
        let built = ExprBuilder::id("pe")
            .field("imports")
            .call(vec![ExprBuilder::string_lit("kernel32.dll")])
            .build();
        assert_eq!(built.text(), "pe.imports(\"kernel32.dll\")");
    }

    #[test]
    fn hex_builder_texts() {
        assert_eq!(hex_byte_text(0xAB, 0xFF), "AB");
        assert_eq!(hex_byte_text(0x0A, 0x0F), "?A");
        assert_eq!(hex_byte_text(0xA0, 0xF0), "A?");
        assert_eq!(hex_byte_text(0x00, 0x00), "??");
        assert_eq!(hex_jump_text(4, Some(4)), "[4]");
        assert_eq!(hex_jump_text(2, Some(4)), "[2-4]");
        assert_eq!(hex_jump_text(2, None), "[2-]");
        assert_eq!(hex_jump_text(0, None), "[-]");
    }

    #[test]
    fn rule_without_condition_is_rejected() {
        let err = RuleBuilder::new("incomplete").get().unwrap_err();
        assert_eq!(err.kind, yar_common::ErrorKind::Semantic);
    }

    #[test]
    fn built_rule_renders_canonically() {
        let rule = RuleBuilder::new("demo")
            .with_tag("test")
            .with_meta("author", Literal::from("yar"))
            .with_plain_string("a", "payload", StringModifiers::empty())
            .with_condition(ExprBuilder::string_ref("a"))
            .get()
            .unwrap();
        let text = rule.tokens.get_text(false, true);
        assert_eq!(
            text,
            "rule demo : test\n{\n    meta:\n        author = \"yar\"\n    strings:\n        $a = \"payload\"\n    condition:\n        $a\n}\n"
        );
    }
}
