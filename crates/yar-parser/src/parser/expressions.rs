//! Pratt parser for condition expressions.
//!
//! Binding-power tables encode YARA's operator precedence; the loop parses
//! an atom or prefix expression, then folds postfix accesses and infix
//! operators while their binding power clears the current minimum.

use yar_common::{Result, Symbol, TokenIt, TokenKind};

use crate::ast::expr::{BinaryOp, ExprKind, Expression, ExpressionType};

use super::Parser;

// ── Binding power tables ───────────────────────────────────────────────

/// (left, right) binding powers for infix operators; left < right gives
/// left associativity.
fn infix_binding_power(kind: TokenKind) -> Option<(u8, u8)> {
    use TokenKind::*;
    let bp = match kind {
        OrKw => (1, 2),
        AndKw => (3, 4),
        Eq | Neq | Lt | Gt | Le | Ge | ContainsKw | MatchesKw => (7, 8),
        BitOr => (9, 10),
        BitXor => (11, 12),
        BitAnd => (13, 14),
        Shl | Shr => (15, 16),
        Plus | Minus => (17, 18),
        Star | Backslash | Percent => (19, 20),
        _ => return None,
    };
    Some(bp)
}

/// `not` binds looser than comparisons, tighter than `and`.
const NOT_BP: u8 = 5;
/// `x of y` sits at the same level as `not`.
const OF_BP: u8 = 5;
/// `$a at <offset>`: the offset is an arithmetic expression, never a
/// boolean or comparison one.
const AT_BP: u8 = 8;
/// Arithmetic prefix operators (`-`, `~`).
const PREFIX_BP: u8 = 21;

/// Parse a full condition expression.
pub(crate) fn parse_expression(p: &mut Parser<'_>) -> Result<Expression> {
    expr_bp(p, 0)
}

fn expr_bp(p: &mut Parser<'_>, min_bp: u8) -> Result<Expression> {
    let mut lhs = lhs(p)?;

    loop {
        let Some(kind) = p.peek_kind() else { break };

        // ── Postfix: field access, indexing, calls ──
        if kind == TokenKind::Dot {
            let first = lhs.first();
            p.advance();
            let field = p.expect(TokenKind::Ident)?;
            lhs = finish(
                p,
                ExprKind::StructAccess {
                    base: Box::new(lhs),
                    field,
                },
                ExpressionType::Object,
                first,
            );
            continue;
        }
        if kind == TokenKind::LBracket {
            let first = lhs.first();
            p.advance();
            let index = expr_bp(p, 0)?;
            p.expect(TokenKind::RBracket)?;
            lhs = finish(
                p,
                ExprKind::ArrayAccess {
                    base: Box::new(lhs),
                    index: Box::new(index),
                },
                ExpressionType::Undefined,
                first,
            );
            continue;
        }
        if kind == TokenKind::LParen
            && matches!(lhs.kind, ExprKind::Id { .. } | ExprKind::StructAccess { .. })
        {
            let first = lhs.first();
            p.advance();
            let mut args = Vec::new();
            if !p.at(TokenKind::RParen) {
                args.push(expr_bp(p, 0)?);
                while p.eat(TokenKind::Comma).is_some() {
                    args.push(expr_bp(p, 0)?);
                }
            }
            p.expect(TokenKind::RParen)?;
            lhs = finish(
                p,
                ExprKind::FunctionCall {
                    callee: Box::new(lhs),
                    args,
                },
                ExpressionType::Undefined,
                first,
            );
            continue;
        }

        // ── `<quantity> of <set>` ──
        if kind == TokenKind::OfKw {
            if OF_BP < min_bp {
                break;
            }
            let first = lhs.first();
            p.advance();
            let set = parse_string_set(p)?;
            lhs = finish(
                p,
                ExprKind::Of {
                    quantity: Box::new(lhs),
                    set: Box::new(set),
                },
                ExpressionType::Bool,
                first,
            );
            continue;
        }

        // ── Infix operators ──
        if let Some((l_bp, r_bp)) = infix_binding_power(kind) {
            if l_bp < min_bp {
                break;
            }
            p.advance();
            let rhs = expr_bp(p, r_bp)?;
            lhs = make_binary(p, kind, lhs, rhs);
            continue;
        }

        break;
    }

    Ok(lhs)
}

fn make_binary(p: &mut Parser<'_>, op: TokenKind, left: Expression, right: Expression) -> Expression {
    use TokenKind::*;
    let first = left.first();
    let arith_ty = if left.ty() == ExpressionType::Float || right.ty() == ExpressionType::Float {
        ExpressionType::Float
    } else {
        ExpressionType::Int
    };
    let pair = BinaryOp {
        left: Box::new(left),
        right: Box::new(right),
    };
    let (kind, ty) = match op {
        OrKw => (ExprKind::Or(pair), ExpressionType::Bool),
        AndKw => (ExprKind::And(pair), ExpressionType::Bool),
        Lt => (ExprKind::Lt(pair), ExpressionType::Bool),
        Gt => (ExprKind::Gt(pair), ExpressionType::Bool),
        Le => (ExprKind::Le(pair), ExpressionType::Bool),
        Ge => (ExprKind::Ge(pair), ExpressionType::Bool),
        Eq => (ExprKind::Eq(pair), ExpressionType::Bool),
        Neq => (ExprKind::Neq(pair), ExpressionType::Bool),
        ContainsKw => (ExprKind::Contains(pair), ExpressionType::Bool),
        MatchesKw => (ExprKind::Matches(pair), ExpressionType::Bool),
        Plus => (ExprKind::Plus(pair), arith_ty),
        Minus => (ExprKind::Minus(pair), arith_ty),
        Star => (ExprKind::Multiply(pair), arith_ty),
        Backslash => (ExprKind::Divide(pair), arith_ty),
        Percent => (ExprKind::Modulo(pair), ExpressionType::Int),
        BitXor => (ExprKind::BitwiseXor(pair), ExpressionType::Int),
        BitAnd => (ExprKind::BitwiseAnd(pair), ExpressionType::Int),
        BitOr => (ExprKind::BitwiseOr(pair), ExpressionType::Int),
        Shl => (ExprKind::ShiftLeft(pair), ExpressionType::Int),
        Shr => (ExprKind::ShiftRight(pair), ExpressionType::Int),
        other => unreachable!("{other:?} is not an infix operator"),
    };
    finish(p, kind, ty, first)
}

/// Parse an atom or prefix expression.
fn lhs(p: &mut Parser<'_>) -> Result<Expression> {
    let first = p.mark();
    let Some(kind) = p.peek_kind() else {
        return Err(p.err_here("expected expression"));
    };

    let expr = match kind {
        // ── Prefix operators ──
        TokenKind::NotKw => {
            p.advance();
            let operand = expr_bp(p, NOT_BP)?;
            finish(
                p,
                ExprKind::Not(Box::new(operand)),
                ExpressionType::Bool,
                first,
            )
        }
        TokenKind::Minus => {
            let it = p.advance();
            p.stream()
                .get_mut(it)
                .expect("just-consumed token is live")
                .set_kind(TokenKind::UnaryMinus);
            let operand = expr_bp(p, PREFIX_BP)?;
            let ty = operand.ty();
            finish(p, ExprKind::UnaryMinus(Box::new(operand)), ty, first)
        }
        TokenKind::BitNot => {
            p.advance();
            let operand = expr_bp(p, PREFIX_BP)?;
            finish(
                p,
                ExprKind::BitwiseNot(Box::new(operand)),
                ExpressionType::Int,
                first,
            )
        }

        // ── Literals ──
        TokenKind::TrueKw | TokenKind::FalseKw => {
            let it = p.advance();
            finish(p, ExprKind::BoolLit(it), ExpressionType::Bool, first)
        }
        TokenKind::IntLit => {
            let it = p.advance();
            finish(p, ExprKind::IntLit(it), ExpressionType::Int, first)
        }
        TokenKind::DoubleLit => {
            let it = p.advance();
            finish(p, ExprKind::DoubleLit(it), ExpressionType::Float, first)
        }
        TokenKind::StringLit => {
            let it = p.advance();
            finish(p, ExprKind::StringLit(it), ExpressionType::String, first)
        }
        TokenKind::Regexp => {
            let it = p.advance();
            finish(p, ExprKind::Regexp(it), ExpressionType::Regexp, first)
        }

        // ── Keyword expressions ──
        TokenKind::FilesizeKw => {
            p.advance();
            finish(p, ExprKind::Filesize, ExpressionType::Int, first)
        }
        TokenKind::EntrypointKw => {
            p.advance();
            finish(p, ExprKind::Entrypoint, ExpressionType::Int, first)
        }
        TokenKind::AllKw => {
            p.advance();
            finish(p, ExprKind::All, ExpressionType::Int, first)
        }
        TokenKind::AnyKw => {
            p.advance();
            finish(p, ExprKind::Any, ExpressionType::Int, first)
        }
        TokenKind::ThemKw => {
            p.advance();
            finish(p, ExprKind::Them, ExpressionType::Undefined, first)
        }

        // ── Conversions and identifiers ──
        TokenKind::IntegerFunction => {
            let function = p.advance();
            p.expect(TokenKind::LParen)?;
            let arg = expr_bp(p, 0)?;
            p.expect(TokenKind::RParen)?;
            finish(
                p,
                ExprKind::IntFunction {
                    function,
                    arg: Box::new(arg),
                },
                ExpressionType::Int,
                first,
            )
        }
        TokenKind::Ident => {
            let it = p.advance();
            let name = p.token_text(it);
            finish(
                p,
                ExprKind::Id {
                    symbol: Symbol::value(name),
                    name: it,
                },
                ExpressionType::Object,
                first,
            )
        }

        // ── String references ──
        TokenKind::StringId => return parse_string_id(p, first),
        TokenKind::StringWildcard => {
            let id = p.advance();
            finish(p, ExprKind::StringWildcard { id }, ExpressionType::Bool, first)
        }
        TokenKind::StringCount => {
            let id = p.advance();
            finish(p, ExprKind::StringCount { id }, ExpressionType::Int, first)
        }
        TokenKind::StringOffset => {
            let id = p.advance();
            let index = parse_optional_index(p)?;
            finish(
                p,
                ExprKind::StringOffset { id, index },
                ExpressionType::Int,
                first,
            )
        }
        TokenKind::StringLength => {
            let id = p.advance();
            let index = parse_optional_index(p)?;
            finish(
                p,
                ExprKind::StringLength { id, index },
                ExpressionType::Int,
                first,
            )
        }

        // ── Groups and iteration ──
        TokenKind::LParen => return parse_paren_group(p),
        TokenKind::ForKw => return parse_for(p, first),

        _ => return Err(p.err_here("expected expression")),
    };
    Ok(expr)
}

/// `$a`, `$a at <offset>`, `$a in (<low>..<high>)`.
fn parse_string_id(p: &mut Parser<'_>, first: TokenIt) -> Result<Expression> {
    let id = p.advance();
    let expr = match p.peek_kind() {
        Some(TokenKind::AtKw) => {
            p.advance();
            let offset = expr_bp(p, AT_BP)?;
            finish(
                p,
                ExprKind::StringAt {
                    id,
                    offset: Box::new(offset),
                },
                ExpressionType::Bool,
                first,
            )
        }
        Some(TokenKind::InKw) => {
            p.advance();
            let range = parse_paren_group(p)?;
            if !matches!(range.kind, ExprKind::Range { .. }) {
                return Err(p.err_here("expected range after `in`"));
            }
            finish(
                p,
                ExprKind::StringInRange {
                    id,
                    range: Box::new(range),
                },
                ExpressionType::Bool,
                first,
            )
        }
        _ => finish(p, ExprKind::StringRef { id }, ExpressionType::Bool, first),
    };
    Ok(expr)
}

/// `[<index>]` after `@a` / `!a`.
fn parse_optional_index(p: &mut Parser<'_>) -> Result<Option<Box<Expression>>> {
    if p.eat(TokenKind::LBracket).is_none() {
        return Ok(None);
    }
    let index = expr_bp(p, 0)?;
    p.expect(TokenKind::RBracket)?;
    Ok(Some(Box::new(index)))
}

/// A parenthesized group: `(expr)`, `(low..high)` or `(a, b, c)`.
fn parse_paren_group(p: &mut Parser<'_>) -> Result<Expression> {
    let first = p.mark();
    p.expect(TokenKind::LParen)?;
    let head = expr_bp(p, 0)?;

    let expr = match p.peek_kind() {
        Some(TokenKind::DotDot) => {
            p.advance();
            let high = expr_bp(p, 0)?;
            p.expect(TokenKind::RParen)?;
            finish(
                p,
                ExprKind::Range {
                    low: Box::new(head),
                    high: Box::new(high),
                },
                ExpressionType::Int,
                first,
            )
        }
        Some(TokenKind::Comma) => {
            let mut elements = vec![head];
            while p.eat(TokenKind::Comma).is_some() {
                elements.push(expr_bp(p, 0)?);
            }
            p.expect(TokenKind::RParen)?;
            finish(
                p,
                ExprKind::Set { elements },
                ExpressionType::Undefined,
                first,
            )
        }
        _ => {
            p.expect(TokenKind::RParen)?;
            let ty = head.ty();
            finish(
                p,
                ExprKind::Paren {
                    inner: Box::new(head),
                    synthetic: false,
                },
                ty,
                first,
            )
        }
    };
    Ok(expr)
}

/// `for <quantifier> <var> in <iterable> : ( <body> )` and
/// `for <quantifier> of <set> : ( <body> )`.
fn parse_for(p: &mut Parser<'_>, first: TokenIt) -> Result<Expression> {
    p.advance(); // for
    let quantifier = expr_bp(p, OF_BP + 1)?;

    if p.eat(TokenKind::OfKw).is_some() {
        let set = parse_string_set(p)?;
        p.expect(TokenKind::Colon)?;
        p.expect(TokenKind::LParen)?;
        let body = expr_bp(p, 0)?;
        p.expect(TokenKind::RParen)?;
        return Ok(finish(
            p,
            ExprKind::ForString {
                quantifier: Box::new(quantifier),
                set: Box::new(set),
                body: Box::new(body),
            },
            ExpressionType::Bool,
            first,
        ));
    }

    let var = p.expect(TokenKind::Ident)?;
    p.expect(TokenKind::InKw)?;
    let iterable = parse_paren_group(p)?;
    if !matches!(iterable.kind, ExprKind::Range { .. } | ExprKind::Set { .. }) {
        return Err(p.err_here("expected range or set after `in`"));
    }
    p.expect(TokenKind::Colon)?;
    p.expect(TokenKind::LParen)?;
    let body = expr_bp(p, 0)?;
    p.expect(TokenKind::RParen)?;
    Ok(finish(
        p,
        ExprKind::ForInt {
            quantifier: Box::new(quantifier),
            var,
            iterable: Box::new(iterable),
            body: Box::new(body),
        },
        ExpressionType::Bool,
        first,
    ))
}

/// The set of an `of` expression: `them` or `($a, $b*, ...)`.
fn parse_string_set(p: &mut Parser<'_>) -> Result<Expression> {
    let first = p.mark();
    match p.peek_kind() {
        Some(TokenKind::ThemKw) => {
            p.advance();
            Ok(finish(p, ExprKind::Them, ExpressionType::Undefined, first))
        }
        Some(TokenKind::LParen) => {
            p.advance();
            let mut elements = Vec::new();
            loop {
                let element_first = p.mark();
                let element = match p.peek_kind() {
                    Some(TokenKind::StringId) => {
                        let id = p.advance();
                        finish(
                            p,
                            ExprKind::StringRef { id },
                            ExpressionType::Bool,
                            element_first,
                        )
                    }
                    Some(TokenKind::StringWildcard) => {
                        let id = p.advance();
                        finish(
                            p,
                            ExprKind::StringWildcard { id },
                            ExpressionType::Bool,
                            element_first,
                        )
                    }
                    _ => return Err(p.err_here("expected string identifier in set")),
                };
                elements.push(element);
                if p.eat(TokenKind::Comma).is_none() {
                    break;
                }
            }
            p.expect(TokenKind::RParen)?;
            Ok(finish(
                p,
                ExprKind::Set { elements },
                ExpressionType::Undefined,
                first,
            ))
        }
        _ => Err(p.err_here("expected `them` or a string set")),
    }
}

fn finish(p: &mut Parser<'_>, kind: ExprKind, ty: ExpressionType, first: TokenIt) -> Expression {
    Expression::new(kind, ty, p.next_uid(), first, p.span_end())
}
