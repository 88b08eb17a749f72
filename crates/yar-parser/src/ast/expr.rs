//! The condition expression AST.
//!
//! A closed sum type over every YARA condition form. Each node records the
//! half-open token span `[first, last)` of its text in the owning stream,
//! the advisory expression type assigned at parse time, and a per-file uid
//! usable as identity in maps and sets.

use std::rc::Rc;

use yar_common::{Symbol, TokenIt, TokenStream};

/// Advisory type tag computed during parsing.
///
/// Used by builders for coercions and by tooling for display; it does not
/// drive matching semantics.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExpressionType {
    Undefined,
    Bool,
    Int,
    String,
    Regexp,
    Object,
    Float,
}

/// Left and right operands of a binary expression.
#[derive(Debug, Clone)]
pub struct BinaryOp {
    pub left: Box<Expression>,
    pub right: Box<Expression>,
}

/// Every condition expression variant.
#[derive(Debug, Clone)]
pub enum ExprKind {
    // ── String references ──────────────────────────────────────────────
    /// `$a`
    StringRef { id: TokenIt },
    /// `$a*` in a string set.
    StringWildcard { id: TokenIt },
    /// `$a at <offset>`
    StringAt { id: TokenIt, offset: Box<Expression> },
    /// `$a in (<low> .. <high>)`
    StringInRange { id: TokenIt, range: Box<Expression> },
    /// `#a`
    StringCount { id: TokenIt },
    /// `@a` or `@a[<index>]`
    StringOffset {
        id: TokenIt,
        index: Option<Box<Expression>>,
    },
    /// `!a` or `!a[<index>]`
    StringLength {
        id: TokenIt,
        index: Option<Box<Expression>>,
    },

    // ── Unary operators ────────────────────────────────────────────────
    Not(Box<Expression>),
    UnaryMinus(Box<Expression>),
    BitwiseNot(Box<Expression>),
    /// Parenthesized expression. `synthetic` marks parens a builder added
    /// purely for precedence; the formatter may elide those.
    Paren {
        inner: Box<Expression>,
        synthetic: bool,
    },

    // ── Binary operators ───────────────────────────────────────────────
    And(BinaryOp),
    Or(BinaryOp),
    Lt(BinaryOp),
    Gt(BinaryOp),
    Le(BinaryOp),
    Ge(BinaryOp),
    Eq(BinaryOp),
    Neq(BinaryOp),
    Contains(BinaryOp),
    Matches(BinaryOp),
    Plus(BinaryOp),
    Minus(BinaryOp),
    Multiply(BinaryOp),
    Divide(BinaryOp),
    Modulo(BinaryOp),
    BitwiseXor(BinaryOp),
    BitwiseAnd(BinaryOp),
    BitwiseOr(BinaryOp),
    ShiftLeft(BinaryOp),
    ShiftRight(BinaryOp),

    // ── Iteration ──────────────────────────────────────────────────────
    /// `for <quantifier> <var> in <iterable> : ( <body> )`
    ForInt {
        quantifier: Box<Expression>,
        var: TokenIt,
        iterable: Box<Expression>,
        body: Box<Expression>,
    },
    /// `for <quantifier> of <set> : ( <body> )`
    ForString {
        quantifier: Box<Expression>,
        set: Box<Expression>,
        body: Box<Expression>,
    },
    /// `<quantity> of <set>`
    Of {
        quantity: Box<Expression>,
        set: Box<Expression>,
    },

    // ── Collections ────────────────────────────────────────────────────
    /// `($a, $b*, $c)` or `(1, 2, 3)`
    Set { elements: Vec<Expression> },
    /// `(<low> .. <high>)`
    Range {
        low: Box<Expression>,
        high: Box<Expression>,
    },

    // ── Identifiers and access ─────────────────────────────────────────
    Id { symbol: Rc<Symbol>, name: TokenIt },
    StructAccess {
        base: Box<Expression>,
        field: TokenIt,
    },
    ArrayAccess {
        base: Box<Expression>,
        index: Box<Expression>,
    },
    FunctionCall {
        callee: Box<Expression>,
        args: Vec<Expression>,
    },

    // ── Literals ───────────────────────────────────────────────────────
    BoolLit(TokenIt),
    StringLit(TokenIt),
    /// Integer literal; the token keeps the written radix.
    IntLit(TokenIt),
    DoubleLit(TokenIt),

    // ── Keyword expressions ────────────────────────────────────────────
    Filesize,
    Entrypoint,
    All,
    Any,
    Them,

    // ── Special ────────────────────────────────────────────────────────
    /// `uint16be(<arg>)` and friends.
    IntFunction {
        function: TokenIt,
        arg: Box<Expression>,
    },
    /// `/regexp/` used as an expression.
    Regexp(TokenIt),
}

impl ExprKind {
    /// The operands of a binary variant.
    pub fn binary(&self) -> Option<&BinaryOp> {
        use ExprKind::*;
        match self {
            And(op) | Or(op) | Lt(op) | Gt(op) | Le(op) | Ge(op) | Eq(op) | Neq(op)
            | Contains(op) | Matches(op) | Plus(op) | Minus(op) | Multiply(op) | Divide(op)
            | Modulo(op) | BitwiseXor(op) | BitwiseAnd(op) | BitwiseOr(op) | ShiftLeft(op)
            | ShiftRight(op) => Some(op),
            _ => None,
        }
    }

    pub fn binary_mut(&mut self) -> Option<&mut BinaryOp> {
        use ExprKind::*;
        match self {
            And(op) | Or(op) | Lt(op) | Gt(op) | Le(op) | Ge(op) | Eq(op) | Neq(op)
            | Contains(op) | Matches(op) | Plus(op) | Minus(op) | Multiply(op) | Divide(op)
            | Modulo(op) | BitwiseXor(op) | BitwiseAnd(op) | BitwiseOr(op) | ShiftLeft(op)
            | ShiftRight(op) => Some(op),
            _ => None,
        }
    }

    /// Consume a binary variant, yielding its operands.
    pub fn into_binary(self) -> Option<BinaryOp> {
        use ExprKind::*;
        match self {
            And(op) | Or(op) | Lt(op) | Gt(op) | Le(op) | Ge(op) | Eq(op) | Neq(op)
            | Contains(op) | Matches(op) | Plus(op) | Minus(op) | Multiply(op) | Divide(op)
            | Modulo(op) | BitwiseXor(op) | BitwiseAnd(op) | BitwiseOr(op) | ShiftLeft(op)
            | ShiftRight(op) => Some(op),
            _ => None,
        }
    }

    /// Short name of the variant, used by tree dumps and tests.
    pub fn name(&self) -> &'static str {
        use ExprKind::*;
        match self {
            StringRef { .. } => "StringRef",
            StringWildcard { .. } => "StringWildcard",
            StringAt { .. } => "StringAt",
            StringInRange { .. } => "StringInRange",
            StringCount { .. } => "StringCount",
            StringOffset { .. } => "StringOffset",
            StringLength { .. } => "StringLength",
            Not(_) => "Not",
            UnaryMinus(_) => "UnaryMinus",
            BitwiseNot(_) => "BitwiseNot",
            Paren { .. } => "Paren",
            And(_) => "And",
            Or(_) => "Or",
            Lt(_) => "Lt",
            Gt(_) => "Gt",
            Le(_) => "Le",
            Ge(_) => "Ge",
            Eq(_) => "Eq",
            Neq(_) => "Neq",
            Contains(_) => "Contains",
            Matches(_) => "Matches",
            Plus(_) => "Plus",
            Minus(_) => "Minus",
            Multiply(_) => "Multiply",
            Divide(_) => "Divide",
            Modulo(_) => "Modulo",
            BitwiseXor(_) => "BitwiseXor",
            BitwiseAnd(_) => "BitwiseAnd",
            BitwiseOr(_) => "BitwiseOr",
            ShiftLeft(_) => "ShiftLeft",
            ShiftRight(_) => "ShiftRight",
            ForInt { .. } => "ForInt",
            ForString { .. } => "ForString",
            Of { .. } => "Of",
            Set { .. } => "Set",
            Range { .. } => "Range",
            Id { .. } => "Id",
            StructAccess { .. } => "StructAccess",
            ArrayAccess { .. } => "ArrayAccess",
            FunctionCall { .. } => "FunctionCall",
            BoolLit(_) => "BoolLit",
            StringLit(_) => "StringLit",
            IntLit(_) => "IntLit",
            DoubleLit(_) => "DoubleLit",
            Filesize => "Filesize",
            Entrypoint => "Entrypoint",
            All => "All",
            Any => "Any",
            Them => "Them",
            IntFunction { .. } => "IntFunction",
            Regexp(_) => "Regexp",
        }
    }
}

/// One node of the condition AST.
#[derive(Debug, Clone)]
pub struct Expression {
    pub kind: ExprKind,
    ty: ExpressionType,
    uid: u64,
    first: TokenIt,
    last: TokenIt,
}

impl Expression {
    pub fn new(
        kind: ExprKind,
        ty: ExpressionType,
        uid: u64,
        first: TokenIt,
        last: TokenIt,
    ) -> Self {
        Self {
            kind,
            ty,
            uid,
            first,
            last,
        }
    }

    pub fn ty(&self) -> ExpressionType {
        self.ty
    }

    pub fn set_ty(&mut self, ty: ExpressionType) {
        self.ty = ty;
    }

    pub fn uid(&self) -> u64 {
        self.uid
    }

    /// First token of this node's span.
    pub fn first(&self) -> TokenIt {
        self.first
    }

    /// One past the last token of this node's span.
    pub fn last(&self) -> TokenIt {
        self.last
    }

    pub fn set_span(&mut self, first: TokenIt, last: TokenIt) {
        self.first = first;
        self.last = last;
    }

    /// Render this node's text from its span in `stream`.
    pub fn text(&self, stream: &TokenStream) -> String {
        stream.span_text(self.first, self.last)
    }

    /// The value of a `BoolLit` node, read from its token.
    pub fn bool_value(&self, stream: &TokenStream) -> Option<bool> {
        match &self.kind {
            ExprKind::BoolLit(it) => stream.get(*it).and_then(|t| {
                t.literal()
                    .and_then(|l| l.as_bool())
                    .or_else(|| Some(t.kind() == yar_common::TokenKind::TrueKw))
            }),
            _ => None,
        }
    }

    /// Immediate children in left-to-right textual order.
    pub fn children(&self) -> Vec<&Expression> {
        use ExprKind::*;
        match &self.kind {
            StringAt { offset, .. } => vec![offset],
            StringInRange { range, .. } => vec![range],
            StringOffset { index, .. } | StringLength { index, .. } => {
                index.iter().map(|e| e.as_ref()).collect()
            }
            Not(e) | UnaryMinus(e) | BitwiseNot(e) => vec![e],
            Paren { inner, .. } => vec![inner],
            _ if self.kind.binary().is_some() => {
                let op = self.kind.binary().unwrap();
                vec![&op.left, &op.right]
            }
            ForInt {
                quantifier,
                iterable,
                body,
                ..
            } => vec![quantifier, iterable, body],
            ForString {
                quantifier,
                set,
                body,
            } => vec![quantifier, set, body],
            Of { quantity, set } => vec![quantity, set],
            Set { elements } => elements.iter().collect(),
            Range { low, high } => vec![low, high],
            StructAccess { base, .. } => vec![base],
            ArrayAccess { base, index } => vec![base, index],
            FunctionCall { callee, args } => {
                let mut out: Vec<&Expression> = vec![callee];
                out.extend(args.iter());
                out
            }
            IntFunction { arg, .. } => vec![arg],
            _ => Vec::new(),
        }
    }

    /// Immediate children, mutably, in left-to-right textual order.
    pub fn children_mut(&mut self) -> Vec<&mut Expression> {
        use ExprKind::*;
        match &mut self.kind {
            StringAt { offset, .. } => vec![offset.as_mut()],
            StringInRange { range, .. } => vec![range.as_mut()],
            StringOffset { index, .. } | StringLength { index, .. } => {
                index.iter_mut().map(|e| e.as_mut()).collect()
            }
            Not(e) | UnaryMinus(e) | BitwiseNot(e) => vec![e.as_mut()],
            Paren { inner, .. } => vec![inner.as_mut()],
            ForInt {
                quantifier,
                iterable,
                body,
                ..
            } => vec![quantifier.as_mut(), iterable.as_mut(), body.as_mut()],
            ForString {
                quantifier,
                set,
                body,
            } => vec![quantifier.as_mut(), set.as_mut(), body.as_mut()],
            Of { quantity, set } => vec![quantity.as_mut(), set.as_mut()],
            Set { elements } => elements.iter_mut().collect(),
            Range { low, high } => vec![low.as_mut(), high.as_mut()],
            StructAccess { base, .. } => vec![base.as_mut()],
            ArrayAccess { base, index } => vec![base.as_mut(), index.as_mut()],
            FunctionCall { callee, args } => {
                let mut out: Vec<&mut Expression> = vec![callee.as_mut()];
                out.extend(args.iter_mut());
                out
            }
            IntFunction { arg, .. } => vec![arg.as_mut()],
            kind if kind.binary().is_some() => {
                let op = kind.binary_mut().expect("checked binary");
                vec![op.left.as_mut(), op.right.as_mut()]
            }
            _ => Vec::new(),
        }
    }

    /// Rewrite every span on the rightmost spine that still ends at the
    /// stream sentinel so it ends at `end` instead.
    ///
    /// Builders record the expression under construction as the tail of its
    /// private stream; once a token is appended after it (an operator, a
    /// newline) or the stream is spliced into a larger one, the open ends
    /// must be pinned to a real token.
    pub fn close_end_spans(&mut self, end: TokenIt) {
        if self.last.is_end() {
            self.last = end;
            for child in self.children_mut() {
                child.close_end_spans(end);
            }
        }
    }

    /// Rewrite every span on the rightmost spine whose exclusive end is
    /// `old` so it ends at `new` instead. Needed when the token `old`
    /// denotes is about to be (or was) erased.
    pub fn repin_end(&mut self, old: TokenIt, new: TokenIt) {
        if self.last == old {
            self.last = new;
            for child in self.children_mut() {
                child.repin_end(old, new);
            }
        }
    }

    /// Recompute this node's span endpoints from its (possibly replaced)
    /// children. Endpoints anchored on the node's own tokens stay put.
    pub fn resync_span(&mut self) {
        use ExprKind::*;
        let (mut first, mut last) = (self.first, self.last);
        match &self.kind {
            Not(e) | UnaryMinus(e) | BitwiseNot(e) => last = e.last(),
            StringAt { offset, .. } => last = offset.last(),
            StringInRange { range, .. } => last = range.last(),
            Of { quantity, set } => {
                first = quantity.first();
                last = set.last();
            }
            StructAccess { base, .. } | ArrayAccess { base, .. } => first = base.first(),
            FunctionCall { callee, .. } => first = callee.first(),
            _ => {
                if let Some(op) = self.kind.binary() {
                    first = op.left.first();
                    last = op.right.last();
                }
            }
        }
        self.set_span(first, last);
    }

    /// Binding strength of a binary variant, higher binds tighter.
    /// Non-binary variants have none.
    pub fn precedence(&self) -> Option<u8> {
        use ExprKind::*;
        let bp = match &self.kind {
            Or(_) => 1,
            And(_) => 3,
            Lt(_) | Gt(_) | Le(_) | Ge(_) | Eq(_) | Neq(_) | Contains(_) | Matches(_) => 7,
            BitwiseOr(_) => 9,
            BitwiseXor(_) => 11,
            BitwiseAnd(_) => 13,
            ShiftLeft(_) | ShiftRight(_) => 15,
            Plus(_) | Minus(_) => 17,
            Multiply(_) | Divide(_) | Modulo(_) => 19,
            _ => return None,
        };
        Some(bp)
    }

    /// Multi-line tree dump: variant names plus the text of value-bearing
    /// leaves. Two trees are structurally equal exactly when their dumps
    /// match, which is what the round-trip tests compare.
    pub fn tree_text(&self, stream: &TokenStream) -> String {
        let mut out = String::new();
        self.tree_text_into(stream, 0, &mut out);
        out
    }

    fn tree_text_into(&self, stream: &TokenStream, depth: usize, out: &mut String) {
        use ExprKind::*;
        out.push_str(&"  ".repeat(depth));
        out.push_str(self.kind.name());
        let leaf_text = |it: &TokenIt| stream.get(*it).map(|t| t.text()).unwrap_or_default();
        let label = match &self.kind {
            StringRef { id }
            | StringWildcard { id }
            | StringAt { id, .. }
            | StringInRange { id, .. }
            | StringCount { id }
            | StringOffset { id, .. }
            | StringLength { id, .. } => Some(leaf_text(id)),
            Id { symbol, .. } => Some(symbol.name().to_string()),
            StructAccess { field, .. } => Some(leaf_text(field)),
            ForInt { var, .. } => Some(leaf_text(var)),
            IntFunction { function, .. } => Some(leaf_text(function)),
            BoolLit(it) | StringLit(it) | DoubleLit(it) | Regexp(it) => Some(leaf_text(it)),
            // Canonical value so radix changes do not affect structure.
            IntLit(it) => stream
                .get(*it)
                .and_then(|t| t.literal())
                .map(|l| l.pure_text()),
            _ => None,
        };
        if let Some(label) = label {
            out.push(' ');
            out.push_str(&label);
        }
        out.push('\n');
        for child in self.children() {
            child.tree_text_into(stream, depth + 1, out);
        }
    }

    /// Structural equality: same variants, same literals, same topology.
    /// Spans and uids are ignored.
    pub fn structural_eq(
        &self,
        own_stream: &TokenStream,
        other: &Expression,
        other_stream: &TokenStream,
    ) -> bool {
        self.tree_text(own_stream) == other.tree_text(other_stream)
    }
}
