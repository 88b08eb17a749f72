//! Rules and the pieces they are made of: metas, strings, modifiers.

use std::fmt;

use yar_common::{Literal, Location, TokenIt, TokenStream};

use crate::ast::expr::Expression;

/// `global` / `private` marker on a rule.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum RuleModifier {
    #[default]
    None,
    Global,
    Private,
    GlobalPrivate,
}

impl RuleModifier {
    pub fn is_global(self) -> bool {
        matches!(self, Self::Global | Self::GlobalPrivate)
    }

    pub fn is_private(self) -> bool {
        matches!(self, Self::Private | Self::GlobalPrivate)
    }
}

/// One `key = value` entry of a `meta:` section.
#[derive(Debug, Clone)]
pub struct Meta {
    key: TokenIt,
    value: Literal,
}

impl Meta {
    pub fn new(key: TokenIt, value: Literal) -> Self {
        Self { key, value }
    }

    pub fn key_token(&self) -> TokenIt {
        self.key
    }

    pub fn key(&self, stream: &TokenStream) -> String {
        stream
            .get(self.key)
            .map(|t| t.text())
            .unwrap_or_default()
    }

    pub fn value(&self) -> &Literal {
        &self.value
    }
}

/// Bitset of string modifiers, rendered in canonical order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct StringModifiers(u32);

impl StringModifiers {
    pub const ASCII: StringModifiers = StringModifiers(1 << 0);
    pub const WIDE: StringModifiers = StringModifiers(1 << 1);
    pub const NOCASE: StringModifiers = StringModifiers(1 << 2);
    pub const FULLWORD: StringModifiers = StringModifiers(1 << 3);
    pub const XOR: StringModifiers = StringModifiers(1 << 4);
    pub const BASE64: StringModifiers = StringModifiers(1 << 5);
    pub const BASE64_WIDE: StringModifiers = StringModifiers(1 << 6);
    pub const PRIVATE: StringModifiers = StringModifiers(1 << 7);

    pub fn empty() -> Self {
        Self(0)
    }

    pub fn insert(&mut self, other: StringModifiers) {
        self.0 |= other.0;
    }

    pub fn contains(self, other: StringModifiers) -> bool {
        self.0 & other.0 == other.0
    }

    pub fn is_empty(self) -> bool {
        self.0 == 0
    }
}

impl fmt::Display for StringModifiers {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let named = [
            (Self::ASCII, "ascii"),
            (Self::WIDE, "wide"),
            (Self::NOCASE, "nocase"),
            (Self::FULLWORD, "fullword"),
            (Self::XOR, "xor"),
            (Self::BASE64, "base64"),
            (Self::BASE64_WIDE, "base64wide"),
            (Self::PRIVATE, "private"),
        ];
        let mut first = true;
        for (flag, name) in named {
            if self.contains(flag) {
                if !first {
                    f.write_str(" ")?;
                }
                f.write_str(name)?;
                first = false;
            }
        }
        Ok(())
    }
}

/// One atom of a hex string body.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum HexUnit {
    /// A byte pattern with per-nibble wildcards: `AB`, `?A`, `A?`, `??`.
    /// `value` holds the known nibbles, `mask` has 0xF for each known one.
    Byte { value: u8, mask: u8 },
    /// `[n]`, `[n-m]`, `[n-]`, `[-m]` or `[-]`. A missing low bound is 0;
    /// a missing high bound is unbounded.
    Jump { low: u64, high: Option<u64> },
    /// `( alt | alt | ... )`
    Alternation { alternatives: Vec<Vec<HexUnit>> },
}

/// The body of one string declaration.
#[derive(Debug, Clone)]
pub enum StringValue {
    /// `"text"` — the value token is a plain string literal.
    Plain { value: TokenIt },
    /// `{ 01 ?? [2-4] }` — parsed atoms plus the token span of the body.
    Hex { units: Vec<HexUnit> },
    /// `/regexp/i` — the value token is a regexp literal; suffix modifiers
    /// (`i`, `s`) live in its spelling.
    Regexp { value: TokenIt },
}

/// One `$id = value modifiers` declaration of a `strings:` section.
#[derive(Debug, Clone)]
pub struct YaraString {
    id: TokenIt,
    value: StringValue,
    modifiers: StringModifiers,
    first: TokenIt,
    last: TokenIt,
}

impl YaraString {
    pub fn new(
        id: TokenIt,
        value: StringValue,
        modifiers: StringModifiers,
        first: TokenIt,
        last: TokenIt,
    ) -> Self {
        Self {
            id,
            value,
            modifiers,
            first,
            last,
        }
    }

    pub fn id_token(&self) -> TokenIt {
        self.id
    }

    /// The `$name` identifier, including the sigil.
    pub fn id(&self, stream: &TokenStream) -> String {
        stream.get(self.id).map(|t| t.text()).unwrap_or_default()
    }

    pub fn value(&self) -> &StringValue {
        &self.value
    }

    pub fn modifiers(&self) -> StringModifiers {
        self.modifiers
    }

    pub fn is_plain(&self) -> bool {
        matches!(self.value, StringValue::Plain { .. })
    }

    pub fn is_hex(&self) -> bool {
        matches!(self.value, StringValue::Hex { .. })
    }

    pub fn is_regexp(&self) -> bool {
        matches!(self.value, StringValue::Regexp { .. })
    }

    pub fn first(&self) -> TokenIt {
        self.first
    }

    pub fn last(&self) -> TokenIt {
        self.last
    }

    pub fn text(&self, stream: &TokenStream) -> String {
        stream.span_text(self.first, self.last)
    }
}

/// One YARA rule, bound to its token span in the owning file's stream.
#[derive(Debug, Clone)]
pub struct Rule {
    modifier: RuleModifier,
    name: TokenIt,
    tags: Vec<TokenIt>,
    metas: Vec<Meta>,
    strings: Vec<YaraString>,
    condition: Expression,
    location: Location,
    file: Option<String>,
    first: TokenIt,
    last: TokenIt,
}

impl Rule {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        modifier: RuleModifier,
        name: TokenIt,
        tags: Vec<TokenIt>,
        metas: Vec<Meta>,
        strings: Vec<YaraString>,
        condition: Expression,
        location: Location,
        file: Option<String>,
        first: TokenIt,
        last: TokenIt,
    ) -> Self {
        Self {
            modifier,
            name,
            tags,
            metas,
            strings,
            condition,
            location,
            file,
            first,
            last,
        }
    }

    pub fn modifier(&self) -> RuleModifier {
        self.modifier
    }

    pub fn name_token(&self) -> TokenIt {
        self.name
    }

    pub fn name(&self, stream: &TokenStream) -> String {
        stream.get(self.name).map(|t| t.text()).unwrap_or_default()
    }

    pub fn tags(&self) -> &[TokenIt] {
        &self.tags
    }

    pub fn tag_names(&self, stream: &TokenStream) -> Vec<String> {
        self.tags
            .iter()
            .filter_map(|it| stream.get(*it).map(|t| t.text()))
            .collect()
    }

    pub fn metas(&self) -> &[Meta] {
        &self.metas
    }

    /// Look up a meta entry by key.
    pub fn meta(&self, stream: &TokenStream, key: &str) -> Option<&Meta> {
        self.metas.iter().find(|m| m.key(stream) == key)
    }

    pub fn strings(&self) -> &[YaraString] {
        &self.strings
    }

    /// Look up a string declaration by `$id`.
    pub fn string(&self, stream: &TokenStream, id: &str) -> Option<&YaraString> {
        self.strings.iter().find(|s| s.id(stream) == id)
    }

    pub fn condition(&self) -> &Expression {
        &self.condition
    }

    pub fn condition_mut(&mut self) -> &mut Expression {
        &mut self.condition
    }

    /// Swap in a new condition, returning the old one. Token splicing is
    /// the caller's responsibility; the visitor layer does both together.
    pub fn replace_condition(&mut self, condition: Expression) -> Expression {
        std::mem::replace(&mut self.condition, condition)
    }

    /// (line, column) of the `rule` keyword, with the defining file when
    /// the rule came from an include.
    pub fn location(&self) -> Location {
        self.location
    }

    pub fn file(&self) -> Option<&str> {
        self.file.as_deref()
    }

    pub fn first(&self) -> TokenIt {
        self.first
    }

    pub fn last(&self) -> TokenIt {
        self.last
    }

    pub fn text(&self, stream: &TokenStream) -> String {
        stream.span_text(self.first, self.last)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn modifiers_render_in_canonical_order() {
        let mut mods = StringModifiers::empty();
        mods.insert(StringModifiers::XOR);
        mods.insert(StringModifiers::ASCII);
        mods.insert(StringModifiers::WIDE);
        assert_eq!(mods.to_string(), "ascii wide xor");
    }

    #[test]
    fn modifiers_contains_and_empty() {
        let mut mods = StringModifiers::empty();
        assert!(mods.is_empty());
        mods.insert(StringModifiers::NOCASE);
        assert!(mods.contains(StringModifiers::NOCASE));
        assert!(!mods.contains(StringModifiers::WIDE));
    }

    #[test]
    fn rule_modifier_queries() {
        assert!(RuleModifier::GlobalPrivate.is_global());
        assert!(RuleModifier::GlobalPrivate.is_private());
        assert!(!RuleModifier::Global.is_private());
        assert!(!RuleModifier::None.is_global());
    }
}
