use std::rc::Rc;

/// The shape of a symbol exposed by an imported YARA module.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SymbolKind {
    /// A plain value (`pe.number_of_sections`).
    Value,
    /// A structure with named fields (`pe`, `pe.version_info`).
    Structure,
    /// An array indexed by integer (`pe.sections`).
    Array,
    /// A dictionary indexed by string (`pe.version_info["key"]`).
    Dictionary,
    /// A callable (`pe.imports(...)`).
    Function,
}

/// A named symbol referenced from a condition.
///
/// Module contents are opaque to this library; a `Symbol` records only the
/// name and shape the parser needs to build identifier expressions.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Symbol {
    name: String,
    kind: SymbolKind,
}

impl Symbol {
    pub fn new(name: impl Into<String>, kind: SymbolKind) -> Self {
        Self {
            name: name.into(),
            kind,
        }
    }

    /// A plain value symbol, the default for bare identifiers.
    pub fn value(name: impl Into<String>) -> Rc<Self> {
        Rc::new(Self::new(name, SymbolKind::Value))
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn kind(&self) -> SymbolKind {
        self.kind
    }
}

/// Lookup interface for imported-module symbol tables.
///
/// Callers that evaluate or validate conditions against real modules supply
/// an implementation; the parser itself only needs `lookup` to resolve the
/// root of a dotted path.
pub trait SymbolTable {
    fn lookup(&self, name: &str) -> Option<Rc<Symbol>>;
}

/// A plain in-memory symbol table.
#[derive(Debug, Default)]
pub struct StaticSymbolTable {
    symbols: rustc_hash::FxHashMap<String, Rc<Symbol>>,
}

impl StaticSymbolTable {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, symbol: Rc<Symbol>) {
        self.symbols.insert(symbol.name().to_string(), symbol);
    }
}

impl SymbolTable for StaticSymbolTable {
    fn lookup(&self, name: &str) -> Option<Rc<Symbol>> {
        self.symbols.get(name).cloned()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn value_symbol_defaults() {
        let sym = Symbol::value("filesize_limit");
        assert_eq!(sym.name(), "filesize_limit");
        assert_eq!(sym.kind(), SymbolKind::Value);
    }

    #[test]
    fn static_table_round_trips_symbols() {
        let mut table = StaticSymbolTable::new();
        table.insert(Rc::new(Symbol::new("pe", SymbolKind::Structure)));
        let found = table.lookup("pe").unwrap();
        assert_eq!(found.kind(), SymbolKind::Structure);
        assert!(table.lookup("elf").is_none());
    }
}
