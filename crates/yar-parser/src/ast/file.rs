//! The top-level container: one parsed (or built) YARA file.

use yar_common::{TokenIt, TokenKind, TokenStream};

use crate::ast::rule::Rule;

/// One `import "module"` statement.
#[derive(Debug, Clone)]
pub struct Import {
    name: String,
    token: TokenIt,
}

impl Import {
    pub fn new(name: impl Into<String>, token: TokenIt) -> Self {
        Self {
            name: name.into(),
            token,
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn token(&self) -> TokenIt {
        self.token
    }
}

/// A parsed YARA file: the master token stream plus imports and rules.
///
/// The file exclusively owns its stream; rules and expressions reference it
/// through token iterators. Rules pulled in through includes reference the
/// sub-stream hanging off their include-path token instead.
#[derive(Debug, Default)]
pub struct YaraFile {
    stream: TokenStream,
    imports: Vec<Import>,
    rules: Vec<Rule>,
}

impl YaraFile {
    pub fn new(stream: TokenStream, imports: Vec<Import>, rules: Vec<Rule>) -> Self {
        Self {
            stream,
            imports,
            rules,
        }
    }

    pub fn stream(&self) -> &TokenStream {
        &self.stream
    }

    pub fn stream_mut(&mut self) -> &mut TokenStream {
        &mut self.stream
    }

    /// Both the rules and the stream, mutably. Visitor-driven edits need
    /// the two halves at once.
    pub fn rules_and_stream_mut(&mut self) -> (&mut Vec<Rule>, &mut TokenStream) {
        (&mut self.rules, &mut self.stream)
    }

    pub fn imports(&self) -> &[Import] {
        &self.imports
    }

    pub fn rules(&self) -> &[Rule] {
        &self.rules
    }

    pub fn rules_mut(&mut self) -> &mut Vec<Rule> {
        &mut self.rules
    }

    pub fn rule_by_name(&self, name: &str) -> Option<&Rule> {
        self.rules.iter().find(|r| {
            self.stream_containing(r.name_token())
                .is_some_and(|s| r.name(s) == name)
        })
    }

    /// The stream a token iterator lives in: the master stream or one of
    /// the include sub-streams, searched recursively.
    pub fn stream_containing(&self, it: TokenIt) -> Option<&TokenStream> {
        stream_containing(&self.stream, it)
    }

    /// Append a rule whose tokens live in `donor`, merging the donor's
    /// tokens into the master stream. The rule's span stays valid because
    /// token ids survive the transfer.
    pub fn add_rule(&mut self, rule: Rule, donor: &mut TokenStream) {
        self.stream.move_append(donor);
        self.rules.push(rule);
    }

    /// Remove every rule matching the predicate, erasing its token span.
    ///
    /// Idempotent: a second call with the same predicate is a no-op.
    pub fn remove_rules(&mut self, mut predicate: impl FnMut(&TokenStream, &Rule) -> bool) {
        let stream = &mut self.stream;
        let mut kept = Vec::with_capacity(self.rules.len());
        for rule in self.rules.drain(..) {
            // Rules from include sub-streams are detached, not erased.
            if predicate(stream, &rule) {
                if stream.contains(rule.first()) {
                    stream.erase_range(rule.first(), rule.last());
                }
            } else {
                kept.push(rule);
            }
        }
        self.rules = kept;
    }

    /// Render the file. See [`TokenStream::get_text`].
    pub fn get_text(&self, with_includes: bool, align_comments: bool) -> String {
        self.stream.get_text(with_includes, align_comments)
    }

    /// Decompose into stream, imports and rules.
    pub fn into_parts(self) -> (TokenStream, Vec<Import>, Vec<Rule>) {
        (self.stream, self.imports, self.rules)
    }
}

fn stream_containing(stream: &TokenStream, it: TokenIt) -> Option<&TokenStream> {
    if stream.contains(it) {
        return Some(stream);
    }
    for cur in stream.iter() {
        let token = &stream[cur];
        if token.kind() == TokenKind::IncludePath {
            if let Some(sub) = token.sub_stream() {
                if let Some(found) = stream_containing(sub, it) {
                    return Some(found);
                }
            }
        }
    }
    None
}
