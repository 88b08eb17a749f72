//! Include resolution.
//!
//! The include graph lives here: a stack of files currently being parsed
//! (cycle detection) and, in guarded mode, the set of files already
//! expanded. Both are scoped to one parse invocation.

use std::fs;
use std::path::{Path, PathBuf};

use rustc_hash::FxHashSet;

use yar_common::{Error, Location, Result, TokenStream};
use yar_lexer::Lexer;

use crate::ast::file::{Import, YaraFile};
use crate::ast::rule::Rule;
use crate::{parser, ParserMode};

/// The parsed pieces of one included file, handed back to the including
/// parser. The stream becomes the include token's sub-stream; rules and
/// imports join the including file's.
pub(crate) struct IncludedFile {
    pub stream: TokenStream,
    pub imports: Vec<Import>,
    pub rules: Vec<Rule>,
}

pub(crate) struct IncludeContext {
    mode: ParserMode,
    /// Canonical paths of files currently being parsed, outermost first.
    stack: Vec<PathBuf>,
    /// Canonical paths already expanded (guarded mode only).
    visited: FxHashSet<PathBuf>,
}

impl IncludeContext {
    pub(crate) fn new(mode: ParserMode) -> Self {
        Self {
            mode,
            stack: Vec::new(),
            visited: FxHashSet::default(),
        }
    }

    /// Record the root file before parsing starts so self-includes and
    /// back-references to it are caught.
    pub(crate) fn seed(&mut self, path: &Path) {
        if let Ok(canonical) = path.canonicalize() {
            self.visited.insert(canonical.clone());
            self.stack.push(canonical);
        }
    }
}

/// Lex and parse one source text, expanding its includes through `ctx`.
pub(crate) fn parse_source(
    source: &str,
    path: Option<&Path>,
    ctx: &mut IncludeContext,
) -> Result<YaraFile> {
    let file_name = path.map(|p| p.display().to_string());
    let mut stream = Lexer::tokenize(source).map_err(|e| attach(e, &file_name))?;
    let base_dir = path.and_then(Path::parent).map(Path::to_path_buf);

    let (imports, rules) = {
        let mut resolver = |include_path: &str, location: Location| {
            resolve_include(ctx, base_dir.as_deref(), include_path, location)
        };
        parser::parse_stream(&mut stream, file_name.clone(), &mut resolver)
            .map_err(|e| attach(e, &file_name))?
    };

    Ok(YaraFile::new(stream, imports, rules))
}

fn attach(error: Error, file: &Option<String>) -> Error {
    match file {
        Some(name) => error.in_file(name),
        None => error,
    }
}

fn resolve_include(
    ctx: &mut IncludeContext,
    base_dir: Option<&Path>,
    include_path: &str,
    location: Location,
) -> Result<Option<IncludedFile>> {
    let joined = match base_dir {
        Some(dir) => dir.join(include_path),
        None => PathBuf::from(include_path),
    };
    let canonical = joined.canonicalize().map_err(|_| {
        Error::include(
            location,
            format!("cannot open include file \"{include_path}\""),
        )
    })?;

    if ctx.stack.contains(&canonical) {
        return match ctx.mode {
            ParserMode::Regular => Err(Error::include(
                location,
                format!("cyclic include of \"{include_path}\""),
            )),
            ParserMode::IncludeGuarded => Ok(None),
        };
    }
    if ctx.mode == ParserMode::IncludeGuarded && !ctx.visited.insert(canonical.clone()) {
        return Ok(None);
    }

    let source = fs::read_to_string(&canonical).map_err(|_| {
        Error::include(
            location,
            format!("cannot open include file \"{include_path}\""),
        )
    })?;

    ctx.stack.push(canonical);
    let parsed = parse_source(&source, Some(&joined), ctx);
    ctx.stack.pop();

    let (stream, imports, rules) = parsed?.into_parts();
    Ok(Some(IncludedFile {
        stream,
        imports,
        rules,
    }))
}
