// C/C++ front end
//
// Parses a source file (and the local headers it includes) with tree-sitter
// into a `TranslationUnit`, and exposes the cursor-level contract the indexer
// relies on: traversal with a visitor, classification of a cursor into a
// `CursorKind`, USR assignment, reference and definition resolution, cursor
// lookup by position and syntax diagnostics.

pub mod declarations;
pub mod service;
pub mod tunit;

use anyhow::Context;
use serde::{Deserialize, Serialize};
use std::collections::{HashMap, HashSet};
use std::path::{Path, PathBuf};
use tracing::{debug, trace, warn};
use tree_sitter::{Node, Tree};

pub use service::ParserService;
pub use tunit::{Cursor, TranslationUnit};

/// Upper bound on headers pulled into one translation unit
const MAX_INCLUDED_FILES: usize = 64;

/// Classified kind of a cursor
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum CursorKind {
    TranslationUnit,
    Namespace,
    Class,
    Struct,
    Union,
    Enum,
    EnumConstant,
    Field,
    Function,
    Method,
    Typedef,
    UsingDeclaration,
    MacroDefinition,
    MacroInstantiation,
    Variable,
    Parameter,
    Unexposed,
}

impl CursorKind {
    pub fn is_type(&self) -> bool {
        matches!(
            self,
            CursorKind::Class
                | CursorKind::Struct
                | CursorKind::Union
                | CursorKind::Enum
                | CursorKind::Typedef
                | CursorKind::UsingDeclaration
        )
    }

    pub fn is_record(&self) -> bool {
        matches!(self, CursorKind::Class | CursorKind::Struct | CursorKind::Union)
    }
}

/// What a traversal visitor wants to happen next
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChildVisit {
    /// Stop the whole traversal
    Break,
    /// Skip this cursor's children, continue with its siblings
    Continue,
    /// Descend into this cursor's children
    Recurse,
}

/// Diagnostic severity, ordered from least to most severe
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Severity {
    Ignored,
    Note,
    Warning,
    Error,
    Fatal,
}

impl Severity {
    pub fn as_i64(&self) -> i64 {
        match self {
            Severity::Ignored => 0,
            Severity::Note => 1,
            Severity::Warning => 2,
            Severity::Error => 3,
            Severity::Fatal => 4,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Severity::Ignored => "ignored",
            Severity::Note => "note",
            Severity::Warning => "warning",
            Severity::Error => "error",
            Severity::Fatal => "fatal",
        }
    }

    pub fn from_i64(value: i64) -> Option<Self> {
        match value {
            0 => Some(Severity::Ignored),
            1 => Some(Severity::Note),
            2 => Some(Severity::Warning),
            3 => Some(Severity::Error),
            4 => Some(Severity::Fatal),
            _ => None,
        }
    }
}

/// A diagnostic attached to a parsed unit
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Diagnostic {
    pub file: PathBuf,
    pub line: u32,
    pub column: u32,
    pub message: String,
    pub severity: Severity,
    pub children: Vec<Diagnostic>,
}

/// One parsed file of a translation unit
pub struct SourceFile {
    pub path: PathBuf,
    pub source: String,
    pub tree: Tree,
    line_starts: Vec<usize>,
}

impl SourceFile {
    fn new(path: PathBuf, source: String, tree: Tree) -> Self {
        let line_starts = std::iter::once(0)
            .chain(source.match_indices('\n').map(|(i, _)| i + 1))
            .collect();

        Self {
            path,
            source,
            tree,
            line_starts,
        }
    }

    /// Text of a 0-based line without its terminator
    pub fn line(&self, row: usize) -> &str {
        let Some(&start) = self.line_starts.get(row) else {
            return "";
        };
        let end = self
            .line_starts
            .get(row + 1)
            .map(|next| next - 1)
            .unwrap_or(self.source.len());

        self.source[start..end].trim_end_matches('\r')
    }

    pub fn text(&self, node: Node<'_>) -> &str {
        node.utf8_text(self.source.as_bytes()).unwrap_or("")
    }
}

/// tree-sitter based C/C++ parser
pub struct CxxParser {
    parser: tree_sitter::Parser,
}

impl CxxParser {
    pub fn new() -> anyhow::Result<Self> {
        let mut parser = tree_sitter::Parser::new();
        parser
            .set_language(&tree_sitter_cpp::LANGUAGE.into())
            .context("Failed to load the C++ grammar")?;

        Ok(Self { parser })
    }

    /// Parse `path` and every header it reaches through resolvable includes.
    ///
    /// Returns `None` when the main file cannot be read or parsed at all.
    pub fn parse(&mut self, path: &Path, flags: &[String]) -> Option<TranslationUnit> {
        let main = match self.parse_source(path) {
            Some(main) => main,
            None => {
                warn!("Failed to parse {}", path.display());
                return None;
            }
        };

        let include_dirs = include_dirs(flags);
        let mut files = vec![main];
        let mut seen: HashMap<PathBuf, usize> = HashMap::new();
        seen.insert(path.to_path_buf(), 0);
        let mut includes = HashMap::new();

        let mut current = 0;
        while current < files.len() {
            let including_dir = files[current].path.parent().map(Path::to_path_buf);

            for directive in include_directives(&files[current]) {
                let Some(resolved) = resolve_include(&directive, including_dir.as_deref(), &include_dirs) else {
                    trace!("Unresolved include {} in {}", directive.target, files[current].path.display());
                    continue;
                };
                let resolved = resolved.canonicalize().unwrap_or(resolved);

                if let Some(&index) = seen.get(&resolved) {
                    includes.insert((current, directive.node_id), index);
                    continue;
                }

                if files.len() >= MAX_INCLUDED_FILES {
                    debug!("Include limit reached while parsing {}", path.display());
                    break;
                }

                if let Some(header) = self.parse_source(&resolved) {
                    let index = files.len();
                    files.push(header);
                    seen.insert(resolved, index);
                    includes.insert((current, directive.node_id), index);
                }
            }

            current += 1;
        }

        debug!("Parsed {} ({} files in unit)", path.display(), files.len());
        Some(TranslationUnit::new(files, includes, flags.to_vec()))
    }

    fn parse_source(&mut self, path: &Path) -> Option<SourceFile> {
        // Invalid UTF-8 sequences are replaced, not rejected
        let source = match std::fs::read(path) {
            Ok(bytes) => match String::from_utf8(bytes) {
                Ok(source) => source,
                Err(e) => {
                    debug!("{} is not valid UTF-8, decoding lossily", path.display());
                    String::from_utf8_lossy(e.as_bytes()).into_owned()
                }
            },
            Err(e) => {
                debug!("Cannot read {}: {}", path.display(), e);
                return None;
            }
        };

        let tree = self.parser.parse(&source, None)?;
        Some(SourceFile::new(path.to_path_buf(), source, tree))
    }
}

struct IncludeDirective {
    node_id: usize,
    target: String,
    quoted: bool,
}

/// Include directives of `file` in source order, including those nested in
/// conditional blocks, namespaces and `extern "C"` blocks
fn include_directives(file: &SourceFile) -> Vec<IncludeDirective> {
    let mut directives = Vec::new();
    let mut stack = vec![file.tree.root_node()];

    while let Some(node) = stack.pop() {
        let mut walker = node.walk();
        let mut nested = Vec::new();

        for child in node.named_children(&mut walker) {
            match child.kind() {
                "preproc_include" => {
                    let Some(path) = child.child_by_field_name("path") else {
                        continue;
                    };
                    let raw = file.text(path);
                    let quoted = path.kind() == "string_literal";
                    let target = raw.trim_matches(|c| c == '"' || c == '<' || c == '>').to_string();
                    if !target.is_empty() {
                        directives.push((child.start_byte(), IncludeDirective {
                            node_id: child.id(),
                            target,
                            quoted,
                        }));
                    }
                }
                kind if kind.starts_with("preproc_")
                    || kind == "namespace_definition"
                    || kind == "declaration_list"
                    || kind == "linkage_specification" =>
                {
                    nested.push(child);
                }
                _ => {}
            }
        }

        stack.extend(nested.into_iter().rev());
    }

    directives.sort_by_key(|(start, _)| *start);
    directives.into_iter().map(|(_, directive)| directive).collect()
}

fn resolve_include(directive: &IncludeDirective, including_dir: Option<&Path>, include_dirs: &[PathBuf]) -> Option<PathBuf> {
    let local = if directive.quoted { including_dir } else { None };

    local
        .into_iter()
        .chain(include_dirs.iter().map(PathBuf::as_path))
        .map(|dir| dir.join(&directive.target))
        .find(|candidate| candidate.is_file())
}

/// Header search directories named by `-I`, `-iquote` and `-isystem`
pub fn include_dirs(flags: &[String]) -> Vec<PathBuf> {
    let mut dirs = Vec::new();
    let mut seen = HashSet::new();
    let mut iter = flags.iter();

    while let Some(flag) = iter.next() {
        for prefix in ["-I", "-iquote", "-isystem"] {
            let dir = if flag == prefix {
                iter.next().cloned()
            } else if let Some(rest) = flag.strip_prefix(prefix) {
                Some(rest.to_string())
            } else {
                continue;
            };

            if let Some(dir) = dir.filter(|d| !d.is_empty()) {
                if seen.insert(dir.clone()) {
                    dirs.push(PathBuf::from(dir));
                }
            }
            break;
        }
    }

    dirs
}
