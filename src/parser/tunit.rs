// Translation unit: the parsed main file, its headers and the cursor API

use std::collections::{HashMap, HashSet};
use std::fmt;
use std::path::Path;
use tree_sitter::{Node, Point};

use super::declarations::{Declaration, DeclarationTable, NodeKey};
use super::{ChildVisit, CursorKind, Diagnostic, Severity, SourceFile};

/// Syntax errors reported per file before the rest are dropped
const MAX_DIAGNOSTICS_PER_FILE: usize = 50;

/// A parsed main file together with every header it pulled in
pub struct TranslationUnit {
    files: Vec<SourceFile>,
    /// (including file, include directive node id) -> included file
    includes: HashMap<(usize, usize), usize>,
    flags: Vec<String>,
    decls: DeclarationTable,
}

impl TranslationUnit {
    pub(crate) fn new(files: Vec<SourceFile>, includes: HashMap<(usize, usize), usize>, flags: Vec<String>) -> Self {
        let decls = DeclarationTable::build(&files);

        Self {
            files,
            includes,
            flags,
            decls,
        }
    }

    pub fn main_file(&self) -> &Path {
        &self.files[0].path
    }

    /// Flags the unit was parsed with
    pub fn flags(&self) -> &[String] {
        &self.flags
    }

    /// Every file of the unit, main file first
    pub fn files(&self) -> impl Iterator<Item = &Path> {
        self.files.iter().map(|f| f.path.as_path())
    }

    pub fn root(&self) -> Cursor<'_> {
        Cursor {
            tu: self,
            file: 0,
            node: self.files[0].tree.root_node(),
        }
    }

    /// Depth-first traversal starting below the root.
    ///
    /// The visitor receives each cursor with its parent; headers are visited
    /// where they are included, once per unit, with the root as parent.
    pub fn traverse<'a, A, F>(&'a self, acc: &mut A, mut visitor: F)
    where
        F: FnMut(Cursor<'a>, Cursor<'a>, &mut A) -> ChildVisit,
    {
        let root = self.root();
        let mut visited = HashSet::from([0usize]);
        let mut stack = Vec::new();
        self.push_children(&mut stack, root, root);

        while let Some(frame) = stack.pop() {
            match frame {
                Frame::Visit { cursor, parent } => {
                    // The header follows the directive and everything below it
                    if cursor.node.kind() == "preproc_include" {
                        if let Some(&included) = self.includes.get(&cursor.key()) {
                            stack.push(Frame::Header(included));
                        }
                    }

                    match visitor(cursor, parent, acc) {
                        ChildVisit::Break => return,
                        ChildVisit::Continue => {}
                        ChildVisit::Recurse => self.push_children(&mut stack, cursor, cursor),
                    }
                }
                Frame::Header(included) => {
                    if visited.insert(included) {
                        let header = Cursor {
                            tu: self,
                            file: included,
                            node: self.files[included].tree.root_node(),
                        };
                        self.push_children(&mut stack, header, root);
                    }
                }
            }
        }
    }

    /// Queue the named children of `node` so the first one is popped first
    fn push_children<'a>(&'a self, stack: &mut Vec<Frame<'a>>, node: Cursor<'a>, parent: Cursor<'a>) {
        let mut walker = node.node.walk();
        let children: Vec<Node<'a>> = node.node.named_children(&mut walker).collect();

        stack.extend(children.into_iter().rev().map(|child| Frame::Visit {
            cursor: Cursor {
                tu: self,
                file: node.file,
                node: child,
            },
            parent,
        }));
    }

    /// Cursor under a 1-based position of the main file, if it names something
    pub fn cursor_at(&self, line: u32, column: u32) -> Option<Cursor<'_>> {
        if line == 0 || column == 0 {
            return None;
        }

        let root = self.files[0].tree.root_node();
        // Also try the column before, for positions just past a name
        for column in [column, column - 1].into_iter().filter(|c| *c > 0) {
            let point = Point {
                row: (line - 1) as usize,
                column: (column - 1) as usize,
            };
            let Some(node) = root.descendant_for_point_range(point, point) else {
                continue;
            };
            let cursor = Cursor { tu: self, file: 0, node };
            if cursor.declaration().is_some() {
                return Some(cursor);
            }
        }

        None
    }

    /// Syntax diagnostics of every file in the unit
    pub fn diagnostics(&self) -> Vec<Diagnostic> {
        let mut diagnostics = Vec::new();

        for (index, file) in self.files.iter().enumerate() {
            let root = file.tree.root_node();
            if !root.has_error() {
                continue;
            }

            let mut broken = Vec::new();
            collect_syntax_errors(root, &mut broken);
            diagnostics.extend(
                broken
                    .into_iter()
                    .take(MAX_DIAGNOSTICS_PER_FILE)
                    .map(|node| self.syntax_diagnostic(index, node)),
            );
        }

        diagnostics
    }

    fn syntax_diagnostic(&self, file: usize, node: Node<'_>) -> Diagnostic {
        let source = &self.files[file];
        let position = node.start_position();

        let message = if node.is_missing() {
            format!("expected '{}'", node.kind())
        } else {
            let snippet: String = source
                .text(node)
                .lines()
                .next()
                .unwrap_or("")
                .trim()
                .chars()
                .take(32)
                .collect();
            if snippet.is_empty() {
                "syntax error".to_string()
            } else {
                format!("syntax error near '{}'", snippet)
            }
        };

        let children = enclosing_function(node, source)
            .map(|(name, name_node)| {
                let at = name_node.start_position();
                vec![Diagnostic {
                    file: source.path.clone(),
                    line: at.row as u32 + 1,
                    column: at.column as u32 + 1,
                    message: format!("in definition of '{}'", name),
                    severity: Severity::Note,
                    children: Vec::new(),
                }]
            })
            .unwrap_or_default();

        Diagnostic {
            file: source.path.clone(),
            line: position.row as u32 + 1,
            column: position.column as u32 + 1,
            message,
            severity: Severity::Error,
            children,
        }
    }

    fn cursor_for(&self, decl: &Declaration) -> Option<Cursor<'_>> {
        let node = self.files[decl.file]
            .tree
            .root_node()
            .descendant_for_byte_range(decl.start_byte, decl.end_byte)?;

        Some(Cursor {
            tu: self,
            file: decl.file,
            node,
        })
    }
}

fn collect_syntax_errors<'t>(root: Node<'t>, out: &mut Vec<Node<'t>>) {
    let mut stack = vec![root];

    while let Some(node) = stack.pop() {
        if node.is_error() || node.is_missing() {
            out.push(node);
            continue;
        }
        if !node.has_error() {
            continue;
        }

        let mut walker = node.walk();
        let children: Vec<Node<'t>> = node.children(&mut walker).collect();
        stack.extend(children.into_iter().rev());
    }
}

fn enclosing_function<'t>(node: Node<'t>, source: &'t SourceFile) -> Option<(&'t str, Node<'t>)> {
    let mut current = node.parent();
    while let Some(candidate) = current {
        if candidate.kind() == "function_definition" {
            let mut declarator = candidate.child_by_field_name("declarator")?;
            while let Some(inner) = declarator.child_by_field_name("declarator") {
                declarator = inner;
            }
            return Some((source.text(declarator), declarator));
        }
        current = candidate.parent();
    }
    None
}

/// Pending step of `TranslationUnit::traverse`
enum Frame<'a> {
    Visit { cursor: Cursor<'a>, parent: Cursor<'a> },
    Header(usize),
}

/// A node of a translation unit as seen by the indexer
#[derive(Clone, Copy)]
pub struct Cursor<'a> {
    tu: &'a TranslationUnit,
    file: usize,
    node: Node<'a>,
}

impl<'a> Cursor<'a> {
    fn key(&self) -> NodeKey {
        (self.file, self.node.id())
    }

    /// Declaration this cursor declares or refers to
    fn declaration(&self) -> Option<&'a Declaration> {
        let decls = &self.tu.decls;
        decls
            .declared_at(self.key())
            .or_else(|| decls.referenced_at(self.key()))
    }

    pub fn kind(&self) -> CursorKind {
        let decls = &self.tu.decls;
        if let Some(decl) = decls.declared_at(self.key()) {
            return decl.kind;
        }
        if let Some(decl) = decls.referenced_at(self.key()) {
            return match decl.kind {
                CursorKind::MacroDefinition => CursorKind::MacroInstantiation,
                kind => kind,
            };
        }
        if self.node.kind() == "translation_unit" {
            CursorKind::TranslationUnit
        } else {
            CursorKind::Unexposed
        }
    }

    pub fn spelling(&self) -> &'a str {
        self.tu.files[self.file].text(self.node)
    }

    pub fn line(&self) -> u32 {
        self.node.start_position().row as u32 + 1
    }

    pub fn column(&self) -> u32 {
        self.node.start_position().column as u32 + 1
    }

    pub fn file(&self) -> &'a Path {
        &self.tu.files[self.file].path
    }

    pub fn is_from_main_file(&self) -> bool {
        self.file == 0
    }

    /// USR of the declared or referenced entity
    pub fn usr(&self) -> Option<&'a str> {
        self.declaration()
            .map(|decl| decl.usr.as_str())
            .filter(|usr| !usr.is_empty())
    }

    pub fn is_definition(&self) -> bool {
        self.tu
            .decls
            .declared_at(self.key())
            .is_some_and(|decl| decl.is_definition)
    }

    /// The declaration this cursor resolves to; a declaration refers to itself
    pub fn referenced(&self) -> Option<Cursor<'a>> {
        let decl = self.declaration()?;
        self.tu.cursor_for(decl)
    }

    /// Defining declaration of the entity, when the unit contains it
    pub fn definition(&self) -> Option<Cursor<'a>> {
        let decl = self.declaration()?;
        let definition = self.tu.decls.definition_of(&decl.usr)?;
        self.tu.cursor_for(definition)
    }

    /// The full source line the cursor starts on
    pub fn source_line(&self) -> &'a str {
        self.tu.files[self.file].line(self.node.start_position().row)
    }
}

impl fmt::Debug for Cursor<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Cursor")
            .field("kind", &self.kind())
            .field("spelling", &self.spelling())
            .field("file", &self.file())
            .field("line", &self.line())
            .field("column", &self.column())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::parser::CxxParser;
    use std::fs;
    use tempfile::tempdir;

    fn parse(dir: &Path, name: &str) -> TranslationUnit {
        let mut parser = CxxParser::new().unwrap();
        parser.parse(&dir.join(name), &[]).unwrap()
    }

    fn collect(tunit: &TranslationUnit) -> Vec<(CursorKind, String, bool)> {
        let mut seen = Vec::new();
        tunit.traverse(&mut seen, |cursor, _parent, acc| {
            if cursor.kind() != CursorKind::Unexposed {
                acc.push((cursor.kind(), cursor.spelling().to_string(), cursor.is_from_main_file()));
            }
            ChildVisit::Recurse
        });
        seen
    }

    #[test]
    fn test_classifies_declarations_and_references() {
        let dir = tempdir().unwrap();
        let root = dir.path().canonicalize().unwrap();
        fs::write(
            root.join("shapes.cpp"),
            "#define SCALE 2\n\
             class Shape {\n\
             public:\n\
                 int area;\n\
                 int scaled() { return area * SCALE; }\n\
             };\n\
             typedef Shape Figure;\n",
        )
        .unwrap();

        let tunit = parse(&root, "shapes.cpp");
        let seen = collect(&tunit);

        assert!(seen.contains(&(CursorKind::MacroDefinition, "SCALE".into(), true)));
        assert!(seen.contains(&(CursorKind::Class, "Shape".into(), true)));
        assert!(seen.contains(&(CursorKind::Field, "area".into(), true)));
        assert!(seen.contains(&(CursorKind::Method, "scaled".into(), true)));
        assert!(seen.contains(&(CursorKind::MacroInstantiation, "SCALE".into(), true)));
        assert!(seen.contains(&(CursorKind::Typedef, "Figure".into(), true)));
        // `Shape` in the typedef refers back to the class
        assert_eq!(seen.iter().filter(|(k, s, _)| *k == CursorKind::Class && s == "Shape").count(), 2);
    }

    #[test]
    fn test_included_cursors_are_not_from_main_file() {
        let dir = tempdir().unwrap();
        let root = dir.path().canonicalize().unwrap();
        fs::write(root.join("api.h"), "int api(int x);\n").unwrap();
        fs::write(root.join("main.cpp"), "#include \"api.h\"\nint run() { return api(1); }\n").unwrap();

        let tunit = parse(&root, "main.cpp");
        let seen = collect(&tunit);

        assert!(seen.contains(&(CursorKind::Function, "api".into(), false)));
        assert!(seen.contains(&(CursorKind::Function, "api".into(), true)));

        let call = tunit.cursor_at(2, 20).unwrap();
        assert_eq!(call.spelling(), "api");
        assert_eq!(call.usr(), Some("c:@F@api"));
        assert!(!call.is_definition());
        let declared = call.referenced().unwrap();
        assert_eq!(declared.file(), root.join("api.h"));
        assert_eq!((declared.line(), declared.column()), (1, 5));
        assert!(call.definition().is_none());
    }

    #[test]
    fn test_definition_across_declaration() {
        let dir = tempdir().unwrap();
        let root = dir.path().canonicalize().unwrap();
        fs::write(
            root.join("impl.cpp"),
            "struct Counter { void bump(); int value; };\n\
             void Counter::bump() { value++; }\n\
             void tick(Counter& c) { c.bump(); }\n",
        )
        .unwrap();

        let tunit = parse(&root, "impl.cpp");
        let call = tunit.cursor_at(3, 27).unwrap();
        assert_eq!(call.kind(), CursorKind::Method);
        assert_eq!(call.usr(), Some("c:@S@Counter@F@bump"));

        let definition = call.definition().unwrap();
        assert_eq!((definition.line(), definition.column()), (2, 15));
        assert!(definition.is_definition());
        assert_eq!(definition.source_line(), "void Counter::bump() { value++; }");
    }

    #[test]
    fn test_break_stops_traversal() {
        let dir = tempdir().unwrap();
        let root = dir.path().canonicalize().unwrap();
        fs::write(root.join("a.cpp"), "int a();\nint b();\nint c();\n").unwrap();

        let tunit = parse(&root, "a.cpp");
        let mut visited = 0;
        tunit.traverse(&mut visited, |_cursor, _parent, count| {
            *count += 1;
            ChildVisit::Break
        });
        assert_eq!(visited, 1);
    }

    #[test]
    fn test_headers_are_visited_after_their_directive() {
        let dir = tempdir().unwrap();
        let root = dir.path().canonicalize().unwrap();
        fs::write(root.join("inner.h"), "int inside();\n").unwrap();
        fs::write(root.join("main.cpp"), "int before();\n#include \"inner.h\"\nint after();\n").unwrap();

        let tunit = parse(&root, "main.cpp");
        let mut functions = Vec::new();
        tunit.traverse(&mut functions, |cursor, _parent, acc| {
            if cursor.kind() == CursorKind::Function {
                acc.push((cursor.spelling().to_string(), cursor.is_from_main_file()));
            }
            ChildVisit::Recurse
        });

        assert_eq!(
            functions,
            vec![
                ("before".to_string(), true),
                ("inside".to_string(), false),
                ("after".to_string(), true),
            ]
        );
    }

    #[test]
    fn test_deep_nesting_on_a_small_stack() {
        let dir = tempdir().unwrap();
        let root = dir.path().canonicalize().unwrap();
        let mut source = String::from("int total() {\n  return 0");
        for _ in 0..20_000 {
            source.push_str(" + 1");
        }
        source.push_str(" + ;\n}\n");
        fs::write(root.join("deep.cpp"), source).unwrap();

        let (nodes, diagnostics) = std::thread::Builder::new()
            .stack_size(2 * 1024 * 1024)
            .spawn(move || {
                let tunit = parse(&root, "deep.cpp");
                let mut nodes = 0usize;
                tunit.traverse(&mut nodes, |_cursor, _parent, count| {
                    *count += 1;
                    ChildVisit::Recurse
                });
                (nodes, tunit.diagnostics().len())
            })
            .unwrap()
            .join()
            .unwrap();

        assert!(nodes > 20_000);
        assert!(diagnostics > 0);
    }

    #[test]
    fn test_syntax_errors_become_diagnostics() {
        let dir = tempdir().unwrap();
        let root = dir.path().canonicalize().unwrap();
        fs::write(root.join("ok.cpp"), "int fine() { return 1; }\n").unwrap();
        fs::write(root.join("bad.cpp"), "int broken() {\n  int x = ;\n}\n").unwrap();

        assert!(parse(&root, "ok.cpp").diagnostics().is_empty());

        let diagnostics = parse(&root, "bad.cpp").diagnostics();
        assert!(!diagnostics.is_empty());
        let first = &diagnostics[0];
        assert_eq!(first.severity, Severity::Error);
        assert_eq!(first.file, root.join("bad.cpp"));
        assert_eq!(first.line, 2);
    }

    #[test]
    fn test_cursor_at_outside_a_name() {
        let dir = tempdir().unwrap();
        let root = dir.path().canonicalize().unwrap();
        fs::write(root.join("a.cpp"), "int a() { return 0; }\n").unwrap();

        let tunit = parse(&root, "a.cpp");
        assert!(tunit.cursor_at(1, 12).is_none());
        assert!(tunit.cursor_at(0, 1).is_none());
        assert!(tunit.cursor_at(9, 1).is_none());
    }
}
