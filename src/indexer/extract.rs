// AST extraction: turns a parsed translation unit into symbol and
// diagnostic rows for the file being indexed

use std::path::Path;

use crate::parser::{ChildVisit, Cursor, CursorKind, Diagnostic, TranslationUnit};
use crate::store::{DiagnosticNote, NewDiagnostic, SymbolKind, SymbolRecord};

/// Map a cursor kind onto the recorded kinds; `None` means "not indexed"
pub fn indexed_kind(kind: CursorKind) -> Option<SymbolKind> {
    match kind {
        CursorKind::Class => Some(SymbolKind::Class),
        CursorKind::Struct => Some(SymbolKind::Struct),
        CursorKind::Enum => Some(SymbolKind::Enum),
        CursorKind::EnumConstant => Some(SymbolKind::EnumConstant),
        CursorKind::Union => Some(SymbolKind::Union),
        CursorKind::Field => Some(SymbolKind::Field),
        CursorKind::Function => Some(SymbolKind::Function),
        CursorKind::Method => Some(SymbolKind::Method),
        CursorKind::Typedef => Some(SymbolKind::Typedef),
        CursorKind::UsingDeclaration => Some(SymbolKind::UsingDeclaration),
        CursorKind::MacroDefinition => Some(SymbolKind::MacroDefinition),
        CursorKind::MacroInstantiation => Some(SymbolKind::MacroInstantiation),
        _ => None,
    }
}

/// Symbols collected during one traversal
#[derive(Debug)]
pub struct Extraction {
    /// Stored (root-relative) name of the file being indexed
    pub file: String,
    pub symbols: Vec<SymbolRecord>,
}

/// Traversal visitor: records allow-listed cursors of the main file and
/// skips subtrees that come from other files
pub fn visit(cursor: Cursor<'_>, _parent: Cursor<'_>, extraction: &mut Extraction) -> ChildVisit {
    if !cursor.is_from_main_file() {
        return ChildVisit::Continue;
    }

    if let Some(kind) = indexed_kind(cursor.kind()) {
        if let Some(usr) = cursor.usr() {
            extraction.symbols.push(SymbolRecord {
                file: extraction.file.clone(),
                line: cursor.line(),
                column: cursor.column(),
                usr: usr.to_string(),
                context: cursor.source_line().to_string(),
                kind,
                is_definition: cursor.is_definition(),
            });
        }
    }

    ChildVisit::Recurse
}

/// Symbol and diagnostic rows of `tunit`, with paths relative to `root`
pub fn extract(tunit: &TranslationUnit, root: &Path) -> (Vec<SymbolRecord>, Vec<NewDiagnostic>) {
    let mut extraction = Extraction {
        file: relative_path(root, tunit.main_file()),
        symbols: Vec::new(),
    };
    tunit.traverse(&mut extraction, visit);

    let diagnostics = tunit
        .diagnostics()
        .iter()
        .map(|diagnostic| convert_diagnostic(diagnostic, root))
        .collect();

    (extraction.symbols, diagnostics)
}

fn convert_diagnostic(diagnostic: &Diagnostic, root: &Path) -> NewDiagnostic {
    let mut notes = Vec::new();
    flatten_notes(&diagnostic.children, root, &mut notes);

    NewDiagnostic {
        file: relative_path(root, &diagnostic.file),
        line: diagnostic.line,
        column: diagnostic.column,
        message: diagnostic.message.clone(),
        severity: diagnostic.severity,
        notes,
    }
}

fn flatten_notes(children: &[Diagnostic], root: &Path, out: &mut Vec<DiagnosticNote>) {
    for child in children {
        out.push(DiagnosticNote {
            file: relative_path(root, &child.file),
            line: child.line,
            column: child.column,
            message: child.message.clone(),
            severity: child.severity,
        });
        flatten_notes(&child.children, root, out);
    }
}

/// Path as stored in the index: relative to `root` when inside it
pub fn relative_path(root: &Path, path: &Path) -> String {
    match path.strip_prefix(root) {
        Ok(relative) => relative
            .components()
            .map(|c| c.as_os_str().to_string_lossy())
            .collect::<Vec<_>>()
            .join("/"),
        Err(_) => path.to_string_lossy().into_owned(),
    }
}
