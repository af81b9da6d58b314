// Symbol and diagnostics storage

pub mod db;
pub mod schema;

use rusqlite::types::{FromSql, FromSqlError, FromSqlResult, ToSql, ToSqlOutput, ValueRef};
use serde::{Deserialize, Serialize};

pub use crate::parser::Severity;
pub use db::{DefinitionIter, StoreStats, SymbolStore};
pub use schema::SCHEMA_VERSION;

/// File name of the canonical store inside a project root
pub const INDEX_DB_NAME: &str = ".cxxd_index.db";

/// One occurrence of a symbol in a source file
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SymbolRecord {
    /// Path relative to the project root
    pub file: String,
    pub line: u32,
    pub column: u32,
    pub usr: String,
    /// Raw source line at the occurrence
    pub context: String,
    pub kind: SymbolKind,
    pub is_definition: bool,
}

/// Kinds that are recorded in the index
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum SymbolKind {
    Class,
    Struct,
    Enum,
    EnumConstant,
    Union,
    Field,
    Function,
    Method,
    Typedef,
    UsingDeclaration,
    MacroDefinition,
    MacroInstantiation,
}

impl SymbolKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            SymbolKind::Class => "class",
            SymbolKind::Struct => "struct",
            SymbolKind::Enum => "enum",
            SymbolKind::EnumConstant => "enum_constant",
            SymbolKind::Union => "union",
            SymbolKind::Field => "field",
            SymbolKind::Function => "function",
            SymbolKind::Method => "method",
            SymbolKind::Typedef => "typedef",
            SymbolKind::UsingDeclaration => "using_declaration",
            SymbolKind::MacroDefinition => "macro_definition",
            SymbolKind::MacroInstantiation => "macro_instantiation",
        }
    }

    pub fn from_str(s: &str) -> anyhow::Result<Self> {
        match s {
            "class" => Ok(SymbolKind::Class),
            "struct" => Ok(SymbolKind::Struct),
            "enum" => Ok(SymbolKind::Enum),
            "enum_constant" => Ok(SymbolKind::EnumConstant),
            "union" => Ok(SymbolKind::Union),
            "field" => Ok(SymbolKind::Field),
            "function" => Ok(SymbolKind::Function),
            "method" => Ok(SymbolKind::Method),
            "typedef" => Ok(SymbolKind::Typedef),
            "using_declaration" => Ok(SymbolKind::UsingDeclaration),
            "macro_definition" => Ok(SymbolKind::MacroDefinition),
            "macro_instantiation" => Ok(SymbolKind::MacroInstantiation),
            _ => anyhow::bail!("Unknown symbol kind: {}", s),
        }
    }
}

impl ToSql for SymbolKind {
    fn to_sql(&self) -> rusqlite::Result<ToSqlOutput<'_>> {
        Ok(ToSqlOutput::from(self.as_str()))
    }
}

impl FromSql for SymbolKind {
    fn column_result(value: ValueRef<'_>) -> FromSqlResult<Self> {
        SymbolKind::from_str(value.as_str()?).map_err(|e| FromSqlError::Other(e.into()))
    }
}

impl ToSql for Severity {
    fn to_sql(&self) -> rusqlite::Result<ToSqlOutput<'_>> {
        Ok(ToSqlOutput::from(self.as_i64()))
    }
}

impl FromSql for Severity {
    fn column_result(value: ValueRef<'_>) -> FromSqlResult<Self> {
        let raw = value.as_i64()?;
        Severity::from_i64(raw).ok_or(FromSqlError::OutOfRange(raw))
    }
}

/// A sub-note of a diagnostic, prior to insertion
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DiagnosticNote {
    pub file: String,
    pub line: u32,
    pub column: u32,
    pub message: String,
    pub severity: Severity,
}

/// A diagnostic with its notes, prior to insertion
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NewDiagnostic {
    pub file: String,
    pub line: u32,
    pub column: u32,
    pub message: String,
    pub severity: Severity,
    pub notes: Vec<DiagnosticNote>,
}

/// Stored diagnostic row
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DiagnosticRecord {
    pub id: i64,
    pub file: String,
    pub line: u32,
    pub column: u32,
    pub message: String,
    pub severity: Severity,
}

/// Stored diagnostic-detail row, owned by `parent_id`
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DiagnosticDetail {
    pub parent_id: i64,
    pub file: String,
    pub line: u32,
    pub column: u32,
    pub message: String,
    pub severity: Severity,
}

/// A definition site as streamed by `fetch_all_definitions`
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Definition {
    pub file: String,
    pub line: u32,
    pub column: u32,
    pub context: String,
}

/// Ordering of `fetch_all_diagnostics`
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SortOrder {
    /// Insertion order
    #[default]
    Unsorted,
    /// File, then line and column
    ByFile,
    /// Most severe first, then file and line
    BySeverity,
}

impl SortOrder {
    pub fn from_str(s: &str) -> anyhow::Result<Self> {
        match s {
            "none" | "unsorted" => Ok(SortOrder::Unsorted),
            "file" => Ok(SortOrder::ByFile),
            "severity" => Ok(SortOrder::BySeverity),
            _ => anyhow::bail!("Unknown diagnostics sort order: {}", s),
        }
    }

    fn order_by(&self) -> &'static str {
        match self {
            SortOrder::Unsorted => "id",
            SortOrder::ByFile => "file, line, column, id",
            SortOrder::BySeverity => "severity DESC, file, line, column, id",
        }
    }
}
