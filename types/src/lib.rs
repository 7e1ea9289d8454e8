//! Core domain types for Docweaver.
//!
//! This crate contains pure domain types with no IO and no async: the
//! [`Section`] entity, the parse-warning taxonomy, the engine error taxonomy,
//! and the wire-level tool definition. Everything here can be used from any
//! layer of the application.

use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::path::Path;
use thiserror::Error;

/// Markup dialect of a source file, decided by its extension.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Dialect {
    Markdown,
    AsciiDoc,
}

/// Extensions the indexer discovers, lowercase.
pub const MARKUP_EXTENSIONS: &[&str] = &["adoc", "ad", "asciidoc", "md", "markdown"];

impl Dialect {
    /// Classify a path by extension (case-insensitive). `None` for
    /// non-markup files.
    #[must_use]
    pub fn from_path(path: &Path) -> Option<Self> {
        let ext = path.extension()?.to_str()?.to_ascii_lowercase();
        match ext.as_str() {
            "adoc" | "ad" | "asciidoc" => Some(Self::AsciiDoc),
            "md" | "markdown" => Some(Self::Markdown),
            _ => None,
        }
    }

    /// The character repeated to form a heading marker in this dialect.
    #[must_use]
    pub fn heading_char(self) -> char {
        match self {
            Self::Markdown => '#',
            Self::AsciiDoc => '=',
        }
    }
}

/// A single named section of the documentation tree.
///
/// Sections never hold direct references to each other; `parent_id` and
/// `children` are identifiers resolved through the index's id map.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Section {
    /// Dotted path of lowercase slug segments, unique within the project.
    pub id: String,
    /// Exact heading text.
    pub title: String,
    /// Heading depth, 1..=6.
    pub level: u8,
    /// Body text with at most one leading and one trailing blank line
    /// removed. Inner blank lines and code fences are preserved verbatim.
    pub content: String,
    /// Project-relative path of the file the section physically resides in.
    /// After include resolution this is the origin file, not the includer.
    pub source_file: String,
    /// 0-based index of the heading line within `source_file`.
    pub line_start: usize,
    /// 0-based index of the last content line (the heading line itself when
    /// the body is empty).
    pub line_end: usize,
    /// Identifier of the nearest ancestor section, absent at top level.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub parent_id: Option<String>,
    /// Child identifiers in source order.
    pub children: Vec<String>,
}

impl Section {
    /// Whitespace-separated word count of the body.
    #[must_use]
    pub fn word_count(&self) -> usize {
        self.content.split_whitespace().count()
    }

    #[must_use]
    pub fn has_content(&self) -> bool {
        !self.content.trim().is_empty()
    }
}

/// Kinds of recoverable problems recorded while building the index.
///
/// These are warnings, not errors: the build continues and the affected
/// directive is skipped.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum WarningKind {
    /// An `include::` target does not exist.
    MissingInclude,
    /// An `include::` target exists but could not be read.
    IncludeReadError,
    /// An `include::` target is already on the open-file stack.
    Cycle,
    /// Include nesting exceeded the configured depth cap.
    MaxDepth,
}

/// A warning accumulated during a parse, surfaced via structure validation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct IndexWarning {
    pub kind: WarningKind,
    /// Project-relative path of the file containing the offending directive.
    pub file: String,
    /// 0-based line of the directive within `file`.
    pub line: usize,
    /// The include target as written in the directive.
    pub target: String,
}

impl std::fmt::Display for IndexWarning {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let what = match self.kind {
            WarningKind::MissingInclude => "include target missing",
            WarningKind::IncludeReadError => "include target unreadable",
            WarningKind::Cycle => "include cycle",
            WarningKind::MaxDepth => "include depth limit exceeded",
        };
        write!(
            f,
            "{what}: {} (from {}:{})",
            self.target,
            self.file,
            self.line + 1
        )
    }
}

/// Error taxonomy for engine operations.
///
/// `kind()` yields the stable wire identifier surfaced in `error.data.kind`
/// on the tool protocol and in editor results.
#[derive(Debug, Error)]
pub enum EngineError {
    #[error("not found: {0}")]
    NotFound(String),
    #[error("invalid argument: {0}")]
    InvalidArgument(String),
    #[error("stale section {id}: {detail}")]
    Stale { id: String, detail: String },
    #[error("io error on {path}: {source}")]
    Io {
        path: String,
        #[source]
        source: std::io::Error,
    },
    #[error("parse failure in {file}: {detail}")]
    Parse { file: String, detail: String },
    #[error("identifier conflict: {0}")]
    Conflict(String),
}

impl EngineError {
    pub fn io(path: impl Into<String>, source: std::io::Error) -> Self {
        Self::Io {
            path: path.into(),
            source,
        }
    }

    #[must_use]
    pub fn kind(&self) -> &'static str {
        match self {
            Self::NotFound(_) => "not_found",
            Self::InvalidArgument(_) => "invalid_argument",
            Self::Stale { .. } => "stale",
            Self::Io { .. } => "io_error",
            Self::Parse { .. } => "parse_error",
            Self::Conflict(_) => "conflict",
        }
    }
}

/// Wire-level description of a callable tool, as listed by `tools/list`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ToolDefinition {
    pub name: String,
    pub description: String,
    #[serde(rename = "inputSchema")]
    pub input_schema: Value,
}

impl ToolDefinition {
    pub fn new(name: impl Into<String>, description: impl Into<String>, input_schema: Value) -> Self {
        Self {
            name: name.into(),
            description: description.into(),
            input_schema,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::PathBuf;

    #[test]
    fn dialect_from_extension_is_case_insensitive() {
        assert_eq!(
            Dialect::from_path(Path::new("doc/arch.ADOC")),
            Some(Dialect::AsciiDoc)
        );
        assert_eq!(
            Dialect::from_path(Path::new("README.md")),
            Some(Dialect::Markdown)
        );
        assert_eq!(
            Dialect::from_path(Path::new("notes.Markdown")),
            Some(Dialect::Markdown)
        );
        assert_eq!(Dialect::from_path(Path::new("main.rs")), None);
        assert_eq!(Dialect::from_path(&PathBuf::from("no_extension")), None);
    }

    #[test]
    fn section_word_count_splits_on_whitespace() {
        let section = Section {
            id: "intro".into(),
            title: "Intro".into(),
            level: 1,
            content: "one  two\nthree".into(),
            source_file: "main.adoc".into(),
            line_start: 0,
            line_end: 2,
            parent_id: None,
            children: vec![],
        };
        assert_eq!(section.word_count(), 3);
        assert!(section.has_content());
    }

    #[test]
    fn warning_kind_serializes_snake_case() {
        let warning = IndexWarning {
            kind: WarningKind::MissingInclude,
            file: "main.adoc".into(),
            line: 4,
            target: "_missing.adoc".into(),
        };
        let value = serde_json::to_value(&warning).unwrap();
        assert_eq!(value["kind"], "missing_include");
        assert_eq!(value["line"], 4);
    }

    #[test]
    fn engine_error_kinds_are_stable() {
        assert_eq!(EngineError::NotFound("x".into()).kind(), "not_found");
        assert_eq!(
            EngineError::Stale {
                id: "a.b".into(),
                detail: "heading changed".into()
            }
            .kind(),
            "stale"
        );
        let io = EngineError::io(
            "main.adoc",
            std::io::Error::new(std::io::ErrorKind::PermissionDenied, "denied"),
        );
        assert_eq!(io.kind(), "io_error");
    }

    #[test]
    fn tool_definition_uses_mcp_field_names() {
        let def = ToolDefinition::new("get_section", "Get one section", serde_json::json!({}));
        let value = serde_json::to_value(&def).unwrap();
        assert!(value.get("inputSchema").is_some());
        assert!(value.get("input_schema").is_none());
    }
}
