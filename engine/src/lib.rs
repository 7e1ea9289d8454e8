//! Docweaver engine: the live, queryable section index.
//!
//! The engine turns a directory of AsciiDoc/Markdown files into a single
//! logical hierarchy of named sections and keeps that hierarchy coherent as
//! files change. It is synchronous throughout; the binary wires it into
//! async transports.
//!
//! Module map:
//! - [`parser`]: flat heading records from one file, includes resolved
//! - [`idpath`]: slug-based dotted identifiers and parent/child linking
//! - [`index`]: discovery, root classification, merge, incremental refresh
//! - [`query`]: read-only views over the index
//! - [`diff`]: line diffs between two versions of a section body
//! - [`editor`]: section-scoped file rewrites with atomic durability
//! - [`watcher`]: debounced filesystem watching

pub mod diff;
pub mod editor;
pub mod idpath;
pub mod index;
pub mod parser;
pub mod query;
pub mod watcher;

mod project;

pub use index::ProjectIndex;
pub use project::{Project, RefreshReport};
