//! Read-only views over the project index.
//!
//! Every operation here works on an already-acquired shared borrow of the
//! index and never mutates it; the tool layer and the HTTP API serialize
//! the returned view structs directly.

use std::collections::BTreeMap;
use std::sync::OnceLock;

use regex::Regex;
use serde::Serialize;

use docweaver_types::{EngineError, IndexWarning, Section};

use crate::index::ProjectIndex;
use crate::parser::slash_path;

fn chapter_prefix_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"^(\d+)\.?\s").expect("valid regex"))
}

fn xref_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"<<([^>,]+?)(?:,[^>]*)?>>").expect("valid regex"))
}

/// One row of the flat table of contents.
#[derive(Debug, Clone, Serialize)]
pub struct StructureEntry {
    pub id: String,
    pub title: String,
    pub level: u8,
    pub children_count: usize,
}

/// Full view of one section.
#[derive(Debug, Clone, Serialize)]
pub struct SectionView {
    pub id: String,
    pub title: String,
    pub level: u8,
    pub content: String,
    pub source_file: String,
    pub line_start: usize,
    pub line_end: usize,
    pub children: Vec<String>,
}

/// Compact per-level listing row.
#[derive(Debug, Clone, Serialize)]
pub struct LevelEntry {
    pub id: String,
    pub title: String,
    pub content: String,
}

/// A section subtree nested under a root file.
#[derive(Debug, Clone, Serialize)]
pub struct SectionNode {
    pub id: String,
    pub title: String,
    pub level: u8,
    pub children_count: usize,
    pub children: Vec<SectionNode>,
}

/// One root file with its section forest.
#[derive(Debug, Clone, Serialize)]
pub struct FileStructure {
    pub path: String,
    pub filename: String,
    pub section_count: usize,
    pub sections: Vec<SectionNode>,
}

/// Entry of the arc42-style chapter listing.
#[derive(Debug, Clone, Serialize)]
pub struct ChapterEntry {
    pub id: String,
    pub title: String,
    pub level: u8,
    pub children_count: usize,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub chapter_number: Option<u32>,
}

/// One search result.
#[derive(Debug, Clone, Serialize)]
pub struct SearchHit {
    pub id: String,
    pub title: String,
    pub score: usize,
    pub snippet: String,
}

/// Metadata of one section.
#[derive(Debug, Clone, Serialize)]
pub struct SectionMetadata {
    pub id: String,
    pub title: String,
    pub level: u8,
    pub word_count: usize,
    pub children_count: usize,
    pub has_content: bool,
}

#[derive(Debug, Clone, Serialize)]
pub struct RootFileInfo {
    pub file: String,
    pub size: u64,
    /// Unix seconds of the last modification.
    pub last_modified: u64,
}

/// Project-wide metadata.
#[derive(Debug, Clone, Serialize)]
pub struct ProjectMetadata {
    pub project_root: String,
    pub total_sections: usize,
    pub total_words: usize,
    pub root_files: Vec<RootFileInfo>,
}

#[derive(Debug, Clone, Serialize)]
pub struct CrossReference {
    pub from: String,
    pub target: String,
    pub resolved: bool,
}

/// Include tree plus cross-reference report.
#[derive(Debug, Clone, Serialize)]
pub struct Dependencies {
    pub includes: BTreeMap<String, Vec<String>>,
    pub cross_references: Vec<CrossReference>,
    /// Must be empty whenever the index invariants hold; emitted so clients
    /// can verify.
    pub orphaned_sections: Vec<String>,
}

#[derive(Debug, Clone, Serialize)]
#[serde(untagged)]
pub enum ValidationWarning {
    Parse(IndexWarning),
    EmptySection { kind: &'static str, id: String },
}

/// Structure validation result.
#[derive(Debug, Clone, Serialize)]
pub struct Validation {
    pub valid: bool,
    pub issues: Vec<String>,
    pub warnings: Vec<ValidationWarning>,
}

fn chapter_number(title: &str) -> Option<u32> {
    chapter_prefix_re()
        .captures(title)
        .and_then(|captures| captures[1].parse().ok())
}

fn floor_char_boundary(text: &str, mut index: usize) -> usize {
    index = index.min(text.len());
    while index > 0 && !text.is_char_boundary(index) {
        index -= 1;
    }
    index
}

fn ceil_char_boundary(text: &str, mut index: usize) -> usize {
    index = index.min(text.len());
    while index < text.len() && !text.is_char_boundary(index) {
        index += 1;
    }
    index
}

impl ProjectIndex {
    /// Flat, depth-first table of contents, optionally pruned by level.
    #[must_use]
    pub fn get_structure(&self, max_depth: Option<u8>) -> Vec<StructureEntry> {
        self.sections_in_order()
            .filter(|section| max_depth.map_or(true, |depth| section.level <= depth))
            .map(|section| StructureEntry {
                id: section.id.clone(),
                title: section.title.clone(),
                level: section.level,
                children_count: section.children.len(),
            })
            .collect()
    }

    /// Full view of one section by identifier.
    pub fn get_section(&self, id: &str) -> Result<SectionView, EngineError> {
        let section = self
            .section(id)
            .ok_or_else(|| EngineError::NotFound(format!("section {id}")))?;
        Ok(SectionView {
            id: section.id.clone(),
            title: section.title.clone(),
            level: section.level,
            content: section.content.clone(),
            source_file: section.source_file.clone(),
            line_start: section.line_start,
            line_end: section.line_end,
            children: section.children.clone(),
        })
    }

    /// All sections at one level, source order. `get_sections` and
    /// `get_sections_by_level` on the wire are both served by this.
    pub fn sections_at_level(&self, level: i64) -> Result<Vec<LevelEntry>, EngineError> {
        if !(1..=6).contains(&level) {
            return Err(EngineError::InvalidArgument(format!(
                "level must be between 1 and 6, got {level}"
            )));
        }
        let level = level as u8;
        Ok(self
            .sections_in_order()
            .filter(|section| section.level == level)
            .map(|section| LevelEntry {
                id: section.id.clone(),
                title: section.title.clone(),
                content: section.content.clone(),
            })
            .collect())
    }

    /// Per-root-file section forest; included files are invisible here.
    #[must_use]
    pub fn get_root_files_structure(&self) -> Vec<FileStructure> {
        self.root_files
            .iter()
            .map(|root| {
                let top_level: Vec<&Section> = self
                    .sections_in_order()
                    .filter(|section| {
                        section.parent_id.is_none()
                            && self.root_of.get(&section.id) == Some(root)
                    })
                    .collect();
                let sections: Vec<SectionNode> = top_level
                    .iter()
                    .map(|section| self.section_node(section))
                    .collect();
                let section_count = self
                    .root_of
                    .values()
                    .filter(|owner| *owner == root)
                    .count();
                FileStructure {
                    filename: root.rsplit('/').next().unwrap_or(root).to_string(),
                    path: root.clone(),
                    section_count,
                    sections,
                }
            })
            .collect()
    }

    fn section_node(&self, section: &Section) -> SectionNode {
        let children: Vec<SectionNode> = section
            .children
            .iter()
            .filter_map(|id| self.section(id))
            .map(|child| self.section_node(child))
            .collect();
        SectionNode {
            id: section.id.clone(),
            title: section.title.clone(),
            level: section.level,
            children_count: section.children.len(),
            children,
        }
    }

    /// Arc42-style main chapters: numbered level-2 sections plus unnumbered
    /// level-1 documents, numbered ones first.
    #[must_use]
    pub fn get_main_chapters(&self) -> Vec<ChapterEntry> {
        let mut chapters: Vec<(u32, usize, ChapterEntry)> = Vec::new();
        for (position, section) in self.sections_in_order().enumerate() {
            let number = chapter_number(&section.title);
            let qualifies = match section.level {
                2 => number.is_some(),
                1 => number.is_none(),
                _ => false,
            };
            if !qualifies {
                continue;
            }
            chapters.push((
                number.unwrap_or(u32::MAX),
                position,
                ChapterEntry {
                    id: section.id.clone(),
                    title: section.title.clone(),
                    level: section.level,
                    children_count: section.children.len(),
                    chapter_number: number,
                },
            ));
        }
        chapters.sort_by_key(|(number, position, _)| (*number, *position));
        chapters.into_iter().map(|(_, _, entry)| entry).collect()
    }

    /// Case-insensitive substring search over titles and bodies.
    ///
    /// Ranking: title matches first, then earlier match position, then
    /// shallower sections.
    pub fn search_content(&self, query: &str) -> Result<Vec<SearchHit>, EngineError> {
        if query.is_empty() {
            return Err(EngineError::InvalidArgument(
                "search query must not be empty".into(),
            ));
        }
        let needle = query.to_lowercase();

        let mut ranked: Vec<(u8, usize, u8, SearchHit)> = Vec::new();
        for section in self.sections_in_order() {
            let title = section.title.to_lowercase();
            let content = section.content.to_lowercase();
            let title_pos = title.find(&needle);
            let content_pos = content.find(&needle);
            if title_pos.is_none() && content_pos.is_none() {
                continue;
            }

            let score = 2 * title.matches(&needle).count() + content.matches(&needle).count();
            let snippet = match content_pos {
                Some(pos) => {
                    let start = floor_char_boundary(&section.content, pos.saturating_sub(40));
                    let end =
                        ceil_char_boundary(&section.content, pos + needle.len() + 40);
                    section.content[start..end].to_string()
                }
                None => {
                    let end = floor_char_boundary(&section.content, 80);
                    section.content[..end].to_string()
                }
            };

            ranked.push((
                u8::from(title_pos.is_none()),
                title_pos.or(content_pos).unwrap_or(usize::MAX),
                section.level,
                SearchHit {
                    id: section.id.clone(),
                    title: section.title.clone(),
                    score,
                    snippet,
                },
            ));
        }
        ranked.sort_by(|a, b| (a.0, a.1, a.2).cmp(&(b.0, b.1, b.2)));
        Ok(ranked.into_iter().map(|(_, _, _, hit)| hit).collect())
    }

    /// Metadata for one section.
    pub fn section_metadata(&self, id: &str) -> Result<SectionMetadata, EngineError> {
        let section = self
            .section(id)
            .ok_or_else(|| EngineError::NotFound(format!("section {id}")))?;
        Ok(SectionMetadata {
            id: section.id.clone(),
            title: section.title.clone(),
            level: section.level,
            word_count: section.word_count(),
            children_count: section.children.len(),
            has_content: section.has_content(),
        })
    }

    /// Project-wide metadata.
    #[must_use]
    pub fn project_metadata(&self) -> ProjectMetadata {
        let root_files = self
            .root_files
            .iter()
            .filter_map(|root| {
                let meta = std::fs::metadata(self.project_root.join(root)).ok()?;
                let last_modified = meta
                    .modified()
                    .ok()
                    .and_then(|stamp| stamp.duration_since(std::time::UNIX_EPOCH).ok())
                    .map_or(0, |elapsed| elapsed.as_secs());
                Some(RootFileInfo {
                    file: root.clone(),
                    size: meta.len(),
                    last_modified,
                })
            })
            .collect();
        ProjectMetadata {
            project_root: slash_path(&self.project_root),
            total_sections: self.section_count(),
            total_words: self.sections_in_order().map(Section::word_count).sum(),
            root_files,
        }
    }

    /// Include tree, `<<…>>` cross-references, and the orphan check.
    #[must_use]
    pub fn get_dependencies(&self) -> Dependencies {
        let mut cross_references = Vec::new();
        for section in self.sections_in_order() {
            for captures in xref_re().captures_iter(&section.content) {
                let target = captures[1].trim().to_string();
                let resolved = self.section(&target).is_some();
                cross_references.push(CrossReference {
                    from: section.id.clone(),
                    target,
                    resolved,
                });
            }
        }

        let orphaned_sections = self
            .sections_in_order()
            .filter(|section| {
                section.parent_id.is_none() && !self.root_of.contains_key(&section.id)
            })
            .map(|section| section.id.clone())
            .collect();

        Dependencies {
            includes: self.include_edges.clone(),
            cross_references,
            orphaned_sections,
        }
    }

    /// Check every index invariant and surface accumulated parse warnings.
    #[must_use]
    pub fn validate_structure(&self) -> Validation {
        let mut issues = Vec::new();

        for section in self.sections_in_order() {
            if let Some(parent_id) = &section.parent_id {
                match self.section(parent_id) {
                    None => issues.push(format!(
                        "section {} references missing parent {parent_id}",
                        section.id
                    )),
                    Some(parent) => {
                        let linked = parent
                            .children
                            .iter()
                            .filter(|child| *child == &section.id)
                            .count();
                        if linked != 1 {
                            issues.push(format!(
                                "parent {parent_id} links child {} {linked} times",
                                section.id
                            ));
                        }
                        if section.level <= parent.level {
                            issues.push(format!(
                                "section {} (level {}) is not deeper than parent {parent_id} (level {})",
                                section.id, section.level, parent.level
                            ));
                        }
                    }
                }
            }
            if section.line_end < section.line_start {
                issues.push(format!(
                    "section {} has line_end before line_start",
                    section.id
                ));
            }

            // Children from the same file must appear in source order.
            let in_file: Vec<&Section> = section
                .children
                .iter()
                .filter_map(|id| self.section(id))
                .filter(|child| child.source_file == section.source_file)
                .collect();
            for pair in in_file.windows(2) {
                if pair[0].line_start > pair[1].line_start {
                    issues.push(format!(
                        "children of {} are out of source order ({} after {})",
                        section.id, pair[0].id, pair[1].id
                    ));
                }
            }
        }

        for root in &self.root_files {
            if self.included_files.contains(root) {
                issues.push(format!("{root} is both a root file and an included file"));
            }
        }

        let mut warnings: Vec<ValidationWarning> = self
            .warnings
            .iter()
            .cloned()
            .map(ValidationWarning::Parse)
            .collect();
        for section in self.sections_in_order() {
            if !section.has_content() && section.children.is_empty() {
                warnings.push(ValidationWarning::EmptySection {
                    kind: "empty_section",
                    id: section.id.clone(),
                });
            }
        }

        Validation {
            valid: issues.is_empty(),
            issues,
            warnings,
        }
    }
}
