//! Dotted section identifiers: slugging, nesting and disambiguation.
//!
//! Turns the parser's flat record stream into linked [`Section`]s with
//! stable ids. Identifiers are dotted chains of title slugs; duplicates
//! under the same parent get a `-2`, `-3`, … suffix.

use std::collections::{HashMap, HashSet};

use docweaver_types::Section;

use crate::parser::HeadingRecord;

/// Normalize a heading title into an identifier segment.
///
/// Unicode-lowercases, collapses every maximal run of characters outside
/// `[a-z0-9]` into a single `-`, and strips edge dashes. An empty result
/// falls back to `section`.
#[must_use]
pub fn slugify(title: &str) -> String {
    let mut slug = String::with_capacity(title.len());
    let mut pending_dash = false;
    for ch in title.chars().flat_map(char::to_lowercase) {
        if ch.is_ascii_lowercase() || ch.is_ascii_digit() {
            if pending_dash && !slug.is_empty() {
                slug.push('-');
            }
            pending_dash = false;
            slug.push(ch);
        } else {
            pending_dash = true;
        }
    }
    if slug.is_empty() {
        "section".to_string()
    } else {
        slug
    }
}

/// Builds the section tree across all root files of a project.
///
/// The identifier registry is shared across roots so top-level slugs stay
/// unique project-wide; the nesting stack resets per root file.
pub struct TreeBuilder {
    used: HashSet<String>,
    stack: Vec<(u8, String)>,
    sections: Vec<Section>,
    position: HashMap<String, usize>,
}

impl Default for TreeBuilder {
    fn default() -> Self {
        Self::new()
    }
}

impl TreeBuilder {
    #[must_use]
    pub fn new() -> Self {
        Self {
            used: HashSet::new(),
            stack: Vec::new(),
            sections: Vec::new(),
            position: HashMap::new(),
        }
    }

    /// Reset the nesting stack before feeding a new root file's records.
    pub fn start_root(&mut self) {
        self.stack.clear();
    }

    /// Ingest one record, assigning its identifier and linking it to its
    /// parent.
    pub fn push_record(&mut self, record: &HeadingRecord) {
        while self
            .stack
            .last()
            .is_some_and(|&(level, _)| level >= record.level)
        {
            self.stack.pop();
        }
        let parent_id = self.stack.last().map(|(_, id)| id.clone());

        let slug = slugify(&record.title);
        let base = match &parent_id {
            Some(parent) => format!("{parent}.{slug}"),
            None => slug,
        };
        let mut id = base.clone();
        let mut suffix = 2;
        while self.used.contains(&id) {
            id = format!("{base}-{suffix}");
            suffix += 1;
        }
        self.used.insert(id.clone());

        if let Some(parent) = &parent_id {
            let parent_pos = self.position[parent];
            self.sections[parent_pos].children.push(id.clone());
        }

        self.position.insert(id.clone(), self.sections.len());
        self.sections.push(Section {
            id: id.clone(),
            title: record.title.clone(),
            level: record.level,
            content: record.content.clone(),
            source_file: record.origin.clone(),
            line_start: record.line_start,
            line_end: record.line_end,
            parent_id,
            children: Vec::new(),
        });
        self.stack.push((record.level, id));
    }

    /// Number of sections ingested so far.
    #[must_use]
    pub fn len(&self) -> usize {
        self.sections.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.sections.is_empty()
    }

    /// All sections in source order (depth-first by construction).
    #[must_use]
    pub fn finish(self) -> Vec<Section> {
        self.sections
    }
}
