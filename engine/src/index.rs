//! Project indexer: discovery, root classification, merge, refresh.
//!
//! The index owns every [`Section`]. Parses are cached per root file so a
//! refresh re-reads only the roots a change actually touches; the merged
//! view (identifiers, maps, ordering) is rebuilt deterministically from the
//! cache afterwards.

use std::collections::{BTreeMap, BTreeSet, HashMap};
use std::path::{Path, PathBuf};

use docweaver_types::{Dialect, EngineError, IndexWarning, Section};

use crate::idpath::TreeBuilder;
use crate::parser::{self, FileParse};

/// Directory names the walker never descends into (on top of the
/// leading-dot rule).
const EXCLUDED_DIRS: &[&str] = &[".git", ".venv", "venv", "node_modules"];

/// The in-memory model of one documentation project.
#[derive(Debug)]
pub struct ProjectIndex {
    pub(crate) project_root: PathBuf,
    pub(crate) sections: HashMap<String, Section>,
    /// Section ids in depth-first source order, roots first-to-last.
    pub(crate) order: Vec<String>,
    /// Section id → the root file whose parse produced it.
    pub(crate) root_of: HashMap<String, String>,
    pub(crate) root_files: Vec<String>,
    pub(crate) included_files: BTreeSet<String>,
    pub(crate) include_edges: BTreeMap<String, Vec<String>>,
    pub(crate) warnings: Vec<IndexWarning>,
    parses: BTreeMap<String, FileParse>,
    discovered: BTreeSet<String>,
}

impl ProjectIndex {
    /// Discover, classify and parse an entire project.
    pub fn build(project_root: &Path) -> Result<Self, EngineError> {
        let mut index = Self {
            project_root: project_root.to_path_buf(),
            sections: HashMap::new(),
            order: Vec::new(),
            root_of: HashMap::new(),
            root_files: Vec::new(),
            included_files: BTreeSet::new(),
            include_edges: BTreeMap::new(),
            warnings: Vec::new(),
            parses: BTreeMap::new(),
            discovered: BTreeSet::new(),
        };
        index.rebuild_all()?;
        Ok(index)
    }

    #[must_use]
    pub fn project_root(&self) -> &Path {
        &self.project_root
    }

    #[must_use]
    pub fn section(&self, id: &str) -> Option<&Section> {
        self.sections.get(id)
    }

    /// All sections in depth-first source order.
    pub fn sections_in_order(&self) -> impl Iterator<Item = &Section> {
        self.order.iter().filter_map(|id| self.sections.get(id))
    }

    #[must_use]
    pub fn section_count(&self) -> usize {
        self.order.len()
    }

    #[must_use]
    pub fn root_files(&self) -> &[String] {
        &self.root_files
    }

    #[must_use]
    pub fn included_files(&self) -> &BTreeSet<String> {
        &self.included_files
    }

    #[must_use]
    pub fn include_edges(&self) -> &BTreeMap<String, Vec<String>> {
        &self.include_edges
    }

    #[must_use]
    pub fn warnings(&self) -> &[IndexWarning] {
        &self.warnings
    }

    /// Full rebuild: re-discover, re-classify, re-parse everything.
    pub fn rebuild_all(&mut self) -> Result<(), EngineError> {
        self.discovered = discover(&self.project_root);

        // First pass: direct include targets of discovered files give the
        // initial root guess.
        let mut first_pass_included = BTreeSet::new();
        for rel in &self.discovered {
            first_pass_included.extend(parser::collect_include_targets(&self.project_root, rel));
        }
        let mut roots: BTreeSet<String> = self
            .discovered
            .iter()
            .filter(|rel| !first_pass_included.contains(*rel))
            .cloned()
            .collect();

        // Second pass with a fixpoint: demote roots another parse reaches
        // through includes; promote discovered files nothing covers (mutual
        // include cycles leave whole components without a root otherwise).
        let mut parses: BTreeMap<String, FileParse> = BTreeMap::new();
        let mut rounds = 2 * self.discovered.len() + 8;
        loop {
            for root in &roots {
                if !parses.contains_key(root) {
                    let parse = parser::parse_with_includes(&self.project_root, root)?;
                    parses.insert(root.clone(), parse);
                }
            }
            parses.retain(|root, _| roots.contains(root));

            let reached: BTreeSet<String> = parses
                .values()
                .flat_map(|parse| parse.included.iter().cloned())
                .collect();

            let demoted: Vec<String> = roots
                .iter()
                .filter(|root| reached.contains(*root))
                .cloned()
                .collect();
            let mut changed = false;
            for root in demoted {
                roots.remove(&root);
                parses.remove(&root);
                changed = true;
            }

            if !changed {
                let reached: BTreeSet<String> = parses
                    .values()
                    .flat_map(|parse| parse.included.iter().cloned())
                    .collect();
                let uncovered = self
                    .discovered
                    .iter()
                    .find(|rel| !roots.contains(*rel) && !reached.contains(*rel));
                if let Some(next) = uncovered {
                    roots.insert(next.clone());
                    changed = true;
                }
            }

            rounds -= 1;
            if !changed || rounds == 0 {
                break;
            }
        }

        self.root_files = roots.into_iter().collect();
        self.included_files = parses
            .values()
            .flat_map(|parse| parse.included.iter().cloned())
            .collect();
        self.parses = parses;
        self.rebuild_merged();
        Ok(())
    }

    /// Apply a set of changed absolute paths.
    ///
    /// Known roots are re-parsed; known includees re-parse every root that
    /// transitively includes them; anything unknown (new files, deletions,
    /// changed include topology) falls back to a full rebuild. Applying the
    /// same change set twice is a no-op the second time.
    pub fn refresh_paths(&mut self, changed: &[PathBuf]) -> Result<(), EngineError> {
        let mut touched = Vec::new();
        for path in changed {
            let rel = match path.strip_prefix(&self.project_root) {
                Ok(rel) => parser::slash_path(rel),
                Err(_) => continue,
            };
            if Dialect::from_path(Path::new(&rel)).is_none() {
                continue;
            }
            let known = self.parses.contains_key(&rel) || self.included_files.contains(&rel);
            let exists = self.project_root.join(&rel).is_file();
            if !known || !exists {
                return self.rebuild_all();
            }
            touched.push(rel);
        }
        if touched.is_empty() {
            return Ok(());
        }

        let mut roots_to_parse = BTreeSet::new();
        for rel in &touched {
            if self.parses.contains_key(rel) {
                roots_to_parse.insert(rel.clone());
            } else {
                for (root, parse) in &self.parses {
                    if parse.included.contains(rel) {
                        roots_to_parse.insert(root.clone());
                    }
                }
            }
        }

        for root in roots_to_parse {
            match parser::parse_with_includes(&self.project_root, &root) {
                Ok(parse) => {
                    self.parses.insert(root, parse);
                }
                // A root that stopped being readable is a topology change.
                Err(_) => return self.rebuild_all(),
            }
        }

        let new_included: BTreeSet<String> = self
            .parses
            .values()
            .flat_map(|parse| parse.included.iter().cloned())
            .collect();
        if new_included != self.included_files {
            return self.rebuild_all();
        }

        self.rebuild_merged();
        Ok(())
    }

    /// Rebuild the merged view (ids, maps, ordering) from the parse cache.
    fn rebuild_merged(&mut self) {
        let mut builder = TreeBuilder::new();
        let mut spans = Vec::with_capacity(self.parses.len());
        let mut edges: BTreeMap<String, Vec<String>> = BTreeMap::new();
        let mut warnings = Vec::new();

        for (root, parse) in &self.parses {
            let start = builder.len();
            builder.start_root();
            for record in &parse.records {
                builder.push_record(record);
            }
            spans.push((root.clone(), start, builder.len()));

            for (includer, targets) in &parse.include_edges {
                let entry = edges.entry(includer.clone()).or_default();
                for target in targets {
                    if !entry.contains(target) {
                        entry.push(target.clone());
                    }
                }
            }
            warnings.extend(parse.warnings.iter().cloned());
        }

        let merged = builder.finish();
        self.root_of.clear();
        for (root, start, end) in spans {
            for section in &merged[start..end] {
                self.root_of.insert(section.id.clone(), root.clone());
            }
        }
        self.order = merged.iter().map(|section| section.id.clone()).collect();
        self.sections = merged
            .into_iter()
            .map(|section| (section.id.clone(), section))
            .collect();
        self.include_edges = edges;
        self.warnings = warnings;
    }
}

/// Recursively enumerate markup files under `project_root`.
///
/// Skips underscore-prefixed files (include partials by convention) and the
/// excluded directory set; gitignore semantics are deliberately off.
fn discover(project_root: &Path) -> BTreeSet<String> {
    let mut found = BTreeSet::new();
    let walker = ignore::WalkBuilder::new(project_root)
        .standard_filters(false)
        .follow_links(false)
        .filter_entry(|entry| {
            if entry.depth() == 0 {
                return true;
            }
            let is_dir = entry.file_type().is_some_and(|kind| kind.is_dir());
            if !is_dir {
                return true;
            }
            let name = entry.file_name().to_string_lossy();
            !(name.starts_with('.') || EXCLUDED_DIRS.contains(&name.as_ref()))
        })
        .build();

    for entry in walker.flatten() {
        if entry.depth() == 0 || !entry.file_type().is_some_and(|kind| kind.is_file()) {
            continue;
        }
        let path = entry.path();
        if Dialect::from_path(path).is_none() {
            continue;
        }
        if entry.file_name().to_string_lossy().starts_with('_') {
            continue;
        }
        if let Ok(rel) = path.strip_prefix(project_root) {
            found.insert(parser::slash_path(rel));
        }
    }
    found
}

#[cfg(test)]
mod tests {
    use super::*;
    use docweaver_types::WarningKind;
    use std::fs;

    fn write(root: &Path, rel: &str, text: &str) {
        let path = root.join(rel);
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).unwrap();
        }
        fs::write(path, text).unwrap();
    }

    #[test]
    fn discovery_skips_partials_and_excluded_dirs() {
        let dir = tempfile::tempdir().unwrap();
        write(dir.path(), "main.adoc", "= Main\n");
        write(dir.path(), "notes.MD", "# Notes\n");
        write(dir.path(), "_partial.adoc", "== Hidden\n");
        write(dir.path(), ".git/config.md", "# NotDocs\n");
        write(dir.path(), "node_modules/pkg/readme.md", "# Dep\n");
        write(dir.path(), ".venv/lib.adoc", "= Venv\n");
        write(dir.path(), "sub/guide.markdown", "# Guide\n");
        write(dir.path(), "sub/data.txt", "not markup\n");

        let found = discover(dir.path());
        let listed: Vec<_> = found.iter().map(String::as_str).collect();
        assert_eq!(listed, vec!["main.adoc", "notes.MD", "sub/guide.markdown"]);
    }

    #[test]
    fn included_files_are_not_roots() {
        let dir = tempfile::tempdir().unwrap();
        write(dir.path(), "main.adoc", "= Main\n\ninclude::_chap.adoc[]\n");
        write(dir.path(), "_chap.adoc", "== Chap\n\ntext\n");

        let index = ProjectIndex::build(dir.path()).unwrap();
        assert_eq!(index.root_files(), ["main.adoc"]);
        assert!(index.included_files().contains("_chap.adoc"));

        let chap = index.section("main.chap").unwrap();
        assert_eq!(chap.source_file, "_chap.adoc");
        assert_eq!(chap.parent_id.as_deref(), Some("main"));
    }

    #[test]
    fn discovered_file_included_through_partial_is_demoted() {
        let dir = tempfile::tempdir().unwrap();
        write(dir.path(), "main.adoc", "= Main\n\ninclude::_glue.adoc[]\n");
        write(dir.path(), "_glue.adoc", "include::chapter.adoc[]\n");
        write(dir.path(), "chapter.adoc", "== Chapter\n\nbody\n");

        let index = ProjectIndex::build(dir.path()).unwrap();
        assert_eq!(index.root_files(), ["main.adoc"]);
        assert!(index.included_files().contains("chapter.adoc"));
        // The chapter's sections arrive exactly once, through the root.
        let chapter = index.section("main.chapter").unwrap();
        assert_eq!(chapter.source_file, "chapter.adoc");
        assert_eq!(index.section_count(), 2);
    }

    #[test]
    fn mutual_include_cycle_still_produces_sections() {
        let dir = tempfile::tempdir().unwrap();
        write(dir.path(), "a.adoc", "= A\n\ninclude::b.adoc[]\n");
        write(dir.path(), "b.adoc", "== B\n\ninclude::a.adoc[]\n");

        let index = ProjectIndex::build(dir.path()).unwrap();
        // One of the two becomes the root; nothing is duplicated.
        assert_eq!(index.root_files(), ["a.adoc"]);
        assert_eq!(index.section_count(), 2);
        assert!(index.section("a").is_some());
        assert!(index.section("a.b").is_some());
        assert_eq!(
            index
                .warnings()
                .iter()
                .filter(|w| w.kind == WarningKind::Cycle)
                .count(),
            1
        );
    }

    #[test]
    fn multiple_roots_merge_with_shared_top_level_scope() {
        let dir = tempfile::tempdir().unwrap();
        write(dir.path(), "a.md", "# Guide\n\n## One\n");
        write(dir.path(), "b.md", "# Guide\n\n## One\n");

        let index = ProjectIndex::build(dir.path()).unwrap();
        assert_eq!(index.root_files(), ["a.md", "b.md"]);
        assert!(index.section("guide").is_some());
        assert!(index.section("guide-2").is_some());
        assert!(index.section("guide.one").is_some());
        assert!(index.section("guide-2.one").is_some());
    }

    #[test]
    fn refresh_of_changed_root_replaces_its_sections() {
        let dir = tempfile::tempdir().unwrap();
        write(dir.path(), "main.adoc", "= Intro\n\n== Overview\n\nBody.\n");
        let mut index = ProjectIndex::build(dir.path()).unwrap();
        assert!(index.section("intro.overview").is_some());

        write(dir.path(), "main.adoc", "= Intro\n\n== Summary\n\nBody.\n");
        index
            .refresh_paths(&[dir.path().join("main.adoc")])
            .unwrap();
        assert!(index.section("intro.overview").is_none());
        assert!(index.section("intro.summary").is_some());
    }

    #[test]
    fn refresh_of_changed_includee_reparses_its_roots() {
        let dir = tempfile::tempdir().unwrap();
        write(dir.path(), "main.adoc", "= Main\n\ninclude::_chap.adoc[]\n");
        write(dir.path(), "_chap.adoc", "== Chap\n\nold\n");
        let mut index = ProjectIndex::build(dir.path()).unwrap();
        assert_eq!(index.section("main.chap").unwrap().content, "old");

        write(dir.path(), "_chap.adoc", "== Chap\n\nnew\n");
        index
            .refresh_paths(&[dir.path().join("_chap.adoc")])
            .unwrap();
        assert_eq!(index.section("main.chap").unwrap().content, "new");
    }

    #[test]
    fn refresh_with_unknown_path_rediscovers() {
        let dir = tempfile::tempdir().unwrap();
        write(dir.path(), "main.adoc", "= Main\n");
        let mut index = ProjectIndex::build(dir.path()).unwrap();
        assert_eq!(index.root_files().len(), 1);

        write(dir.path(), "extra.md", "# Extra\n");
        index.refresh_paths(&[dir.path().join("extra.md")]).unwrap();
        assert_eq!(index.root_files(), ["extra.md", "main.adoc"]);
        assert!(index.section("extra").is_some());
    }

    #[test]
    fn refresh_after_deletion_drops_sections() {
        let dir = tempfile::tempdir().unwrap();
        write(dir.path(), "main.adoc", "= Main\n");
        write(dir.path(), "gone.md", "# Gone\n");
        let mut index = ProjectIndex::build(dir.path()).unwrap();
        assert!(index.section("gone").is_some());

        fs::remove_file(dir.path().join("gone.md")).unwrap();
        index.refresh_paths(&[dir.path().join("gone.md")]).unwrap();
        assert!(index.section("gone").is_none());
        assert_eq!(index.root_files(), ["main.adoc"]);
    }

    #[test]
    fn refresh_is_idempotent_and_deterministic() {
        let dir = tempfile::tempdir().unwrap();
        write(dir.path(), "main.adoc", "= Intro\n\n== Overview\n\nBody.\n");
        write(dir.path(), "other.md", "# Other\n\n## Part\n");
        let mut index = ProjectIndex::build(dir.path()).unwrap();

        let snapshot = |index: &ProjectIndex| {
            (
                index.order.clone(),
                index
                    .sections_in_order()
                    .cloned()
                    .collect::<Vec<_>>(),
                index.root_files.clone(),
                index.included_files.clone(),
            )
        };

        let before = snapshot(&index);
        index.rebuild_all().unwrap();
        let after_first = snapshot(&index);
        index.rebuild_all().unwrap();
        let after_second = snapshot(&index);
        assert_eq!(before, after_first);
        assert_eq!(after_first, after_second);

        let paths = [dir.path().join("main.adoc")];
        index.refresh_paths(&paths).unwrap();
        index.refresh_paths(&paths).unwrap();
        assert_eq!(snapshot(&index), before);
    }

    #[test]
    fn empty_project_builds_an_empty_index() {
        let dir = tempfile::tempdir().unwrap();
        let index = ProjectIndex::build(dir.path()).unwrap();
        assert_eq!(index.section_count(), 0);
        assert!(index.root_files().is_empty());
        assert!(index.included_files().is_empty());
    }
}
