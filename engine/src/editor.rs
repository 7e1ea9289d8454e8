//! Section-scoped rewrites of source files.
//!
//! Both operations rewrite the whole file in memory, persist it with a
//! temp-file-then-rename in the same directory, and refresh the index
//! synchronously before returning, so a follow-up query observes the write.
//! On any failure the file on disk is untouched and the index keeps its
//! previous state.

use std::io::Write as _;
use std::path::Path;

use serde::{Deserialize, Serialize};
use tempfile::NamedTempFile;

use docweaver_types::{Dialect, EngineError, Section};

use crate::diff::{self, DiffReport};
use crate::index::ProjectIndex;
use crate::parser;
use crate::project::Project;

/// Where a new section lands relative to the parent's existing children.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum InsertPosition {
    /// Before the first child.
    Before,
    /// After the last child (same as `append`).
    After,
    Append,
}

impl std::str::FromStr for InsertPosition {
    type Err = EngineError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value {
            "before" => Ok(Self::Before),
            "after" => Ok(Self::After),
            "append" => Ok(Self::Append),
            other => Err(EngineError::InvalidArgument(format!(
                "position must be before, after or append, got {other:?}"
            ))),
        }
    }
}

/// Outcome of a successful insert.
#[derive(Debug, Clone, Serialize)]
pub struct InsertReport {
    /// Identifier of the new section after the refresh.
    pub id: Option<String>,
    pub diff: DiffReport,
}

impl Project {
    /// Replace the body of the section identified by `id` with `content`.
    pub fn update_section(&self, id: &str, content: &str) -> Result<DiffReport, EngineError> {
        let section = self
            .read(|index| index.section(id).cloned())
            .ok_or_else(|| EngineError::NotFound(format!("section {id}")))?;

        let abs = self.root().join(&section.source_file);
        let text = std::fs::read_to_string(&abs)
            .map_err(|err| EngineError::io(&section.source_file, err))?;
        let mut lines: Vec<String> = text.lines().map(str::to_string).collect();
        verify_heading(&lines, &section)?;

        let start = section.line_start + 1;
        let end = (section.line_end + 1).clamp(start, lines.len());
        lines.splice(start..end, body_block(content));

        let diff = diff::diff_text(&section.content, content);
        persist(&abs, &section.source_file, &lines)?;
        self.suppress_watch(&abs);
        self.refresh_paths(&[abs])?;
        Ok(diff)
    }

    /// Insert a new section as a child of `parent_id`.
    pub fn insert_section(
        &self,
        parent_id: &str,
        title: &str,
        content: &str,
        position: InsertPosition,
    ) -> Result<InsertReport, EngineError> {
        if title.trim().is_empty() {
            return Err(EngineError::InvalidArgument(
                "section title must not be empty".into(),
            ));
        }

        let (parent, insert_line) = self.read(|index| {
            let parent = index
                .section(parent_id)
                .cloned()
                .ok_or_else(|| EngineError::NotFound(format!("section {parent_id}")))?;
            let insert_line = match position {
                InsertPosition::Before => parent
                    .children
                    .first()
                    .and_then(|child| index.section(child))
                    .filter(|child| child.source_file == parent.source_file)
                    .map_or(parent.line_end + 1, |child| child.line_start),
                InsertPosition::After | InsertPosition::Append => {
                    subtree_last_line(index, &parent) + 1
                }
            };
            Ok((parent, insert_line))
        })?;

        if parent.level >= 6 {
            return Err(EngineError::InvalidArgument(format!(
                "cannot insert below level-{} section {parent_id}",
                parent.level
            )));
        }

        let abs = self.root().join(&parent.source_file);
        let old_text = std::fs::read_to_string(&abs)
            .map_err(|err| EngineError::io(&parent.source_file, err))?;
        let mut lines: Vec<String> = old_text.lines().map(str::to_string).collect();
        verify_heading(&lines, &parent)?;

        let dialect =
            Dialect::from_path(Path::new(&parent.source_file)).unwrap_or(Dialect::AsciiDoc);
        let marker = dialect
            .heading_char()
            .to_string()
            .repeat(usize::from(parent.level) + 1);

        let insert_line = insert_line.min(lines.len());
        let mut block = Vec::new();
        if insert_line > 0
            && lines
                .get(insert_line - 1)
                .is_some_and(|line| !line.trim().is_empty())
        {
            block.push(String::new());
        }
        let heading_line = insert_line + block.len();
        block.push(format!("{marker} {title}"));
        let body = content.trim_matches('\n');
        if !body.is_empty() {
            block.push(String::new());
            block.extend(body.lines().map(str::to_string));
        }
        if lines
            .get(insert_line)
            .is_some_and(|line| !line.trim().is_empty())
        {
            block.push(String::new());
        }
        lines.splice(insert_line..insert_line, block);

        let new_text = render(&lines);
        let diff = diff::diff_text(&old_text, &new_text);
        persist(&abs, &parent.source_file, &lines)?;
        self.suppress_watch(&abs);
        self.refresh_paths(&[abs])?;

        let id = self.read(|index| {
            index
                .sections_in_order()
                .find(|section| {
                    section.source_file == parent.source_file
                        && section.line_start == heading_line
                        && section.title == title
                })
                .map(|section| section.id.clone())
        });
        Ok(InsertReport { id, diff })
    }
}

/// The body replacement for an update: one separating blank line, then the
/// normalized content.
fn body_block(content: &str) -> Vec<String> {
    let trimmed = content.trim_end_matches(['\n', '\r']);
    let mut block = vec![String::new()];
    if !trimmed.is_empty() {
        block.extend(trimmed.lines().map(str::to_string));
    }
    block
}

/// Last line (in the parent's own file) occupied by the parent or any of its
/// descendants.
fn subtree_last_line(index: &ProjectIndex, parent: &Section) -> usize {
    let mut last = parent.line_end;
    let mut pending: Vec<&String> = parent.children.iter().collect();
    while let Some(id) = pending.pop() {
        if let Some(section) = index.section(id) {
            if section.source_file == parent.source_file {
                last = last.max(section.line_end);
            }
            pending.extend(section.children.iter());
        }
    }
    last
}

/// Staleness gate: the on-disk heading line must still parse to the indexed
/// level and title.
fn verify_heading(lines: &[String], section: &Section) -> Result<(), EngineError> {
    let dialect =
        Dialect::from_path(Path::new(&section.source_file)).unwrap_or(Dialect::AsciiDoc);
    let line = lines.get(section.line_start).ok_or_else(|| EngineError::Stale {
        id: section.id.clone(),
        detail: "heading line is past the end of the file".into(),
    })?;
    match parser::parse_heading(line, dialect) {
        Some((level, title)) if level == section.level && title == section.title => Ok(()),
        _ => Err(EngineError::Stale {
            id: section.id.clone(),
            detail: "heading on disk no longer matches the index".into(),
        }),
    }
}

fn render(lines: &[String]) -> String {
    let mut text = lines.join("\n");
    text.push('\n');
    text
}

/// Write the new file bytes next to the original, then rename over it.
///
/// On Windows a rename over an existing file fails, so fall back to
/// backup-and-restore; a failed fallback puts the original back.
fn persist(abs: &Path, rel: &str, lines: &[String]) -> Result<(), EngineError> {
    atomic_replace(abs, render(lines).as_bytes()).map_err(|err| EngineError::io(rel, err))
}

fn atomic_replace(path: &Path, bytes: &[u8]) -> std::io::Result<()> {
    let dir = path.parent().unwrap_or_else(|| Path::new("."));
    let mut tmp = NamedTempFile::new_in(dir)?;
    tmp.write_all(bytes)?;
    tmp.as_file().sync_all()?;

    if let Err(err) = tmp.persist(path) {
        if path.exists() {
            let backup = path.with_extension("bak");
            let _ = std::fs::remove_file(&backup);
            std::fs::rename(path, &backup)?;
            if let Err(retry) = err.file.persist(path) {
                let _ = std::fs::rename(&backup, path);
                return Err(retry.error);
            }
            let _ = std::fs::remove_file(&backup);
        } else {
            return Err(err.error);
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use std::sync::Arc;

    fn project_with(files: &[(&str, &str)]) -> (tempfile::TempDir, Arc<Project>) {
        let dir = tempfile::tempdir().unwrap();
        for (rel, text) in files {
            let path = dir.path().join(rel);
            if let Some(parent) = path.parent() {
                fs::create_dir_all(parent).unwrap();
            }
            fs::write(path, text).unwrap();
        }
        let project = Project::open(dir.path()).unwrap();
        (dir, project)
    }

    #[test]
    fn update_rewrites_body_and_refreshes() {
        let (dir, project) =
            project_with(&[("main.adoc", "= Intro\n\nHello.\n\n== Overview\n\nBody.\n")]);

        let diff = project.update_section("intro.overview", "New body").unwrap();
        assert!(diff.has_changes);

        let on_disk = fs::read_to_string(dir.path().join("main.adoc")).unwrap();
        assert!(on_disk.ends_with("== Overview\n\nNew body\n"));

        let content =
            project.read(|index| index.section("intro.overview").unwrap().content.clone());
        assert_eq!(content, "New body");
    }

    #[test]
    fn update_is_idempotent() {
        let (dir, project) =
            project_with(&[("main.adoc", "= Intro\n\nHello.\n\n== Overview\n\nBody.\n")]);

        project.update_section("intro.overview", "Same text").unwrap();
        let first = fs::read_to_string(dir.path().join("main.adoc")).unwrap();
        let diff = project.update_section("intro.overview", "Same text").unwrap();
        let second = fs::read_to_string(dir.path().join("main.adoc")).unwrap();
        assert_eq!(first, second);
        assert!(!diff.has_changes);
    }

    #[test]
    fn update_unknown_section_is_not_found() {
        let (_dir, project) = project_with(&[("main.adoc", "= Intro\n")]);
        let err = project.update_section("nope", "x").unwrap_err();
        assert_eq!(err.kind(), "not_found");
    }

    #[test]
    fn update_detects_external_rename_as_stale() {
        let (dir, project) =
            project_with(&[("main.adoc", "= Intro\n\n== Overview\n\nBody.\n")]);

        // Simulate an external edit the index has not seen yet.
        fs::write(
            dir.path().join("main.adoc"),
            "= Intro\n\n== Renamed\n\nBody.\n",
        )
        .unwrap();

        let err = project.update_section("intro.overview", "x").unwrap_err();
        assert_eq!(err.kind(), "stale");
        // The failed edit must leave the file alone.
        let on_disk = fs::read_to_string(dir.path().join("main.adoc")).unwrap();
        assert!(on_disk.contains("== Renamed"));
    }

    #[test]
    fn update_multiline_and_empty_content() {
        let (dir, project) =
            project_with(&[("main.adoc", "= Intro\n\n== Overview\n\nBody.\n\n== Next\n\nKeep.\n")]);

        project
            .update_section("intro.overview", "line one\n\nline two")
            .unwrap();
        let content =
            project.read(|index| index.section("intro.overview").unwrap().content.clone());
        assert_eq!(content, "line one\n\nline two");
        // The following sibling is untouched.
        let keep = project.read(|index| index.section("intro.next").unwrap().content.clone());
        assert_eq!(keep, "Keep.");

        project.update_section("intro.overview", "").unwrap();
        let content =
            project.read(|index| index.section("intro.overview").unwrap().content.clone());
        assert_eq!(content, "");
        let on_disk = fs::read_to_string(dir.path().join("main.adoc")).unwrap();
        assert!(on_disk.contains("== Overview\n\n== Next"));
    }

    #[test]
    fn update_section_living_in_an_includee() {
        let (dir, project) = project_with(&[
            ("main.adoc", "= Main\n\ninclude::_chap.adoc[]\n"),
            ("_chap.adoc", "== Chap\n\nold text\n"),
        ]);

        project.update_section("main.chap", "new text").unwrap();
        let chap = fs::read_to_string(dir.path().join("_chap.adoc")).unwrap();
        assert_eq!(chap, "== Chap\n\nnew text\n");
        // The root file is untouched.
        let main = fs::read_to_string(dir.path().join("main.adoc")).unwrap();
        assert!(main.contains("include::_chap.adoc[]"));
    }

    #[test]
    fn insert_append_lands_after_last_child() {
        let (dir, project) = project_with(&[(
            "main.adoc",
            "= Intro\n\nHello.\n\n== First\n\nOne.\n\n== Second\n\nTwo.\n",
        )]);

        let report = project
            .insert_section("intro", "Third", "Three.", InsertPosition::Append)
            .unwrap();
        assert_eq!(report.id.as_deref(), Some("intro.third"));

        let on_disk = fs::read_to_string(dir.path().join("main.adoc")).unwrap();
        assert!(on_disk.ends_with("Two.\n\n== Third\n\nThree.\n"));
        let children =
            project.read(|index| index.section("intro").unwrap().children.clone());
        assert_eq!(children, vec!["intro.first", "intro.second", "intro.third"]);
    }

    #[test]
    fn insert_before_lands_ahead_of_first_child() {
        let (_dir, project) = project_with(&[(
            "main.adoc",
            "= Intro\n\nHello.\n\n== First\n\nOne.\n",
        )]);

        let report = project
            .insert_section("intro", "Zeroth", "Zero.", InsertPosition::Before)
            .unwrap();
        assert_eq!(report.id.as_deref(), Some("intro.zeroth"));
        let children =
            project.read(|index| index.section("intro").unwrap().children.clone());
        assert_eq!(children, vec!["intro.zeroth", "intro.first"]);
    }

    #[test]
    fn insert_into_childless_parent_uses_markdown_markers() {
        let (dir, project) = project_with(&[("guide.md", "# Guide\n\nIntro text.\n")]);

        let report = project
            .insert_section("guide", "Details", "More.", InsertPosition::Append)
            .unwrap();
        assert_eq!(report.id.as_deref(), Some("guide.details"));

        let on_disk = fs::read_to_string(dir.path().join("guide.md")).unwrap();
        assert_eq!(on_disk, "# Guide\n\nIntro text.\n\n## Details\n\nMore.\n");
    }

    #[test]
    fn insert_below_level_six_is_rejected() {
        let (_dir, project) =
            project_with(&[("deep.md", "# A\n## B\n### C\n#### D\n##### E\n###### F\n")]);
        let err = project
            .insert_section("a.b.c.d.e.f", "G", "", InsertPosition::Append)
            .unwrap_err();
        assert_eq!(err.kind(), "invalid_argument");
    }

    #[test]
    fn insert_position_parses_from_wire_strings() {
        assert_eq!("append".parse::<InsertPosition>().unwrap(), InsertPosition::Append);
        assert_eq!("before".parse::<InsertPosition>().unwrap(), InsertPosition::Before);
        assert!("above".parse::<InsertPosition>().is_err());
    }

    #[test]
    fn atomic_replace_overwrites_and_cleans_up() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("file.txt");
        atomic_replace(&path, b"one\n").unwrap();
        atomic_replace(&path, b"two\n").unwrap();
        assert_eq!(fs::read_to_string(&path).unwrap(), "two\n");
        assert!(!path.with_extension("bak").exists());
        // No stray temp files left behind.
        assert_eq!(fs::read_dir(dir.path()).unwrap().count(), 1);
    }
}
