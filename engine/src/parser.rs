//! Markup parser: one file in, a flat ordered list of heading records out.
//!
//! The parser's sole job is sectioning and include discovery. It recognizes
//! ATX headings in Markdown and `=`-style headings in AsciiDoc, expands
//! AsciiDoc `include::` directives inline with cycle and depth protection,
//! and suppresses both inside fenced/delimited literal blocks. It never
//! builds hierarchy; that is [`crate::idpath`]'s job.

use std::collections::BTreeSet;
use std::path::{Component, Path, PathBuf};
use std::sync::{Arc, OnceLock};

use regex::Regex;

use docweaver_types::{Dialect, EngineError, IndexWarning, WarningKind};

/// Hard cap on the include stack. Opening a fifth file on the chain is
/// refused with a `max_depth` warning.
pub const MAX_INCLUDE_DEPTH: usize = 4;

fn md_heading_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"^(#{1,6})\s+(.+?)\s*#*\s*$").expect("valid regex"))
}

fn adoc_heading_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"^(=+)\s+(.+?)\s*$").expect("valid regex"))
}

fn include_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"^include::(.+?)\[.*?\]\s*$").expect("valid regex"))
}

/// One heading plus the body that follows it, all positions in the origin
/// file's own coordinates.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HeadingRecord {
    pub level: u8,
    pub title: String,
    /// Project-relative path of the file the heading physically lives in.
    pub origin: String,
    /// 0-based heading line within `origin`.
    pub line_start: usize,
    /// 0-based last content line within `origin`; equals `line_start` for an
    /// empty body.
    pub line_end: usize,
    /// Body text, at most one leading and one trailing blank line removed.
    pub content: String,
}

/// Result of parsing one root file with include expansion.
#[derive(Debug, Clone, Default)]
pub struct FileParse {
    pub records: Vec<HeadingRecord>,
    pub warnings: Vec<IndexWarning>,
    /// Includer → includees in directive order, depth-first left-to-right.
    pub include_edges: Vec<(String, Vec<String>)>,
    /// Every include target reached during expansion.
    pub included: BTreeSet<String>,
}

/// A line of expanded source, annotated with where it came from.
struct SourceLine {
    origin: Arc<str>,
    line: usize,
    text: String,
    dialect: Dialect,
    /// True inside (or on the delimiters of) a fenced block.
    literal: bool,
}

/// Tracks the currently open fence, if any.
#[derive(Default)]
struct FenceState {
    open: Option<Fence>,
}

enum Fence {
    /// Markdown backtick fence; closes on a backtick-only line at least as
    /// long as the opener.
    Backticks(usize),
    /// AsciiDoc `----`/`....` delimiter; closes on the identical line.
    Delimiter(String),
}

impl FenceState {
    /// Feed one line; returns true when the line is a delimiter or sits
    /// inside an open fence.
    fn observe(&mut self, trimmed: &str, dialect: Dialect) -> bool {
        match &self.open {
            Some(Fence::Backticks(len)) => {
                let run = trimmed.chars().take_while(|&c| c == '`').count();
                if run >= *len && trimmed.chars().all(|c| c == '`') {
                    self.open = None;
                }
                true
            }
            Some(Fence::Delimiter(delim)) => {
                if trimmed == delim {
                    self.open = None;
                }
                true
            }
            None => {
                match dialect {
                    Dialect::Markdown => {
                        let run = trimmed.chars().take_while(|&c| c == '`').count();
                        if run >= 3 {
                            self.open = Some(Fence::Backticks(run));
                            return true;
                        }
                    }
                    Dialect::AsciiDoc => {
                        if trimmed.len() >= 4
                            && (trimmed.chars().all(|c| c == '-')
                                || trimmed.chars().all(|c| c == '.'))
                        {
                            self.open = Some(Fence::Delimiter(trimmed.to_string()));
                            return true;
                        }
                    }
                }
                false
            }
        }
    }
}

/// Lexically normalize `path` (resolve `.` and `..`, no filesystem access).
fn normalize(path: &Path) -> PathBuf {
    let mut out = PathBuf::new();
    for component in path.components() {
        match component {
            Component::CurDir => {}
            Component::ParentDir => {
                if !out.pop() {
                    out.push("..");
                }
            }
            other => out.push(other.as_os_str()),
        }
    }
    out
}

/// Render a path with forward slashes regardless of platform.
pub(crate) fn slash_path(path: &Path) -> String {
    let rendered = path.to_string_lossy();
    if rendered.contains('\\') {
        rendered.replace('\\', "/")
    } else {
        rendered.into_owned()
    }
}

/// Resolve an include target written in `includer_rel` to a project-relative
/// slash path.
pub(crate) fn resolve_target(project_root: &Path, includer_rel: &str, target: &str) -> String {
    let target = target.trim();
    let candidate = if Path::new(target).is_absolute() {
        normalize(Path::new(target))
    } else {
        let includer_dir = Path::new(includer_rel)
            .parent()
            .unwrap_or_else(|| Path::new(""));
        normalize(&includer_dir.join(target))
    };
    if candidate.is_absolute() {
        candidate
            .strip_prefix(project_root)
            .map(slash_path)
            .unwrap_or_else(|_| slash_path(&candidate))
    } else {
        slash_path(&candidate)
    }
}

/// Collect the direct include targets of one file, fence-aware, resolved to
/// project-relative paths. Unreadable files yield an empty list; Markdown
/// files have no include mechanism.
pub fn collect_include_targets(project_root: &Path, rel: &str) -> Vec<String> {
    let Some(dialect) = Dialect::from_path(Path::new(rel)) else {
        return Vec::new();
    };
    if dialect != Dialect::AsciiDoc {
        return Vec::new();
    }
    let Ok(text) = std::fs::read_to_string(project_root.join(rel)) else {
        return Vec::new();
    };

    let mut fences = FenceState::default();
    let mut targets = Vec::new();
    for line in text.lines() {
        if fences.observe(line.trim(), dialect) {
            continue;
        }
        if let Some(captures) = include_re().captures(line) {
            targets.push(resolve_target(project_root, rel, &captures[1]));
        }
    }
    targets
}

/// Parse one root file, expanding includes, into flat heading records.
///
/// Reading the root itself is the only fatal failure; every problem below it
/// (missing target, unreadable target, cycle, depth) degrades to a warning
/// and leaves the directive line in place as plain text.
pub fn parse_with_includes(project_root: &Path, root_rel: &str) -> Result<FileParse, EngineError> {
    let text = std::fs::read_to_string(project_root.join(root_rel))
        .map_err(|err| EngineError::io(root_rel, err))?;

    let mut parse = FileParse::default();
    let mut lines = Vec::new();
    let mut stack = Vec::new();

    expand_text(project_root, root_rel, &text, &mut stack, &mut lines, &mut parse);
    parse.records = scan_records(&lines);
    Ok(parse)
}

fn expand_text(
    project_root: &Path,
    rel: &str,
    text: &str,
    stack: &mut Vec<String>,
    out: &mut Vec<SourceLine>,
    parse: &mut FileParse,
) {
    let dialect = Dialect::from_path(Path::new(rel)).unwrap_or(Dialect::AsciiDoc);

    stack.push(rel.to_string());
    let origin: Arc<str> = Arc::from(rel);
    let mut fences = FenceState::default();
    let mut edges: Vec<String> = Vec::new();

    for (line_no, raw) in text.lines().enumerate() {
        let literal = fences.observe(raw.trim(), dialect);

        if !literal && dialect == Dialect::AsciiDoc {
            if let Some(captures) = include_re().captures(raw) {
                let target = resolve_target(project_root, rel, &captures[1]);
                let warn = |kind| IndexWarning {
                    kind,
                    file: rel.to_string(),
                    line: line_no,
                    target: target.clone(),
                };

                if stack.iter().any(|open| open == &target) {
                    parse.warnings.push(warn(WarningKind::Cycle));
                } else if stack.len() > MAX_INCLUDE_DEPTH {
                    parse.warnings.push(warn(WarningKind::MaxDepth));
                } else {
                    match std::fs::read_to_string(project_root.join(&target)) {
                        Ok(included_text) => {
                            edges.push(target.clone());
                            parse.included.insert(target.clone());
                            expand_text(
                                project_root,
                                &target,
                                &included_text,
                                stack,
                                out,
                                parse,
                            );
                            continue;
                        }
                        Err(err) if err.kind() == std::io::ErrorKind::NotFound => {
                            parse.warnings.push(warn(WarningKind::MissingInclude));
                        }
                        Err(_) => {
                            parse.warnings.push(warn(WarningKind::IncludeReadError));
                        }
                    }
                }
                // Fall through: skipped directive stays in the text stream so
                // the enclosing body matches the origin file.
            }
        }

        out.push(SourceLine {
            origin: Arc::clone(&origin),
            line: line_no,
            text: raw.to_string(),
            dialect,
            literal,
        });
    }

    if !edges.is_empty() {
        parse.include_edges.push((rel.to_string(), edges));
    }
    stack.pop();
}

/// Recognize a heading line in the given dialect.
pub(crate) fn parse_heading(line: &str, dialect: Dialect) -> Option<(u8, String)> {
    let re = match dialect {
        Dialect::Markdown => md_heading_re(),
        Dialect::AsciiDoc => adoc_heading_re(),
    };
    let captures = re.captures(line)?;
    let level = captures[1].len();
    if (1..=6).contains(&level) {
        Some((level as u8, captures[2].to_string()))
    } else {
        None
    }
}

/// Walk the expanded line stream and cut it into heading records.
fn scan_records(lines: &[SourceLine]) -> Vec<HeadingRecord> {
    let mut headings: Vec<(usize, u8, String)> = Vec::new();
    for (index, line) in lines.iter().enumerate() {
        if line.literal {
            continue;
        }
        if let Some((level, title)) = parse_heading(&line.text, line.dialect) {
            headings.push((index, level, title));
        }
    }

    let mut records = Vec::with_capacity(headings.len());
    for (heading_pos, &(index, level, ref title)) in headings.iter().enumerate() {
        let body_end = headings
            .get(heading_pos + 1)
            .map_or(lines.len(), |&(next, _, _)| next);
        let body = &lines[index + 1..body_end];

        // At most one blank line trimmed on each side.
        let mut start = 0;
        let mut end = body.len();
        if start < end && body[start].text.trim().is_empty() {
            start += 1;
        }
        if start < end && body[end - 1].text.trim().is_empty() {
            end -= 1;
        }
        let trimmed = &body[start..end];

        let heading_line = &lines[index];
        let content = trimmed
            .iter()
            .map(|line| line.text.as_str())
            .collect::<Vec<_>>()
            .join("\n");
        let line_end = trimmed
            .iter()
            .rev()
            .find(|line| line.origin == heading_line.origin)
            .map_or(heading_line.line, |line| line.line)
            .max(heading_line.line);

        records.push(HeadingRecord {
            level,
            title: title.clone(),
            origin: heading_line.origin.to_string(),
            line_start: heading_line.line,
            line_end,
            content,
        });
    }
    records
}
