//! Line-oriented diffs between two versions of a section body.
//!
//! Lines compare equal after trailing whitespace and terminators are
//! stripped. Maximal runs of blank lines are compared as single units, so a
//! reshuffled gap shows up as one `changed` record instead of a pile of
//! added/removed blanks.

use serde::Serialize;
use similar::{capture_diff_slices, Algorithm, DiffOp};

/// One line-level change.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "tag", rename_all = "snake_case")]
pub enum DiffRecord {
    Equal {
        /// 1-based line number in the old text.
        old_line: usize,
        /// 1-based line number in the new text.
        new_line: usize,
        text: String,
    },
    Removed {
        old_line: usize,
        text: String,
    },
    Added {
        new_line: usize,
        text: String,
    },
    /// A blank-line run whose length changed.
    Changed {
        old_line: usize,
        new_line: usize,
        old_lines: Vec<String>,
        new_lines: Vec<String>,
    },
}

/// Full change report for one section body.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct DiffReport {
    pub records: Vec<DiffRecord>,
    pub added_lines: usize,
    pub removed_lines: usize,
    pub changed_lines: usize,
    pub has_changes: bool,
}

/// Diff token: a content line, or a maximal run of blank lines.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
enum Item {
    Line(String),
    BlankRun(usize),
}

impl Item {
    fn line_count(&self) -> usize {
        match self {
            Item::Line(_) => 1,
            Item::BlankRun(count) => *count,
        }
    }
}

fn normalized_lines(text: &str) -> Vec<String> {
    if text.is_empty() {
        return Vec::new();
    }
    text.lines().map(|line| line.trim_end().to_string()).collect()
}

fn tokenize(lines: &[String]) -> Vec<Item> {
    let mut items = Vec::new();
    for line in lines {
        if line.is_empty() {
            match items.last_mut() {
                Some(Item::BlankRun(count)) => *count += 1,
                _ => items.push(Item::BlankRun(1)),
            }
        } else {
            items.push(Item::Line(line.clone()));
        }
    }
    items
}

/// 1-based starting line of each item, plus the total line count.
fn line_offsets(items: &[Item]) -> Vec<usize> {
    let mut offsets = Vec::with_capacity(items.len() + 1);
    let mut line = 1;
    for item in items {
        offsets.push(line);
        line += item.line_count();
    }
    offsets.push(line);
    offsets
}

fn blanks(count: usize) -> Vec<String> {
    vec![String::new(); count]
}

/// Diff two section bodies line by line.
#[must_use]
pub fn diff_text(old: &str, new: &str) -> DiffReport {
    let old_items = tokenize(&normalized_lines(old));
    let new_items = tokenize(&normalized_lines(new));
    let old_offsets = line_offsets(&old_items);
    let new_offsets = line_offsets(&new_items);

    let diff = capture_diff_slices(Algorithm::Myers, &old_items, &new_items);

    let mut records = Vec::new();
    let mut added = 0;
    let mut removed = 0;
    let mut changed = 0;

    let push_removed = |records: &mut Vec<DiffRecord>, removed: &mut usize, item: &Item, line: usize| {
        match item {
            Item::Line(text) => {
                *removed += 1;
                records.push(DiffRecord::Removed {
                    old_line: line,
                    text: text.clone(),
                });
            }
            Item::BlankRun(count) => {
                *removed += count;
                for offset in 0..*count {
                    records.push(DiffRecord::Removed {
                        old_line: line + offset,
                        text: String::new(),
                    });
                }
            }
        }
    };
    let push_added = |records: &mut Vec<DiffRecord>, added: &mut usize, item: &Item, line: usize| {
        match item {
            Item::Line(text) => {
                *added += 1;
                records.push(DiffRecord::Added {
                    new_line: line,
                    text: text.clone(),
                });
            }
            Item::BlankRun(count) => {
                *added += count;
                for offset in 0..*count {
                    records.push(DiffRecord::Added {
                        new_line: line + offset,
                        text: String::new(),
                    });
                }
            }
        }
    };

    for op in &diff {
        match *op {
            DiffOp::Equal {
                old_index,
                new_index,
                len,
            } => {
                for offset in 0..len {
                    let item = &old_items[old_index + offset];
                    let mut old_line = old_offsets[old_index + offset];
                    let mut new_line = new_offsets[new_index + offset];
                    for _ in 0..item.line_count() {
                        let text = match item {
                            Item::Line(text) => text.clone(),
                            Item::BlankRun(_) => String::new(),
                        };
                        records.push(DiffRecord::Equal {
                            old_line,
                            new_line,
                            text,
                        });
                        old_line += 1;
                        new_line += 1;
                    }
                }
            }
            DiffOp::Delete {
                old_index, old_len, ..
            } => {
                for offset in 0..old_len {
                    push_removed(
                        &mut records,
                        &mut removed,
                        &old_items[old_index + offset],
                        old_offsets[old_index + offset],
                    );
                }
            }
            DiffOp::Insert {
                new_index, new_len, ..
            } => {
                for offset in 0..new_len {
                    push_added(
                        &mut records,
                        &mut added,
                        &new_items[new_index + offset],
                        new_offsets[new_index + offset],
                    );
                }
            }
            DiffOp::Replace {
                old_index,
                old_len,
                new_index,
                new_len,
            } => {
                let old_run = &old_items[old_index..old_index + old_len];
                let new_run = &new_items[new_index..new_index + new_len];
                let blank_only = |items: &[Item]| {
                    items.iter().all(|item| matches!(item, Item::BlankRun(_)))
                };
                if blank_only(old_run) && blank_only(new_run) {
                    let old_count: usize = old_run.iter().map(Item::line_count).sum();
                    let new_count: usize = new_run.iter().map(Item::line_count).sum();
                    changed += old_count.max(new_count);
                    records.push(DiffRecord::Changed {
                        old_line: old_offsets[old_index],
                        new_line: new_offsets[new_index],
                        old_lines: blanks(old_count),
                        new_lines: blanks(new_count),
                    });
                } else {
                    for offset in 0..old_len {
                        push_removed(
                            &mut records,
                            &mut removed,
                            &old_items[old_index + offset],
                            old_offsets[old_index + offset],
                        );
                    }
                    for offset in 0..new_len {
                        push_added(
                            &mut records,
                            &mut added,
                            &new_items[new_index + offset],
                            new_offsets[new_index + offset],
                        );
                    }
                }
            }
        }
    }

    DiffReport {
        has_changes: added > 0 || removed > 0 || changed > 0,
        added_lines: added,
        removed_lines: removed,
        changed_lines: changed,
        records,
    }
}
