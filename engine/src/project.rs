//! Shared ownership of the project index.
//!
//! [`Project`] is the single process-wide owner of the mutable
//! [`ProjectIndex`], guarded by one reader-writer lock. Queries take the
//! lock shared for their whole duration; refreshes and edits take it
//! exclusive, so readers observe either the pre- or post-refresh state and
//! never a partial one.

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex, PoisonError, RwLock};
use std::time::{Duration, Instant};

use serde::Serialize;

use docweaver_types::EngineError;

use crate::index::ProjectIndex;

/// How long an editor-written path shadows watcher echo events.
pub const SUPPRESSION_TTL: Duration = Duration::from_secs(2);

/// Result of a forced full refresh.
#[derive(Debug, Clone, Serialize)]
pub struct RefreshReport {
    pub success: bool,
    pub old_section_count: usize,
    pub new_section_count: usize,
}

/// The process-wide documentation project.
#[derive(Debug)]
pub struct Project {
    root: PathBuf,
    index: RwLock<ProjectIndex>,
    /// Paths the editor just wrote, so the watcher can drop the echo.
    suppressed: Mutex<HashMap<PathBuf, Instant>>,
}

impl Project {
    /// Discover and fully parse the project under `root`.
    pub fn open(root: impl Into<PathBuf>) -> Result<Arc<Self>, EngineError> {
        let root: PathBuf = root.into();
        let root = root
            .canonicalize()
            .map_err(|err| EngineError::io(root.display().to_string(), err))?;
        if !root.is_dir() {
            return Err(EngineError::InvalidArgument(format!(
                "project root is not a directory: {}",
                root.display()
            )));
        }
        let index = ProjectIndex::build(&root)?;
        Ok(Arc::new(Self {
            root,
            index: RwLock::new(index),
            suppressed: Mutex::new(HashMap::new()),
        }))
    }

    #[must_use]
    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Run a read-only operation under the shared lock.
    pub fn read<R>(&self, op: impl FnOnce(&ProjectIndex) -> R) -> R {
        let guard = self
            .index
            .read()
            .unwrap_or_else(PoisonError::into_inner);
        op(&guard)
    }

    /// Run a mutation under the exclusive lock.
    pub(crate) fn write<R>(&self, op: impl FnOnce(&mut ProjectIndex) -> R) -> R {
        let mut guard = self
            .index
            .write()
            .unwrap_or_else(PoisonError::into_inner);
        op(&mut guard)
    }

    /// Targeted refresh for a batch of changed absolute paths.
    pub fn refresh_paths(&self, changed: &[PathBuf]) -> Result<(), EngineError> {
        self.write(|index| index.refresh_paths(changed))
    }

    /// Forced full re-discovery and re-parse.
    pub fn refresh_full(&self) -> Result<RefreshReport, EngineError> {
        self.write(|index| {
            let old_section_count = index.section_count();
            index.rebuild_all()?;
            Ok(RefreshReport {
                success: true,
                old_section_count,
                new_section_count: index.section_count(),
            })
        })
    }

    /// Record an editor-initiated write so the watcher discards its echo.
    pub fn suppress_watch(&self, path: &Path) {
        let mut map = self
            .suppressed
            .lock()
            .unwrap_or_else(PoisonError::into_inner);
        map.retain(|_, stamp| stamp.elapsed() < SUPPRESSION_TTL);
        map.insert(path.to_path_buf(), Instant::now());
    }

    /// Whether a watcher event for `path` is a self-edit echo.
    #[must_use]
    pub fn is_suppressed(&self, path: &Path) -> bool {
        let mut map = self
            .suppressed
            .lock()
            .unwrap_or_else(PoisonError::into_inner);
        match map.get(path) {
            Some(stamp) if stamp.elapsed() < SUPPRESSION_TTL => true,
            Some(_) => {
                map.remove(path);
                false
            }
            None => false,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;

    #[test]
    fn open_fails_on_missing_root() {
        let err = Project::open("/definitely/not/a/real/path").unwrap_err();
        assert_eq!(err.kind(), "io_error");
    }

    #[test]
    fn open_builds_a_readable_index() {
        let dir = tempfile::tempdir().unwrap();
        fs::write(dir.path().join("main.adoc"), "= Intro\n\nHello.\n").unwrap();
        let project = Project::open(dir.path()).unwrap();
        let count = project.read(ProjectIndex::section_count);
        assert_eq!(count, 1);
    }

    #[test]
    fn refresh_full_reports_section_counts() {
        let dir = tempfile::tempdir().unwrap();
        fs::write(dir.path().join("main.adoc"), "= Intro\n").unwrap();
        let project = Project::open(dir.path()).unwrap();

        fs::write(dir.path().join("more.md"), "# More\n\n## Deep\n").unwrap();
        let report = project.refresh_full().unwrap();
        assert!(report.success);
        assert_eq!(report.old_section_count, 1);
        assert_eq!(report.new_section_count, 3);
    }

    #[test]
    fn suppression_expires() {
        let dir = tempfile::tempdir().unwrap();
        fs::write(dir.path().join("main.adoc"), "= Intro\n").unwrap();
        let project = Project::open(dir.path()).unwrap();

        let path = dir.path().join("main.adoc");
        assert!(!project.is_suppressed(&path));
        project.suppress_watch(&path);
        assert!(project.is_suppressed(&path));
    }
}
