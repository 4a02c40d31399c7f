use std::io;
use std::path::{Path, PathBuf};

use tracing::debug;

use crate::fs_utils::sorted_subdirs;
use crate::layout::ReleaseTree;

/// Ordered module search path handed to the differencing toolchain.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SearchContext {
    entries: Vec<PathBuf>,
}

impl SearchContext {
    pub fn new(entries: impl IntoIterator<Item = PathBuf>) -> Self {
        let mut context = Self::default();
        context.append(entries);
        context
    }

    pub fn entries(&self) -> &[PathBuf] {
        &self.entries
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Appends at the end, skipping entries already present (first match wins on lookup).
    pub fn append(&mut self, entries: impl IntoIterator<Item = PathBuf>) {
        for entry in entries {
            if !self.entries.contains(&entry) {
                self.entries.push(entry);
            }
        }
    }

    pub fn with_appended(&self, entries: impl IntoIterator<Item = PathBuf>) -> Self {
        let mut next = self.clone();
        next.append(entries);
        next
    }
}

/// Directories staged for the differencing run, in lookup order.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct StagedPath {
    pub old_releases: Vec<PathBuf>,
    pub old_ebins: Vec<PathBuf>,
    pub new_ebins: Vec<PathBuf>,
    pub new_top_level: Vec<PathBuf>,
}

impl StagedPath {
    pub fn collect(old_tree: &ReleaseTree, new_tree: &ReleaseTree) -> io::Result<Self> {
        Ok(Self {
            old_releases: sorted_subdirs(&old_tree.releases_dir())?,
            old_ebins: ebin_dirs(&old_tree.lib_dir())?,
            new_ebins: ebin_dirs(&new_tree.lib_dir())?,
            new_top_level: sorted_subdirs(new_tree.root())?,
        })
    }

    pub fn entries(&self) -> impl Iterator<Item = &PathBuf> {
        self.old_releases
            .iter()
            .chain(&self.old_ebins)
            .chain(&self.new_ebins)
            .chain(&self.new_top_level)
    }

    /// A new context: `base` followed by the staged groups.
    pub fn applied_to(&self, base: &SearchContext) -> SearchContext {
        base.with_appended(self.entries().cloned())
    }
}

fn ebin_dirs(lib_dir: &Path) -> io::Result<Vec<PathBuf>> {
    Ok(sorted_subdirs(lib_dir)?
        .into_iter()
        .map(|app_dir| app_dir.join("ebin"))
        .filter(|ebin| ebin.is_dir())
        .collect())
}

/// Installs a staged path over a caller-owned [`SearchContext`] and puts the
/// snapshot back exactly once, at the latest when the lease is dropped.
#[derive(Debug)]
pub struct SearchPathLease<'a> {
    search: &'a mut SearchContext,
    snapshot: Option<SearchContext>,
}

impl<'a> SearchPathLease<'a> {
    pub fn acquire(search: &'a mut SearchContext) -> Self {
        let snapshot = search.clone();
        debug!(entries = snapshot.len(), "captured search path snapshot");
        Self {
            search,
            snapshot: Some(snapshot),
        }
    }

    pub fn install(&mut self, staged: SearchContext) {
        debug!(entries = staged.len(), "installing staged search path");
        *self.search = staged;
    }

    pub fn current(&self) -> &SearchContext {
        self.search
    }

    pub fn snapshot(&self) -> Option<&SearchContext> {
        self.snapshot.as_ref()
    }

    /// Returns `false` when the snapshot was already restored.
    pub fn restore(&mut self) -> bool {
        let Some(snapshot) = self.snapshot.take() else {
            return false;
        };
        debug!(entries = snapshot.len(), "restoring search path snapshot");
        *self.search = snapshot;
        true
    }
}

impl Drop for SearchPathLease<'_> {
    fn drop(&mut self) {
        self.restore();
    }
}
