use std::collections::BTreeSet;
use std::fmt;
use std::fs;
use std::io;
use std::path::{Path, PathBuf};

use relpack_core::BuildContext;
use tracing::{debug, warn};

use crate::fs_utils::remove_file_if_exists;
use crate::layout::WorkspaceLayout;
use crate::search_path::SearchPathLease;

/// Transient outputs of a build. Declaration order is removal order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum Artifact {
    BootLink,
    StagedManifest,
    BootScript,
    Script,
    Relup,
    ReleasesTree,
    LibTree,
    /// Survives a successful build.
    Package,
}

impl Artifact {
    pub const ALL: [Artifact; 8] = [
        Self::BootLink,
        Self::StagedManifest,
        Self::BootScript,
        Self::Script,
        Self::Relup,
        Self::ReleasesTree,
        Self::LibTree,
        Self::Package,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            Self::BootLink => "boot link",
            Self::StagedManifest => "staged manifest",
            Self::BootScript => "boot script",
            Self::Script => "script",
            Self::Relup => "relup",
            Self::ReleasesTree => "releases tree",
            Self::LibTree => "lib tree",
            Self::Package => "package",
        }
    }

    pub fn path(self, layout: &WorkspaceLayout, context: &BuildContext) -> PathBuf {
        match self {
            Self::BootLink => layout.boot_link_path(context.new_version(), context.name()),
            Self::StagedManifest => layout.staged_rel_path(context.name_ver()),
            Self::BootScript => layout.boot_script_path(context.name_ver()),
            Self::Script => layout.script_path(context.name_ver()),
            Self::Relup => layout.relup_path(),
            Self::ReleasesTree => layout.releases_dir(),
            Self::LibTree => layout.lib_dir(),
            Self::Package => layout.package_path(context.name_ver()),
        }
    }

    fn is_tree(self) -> bool {
        matches!(self, Self::ReleasesTree | Self::LibTree)
    }
}

/// Artifacts a run has created or is about to create; only these are ever removed.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ArtifactLedger {
    recorded: BTreeSet<Artifact>,
}

impl ArtifactLedger {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn record(&mut self, artifact: Artifact) {
        self.recorded.insert(artifact);
    }

    pub fn contains(&self, artifact: Artifact) -> bool {
        self.recorded.contains(&artifact)
    }

    pub fn iter(&self) -> impl Iterator<Item = Artifact> + '_ {
        self.recorded.iter().copied()
    }

    pub fn is_empty(&self) -> bool {
        self.recorded.is_empty()
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CleanupWarning {
    pub path: PathBuf,
    pub action: &'static str,
    pub message: String,
}

impl fmt::Display for CleanupWarning {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "failed to {} {}: {}",
            self.action,
            self.path.display(),
            self.message
        )
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CleanupReport {
    pub removed: Vec<PathBuf>,
    pub warnings: Vec<CleanupWarning>,
    pub search_path_restored: bool,
}

impl CleanupReport {
    pub fn is_clean(&self) -> bool {
        self.warnings.is_empty()
    }

    fn warn(&mut self, path: &Path, action: &'static str, err: &io::Error) {
        warn!(path = %path.display(), action, error = %err, "cleanup step failed");
        self.warnings.push(CleanupWarning {
            path: path.to_path_buf(),
            action,
            message: err.to_string(),
        });
    }
}

/// Removes every recorded artifact best effort, then restores the search path.
/// The package is kept when `keep_package` is set.
pub fn finalize_build(
    layout: &WorkspaceLayout,
    context: &BuildContext,
    ledger: &ArtifactLedger,
    lease: &mut SearchPathLease<'_>,
    keep_package: bool,
) -> CleanupReport {
    let mut report = CleanupReport::default();
    for artifact in ledger.iter() {
        if artifact == Artifact::Package && keep_package {
            continue;
        }
        let path = artifact.path(layout, context);
        if artifact.is_tree() {
            remove_tree_best_effort(&path, &mut report);
        } else {
            match remove_file_if_exists(&path) {
                Ok(()) => {
                    debug!(path = %path.display(), "removed build artifact");
                    report.removed.push(path);
                }
                Err(err) => report.warn(&path, "remove", &err),
            }
        }
    }
    report.search_path_restored = lease.restore();
    report
}

/// Depth-first removal that keeps going past failures and reports each one.
pub fn remove_tree_best_effort(dir: &Path, report: &mut CleanupReport) {
    let entries = match fs::read_dir(dir) {
        Ok(entries) => entries,
        Err(err) if err.kind() == io::ErrorKind::NotFound => return,
        Err(err) => {
            report.warn(dir, "list", &err);
            return;
        }
    };

    for entry in entries {
        let path = match entry {
            Ok(entry) => entry.path(),
            Err(err) => {
                report.warn(dir, "list", &err);
                continue;
            }
        };
        match fs::symlink_metadata(&path) {
            Ok(metadata) if metadata.is_dir() => remove_tree_best_effort(&path, report),
            Ok(_) => match fs::remove_file(&path) {
                Ok(()) => report.removed.push(path),
                Err(err) => report.warn(&path, "remove", &err),
            },
            Err(err) => report.warn(&path, "stat", &err),
        }
    }

    match fs::remove_dir(dir) {
        Ok(()) => {
            debug!(path = %dir.display(), "removed directory");
            report.removed.push(dir.to_path_buf());
        }
        Err(err) => report.warn(dir, "remove directory", &err),
    }
}
