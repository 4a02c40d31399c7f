use std::fs;
use std::io;
use std::path::Path;

use relpack_core::BuildContext;
use tracing::debug;

use crate::cleanup::{Artifact, ArtifactLedger};
use crate::error::BuildError;
use crate::layout::{ReleaseTree, WorkspaceLayout};

/// Lays out `releases/<version>/` at the working-directory root: a relative
/// `<name>.boot -> start.boot` link and a copy of `start_clean.boot`.
pub fn patch_boot_files(
    layout: &WorkspaceLayout,
    context: &BuildContext,
    new_tree: &ReleaseTree,
    ledger: &mut ArtifactLedger,
) -> Result<(), BuildError> {
    let releases_dir = layout.releases_dir();
    create_new_dir(&releases_dir)?;
    ledger.record(Artifact::ReleasesTree);

    let version_dir = layout.release_dir(context.new_version());
    create_new_dir(&version_dir)?;

    let link = layout.boot_link_path(context.new_version(), context.name());
    ledger.record(Artifact::BootLink);
    create_relative_symlink(Path::new("start.boot"), &link)?;
    debug!(link = %link.display(), "linked release boot file");

    let source = new_tree.start_clean_boot_path(context.new_version());
    let destination = layout.start_clean_boot_path(context.new_version());
    fs::copy(&source, &destination).map_err(|err| BuildError::io("copy", &source, err))?;
    debug!(
        from = %source.display(),
        to = %destination.display(),
        "copied start_clean.boot"
    );
    Ok(())
}

fn create_new_dir(path: &Path) -> Result<(), BuildError> {
    match fs::create_dir(path) {
        Ok(()) => Ok(()),
        Err(err) if err.kind() == io::ErrorKind::AlreadyExists => {
            Err(BuildError::DirectoryExists(path.to_path_buf()))
        }
        Err(err) => Err(BuildError::io("create directory", path, err)),
    }
}

#[cfg(unix)]
fn create_relative_symlink(target: &Path, link: &Path) -> Result<(), BuildError> {
    std::os::unix::fs::symlink(target, link).map_err(|err| BuildError::io("symlink", link, err))
}

#[cfg(windows)]
fn create_relative_symlink(target: &Path, link: &Path) -> Result<(), BuildError> {
    std::os::windows::fs::symlink_file(target, link)
        .map_err(|err| BuildError::io("symlink", link, err))
}
