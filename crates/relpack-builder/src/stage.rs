use std::fs;

use relpack_core::BuildContext;
use tracing::{debug, info};

use crate::cleanup::{Artifact, ArtifactLedger};
use crate::error::BuildError;
use crate::layout::WorkspaceLayout;
use crate::search_path::{SearchPathLease, StagedPath};
use crate::validate::ResolvedRelease;

/// Extends the leased search path with both trees and copies the new
/// manifest to `<nameVer>.rel`, where the toolchain looks it up.
pub fn stage_environment(
    layout: &WorkspaceLayout,
    context: &BuildContext,
    resolved: &ResolvedRelease,
    lease: &mut SearchPathLease<'_>,
    ledger: &mut ArtifactLedger,
) -> Result<StagedPath, BuildError> {
    let staged = StagedPath::collect(&resolved.old_tree, &resolved.new_tree).map_err(|err| {
        BuildError::io("expand search path for", resolved.old_tree.root(), err)
    })?;
    let next = staged.applied_to(lease.current());
    lease.install(next);
    info!(
        old_releases = staged.old_releases.len(),
        old_ebins = staged.old_ebins.len(),
        new_ebins = staged.new_ebins.len(),
        new_top_level = staged.new_top_level.len(),
        "staged search path"
    );

    let source = resolved
        .new_tree
        .rel_path(context.new_version(), context.name());
    let destination = layout.staged_rel_path(context.name_ver());
    ledger.record(Artifact::StagedManifest);
    fs::copy(&source, &destination).map_err(|err| BuildError::io("copy", &source, err))?;
    debug!(
        from = %source.display(),
        to = %destination.display(),
        "staged release manifest"
    );
    Ok(staged)
}
