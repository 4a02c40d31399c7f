use std::fmt;
use std::path::PathBuf;

use relpack_core::BuildContext;
use tracing::{info, warn};

use crate::boot::patch_boot_files;
use crate::cleanup::{finalize_build, Artifact, ArtifactLedger, CleanupReport};
use crate::differ::{run_differ_step, DifferCall, DifferStep, ReleaseDiffer};
use crate::error::BuildError;
use crate::layout::WorkspaceLayout;
use crate::repack::{repackage_tarball, sha256_file_hex};
use crate::search_path::{SearchContext, SearchPathLease, StagedPath};
use crate::stage::stage_environment;
use crate::validate::{resolve_and_validate, ResolvedRelease};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PipelineStage {
    Validate,
    Stage,
    Relup,
    Script,
    Tar,
    BootFiles,
    Repackage,
    Cleanup,
}

impl PipelineStage {
    pub const ALL: [PipelineStage; 8] = [
        Self::Validate,
        Self::Stage,
        Self::Relup,
        Self::Script,
        Self::Tar,
        Self::BootFiles,
        Self::Repackage,
        Self::Cleanup,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            Self::Validate => "validate",
            Self::Stage => "stage",
            Self::Relup => "relup",
            Self::Script => "script",
            Self::Tar => "tar",
            Self::BootFiles => "boot files",
            Self::Repackage => "repackage",
            Self::Cleanup => "cleanup",
        }
    }

    pub fn position(self) -> usize {
        Self::ALL
            .iter()
            .position(|stage| *stage == self)
            .unwrap_or_default()
    }
}

impl fmt::Display for PipelineStage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BuildRequest {
    pub layout: WorkspaceLayout,
    pub reltool_config: PathBuf,
    pub previous_release: PathBuf,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PackageOutcome {
    pub context: BuildContext,
    pub package: PathBuf,
    pub sha256: String,
}

/// The build result plus whatever finalization had to report, kept apart.
#[derive(Debug)]
pub struct BuildReport {
    pub result: Result<PackageOutcome, BuildError>,
    pub cleanup: CleanupReport,
}

/// What a build would do, computed without touching the working directory.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BuildPlan {
    pub resolved: ResolvedRelease,
    pub context: BuildContext,
    pub staged: StagedPath,
    pub search: SearchContext,
    pub artifacts: Vec<(Artifact, PathBuf)>,
    pub package: PathBuf,
}

pub fn plan_upgrade_package(
    request: &BuildRequest,
    search: &SearchContext,
) -> Result<BuildPlan, BuildError> {
    let resolved = resolve_and_validate(
        &request.layout,
        &request.reltool_config,
        &request.previous_release,
    )?;
    let context = resolved.context();
    let staged = StagedPath::collect(&resolved.old_tree, &resolved.new_tree).map_err(|err| {
        BuildError::io("expand search path for", resolved.old_tree.root(), err)
    })?;
    let artifacts = Artifact::ALL
        .into_iter()
        .map(|artifact| (artifact, artifact.path(&request.layout, &context)))
        .collect();

    Ok(BuildPlan {
        search: staged.applied_to(search),
        package: request.layout.package_path(context.name_ver()),
        resolved,
        context,
        staged,
        artifacts,
    })
}

pub fn build_upgrade_package(
    request: &BuildRequest,
    differ: &dyn ReleaseDiffer,
    search: &mut SearchContext,
) -> BuildReport {
    build_upgrade_package_with_hooks(request, differ, search, |_| {})
}

/// Runs every stage in order. Once staging begins, finalization (artifact
/// removal and search path restore) runs whatever the outcome.
pub fn build_upgrade_package_with_hooks<OnStage>(
    request: &BuildRequest,
    differ: &dyn ReleaseDiffer,
    search: &mut SearchContext,
    mut on_stage: OnStage,
) -> BuildReport
where
    OnStage: FnMut(PipelineStage),
{
    on_stage(PipelineStage::Validate);
    let resolved = match resolve_and_validate(
        &request.layout,
        &request.reltool_config,
        &request.previous_release,
    ) {
        Ok(resolved) => resolved,
        Err(error) => {
            return BuildReport {
                result: Err(error),
                cleanup: CleanupReport::default(),
            }
        }
    };
    let context = resolved.context();
    info!(
        name = context.name(),
        from = context.old_version(),
        to = context.new_version(),
        "building upgrade package"
    );

    let mut ledger = ArtifactLedger::new();
    let mut lease = SearchPathLease::acquire(search);
    let result = run_stages(
        request,
        differ,
        &resolved,
        &context,
        &mut lease,
        &mut ledger,
        &mut on_stage,
    );
    if let Err(error) = &result {
        warn!(%error, "build failed, rolling back");
    }

    on_stage(PipelineStage::Cleanup);
    let cleanup = finalize_build(
        &request.layout,
        &context,
        &ledger,
        &mut lease,
        result.is_ok(),
    );
    BuildReport { result, cleanup }
}

fn run_stages<OnStage>(
    request: &BuildRequest,
    differ: &dyn ReleaseDiffer,
    resolved: &ResolvedRelease,
    context: &BuildContext,
    lease: &mut SearchPathLease<'_>,
    ledger: &mut ArtifactLedger,
    on_stage: &mut OnStage,
) -> Result<PackageOutcome, BuildError>
where
    OnStage: FnMut(PipelineStage),
{
    let layout = &request.layout;

    on_stage(PipelineStage::Stage);
    stage_environment(layout, context, resolved, lease, ledger)?;

    let call = DifferCall {
        release: context.name_ver(),
        work_dir: layout.root(),
        search: lease.current(),
    };
    let releases = vec![context.name().to_string()];

    on_stage(PipelineStage::Relup);
    ledger.record(Artifact::Relup);
    run_differ_step(DifferStep::Relup, || {
        differ.make_relup(&call, &releases, &releases)
    })?;

    on_stage(PipelineStage::Script);
    ledger.record(Artifact::BootScript);
    ledger.record(Artifact::Script);
    run_differ_step(DifferStep::Script, || differ.make_script(&call))?;

    on_stage(PipelineStage::Tar);
    ledger.record(Artifact::Package);
    run_differ_step(DifferStep::Tar, || differ.make_tar(&call))?;

    on_stage(PipelineStage::BootFiles);
    patch_boot_files(layout, context, &resolved.new_tree, ledger)?;

    on_stage(PipelineStage::Repackage);
    repackage_tarball(layout, context, ledger)?;

    let package = layout.package_path(context.name_ver());
    let sha256 = sha256_file_hex(&package)?;
    info!(package = %package.display(), %sha256, "upgrade package ready");
    Ok(PackageOutcome {
        context: context.clone(),
        package,
        sha256,
    })
}
