mod boot;
mod cleanup;
mod differ;
mod error;
mod fs_utils;
mod layout;
mod pipeline;
mod repack;
mod search_path;
mod stage;
mod systools;
mod validate;

pub use boot::patch_boot_files;
pub use cleanup::{
    finalize_build, remove_tree_best_effort, Artifact, ArtifactLedger, CleanupReport,
    CleanupWarning,
};
pub use differ::{DifferCall, DifferError, DifferStep, ReleaseDiffer};
pub use error::{BuildError, ValidationError};
pub use fs_utils::remove_file_if_exists;
pub use layout::{ReleaseTree, WorkspaceLayout};
pub use pipeline::{
    build_upgrade_package, build_upgrade_package_with_hooks, plan_upgrade_package, BuildPlan,
    BuildReport, BuildRequest, PackageOutcome, PipelineStage,
};
pub use repack::{
    extract_tar_gz, repackage_tarball, sha256_file_hex, write_deterministic_tar_gz,
    PACKAGE_ROOTS,
};
pub use search_path::{SearchContext, SearchPathLease, StagedPath};
pub use stage::stage_environment;
pub use systools::ErlSystools;
pub use validate::{check_identities, resolve_and_validate, ResolvedRelease};

#[cfg(test)]
mod tests;
