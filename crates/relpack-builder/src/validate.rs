use std::path::Path;

use relpack_core::{read_reltool_identity, resolve_tree_identity, BuildContext, ReleaseIdentity};
use tracing::debug;

use crate::error::{BuildError, ValidationError};
use crate::layout::{ReleaseTree, WorkspaceLayout};

/// Every identity the consistency checks looked at.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResolvedRelease {
    pub reltool: ReleaseIdentity,
    pub new: ReleaseIdentity,
    pub old: ReleaseIdentity,
    pub new_tree: ReleaseTree,
    pub old_tree: ReleaseTree,
}

impl ResolvedRelease {
    pub fn context(&self) -> BuildContext {
        BuildContext::new(&self.new, &self.old)
    }
}

/// Resolves both trees and runs the consistency checks in order, stopping at the first failure.
/// Nothing is written.
pub fn resolve_and_validate(
    layout: &WorkspaceLayout,
    reltool_config: &Path,
    previous_release: &Path,
) -> Result<ResolvedRelease, BuildError> {
    let old_tree = layout.old_tree(previous_release);
    if !old_tree.exists() {
        return Err(ValidationError::OldTreeMissing(old_tree.root().to_path_buf()).into());
    }

    let reltool = read_reltool_identity(reltool_config)?;
    let new_tree = layout.new_tree(&reltool.name);
    if !new_tree.exists() {
        return Err(ValidationError::NewTreeMissing(new_tree.root().to_path_buf()).into());
    }

    let new = resolve_tree_identity(new_tree.root(), &reltool.name)?;
    let old = resolve_tree_identity(old_tree.root(), &reltool.name)?;
    debug!(%reltool, %new, %old, "resolved release identities");

    check_identities(&reltool, &new, &old)?;
    Ok(ResolvedRelease {
        reltool,
        new,
        old,
        new_tree,
        old_tree,
    })
}

pub fn check_identities(
    reltool: &ReleaseIdentity,
    new: &ReleaseIdentity,
    old: &ReleaseIdentity,
) -> Result<(), ValidationError> {
    if new.name != old.name {
        return Err(ValidationError::NameMismatch {
            new: new.name.clone(),
            old: old.name.clone(),
        });
    }
    if reltool.name != new.name {
        return Err(ValidationError::DeclaredNameMismatch {
            reltool: reltool.name.clone(),
            rel: new.name.clone(),
        });
    }
    if new.version == old.version {
        return Err(ValidationError::VersionUnchanged(new.version.clone()));
    }
    if reltool.version != new.version {
        return Err(ValidationError::DeclaredVersionMismatch {
            reltool: reltool.version.clone(),
            rel: new.version.clone(),
        });
    }
    Ok(())
}
