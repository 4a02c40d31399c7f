use std::io;
use std::path::{Path, PathBuf};

use relpack_core::DescriptorError;

use crate::differ::DifferStep;

#[derive(Debug, thiserror::Error)]
pub enum BuildError {
    #[error("configuration error: {0}")]
    Configuration(String),

    #[error(transparent)]
    Descriptor(#[from] DescriptorError),

    #[error("validation failed: {0}")]
    Validation(#[from] ValidationError),

    #[error("systools:{step} aborted with: {reason}")]
    ExternalTool { step: DifferStep, reason: String },

    #[error("directory already exists: {}", .0.display())]
    DirectoryExists(PathBuf),

    #[error("repackaged tarball is missing {}", .0.display())]
    MissingPackageContent(PathBuf),

    #[error("failed to {action} {}", .path.display())]
    Io {
        action: &'static str,
        path: PathBuf,
        #[source]
        source: io::Error,
    },
}

impl BuildError {
    pub(crate) fn io(action: &'static str, path: &Path, source: io::Error) -> Self {
        Self::Io {
            action,
            path: path.to_path_buf(),
            source,
        }
    }
}

/// The consistency checks that gate the pipeline, in the order they run.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ValidationError {
    #[error("previous release directory doesn't exist ({})", .0.display())]
    OldTreeMissing(PathBuf),

    #[error("release directory doesn't exist ({})", .0.display())]
    NewTreeMissing(PathBuf),

    #[error("new and old .rel release names do not match ({new} vs {old})")]
    NameMismatch { new: String, old: String },

    #[error("reltool and .rel release names do not match ({reltool} vs {rel})")]
    DeclaredNameMismatch { reltool: String, rel: String },

    #[error("new and old .rel contain the same version ({0})")]
    VersionUnchanged(String),

    #[error("reltool and .rel versions do not match ({reltool} vs {rel})")]
    DeclaredVersionMismatch { reltool: String, rel: String },
}
