use std::fmt;
use std::path::Path;

use tracing::{debug, info};

use crate::error::BuildError;
use crate::search_path::SearchContext;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum DifferStep {
    Relup,
    Script,
    Tar,
}

impl DifferStep {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Relup => "make_relup",
            Self::Script => "make_script",
            Self::Tar => "make_tar",
        }
    }
}

impl fmt::Display for DifferStep {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// `{error, Reason}` as reported by the toolchain; `reason` is kept verbatim.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DifferError {
    pub tag: String,
    pub reason: String,
}

impl DifferError {
    pub fn new(tag: impl Into<String>, reason: impl Into<String>) -> Self {
        Self {
            tag: tag.into(),
            reason: reason.into(),
        }
    }
}

/// Arguments shared by every toolchain call.
#[derive(Debug, Clone, Copy)]
pub struct DifferCall<'a> {
    /// Release file stem resolved in `work_dir`, `<name>_<newVersion>`.
    pub release: &'a str,
    pub work_dir: &'a Path,
    pub search: &'a SearchContext,
}

/// The release-differencing toolchain, always driven in silent mode.
pub trait ReleaseDiffer {
    /// Writes `relup` into the working directory.
    fn make_relup(
        &self,
        call: &DifferCall<'_>,
        up_from: &[String],
        down_to: &[String],
    ) -> Result<(), DifferError>;

    /// Writes `<release>.boot` and `<release>.script`.
    fn make_script(&self, call: &DifferCall<'_>) -> Result<(), DifferError>;

    /// Writes the raw `<release>.tar.gz`.
    fn make_tar(&self, call: &DifferCall<'_>) -> Result<(), DifferError>;
}

pub(crate) fn run_differ_step<F>(step: DifferStep, invoke: F) -> Result<(), BuildError>
where
    F: FnOnce() -> Result<(), DifferError>,
{
    debug!(step = step.as_str(), "invoking differencing toolchain");
    match invoke() {
        Ok(()) => {
            info!(step = step.as_str(), "differencing step finished");
            Ok(())
        }
        Err(err) => Err(BuildError::ExternalTool {
            step,
            reason: err.reason,
        }),
    }
}
