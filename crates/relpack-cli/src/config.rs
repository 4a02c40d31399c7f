use std::ffi::OsString;
use std::fs;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use relpack_builder::{BuildError, BuildRequest, WorkspaceLayout};
use serde::Deserialize;

use crate::BuildArgs;

pub(crate) const DEFAULT_CONFIG_FILE: &str = "relpack.toml";
pub(crate) const PREVIOUS_RELEASE_ENV: &str = "RELPACK_PREVIOUS_RELEASE";
const DEFAULT_ERL: &str = "erl";

/// Contents of `relpack.toml`.
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
#[serde(deny_unknown_fields)]
pub(crate) struct RelpackConfig {
    pub(crate) previous_release: Option<PathBuf>,
    pub(crate) erl: Option<PathBuf>,
    /// Base code search path, restored after every build.
    #[serde(default)]
    pub(crate) code_path: Vec<PathBuf>,
    pub(crate) work_dir: Option<PathBuf>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) struct BuildSettings {
    pub(crate) work_dir: PathBuf,
    pub(crate) previous_release: PathBuf,
    pub(crate) erl: PathBuf,
    pub(crate) code_path: Vec<PathBuf>,
}

impl BuildSettings {
    pub(crate) fn request(&self, reltool_config: &Path) -> BuildRequest {
        BuildRequest {
            layout: WorkspaceLayout::new(&self.work_dir),
            reltool_config: reltool_config.to_path_buf(),
            previous_release: self.previous_release.clone(),
        }
    }
}

pub(crate) fn parse_config(raw: &str, origin: &Path) -> Result<RelpackConfig> {
    toml::from_str(raw).with_context(|| format!("failed to parse config: {}", origin.display()))
}

/// Reads `explicit`, or `relpack.toml` in `cwd` when it exists.
pub(crate) fn load_config(explicit: Option<&Path>, cwd: &Path) -> Result<RelpackConfig> {
    let path = match explicit {
        Some(path) => path.to_path_buf(),
        None => {
            let default = cwd.join(DEFAULT_CONFIG_FILE);
            if !default.is_file() {
                return Ok(RelpackConfig::default());
            }
            default
        }
    };
    let raw = fs::read_to_string(&path)
        .with_context(|| format!("failed to read config: {}", path.display()))?;
    parse_config(&raw, &path)
}

/// Flags win over the environment, which wins over the config file.
pub(crate) fn resolve_build_settings(
    args: &BuildArgs,
    config: &RelpackConfig,
    env_previous_release: Option<OsString>,
    cwd: &Path,
) -> Result<BuildSettings, BuildError> {
    let previous_release = args
        .previous_release
        .clone()
        .or_else(|| {
            env_previous_release
                .filter(|value| !value.is_empty())
                .map(PathBuf::from)
        })
        .or_else(|| config.previous_release.clone())
        .ok_or_else(|| {
            BuildError::Configuration(format!(
                "previous_release is not set; pass --previous-release, set {PREVIOUS_RELEASE_ENV} or add it to {DEFAULT_CONFIG_FILE}"
            ))
        })?;

    let work_dir = args
        .work_dir
        .clone()
        .or_else(|| config.work_dir.clone())
        .map(|dir| if dir.is_absolute() { dir } else { cwd.join(dir) })
        .unwrap_or_else(|| cwd.to_path_buf());
    let erl = args
        .erl
        .clone()
        .or_else(|| config.erl.clone())
        .unwrap_or_else(|| PathBuf::from(DEFAULT_ERL));

    Ok(BuildSettings {
        work_dir,
        previous_release,
        erl,
        code_path: config.code_path.clone(),
    })
}
