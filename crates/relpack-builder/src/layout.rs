use std::path::{Path, PathBuf};

/// Paths inside the working directory the package is assembled in.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WorkspaceLayout {
    root: PathBuf,
}

impl WorkspaceLayout {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// The freshly assembled release, `./<name>`.
    pub fn new_tree(&self, name: &str) -> ReleaseTree {
        ReleaseTree::new(self.root.join(name))
    }

    /// Relative previous-release paths are taken from the working directory.
    pub fn old_tree(&self, previous_release: &Path) -> ReleaseTree {
        if previous_release.is_absolute() {
            ReleaseTree::new(previous_release)
        } else {
            ReleaseTree::new(self.root.join(previous_release))
        }
    }

    pub fn releases_dir(&self) -> PathBuf {
        self.root.join("releases")
    }

    pub fn release_dir(&self, version: &str) -> PathBuf {
        self.releases_dir().join(version)
    }

    pub fn boot_link_path(&self, version: &str, name: &str) -> PathBuf {
        self.release_dir(version).join(format!("{name}.boot"))
    }

    pub fn start_clean_boot_path(&self, version: &str) -> PathBuf {
        self.release_dir(version).join("start_clean.boot")
    }

    pub fn lib_dir(&self) -> PathBuf {
        self.root.join("lib")
    }

    pub fn relup_path(&self) -> PathBuf {
        self.root.join("relup")
    }

    pub fn staged_rel_path(&self, name_ver: &str) -> PathBuf {
        self.root.join(format!("{name_ver}.rel"))
    }

    pub fn boot_script_path(&self, name_ver: &str) -> PathBuf {
        self.root.join(format!("{name_ver}.boot"))
    }

    pub fn script_path(&self, name_ver: &str) -> PathBuf {
        self.root.join(format!("{name_ver}.script"))
    }

    pub fn package_path(&self, name_ver: &str) -> PathBuf {
        self.root.join(format!("{name_ver}.tar.gz"))
    }
}

/// A directory following the `lib/` + `releases/<version>/` convention.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReleaseTree {
    root: PathBuf,
}

impl ReleaseTree {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn exists(&self) -> bool {
        self.root.is_dir()
    }

    pub fn releases_dir(&self) -> PathBuf {
        self.root.join("releases")
    }

    pub fn release_dir(&self, version: &str) -> PathBuf {
        self.releases_dir().join(version)
    }

    pub fn rel_path(&self, version: &str, name: &str) -> PathBuf {
        self.release_dir(version).join(format!("{name}.rel"))
    }

    pub fn start_clean_boot_path(&self, version: &str) -> PathBuf {
        self.release_dir(version).join("start_clean.boot")
    }

    pub fn lib_dir(&self) -> PathBuf {
        self.root.join("lib")
    }
}
