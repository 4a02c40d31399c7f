use crate::descriptor::ReleaseIdentity;

/// Names and versions every build stage derives its paths from.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BuildContext {
    name: String,
    new_version: String,
    old_version: String,
    name_ver: String,
}

impl BuildContext {
    /// Built from the already validated new and old identities.
    pub fn new(new: &ReleaseIdentity, old: &ReleaseIdentity) -> Self {
        Self {
            name: new.name.clone(),
            new_version: new.version.clone(),
            old_version: old.version.clone(),
            name_ver: format!("{}_{}", new.name, new.version),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn new_version(&self) -> &str {
        &self.new_version
    }

    pub fn old_version(&self) -> &str {
        &self.old_version
    }

    /// `<name>_<newVersion>`, the stem of every artifact the toolchain writes.
    pub fn name_ver(&self) -> &str {
        &self.name_ver
    }

    pub fn package_file_name(&self) -> String {
        format!("{}.tar.gz", self.name_ver)
    }
}
