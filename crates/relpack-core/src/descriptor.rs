use std::fmt;
use std::fs;
use std::io;
use std::path::{Path, PathBuf};

use crate::error::DescriptorError;
use crate::term::{parse_terms, Term};

/// `(name, version)` declared by a release descriptor.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ReleaseIdentity {
    pub name: String,
    pub version: String,
}

impl ReleaseIdentity {
    pub fn new(name: impl Into<String>, version: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            version: version.into(),
        }
    }
}

impl fmt::Display for ReleaseIdentity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} {}", self.name, self.version)
    }
}

/// Identity of the first `{rel, Name, Vsn, Apps}` entry of the first `{sys, [...]}` section.
pub fn reltool_identity_from_str(
    input: &str,
    origin: &str,
) -> Result<ReleaseIdentity, DescriptorError> {
    let terms = consult(input, origin)?;
    let sys = terms
        .iter()
        .find_map(|term| term.tagged("sys"))
        .ok_or_else(|| DescriptorError::malformed(origin, "no {sys, [...]} section"))?;
    let [entries] = sys else {
        return Err(DescriptorError::malformed(
            origin,
            "{sys, ...} section must hold exactly one list",
        ));
    };
    let entries = entries
        .as_list()
        .ok_or_else(|| DescriptorError::malformed(origin, "{sys, ...} section is not a list"))?;
    let rel = entries
        .iter()
        .find_map(|entry| entry.tagged("rel"))
        .ok_or_else(|| DescriptorError::malformed(origin, "no {rel, ...} entry in sys section"))?;

    match rel {
        [name, version, _apps] | [name, version, _apps, _] => identity_from_pair(
            name,
            version,
            origin,
            "{rel, Name, Vsn, Apps} expects string name and version",
        ),
        _ => Err(DescriptorError::malformed(
            origin,
            format!("{{rel, ...}} entry has arity {}", rel.len() + 1),
        )),
    }
}

/// Identity from a `{release, {Name, Vsn}, {erts, ErtsVsn}, Apps}` manifest.
pub fn rel_identity_from_str(
    input: &str,
    origin: &str,
) -> Result<ReleaseIdentity, DescriptorError> {
    let terms = consult(input, origin)?;
    let release = match terms.as_slice() {
        [term] => term
            .tagged("release")
            .ok_or_else(|| DescriptorError::malformed(origin, "expected a {release, ...} term"))?,
        _ => {
            return Err(DescriptorError::malformed(
                origin,
                format!("expected exactly one term, found {}", terms.len()),
            ))
        }
    };

    let Some(id) = release.first().and_then(Term::as_tuple) else {
        return Err(DescriptorError::malformed(
            origin,
            "{release, ...} is missing its {Name, Vsn} pair",
        ));
    };
    match id {
        [name, version] => identity_from_pair(
            name,
            version,
            origin,
            "{Name, Vsn} expects string name and version",
        ),
        _ => Err(DescriptorError::malformed(
            origin,
            "{release, ...} is missing its {Name, Vsn} pair",
        )),
    }
}

pub fn read_reltool_identity(path: &Path) -> Result<ReleaseIdentity, DescriptorError> {
    let raw = read_descriptor(path)?;
    reltool_identity_from_str(&raw, &path.display().to_string())
}

pub fn read_rel_identity(path: &Path) -> Result<ReleaseIdentity, DescriptorError> {
    let raw = read_descriptor(path)?;
    rel_identity_from_str(&raw, &path.display().to_string())
}

/// Locates the single `releases/*/<name>.rel` manifest under `tree_root`.
pub fn find_release_manifest(tree_root: &Path, name: &str) -> Result<PathBuf, DescriptorError> {
    let releases = tree_root.join("releases");
    let pattern = releases
        .join("*")
        .join(format!("{name}.rel"))
        .display()
        .to_string();

    let entries = match fs::read_dir(&releases) {
        Ok(entries) => entries,
        Err(err) if err.kind() == io::ErrorKind::NotFound => {
            return Err(DescriptorError::MissingRelease { pattern });
        }
        Err(source) => {
            return Err(DescriptorError::Io {
                path: releases,
                source,
            })
        }
    };

    let mut matches = Vec::new();
    for entry in entries {
        let entry = entry.map_err(|source| DescriptorError::Io {
            path: releases.clone(),
            source,
        })?;
        let candidate = entry.path().join(format!("{name}.rel"));
        if entry.path().is_dir() && candidate.is_file() {
            matches.push(candidate);
        }
    }
    matches.sort();

    match matches.len() {
        0 => Err(DescriptorError::MissingRelease { pattern }),
        1 => Ok(matches.remove(0)),
        _ => Err(DescriptorError::AmbiguousRelease {
            pattern,
            matches: matches
                .iter()
                .map(|path| path.display().to_string())
                .collect(),
        }),
    }
}

/// Resolves and parses the `.rel` manifest for `name` in a release tree.
pub fn resolve_tree_identity(tree_root: &Path, name: &str) -> Result<ReleaseIdentity, DescriptorError> {
    let manifest = find_release_manifest(tree_root, name)?;
    read_rel_identity(&manifest)
}

fn read_descriptor(path: &Path) -> Result<String, DescriptorError> {
    fs::read_to_string(path).map_err(|source| DescriptorError::Io {
        path: path.to_path_buf(),
        source,
    })
}

fn consult(input: &str, origin: &str) -> Result<Vec<Term>, DescriptorError> {
    parse_terms(input).map_err(|err| DescriptorError::Syntax {
        origin: origin.to_string(),
        line: err.line,
    })
}

fn identity_from_pair(
    name: &Term,
    version: &Term,
    origin: &str,
    reason: &str,
) -> Result<ReleaseIdentity, DescriptorError> {
    match (name.as_text(), version.as_text()) {
        (Some(name), Some(version)) if !name.is_empty() && !version.is_empty() => {
            Ok(ReleaseIdentity::new(name, version))
        }
        _ => Err(DescriptorError::malformed(origin, reason)),
    }
}
