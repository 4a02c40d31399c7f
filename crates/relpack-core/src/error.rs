use std::io;
use std::path::PathBuf;

#[derive(Debug, thiserror::Error)]
pub enum DescriptorError {
    #[error("failed to parse {origin}: syntax error on line {line}")]
    Syntax { origin: String, line: usize },

    #[error("malformed descriptor {origin}: {reason}")]
    MalformedConfig { origin: String, reason: String },

    #[error("no release manifest matches {pattern}")]
    MissingRelease { pattern: String },

    #[error("release manifest lookup {pattern} is ambiguous: {}", .matches.join(", "))]
    AmbiguousRelease {
        pattern: String,
        matches: Vec<String>,
    },

    #[error("failed to read {}", .path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
}

impl DescriptorError {
    pub(crate) fn malformed(origin: &str, reason: impl Into<String>) -> Self {
        Self::MalformedConfig {
            origin: origin.to_string(),
            reason: reason.into(),
        }
    }
}
