mod context;
mod descriptor;
mod error;
mod term;

pub use context::BuildContext;
pub use descriptor::{
    find_release_manifest, read_rel_identity, read_reltool_identity, rel_identity_from_str,
    reltool_identity_from_str, resolve_tree_identity, ReleaseIdentity,
};
pub use error::DescriptorError;
pub use term::{parse_terms, Term, TermSyntaxError};
