use std::fs::{self, File};
use std::io::{self, BufReader, BufWriter};
use std::path::Path;

use flate2::read::GzDecoder;
use flate2::{Compression, GzBuilder};
use relpack_core::BuildContext;
use sha2::{Digest, Sha256};
use tar::{Archive, Builder, EntryType, Header};
use tracing::debug;

use crate::cleanup::{Artifact, ArtifactLedger};
use crate::error::BuildError;
use crate::fs_utils::sorted_entries;
use crate::layout::WorkspaceLayout;

/// Top-level entries of the deliverable, in archive order.
pub const PACKAGE_ROOTS: [&str; 2] = ["lib", "releases"];

/// Unpacks the toolchain tarball into the working directory and rewrites it
/// with exactly `lib/` and `releases/`, including the patched boot layout.
pub fn repackage_tarball(
    layout: &WorkspaceLayout,
    context: &BuildContext,
    ledger: &mut ArtifactLedger,
) -> Result<(), BuildError> {
    let package = layout.package_path(context.name_ver());
    let lib_dir = layout.lib_dir();
    if lib_dir.exists() {
        return Err(BuildError::DirectoryExists(lib_dir));
    }

    ledger.record(Artifact::LibTree);
    extract_tar_gz(&package, layout.root())?;
    fs::remove_file(&package).map_err(|err| BuildError::io("remove", &package, err))?;
    debug!(package = %package.display(), "unpacked raw toolchain tarball");

    for root in PACKAGE_ROOTS {
        let path = layout.root().join(root);
        if !path.is_dir() {
            return Err(BuildError::MissingPackageContent(path));
        }
    }
    write_deterministic_tar_gz(layout.root(), &PACKAGE_ROOTS, &package)?;
    debug!(package = %package.display(), "wrote repackaged tarball");
    Ok(())
}

pub fn extract_tar_gz(archive_path: &Path, dst: &Path) -> Result<(), BuildError> {
    let file = File::open(archive_path).map_err(|err| BuildError::io("open", archive_path, err))?;
    let mut archive = Archive::new(GzDecoder::new(BufReader::new(file)));
    archive.set_preserve_permissions(true);
    archive
        .unpack(dst)
        .map_err(|err| BuildError::io("extract", archive_path, err))
}

/// Entries sorted by path with zeroed ownership and timestamps, so identical
/// trees always produce identical bytes.
pub fn write_deterministic_tar_gz(
    base: &Path,
    roots: &[&str],
    archive_path: &Path,
) -> Result<(), BuildError> {
    let file =
        File::create(archive_path).map_err(|err| BuildError::io("create", archive_path, err))?;
    let encoder = GzBuilder::new().write(BufWriter::new(file), Compression::default());
    let mut builder = Builder::new(encoder);
    for root in roots {
        append_tree(&mut builder, base, Path::new(root))
            .map_err(|err| BuildError::io("archive", &base.join(root), err))?;
    }

    let encoder = builder
        .into_inner()
        .map_err(|err| BuildError::io("finish", archive_path, err))?;
    let writer = encoder
        .finish()
        .map_err(|err| BuildError::io("compress", archive_path, err))?;
    writer
        .into_inner()
        .map_err(|err| BuildError::io("flush", archive_path, err.into_error()))?
        .sync_all()
        .map_err(|err| BuildError::io("sync", archive_path, err))
}

fn append_tree<W: io::Write>(builder: &mut Builder<W>, base: &Path, rel: &Path) -> io::Result<()> {
    let path = base.join(rel);
    let metadata = fs::symlink_metadata(&path)?;

    if metadata.file_type().is_symlink() {
        let target = fs::read_link(&path)?;
        let mut header = normalized_header(EntryType::Symlink, 0o777, 0);
        return builder.append_link(&mut header, rel, target);
    }

    if metadata.is_dir() {
        let mut header = normalized_header(EntryType::Directory, 0o755, 0);
        builder.append_data(&mut header, rel, io::empty())?;
        for child in sorted_entries(&path)? {
            let Some(name) = child.file_name() else {
                continue;
            };
            append_tree(builder, base, &rel.join(name))?;
        }
        return Ok(());
    }

    let mode = if is_executable(&metadata) { 0o755 } else { 0o644 };
    let mut header = normalized_header(EntryType::Regular, mode, metadata.len());
    let file = File::open(&path)?;
    builder.append_data(&mut header, rel, BufReader::new(file))
}

fn normalized_header(entry_type: EntryType, mode: u32, size: u64) -> Header {
    let mut header = Header::new_gnu();
    header.set_entry_type(entry_type);
    header.set_mode(mode);
    header.set_size(size);
    header.set_mtime(0);
    header.set_uid(0);
    header.set_gid(0);
    header
}

#[cfg(unix)]
fn is_executable(metadata: &fs::Metadata) -> bool {
    use std::os::unix::fs::PermissionsExt;

    metadata.permissions().mode() & 0o111 != 0
}

#[cfg(not(unix))]
fn is_executable(_metadata: &fs::Metadata) -> bool {
    false
}

pub fn sha256_file_hex(path: &Path) -> Result<String, BuildError> {
    let file = File::open(path).map_err(|err| BuildError::io("open", path, err))?;
    let mut hasher = Sha256::new();
    io::copy(&mut BufReader::new(file), &mut hasher)
        .map_err(|err| BuildError::io("hash", path, err))?;
    Ok(hex::encode(hasher.finalize()))
}
