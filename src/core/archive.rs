/// Backup archive format
///
/// A backup is a gzip compressed tar file with a single root folder named
/// exactly like the archive file itself, e.g. `nightly.tar.gz/`. Restore relies
/// on that name to tell a real backup apart from an arbitrary tarball.
///
/// ```text
/// nightly.tar.gz/
///   everything_but_user_tables/   pg_dump -Fd output
///   user_tables_batch_0/          pg_dump -Fd output
///   user_tables_batch_1/
///   ...
/// ```

use std::collections::BTreeSet;
use std::fs::{self, File};
use std::io;
use std::path::{Component, Path, PathBuf};

use flate2::read::GzDecoder;
use flate2::write::GzEncoder;
use flate2::Compression;
use serde::Serialize;
use tar::{Archive, Builder};

use crate::core::error::{BackupError, Result};
use crate::core::restore::compare_batch_names;
use crate::utils::NO_USER_TABLES_BACKUP_SUB_FOLDER;

/// Layout of a backup archive, read without extracting it
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ArchiveManifest {
    pub root: String,
    pub has_shared_dump: bool,
    pub batches: Vec<String>,
    pub entries: usize,
    pub size_bytes: u64,
}

/// Name of the root folder expected inside `archive_path`
pub fn archive_root_name(archive_path: &Path) -> Option<String> {
    archive_path
        .file_name()
        .map(|name| name.to_string_lossy().into_owned())
}

/// Tar and gzip `source_dir` into `archive_path` under the self-named root.
///
/// Returns the size of the written archive. On error a partially written
/// file may be left behind; the caller owns its cleanup.
pub fn pack(source_dir: &Path, archive_path: &Path) -> Result<u64> {
    let root_name = archive_root_name(archive_path).ok_or_else(|| {
        io::Error::new(
            io::ErrorKind::InvalidInput,
            format!("{} is not a file path", archive_path.display()),
        )
    })?;

    let file = File::create(archive_path)?;
    let encoder = GzEncoder::new(file, Compression::default());
    let mut builder = Builder::new(encoder);

    builder.append_dir_all(&root_name, source_dir)?;

    let file = builder.into_inner()?.finish()?;
    file.sync_all()?;

    Ok(fs::metadata(archive_path)?.len())
}

/// Extract `archive_path` into `destination_dir` and return the root folder
pub fn unpack(archive_path: &Path, destination_dir: &Path) -> Result<PathBuf> {
    extract(archive_path, destination_dir)?;
    locate_root(archive_path, destination_dir)
}

/// Extract every entry of `archive_path` into `destination_dir`
pub fn extract(archive_path: &Path, destination_dir: &Path) -> Result<()> {
    let file = File::open(archive_path)?;
    let mut archive = Archive::new(GzDecoder::new(file));
    archive.unpack(destination_dir)?;
    Ok(())
}

/// The self-named root folder of an archive extracted into `destination_dir`
pub fn locate_root(archive_path: &Path, destination_dir: &Path) -> Result<PathBuf> {
    let expected = archive_root_name(archive_path).unwrap_or_default();

    let root = destination_dir.join(&expected);
    if expected.is_empty() || !root.is_dir() {
        return Err(BackupError::InvalidArchive {
            expected,
            archive: archive_path.to_path_buf(),
        });
    }

    Ok(root)
}

/// Describe the archive's layout, validating its root folder name
pub fn read_manifest(archive_path: &Path) -> Result<ArchiveManifest> {
    let expected = archive_root_name(archive_path).unwrap_or_default();

    let file = File::open(archive_path)?;
    let size_bytes = file.metadata()?.len();
    let mut archive = Archive::new(GzDecoder::new(file));

    let mut roots = BTreeSet::new();
    let mut children = BTreeSet::new();
    let mut entries = 0;

    for entry in archive.entries()? {
        let entry = entry?;
        let is_dir = entry.header().entry_type().is_dir();
        let path = entry.path()?;
        let mut parts = path.components().filter_map(|c| match c {
            Component::Normal(part) => Some(part.to_string_lossy().into_owned()),
            _ => None,
        });

        if let Some(root) = parts.next() {
            roots.insert(root);
        }
        // Only directories count, the same as on restore
        if let Some(child) = parts.next() {
            if is_dir || parts.next().is_some() {
                children.insert(child);
            }
        }
        entries += 1;
    }

    if roots.len() != 1 || !roots.contains(&expected) {
        return Err(BackupError::InvalidArchive {
            expected,
            archive: archive_path.to_path_buf(),
        });
    }

    let has_shared_dump = children.remove(NO_USER_TABLES_BACKUP_SUB_FOLDER);
    let mut batches: Vec<String> = children.into_iter().collect();
    batches.sort_by(|a, b| compare_batch_names(a, b));

    Ok(ArchiveManifest {
        root: expected,
        has_shared_dump,
        batches,
        entries,
        size_bytes,
    })
}
