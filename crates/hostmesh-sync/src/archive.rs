// Copyright (C) 2025 SyncMyOrders Sp. z o.o.
// SPDX-License-Identifier: AGPL-3.0-or-later
//! In-memory tar.gz archives.
//!
//! Push archives are deterministic: entries are sorted, and owner, group and
//! mtime are zeroed, so the same tree always produces the same bytes.
//! Anything under `secrets/` is packed owner-only.

use flate2::Compression;
use flate2::read::GzDecoder;
use flate2::write::GzEncoder;
use std::fs;
use std::io::Read;
use std::path::{Component, Path};
use tar::{Archive, Builder, EntryType, Header};
use tracing::debug;

use crate::error::{Result, SyncError};

const DIR_MODE: u32 = 0o755;
const FILE_MODE: u32 = 0o644;
const SECRET_DIR_MODE: u32 = 0o700;
const SECRET_FILE_MODE: u32 = 0o600;
const SECRETS_DIR: &str = "secrets";

/// Pack the named top-level directories of `base` into a tar.gz.
///
/// Missing directories are skipped. Entry paths are relative to `base`.
pub fn pack_dirs(base: &Path, dirs: &[&str]) -> Result<Vec<u8>> {
    let encoder = GzEncoder::new(Vec::new(), Compression::default());
    let mut builder = Builder::new(encoder);

    for dir in dirs {
        let root = base.join(dir);
        if !root.is_dir() {
            debug!(path = %root.display(), "Skipping missing directory");
            continue;
        }
        append_dir(&mut builder, &root, Path::new(dir))?;
    }

    let encoder = builder
        .into_inner()
        .map_err(|e| SyncError::Archive(e.to_string()))?;
    encoder
        .finish()
        .map_err(|e| SyncError::Archive(e.to_string()))
}

fn append_dir<W: std::io::Write>(
    builder: &mut Builder<W>,
    source: &Path,
    archive_path: &Path,
) -> Result<()> {
    let (dir_mode, file_mode) = if is_secret(archive_path) {
        (SECRET_DIR_MODE, SECRET_FILE_MODE)
    } else {
        (DIR_MODE, FILE_MODE)
    };
    append_header(builder, archive_path, EntryType::Directory, dir_mode, &[])?;

    let mut children: Vec<_> = fs::read_dir(source)
        .map_err(|e| SyncError::io(source, e))?
        .collect::<std::io::Result<_>>()
        .map_err(|e| SyncError::io(source, e))?;
    children.sort_by_key(|entry| entry.file_name());

    for child in children {
        let path = child.path();
        let name = archive_path.join(child.file_name());
        let file_type = child.file_type().map_err(|e| SyncError::io(&path, e))?;
        if file_type.is_dir() {
            append_dir(builder, &path, &name)?;
        } else if file_type.is_file() {
            let data = fs::read(&path).map_err(|e| SyncError::io(&path, e))?;
            append_header(builder, &name, EntryType::Regular, file_mode, &data)?;
        } else {
            debug!(path = %path.display(), "Skipping special file");
        }
    }
    Ok(())
}

fn is_secret(archive_path: &Path) -> bool {
    archive_path
        .components()
        .find(|c| !matches!(c, Component::CurDir))
        .is_some_and(|c| c.as_os_str() == SECRETS_DIR)
}

fn append_header<W: std::io::Write>(
    builder: &mut Builder<W>,
    path: &Path,
    entry_type: EntryType,
    mode: u32,
    data: &[u8],
) -> Result<()> {
    let mut header = Header::new_gnu();
    header.set_entry_type(entry_type);
    header.set_mode(mode);
    header.set_uid(0);
    header.set_gid(0);
    header.set_mtime(0);
    header.set_size(data.len() as u64);
    builder
        .append_data(&mut header, path, data)
        .map_err(|e| SyncError::Archive(format!("{}: {}", path.display(), e)))
}

/// Counts from an extraction.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct UnpackStats {
    /// Regular files written.
    pub files: usize,
    /// Bytes written.
    pub bytes: u64,
    /// Links and device entries that were not extracted.
    pub skipped: usize,
}

/// Extract a tar.gz stream into `dest`, creating it if needed.
///
/// Entries with absolute paths or `..` components are rejected.
pub fn unpack(data: &[u8], dest: &Path) -> Result<UnpackStats> {
    fs::create_dir_all(dest).map_err(|e| SyncError::io(dest, e))?;
    let mut stats = UnpackStats::default();
    if data.is_empty() {
        return Ok(stats);
    }

    let mut archive = Archive::new(GzDecoder::new(data));
    let entries = archive
        .entries()
        .map_err(|e| SyncError::Archive(e.to_string()))?;
    for entry in entries {
        let mut entry = entry.map_err(|e| SyncError::Archive(e.to_string()))?;
        let path = entry
            .path()
            .map_err(|e| SyncError::Archive(e.to_string()))?
            .into_owned();
        validate_relative(&path)?;
        let target = dest.join(&path);

        match entry.header().entry_type() {
            EntryType::Directory => {
                fs::create_dir_all(&target).map_err(|e| SyncError::io(&target, e))?;
            }
            EntryType::Regular => {
                if let Some(parent) = target.parent() {
                    fs::create_dir_all(parent).map_err(|e| SyncError::io(parent, e))?;
                }
                let mut contents = Vec::with_capacity(entry.size() as usize);
                entry
                    .read_to_end(&mut contents)
                    .map_err(|e| SyncError::Archive(e.to_string()))?;
                fs::write(&target, &contents).map_err(|e| SyncError::io(&target, e))?;
                stats.files += 1;
                stats.bytes += contents.len() as u64;
            }
            other => {
                debug!(path = %path.display(), entry_type = ?other, "Skipping archive entry");
                stats.skipped += 1;
            }
        }
    }
    Ok(stats)
}

fn validate_relative(path: &Path) -> Result<()> {
    let escapes = path.components().any(|c| {
        matches!(
            c,
            Component::ParentDir | Component::RootDir | Component::Prefix(_)
        )
    });
    if escapes {
        return Err(SyncError::UnsafePath(path.display().to_string()));
    }
    Ok(())
}
