//! Archive Unpacker - extracts uploaded app versions
//!
//! An uploaded version is a ZIP archive holding exactly:
//! - `docker-compose.yml` (required)
//! - `app.yml` (optional)
//!
//! Extraction goes into a fresh temporary directory that is removed when the
//! returned [`ExtractedPackage`] is dropped, on success and on every error path.

use crate::config::ArchiveLimits;
use crate::error::{GateError, Result};
use std::fs::{self, File};
use std::io::{self, Cursor, Read};
use std::path::{Path, PathBuf};
use tempfile::TempDir;
use tracing::debug;

/// Infrastructure manifest file name
pub const MANIFEST_FILE: &str = "docker-compose.yml";

/// Optional app metadata file name
pub const METADATA_FILE: &str = "app.yml";

const S_IFMT: u32 = 0o170000;
const S_IFLNK: u32 = 0o120000;

/// Contents of an archive that passed the file policy.
#[derive(Debug)]
pub struct ExtractedPackage {
    dir: TempDir,
    manifest: PathBuf,
    metadata: Option<PathBuf>,
}

impl ExtractedPackage {
    pub fn dir(&self) -> &Path {
        self.dir.path()
    }

    pub fn manifest_path(&self) -> &Path {
        &self.manifest
    }

    pub fn metadata_path(&self) -> Option<&Path> {
        self.metadata.as_deref()
    }
}

/// Unpacks uploaded archives and enforces the allowed-file whitelist
#[derive(Debug, Clone, Default)]
pub struct ArchiveUnpacker {
    limits: ArchiveLimits,
}

impl ArchiveUnpacker {
    pub fn new(limits: ArchiveLimits) -> Self {
        Self { limits }
    }

    /// Extract `data` and check that only the allowed files are present.
    pub fn unpack(&self, data: &[u8]) -> Result<ExtractedPackage> {
        if data.len() > self.limits.max_archive_size {
            return Err(GateError::ArchiveTooLarge {
                size: data.len(),
                max: self.limits.max_archive_size,
            });
        }

        let dir = tempfile::Builder::new()
            .prefix("compose-gate-")
            .tempdir()
            .map_err(|e| GateError::Extraction(format!("failed to create temp dir: {}", e)))?;

        let count = self.extract_zip(data, dir.path())?;
        debug!("Extracted {} zip entries into {}", count, dir.path().display());

        let (manifest, metadata) = check_files_in_dir(dir.path())?;

        Ok(ExtractedPackage {
            dir,
            manifest,
            metadata,
        })
    }

    /// Extract ZIP entries below `dest`, returning the number of entries.
    fn extract_zip(&self, data: &[u8], dest: &Path) -> Result<usize> {
        let mut archive = zip::ZipArchive::new(Cursor::new(data))
            .map_err(|e| GateError::UnreadableArchive(e.to_string()))?;

        if archive.len() > self.limits.max_entries {
            return Err(GateError::TooManyEntries {
                count: archive.len(),
                max: self.limits.max_entries,
            });
        }

        for i in 0..archive.len() {
            let mut file = archive
                .by_index(i)
                .map_err(|e| GateError::UnreadableArchive(e.to_string()))?;
            let raw_name = file.name().to_string();

            if file
                .unix_mode()
                .is_some_and(|mode| mode & S_IFMT == S_IFLNK)
            {
                return Err(GateError::SymlinkEntry(raw_name));
            }

            // Rejects "..", absolute paths and NUL bytes
            let relative = file
                .enclosed_name()
                .ok_or_else(|| GateError::PathTraversal(raw_name.clone()))?;
            let target = dest.join(&relative);

            if file.is_dir() {
                fs::create_dir_all(&target).map_err(extraction_error)?;
                continue;
            }

            if file.size() > self.limits.max_entry_size {
                return Err(GateError::EntryTooLarge {
                    name: raw_name,
                    max: self.limits.max_entry_size,
                });
            }

            if let Some(parent) = target.parent() {
                fs::create_dir_all(parent).map_err(extraction_error)?;
            }
            let mut out = File::create(&target).map_err(extraction_error)?;

            // The declared size can lie, so bound the actual copy as well
            let written = io::copy(
                &mut (&mut file).take(self.limits.max_entry_size + 1),
                &mut out,
            )
            .map_err(extraction_error)?;
            if written > self.limits.max_entry_size {
                return Err(GateError::EntryTooLarge {
                    name: raw_name,
                    max: self.limits.max_entry_size,
                });
            }
        }

        Ok(archive.len())
    }
}

fn extraction_error(e: io::Error) -> GateError {
    GateError::Extraction(e.to_string())
}

/// Check the top-level listing of an extracted archive.
///
/// Returns the manifest path and, if present, the metadata path.
fn check_files_in_dir(dir: &Path) -> Result<(PathBuf, Option<PathBuf>)> {
    let mut entries = Vec::new();
    for entry in fs::read_dir(dir).map_err(|e| {
        GateError::Extraction(format!("failed to read temp dir: {}", e))
    })? {
        let entry = entry.map_err(extraction_error)?;
        let is_dir = entry.file_type().map_err(extraction_error)?.is_dir();
        entries.push((entry.file_name().to_string_lossy().to_string(), is_dir));
    }

    if entries.is_empty() {
        return Err(GateError::EmptyArchive);
    }

    // Directory order is filesystem dependent
    entries.sort();

    let mut manifest = None;
    let mut metadata = None;

    for (name, is_dir) in entries {
        if is_dir {
            return Err(GateError::DirectoryInArchive(name));
        }
        match name.as_str() {
            MANIFEST_FILE => manifest = Some(dir.join(MANIFEST_FILE)),
            METADATA_FILE => metadata = Some(dir.join(METADATA_FILE)),
            _ => return Err(GateError::UnexpectedFile(name)),
        }
    }

    let manifest = manifest.ok_or(GateError::MissingManifest)?;
    Ok((manifest, metadata))
}
