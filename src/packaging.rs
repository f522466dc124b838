//! Packaging - builds version archives from a directory
//!
//! Produces the ZIP layout the gate expects. Directories are walked
//! recursively, so a stray subdirectory ends up in the archive and is
//! rejected by the gate rather than silently skipped here.

use anyhow::{Context, Result};
use std::fs::File;
use std::io::{self, Cursor};
use std::path::Path;
use walkdir::WalkDir;

/// Zip every regular file below `dir`, with paths relative to `dir`.
pub fn zip_directory(dir: &Path) -> Result<Vec<u8>> {
    let mut buffer = Cursor::new(Vec::new());
    {
        let mut zip = zip::ZipWriter::new(&mut buffer);
        let options = zip::write::SimpleFileOptions::default()
            .compression_method(zip::CompressionMethod::Deflated)
            .unix_permissions(0o644);

        let mut entries: Vec<_> = WalkDir::new(dir)
            .min_depth(1)
            .sort_by_file_name()
            .into_iter()
            .collect::<std::result::Result<Vec<_>, _>>()
            .with_context(|| format!("Failed to walk {}", dir.display()))?;
        entries.retain(|e| e.file_type().is_file());

        for entry in entries {
            let relative = entry
                .path()
                .strip_prefix(dir)
                .context("Walked outside of package directory")?;
            let name = relative
                .components()
                .map(|c| c.as_os_str().to_string_lossy())
                .collect::<Vec<_>>()
                .join("/");

            zip.start_file(name.as_str(), options)
                .with_context(|| format!("Failed to add {} to archive", name))?;
            let mut file = File::open(entry.path())
                .with_context(|| format!("Failed to open {}", entry.path().display()))?;
            io::copy(&mut file, &mut zip)
                .with_context(|| format!("Failed to write {} to archive", name))?;
        }

        zip.finish().context("Failed to finish archive")?;
    }
    Ok(buffer.into_inner())
}
