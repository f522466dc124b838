//! Pack command - build a version archive from an app directory

use crate::style::*;
use anyhow::{anyhow, Context, Result};
use compose_gate::{zip_directory, MANIFEST_FILE};
use std::path::PathBuf;

pub fn run(dir: PathBuf, output: PathBuf) -> Result<()> {
    if !dir.is_dir() {
        return Err(anyhow!("Not a directory: {}", dir.display()));
    }
    if !dir.join(MANIFEST_FILE).is_file() {
        print_warning(&format!(
            "{} has no {}, the archive will be rejected",
            dir.display(),
            MANIFEST_FILE
        ));
    }

    let data = zip_directory(&dir)?;
    std::fs::write(&output, &data)
        .with_context(|| format!("Failed to write {}", output.display()))?;

    print_success(&format!(
        "Wrote {} ({} bytes)",
        output.display(),
        data.len()
    ));
    Ok(())
}
