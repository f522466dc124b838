//! Complete command - prepare an accepted manifest for deployment

use super::check_names;
use crate::style::*;
use anyhow::{anyhow, Result};
use compose_gate::complete;
use std::path::PathBuf;

pub fn run(file: PathBuf, maintainer: &str, app: &str) -> Result<()> {
    check_names(maintainer, app)?;

    if !file.exists() {
        return Err(anyhow!("File not found: {}", file.display()));
    }

    complete(maintainer, app, &file)?;

    println!(
        "{} Completed {} for network {}_{}",
        icon_arrow(),
        file.display(),
        maintainer,
        app
    );
    Ok(())
}
