//! CLI commands

pub mod check_tools;
pub mod complete;
pub mod pack;
pub mod validate;

use anyhow::Result;
use compose_gate::{validate_name, NameKind};

/// Reject names the registry would never have issued.
fn check_names(maintainer: &str, app: &str) -> Result<()> {
    validate_name(NameKind::Maintainer, maintainer)?;
    validate_name(NameKind::App, app)?;
    Ok(())
}
