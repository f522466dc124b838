//! Registry name rules
//!
//! The gate trusts the maintainer and app names it is given. Callers use
//! these checks before handing names to it.

use regex::Regex;
use std::sync::LazyLock;
use thiserror::Error;

static NAME_PATTERN: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"^[a-z0-9]{3,20}$").unwrap());

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NameKind {
    Maintainer,
    App,
}

impl std::fmt::Display for NameKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            NameKind::Maintainer => write!(f, "user"),
            NameKind::App => write!(f, "app"),
        }
    }
}

#[derive(Debug, Error, PartialEq, Eq)]
#[error("invalid signs or length of field: {0}")]
pub struct InvalidName(pub NameKind);

/// Lowercase alphanumeric, 3 to 20 characters
pub fn validate_name(kind: NameKind, name: &str) -> Result<(), InvalidName> {
    if NAME_PATTERN.is_match(name) {
        Ok(())
    } else {
        Err(InvalidName(kind))
    }
}
