//! App metadata (`app.yml`) validation
//!
//! The metadata file is optional. When present it may only set the URL path
//! the app is served under and the container port traffic is routed to.

use crate::error::{GateError, Result};
use regex::Regex;
use serde_yaml::Value;
use std::path::Path;
use std::sync::LazyLock;

/// Keys accepted in `app.yml`
pub const ALLOWED_METADATA_KEYS: &[&str] = &["url_path", "port"];

static URL_PATH_PATTERN: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^/[a-zA-Z0-9_-]{0,100}$").unwrap());

/// Returns true if `path` is an acceptable `url_path` value
pub fn is_valid_url_path(path: &str) -> bool {
    URL_PATH_PATTERN.is_match(path)
}

/// Validate the metadata file at `path`
pub fn check_metadata_file(path: &Path) -> Result<()> {
    let data =
        std::fs::read_to_string(path).map_err(|e| GateError::MetadataUnreadable(e.to_string()))?;
    check_metadata(&data)
}

/// Validate raw `app.yml` content
pub fn check_metadata(data: &str) -> Result<()> {
    let value = crate::manifest::parse_yaml(data)
        .map_err(|e| GateError::MetadataUnparsable(e.to_string()))?;

    let map = match value {
        Value::Null => return Ok(()),
        Value::Mapping(map) => map,
        other => {
            return Err(GateError::MetadataUnparsable(format!(
                "expected a mapping, got {}",
                crate::manifest::describe(&other)
            )))
        }
    };

    for key in map.keys() {
        let key = crate::manifest::key_to_string(key);
        if !ALLOWED_METADATA_KEYS.contains(&key.as_str()) {
            return Err(GateError::MetadataKeyNotAllowed(key));
        }
    }

    if let Some(url_path) = map.get("url_path") {
        match url_path.as_str() {
            Some(p) if is_valid_url_path(p) => {}
            _ => {
                return Err(GateError::InvalidUrlPath(crate::manifest::scalar_to_string(
                    url_path,
                )))
            }
        }
    }

    if let Some(port) = map.get("port") {
        match port.as_i64() {
            Some(p) if (1..=65535).contains(&p) => {}
            _ => return Err(GateError::InvalidPort(crate::manifest::scalar_to_string(port))),
        }
    }

    Ok(())
}
