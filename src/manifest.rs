//! Manifest parsing and top-level rules
//!
//! The manifest is decoded into a generic [`serde_yaml::Value`] tree rather
//! than typed structs, so keys we do not model cannot be silently dropped
//! on the way to the policy checks.

use crate::error::{GateError, Result};
use crate::policy;
use serde_yaml::{Mapping, Value};
use std::path::Path;
use tracing::debug;

/// Root keywords allowed in `docker-compose.yml`
pub const ALLOWED_ROOT_KEYS: &[&str] = &["services", "volumes"];

/// Naming context for one validation call
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AppIdentity {
    pub maintainer: String,
    pub app: String,
}

impl AppIdentity {
    pub fn new(maintainer: impl Into<String>, app: impl Into<String>) -> Self {
        Self {
            maintainer: maintainer.into(),
            app: app.into(),
        }
    }

    /// Prefix every container and volume name must carry
    pub fn prefix(&self) -> String {
        format!("{}_{}_", self.maintainer, self.app)
    }

    /// Exact container name of the main service
    pub fn main_container_name(&self) -> String {
        format!("{}_{}_{}", self.maintainer, self.app, self.app)
    }

    /// Name of the per-app external network
    pub fn network_name(&self) -> String {
        format!("{}_{}", self.maintainer, self.app)
    }
}

/// Parse YAML, treating a document without content as null.
pub(crate) fn parse_yaml(data: &str) -> std::result::Result<Value, serde_yaml::Error> {
    let has_content = data.lines().any(|line| {
        let line = line.trim();
        !line.is_empty() && !line.starts_with('#') && line != "---" && line != "..."
    });
    if !has_content {
        return Ok(Value::Null);
    }
    serde_yaml::from_str(data)
}

/// Read and decode a manifest file. The result is a non-empty mapping.
pub fn read_manifest(path: &Path) -> Result<Mapping> {
    let data =
        std::fs::read_to_string(path).map_err(|e| GateError::ManifestUnreadable(e.to_string()))?;
    parse_manifest(&data)
}

/// Decode manifest content. The result is a non-empty mapping.
///
/// `<<` merge keys are expanded the way compose expands them, so the policy
/// checks see the same keys compose will.
pub fn parse_manifest(data: &str) -> Result<Mapping> {
    let mut value = parse_yaml(data).map_err(|e| GateError::ManifestUnparsable(e.to_string()))?;
    value
        .apply_merge()
        .map_err(|e| GateError::ManifestUnparsable(e.to_string()))?;
    check_keys(&value)?;
    match value {
        Value::Null => Err(GateError::EmptyManifest),
        Value::Mapping(map) if map.is_empty() => Err(GateError::EmptyManifest),
        Value::Mapping(map) => Ok(map),
        other => Err(GateError::ManifestUnparsable(format!(
            "expected a mapping, got {}",
            describe(&other)
        ))),
    }
}

/// Reject tagged mapping keys and merge keys that survived expansion,
/// anywhere in the tree. Lookups by plain key would not see them.
fn check_keys(value: &Value) -> Result<()> {
    let mut stack = vec![value];
    while let Some(node) = stack.pop() {
        match node {
            Value::Mapping(map) => {
                for (key, child) in map {
                    if matches!(key, Value::Tagged(_)) || key.as_str() == Some("<<") {
                        return Err(GateError::UnsupportedKey(key_to_string(key)));
                    }
                    stack.push(child);
                }
            }
            Value::Sequence(seq) => stack.extend(seq),
            Value::Tagged(tagged) => stack.push(&tagged.value),
            _ => {}
        }
    }
    Ok(())
}

/// Run every manifest rule against an already decoded manifest.
pub fn validate_manifest(compose: &Mapping, identity: &AppIdentity) -> Result<()> {
    check_root_keys(compose)?;
    policy::check_services(compose, identity)?;
    check_global_volumes(compose)?;
    debug!(
        "Manifest for {}/{} passed policy checks",
        identity.maintainer, identity.app
    );
    Ok(())
}

/// Read, decode and validate the manifest at `path`.
pub fn validate_manifest_file(path: &Path, identity: &AppIdentity) -> Result<()> {
    let compose = read_manifest(path)?;
    validate_manifest(&compose, identity)
}

fn check_root_keys(compose: &Mapping) -> Result<()> {
    for key in compose.keys() {
        let key = key_to_string(key);
        if !ALLOWED_ROOT_KEYS.contains(&key.as_str()) {
            return Err(GateError::RootKeyNotAllowed(key));
        }
    }
    Ok(())
}

/// Global volumes must be declared bare; the deploy step adds `name` itself.
fn check_global_volumes(compose: &Mapping) -> Result<()> {
    let volumes = match compose.get("volumes") {
        None | Some(Value::Null) => return Ok(()),
        Some(Value::Mapping(volumes)) => volumes,
        Some(_) => return Err(GateError::InvalidGlobalVolumes),
    };

    for (name, definition) in volumes {
        match definition {
            Value::Null => {}
            Value::Mapping(sub) if sub.is_empty() => {}
            _ => return Err(GateError::GlobalVolumeHasSubKeys(key_to_string(name))),
        }
    }
    Ok(())
}

/// Render a mapping key for messages. Non-string keys use their YAML form.
pub(crate) fn key_to_string(key: &Value) -> String {
    scalar_to_string(key)
}

/// Render a value for messages.
pub(crate) fn scalar_to_string(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        Value::Number(n) => n.to_string(),
        Value::Bool(b) => b.to_string(),
        Value::Null => "null".to_string(),
        other => serde_yaml::to_string(other)
            .map(|s| s.trim_end().to_string())
            .unwrap_or_else(|_| describe(other).to_string()),
    }
}

pub(crate) fn describe(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "a boolean",
        Value::Number(_) => "a number",
        Value::String(_) => "a string",
        Value::Sequence(_) => "a sequence",
        Value::Mapping(_) => "a mapping",
        Value::Tagged(_) => "a tagged value",
    }
}
