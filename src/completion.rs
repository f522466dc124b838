//! Manifest completion
//!
//! Rewrites an accepted manifest into the form that is actually deployed:
//! every service is attached to the app's external network, restarted unless
//! stopped, stripped of all capabilities except a small allow-list, and every
//! global volume gets an explicit name.
//!
//! Completion does not validate. Callers must only pass manifests that were
//! accepted by the gate. Each step is an assignment, so completing an already
//! completed manifest produces the same document again.

use crate::manifest::{key_to_string, AppIdentity};
use serde_yaml::{Mapping, Value};
use std::fs::OpenOptions;
use std::io::Write;
use std::path::Path;
use thiserror::Error;
use tracing::info;

/// Capabilities kept after `cap_drop: [ALL]`
pub const ALLOWED_CAPABILITIES: &[&str] = &[
    "CAP_NET_BIND_SERVICE",
    "CAP_CHOWN",
    "CAP_FOWNER",
    "CAP_SETGID",
    "CAP_SETUID",
    "CAP_DAC_OVERRIDE",
];

pub const RESTART_POLICY: &str = "unless-stopped";

#[derive(Debug, Error)]
pub enum CompletionError {
    #[error("failed to access {path}: {source}")]
    Io {
        path: String,
        source: std::io::Error,
    },
    #[error("failed to parse docker-compose.yml: {0}")]
    Parse(serde_yaml::Error),
    #[error("failed to serialize docker-compose.yml: {0}")]
    Serialize(serde_yaml::Error),
    #[error("docker-compose.yml must be a mapping with a 'services' mapping")]
    InvalidStructure,
}

/// Complete the manifest at `path` in place.
pub fn complete(maintainer: &str, app: &str, path: &Path) -> Result<(), CompletionError> {
    let io_error = |source| CompletionError::Io {
        path: path.display().to_string(),
        source,
    };

    let raw = std::fs::read_to_string(path).map_err(io_error)?;
    let mut compose: Value = serde_yaml::from_str(&raw).map_err(CompletionError::Parse)?;
    compose.apply_merge().map_err(CompletionError::Parse)?;

    complete_value(&mut compose, &AppIdentity::new(maintainer, app))?;

    let out = serde_yaml::to_string(&compose).map_err(CompletionError::Serialize)?;
    write_private(path, out.as_bytes()).map_err(io_error)?;

    info!("Completed docker-compose.yml for {}/{}", maintainer, app);
    Ok(())
}

/// Complete an in-memory manifest.
pub fn complete_value(compose: &mut Value, identity: &AppIdentity) -> Result<(), CompletionError> {
    let compose = compose
        .as_mapping_mut()
        .ok_or(CompletionError::InvalidStructure)?;
    let network = identity.network_name();

    add_external_network(compose, &network);
    update_services(compose, &network)?;
    name_global_volumes(compose);
    Ok(())
}

fn add_external_network(compose: &mut Mapping, network: &str) {
    let mut external = Mapping::new();
    external.insert("external".into(), Value::Bool(true));

    let mut networks = Mapping::new();
    networks.insert(network.into(), Value::Mapping(external));

    compose.insert("networks".into(), Value::Mapping(networks));
}

fn update_services(compose: &mut Mapping, network: &str) -> Result<(), CompletionError> {
    let services = compose
        .get_mut("services")
        .and_then(Value::as_mapping_mut)
        .ok_or(CompletionError::InvalidStructure)?;

    for (_, service) in services.iter_mut() {
        if service.is_null() {
            *service = Value::Mapping(Mapping::new());
        }
        let service = service
            .as_mapping_mut()
            .ok_or(CompletionError::InvalidStructure)?;

        service.insert("networks".into(), string_list(&[network]));
        service.insert("restart".into(), RESTART_POLICY.into());
        service.insert("cap_drop".into(), string_list(&["ALL"]));
        service.insert("cap_add".into(), string_list(ALLOWED_CAPABILITIES));
    }
    Ok(())
}

fn name_global_volumes(compose: &mut Mapping) {
    let Some(volumes) = compose.get_mut("volumes").and_then(Value::as_mapping_mut) else {
        return;
    };

    for (name, definition) in volumes.iter_mut() {
        if !definition.is_mapping() {
            *definition = Value::Mapping(Mapping::new());
        }
        if let Some(definition) = definition.as_mapping_mut() {
            definition.insert("name".into(), key_to_string(name).into());
        }
    }
}

fn string_list(items: &[&str]) -> Value {
    Value::Sequence(items.iter().map(|s| Value::from(*s)).collect())
}

fn write_private(path: &Path, data: &[u8]) -> std::io::Result<()> {
    let mut options = OpenOptions::new();
    options.write(true).create(true).truncate(true);
    #[cfg(unix)]
    {
        use std::os::unix::fs::OpenOptionsExt;
        options.mode(0o600);
    }
    let mut file = options.open(path)?;
    file.write_all(data)?;

    // `mode` only applies when the file is created
    #[cfg(unix)]
    {
        use std::os::unix::fs::PermissionsExt;
        file.set_permissions(std::fs::Permissions::from_mode(0o600))?;
    }
    Ok(())
}
