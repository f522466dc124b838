//! Service policy rules
//!
//! Each service under `services` is checked against a fixed, ordered list of
//! rules. The first violation ends validation of the whole manifest.
//!
//! Rule order per service:
//! 1. key whitelist
//! 2. image tag
//! 3. container name prefix
//! 4. main service container name
//! 5. reserved host ports
//! 6. volume sources
//! 7. host network
//! 8. deploy section

use crate::error::{GateError, Result};
use crate::manifest::{key_to_string, scalar_to_string, AppIdentity};
use serde_yaml::{Mapping, Value};

/// Keys allowed in a service definition
pub const ALLOWED_SERVICE_KEYS: &[&str] = &[
    "image",
    "container_name",
    "ports",
    "volumes",
    "depends_on",
    "environment",
    "deploy",
    "tmpfs",
    "tty",
    "user",
    "command",
    "entrypoint",
    "networks",
];

/// Host ports reserved for the platform's ingress
pub const RESERVED_HOST_PORTS: &[u16] = &[53, 80, 443];

/// Validate the `services` section and require the main service.
pub fn check_services(compose: &Mapping, identity: &AppIdentity) -> Result<()> {
    let services = compose
        .get("services")
        .and_then(Value::as_mapping)
        .ok_or(GateError::InvalidServicesSection)?;

    let mut main_service_present = false;

    for (name, definition) in services {
        let name = key_to_string(name);
        let service = definition
            .as_mapping()
            .ok_or_else(|| GateError::InvalidServiceDefinition(name.clone()))?;

        check_service_keys(&name, service)?;
        check_image(&name, service)?;
        check_container_name(&name, service, identity)?;
        if name == identity.app {
            main_service_present = true;
            check_main_container_name(&name, service, identity)?;
        }
        check_ports(&name, service)?;
        check_volumes(&name, service, identity)?;
        check_networks(&name, service)?;
        check_deploy(&name, service)?;
    }

    if !main_service_present {
        return Err(GateError::MainServiceMissing(identity.app.clone()));
    }
    Ok(())
}

fn check_service_keys(name: &str, service: &Mapping) -> Result<()> {
    for key in service.keys() {
        let key = key_to_string(key);
        if !ALLOWED_SERVICE_KEYS.contains(&key.as_str()) {
            return Err(GateError::ServiceKeyNotAllowed {
                service: name.to_string(),
                key,
            });
        }
    }
    Ok(())
}

fn check_image(name: &str, service: &Mapping) -> Result<()> {
    let image = service
        .get("image")
        .ok_or_else(|| GateError::ImageMissing(name.to_string()))?;
    let image_str = image
        .as_str()
        .ok_or_else(|| GateError::ImageTagMissing(scalar_to_string(image)))?;

    let (reference, digest) = match image_str.split_once('@') {
        Some((reference, digest)) => (reference, Some(digest)),
        None => (image_str, None),
    };

    match image_tag(reference) {
        Some("latest") => Err(GateError::LatestImageTag(name.to_string())),
        Some(tag) if !tag.is_empty() => Ok(()),
        _ if digest.is_some_and(|d| !d.is_empty()) => Ok(()),
        _ => Err(GateError::ImageTagMissing(image_str.to_string())),
    }
}

/// Tag of an image reference. A colon before the last `/` belongs to a
/// registry host port, not a tag.
fn image_tag(reference: &str) -> Option<&str> {
    let last_segment = reference.rsplit('/').next().unwrap_or(reference);
    last_segment.split_once(':').map(|(_, tag)| tag)
}

fn check_container_name(name: &str, service: &Mapping, identity: &AppIdentity) -> Result<()> {
    let container_name = service
        .get("container_name")
        .ok_or_else(|| GateError::ContainerNameMissing(name.to_string()))?;

    let prefix = identity.prefix();
    if !container_name
        .as_str()
        .is_some_and(|c| c.starts_with(&prefix))
    {
        return Err(GateError::ContainerNamePrefix {
            service: name.to_string(),
            prefix,
        });
    }
    Ok(())
}

fn check_main_container_name(
    name: &str,
    service: &Mapping,
    identity: &AppIdentity,
) -> Result<()> {
    let expected = identity.main_container_name();
    if service.get("container_name").and_then(Value::as_str) != Some(expected.as_str()) {
        return Err(GateError::MainContainerName {
            service: name.to_string(),
            expected,
        });
    }
    Ok(())
}

fn check_ports(name: &str, service: &Mapping) -> Result<()> {
    let ports = match service.get("ports") {
        None | Some(Value::Null) => return Ok(()),
        Some(Value::Sequence(ports)) => ports,
        Some(_) => return Err(GateError::InvalidPortDefinition(name.to_string())),
    };

    for port in ports {
        let host = match port {
            Value::String(entry) => host_port_segment(entry)
                .ok_or_else(|| GateError::InvalidPortDefinition(name.to_string()))?
                .to_string(),
            Value::Number(n) if n.is_u64() => n.to_string(),
            _ => return Err(GateError::InvalidPortDefinition(name.to_string())),
        };
        if let Some(reserved) = reserved_port_in(&host)
            .ok_or_else(|| GateError::InvalidPortDefinition(name.to_string()))?
        {
            return Err(GateError::ReservedPort(reserved.to_string()));
        }
    }
    Ok(())
}

/// Host side of a short-syntax port mapping.
///
/// `80` -> `80`, `80:3000` -> `80`, `127.0.0.1:80:3000` -> `80`,
/// `[::1]:80:3000/tcp` -> `80`. A bare port is treated as host-side.
fn host_port_segment(entry: &str) -> Option<&str> {
    let entry = entry.split('/').next().unwrap_or(entry).trim();
    let entry = match entry.strip_prefix('[') {
        Some(rest) => rest.split_once("]:")?.1,
        None => entry,
    };

    let fields: Vec<&str> = entry.split(':').collect();
    match fields[..] {
        [port] => Some(port),
        [host, _container] => Some(host),
        [_ip, host, _container] => Some(host),
        _ => None,
    }
}

/// Returns `Some(Some(port))` if `host` is or covers a reserved port,
/// `Some(None)` if it is a valid unreserved port or range, `None` if it
/// cannot be read as a port at all.
fn reserved_port_in(host: &str) -> Option<Option<u16>> {
    let host = host.trim();
    if host.is_empty() {
        // Docker picks an ephemeral port
        return Some(None);
    }
    let (start, end) = match host.split_once('-') {
        Some((start, end)) => (start.trim().parse::<u16>().ok()?, end.trim().parse::<u16>().ok()?),
        None => {
            let port = host.parse::<u16>().ok()?;
            (port, port)
        }
    };
    Some(
        RESERVED_HOST_PORTS
            .iter()
            .copied()
            .find(|p| (start..=end).contains(p)),
    )
}

fn check_volumes(name: &str, service: &Mapping, identity: &AppIdentity) -> Result<()> {
    let volumes = match service.get("volumes") {
        None | Some(Value::Null) => return Ok(()),
        Some(Value::Sequence(volumes)) => volumes,
        Some(_) => return Err(GateError::InvalidVolumesList(name.to_string())),
    };

    let prefix = identity.prefix();
    for volume in volumes {
        let entry = volume
            .as_str()
            .ok_or_else(|| GateError::InvalidVolumeEntry(name.to_string()))?;
        check_volume_entry(name, entry, &prefix)?;
    }
    Ok(())
}

fn check_volume_entry(name: &str, entry: &str, prefix: &str) -> Result<()> {
    let (source, _target) =
        entry
            .split_once(':')
            .ok_or_else(|| GateError::InvalidVolumeFormat {
                service: name.to_string(),
                entry: entry.to_string(),
            })?;

    if source.starts_with('/') || source.starts_with('.') || source.starts_with('~') {
        return Err(GateError::HostMount(name.to_string()));
    }
    if !source.starts_with(prefix) {
        return Err(GateError::VolumeNamePrefix {
            service: name.to_string(),
            prefix: prefix.to_string(),
        });
    }
    Ok(())
}

fn check_networks(name: &str, service: &Mapping) -> Result<()> {
    match service.get("networks") {
        None | Some(Value::Null) => Ok(()),
        Some(Value::Sequence(networks)) => {
            for network in networks {
                let network = network
                    .as_str()
                    .ok_or_else(|| GateError::InvalidNetworkEntry(name.to_string()))?;
                if network == "host" {
                    return Err(GateError::HostNetwork(name.to_string()));
                }
            }
            Ok(())
        }
        Some(Value::Mapping(networks)) => {
            if networks.keys().any(|k| key_to_string(k) == "host") {
                return Err(GateError::HostNetwork(name.to_string()));
            }
            Ok(())
        }
        Some(_) => Err(GateError::InvalidNetworks(name.to_string())),
    }
}

fn check_deploy(name: &str, service: &Mapping) -> Result<()> {
    let deploy = match service.get("deploy") {
        None => return Ok(()),
        Some(deploy) => deploy
            .as_mapping()
            .ok_or_else(|| GateError::DeployNotAMap(name.to_string()))?,
    };

    for key in deploy.keys() {
        let key = key_to_string(key);
        if key != "resources" {
            return Err(GateError::DeployKeyNotAllowed {
                service: name.to_string(),
                key,
            });
        }
    }

    let resources = match deploy.get("resources") {
        None | Some(Value::Null) => return Ok(()),
        Some(Value::Mapping(resources)) => resources,
        Some(_) => return Err(GateError::ResourcesNotAMap(name.to_string())),
    };

    let reservations = match resources.get("reservations") {
        None | Some(Value::Null) => return Ok(()),
        Some(Value::Mapping(reservations)) => reservations,
        Some(_) => return Err(GateError::ReservationsNotAMap(name.to_string())),
    };

    if reservations.contains_key("devices") {
        return Err(GateError::DevicePassthrough(name.to_string()));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ViolationKind;
    use crate::manifest::parse_manifest;

    fn identity() -> AppIdentity {
        AppIdentity::new("samplemaintainer", "gitea")
    }

    /// Builds a manifest with the compliant main service plus `extra`
    /// lines appended to its definition.
    fn gitea_with(extra: &str) -> String {
        let mut data = String::from(
            "services:\n  gitea:\n    image: gitea/gitea:1.22\n    container_name: samplemaintainer_gitea_gitea\n",
        );
        for line in extra.lines() {
            data.push_str("    ");
            data.push_str(line);
            data.push('\n');
        }
        data
    }

    fn check(data: &str) -> Result<()> {
        let compose = parse_manifest(data)?;
        check_services(&compose, &identity())
    }

    fn check_err(data: &str) -> GateError {
        check(data).expect_err("expected a policy violation")
    }

    #[test]
    fn test_compliant_service() {
        check(&gitea_with("")).unwrap();
        check(&gitea_with(
            "ports:\n  - \"3000:3000\"\nenvironment:\n  - USER_UID=1000\ntty: true\nuser: \"1000\"",
        ))
        .unwrap();
    }

    #[test]
    fn test_not_allowed_service_keys() {
        for key in ["privileged", "network_mode", "healthcheck", "cap_drop", "restart", "cap_add", "pid"] {
            let err = check_err(&gitea_with(&format!("{}: x", key)));
            assert_eq!(
                err.to_string(),
                format!("not allowed key in service 'gitea': {}", key)
            );
        }
    }

    #[test]
    fn test_merged_service_keys_checked() {
        let err = check_err(&gitea_with("<<: {privileged: true}"));
        assert!(matches!(err, GateError::ServiceKeyNotAllowed { ref key, .. } if key == "privileged"));

        // Keys already present win over merged ones
        check(&gitea_with("<<: {image: \"gitea/gitea:latest\"}")).unwrap();
    }

    #[test]
    fn test_merged_host_network() {
        let err = check_err(&gitea_with("networks:\n  <<: {host: {}}"));
        assert!(matches!(err, GateError::HostNetwork(ref s) if s == "gitea"));
        assert_eq!(err.kind(), ViolationKind::Security);
    }

    #[test]
    fn test_merged_devices() {
        let err = check_err(&gitea_with(
            "deploy:\n  resources:\n    reservations:\n      <<: {devices: [{driver: nvidia}]}",
        ));
        assert!(matches!(err, GateError::DevicePassthrough(_)));

        let err = check_err(&gitea_with(
            "deploy:\n  resources:\n    <<: {reservations: {devices: [{driver: nvidia}]}}",
        ));
        assert!(matches!(err, GateError::DevicePassthrough(_)));

        let err = check_err(&gitea_with(
            "deploy:\n  resources:\n    reservations:\n      <<: [{memory: 1G}, {devices: [{driver: nvidia}]}]",
        ));
        assert!(matches!(err, GateError::DevicePassthrough(_)));
    }

    #[test]
    fn test_aliased_devices() {
        let data = "services:\n  db:\n    image: postgres:16\n    container_name: samplemaintainer_gitea_db\n    deploy:\n      resources:\n        limits: &gpu\n          devices: [{driver: nvidia}]\n  gitea:\n    image: gitea/gitea:1.22\n    container_name: samplemaintainer_gitea_gitea\n    deploy:\n      resources:\n        reservations: *gpu\n";
        let err = check_err(data);
        assert!(matches!(err, GateError::DevicePassthrough(ref s) if s == "gitea"));
    }

    #[test]
    fn test_tagged_keys_rejected() {
        for extra in [
            "networks:\n  !x host: {}",
            "deploy:\n  resources:\n    reservations:\n      !x devices: [{driver: nvidia}]",
            "deploy:\n  resources:\n    !x reservations: {devices: [{driver: nvidia}]}",
            "environment:\n  !x A: b",
        ] {
            let err = check_err(&gitea_with(extra));
            assert!(matches!(err, GateError::UnsupportedKey(_)), "{}: got {}", extra, err);
            assert_eq!(err.kind(), ViolationKind::Structural);
        }
    }

    #[test]
    fn test_nested_merge_key_rejected() {
        let err = check_err(&gitea_with("networks:\n  <<: {<<: {host: {}}}"));
        assert!(
            matches!(err, GateError::HostNetwork(_) | GateError::UnsupportedKey(_)),
            "got: {}",
            err
        );
    }

    #[test]
    fn test_tagged_values_fail_closed() {
        let err = check_err(&gitea_with("networks: !x {host: {}}"));
        assert!(matches!(err, GateError::InvalidNetworks(_)));

        let err = check_err(&gitea_with(
            "deploy:\n  resources:\n    reservations: !x {devices: [{driver: nvidia}]}",
        ));
        assert!(matches!(err, GateError::ReservationsNotAMap(_)));
    }

    #[test]
    fn test_image_missing() {
        let data = "services:\n  gitea:\n    container_name: samplemaintainer_gitea_gitea\n";
        assert!(matches!(check_err(data), GateError::ImageMissing(_)));
    }

    #[test]
    fn test_image_without_tag() {
        let data = gitea_with("").replace("gitea/gitea:1.22", "gitea/gitea");
        assert_eq!(
            check_err(&data).to_string(),
            "the image tag must consist of an image name and a tag separated by a colon, like 'gitea/gitea:10.5', but got: gitea/gitea"
        );

        let data = gitea_with("").replace("gitea/gitea:1.22", "\"gitea/gitea:\"");
        assert!(matches!(check_err(&data), GateError::ImageTagMissing(_)));
    }

    #[test]
    fn test_latest_tag() {
        let data = gitea_with("").replace("gitea/gitea:1.22", "gitea/gitea:latest");
        assert!(matches!(check_err(&data), GateError::LatestImageTag(_)));
    }

    #[test]
    fn test_registry_port_is_not_a_tag() {
        let data = gitea_with("").replace("gitea/gitea:1.22", "registry.local:5000/gitea/gitea");
        assert!(matches!(check_err(&data), GateError::ImageTagMissing(_)));

        let data = gitea_with("").replace("gitea/gitea:1.22", "registry.local:5000/gitea/gitea:1.22");
        check(&data).unwrap();

        let data = gitea_with("").replace("gitea/gitea:1.22", "registry.local:5000/gitea/gitea:latest");
        assert!(matches!(check_err(&data), GateError::LatestImageTag(_)));
    }

    #[test]
    fn test_digest_pinned_image() {
        let data = gitea_with("").replace(
            "gitea/gitea:1.22",
            "gitea/gitea@sha256:0123456789abcdef0123456789abcdef0123456789abcdef0123456789abcdef",
        );
        check(&data).unwrap();
    }

    #[test]
    fn test_latest_tag_in_side_service() {
        let data = format!(
            "{}  db:\n    image: postgres:latest\n    container_name: samplemaintainer_gitea_db\n",
            gitea_with("")
        );
        assert!(matches!(check_err(&data), GateError::LatestImageTag(ref s) if s == "db"));
    }

    #[test]
    fn test_side_service_missing_container_name() {
        let data = format!("{}  db:\n    image: postgres:16\n", gitea_with(""));
        assert_eq!(
            check_err(&data).to_string(),
            "every service needs to have a 'container_name' keyword"
        );
    }

    #[test]
    fn test_main_service_missing_container_name() {
        let data = "services:\n  gitea:\n    image: gitea/gitea:1.22\n";
        assert!(matches!(check_err(data), GateError::ContainerNameMissing(_)));
    }

    #[test]
    fn test_side_service_requires_prefix() {
        let data = format!(
            "{}  db:\n    image: postgres:16\n    container_name: gitea_db\n",
            gitea_with("")
        );
        assert_eq!(
            check_err(&data).to_string(),
            "the container names must have the prefix: samplemaintainer_gitea_"
        );
    }

    #[test]
    fn test_main_service_wrong_container_name() {
        let data = gitea_with("").replace(
            "samplemaintainer_gitea_gitea",
            "samplemaintainer_gitea_server",
        );
        assert_eq!(
            check_err(&data).to_string(),
            "service 'gitea' must have the container_name 'samplemaintainer_gitea_gitea'"
        );
    }

    #[test]
    fn test_missing_main_service() {
        let data = "services:\n  db:\n    image: postgres:16\n    container_name: samplemaintainer_gitea_db\n";
        assert_eq!(
            check_err(data).to_string(),
            "there must be a service with the name: gitea"
        );
    }

    #[test]
    fn test_invalid_services_section() {
        assert!(matches!(
            check_err("services:\n  - gitea\n"),
            GateError::InvalidServicesSection
        ));
        assert!(matches!(
            check_err("volumes: {}\n"),
            GateError::InvalidServicesSection
        ));
        assert!(matches!(
            check_err("services:\n  gitea: gitea/gitea:1.22\n"),
            GateError::InvalidServiceDefinition(_)
        ));
    }

    #[test]
    fn test_reserved_ports() {
        for port in ["53", "80", "443"] {
            let err = check_err(&gitea_with(&format!("ports:\n  - \"{}:3000\"", port)));
            assert_eq!(
                err.to_string(),
                format!(
                    "exposing port {} is forbidden, as it is reserved for the platform",
                    port
                )
            );
        }
    }

    #[test]
    fn test_reserved_port_forms() {
        let forms = [
            "\"127.0.0.1:80:3000\"",
            "\"[::1]:443:3000\"",
            "\"80:3000/tcp\"",
            "\"53:53/udp\"",
            "\"79-81:3000-3002\"",
            "\"80\"",
            "80",
        ];
        for form in forms {
            let err = check_err(&gitea_with(&format!("ports:\n  - {}", form)));
            assert!(matches!(err, GateError::ReservedPort(_)), "form: {}", form);
        }
    }

    #[test]
    fn test_allowed_port_forms() {
        let forms = [
            "\"8080:80\"",
            "\"127.0.0.1:8080:80\"",
            "\"127.0.0.1::80\"",
            "\"3000-3005:3000-3005\"",
            "3000",
        ];
        for form in forms {
            check(&gitea_with(&format!("ports:\n  - {}", form)))
                .unwrap_or_else(|e| panic!("form {}: {}", form, e));
        }
    }

    #[test]
    fn test_invalid_port_definitions() {
        let forms = [
            "ports: \"80:3000\"",
            "ports:\n  - target: 3000\n    published: 80",
            "ports:\n  - \"${PORT:-80}:3000\"",
        ];
        for form in forms {
            let err = check_err(&gitea_with(form));
            assert!(
                matches!(err, GateError::InvalidPortDefinition(_)),
                "form: {}",
                form
            );
        }
    }

    #[test]
    fn test_prefixed_volume_allowed() {
        check(&gitea_with("volumes:\n  - samplemaintainer_gitea_data:/data:rw")).unwrap();
    }

    #[test]
    fn test_host_mounts() {
        for source in ["/etc", "./data", "../data", ".", "~/data"] {
            let err = check_err(&gitea_with(&format!("volumes:\n  - {}:/data", source)));
            assert_eq!(
                err.to_string(),
                "host directories are mounted in service 'gitea' which is forbidden",
                "source: {}",
                source
            );
        }
    }

    #[test]
    fn test_wrong_volume_prefix() {
        for source in ["data", "samplemaintainer_other_data", "othermaintainer_gitea_data"] {
            let err = check_err(&gitea_with(&format!("volumes:\n  - {}:/data", source)));
            assert_eq!(
                err.to_string(),
                "volume names must start with 'samplemaintainer_gitea_'"
            );
        }
    }

    #[test]
    fn test_invalid_volume_shapes() {
        assert!(matches!(
            check_err(&gitea_with("volumes:\n  - /data")),
            GateError::InvalidVolumeFormat { .. }
        ));
        assert!(matches!(
            check_err(&gitea_with("volumes:\n  - type: bind\n    source: /etc\n    target: /data")),
            GateError::InvalidVolumeEntry(_)
        ));
        assert!(matches!(
            check_err(&gitea_with("volumes: samplemaintainer_gitea_data:/data")),
            GateError::InvalidVolumesList(_)
        ));
    }

    #[test]
    fn test_host_network() {
        let err = check_err(&gitea_with("networks:\n  - host"));
        assert_eq!(
            err.to_string(),
            "using host network is forbidden in service gitea"
        );

        let err = check_err(&gitea_with("networks:\n  host: {}"));
        assert!(matches!(err, GateError::HostNetwork(_)));

        check(&gitea_with("networks:\n  - backend")).unwrap();
        check(&gitea_with("networks:\n  backend:\n    aliases: [git]")).unwrap();

        assert!(matches!(
            check_err(&gitea_with("networks: host")),
            GateError::InvalidNetworks(_)
        ));
    }

    #[test]
    fn test_deploy_resources_allowed() {
        check(&gitea_with(
            "deploy:\n  resources:\n    limits:\n      memory: 512M\n    reservations:\n      cpus: \"0.5\"",
        ))
        .unwrap();
    }

    #[test]
    fn test_deploy_only_resources() {
        let err = check_err(&gitea_with("deploy:\n  replicas: 3"));
        assert_eq!(
            err.to_string(),
            "'deploy' keyword must only contain 'resources' keyword"
        );

        assert!(matches!(
            check_err(&gitea_with("deploy: [resources]")),
            GateError::DeployNotAMap(_)
        ));
    }

    #[test]
    fn test_devices_forbidden() {
        let err = check_err(&gitea_with(
            "deploy:\n  resources:\n    reservations:\n      devices:\n        - capabilities: [gpu]",
        ));
        assert_eq!(err.to_string(), "'devices' keyword is not allowed");
    }

    #[test]
    fn test_first_violation_wins() {
        // Key whitelist is checked before the image tag
        let data = gitea_with("privileged: true").replace("gitea/gitea:1.22", "gitea/gitea:latest");
        assert!(matches!(
            check_err(&data),
            GateError::ServiceKeyNotAllowed { .. }
        ));

        // First service in document order is reported
        let data = "services:\n  db:\n    image: postgres:latest\n    container_name: samplemaintainer_gitea_db\n  gitea:\n    image: gitea/gitea\n    container_name: samplemaintainer_gitea_gitea\n";
        assert!(matches!(check_err(data), GateError::LatestImageTag(ref s) if s == "db"));
    }

    #[test]
    fn test_host_port_segment() {
        assert_eq!(host_port_segment("80"), Some("80"));
        assert_eq!(host_port_segment("8080:80"), Some("8080"));
        assert_eq!(host_port_segment("0.0.0.0:8080:80/tcp"), Some("8080"));
        assert_eq!(host_port_segment("[::]:8080:80"), Some("8080"));
        assert_eq!(host_port_segment("a:b:c:d"), None);
    }
}
