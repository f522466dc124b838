//! Gate errors
//!
//! Every rejection the gate can produce is a `GateError` variant. The
//! `Display` text is the single message handed back to the uploader, so
//! wording here is part of the gate's observable behavior.

use thiserror::Error;

/// Broad category of a rejection.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ViolationKind {
    /// Bad, missing or extra file in the uploaded archive
    ArchivePolicy,
    /// Disallowed or missing key, wrong value shape
    Structural,
    /// Container or volume naming convention broken
    Naming,
    /// Host mount, forbidden network, device passthrough, reserved port
    Security,
    /// Missing or `latest` image tag
    ImagePolicy,
    /// Unknown metadata key, bad `url_path` or `port`
    Metadata,
    /// The syntax checker could not run or reported an error
    ExternalTool,
}

#[derive(Debug, Error)]
pub enum GateError {
    // Archive
    #[error("app name '{0}' is not allowed")]
    ReservedAppName(String),
    #[error("failed to read zip file: {0}")]
    UnreadableArchive(String),
    #[error("zip file too large: {size} bytes (max: {max} bytes)")]
    ArchiveTooLarge { size: usize, max: usize },
    #[error("too many entries in zip file: {count} (max: {max})")]
    TooManyEntries { count: usize, max: usize },
    #[error("file in zip too large: {name} (max: {max} bytes)")]
    EntryTooLarge { name: String, max: u64 },
    #[error("path traversal detected in zip file: {0}")]
    PathTraversal(String),
    #[error("symbolic links are not allowed in the zip file: {0}")]
    SymlinkEntry(String),
    #[error("failed to extract zip file: {0}")]
    Extraction(String),
    #[error("zip file is empty")]
    EmptyArchive,
    #[error("directories are not allowed in the zip file: {0}")]
    DirectoryInArchive(String),
    #[error("unexpected file in zip: {0}")]
    UnexpectedFile(String),
    #[error("docker-compose.yml file is missing in zip")]
    MissingManifest,

    // Metadata
    #[error("failed to read app.yml: {0}")]
    MetadataUnreadable(String),
    #[error("failed to parse app.yml: {0}")]
    MetadataUnparsable(String),
    #[error("not allowed key in app.yml: {0}")]
    MetadataKeyNotAllowed(String),
    #[error("invalid url_path in app.yml: {0}")]
    InvalidUrlPath(String),
    #[error("invalid port in app.yml: {0}")]
    InvalidPort(String),

    // Manifest structure
    #[error("failed to read docker-compose.yml: {0}")]
    ManifestUnreadable(String),
    #[error("failed to parse docker-compose.yml: {0}")]
    ManifestUnparsable(String),
    #[error("empty docker-compose.yml is not allowed")]
    EmptyManifest,
    #[error("unsupported key in docker-compose.yml: {0}")]
    UnsupportedKey(String),
    #[error("not allowed root keyword in docker-compose.yml: {0}")]
    RootKeyNotAllowed(String),
    #[error("invalid 'services' section in docker-compose.yml")]
    InvalidServicesSection,
    #[error("invalid service definition for service {0}")]
    InvalidServiceDefinition(String),
    #[error("not allowed key in service '{service}': {key}")]
    ServiceKeyNotAllowed { service: String, key: String },
    #[error("invalid port definition in service {0}")]
    InvalidPortDefinition(String),
    #[error("invalid 'volumes' in service {0}")]
    InvalidVolumesList(String),
    #[error("invalid volume entry in service {0}")]
    InvalidVolumeEntry(String),
    #[error("invalid volume format in service {service}: {entry}")]
    InvalidVolumeFormat { service: String, entry: String },
    #[error("invalid 'networks' definition in service {0}")]
    InvalidNetworks(String),
    #[error("invalid network entry in service {0}")]
    InvalidNetworkEntry(String),
    #[error("'deploy' keyword in service '{0}' must be a map")]
    DeployNotAMap(String),
    #[error("'deploy' keyword must only contain 'resources' keyword")]
    DeployKeyNotAllowed { service: String, key: String },
    #[error("'resources' in 'deploy' of service '{0}' must be a map")]
    ResourcesNotAMap(String),
    #[error("'reservations' in 'resources' of service '{0}' must be a map")]
    ReservationsNotAMap(String),
    #[error("there must be a service with the name: {0}")]
    MainServiceMissing(String),
    #[error("invalid 'volumes' section in docker-compose.yml")]
    InvalidGlobalVolumes,
    #[error("volume has sub-keywords, which are not allowed")]
    GlobalVolumeHasSubKeys(String),

    // Naming
    #[error("every service needs to have a 'container_name' keyword")]
    ContainerNameMissing(String),
    #[error("the container names must have the prefix: {prefix}")]
    ContainerNamePrefix { service: String, prefix: String },
    #[error("service '{service}' must have the container_name '{expected}'")]
    MainContainerName { service: String, expected: String },
    #[error("volume names must start with '{prefix}'")]
    VolumeNamePrefix { service: String, prefix: String },

    // Security
    #[error("exposing port {0} is forbidden, as it is reserved for the platform")]
    ReservedPort(String),
    #[error("host directories are mounted in service '{0}' which is forbidden")]
    HostMount(String),
    #[error("using host network is forbidden in service {0}")]
    HostNetwork(String),
    #[error("'devices' keyword is not allowed")]
    DevicePassthrough(String),

    // Image
    #[error("service '{0}' must have 'image' keyword")]
    ImageMissing(String),
    #[error("the image tag must consist of an image name and a tag separated by a colon, like 'gitea/gitea:10.5', but got: {0}")]
    ImageTagMissing(String),
    #[error("the 'latest' tag is forbidden, to get reproducible apps, only fixed tags with specific software version should be used")]
    LatestImageTag(String),

    // External tool
    #[error("docker-compose.yml consistency check failed: {0}")]
    SyntaxCheckFailed(String),
    #[error("docker-compose.yml consistency check could not run: {0}")]
    SyntaxCheckUnavailable(String),
}

impl GateError {
    pub fn kind(&self) -> ViolationKind {
        use GateError::*;
        match self {
            ReservedAppName(_)
            | UnreadableArchive(_)
            | ArchiveTooLarge { .. }
            | TooManyEntries { .. }
            | EntryTooLarge { .. }
            | PathTraversal(_)
            | SymlinkEntry(_)
            | Extraction(_)
            | EmptyArchive
            | DirectoryInArchive(_)
            | UnexpectedFile(_)
            | MissingManifest => ViolationKind::ArchivePolicy,

            MetadataUnreadable(_)
            | MetadataUnparsable(_)
            | MetadataKeyNotAllowed(_)
            | InvalidUrlPath(_)
            | InvalidPort(_) => ViolationKind::Metadata,

            ManifestUnreadable(_)
            | ManifestUnparsable(_)
            | EmptyManifest
            | UnsupportedKey(_)
            | RootKeyNotAllowed(_)
            | InvalidServicesSection
            | InvalidServiceDefinition(_)
            | ServiceKeyNotAllowed { .. }
            | InvalidPortDefinition(_)
            | InvalidVolumesList(_)
            | InvalidVolumeEntry(_)
            | InvalidVolumeFormat { .. }
            | InvalidNetworks(_)
            | InvalidNetworkEntry(_)
            | DeployNotAMap(_)
            | DeployKeyNotAllowed { .. }
            | ResourcesNotAMap(_)
            | ReservationsNotAMap(_)
            | MainServiceMissing(_)
            | InvalidGlobalVolumes
            | GlobalVolumeHasSubKeys(_) => ViolationKind::Structural,

            ContainerNameMissing(_)
            | ContainerNamePrefix { .. }
            | MainContainerName { .. }
            | VolumeNamePrefix { .. } => ViolationKind::Naming,

            ReservedPort(_) | HostMount(_) | HostNetwork(_) | DevicePassthrough(_) => {
                ViolationKind::Security
            }

            ImageMissing(_) | ImageTagMissing(_) | LatestImageTag(_) => {
                ViolationKind::ImagePolicy
            }

            SyntaxCheckFailed(_) | SyntaxCheckUnavailable(_) => ViolationKind::ExternalTool,
        }
    }

    /// Name of the service the violation was found in, if any.
    pub fn service(&self) -> Option<&str> {
        use GateError::*;
        match self {
            InvalidServiceDefinition(s)
            | InvalidPortDefinition(s)
            | InvalidVolumesList(s)
            | InvalidVolumeEntry(s)
            | InvalidNetworks(s)
            | InvalidNetworkEntry(s)
            | DeployNotAMap(s)
            | ResourcesNotAMap(s)
            | ReservationsNotAMap(s)
            | ContainerNameMissing(s)
            | HostMount(s)
            | HostNetwork(s)
            | DevicePassthrough(s)
            | ImageMissing(s)
            | LatestImageTag(s) => Some(s),
            ServiceKeyNotAllowed { service, .. }
            | InvalidVolumeFormat { service, .. }
            | DeployKeyNotAllowed { service, .. }
            | ContainerNamePrefix { service, .. }
            | MainContainerName { service, .. }
            | VolumeNamePrefix { service, .. } => Some(service),
            _ => None,
        }
    }
}

pub type Result<T> = std::result::Result<T, GateError>;
