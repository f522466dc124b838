//! Compose Gate - submission gate for a multi-tenant app registry
//!
//! Maintainers upload app versions as ZIP archives containing a
//! `docker-compose.yml` and an optional `app.yml`. Before a version is
//! stored it must be free of anything that lets one tenant reach another:
//! host mounts, host networking, device passthrough, reserved ports,
//! foreign container or volume names.
//!
//! ## Module Structure
//!
//! - `archive`: extraction and file whitelist
//! - `metadata`: `app.yml` rules
//! - `manifest`: manifest decoding, root keywords, global volumes
//! - `policy`: per-service rules
//! - `syntax`: `docker compose config` check
//! - `gate`: the validation pipeline
//! - `completion`: deploy-time manifest rewrite
//! - `names`: registry name rules for callers
//! - `packaging`: build version archives from a directory

// ============================================================================
// VALIDATION PIPELINE
// ============================================================================

/// Archive extraction and file whitelist
pub mod archive;

/// App metadata validation
pub mod metadata;

/// Manifest decoding and top-level rules
pub mod manifest;

/// Service policy rules
pub mod policy;

/// External compose syntax check
pub mod syntax;

/// Validation pipeline
pub mod gate;

// ============================================================================
// DEPLOYMENT
// ============================================================================

/// Deploy-time manifest rewrite
pub mod completion;

// ============================================================================
// SUPPORT
// ============================================================================

pub mod config;
pub mod error;
pub mod names;
pub mod packaging;

// ============================================================================
// RE-EXPORTS
// ============================================================================

pub use archive::{ArchiveUnpacker, ExtractedPackage, MANIFEST_FILE, METADATA_FILE};
pub use completion::{complete, complete_value, CompletionError, ALLOWED_CAPABILITIES};
pub use config::{ArchiveLimits, ConfigError, GateConfig, SyntaxCheckConfig};
pub use error::{GateError, ViolationKind};
pub use gate::{validate, VersionGate};
pub use manifest::AppIdentity;
pub use metadata::is_valid_url_path;
pub use names::{validate_name, InvalidName, NameKind};
pub use packaging::zip_directory;
pub use syntax::{DockerComposeChecker, NoopSyntaxChecker, SyntaxChecker};
