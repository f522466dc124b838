//! Version Gate - decides whether an uploaded app version is accepted
//!
//! Pipeline:
//! 1. Reserved app name
//! 2. Archive extraction and file whitelist
//! 3. `app.yml` rules
//! 4. `docker-compose.yml` policy rules
//! 5. External compose syntax check
//!
//! The first failing step produces the only error returned.

use crate::archive::ArchiveUnpacker;
use crate::config::GateConfig;
use crate::error::{GateError, Result};
use crate::manifest::{self, AppIdentity};
use crate::metadata;
use crate::syntax::{DockerComposeChecker, NoopSyntaxChecker, SyntaxChecker};
use std::sync::Arc;
use tracing::{debug, info, warn};

/// Submission gate for app versions
#[derive(Clone)]
pub struct VersionGate {
    reserved_app_name: String,
    unpacker: ArchiveUnpacker,
    syntax_checker: Arc<dyn SyntaxChecker>,
}

impl VersionGate {
    /// Gate with default configuration and the `docker compose` checker.
    pub fn new() -> Self {
        Self::with_config(GateConfig::default())
    }

    pub fn with_config(config: GateConfig) -> Self {
        let syntax_checker: Arc<dyn SyntaxChecker> = if config.syntax_check.enabled {
            Arc::new(DockerComposeChecker::from_config(&config.syntax_check))
        } else {
            Arc::new(NoopSyntaxChecker)
        };
        Self {
            reserved_app_name: config.reserved_app_name,
            unpacker: ArchiveUnpacker::new(config.limits),
            syntax_checker,
        }
    }

    /// Replace the syntax checker.
    pub fn with_syntax_checker(mut self, checker: impl SyntaxChecker + 'static) -> Self {
        self.syntax_checker = Arc::new(checker);
        self
    }

    /// Validate an uploaded version archive.
    ///
    /// `maintainer` and `app` must already satisfy the registry's naming
    /// rules; they are only used to build the required name prefixes.
    pub fn validate(&self, archive: &[u8], maintainer: &str, app: &str) -> Result<()> {
        match self.run(archive, maintainer, app) {
            Ok(()) => {
                info!("Accepted version of {}/{}", maintainer, app);
                Ok(())
            }
            Err(e) => {
                warn!(
                    "Rejected version of {}/{} ({:?}): {}",
                    maintainer,
                    app,
                    e.kind(),
                    e
                );
                Err(e)
            }
        }
    }

    fn run(&self, archive: &[u8], maintainer: &str, app: &str) -> Result<()> {
        if app == self.reserved_app_name {
            return Err(GateError::ReservedAppName(app.to_string()));
        }

        // Dropping `package` removes the extraction directory
        let package = self.unpacker.unpack(archive)?;

        if let Some(path) = package.metadata_path() {
            debug!("Checking {}", path.display());
            metadata::check_metadata_file(path)?;
        }

        let identity = AppIdentity::new(maintainer, app);
        manifest::validate_manifest_file(package.manifest_path(), &identity)?;

        match self.syntax_checker.check(package.manifest_path()) {
            Ok(None) => Ok(()),
            Ok(Some(diagnostic)) => Err(GateError::SyntaxCheckFailed(diagnostic)),
            Err(e) => Err(GateError::SyntaxCheckUnavailable(e.to_string())),
        }
    }
}

impl Default for VersionGate {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Debug for VersionGate {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("VersionGate")
            .field("reserved_app_name", &self.reserved_app_name)
            .field("unpacker", &self.unpacker)
            .finish_non_exhaustive()
    }
}

/// Validate with the default configuration.
pub fn validate(archive: &[u8], maintainer: &str, app: &str) -> Result<()> {
    VersionGate::new().validate(archive, maintainer, app)
}
