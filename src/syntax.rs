//! Compose syntax verification
//!
//! The policy rules only model what they forbid. Anything else the compose
//! schema rejects is caught by running `docker compose config` against the
//! extracted manifest.

use crate::config::SyntaxCheckConfig;
use std::io;
use std::path::Path;
use std::process::{Command, Stdio};
use tracing::debug;

/// Checks a manifest file for compose schema errors.
pub trait SyntaxChecker: Send + Sync {
    /// `Ok(None)` when the manifest is valid, `Ok(Some(diagnostic))` when the
    /// checker rejected it, `Err` when the checker itself could not run.
    fn check(&self, manifest: &Path) -> io::Result<Option<String>>;
}

/// Runs `docker compose -f <manifest> config`
#[derive(Debug, Clone)]
pub struct DockerComposeChecker {
    program: String,
}

impl DockerComposeChecker {
    pub fn new(program: impl Into<String>) -> Self {
        Self {
            program: program.into(),
        }
    }

    pub fn from_config(config: &SyntaxCheckConfig) -> Self {
        Self::new(config.program.clone())
    }

    /// Check that `docker compose` is installed and runnable.
    pub fn probe(&self) -> io::Result<()> {
        let status = Command::new(&self.program)
            .args(["compose", "version"])
            .stdout(Stdio::null())
            .stderr(Stdio::null())
            .status()?;
        if status.success() {
            Ok(())
        } else {
            Err(io::Error::other(format!(
                "'{} compose version' exited with {}",
                self.program, status
            )))
        }
    }
}

impl Default for DockerComposeChecker {
    fn default() -> Self {
        Self::new("docker")
    }
}

impl SyntaxChecker for DockerComposeChecker {
    fn check(&self, manifest: &Path) -> io::Result<Option<String>> {
        debug!("Running {} compose config on {}", self.program, manifest.display());

        let output = Command::new(&self.program)
            .arg("compose")
            .arg("-f")
            .arg(manifest)
            .arg("config")
            .stdin(Stdio::null())
            .stdout(Stdio::null())
            .stderr(Stdio::piped())
            .output()?;

        if output.status.success() {
            return Ok(None);
        }

        let stderr = String::from_utf8_lossy(&output.stderr);
        let diagnostic = strip_path_prefix(stderr.trim(), manifest);
        if diagnostic.is_empty() {
            return Ok(Some(format!("exited with {}", output.status)));
        }
        Ok(Some(diagnostic.to_string()))
    }
}

/// Accepts every manifest. Used when the syntax check is disabled.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoopSyntaxChecker;

impl SyntaxChecker for NoopSyntaxChecker {
    fn check(&self, _manifest: &Path) -> io::Result<Option<String>> {
        Ok(None)
    }
}

/// Remove a leading `"<manifest path>: "` from checker output. Output that
/// names the file some other way loses everything up to the first `": "`.
pub fn strip_path_prefix<'a>(message: &'a str, manifest: &Path) -> &'a str {
    let path = manifest.to_string_lossy();
    if let Some(rest) = message
        .strip_prefix(path.as_ref())
        .and_then(|rest| rest.strip_prefix(": "))
    {
        return rest;
    }
    match message.split_once(": ") {
        Some((_, rest)) => rest,
        None => message,
    }
}
