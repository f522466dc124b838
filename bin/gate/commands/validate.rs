//! Validate command - run the submission gate on a local archive

use super::check_names;
use crate::style::colors::*;
use crate::style::*;
use anyhow::{anyhow, Context, Result};
use compose_gate::{zip_directory, GateConfig, GateError, VersionGate};
use serde::Serialize;
use std::path::PathBuf;

/// Machine-readable verdict
#[derive(Debug, Serialize)]
struct Verdict<'a> {
    maintainer: &'a str,
    app: &'a str,
    accepted: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    kind: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    service: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    reason: Option<String>,
}

impl<'a> Verdict<'a> {
    fn new(maintainer: &'a str, app: &'a str, result: &Result<(), GateError>) -> Self {
        match result {
            Ok(()) => Self {
                maintainer,
                app,
                accepted: true,
                kind: None,
                service: None,
                reason: None,
            },
            Err(e) => Self {
                maintainer,
                app,
                accepted: false,
                kind: Some(format!("{:?}", e.kind())),
                service: e.service().map(String::from),
                reason: Some(e.to_string()),
            },
        }
    }
}

pub fn run(
    mut config: GateConfig,
    path: PathBuf,
    maintainer: &str,
    app: &str,
    skip_syntax_check: bool,
    json: bool,
) -> Result<()> {
    check_names(maintainer, app)?;

    let archive = if path.is_dir() {
        zip_directory(&path)?
    } else {
        std::fs::read(&path).with_context(|| format!("Failed to read {}", path.display()))?
    };

    if skip_syntax_check {
        config.syntax_check.enabled = false;
    }
    let result = VersionGate::with_config(config).validate(&archive, maintainer, app);
    let verdict = Verdict::new(maintainer, app, &result);

    if json {
        println!("{}", serde_json::to_string_pretty(&verdict)?);
    } else {
        print_header("Version Validation");
        print_key_value("Archive", &path.display().to_string());
        print_key_value("Size", &format!("{} bytes", archive.len()));
        print_key_value("Maintainer", maintainer);
        print_key_value("App", app);
        if skip_syntax_check {
            print_key_value("Syntax check", &style_dim("skipped"));
        }
        println!();

        match &result {
            Ok(()) => print_success("accepted"),
            Err(e) => {
                println!(
                    "  {} {}rejected:{} {}",
                    icon_error(),
                    BOLD,
                    RESET,
                    style_red(&e.to_string())
                );
                if let Some(service) = e.service() {
                    print_key_value("Service", service);
                }
                print_key_value("Kind", &format!("{:?}", e.kind()));
            }
        }
        println!();
    }

    result.map_err(|e| anyhow!("Version rejected: {}", e))
}
