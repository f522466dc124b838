//! Check-tools command - verify the syntax checker can run

use crate::style::*;
use anyhow::{anyhow, Result};
use compose_gate::{DockerComposeChecker, GateConfig};

pub fn run(config: &GateConfig) -> Result<()> {
    if !config.syntax_check.enabled {
        print_warning("Syntax check is disabled in the configuration");
        return Ok(());
    }

    let checker = DockerComposeChecker::from_config(&config.syntax_check);
    match checker.probe() {
        Ok(()) => {
            print_success(&format!("{} compose is available", config.syntax_check.program));
            Ok(())
        }
        Err(e) => {
            print_error(&format!(
                "{} compose is not installed or not accessible in PATH: {}",
                config.syntax_check.program, e
            ));
            Err(anyhow!(
                "docker compose is required for docker-compose.yml validation"
            ))
        }
    }
}
