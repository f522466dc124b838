//! Compose Gate CLI
//!
//! Runs the submission gate against local archives, completes accepted
//! manifests for deployment and packs app directories into archives.

mod commands;
mod style;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use compose_gate::GateConfig;
use std::path::PathBuf;

#[derive(Parser, Debug)]
#[command(name = "compose-gate")]
#[command(about = "Policy gate for packaged docker-compose apps")]
#[command(version)]
struct Cli {
    /// Gate configuration file (TOML)
    #[arg(short, long, global = true, env = "COMPOSE_GATE_CONFIG")]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Validate an app version archive (or a directory, packed on the fly)
    Validate {
        /// ZIP archive or app directory
        path: PathBuf,

        /// Maintainer that owns the app
        #[arg(short, long)]
        maintainer: String,

        /// App name
        #[arg(short, long)]
        app: String,

        /// Skip the `docker compose config` check
        #[arg(long, env = "COMPOSE_GATE_SKIP_SYNTAX_CHECK")]
        skip_syntax_check: bool,

        /// Print the verdict as JSON
        #[arg(long)]
        json: bool,
    },

    /// Rewrite an accepted docker-compose.yml into its deployable form
    Complete {
        /// docker-compose.yml to rewrite in place
        file: PathBuf,

        /// Maintainer that owns the app
        #[arg(short, long)]
        maintainer: String,

        /// App name
        #[arg(short, long)]
        app: String,
    },

    /// Pack an app directory into a version archive
    Pack {
        /// Directory containing docker-compose.yml and optionally app.yml
        dir: PathBuf,

        /// Output ZIP file
        #[arg(short, long, default_value = "app.zip")]
        output: PathBuf,
    },

    /// Check that `docker compose` is available
    CheckTools,
}

fn main() -> Result<()> {
    // Logs go to stderr so JSON verdicts stay parseable
    tracing_subscriber::fmt()
        .with_writer(std::io::stderr)
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive("compose_gate=debug".parse()?)
                .add_directive("info".parse()?),
        )
        .init();

    let cli = Cli::parse();
    let config = match &cli.config {
        Some(path) => GateConfig::from_file(path)
            .with_context(|| format!("Failed to load config from {}", path.display()))?,
        None => GateConfig::default(),
    };

    match cli.command {
        Commands::Validate {
            path,
            maintainer,
            app,
            skip_syntax_check,
            json,
        } => commands::validate::run(config, path, &maintainer, &app, skip_syntax_check, json),
        Commands::Complete {
            file,
            maintainer,
            app,
        } => commands::complete::run(file, &maintainer, &app),
        Commands::Pack { dir, output } => commands::pack::run(dir, output),
        Commands::CheckTools => commands::check_tools::run(&config),
    }
}
