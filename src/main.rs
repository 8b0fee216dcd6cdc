//! SocialHands - autonomous social media agent
//!
//! Main entry point for the SocialHands CLI, API server and worker.

mod cli;
mod cmd_control;
mod server;

use clap::Parser;
use tracing::warn;

use socialhands_config::{Config, ConfigLoader, ConfigValidator};

use crate::cli::{Cli, Commands, Roles};
use crate::server::Services;

fn load_config(cli: &Cli) -> Result<Config, Box<dyn std::error::Error>> {
    let config = ConfigLoader::load_or_default(&cli.config)?;
    let validation = ConfigValidator::validate(&config);
    for warning in &validation.warnings {
        warn!("Config {}: {}", warning.path, warning.message);
    }
    if !validation.is_valid() {
        let errors: Vec<String> = validation
            .errors
            .iter()
            .map(|e| format!("{}: {}", e.path, e.message))
            .collect();
        return Err(format!("invalid configuration: {}", errors.join("; ")).into());
    }
    Ok(config)
}

fn apply_overrides(config: &mut Config, host: Option<String>, port: Option<u16>) {
    if let Some(host) = host {
        config.server.host = host;
    }
    if let Some(port) = port {
        config.server.port = port;
    }
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    server::init_tracing()?;

    let cli = Cli::parse();
    let mut config = load_config(&cli)?;
    let default_worker = format!("worker-{}", std::process::id());

    match cli.command {
        None => server::run(config, Roles::ALL, default_worker).await,
        Some(Commands::Run { host, port }) => {
            apply_overrides(&mut config, host, port);
            server::run(config, Roles::ALL, default_worker).await
        }
        Some(Commands::Serve { host, port }) => {
            apply_overrides(&mut config, host, port);
            server::run(config, Roles::SERVE, default_worker).await
        }
        Some(Commands::Worker { id }) => {
            server::run(config, Roles::WORKER, id.unwrap_or(default_worker)).await
        }
        Some(Commands::Enqueue {
            job_type,
            data,
            priority,
        }) => {
            let services = Services::open(config).await?;
            cmd_control::enqueue(&services, &job_type, &data, priority).await
        }
        Some(Commands::Dispatcher { action }) => {
            let services = Services::open(config).await?;
            cmd_control::dispatcher(&services, action).await
        }
        Some(Commands::Status) => {
            let services = Services::open(config).await?;
            cmd_control::status(&services).await
        }
        Some(Commands::Schedule { date }) => {
            let services = Services::open(config).await?;
            cmd_control::schedule(&services, date).await
        }
    }
}
