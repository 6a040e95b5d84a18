mod generate;
mod providers;

use genroute_core::{DispatcherBuilder, OrchestratorConfig, RequestDispatcher};
use serde_json::Value;
use tracing::debug;

use crate::cli::{Cli, Command};
use crate::error::CliError;

pub async fn run(cli: &Cli) -> Result<Value, CliError> {
    let dispatcher = build_dispatcher(cli)?;

    match &cli.command {
        Command::Generate(args) => generate::run(args, &dispatcher).await,
        Command::Providers(args) => providers::run(args, &dispatcher),
    }
}

fn build_dispatcher(cli: &Cli) -> Result<RequestDispatcher, CliError> {
    let config = match &cli.config {
        Some(path) => {
            debug!(path = %path.display(), "loading config");
            OrchestratorConfig::from_path(path)?
        }
        None => OrchestratorConfig::default(),
    };

    Ok(DispatcherBuilder::from_config(&config)?.build()?)
}
