mod config;
mod fetch;
mod refresh;
mod run;

use serde_json::Value;
use snapline_core::{ConfigLoader, SnaplineConfig, SnaplineService};

use crate::cli::{Cli, Command};
use crate::error::CliError;

pub async fn run(cli: &Cli) -> Result<Value, CliError> {
    let config = load_config(cli)?;

    match &cli.command {
        Command::Config => config::run(&config),
        Command::Run(args) => run::run(args, build_service(config)?).await,
        Command::Fetch(args) => fetch::run(args, build_service(config)?).await,
        Command::Refresh(args) => refresh::run(args, build_service(config)?).await,
    }
}

fn load_config(cli: &Cli) -> Result<SnaplineConfig, CliError> {
    let mut loader = ConfigLoader::new();
    if let Some(path) = &cli.config {
        loader = loader.with_config_path(path);
    }
    Ok(loader.load()?)
}

fn build_service(config: SnaplineConfig) -> Result<SnaplineService, CliError> {
    Ok(SnaplineService::builder(config).build()?)
}
