mod cli;
mod commands;
mod error;
mod output;
mod telemetry;

use clap::Parser;
use std::process::ExitCode;

use crate::cli::Cli;
use crate::error::CliError;

#[tokio::main]
async fn main() -> ExitCode {
    match run().await {
        Ok(()) => ExitCode::SUCCESS,
        Err(error) => {
            eprintln!("error: {error}");
            ExitCode::from(error.exit_code())
        }
    }
}

async fn run() -> Result<(), CliError> {
    let cli = Cli::parse();
    telemetry::init_tracing(cli.log_json)?;

    let data = commands::run(&cli).await?;
    output::render(&data, cli.pretty)
}
