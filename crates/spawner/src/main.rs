use std::process::ExitCode;

use clap::Parser;
use spawner::{cli, telemetry};

#[tokio::main]
async fn main() -> anyhow::Result<ExitCode> {
    telemetry::init_tracing();
    cli::run(cli::Cli::parse()).await
}
