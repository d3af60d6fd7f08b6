use std::{process::ExitCode, sync::Arc};

use clap::{Args, Parser, Subcommand};
use serde_json::json;
use tracing::info;

use crate::{
    LifecycleController, MarathonClient, PollStatus, RemoteExecutor, SpawnerState, build_client,
    config, descriptor, version,
};

#[derive(Debug, Parser)]
#[command(
    name = "spawnerctl",
    version = version::VERSION,
    long_version = version::FULL_VERSION,
    about = "spawnerctl - per-tenant notebook workloads on Marathon"
)]
pub struct Cli {
    /// Config file, with or without extension.
    #[arg(long, env = config::CONFIG_PATH_ENV, default_value = "spawner")]
    pub config: String,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Debug, Clone, Args)]
pub struct UserArgs {
    /// Tenant (hub user) name.
    #[arg(long, short = 'u')]
    pub user: String,
}

#[derive(Debug, Subcommand)]
pub enum Command {
    /// Create the tenant's application and wait until it is healthy.
    Start(UserArgs),
    /// Delete the tenant's application.
    Stop {
        #[command(flatten)]
        user: UserArgs,
        /// Return right after the delete instead of waiting for the deployment.
        #[arg(long)]
        now: bool,
    },
    /// Report the workload status once.
    Poll(UserArgs),
    /// Print the state the hub persists for the tenant.
    State(UserArgs),
    /// Print the creation payload without contacting Marathon.
    Render(UserArgs),
}

impl Command {
    fn user(&self) -> &str {
        match self {
            Command::Start(args)
            | Command::Poll(args)
            | Command::State(args)
            | Command::Render(args)
            | Command::Stop { user: args, .. } => &args.user,
        }
    }
}

/// Process exit code for a poll result: `0` while the workload is alive,
/// `2 + exit status` once it is not.
pub fn poll_exit_code(status: PollStatus) -> u8 {
    match status.exit_status() {
        None => 0,
        Some(code) => u8::try_from(code).map_or(u8::MAX, |code| code.saturating_add(2)),
    }
}

pub async fn run(cli: Cli) -> anyhow::Result<ExitCode> {
    let cfg = config::load_from(&cli.config)?;
    let tenant = cli.command.user().to_string();
    let app_id = descriptor::app_id(&cfg.app_prefix, &tenant);

    if let Command::State(_) = cli.command {
        println!(
            "{}",
            serde_json::to_string_pretty(&SpawnerState::for_app(app_id))?
        );
        return Ok(ExitCode::SUCCESS);
    }

    let client = build_client(&cfg)?;
    let api = Arc::new(MarathonClient::from_config(&cfg, client));
    let executor = RemoteExecutor::new(cfg.remote_concurrency);
    let controller = LifecycleController::from_config(&cfg, api, executor);
    info!(
        marathon = %cfg.marathon_url,
        %app_id,
        version = version::VERSION,
        git_sha = version::GIT_SHA,
        "spawnerctl starting"
    );

    match cli.command {
        Command::Start(_) => {
            let endpoint = controller.start(&cfg.descriptor(&tenant)).await?;
            println!(
                "{}",
                json!({"app_id": app_id, "ip": endpoint.ip, "port": endpoint.port})
            );
        }
        Command::Stop { now, .. } => {
            controller.stop(&app_id, now).await?;
            println!("{}", json!({"app_id": app_id, "stopped": true}));
        }
        Command::Poll(_) => {
            let status = controller.poll(&app_id).await?;
            println!(
                "{}",
                json!({"app_id": app_id, "status": status, "exit_status": status.exit_status()})
            );
            return Ok(ExitCode::from(poll_exit_code(status)));
        }
        Command::Render(_) => {
            let request = controller.render(&cfg.descriptor(&tenant)).await?;
            println!("{}", serde_json::to_string_pretty(&request)?);
        }
        Command::State(_) => {}
    }

    Ok(ExitCode::SUCCESS)
}
