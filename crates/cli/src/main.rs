mod app;
mod cli;
mod commands;
mod daemon;

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use anyhow::{Context, Result};
use clap::Parser;
use tracing::{info, warn};

use greenbatch_core::config::{load_dotenv, Config};

use crate::app::App;
use crate::cli::{CliArgs, Command};

#[tokio::main]
async fn main() -> Result<()> {
    load_dotenv();

    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .with_target(false)
        .init();

    let args = CliArgs::parse();
    let config = match &args.profile {
        Some(profile) => Config::for_profile(profile),
        None => Config::from_env(),
    };
    config.log_summary();

    let shutdown = Arc::new(AtomicBool::new(false));
    {
        let shutdown = Arc::clone(&shutdown);
        tokio::spawn(async move {
            if tokio::signal::ctrl_c().await.is_ok() {
                warn!("ctrl-c received, shutting down");
                shutdown.store(true, Ordering::Relaxed);
            }
        });
    }

    // Object storage drives its own runtime, so commands run off the async workers.
    let command = args.command;
    tokio::task::spawn_blocking(move || run(config, command, &shutdown))
        .await
        .context("command task panicked")?
}

fn run(config: Config, command: Command, shutdown: &AtomicBool) -> Result<()> {
    let app = App::build(config)?;
    match command {
        Command::Schedule => commands::schedule(&app),
        Command::Execute { instantly, ignore_timeout } => commands::execute(&app, instantly, ignore_timeout),
        Command::Reconcile => commands::reconcile(&app),
        Command::Reset { yes } => commands::reset(&app, yes),
        Command::Gather { max_cycles } => commands::gather(&app, max_cycles, shutdown),
        Command::Daemon => {
            daemon::run(&app, shutdown);
            Ok(())
        }
        Command::Status => {
            let status = commands::status(&app)?;
            println!("{}", serde_json::to_string_pretty(&status)?);
            info!("status printed");
            Ok(())
        }
    }
}
