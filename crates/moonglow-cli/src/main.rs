//! Console front end: an offline session with the full scripting runtime
//! attached, driven by stdin commands.

mod logging;

use std::fs;
use std::io::{self, BufRead};
use std::path::PathBuf;

use anyhow::Context;
use clap::Parser;
use tokio::sync::{mpsc, watch};
use tracing::{error, info};

use moonglow_client::commands;
use moonglow_client::config::paths;
use moonglow_client::config::Settings;
use moonglow_client::GameSession;
use moonglow_scripting::runner::run_session;
use moonglow_scripting::SessionContext;

#[derive(Parser)]
#[command(name = "moonglow", version, about = "moonglow scripting console")]
struct Args {
    /// Character name for the offline session
    #[arg(long, default_value = "Adventurer")]
    character: String,

    /// Override the script folder
    #[arg(long)]
    scripts: Option<PathBuf>,

    /// Override the settings file location
    #[arg(long)]
    settings: Option<PathBuf>,

    /// Mirror logs to a file in the data directory
    #[arg(long)]
    log_to_file: bool,

    /// Play one script immediately after startup
    #[arg(long)]
    play: Option<String>,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let args = Args::parse();

    let settings_path = args
        .settings
        .clone()
        .or_else(paths::settings_path)
        .context("could not determine the settings path")?;
    let settings = Settings::load(&settings_path)?;

    let _log_guard = logging::init_logging(args.log_to_file || settings.log_to_file)?;

    let script_root = args
        .scripts
        .clone()
        .or_else(|| settings.script_root())
        .context("could not determine the script folder")?;
    fs::create_dir_all(&script_root)
        .with_context(|| format!("creating {}", script_root.display()))?;
    info!(target: "session", "script folder: {}", script_root.display());

    let (session, _net) = GameSession::offline(&args.character);
    let mut ctx = SessionContext::new(session, script_root, &settings);
    ctx.start_scripts(&settings);
    if let Some(name) = &args.play {
        ctx.handle_command(commands::ConsoleCommand::Play(name.clone()));
    }

    let (command_tx, command_rx) = mpsc::unbounded_channel();
    std::thread::spawn(move || {
        let stdin = io::stdin();
        for line in stdin.lock().lines() {
            let Ok(line) = line else { break };
            let line = line.trim();
            if line.is_empty() {
                continue;
            }
            match commands::parse(line) {
                Ok(command) => {
                    if command_tx.send(command).is_err() {
                        break;
                    }
                }
                Err(usage) => println!("{usage}"),
            }
        }
    });

    let (shutdown_tx, shutdown_rx) = watch::channel(false);
    tokio::spawn(async move {
        match tokio::signal::ctrl_c().await {
            Ok(()) => {
                let _ = shutdown_tx.send(true);
            }
            Err(err) => error!("failed to listen for ctrl-c: {err}"),
        }
    });

    run_session(ctx, command_rx, shutdown_rx).await;
    Ok(())
}
