//! The session tick loop
//!
//! Drives a [`SessionContext`] at a fixed cadence and feeds it console
//! commands until a quit command or a shutdown signal arrives.

use std::time::Duration;

use tokio::sync::{mpsc, watch};
use tokio::time::MissedTickBehavior;
use tracing::info;

use moonglow_client::commands::ConsoleCommand;

use crate::context::SessionContext;

pub const DEFAULT_TICK_INTERVAL: Duration = Duration::from_millis(50);

/// Run the session loop to completion. Returns once the context has been
/// shut down and every script finalized or timed out.
pub async fn run_session(
    mut ctx: SessionContext,
    mut commands: mpsc::UnboundedReceiver<ConsoleCommand>,
    mut shutdown: watch::Receiver<bool>,
) {
    info!(target: "session", "session loop started");
    let mut ticker = tokio::time::interval(DEFAULT_TICK_INTERVAL);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);
    let mut commands_open = true;

    loop {
        tokio::select! {
            _ = ticker.tick() => {
                ctx.tick();
            }
            command = commands.recv(), if commands_open => {
                match command {
                    Some(command) => {
                        if !ctx.handle_command(command) {
                            info!(target: "session", "quit requested");
                            break;
                        }
                    }
                    // Input source went away; keep ticking until a
                    // shutdown signal arrives.
                    None => commands_open = false,
                }
            }
            _ = shutdown.changed() => {
                info!(target: "session", "shutdown signal received");
                break;
            }
        }
    }

    ctx.shutdown();
    info!(target: "session", "session loop stopped");
}
