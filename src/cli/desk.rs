//! `regent desk`: serve the approval desk on a Unix socket.

use crate::cli::approvals::open_desk;
use crate::config::Settings;
use crate::desk::DeskServer;
use anyhow::Result;
use clap::Subcommand;
use colored::Colorize;
use std::path::PathBuf;

#[derive(Subcommand)]
pub enum DeskCommand {
    /// Accept approval decisions over a Unix socket until interrupted
    Serve {
        /// Socket path (defaults to <data_dir>/desk.sock)
        #[arg(long)]
        socket: Option<PathBuf>,
    },
}

pub async fn run_desk(settings: &Settings, command: DeskCommand) -> Result<()> {
    match command {
        DeskCommand::Serve { socket } => {
            let socket = socket.unwrap_or_else(|| settings.desk_socket());
            let server = DeskServer::new(&socket, open_desk(settings)?);

            println!();
            println!(
                "  {} Approval desk listening on {}",
                "▶".green(),
                socket.display().to_string().bold()
            );
            println!("  {}", "Press Ctrl-C to stop.".dimmed());
            println!();

            let outcome = tokio::select! {
                result = server.run() => result,
                _ = tokio::signal::ctrl_c() => Ok(()),
            };
            if socket.exists() {
                std::fs::remove_file(&socket).ok();
            }
            outcome
        }
    }
}
