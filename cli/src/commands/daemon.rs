// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0

//! Daemon commands
//!
//! Commands: run, status

use anyhow::Result;
use clap::Subcommand;
use colored::Colorize;
use std::path::PathBuf;

use crate::daemon::{check_daemon_running, start_daemon, DaemonStatus};

#[derive(Subcommand)]
pub enum DaemonCommand {
    /// Run the daemon in the foreground until SIGTERM / Ctrl+C
    Run,

    /// Check daemon status
    Status,
}

pub async fn handle_command(
    command: DaemonCommand,
    config_path: Option<PathBuf>,
    host: &str,
    port: Option<u16>,
) -> Result<()> {
    match command {
        DaemonCommand::Run => start_daemon(config_path, port).await,
        DaemonCommand::Status => status(host, port.unwrap_or(8080)).await,
    }
}

async fn status(host: &str, port: u16) -> Result<()> {
    match check_daemon_running(host, port).await? {
        DaemonStatus::Running { uptime } => {
            println!("{}", "✓ Daemon is running".green());
            if let Some(uptime) = uptime {
                println!("  Uptime: {}s", uptime);
            }
        }
        DaemonStatus::Unhealthy { error } => {
            println!("{}", "⚠ Daemon is unhealthy".yellow());
            println!("  Error: {}", error);
        }
        DaemonStatus::Stopped => {
            println!("{}", "✗ Daemon is not running".red());
        }
    }
    Ok(())
}
