// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0

//! Command implementations for the fabric CLI

pub mod config;
pub mod daemon;
pub mod migrate;

pub use self::config::ConfigCommand;
pub use self::daemon::DaemonCommand;
pub use self::migrate::MigrateCommand;
