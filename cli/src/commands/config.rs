// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0

//! Configuration management commands
//!
//! Commands: show, validate, generate

use anyhow::{Context, Result};
use clap::Subcommand;
use colored::Colorize;
use std::path::PathBuf;

use fabric_core::domain::config::FabricConfigManifest;

#[derive(Subcommand)]
pub enum ConfigCommand {
    /// Show current configuration
    Show {
        /// Show config file paths checked
        #[arg(long)]
        paths: bool,
    },

    /// Validate configuration file
    Validate {
        /// Path to config file (default: discover)
        #[arg(value_name = "FILE")]
        file: Option<PathBuf>,
    },

    /// Generate a configuration file populated with defaults
    Generate {
        /// Output path (default: ./fabric-config.yaml)
        #[arg(short, long, default_value = "./fabric-config.yaml")]
        output: PathBuf,
    },
}

pub async fn handle_command(command: ConfigCommand, config_override: Option<PathBuf>) -> Result<()> {
    match command {
        ConfigCommand::Show { paths } => show(config_override, paths).await,
        ConfigCommand::Validate { file } => validate(file.or(config_override)).await,
        ConfigCommand::Generate { output } => generate(output).await,
    }
}

fn redact(value: &Option<String>) -> String {
    match value {
        Some(v) if !v.is_empty() => "********".to_string(),
        _ => "(not set)".to_string(),
    }
}

async fn show(config_override: Option<PathBuf>, show_paths: bool) -> Result<()> {
    let config =
        FabricConfigManifest::load_or_default(config_override.clone()).context("Failed to load configuration")?;

    if show_paths {
        println!("{}", "Configuration discovery paths:".bold());
        if let Some(path) = &config_override {
            println!("  1. --config flag: {}", path.display());
        } else {
            println!("  1. --config flag: {}", "(not set)".dimmed());
        }
        println!(
            "  2. FABRIC_CONFIG_PATH: {}",
            std::env::var("FABRIC_CONFIG_PATH")
                .unwrap_or_else(|_| "(not set)".to_string())
                .dimmed()
        );
        println!("  3. ./fabric-config.yaml");
        println!("  4. ~/.fabric/config.yaml");
        println!("  5. /etc/fabric/config.yaml");
        println!();
    }

    let spec = &config.spec;
    println!("{} {}", "Configuration:".bold(), config.metadata.name);
    println!();

    println!("{}", "Database:".bold());
    println!("  URL: {}", redact(&spec.database.url));
    println!("  Max connections: {}", spec.database.max_connections);
    println!();

    println!("{}", "Bus:".bold());
    println!("  Ack wait: {}s", spec.bus.ack_wait_secs);
    println!("  Max deliver: {}", spec.bus.max_deliver);
    println!("  Redelivery delay: {}ms", spec.bus.redelivery_delay_ms);
    println!();

    println!("{}", "Security:".bold());
    println!("  API token: {}", redact(&spec.security.api_token));
    println!("  Extra secret fields: {}", spec.security.extra_secret_field_names.len());
    println!("  Extra secret paths: {}", spec.security.extra_secret_path_patterns.len());
    println!();

    println!("{}", "Dex:".bold());
    println!("  Secret: {}/{}", spec.dex.namespace, spec.dex.secret_name);
    println!("  API server: {}", spec.dex.api_server);
    println!();

    println!("{}", "HTTP:".bold());
    println!("  Listen: {}:{}", spec.http.bind_address, spec.http.port);
    println!("  Metrics port: {}", spec.http.metrics_port);
    println!();

    println!("{}", "Delivery gateway:".bold());
    println!("  URL: {}", spec.delivery_gateway.url);
    println!("  Timeout: {}s", spec.delivery_gateway.timeout_secs);
    println!();

    println!("{}", "RBAC:".bold());
    println!("  Super admins: {:?}", spec.rbac.super_admin_user_ids);
    println!("  Default grants: {}", spec.rbac.default_grants.join(", "));

    Ok(())
}

async fn validate(config_path: Option<PathBuf>) -> Result<()> {
    println!("Validating configuration...");

    let config = FabricConfigManifest::load_or_default(config_path).context("Failed to load configuration")?;

    config.validate().context("Configuration validation failed")?;

    println!("{}", "✓ Configuration is valid".green());

    Ok(())
}

async fn generate(output: PathBuf) -> Result<()> {
    FabricConfigManifest::default()
        .to_yaml_file(&output)
        .with_context(|| format!("Failed to write config to {:?}", output))?;

    println!("{}", format!("✓ Configuration generated: {}", output.display()).green());

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_generated_config_validates() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("fabric-config.yaml");

        generate(path.clone()).await.unwrap();
        validate(Some(path.clone())).await.unwrap();

        let loaded = FabricConfigManifest::from_yaml_file(&path).unwrap();
        assert_eq!(loaded.spec.http.port, 8080);
    }

    #[test]
    fn test_redact_hides_values() {
        assert_eq!(redact(&Some("postgres://u:p@db/fabric".into())), "********");
        assert_eq!(redact(&None), "(not set)");
    }
}
