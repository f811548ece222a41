// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0

//! Daemon mode implementation
//!
//! Handles:
//! - Service wiring and the HTTP server ([`server`])
//! - HTTP health checks against a running daemon

use anyhow::Result;
use std::time::Duration;

pub mod server;

pub use server::start_daemon;

#[derive(Debug, Clone, PartialEq)]
pub enum DaemonStatus {
    Running { uptime: Option<u64> },
    Stopped,
    Unhealthy { error: String },
}

fn base_url(host: &str, port: u16) -> String {
    if host.starts_with("http://") || host.starts_with("https://") {
        format!("{}:{}", host, port)
    } else {
        format!("http://{}:{}", host, port)
    }
}

/// Probe `GET /health` on the daemon.
pub async fn check_daemon_running(host: &str, port: u16) -> Result<DaemonStatus> {
    let client = reqwest::Client::builder()
        .timeout(Duration::from_millis(500))
        .build()?;
    let health_url = format!("{}/health", base_url(host, port));

    match client.get(&health_url).send().await {
        Ok(resp) if resp.status().is_success() => {
            let uptime = resp
                .json::<serde_json::Value>()
                .await
                .ok()
                .and_then(|v| v["uptime_seconds"].as_u64());
            Ok(DaemonStatus::Running { uptime })
        }
        Ok(resp) => Ok(DaemonStatus::Unhealthy {
            error: format!("HTTP {}", resp.status()),
        }),
        Err(_) => Ok(DaemonStatus::Stopped),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_base_url_keeps_scheme() {
        assert_eq!(base_url("127.0.0.1", 8080), "http://127.0.0.1:8080");
        assert_eq!(base_url("https://fabric.internal", 443), "https://fabric.internal:443");
    }

    #[tokio::test]
    async fn test_unreachable_daemon_is_stopped() {
        let status = check_daemon_running("127.0.0.1", 9).await.unwrap();
        assert_eq!(status, DaemonStatus::Stopped);
    }
}
