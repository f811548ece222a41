// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0

// Fabric Configuration Types
//
// Defines the configuration schema for a workflow event fabric node:
// - Kubernetes-style manifest format (apiVersion/kind/metadata/spec)
// - Persistence and message bus settings
// - Secret encryption token and extra secret field classifiers
// - Dex secret location and delivery-platform gateway
// - HTTP, logging and RBAC settings

use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::{Path, PathBuf};

pub const API_VERSION: &str = "100monkeys.ai/v1";
pub const KIND: &str = "FabricConfig";

/// Top-level Kubernetes-style fabric configuration manifest
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FabricConfigManifest {
    /// API version (must be "100monkeys.ai/v1")
    #[serde(rename = "apiVersion")]
    pub api_version: String,

    /// Resource kind (must be "FabricConfig")
    pub kind: String,

    pub metadata: ManifestMetadata,

    pub spec: FabricConfigSpec,
}

/// Manifest metadata (Kubernetes-style)
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ManifestMetadata {
    pub name: String,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub version: Option<String>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub labels: Option<HashMap<String, String>>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct FabricConfigSpec {
    #[serde(default)]
    pub database: DatabaseConfig,

    #[serde(default)]
    pub bus: BusConfig,

    #[serde(default)]
    pub security: SecurityConfig,

    #[serde(default)]
    pub dex: DexConfig,

    #[serde(default)]
    pub http: HttpConfig,

    #[serde(default)]
    pub logging: LoggingConfig,

    #[serde(default)]
    pub delivery_gateway: DeliveryGatewayConfig,

    #[serde(default)]
    pub rbac: RbacConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DatabaseConfig {
    /// PostgreSQL connection string. In-memory repositories when unset.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub url: Option<String>,

    #[serde(default = "default_max_connections")]
    pub max_connections: u32,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BusConfig {
    /// Per-delivery handler deadline in seconds.
    #[serde(default = "default_ack_wait_secs")]
    pub ack_wait_secs: u64,

    /// Deliveries per message before it is dropped.
    #[serde(default = "default_max_deliver")]
    pub max_deliver: u32,

    #[serde(default = "default_redelivery_delay_ms")]
    pub redelivery_delay_ms: u64,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct SecurityConfig {
    /// Installation API token; the snapshot encryption key is derived from it.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub api_token: Option<String>,

    /// Additional leaf key names to always encrypt.
    #[serde(default)]
    pub extra_secret_field_names: Vec<String>,

    /// Additional dotted path suffixes to always encrypt.
    #[serde(default)]
    pub extra_secret_path_patterns: Vec<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DexConfig {
    #[serde(default = "default_dex_namespace")]
    pub namespace: String,

    #[serde(default = "default_dex_secret_name")]
    pub secret_name: String,

    /// Platform base URL written under the secret's `url` key.
    #[serde(default)]
    pub url: String,

    #[serde(default = "default_kube_api_server")]
    pub api_server: String,

    #[serde(default = "default_kube_token_path")]
    pub token_path: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HttpConfig {
    #[serde(default = "default_bind_address")]
    pub bind_address: String,

    #[serde(default = "default_http_port")]
    pub port: u16,

    #[serde(default = "default_metrics_port")]
    pub metrics_port: u16,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoggingConfig {
    #[serde(default = "default_log_level")]
    pub level: String,

    /// `compact` or `json`
    #[serde(default = "default_log_format")]
    pub format: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DeliveryGatewayConfig {
    /// Base URL of the delivery platform's internal API.
    #[serde(default = "default_gateway_url")]
    pub url: String,

    #[serde(default = "default_gateway_timeout_secs")]
    pub timeout_secs: u64,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct RbacConfig {
    /// Users granted every action.
    #[serde(default)]
    pub super_admin_user_ids: Vec<i32>,

    /// `"<resource>:<action>"` grants applied to every authenticated user.
    #[serde(default)]
    pub default_grants: Vec<String>,
}

fn default_max_connections() -> u32 {
    5
}

fn default_ack_wait_secs() -> u64 {
    120
}

fn default_max_deliver() -> u32 {
    5
}

fn default_redelivery_delay_ms() -> u64 {
    500
}

fn default_dex_namespace() -> String {
    "devtroncd".to_string()
}

fn default_dex_secret_name() -> String {
    "argocd-secret".to_string()
}

fn default_kube_api_server() -> String {
    "https://kubernetes.default.svc".to_string()
}

fn default_kube_token_path() -> String {
    "/var/run/secrets/kubernetes.io/serviceaccount/token".to_string()
}

fn default_bind_address() -> String {
    "0.0.0.0".to_string()
}

fn default_http_port() -> u16 {
    8080
}

fn default_metrics_port() -> u16 {
    9091
}

fn default_log_level() -> String {
    "info".to_string()
}

fn default_log_format() -> String {
    "compact".to_string()
}

fn default_gateway_url() -> String {
    "http://localhost:8081".to_string()
}

fn default_gateway_timeout_secs() -> u64 {
    30
}

impl Default for DatabaseConfig {
    fn default() -> Self {
        Self {
            url: None,
            max_connections: default_max_connections(),
        }
    }
}

impl Default for BusConfig {
    fn default() -> Self {
        Self {
            ack_wait_secs: default_ack_wait_secs(),
            max_deliver: default_max_deliver(),
            redelivery_delay_ms: default_redelivery_delay_ms(),
        }
    }
}

impl Default for DexConfig {
    fn default() -> Self {
        Self {
            namespace: default_dex_namespace(),
            secret_name: default_dex_secret_name(),
            url: String::new(),
            api_server: default_kube_api_server(),
            token_path: default_kube_token_path(),
        }
    }
}

impl Default for HttpConfig {
    fn default() -> Self {
        Self {
            bind_address: default_bind_address(),
            port: default_http_port(),
            metrics_port: default_metrics_port(),
        }
    }
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
            format: default_log_format(),
        }
    }
}

impl Default for DeliveryGatewayConfig {
    fn default() -> Self {
        Self {
            url: default_gateway_url(),
            timeout_secs: default_gateway_timeout_secs(),
        }
    }
}

impl Default for FabricConfigManifest {
    fn default() -> Self {
        Self {
            api_version: API_VERSION.to_string(),
            kind: KIND.to_string(),
            metadata: ManifestMetadata {
                name: "fabric".to_string(),
                version: Some("1.0.0".to_string()),
                labels: None,
            },
            spec: FabricConfigSpec::default(),
        }
    }
}

impl FabricConfigManifest {
    /// Load configuration from YAML file
    pub fn from_yaml_file(path: impl AsRef<Path>) -> anyhow::Result<Self> {
        let content = std::fs::read_to_string(path)?;
        let config = serde_yaml::from_str(&content)?;
        Ok(config)
    }

    /// Save configuration to YAML file
    pub fn to_yaml_file(&self, path: impl AsRef<Path>) -> anyhow::Result<()> {
        let yaml = serde_yaml::to_string(self)?;
        std::fs::write(path, yaml)?;
        Ok(())
    }

    pub fn from_yaml_str(yaml: &str) -> anyhow::Result<Self> {
        let config = serde_yaml::from_str(yaml)?;
        Ok(config)
    }

    /// Discover configuration file using precedence order
    /// 1. FABRIC_CONFIG_PATH environment variable
    /// 2. ./fabric-config.yaml (working directory)
    /// 3. ~/.fabric/config.yaml (user home)
    /// 4. /etc/fabric/config.yaml
    pub fn discover_config() -> Option<PathBuf> {
        if let Ok(path) = std::env::var("FABRIC_CONFIG_PATH") {
            let path = PathBuf::from(path);
            if path.exists() {
                return Some(path);
            }
        }

        let cwd = PathBuf::from("./fabric-config.yaml");
        if cwd.exists() {
            return Some(cwd);
        }

        if let Some(home) = dirs::home_dir() {
            let user_config = home.join(".fabric").join("config.yaml");
            if user_config.exists() {
                return Some(user_config);
            }
        }

        let system_config = PathBuf::from("/etc/fabric/config.yaml");
        if system_config.exists() {
            return Some(system_config);
        }

        None
    }

    /// Load configuration with discovery, fallback to default
    pub fn load_or_default(cli_path: Option<PathBuf>) -> anyhow::Result<Self> {
        // Explicit CLI path fails if missing/invalid
        if let Some(path) = cli_path {
            tracing::info!("Loading configuration from explicit path: {:?}", path);
            let mut config = Self::from_yaml_file(&path)
                .map_err(|e| anyhow::anyhow!("Failed to load config at {:?}: {}", path, e))?;
            config.apply_env_overrides();
            return Ok(config);
        }

        if let Some(config_path) = Self::discover_config() {
            tracing::info!("Loading configuration from discovered path: {:?}", config_path);
            let mut config = Self::from_yaml_file(config_path)?;
            config.apply_env_overrides();
            Ok(config)
        } else {
            tracing::warn!("No configuration file found in standard locations. Using defaults.");
            let mut config = Self::default();
            config.apply_env_overrides();
            Ok(config)
        }
    }

    /// Apply environment variable overrides to configuration
    pub fn apply_env_overrides(&mut self) {
        self.apply_overrides_from(|key| std::env::var(key).ok());
    }

    fn apply_overrides_from(&mut self, lookup: impl Fn(&str) -> Option<String>) {
        if let Some(url) = lookup("FABRIC_DATABASE_URL") {
            tracing::info!("Environment override: FABRIC_DATABASE_URL");
            self.spec.database.url = Some(url);
        }
        if let Some(token) = lookup("FABRIC_API_TOKEN") {
            tracing::info!("Environment override: FABRIC_API_TOKEN");
            self.spec.security.api_token = Some(token);
        }
        if let Some(level) = lookup("FABRIC_LOG_LEVEL") {
            tracing::info!("Environment override: FABRIC_LOG_LEVEL={}", level);
            self.spec.logging.level = level;
        }
        if let Some(namespace) = lookup("FABRIC_DEX_NAMESPACE") {
            tracing::info!("Environment override: FABRIC_DEX_NAMESPACE={}", namespace);
            self.spec.dex.namespace = namespace;
        }
        if let Some(url) = lookup("FABRIC_DELIVERY_GATEWAY_URL") {
            tracing::info!("Environment override: FABRIC_DELIVERY_GATEWAY_URL={}", url);
            self.spec.delivery_gateway.url = url;
        }
    }

    /// Validate configuration
    pub fn validate(&self) -> anyhow::Result<()> {
        if self.api_version != API_VERSION {
            anyhow::bail!(
                "Invalid apiVersion: '{}'. Must be '{}'",
                self.api_version,
                API_VERSION
            );
        }

        if self.kind != KIND {
            anyhow::bail!("Invalid kind: '{}'. Must be '{}'", self.kind, KIND);
        }

        if self.metadata.name.is_empty() {
            anyhow::bail!("metadata.name cannot be empty");
        }

        if self.spec.bus.max_deliver == 0 {
            anyhow::bail!("spec.bus.max_deliver must be at least 1");
        }

        if self.spec.bus.ack_wait_secs == 0 {
            anyhow::bail!("spec.bus.ack_wait_secs must be greater than 0");
        }

        if let Some(token) = &self.spec.security.api_token {
            if token.is_empty() {
                anyhow::bail!("spec.security.api_token cannot be empty when set");
            }
        }

        if !matches!(self.spec.logging.format.as_str(), "compact" | "json") {
            anyhow::bail!(
                "Invalid logging format: '{}'. Must be 'compact' or 'json'",
                self.spec.logging.format
            );
        }

        for grant in &self.spec.rbac.default_grants {
            if grant.split_once(':').is_none() {
                anyhow::bail!("Invalid RBAC grant '{}'. Expected '<resource>:<action>'", grant);
            }
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_manifest() {
        let manifest = FabricConfigManifest::default();
        assert_eq!(manifest.api_version, API_VERSION);
        assert_eq!(manifest.kind, KIND);
        assert!(manifest.spec.database.url.is_none());
        assert_eq!(manifest.spec.bus.max_deliver, 5);
        assert!(manifest.validate().is_ok());
    }

    #[test]
    fn test_partial_yaml_takes_defaults() {
        let yaml = r#"
apiVersion: 100monkeys.ai/v1
kind: FabricConfig
metadata:
  name: fabric-test
spec:
  database:
    url: postgres://fabric@localhost/fabric
  security:
    api_token: abc123
    extra_secret_field_names: [webhookToken]
  dex:
    namespace: sso
"#;
        let manifest = FabricConfigManifest::from_yaml_str(yaml).unwrap();
        assert_eq!(manifest.metadata.name, "fabric-test");
        assert_eq!(manifest.spec.database.max_connections, 5);
        assert_eq!(manifest.spec.security.extra_secret_field_names, vec!["webhookToken"]);
        assert_eq!(manifest.spec.dex.namespace, "sso");
        assert_eq!(manifest.spec.dex.secret_name, "argocd-secret");
        assert_eq!(manifest.spec.http.port, 8080);
    }

    #[test]
    fn test_env_overrides() {
        let mut manifest = FabricConfigManifest::default();
        manifest.apply_overrides_from(|key| match key {
            "FABRIC_DATABASE_URL" => Some("postgres://db".to_string()),
            "FABRIC_API_TOKEN" => Some("tok".to_string()),
            "FABRIC_DEX_NAMESPACE" => Some("dex".to_string()),
            _ => None,
        });
        assert_eq!(manifest.spec.database.url.as_deref(), Some("postgres://db"));
        assert_eq!(manifest.spec.security.api_token.as_deref(), Some("tok"));
        assert_eq!(manifest.spec.dex.namespace, "dex");
        assert_eq!(manifest.spec.logging.level, "info");
    }

    #[test]
    fn test_validation() {
        let mut manifest = FabricConfigManifest::default();

        manifest.kind = "NodeConfig".to_string();
        assert!(manifest.validate().is_err());
        manifest.kind = KIND.to_string();

        manifest.spec.bus.max_deliver = 0;
        assert!(manifest.validate().is_err());
        manifest.spec.bus.max_deliver = 3;

        manifest.spec.logging.format = "xml".to_string();
        assert!(manifest.validate().is_err());
        manifest.spec.logging.format = "json".to_string();

        manifest.spec.rbac.default_grants = vec!["global-config".to_string()];
        assert!(manifest.validate().is_err());
        manifest.spec.rbac.default_grants = vec!["global-config:get".to_string()];

        assert!(manifest.validate().is_ok());
    }

    #[test]
    fn test_yaml_file_roundtrip() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("fabric-config.yaml");
        let mut manifest = FabricConfigManifest::default();
        manifest.spec.security.api_token = Some("secret".to_string());
        manifest.to_yaml_file(&path).unwrap();

        let loaded = FabricConfigManifest::load_or_default(Some(path)).unwrap();
        assert_eq!(loaded.spec.security.api_token.as_deref(), Some("secret"));
    }
}
