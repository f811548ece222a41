// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0

//! SSO login configuration
//!
//! The `config` blob is a Dex connector (`{id, type, name, config: {...}}`).
//! The connector credentials live in the nested `config` object.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;

pub const CLIENT_ID: &str = "clientID";
pub const CLIENT_SECRET: &str = "clientSecret";
pub const CREDENTIAL_KEYS: [&str; 2] = [CLIENT_ID, CLIENT_SECRET];

/// Key of the Dex secret holding the connector YAML.
pub const DEX_CONFIG_KEY: &str = "dex.config";
/// Key of the Dex secret holding the platform base URL.
pub const DEX_URL_KEY: &str = "url";

/// Persisted SSO row.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SsoLoginConfig {
    pub id: i64,
    pub name: String,
    pub label: String,
    pub url: String,
    /// Serialized connector JSON.
    pub config: String,
    pub active: bool,
    pub created_by: i32,
    pub created_on: DateTime<Utc>,
    pub updated_by: i32,
    pub updated_on: DateTime<Utc>,
}

/// API shape for create/update/read.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SsoLoginDto {
    #[serde(default)]
    pub id: i64,
    pub name: String,
    #[serde(default)]
    pub label: String,
    #[serde(default)]
    pub url: String,
    #[serde(default, skip_serializing_if = "Value::is_null")]
    pub config: Value,
    #[serde(default)]
    pub active: bool,
    #[serde(default, skip_serializing)]
    pub user_id: i32,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub global_auth_config_type: Option<String>,
}

fn credential_slot<'a>(connector: &'a mut Value, key: &str) -> Option<&'a mut Value> {
    connector.get_mut("config")?.as_object_mut()?.get_mut(key)
}

/// Keeps stored connector credentials when the update leaves them blank.
/// A credential counts as blank when it is `""`, `null` or absent.
pub fn preserve_credentials(incoming: &mut Value, stored: &Value) {
    for key in CREDENTIAL_KEYS {
        let stored_value = match stored.get("config").and_then(|c| c.get(key)) {
            Some(v) if !v.is_null() => v.clone(),
            _ => continue,
        };
        let blank = match incoming.get("config").and_then(|c| c.get(key)) {
            None | Some(Value::Null) => true,
            Some(Value::String(s)) => s.is_empty(),
            Some(_) => false,
        };
        if !blank {
            continue;
        }
        if let Some(config) = incoming.get_mut("config").and_then(Value::as_object_mut) {
            config.insert(key.to_string(), stored_value);
        }
    }
}

/// Blanks out connector credentials before the config leaves the service.
pub fn mask_credentials(connector: &mut Value) {
    for key in CREDENTIAL_KEYS {
        if let Some(slot) = credential_slot(connector, key) {
            if !slot.is_null() {
                *slot = Value::String(String::new());
            }
        }
    }
}

/// Renders the Dex `dex.config` document for a single connector.
pub fn dex_connectors_yaml(connector: &Value) -> Result<String, serde_yaml::Error> {
    let document = serde_json::json!({ "connectors": [connector] });
    serde_yaml::to_string(&document)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_blank_secret_keeps_stored_value() {
        let stored = json!({"id": "google", "config": {"clientID": "id-1", "clientSecret": "abc"}});
        let mut incoming = json!({"id": "google", "config": {"clientID": "id-2", "clientSecret": ""}});
        preserve_credentials(&mut incoming, &stored);
        assert_eq!(incoming["config"]["clientSecret"], "abc");
        assert_eq!(incoming["config"]["clientID"], "id-2");
    }

    #[test]
    fn test_new_secret_overrides_stored_value() {
        let stored = json!({"config": {"clientSecret": "abc"}});
        let mut incoming = json!({"config": {"clientSecret": "xyz"}});
        preserve_credentials(&mut incoming, &stored);
        assert_eq!(incoming["config"]["clientSecret"], "xyz");
    }

    #[test]
    fn test_mask_credentials() {
        let mut connector = json!({"config": {"clientID": "id", "clientSecret": "s", "issuer": "x"}});
        mask_credentials(&mut connector);
        assert_eq!(connector["config"]["clientID"], "");
        assert_eq!(connector["config"]["clientSecret"], "");
        assert_eq!(connector["config"]["issuer"], "x");
    }

    #[test]
    fn test_dex_yaml_wraps_connector() {
        let yaml = dex_connectors_yaml(&json!({"id": "github", "type": "github"})).unwrap();
        let parsed: serde_yaml::Value = serde_yaml::from_str(&yaml).unwrap();
        assert_eq!(parsed["connectors"][0]["type"], serde_yaml::Value::from("github"));
    }
}
