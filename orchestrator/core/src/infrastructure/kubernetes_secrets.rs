// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0

//! Kubernetes Secret Store
//!
//! Reads and writes `v1/Secret` objects through the Kubernetes REST API.
//! Updates carry the `resourceVersion` that was read, so the API server
//! answers `409 Conflict` when another writer got there first.
//!
//! # Architecture
//!
//! - **Layer:** Infrastructure
//! - **Purpose:** Optimistically versioned access to the Dex connector secret
//! - **Integration:** SSO write path → Kubernetes API server

use async_trait::async_trait;
use base64::{engine::general_purpose::STANDARD, Engine as _};
use reqwest::{Client, StatusCode};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::Path;

use crate::domain::config::DexConfig;
use crate::domain::ports::{KubernetesSecret, SecretStore, SecretStoreError};

#[derive(Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
struct SecretObject {
    #[serde(default = "default_api_version")]
    api_version: String,
    #[serde(default = "default_kind")]
    kind: String,
    metadata: ObjectMeta,
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    data: BTreeMap<String, String>,
}

#[derive(Debug, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
struct ObjectMeta {
    name: String,
    namespace: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    resource_version: Option<String>,
}

fn default_api_version() -> String {
    "v1".to_string()
}

fn default_kind() -> String {
    "Secret".to_string()
}

pub struct KubernetesSecretStore {
    client: Client,
    api_server: String,
    token: Option<String>,
}

impl KubernetesSecretStore {
    pub fn new(api_server: impl Into<String>, token: Option<String>) -> Self {
        Self::with_client(Client::new(), api_server, token)
    }

    pub fn with_client(client: Client, api_server: impl Into<String>, token: Option<String>) -> Self {
        Self {
            client,
            api_server: api_server.into().trim_end_matches('/').to_string(),
            token,
        }
    }

    /// In-cluster client: bearer token and CA bundle from the service account
    /// mount when present.
    pub fn from_config(config: &DexConfig) -> Result<Self, SecretStoreError> {
        let token_path = Path::new(&config.token_path);
        let token = match std::fs::read_to_string(token_path) {
            Ok(token) => Some(token.trim().to_string()),
            Err(e) => {
                tracing::warn!(path = %token_path.display(), error = %e, "No service account token, calling the API server anonymously");
                None
            }
        };

        let mut builder = Client::builder();
        if let Some(ca_path) = token_path.parent().map(|dir| dir.join("ca.crt")) {
            if let Ok(pem) = std::fs::read(&ca_path) {
                let cert = reqwest::Certificate::from_pem(&pem)
                    .map_err(|e| SecretStoreError::Transport(format!("invalid cluster CA bundle: {}", e)))?;
                builder = builder.add_root_certificate(cert);
            }
        }
        let client = builder
            .build()
            .map_err(|e| SecretStoreError::Transport(e.to_string()))?;

        Ok(Self::with_client(client, config.api_server.clone(), token))
    }

    fn secret_url(&self, namespace: &str, name: &str) -> String {
        format!("{}/api/v1/namespaces/{}/secrets/{}", self.api_server, namespace, name)
    }

    fn authorize(&self, request: reqwest::RequestBuilder) -> reqwest::RequestBuilder {
        match &self.token {
            Some(token) => request.bearer_auth(token),
            None => request,
        }
    }

    async fn read_object(
        response: reqwest::Response,
        namespace: &str,
        name: &str,
    ) -> Result<KubernetesSecret, SecretStoreError> {
        let key = format!("{}/{}", namespace, name);
        match response.status() {
            status if status.is_success() => {}
            StatusCode::NOT_FOUND => return Err(SecretStoreError::NotFound(key)),
            StatusCode::CONFLICT => return Err(SecretStoreError::Conflict(key)),
            status => {
                let body = response.text().await.unwrap_or_default();
                return Err(SecretStoreError::Transport(format!("{} on {}: {}", status, key, body)));
            }
        }

        let object: SecretObject = response
            .json()
            .await
            .map_err(|e| SecretStoreError::Decode(e.to_string()))?;

        let mut data = BTreeMap::new();
        for (k, v) in object.data {
            let raw = STANDARD
                .decode(v.as_bytes())
                .map_err(|e| SecretStoreError::Decode(format!("key {}: {}", k, e)))?;
            let value = String::from_utf8(raw).map_err(|e| SecretStoreError::Decode(format!("key {}: {}", k, e)))?;
            data.insert(k, value);
        }

        Ok(KubernetesSecret {
            namespace: object.metadata.namespace,
            name: object.metadata.name,
            resource_version: object.metadata.resource_version,
            data,
        })
    }
}

#[async_trait]
impl SecretStore for KubernetesSecretStore {
    async fn get_secret(&self, namespace: &str, name: &str) -> Result<KubernetesSecret, SecretStoreError> {
        let response = self
            .authorize(self.client.get(self.secret_url(namespace, name)))
            .send()
            .await
            .map_err(|e| SecretStoreError::Transport(e.to_string()))?;
        Self::read_object(response, namespace, name).await
    }

    async fn update_secret(&self, secret: &KubernetesSecret) -> Result<KubernetesSecret, SecretStoreError> {
        let object = SecretObject {
            api_version: default_api_version(),
            kind: default_kind(),
            metadata: ObjectMeta {
                name: secret.name.clone(),
                namespace: secret.namespace.clone(),
                resource_version: secret.resource_version.clone(),
            },
            data: secret
                .data
                .iter()
                .map(|(k, v)| (k.clone(), STANDARD.encode(v.as_bytes())))
                .collect(),
        };

        let response = self
            .authorize(self.client.put(self.secret_url(&secret.namespace, &secret.name)))
            .json(&object)
            .send()
            .await
            .map_err(|e| SecretStoreError::Transport(e.to_string()))?;
        Self::read_object(response, &secret.namespace, &secret.name).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn secret_body(resource_version: &str, data: serde_json::Value) -> String {
        json!({
            "apiVersion": "v1",
            "kind": "Secret",
            "metadata": {"name": "argocd-secret", "namespace": "devtroncd", "resourceVersion": resource_version},
            "data": data,
        })
        .to_string()
    }

    #[tokio::test]
    async fn test_get_secret_decodes_data() {
        let mut server = mockito::Server::new_async().await;
        let mock = server
            .mock("GET", "/api/v1/namespaces/devtroncd/secrets/argocd-secret")
            .match_header("authorization", "Bearer sa-token")
            .with_status(200)
            .with_header("content-type", "application/json")
            .with_body(secret_body("41", json!({"url": STANDARD.encode("https://devtron.example.com")})))
            .create_async()
            .await;

        let store = KubernetesSecretStore::new(server.url(), Some("sa-token".to_string()));
        let secret = store.get_secret("devtroncd", "argocd-secret").await.unwrap();

        mock.assert_async().await;
        assert_eq!(secret.resource_version.as_deref(), Some("41"));
        assert_eq!(secret.data["url"], "https://devtron.example.com");
    }

    #[tokio::test]
    async fn test_update_conflict_is_reported() {
        let mut server = mockito::Server::new_async().await;
        server
            .mock("PUT", "/api/v1/namespaces/devtroncd/secrets/argocd-secret")
            .match_body(mockito::Matcher::PartialJson(json!({"metadata": {"resourceVersion": "41"}})))
            .with_status(409)
            .with_body(r#"{"kind":"Status","reason":"Conflict"}"#)
            .create_async()
            .await;

        let store = KubernetesSecretStore::new(server.url(), None);
        let secret = KubernetesSecret {
            namespace: "devtroncd".to_string(),
            name: "argocd-secret".to_string(),
            resource_version: Some("41".to_string()),
            data: BTreeMap::from([("dex.config".to_string(), "connectors: []".to_string())]),
        };
        let err = store.update_secret(&secret).await.unwrap_err();
        assert!(matches!(err, SecretStoreError::Conflict(_)));
    }

    #[tokio::test]
    async fn test_update_encodes_data() {
        let mut server = mockito::Server::new_async().await;
        let encoded = STANDARD.encode("connectors: []");
        server
            .mock("PUT", "/api/v1/namespaces/devtroncd/secrets/argocd-secret")
            .match_body(mockito::Matcher::PartialJson(json!({"data": {"dex.config": encoded}})))
            .with_status(200)
            .with_body(secret_body("42", json!({"dex.config": encoded})))
            .create_async()
            .await;

        let store = KubernetesSecretStore::new(server.url(), None);
        let secret = KubernetesSecret {
            namespace: "devtroncd".to_string(),
            name: "argocd-secret".to_string(),
            resource_version: Some("41".to_string()),
            data: BTreeMap::from([("dex.config".to_string(), "connectors: []".to_string())]),
        };
        let updated = store.update_secret(&secret).await.unwrap();
        assert_eq!(updated.resource_version.as_deref(), Some("42"));
        assert_eq!(updated.data["dex.config"], "connectors: []");
    }

    #[tokio::test]
    async fn test_missing_secret() {
        let mut server = mockito::Server::new_async().await;
        server
            .mock("GET", "/api/v1/namespaces/devtroncd/secrets/absent")
            .with_status(404)
            .create_async()
            .await;

        let store = KubernetesSecretStore::new(server.url(), None);
        assert!(matches!(
            store.get_secret("devtroncd", "absent").await,
            Err(SecretStoreError::NotFound(_))
        ));
    }
}
