// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0

//! Document-level secret sanitizer.
//!
//! Walks a JSON tree and seals every string leaf the [`SecretClassifier`]
//! flags. Errors never abort a document: a leaf that cannot be sealed becomes
//! [`SANITIZED_PLACEHOLDER`], a leaf that cannot be opened becomes `""`.

use serde_json::{Map, Value};
use std::collections::HashSet;

use super::cipher::{is_encrypted, CryptoError, SecretCipher};
use crate::domain::config::SecurityConfig;

pub const SANITIZED_PLACEHOLDER: &str = "***SANITIZED***";

const KNOWN_SECRET_FIELDS: &[&str] = &[
    "dockerPassword",
    "docker_password",
    "accessKey",
    "access_key",
    "secretKey",
    "secret_key",
    "passkey",
    "pass_key",
    "dockerCert",
    "docker_cert",
    "dockerCertificate",
    "docker_certificate",
    "accountKey",
    "account_key",
    "credentialFileData",
    "credential_file_data",
    "serviceAccountKey",
    "service_account_key",
    "password",
    "token",
    "apiKey",
    "api_key",
    "privateKey",
    "private_key",
    "clientSecret",
    "client_secret",
];

const NESTED_SECRET_PATTERNS: &[&str] = &[
    "blobStorageS3Config.accessKey",
    "blobStorageS3Config.secretKey",
    "blobStorageS3Config.passkey",
    "blobStorageS3Config.password",
    "azureBlobConfig.accountKey",
    "azureBlobConfig.accountName",
    "azureBlobConfig.password",
    "gcpBlobConfig.credentialFileData",
    "gcpBlobConfig.serviceAccountKey",
    "gcpBlobConfig.privateKey",
    "dockerRegistry.password",
    "dockerRegistry.dockerPassword",
    "dockerRegistry.accessKey",
    "dockerRegistry.secretKey",
    "dockerRegistry.cert",
    "dockerRegistry.certificate",
    "database.password",
    "database.connectionString",
    "database.url",
    "externalService.apiKey",
    "externalService.token",
    "externalService.secret",
    "externalService.password",
    "gitCredentials.password",
    "gitCredentials.token",
    "gitCredentials.privateKey",
    "awsConfig.secretAccessKey",
    "awsConfig.accessKeyId",
    "gcpConfig.serviceAccountKey",
    "azureConfig.clientSecret",
    "azureConfig.password",
];

const RUNTIME_PARAMETER_MARKERS: &[&str] =
    &["runtimeParameters", "runtime_parameters", "RuntimeParameters"];

const SECRET_VALUE_PREFIXES: &[&str] = &["sk-", "ghp_", "xoxb-", "AKIA"];
const SECRET_VALUE_FRAGMENTS: &[&str] = &["-----BEGIN"];
const MIN_SECRET_LEN: usize = 12;

/// Decides which leaves of a document hold secrets.
#[derive(Debug, Clone)]
pub struct SecretClassifier {
    field_names: HashSet<String>,
    path_patterns: Vec<String>,
    runtime_markers: Vec<String>,
    value_prefixes: Vec<String>,
    value_fragments: Vec<String>,
    min_len: usize,
}

impl Default for SecretClassifier {
    fn default() -> Self {
        let owned = |items: &[&str]| items.iter().map(|s| s.to_string()).collect::<Vec<_>>();
        Self {
            field_names: KNOWN_SECRET_FIELDS.iter().map(|s| s.to_string()).collect(),
            path_patterns: owned(NESTED_SECRET_PATTERNS),
            runtime_markers: owned(RUNTIME_PARAMETER_MARKERS),
            value_prefixes: owned(SECRET_VALUE_PREFIXES),
            value_fragments: owned(SECRET_VALUE_FRAGMENTS),
            min_len: MIN_SECRET_LEN,
        }
    }
}

impl SecretClassifier {
    /// Default tables extended with the operator's additions.
    pub fn from_config(config: &SecurityConfig) -> Self {
        let mut classifier = Self::default();
        classifier
            .field_names
            .extend(config.extra_secret_field_names.iter().cloned());
        classifier
            .path_patterns
            .extend(config.extra_secret_path_patterns.iter().cloned());
        classifier
    }

    pub fn is_secret_field(&self, full_path: &str, leaf_key: &str) -> bool {
        if self.field_names.contains(leaf_key) {
            return true;
        }
        self.path_patterns.iter().any(|pattern| {
            full_path == pattern
                || full_path
                    .strip_suffix(pattern.as_str())
                    .is_some_and(|head| head.ends_with('.'))
        })
    }

    pub fn is_runtime_parameter(&self, full_path: &str) -> bool {
        self.runtime_markers
            .iter()
            .any(|marker| full_path.contains(marker.as_str()))
    }

    /// Heuristic applied to free-form runtime parameter values.
    pub fn looks_like_secret(&self, value: &str) -> bool {
        if value.chars().count() < self.min_len {
            return false;
        }
        if self.value_prefixes.iter().any(|p| value.starts_with(p.as_str()))
            || self.value_fragments.iter().any(|f| value.contains(f.as_str()))
        {
            return true;
        }
        !value.chars().any(char::is_whitespace)
            && value.chars().any(|c| c.is_ascii_uppercase())
            && value.chars().any(|c| c.is_ascii_lowercase())
            && value.chars().any(|c| c.is_ascii_digit())
    }

    pub fn should_encrypt(&self, full_path: &str, leaf_key: &str, value: &str) -> bool {
        self.is_secret_field(full_path, leaf_key)
            || (self.is_runtime_parameter(full_path) && self.looks_like_secret(value))
    }
}

/// Seals and opens the secret leaves of JSON documents.
#[derive(Debug, Clone, Default)]
pub struct SecretSanitizer {
    classifier: SecretClassifier,
}

impl SecretSanitizer {
    pub fn new(classifier: SecretClassifier) -> Self {
        Self { classifier }
    }

    pub fn classifier(&self) -> &SecretClassifier {
        &self.classifier
    }

    /// Returns a copy of `document` with every secret leaf sealed.
    pub fn encrypt_value(&self, document: &Value, api_token: &str) -> Value {
        let cipher = SecretCipher::new(api_token);
        rewrite_strings(document, "", "", &mut |path, leaf, value| {
            if value.is_empty() || is_encrypted(value) || !self.classifier.should_encrypt(path, leaf, value) {
                return None;
            }
            Some(match cipher.encrypt(value) {
                Ok(sealed) => sealed,
                Err(e) => {
                    tracing::warn!(field = %path, error = %e, "Failed to encrypt secret field, sanitizing");
                    SANITIZED_PLACEHOLDER.to_string()
                }
            })
        })
    }

    /// Returns a copy of `document` with every sealed leaf opened.
    pub fn decrypt_value(&self, document: &Value, api_token: &str) -> Value {
        let cipher = SecretCipher::new(api_token);
        rewrite_strings(document, "", "", &mut |path, _leaf, value| {
            if value == SANITIZED_PLACEHOLDER {
                return Some(String::new());
            }
            if !is_encrypted(value) {
                return None;
            }
            Some(cipher.decrypt(value).unwrap_or_else(|e| {
                tracing::warn!(field = %path, error = %e, "Failed to decrypt secret field, blanking");
                String::new()
            }))
        })
    }

    pub fn encrypt_json(&self, document: &[u8], api_token: &str) -> Result<Vec<u8>, CryptoError> {
        let value: Value = serde_json::from_slice(document).map_err(|e| CryptoError::Encoding(e.to_string()))?;
        serde_json::to_vec(&self.encrypt_value(&value, api_token)).map_err(|e| CryptoError::Encoding(e.to_string()))
    }

    pub fn decrypt_json(&self, document: &[u8], api_token: &str) -> Result<Vec<u8>, CryptoError> {
        let value: Value = serde_json::from_slice(document).map_err(|e| CryptoError::Encoding(e.to_string()))?;
        serde_json::to_vec(&self.decrypt_value(&value, api_token)).map_err(|e| CryptoError::Encoding(e.to_string()))
    }
}

/// Rebuilds `value`, replacing each string leaf for which `f` returns `Some`.
/// `f` receives the dotted path, the terminal key and the leaf. Array items
/// inherit the path of the array.
fn rewrite_strings(
    value: &Value,
    path: &str,
    leaf_key: &str,
    f: &mut dyn FnMut(&str, &str, &str) -> Option<String>,
) -> Value {
    match value {
        Value::String(s) => f(path, leaf_key, s).map(Value::String).unwrap_or_else(|| value.clone()),
        Value::Object(map) => {
            let mut out = Map::with_capacity(map.len());
            for (key, child) in map {
                let child_path = if path.is_empty() {
                    key.clone()
                } else {
                    format!("{}.{}", path, key)
                };
                out.insert(key.clone(), rewrite_strings(child, &child_path, key, f));
            }
            Value::Object(out)
        }
        Value::Array(items) => Value::Array(
            items
                .iter()
                .map(|item| rewrite_strings(item, path, leaf_key, f))
                .collect(),
        ),
        _ => value.clone(),
    }
}
