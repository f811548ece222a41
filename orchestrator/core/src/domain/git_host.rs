// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0

//! Git hosts that deliver webhooks to the control plane.

use serde::{Deserialize, Serialize};
use std::fmt;

/// How a git host authenticates its webhook calls.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum SecretValidationType {
    /// `X-Hub-Signature: sha1=<hex hmac>` over the raw body.
    #[serde(rename = "SHA-1")]
    Sha1,
    /// Secret embedded as the last path segment of the webhook URL.
    #[serde(rename = "URL_APPEND")]
    UrlAppend,
    /// Secret sent verbatim in a configured header.
    #[serde(rename = "PLAIN_TEXT")]
    PlainText,
    #[serde(other)]
    Unknown,
}

impl SecretValidationType {
    pub fn parse(value: &str) -> Self {
        match value {
            "SHA-1" => SecretValidationType::Sha1,
            "URL_APPEND" => SecretValidationType::UrlAppend,
            "PLAIN_TEXT" => SecretValidationType::PlainText,
            _ => SecretValidationType::Unknown,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            SecretValidationType::Sha1 => "SHA-1",
            SecretValidationType::UrlAppend => "URL_APPEND",
            SecretValidationType::PlainText => "PLAIN_TEXT",
            SecretValidationType::Unknown => "UNKNOWN",
        }
    }
}

impl fmt::Display for SecretValidationType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GitHost {
    pub id: i64,
    pub name: String,
    /// Webhook URL handed to the git host, including any appended secret.
    pub webhook_url: String,
    pub webhook_secret: String,
    /// Header carrying the signature or plain secret.
    pub secret_header: String,
    pub secret_validation_type: SecretValidationType,
    /// Header carrying the event type (e.g. `X-GitHub-Event`).
    #[serde(default)]
    pub event_type_header: String,
    pub active: bool,
}
