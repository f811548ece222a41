// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0

//! Webhook Secret Validator
//!
//! Authenticates inbound git host webhooks against the secret registered for
//! the host. Three modes exist, chosen per host by its
//! [`SecretValidationType`]; anything else is rejected.

use hmac::{Hmac, Mac};
use sha1::Sha1;
use std::collections::HashMap;
use subtle::ConstantTimeEq;

use crate::domain::git_host::{GitHost, SecretValidationType};

type HmacSha1 = Hmac<Sha1>;

const SHA1_SIGNATURE_PREFIX: &str = "sha1=";

/// Raw inbound webhook call as received by the HTTP layer.
#[derive(Debug, Clone, Default)]
pub struct WebhookRequest {
    /// Request URL or path, query string included.
    pub url: String,
    headers: HashMap<String, String>,
    pub body: Vec<u8>,
}

impl WebhookRequest {
    pub fn new(url: impl Into<String>, body: impl Into<Vec<u8>>) -> Self {
        Self {
            url: url.into(),
            headers: HashMap::new(),
            body: body.into(),
        }
    }

    pub fn with_header(mut self, name: &str, value: impl Into<String>) -> Self {
        self.insert_header(name, value);
        self
    }

    pub fn insert_header(&mut self, name: &str, value: impl Into<String>) {
        self.headers.insert(name.to_ascii_lowercase(), value.into());
    }

    /// Case-insensitive header lookup.
    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers.get(&name.to_ascii_lowercase()).map(String::as_str)
    }

    pub fn body_str(&self) -> std::borrow::Cow<'_, str> {
        String::from_utf8_lossy(&self.body)
    }
}

/// `true` if `request` carries the secret registered for `host`.
pub fn validate_secret(host: &GitHost, request: &WebhookRequest) -> bool {
    match host.secret_validation_type {
        SecretValidationType::Sha1 => request
            .header(&host.secret_header)
            .is_some_and(|signature| validate_sha1_signature(&host.webhook_secret, &request.body, signature)),
        SecretValidationType::UrlAppend => validate_url_append(&host.webhook_url, &request.url),
        SecretValidationType::PlainText => request
            .header(&host.secret_header)
            .is_some_and(|value| constant_time_eq(value, &host.webhook_secret)),
        SecretValidationType::Unknown => {
            tracing::warn!(git_host_id = host.id, "Unsupported webhook secret validation type");
            false
        }
    }
}

/// Checks `signature == "sha1=" + hex(HMAC_SHA1(secret, body))`.
pub fn validate_sha1_signature(secret: &str, body: &[u8], signature: &str) -> bool {
    let Ok(mut mac) = HmacSha1::new_from_slice(secret.as_bytes()) else {
        return false;
    };
    mac.update(body);
    let expected = format!("{}{}", SHA1_SIGNATURE_PREFIX, hex::encode(mac.finalize().into_bytes()));
    constant_time_eq(signature, &expected)
}

/// Compares the last path segment of the request URL with that of the
/// registered webhook URL.
pub fn validate_url_append(webhook_url: &str, request_url: &str) -> bool {
    match (last_path_segment(webhook_url), last_path_segment(request_url)) {
        (Some(expected), Some(actual)) => constant_time_eq(actual, expected),
        _ => false,
    }
}

fn last_path_segment(url: &str) -> Option<&str> {
    let path = url.split(['?', '#']).next().unwrap_or_default();
    path.trim_end_matches('/').rsplit('/').next().filter(|s| !s.is_empty())
}

fn constant_time_eq(a: &str, b: &str) -> bool {
    a.as_bytes().ct_eq(b.as_bytes()).into()
}
