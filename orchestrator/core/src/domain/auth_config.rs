// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0

//! Global authorisation configuration
//!
//! Modes under which user → role mapping is resolved at login. The set of
//! active rows is the current configuration.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum AuthConfigType {
    #[serde(rename = "devtron-system-managed")]
    DevtronSystemManaged,
    #[serde(rename = "devtron-self-registered-group")]
    DevtronSelfRegisteredGroup,
    #[serde(rename = "group-claims")]
    GroupClaims,
}

impl AuthConfigType {
    pub const ALL: [AuthConfigType; 3] = [
        AuthConfigType::DevtronSystemManaged,
        AuthConfigType::DevtronSelfRegisteredGroup,
        AuthConfigType::GroupClaims,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            AuthConfigType::DevtronSystemManaged => "devtron-system-managed",
            AuthConfigType::DevtronSelfRegisteredGroup => "devtron-self-registered-group",
            AuthConfigType::GroupClaims => "group-claims",
        }
    }
}

impl fmt::Display for AuthConfigType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("unknown authorisation config type: {0}")]
pub struct UnknownAuthConfigType(pub String);

impl FromStr for AuthConfigType {
    type Err = UnknownAuthConfigType;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        AuthConfigType::ALL
            .into_iter()
            .find(|t| t.as_str() == s)
            .ok_or_else(|| UnknownAuthConfigType(s.to_string()))
    }
}

/// Persisted authorisation config row.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GlobalAuthorisationConfig {
    pub id: i64,
    pub config_type: AuthConfigType,
    pub active: bool,
    pub created_by: i32,
    pub created_on: DateTime<Utc>,
    pub updated_by: i32,
    pub updated_on: DateTime<Utc>,
}

/// API view of an active config row.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GlobalAuthorisationConfigResponse {
    pub id: i64,
    pub config_type: AuthConfigType,
    pub active: bool,
}

impl From<&GlobalAuthorisationConfig> for GlobalAuthorisationConfigResponse {
    fn from(row: &GlobalAuthorisationConfig) -> Self {
        Self {
            id: row.id,
            config_type: row.config_type,
            active: row.active,
        }
    }
}
