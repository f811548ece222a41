// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0

//! Static RBAC enforcer driven by `spec.rbac` of the fabric config.

use std::collections::HashSet;

use crate::domain::config::RbacConfig;
use crate::domain::ports::Enforcer;

const WILDCARD: &str = "*";

/// Super admins may do anything; every other authenticated user gets the
/// configured `<resource>:<action>` grants. `*` matches any resource or
/// action.
#[derive(Debug, Clone, Default)]
pub struct ConfigEnforcer {
    super_admins: HashSet<String>,
    grants: HashSet<(String, String)>,
}

impl ConfigEnforcer {
    pub fn from_config(config: &RbacConfig) -> Self {
        Self {
            super_admins: config.super_admin_user_ids.iter().map(|id| id.to_string()).collect(),
            grants: config
                .default_grants
                .iter()
                .filter_map(|grant| grant.split_once(':'))
                .map(|(resource, action)| (resource.trim().to_string(), action.trim().to_string()))
                .collect(),
        }
    }

    fn granted(&self, resource: &str, action: &str) -> bool {
        [(resource, action), (resource, WILDCARD), (WILDCARD, action), (WILDCARD, WILDCARD)]
            .iter()
            .any(|(r, a)| self.grants.contains(&(r.to_string(), a.to_string())))
    }
}

impl Enforcer for ConfigEnforcer {
    fn check(&self, subject: &str, resource: &str, action: &str, _object: &str) -> bool {
        self.super_admins.contains(subject) || self.granted(resource, action)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn enforcer() -> ConfigEnforcer {
        ConfigEnforcer::from_config(&RbacConfig {
            super_admin_user_ids: vec![2],
            default_grants: vec!["global:get".into(), "tag:*".into()],
        })
    }

    #[test]
    fn test_super_admin_passes_everything() {
        assert!(enforcer().check("2", "global", "update", "*"));
    }

    #[test]
    fn test_grants_apply_to_other_users() {
        let enforcer = enforcer();
        assert!(enforcer.check("7", "global", "get", "*"));
        assert!(!enforcer.check("7", "global", "update", "*"));
        assert!(enforcer.check("7", "tag", "delete", "*"));
    }
}
