// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0

//! Topic registry
//!
//! Every topic the fabric publishes or consumes is bound to a stream, a
//! queue group and a durable consumer name. Subscribing to a topic that is not
//! registered here is rejected by the bus.

use std::collections::HashMap;

pub const CD_STAGE_COMPLETE: &str = "CD-STAGE-COMPLETE";
pub const BULK_DEPLOY: &str = "BULK-DEPLOY";
pub const BULK_HIBERNATE: &str = "BULK-HIBERNATE";
pub const CI_WORKFLOW_STATUS_UPDATE: &str = "CI-WORKFLOW-STATUS-UPDATE";
pub const CD_WORKFLOW_STATUS_UPDATE: &str = "CD-WORKFLOW-STATUS-UPDATE";
pub const CI_COMPLETE: &str = "CI-COMPLETE";
pub const ARGO_PIPELINE_STATUS_UPDATE: &str = "ARGO-PIPELINE-STATUS-UPDATE";
pub const APPLICATION_STATUS_UPDATE: &str = "APPLICATION-STATUS-UPDATE";
pub const APPLICATION_STATUS_DELETE: &str = "APPLICATION-STATUS-DELETE";
pub const NEW_CI_MATERIAL: &str = "NEW-CI-MATERIAL";
pub const CRON_EVENTS: &str = "CRON_EVENTS";
pub const CHART_SCAN: &str = "CHART-SCAN";
pub const APPSTORE_BULK_DEPLOY: &str = "APPSTORE-BULK-DEPLOY";
pub const CD_BULK_DEPLOY_TRIGGER: &str = "CD-BULK-DEPLOY-TRIGGER";
pub const WEBHOOK_EVENT: &str = "WEBHOOK-EVENT";
pub const CD_PIPELINE_DELETE_EVENT: &str = "CD-PIPELINE-DELETE-EVENT";

pub const ORCHESTRATOR_STREAM: &str = "ORCHESTRATOR";
pub const CI_RUNNER_STREAM: &str = "CI-RUNNER";
pub const KUBEWATCH_STREAM: &str = "KUBEWATCH";
pub const GIT_SENSOR_STREAM: &str = "GIT-SENSOR";
pub const IMAGE_SCANNER_STREAM: &str = "IMAGE-SCANNER";

/// Broker placement of one topic.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TopicConfig {
    pub topic: String,
    pub stream: String,
    pub queue_group: String,
    pub durable_name: String,
}

impl TopicConfig {
    fn new(topic: &str, stream: &str, queue_group: &str, durable_name: &str) -> Self {
        Self {
            topic: topic.to_string(),
            stream: stream.to_string(),
            queue_group: queue_group.to_string(),
            durable_name: durable_name.to_string(),
        }
    }
}

#[derive(Debug, Clone)]
pub struct TopicRegistry {
    topics: HashMap<String, TopicConfig>,
}

impl TopicRegistry {
    pub fn empty() -> Self {
        Self { topics: HashMap::new() }
    }

    pub fn register(&mut self, config: TopicConfig) {
        self.topics.insert(config.topic.clone(), config);
    }

    pub fn get(&self, topic: &str) -> Option<&TopicConfig> {
        self.topics.get(topic)
    }

    pub fn contains(&self, topic: &str) -> bool {
        self.topics.contains_key(topic)
    }

    pub fn len(&self) -> usize {
        self.topics.len()
    }

    pub fn is_empty(&self) -> bool {
        self.topics.is_empty()
    }
}

impl Default for TopicRegistry {
    fn default() -> Self {
        let entries = [
            TopicConfig::new(CD_STAGE_COMPLETE, CI_RUNNER_STREAM, "CD-COMPLETE_GROUP-1", "CD-COMPLETE_DURABLE-1"),
            TopicConfig::new(BULK_DEPLOY, ORCHESTRATOR_STREAM, "CD.BULK.GROUP-1", "CD-BULK-DURABLE-1"),
            TopicConfig::new(BULK_HIBERNATE, ORCHESTRATOR_STREAM, "CD.BULK-HIBERNATE.GROUP-1", "CD-BULK-HIBERNATE-DURABLE-1"),
            TopicConfig::new(CI_WORKFLOW_STATUS_UPDATE, KUBEWATCH_STREAM, "WORKFLOW_STATUS_UPDATE_GROUP-1", "WORKFLOW_STATUS_UPDATE_DURABLE-1"),
            TopicConfig::new(CD_WORKFLOW_STATUS_UPDATE, KUBEWATCH_STREAM, "CD_WORKFLOW_STATUS_UPDATE_GROUP-1", "CD_WORKFLOW_STATUS_UPDATE_DURABLE-1"),
            TopicConfig::new(CI_COMPLETE, CI_RUNNER_STREAM, "CI-COMPLETE_GROUP-1", "CI-COMPLETE_DURABLE-1"),
            TopicConfig::new(ARGO_PIPELINE_STATUS_UPDATE, ORCHESTRATOR_STREAM, "ARGO_PIPELINE_STATUS_UPDATE_GROUP-1", "ARGO_PIPELINE_STATUS_UPDATE_DURABLE-1"),
            TopicConfig::new(APPLICATION_STATUS_UPDATE, KUBEWATCH_STREAM, "APPLICATION_STATUS_UPDATE_GROUP-1", "APPLICATION_STATUS_UPDATE_DURABLE-1"),
            TopicConfig::new(APPLICATION_STATUS_DELETE, KUBEWATCH_STREAM, "APPLICATION_STATUS_DELETE_GROUP-1", "APPLICATION_STATUS_DELETE_DURABLE-1"),
            TopicConfig::new(NEW_CI_MATERIAL, GIT_SENSOR_STREAM, "NEW-CI-MATERIAL_GROUP-1", "NEW-CI-MATERIAL_DURABLE-1"),
            TopicConfig::new(CRON_EVENTS, ORCHESTRATOR_STREAM, "CRON_EVENTS_GROUP-2", "CRON_EVENTS_DURABLE-2"),
            TopicConfig::new(CHART_SCAN, IMAGE_SCANNER_STREAM, "CHART-SCAN_GROUP-1", "CHART-SCAN_DURABLE-1"),
            TopicConfig::new(APPSTORE_BULK_DEPLOY, ORCHESTRATOR_STREAM, "APP-STORE-BULK-DEPLOY-GROUP-1", "APP-STORE-BULK-DEPLOY-DURABLE-1"),
            TopicConfig::new(CD_BULK_DEPLOY_TRIGGER, ORCHESTRATOR_STREAM, "CD-BULK-DEPLOY-TRIGGER-GROUP-1", "CD-BULK-DEPLOY-TRIGGER-DURABLE-1"),
            TopicConfig::new(WEBHOOK_EVENT, ORCHESTRATOR_STREAM, "WEBHOOK_EVENT_GRP", "WEBHOOK_EVENT_DURABLE"),
            TopicConfig::new(CD_PIPELINE_DELETE_EVENT, ORCHESTRATOR_STREAM, "CD-PIPELINE-DELETE-EVENT-GROUP-1", "CD-PIPELINE-DELETE-EVENT-DURABLE-1"),
        ];
        let mut registry = Self::empty();
        for entry in entries {
            registry.register(entry);
        }
        registry
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_registry_covers_all_topics() {
        let registry = TopicRegistry::default();
        assert_eq!(registry.len(), 16);
        assert_eq!(registry.get(CI_COMPLETE).unwrap().stream, CI_RUNNER_STREAM);
        assert!(!registry.contains("Test_Topic"));
    }
}
