// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0

pub mod crypto;
pub mod db;
pub mod delivery_gateway;
pub mod kubernetes_secrets;
pub mod pubsub;
pub mod rbac;
pub mod repositories;
pub mod snapshot_codec;
pub mod webhook_validator;

pub use delivery_gateway::DeliveryGateway;
pub use kubernetes_secrets::KubernetesSecretStore;
pub use rbac::ConfigEnforcer;
pub use webhook_validator::WebhookRequest;
