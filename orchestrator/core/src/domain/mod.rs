// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0
//! Domain
//!
//! Entities, wire payloads, pure rules and the repository/collaborator
//! contracts of the workflow event fabric.
//!
//! # Architecture
//!
//! - **Layer:** Domain Layer
//! - **Purpose:** Types shared by every other layer; no I/O

pub mod argo;
pub mod auth_config;
pub mod cd_workflow;
pub mod config;
pub mod events;
pub mod git_host;
pub mod global_tag;
pub mod pipeline;
pub mod ports;
pub mod repository;
pub mod sso;
pub mod trigger_audit;
