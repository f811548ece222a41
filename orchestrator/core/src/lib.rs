// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0
//! Fabric Core
//!
//! Asynchronous workflow event fabric of the application-delivery control
//! plane: the message bus adapter, the producers and consumers of the CI/CD
//! workflow topics, Argo status reconciliation, and the supporting global
//! configuration services (authorisation config, SSO connectors, global
//! tags, trigger audit).
//!
//! # Architecture
//!
//! - **Layer:** Core System
//! - **Purpose:** Library behind the `fabric` daemon

pub mod domain;
pub mod application;
pub mod infrastructure;
pub mod presentation;

pub use domain::*;
