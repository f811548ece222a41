// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0

//! Message Bus Adapter
//!
//! Subject-based publish/subscribe with durable, queue-grouped subscriptions
//! that deliver one message at a time per handler.
//!
//! Delivery contract:
//! - validators run first; a rejected message is acked without invoking the
//!   handler
//! - a handler returning `Ok` or [`HandlerError::Permanent`] acks the message
//! - [`HandlerError::Transient`], a panic, or exceeding `ack_wait` leaves the
//!   message unacked and it is redelivered, at most `max_deliver` times
//!
//! Handlers must be idempotent: the broker is at-least-once.

pub mod in_memory;
pub mod topics;

use async_trait::async_trait;
use futures::future::BoxFuture;
use serde::Serialize;
use std::sync::Arc;
use std::time::Duration;

use crate::domain::config::BusConfig;
use crate::domain::ports::CollaboratorError;
use crate::domain::repository::RepositoryError;

pub use in_memory::InMemoryPubSub;
pub use topics::{TopicConfig, TopicRegistry};

/// One delivery of a message.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PubSubMsg {
    pub data: Vec<u8>,
    pub msg_id: String,
    /// 1 on first delivery.
    pub delivery: u32,
}

impl PubSubMsg {
    pub fn data_str(&self) -> std::borrow::Cow<'_, str> {
        String::from_utf8_lossy(&self.data)
    }
}

/// Outcome of a failed handler invocation.
#[derive(Debug, thiserror::Error)]
pub enum HandlerError {
    /// Retry by redelivery.
    #[error("transient failure: {0}")]
    Transient(String),

    /// Logged and acked.
    #[error("permanent failure: {0}")]
    Permanent(String),
}

impl From<RepositoryError> for HandlerError {
    fn from(err: RepositoryError) -> Self {
        if err.is_transient() {
            HandlerError::Transient(err.to_string())
        } else {
            HandlerError::Permanent(err.to_string())
        }
    }
}

impl From<serde_json::Error> for HandlerError {
    fn from(err: serde_json::Error) -> Self {
        HandlerError::Permanent(format!("undecodable payload: {}", err))
    }
}

impl From<CollaboratorError> for HandlerError {
    fn from(err: CollaboratorError) -> Self {
        HandlerError::Permanent(err.to_string())
    }
}

#[derive(Debug, thiserror::Error)]
pub enum BusError {
    #[error("topic {0} is not registered")]
    UnknownTopic(String),

    #[error("durable consumer {0} is already subscribed")]
    AlreadySubscribed(String),

    #[error("message bus is closed")]
    Closed,

    #[error("failed to encode payload: {0}")]
    Serialization(String),
}

/// Structured line logged before each delivery.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct LogLine {
    pub message: String,
    pub fields: Vec<(&'static str, String)>,
}

impl LogLine {
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
            fields: Vec::new(),
        }
    }

    pub fn field(mut self, key: &'static str, value: impl ToString) -> Self {
        self.fields.push((key, value.to_string()));
        self
    }
}

pub type HandlerFuture = BoxFuture<'static, Result<(), HandlerError>>;
pub type MessageHandler = Arc<dyn Fn(PubSubMsg) -> HandlerFuture + Send + Sync>;
pub type MessageValidator = Arc<dyn Fn(&PubSubMsg) -> BoxFuture<'static, bool> + Send + Sync>;
pub type MessageLogger = Arc<dyn Fn(&PubSubMsg) -> LogLine + Send + Sync>;

/// Logger that emits nothing beyond the adapter's own fields.
pub fn silent_logger() -> MessageLogger {
    Arc::new(|_| LogLine::default())
}

/// Logger that decodes the payload as `T` and describes it, or reports the
/// decode failure together with the raw payload.
pub fn decoding_logger<T, F>(describe: F) -> MessageLogger
where
    T: serde::de::DeserializeOwned,
    F: Fn(T) -> LogLine + Send + Sync + 'static,
{
    Arc::new(move |msg: &PubSubMsg| match serde_json::from_slice::<T>(&msg.data) {
        Ok(payload) => describe(payload),
        Err(err) => LogLine::new("error while unmarshalling message")
            .field("err", err)
            .field("msg", msg.data_str()),
    })
}

/// Delivery tuning shared by all subscriptions of a bus.
#[derive(Debug, Clone)]
pub struct DeliverySettings {
    pub ack_wait: Duration,
    pub max_deliver: u32,
    pub redelivery_delay: Duration,
}

impl Default for DeliverySettings {
    fn default() -> Self {
        Self::from(&BusConfig::default())
    }
}

impl From<&BusConfig> for DeliverySettings {
    fn from(config: &BusConfig) -> Self {
        Self {
            ack_wait: Duration::from_secs(config.ack_wait_secs),
            max_deliver: config.max_deliver.max(1),
            redelivery_delay: Duration::from_millis(config.redelivery_delay_ms),
        }
    }
}

#[async_trait]
pub trait PubSubClient: Send + Sync {
    async fn publish(&self, topic: &str, payload: &[u8]) -> Result<(), BusError>;

    async fn subscribe(
        &self,
        topic: &str,
        handler: MessageHandler,
        logger: MessageLogger,
        validators: Vec<MessageValidator>,
    ) -> Result<(), BusError>;
}

/// JSON-encodes `payload` and publishes it.
pub async fn publish_json<T: Serialize + ?Sized>(
    bus: &dyn PubSubClient,
    topic: &str,
    payload: &T,
) -> Result<(), BusError> {
    let data = serde_json::to_vec(payload).map_err(|e| BusError::Serialization(e.to_string()))?;
    bus.publish(topic, &data).await
}
