// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0

//! In-process bus
//!
//! Single-node implementation of [`PubSubClient`]. Each topic has one durable
//! consumer; messages published before it subscribes are retained and handed
//! over on subscribe. Every subscription runs on its own worker task that
//! processes one message at a time, so a message being redelivered holds back
//! the messages behind it.

use async_trait::async_trait;
use parking_lot::Mutex;
use std::collections::{HashMap, HashSet, VecDeque};
use std::sync::Arc;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};
use uuid::Uuid;

use super::{
    BusError, DeliverySettings, HandlerError, MessageHandler, MessageLogger, MessageValidator, PubSubClient,
    PubSubMsg, TopicConfig, TopicRegistry,
};

#[derive(Debug, Clone)]
struct Envelope {
    msg_id: String,
    data: Vec<u8>,
}

#[derive(Default)]
struct TopicState {
    backlog: VecDeque<Envelope>,
    subscriber: Option<mpsc::UnboundedSender<Envelope>>,
}

#[derive(Default)]
struct BusState {
    closed: bool,
    topics: HashMap<String, TopicState>,
    durables: HashSet<String>,
    workers: Vec<JoinHandle<()>>,
}

#[derive(Clone)]
pub struct InMemoryPubSub {
    registry: Arc<TopicRegistry>,
    settings: DeliverySettings,
    state: Arc<Mutex<BusState>>,
}

impl InMemoryPubSub {
    pub fn new(registry: TopicRegistry, settings: DeliverySettings) -> Self {
        Self {
            registry: Arc::new(registry),
            settings,
            state: Arc::new(Mutex::new(BusState::default())),
        }
    }

    pub fn with_defaults() -> Self {
        Self::new(TopicRegistry::default(), DeliverySettings::default())
    }

    /// Messages retained for a topic that has no subscriber yet.
    pub fn backlog_len(&self, topic: &str) -> usize {
        self.state
            .lock()
            .topics
            .get(topic)
            .map(|t| t.backlog.len())
            .unwrap_or(0)
    }

    /// Stops accepting messages, lets every worker drain what it already
    /// holds, and waits for them.
    pub async fn close(&self) {
        let workers = {
            let mut state = self.state.lock();
            state.closed = true;
            for topic in state.topics.values_mut() {
                topic.subscriber = None;
            }
            std::mem::take(&mut state.workers)
        };
        for worker in workers {
            if let Err(e) = worker.await {
                warn!("Subscription worker ended abnormally: {}", e);
            }
        }
        info!("Message bus closed");
    }
}

#[async_trait]
impl PubSubClient for InMemoryPubSub {
    async fn publish(&self, topic: &str, payload: &[u8]) -> Result<(), BusError> {
        if !self.registry.contains(topic) {
            return Err(BusError::UnknownTopic(topic.to_string()));
        }
        let envelope = Envelope {
            msg_id: Uuid::new_v4().to_string(),
            data: payload.to_vec(),
        };
        let msg_id = envelope.msg_id.clone();
        {
            let mut state = self.state.lock();
            if state.closed {
                return Err(BusError::Closed);
            }
            let topic_state = state.topics.entry(topic.to_string()).or_default();
            let undelivered = match topic_state.subscriber.as_ref() {
                Some(sender) => sender.send(envelope).err().map(|e| e.0),
                None => Some(envelope),
            };
            if let Some(envelope) = undelivered {
                topic_state.subscriber = None;
                topic_state.backlog.push_back(envelope);
            }
        }
        metrics::counter!("fabric_pubsub_published_total", "topic" => topic.to_string()).increment(1);
        debug!(topic = %topic, msg_id = %msg_id, bytes = payload.len(), "Published message");
        Ok(())
    }

    async fn subscribe(
        &self,
        topic: &str,
        handler: MessageHandler,
        logger: MessageLogger,
        validators: Vec<MessageValidator>,
    ) -> Result<(), BusError> {
        let config = self
            .registry
            .get(topic)
            .cloned()
            .ok_or_else(|| BusError::UnknownTopic(topic.to_string()))?;
        let (sender, receiver) = mpsc::unbounded_channel();
        {
            let mut state = self.state.lock();
            if state.closed {
                return Err(BusError::Closed);
            }
            if !state.durables.insert(config.durable_name.clone()) {
                return Err(BusError::AlreadySubscribed(config.durable_name.clone()));
            }
            let topic_state = state.topics.entry(topic.to_string()).or_default();
            for envelope in topic_state.backlog.drain(..) {
                // The receiver is alive until the worker below exits.
                let _ = sender.send(envelope);
            }
            topic_state.subscriber = Some(sender);

            let worker = tokio::spawn(run_subscription(
                config.clone(),
                receiver,
                handler,
                logger,
                validators,
                self.settings.clone(),
            ));
            state.workers.push(worker);
        }
        info!(
            topic = %config.topic,
            stream = %config.stream,
            queue_group = %config.queue_group,
            durable = %config.durable_name,
            "Subscribed"
        );
        Ok(())
    }
}

async fn run_subscription(
    config: TopicConfig,
    mut receiver: mpsc::UnboundedReceiver<Envelope>,
    handler: MessageHandler,
    logger: MessageLogger,
    validators: Vec<MessageValidator>,
    settings: DeliverySettings,
) {
    while let Some(envelope) = receiver.recv().await {
        deliver(&config, envelope, &handler, &logger, &validators, &settings).await;
    }
    debug!(topic = %config.topic, "Subscription worker stopped");
}

enum Outcome {
    Ack,
    Nack,
}

async fn deliver(
    config: &TopicConfig,
    envelope: Envelope,
    handler: &MessageHandler,
    logger: &MessageLogger,
    validators: &[MessageValidator],
    settings: &DeliverySettings,
) {
    let topic = config.topic.as_str();
    for attempt in 1..=settings.max_deliver {
        let msg = PubSubMsg {
            data: envelope.data.clone(),
            msg_id: envelope.msg_id.clone(),
            delivery: attempt,
        };
        if attempt > 1 {
            metrics::counter!("fabric_pubsub_redelivered_total", "topic" => topic.to_string()).increment(1);
        }

        let line = logger(&msg);
        if !line.message.is_empty() {
            info!(topic = %topic, msg_id = %msg.msg_id, delivery = attempt, fields = ?line.fields, "{}", line.message);
        }

        for validator in validators {
            if !validator(&msg).await {
                info!(topic = %topic, msg_id = %msg.msg_id, "Message rejected by validator, acking");
                return;
            }
        }

        let mut task = tokio::spawn(handler(msg));
        let outcome = match tokio::time::timeout(settings.ack_wait, &mut task).await {
            Ok(Ok(Ok(()))) => Outcome::Ack,
            Ok(Ok(Err(HandlerError::Permanent(reason)))) => {
                error!(topic = %topic, msg_id = %envelope.msg_id, reason = %reason, "Handler failed permanently, acking");
                Outcome::Ack
            }
            Ok(Ok(Err(HandlerError::Transient(reason)))) => {
                warn!(topic = %topic, msg_id = %envelope.msg_id, delivery = attempt, reason = %reason, "Handler failed transiently");
                Outcome::Nack
            }
            Ok(Err(join_error)) => {
                error!(topic = %topic, msg_id = %envelope.msg_id, delivery = attempt, "Handler panicked: {}", join_error);
                Outcome::Nack
            }
            Err(_) => {
                task.abort();
                warn!(topic = %topic, msg_id = %envelope.msg_id, delivery = attempt, "Handler exceeded ack wait");
                Outcome::Nack
            }
        };

        if let Outcome::Ack = outcome {
            metrics::counter!("fabric_pubsub_delivered_total", "topic" => topic.to_string()).increment(1);
            return;
        }
        if attempt < settings.max_deliver {
            tokio::time::sleep(settings.redelivery_delay).await;
        }
    }
    error!(
        topic = %topic,
        msg_id = %envelope.msg_id,
        max_deliver = settings.max_deliver,
        "Dropping message after exhausting deliveries"
    );
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::infrastructure::pubsub::{silent_logger, topics};
    use futures::FutureExt;
    use std::sync::atomic::{AtomicU32, Ordering};
    use std::time::Duration;

    fn bus() -> InMemoryPubSub {
        InMemoryPubSub::new(
            TopicRegistry::default(),
            DeliverySettings {
                ack_wait: Duration::from_millis(300),
                max_deliver: 3,
                redelivery_delay: Duration::from_millis(5),
            },
        )
    }

    fn forwarding_handler(tx: mpsc::UnboundedSender<PubSubMsg>) -> MessageHandler {
        Arc::new(move |msg| {
            let tx = tx.clone();
            async move {
                let _ = tx.send(msg);
                Ok(())
            }
            .boxed()
        })
    }

    async fn recv(rx: &mut mpsc::UnboundedReceiver<PubSubMsg>) -> Option<PubSubMsg> {
        tokio::time::timeout(Duration::from_secs(2), rx.recv()).await.ok().flatten()
    }

    #[tokio::test]
    async fn test_publish_to_unknown_topic_fails() {
        let bus = bus();
        let err = bus.publish("NOT-A-TOPIC", b"{}").await.unwrap_err();
        assert!(matches!(err, BusError::UnknownTopic(_)));
    }

    #[tokio::test]
    async fn test_backlog_delivered_on_subscribe() {
        let bus = bus();
        bus.publish(topics::BULK_DEPLOY, b"first").await.unwrap();
        bus.publish(topics::BULK_DEPLOY, b"second").await.unwrap();
        assert_eq!(bus.backlog_len(topics::BULK_DEPLOY), 2);

        let (tx, mut rx) = mpsc::unbounded_channel();
        bus.subscribe(topics::BULK_DEPLOY, forwarding_handler(tx), silent_logger(), vec![])
            .await
            .unwrap();

        assert_eq!(recv(&mut rx).await.unwrap().data, b"first");
        assert_eq!(recv(&mut rx).await.unwrap().data, b"second");
        assert_eq!(bus.backlog_len(topics::BULK_DEPLOY), 0);
    }

    #[tokio::test]
    async fn test_second_subscription_of_durable_rejected() {
        let bus = bus();
        let (tx, _rx) = mpsc::unbounded_channel();
        bus.subscribe(topics::CI_COMPLETE, forwarding_handler(tx.clone()), silent_logger(), vec![])
            .await
            .unwrap();
        let err = bus
            .subscribe(topics::CI_COMPLETE, forwarding_handler(tx), silent_logger(), vec![])
            .await
            .unwrap_err();
        assert!(matches!(err, BusError::AlreadySubscribed(_)));
    }

    #[tokio::test]
    async fn test_panicking_handler_is_redelivered() {
        let bus = bus();
        let calls = Arc::new(AtomicU32::new(0));
        let (tx, mut rx) = mpsc::unbounded_channel();
        let handler: MessageHandler = {
            let calls = calls.clone();
            Arc::new(move |msg| {
                let calls = calls.clone();
                let tx = tx.clone();
                async move {
                    if calls.fetch_add(1, Ordering::SeqCst) == 0 {
                        panic!("boom");
                    }
                    let _ = tx.send(msg);
                    Ok(())
                }
                .boxed()
            })
        };
        bus.subscribe(topics::CD_STAGE_COMPLETE, handler, silent_logger(), vec![])
            .await
            .unwrap();
        bus.publish(topics::CD_STAGE_COMPLETE, b"{}").await.unwrap();

        let msg = recv(&mut rx).await.unwrap();
        assert_eq!(msg.delivery, 2);
        assert_eq!(calls.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn test_transient_errors_bounded_by_max_deliver() {
        let bus = bus();
        let calls = Arc::new(AtomicU32::new(0));
        let handler: MessageHandler = {
            let calls = calls.clone();
            Arc::new(move |_| {
                let calls = calls.clone();
                async move {
                    calls.fetch_add(1, Ordering::SeqCst);
                    Err(HandlerError::Transient("db down".to_string()))
                }
                .boxed()
            })
        };
        bus.subscribe(topics::BULK_HIBERNATE, handler, silent_logger(), vec![])
            .await
            .unwrap();
        bus.publish(topics::BULK_HIBERNATE, b"{}").await.unwrap();
        bus.close().await;

        assert_eq!(calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn test_permanent_error_acks_once() {
        let bus = bus();
        let calls = Arc::new(AtomicU32::new(0));
        let handler: MessageHandler = {
            let calls = calls.clone();
            Arc::new(move |_| {
                let calls = calls.clone();
                async move {
                    calls.fetch_add(1, Ordering::SeqCst);
                    Err(HandlerError::Permanent("bad payload".to_string()))
                }
                .boxed()
            })
        };
        bus.subscribe(topics::CRON_EVENTS, handler, silent_logger(), vec![])
            .await
            .unwrap();
        bus.publish(topics::CRON_EVENTS, b"{}").await.unwrap();
        bus.close().await;

        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_slow_handler_times_out_and_redelivers() {
        let bus = bus();
        let calls = Arc::new(AtomicU32::new(0));
        let (tx, mut rx) = mpsc::unbounded_channel();
        let handler: MessageHandler = {
            let calls = calls.clone();
            Arc::new(move |msg| {
                let calls = calls.clone();
                let tx = tx.clone();
                async move {
                    if calls.fetch_add(1, Ordering::SeqCst) == 0 {
                        tokio::time::sleep(Duration::from_secs(5)).await;
                    }
                    let _ = tx.send(msg);
                    Ok(())
                }
                .boxed()
            })
        };
        bus.subscribe(topics::CHART_SCAN, handler, silent_logger(), vec![])
            .await
            .unwrap();
        bus.publish(topics::CHART_SCAN, b"{}").await.unwrap();

        assert_eq!(recv(&mut rx).await.unwrap().delivery, 2);
    }

    #[tokio::test]
    async fn test_rejected_message_skips_handler() {
        let bus = bus();
        let (tx, mut rx) = mpsc::unbounded_channel();
        let validator: MessageValidator = Arc::new(|msg: &PubSubMsg| {
            let keep = msg.data != b"stale";
            async move { keep }.boxed()
        });
        bus.subscribe(topics::NEW_CI_MATERIAL, forwarding_handler(tx), silent_logger(), vec![validator])
            .await
            .unwrap();
        bus.publish(topics::NEW_CI_MATERIAL, b"stale").await.unwrap();
        bus.publish(topics::NEW_CI_MATERIAL, b"fresh").await.unwrap();

        let msg = recv(&mut rx).await.unwrap();
        assert_eq!(msg.data, b"fresh");
        assert_eq!(msg.delivery, 1);
    }

    #[tokio::test]
    async fn test_closed_bus_rejects_publish_and_subscribe() {
        let bus = bus();
        bus.close().await;
        assert!(matches!(bus.publish(topics::BULK_DEPLOY, b"{}").await, Err(BusError::Closed)));
        let (tx, _rx) = mpsc::unbounded_channel();
        let err = bus
            .subscribe(topics::BULK_DEPLOY, forwarding_handler(tx), silent_logger(), vec![])
            .await
            .unwrap_err();
        assert!(matches!(err, BusError::Closed));
    }
}
