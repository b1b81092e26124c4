use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::{mpsc, Mutex};

use super::pubsub::{PubSub, SubscriberId, Subscription};
use crate::errors::PubSubError;

// ============================================================================
// In-process Pub/Sub
// ============================================================================
//
// Single-node bus: each subscription owns an unbounded channel, and a
// broadcast fans out to every live channel on the topic. Dropped
// subscriptions are pruned lazily on the next broadcast.
//
// ============================================================================

type Subscribers = Vec<(SubscriberId, mpsc::UnboundedSender<Vec<u8>>)>;

#[derive(Clone, Default)]
pub struct LocalPubSub {
    topics: Arc<Mutex<HashMap<String, Subscribers>>>,
}

impl LocalPubSub {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of live subscriptions on `topic`.
    pub async fn subscriber_count(&self, topic: &str) -> usize {
        let topics = self.topics.lock().await;
        topics
            .get(topic)
            .map(|subs| subs.iter().filter(|(_, tx)| !tx.is_closed()).count())
            .unwrap_or(0)
    }

    /// Drop every subscription on `topic`. Subscribers observe the end of
    /// their stream.
    pub async fn close_topic(&self, topic: &str) {
        let removed = self.topics.lock().await.remove(topic);
        if let Some(subs) = removed {
            tracing::debug!(topic = %topic, subscribers = subs.len(), "Closed local topic");
        }
    }
}

#[async_trait]
impl PubSub for LocalPubSub {
    async fn subscribe(&self, topic: &str) -> Result<Subscription, PubSubError> {
        let (tx, rx) = mpsc::unbounded_channel();
        let id = SubscriberId::new();

        self.topics
            .lock()
            .await
            .entry(topic.to_string())
            .or_default()
            .push((id, tx));

        tracing::debug!(topic = %topic, subscriber = %id, "Subscribed to local topic");

        Ok(Subscription::new(id, topic.to_string(), rx))
    }

    async fn broadcast_from(
        &self,
        from: SubscriberId,
        topic: &str,
        payload: Vec<u8>,
    ) -> Result<(), PubSubError> {
        let mut topics = self.topics.lock().await;

        let Some(subs) = topics.get_mut(topic) else {
            tracing::debug!(topic = %topic, "Broadcast to topic with no subscribers");
            return Ok(());
        };

        subs.retain(|(id, tx)| {
            if *id == from {
                return !tx.is_closed();
            }
            tx.send(payload.clone()).is_ok()
        });

        if subs.is_empty() {
            topics.remove(topic);
        }

        Ok(())
    }
}
