use async_trait::async_trait;
use std::fmt;
use tokio::sync::mpsc;
use uuid::Uuid;

use crate::errors::PubSubError;

/// Identity of one subscription, used to exclude a broadcaster from its own
/// deliveries.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct SubscriberId(Uuid);

impl SubscriberId {
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }

    /// Origin used by publishers that hold no subscription.
    pub fn anonymous() -> Self {
        Self(Uuid::nil())
    }

    pub fn as_bytes(&self) -> &[u8; 16] {
        self.0.as_bytes()
    }

    pub fn from_bytes(bytes: [u8; 16]) -> Self {
        Self(Uuid::from_bytes(bytes))
    }
}

impl Default for SubscriberId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for SubscriberId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.0.fmt(f)
    }
}

/// A live subscription to one topic. `recv` returning `None` means the
/// subscription is gone and will not come back.
pub struct Subscription {
    id: SubscriberId,
    topic: String,
    rx: mpsc::UnboundedReceiver<Vec<u8>>,
}

impl Subscription {
    pub(crate) fn new(id: SubscriberId, topic: String, rx: mpsc::UnboundedReceiver<Vec<u8>>) -> Self {
        Self { id, topic, rx }
    }

    pub fn id(&self) -> SubscriberId {
        self.id
    }

    pub fn topic(&self) -> &str {
        &self.topic
    }

    pub async fn recv(&mut self) -> Option<Vec<u8>> {
        self.rx.recv().await
    }

    pub fn try_recv(&mut self) -> Option<Vec<u8>> {
        self.rx.try_recv().ok()
    }
}

impl fmt::Debug for Subscription {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Subscription")
            .field("id", &self.id)
            .field("topic", &self.topic)
            .finish()
    }
}

/// Topic-based publish/subscribe transport shared by all sessions.
#[async_trait]
pub trait PubSub: Send + Sync + 'static {
    async fn subscribe(&self, topic: &str) -> Result<Subscription, PubSubError>;

    /// Publish to every subscriber of `topic` except the subscription `from`.
    async fn broadcast_from(
        &self,
        from: SubscriberId,
        topic: &str,
        payload: Vec<u8>,
    ) -> Result<(), PubSubError>;

    async fn broadcast(&self, topic: &str, payload: Vec<u8>) -> Result<(), PubSubError> {
        self.broadcast_from(SubscriberId::anonymous(), topic, payload).await
    }
}
