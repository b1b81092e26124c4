// ============================================================================
// Messaging Module
// ============================================================================
//
// Everything a session needs to talk to the outside world:
// - PubSub        - topic transport (local bus or Redis)
// - WireSerializer - bytes <-> envelopes for the pub/sub path
// - ReplyTo / ReplyRouter - where a reply goes and how it gets there
//
// ============================================================================

mod local;
mod pubsub;
mod redis_pubsub;
mod serializer;

pub use local::LocalPubSub;
pub use pubsub::{PubSub, SubscriberId, Subscription};
pub use redis_pubsub::RedisPubSub;
pub use serializer::{JsonSerializer, WireSerializer};

use std::sync::Arc;
use tokio::sync::mpsc;

use crate::models::SessionReply;

/// Recipient of a session reply.
///
/// `Topic` is broadcast on the pub/sub transport (cross-node). `Direct` is an
/// in-process channel for callers on the same node.
#[derive(Debug, Clone)]
pub enum ReplyTo {
    Topic(String),
    Direct(mpsc::UnboundedSender<SessionReply>),
}

impl ReplyTo {
    pub fn topic(topic: impl Into<String>) -> Self {
        ReplyTo::Topic(topic.into())
    }

    /// Direct recipient plus the receiving end the caller keeps.
    pub fn channel() -> (Self, mpsc::UnboundedReceiver<SessionReply>) {
        let (tx, rx) = mpsc::unbounded_channel();
        (ReplyTo::Direct(tx), rx)
    }
}

/// Delivers replies for one session, excluding the session's own
/// subscription from topic broadcasts.
#[derive(Clone)]
pub struct ReplyRouter {
    pubsub: Arc<dyn PubSub>,
    serializer: Arc<dyn WireSerializer>,
    origin: SubscriberId,
}

impl ReplyRouter {
    pub fn new(
        pubsub: Arc<dyn PubSub>,
        serializer: Arc<dyn WireSerializer>,
        origin: SubscriberId,
    ) -> Self {
        Self {
            pubsub,
            serializer,
            origin,
        }
    }

    pub fn serializer(&self) -> &Arc<dyn WireSerializer> {
        &self.serializer
    }

    /// Fire-and-forget delivery. Failures are logged; the recipient is
    /// expected to re-poll or re-establish the session.
    pub async fn deliver(&self, to: &ReplyTo, reply: SessionReply) {
        match to {
            ReplyTo::Direct(tx) => {
                let kind = reply.kind();
                if tx.send(reply).is_err() {
                    tracing::debug!(reply = kind, "Direct recipient is gone, dropping reply");
                }
            }
            ReplyTo::Topic(topic) => {
                let bytes = match self.serializer.encode_reply(&reply) {
                    Ok(bytes) => bytes,
                    Err(e) => {
                        tracing::error!(
                            error = %e,
                            topic = %topic,
                            reply = reply.kind(),
                            "Failed to encode reply"
                        );
                        return;
                    }
                };

                if let Err(e) = self.pubsub.broadcast_from(self.origin, topic, bytes).await {
                    tracing::warn!(
                        error = %e,
                        topic = %topic,
                        reply = reply.kind(),
                        correlation_id = %reply.correlation_id(),
                        "Failed to broadcast reply"
                    );
                }
            }
        }
    }
}
