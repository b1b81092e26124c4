use async_trait::async_trait;
use futures_util::StreamExt;
use redis::aio::MultiplexedConnection;
use redis::AsyncCommands;
use tokio::sync::mpsc;

use super::pubsub::{PubSub, SubscriberId, Subscription};
use crate::errors::PubSubError;
use crate::utils::{
    retry_on_transient, CircuitBreaker, CircuitBreakerConfig, CircuitBreakerError, CircuitState,
    IsTransient, RetryConfig, RetryResult,
};

// ============================================================================
// Redis Pub/Sub
// ============================================================================
//
// Cross-node transport. Every published frame is prefixed with the 16-byte
// subscriber id of its origin so a session never hears its own broadcasts:
//
//   [ origin: 16 bytes ][ payload ... ]
//
// Publishing goes through a circuit breaker; the initial connection is
// retried with exponential backoff on transient errors.
//
// ============================================================================

const ORIGIN_LEN: usize = 16;

pub struct RedisPubSub {
    client: redis::Client,
    publisher: MultiplexedConnection,
    circuit_breaker: CircuitBreaker,
}

impl IsTransient for redis::RedisError {
    fn is_transient(&self) -> bool {
        self.is_io_error()
            || self.is_timeout()
            || self.is_connection_refusal()
            || self.is_connection_dropped()
    }
}

impl RedisPubSub {
    pub async fn connect(url: &str) -> Result<Self, PubSubError> {
        Self::connect_with(url, RetryConfig::default(), CircuitBreakerConfig::default()).await
    }

    pub async fn connect_with(
        url: &str,
        retry: RetryConfig,
        breaker: CircuitBreakerConfig,
    ) -> Result<Self, PubSubError> {
        let client = redis::Client::open(url)?;

        tracing::info!("Connecting to Redis pub/sub");

        let result = retry_on_transient(retry, |attempt| {
            let client = client.clone();
            async move {
                tracing::debug!(attempt = attempt, "Opening Redis publisher connection");
                client.get_multiplexed_async_connection().await
            }
        })
        .await;

        let publisher = match result {
            RetryResult::Success(conn) => conn,
            RetryResult::Failed(e) | RetryResult::PermanentFailure(e) => return Err(e.into()),
        };

        tracing::info!("✅ Connected to Redis pub/sub");

        Ok(Self {
            client,
            publisher,
            circuit_breaker: CircuitBreaker::new("redis", breaker),
        })
    }

    pub async fn publisher_state(&self) -> CircuitState {
        self.circuit_breaker.state().await
    }
}

fn frame_with_origin(origin: SubscriberId, payload: &[u8]) -> Vec<u8> {
    let mut frame = Vec::with_capacity(ORIGIN_LEN + payload.len());
    frame.extend_from_slice(origin.as_bytes());
    frame.extend_from_slice(payload);
    frame
}

fn split_origin(frame: &[u8]) -> Option<(SubscriberId, &[u8])> {
    if frame.len() < ORIGIN_LEN {
        return None;
    }
    let (origin, payload) = frame.split_at(ORIGIN_LEN);
    let origin: [u8; ORIGIN_LEN] = origin.try_into().ok()?;
    Some((SubscriberId::from_bytes(origin), payload))
}

#[async_trait]
impl PubSub for RedisPubSub {
    async fn subscribe(&self, topic: &str) -> Result<Subscription, PubSubError> {
        let mut pubsub = self.client.get_async_pubsub().await?;
        pubsub.subscribe(topic).await?;

        let id = SubscriberId::new();
        let (tx, rx) = mpsc::unbounded_channel();
        let channel = topic.to_string();

        tokio::spawn(async move {
            let mut messages = pubsub.into_on_message();

            loop {
                tokio::select! {
                    _ = tx.closed() => break,
                    next = messages.next() => {
                        let Some(msg) = next else { break };

                        let frame: Vec<u8> = match msg.get_payload() {
                            Ok(frame) => frame,
                            Err(e) => {
                                tracing::warn!(error = %e, topic = %channel, "Unreadable Redis payload");
                                continue;
                            }
                        };

                        match split_origin(&frame) {
                            Some((origin, _)) if origin == id => continue,
                            Some((_, payload)) => {
                                if tx.send(payload.to_vec()).is_err() {
                                    break;
                                }
                            }
                            None => {
                                tracing::warn!(topic = %channel, len = frame.len(), "Redis frame without origin header");
                            }
                        }
                    }
                }
            }

            tracing::debug!(topic = %channel, subscriber = %id, "Redis subscription closed");
        });

        tracing::debug!(topic = %topic, subscriber = %id, "Subscribed to Redis channel");

        Ok(Subscription::new(id, topic.to_string(), rx))
    }

    async fn broadcast_from(
        &self,
        from: SubscriberId,
        topic: &str,
        payload: Vec<u8>,
    ) -> Result<(), PubSubError> {
        let frame = frame_with_origin(from, &payload);
        let mut conn = self.publisher.clone();

        let result = self
            .circuit_breaker
            .call(async move {
                let receivers: i64 = conn.publish(topic, frame).await?;
                Ok::<i64, redis::RedisError>(receivers)
            })
            .await;

        match result {
            Ok(receivers) => {
                tracing::trace!(topic = %topic, receivers, "Published to Redis");
                Ok(())
            }
            Err(CircuitBreakerError::CircuitOpen) => {
                tracing::error!(topic = %topic, "Circuit breaker open - Redis unavailable");
                Err(PubSubError::Unavailable)
            }
            Err(CircuitBreakerError::OperationFailed(e)) => {
                tracing::error!(error = %e, topic = %topic, "Failed to publish to Redis");
                Err(e.into())
            }
        }
    }
}
