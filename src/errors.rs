use crate::handler::Rejection;

// ============================================================================
// Error Types
// ============================================================================

#[derive(Debug, thiserror::Error)]
pub enum CodecError {
    #[error("JSON codec error: {0}")]
    Json(#[from] serde_json::Error),
}

#[derive(Debug, thiserror::Error)]
pub enum PubSubError {
    #[error("Redis error: {0}")]
    Redis(#[from] redis::RedisError),

    #[error("Pub/sub backend unavailable (circuit breaker open)")]
    Unavailable,
}

#[derive(Debug, thiserror::Error)]
pub enum SpawnError {
    /// The handler refused the connection. Not a failure of the service.
    #[error("Handshake rejected: {0}")]
    Rejected(#[from] Rejection),

    #[error("Failed to subscribe to routing address {address}: {source}")]
    Subscribe {
        address: String,
        #[source]
        source: PubSubError,
    },
}

#[derive(Debug, thiserror::Error)]
pub enum SessionError {
    #[error("Session is no longer running")]
    Gone,
}
