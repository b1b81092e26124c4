use async_trait::async_trait;
use std::collections::HashMap;
use std::fmt;

use crate::models::{Frame, SessionId};

mod echo;
#[cfg(test)]
pub(crate) mod testing;

pub use echo::EchoHandler;

// ============================================================================
// Session Handler Contract
// ============================================================================
//
// The pluggable protocol logic a session drives. The session never looks
// inside the handler; it only calls these hooks, one at a time, from the
// session actor:
//
//   connect -> init -> (handle_inbound | handle_async)* -> terminate
//
// ============================================================================

/// Everything a handler sees when a client asks for a session.
#[derive(Debug, Clone)]
pub struct ConnectInfo {
    pub session_id: SessionId,
    pub endpoint: String,
    pub transport: String,
    pub params: HashMap<String, String>,
}

/// Returned by `connect` to refuse a session.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("{reason}")]
pub struct Rejection {
    pub reason: String,
}

impl Rejection {
    pub fn new(reason: impl Into<String>) -> Self {
        Self {
            reason: reason.into(),
        }
    }
}

/// Result of handling an inbound client payload.
#[derive(Debug, Clone, PartialEq)]
pub enum InboundOutcome {
    /// Acknowledge with `status` and publish `payload` to the poller.
    Reply { status: String, payload: Frame },
    /// Acknowledge with `ok`, nothing to publish.
    Accepted,
    /// Acknowledge with `error`, then end the session.
    Stop { reason: String },
}

impl InboundOutcome {
    pub fn ok(payload: Frame) -> Self {
        InboundOutcome::Reply {
            status: "ok".to_string(),
            payload,
        }
    }

    pub fn stop(reason: impl Into<String>) -> Self {
        InboundOutcome::Stop {
            reason: reason.into(),
        }
    }
}

/// Result of handling an asynchronous (non-client) event.
#[derive(Debug, Clone, PartialEq)]
pub enum AsyncOutcome {
    Push(Frame),
    Noop,
    Stop { reason: String },
}

/// Why a session ended. Passed to `SessionHandler::terminate`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TerminateReason {
    /// Handler asked to stop.
    Handler(String),
    /// No poll within the inactivity window.
    Inactive,
    /// The routing subscription went away.
    SubscriptionLost(String),
    /// Stopped from outside (handle dropped or explicit stop).
    Shutdown,
    /// The actor panicked or was killed.
    Crashed(String),
}

impl TerminateReason {
    /// Low-cardinality label for metrics.
    pub fn label(&self) -> &'static str {
        match self {
            TerminateReason::Handler(_) => "handler",
            TerminateReason::Inactive => "inactive",
            TerminateReason::SubscriptionLost(_) => "subscription_lost",
            TerminateReason::Shutdown => "shutdown",
            TerminateReason::Crashed(_) => "crashed",
        }
    }
}

impl fmt::Display for TerminateReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TerminateReason::Handler(reason) => write!(f, "handler stop: {}", reason),
            TerminateReason::Inactive => write!(f, "inactive"),
            TerminateReason::SubscriptionLost(topic) => {
                write!(f, "subscription to {} lost", topic)
            }
            TerminateReason::Shutdown => write!(f, "shutdown"),
            TerminateReason::Crashed(cause) => write!(f, "crashed: {}", cause),
        }
    }
}

#[async_trait]
pub trait SessionHandler: Send + 'static {
    /// Handler identity, used in logs and metrics.
    fn name(&self) -> &str;

    /// Accept or refuse the session. Runs before the actor exists.
    async fn connect(&mut self, info: &ConnectInfo) -> Result<(), Rejection>;

    /// Called once the session is running.
    async fn init(&mut self) {}

    async fn handle_inbound(&mut self, body: Frame) -> InboundOutcome;

    async fn handle_async(&mut self, event: serde_json::Value) -> AsyncOutcome;

    /// Called exactly once, whatever ended the session.
    async fn terminate(&mut self, _reason: &TerminateReason) {}
}
