use serde::{Deserialize, Serialize};
use std::fmt;
use uuid::Uuid;

// ============================================================================
// Wire Models
// ============================================================================
//
// Types that cross the session boundary:
// - SessionId / CorrelationId  - identities
// - Frame                      - an outbound or inbound protocol payload
// - ControlMessage             - what the endpoint sends to a session
// - SessionReply               - what a session sends back to a poller
//
// ============================================================================

/// Identity of one long-poll session (one actor).
#[derive(Serialize, Deserialize, Clone, Copy, Debug, PartialEq, Eq, Hash)]
#[serde(transparent)]
pub struct SessionId(Uuid);

impl SessionId {
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }

    /// Default private topic a session listens on for control messages.
    pub fn routing_address(&self) -> String {
        format!("longpoll:session:{}", self.0)
    }
}

impl Default for SessionId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for SessionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.0.fmt(f)
    }
}

/// Opaque token linking a request to its eventual response.
#[derive(Serialize, Deserialize, Clone, Debug, PartialEq, Eq, Hash)]
#[serde(transparent)]
pub struct CorrelationId(String);

impl CorrelationId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn random() -> Self {
        Self(Uuid::new_v4().to_string())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl From<&str> for CorrelationId {
    fn from(id: &str) -> Self {
        Self::new(id)
    }
}

impl From<String> for CorrelationId {
    fn from(id: String) -> Self {
        Self(id)
    }
}

impl fmt::Display for CorrelationId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

#[derive(Serialize, Deserialize, Clone, Copy, Debug, Default, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum Opcode {
    #[default]
    Text,
    Binary,
}

/// A single protocol payload, tagged with how the endpoint should frame it.
#[derive(Serialize, Deserialize, Clone, Debug, PartialEq, Eq)]
pub struct Frame {
    pub opcode: Opcode,
    pub payload: String,
}

impl Frame {
    pub fn text(payload: impl Into<String>) -> Self {
        Self {
            opcode: Opcode::Text,
            payload: payload.into(),
        }
    }

    pub fn binary(payload: impl Into<String>) -> Self {
        Self {
            opcode: Opcode::Binary,
            payload: payload.into(),
        }
    }
}

// ============================================================================
// Replies emitted by a session
// ============================================================================

/// Acknowledgment status. Handlers may return any status string; everything
/// other than `"ok"` collapses to `Error`.
#[derive(Serialize, Deserialize, Clone, Copy, Debug, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum AckStatus {
    Ok,
    Error,
}

impl AckStatus {
    pub fn normalize(status: &str) -> Self {
        if status == "ok" {
            AckStatus::Ok
        } else {
            AckStatus::Error
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            AckStatus::Ok => "ok",
            AckStatus::Error => "error",
        }
    }
}

#[derive(Serialize, Deserialize, Clone, Debug, PartialEq, Eq)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum SessionReply {
    Ack {
        status: AckStatus,
        correlation_id: CorrelationId,
    },
    SubscribeAck {
        correlation_id: CorrelationId,
    },
    /// Buffered frames, oldest first.
    Messages {
        messages: Vec<Frame>,
        correlation_id: CorrelationId,
    },
    /// Wakes a parked poll; the poller is expected to flush again.
    DataAvailable {
        correlation_id: CorrelationId,
    },
}

impl SessionReply {
    pub fn correlation_id(&self) -> &CorrelationId {
        match self {
            SessionReply::Ack { correlation_id, .. }
            | SessionReply::SubscribeAck { correlation_id }
            | SessionReply::Messages { correlation_id, .. }
            | SessionReply::DataAvailable { correlation_id } => correlation_id,
        }
    }

    pub fn kind(&self) -> &'static str {
        match self {
            SessionReply::Ack { .. } => "ack",
            SessionReply::SubscribeAck { .. } => "subscribe_ack",
            SessionReply::Messages { .. } => "messages",
            SessionReply::DataAvailable { .. } => "data_available",
        }
    }
}

// ============================================================================
// Control envelope delivered on the routing address
// ============================================================================

/// Serialized form of the messages a session accepts over pub/sub.
/// `from` is the topic the reply must be broadcast on.
#[derive(Serialize, Deserialize, Clone, Debug, PartialEq)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ControlMessage {
    Dispatch {
        from: String,
        body: Frame,
        correlation_id: CorrelationId,
    },
    Subscribe {
        from: String,
        correlation_id: CorrelationId,
    },
    Flush {
        from: String,
        correlation_id: CorrelationId,
    },
    /// Anything else the handler wants delivered to its async callback.
    Event { payload: serde_json::Value },
}
