use kameo::error::Infallible;
use kameo::reply::{Reply, ReplyError};
use std::time::Duration;

use crate::messaging::ReplyTo;
use crate::models::{CorrelationId, Frame, SessionId};

// ============================================================================
// Messages
// ============================================================================

/// Inbound client payload. Always answered with exactly one `Ack`.
#[derive(Debug)]
pub struct Dispatch {
    pub from: ReplyTo,
    pub body: Frame,
    pub correlation_id: CorrelationId,
}

/// Liveness check. Answered with `SubscribeAck`.
#[derive(Debug)]
pub struct Subscribe {
    pub from: ReplyTo,
    pub correlation_id: CorrelationId,
}

/// Poll for buffered frames.
#[derive(Debug)]
pub struct Flush {
    pub from: ReplyTo,
    pub correlation_id: CorrelationId,
}

/// Anything that is not part of the control protocol; handed to the
/// handler's async callback.
#[derive(Debug)]
pub struct HandlerEvent(pub serde_json::Value);

#[derive(Debug)]
pub(crate) struct InactivityCheck;

#[derive(Debug)]
pub(crate) struct SubscriptionLost {
    pub topic: String,
}

pub struct GetSessionInfo;

#[derive(Debug, Clone)]
pub struct SessionInfo {
    pub session_id: SessionId,
    pub routing_address: String,
    pub handler: String,
    pub serializer: &'static str,
    pub buffered: usize,
    pub parked: bool,
    pub window: Duration,
    pub idle: Duration,
}

impl Reply for SessionInfo {
    type Ok = Self;
    type Error = Infallible;
    type Value = Self;

    fn to_result(self) -> Result<Self, Infallible> {
        Ok(self)
    }

    fn into_any_err(self) -> Option<Box<dyn ReplyError>> {
        None
    }

    fn into_value(self) -> Self::Value {
        self
    }
}
