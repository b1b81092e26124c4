use async_trait::async_trait;
use chrono::{DateTime, Utc};

use super::{AsyncOutcome, ConnectInfo, InboundOutcome, Rejection, SessionHandler, TerminateReason};
use crate::models::{Frame, Opcode};

// ============================================================================
// Echo Handler
// ============================================================================
//
// Reference protocol used by the demo binary and tests:
// - "ping"   -> reply ok "pong"
// - "close"  -> stop the session
// - binary   -> accepted, nothing published
// - other    -> reply ok with the same text
//
// Async events: a JSON string is pushed as a text frame, null is ignored,
// {"stop": "<reason>"} ends the session, anything else is pushed as JSON.
//
// ============================================================================

pub struct EchoHandler {
    required_token: Option<String>,
    connected_at: Option<DateTime<Utc>>,
    inbound_count: u64,
}

impl EchoHandler {
    pub fn new() -> Self {
        Self {
            required_token: None,
            connected_at: None,
            inbound_count: 0,
        }
    }

    /// Refuse sessions whose `token` connect parameter does not match.
    pub fn with_required_token(mut self, token: impl Into<String>) -> Self {
        self.required_token = Some(token.into());
        self
    }
}

impl Default for EchoHandler {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl SessionHandler for EchoHandler {
    fn name(&self) -> &str {
        "echo"
    }

    async fn connect(&mut self, info: &ConnectInfo) -> Result<(), Rejection> {
        if let Some(ref expected) = self.required_token {
            match info.params.get("token") {
                Some(token) if token == expected => {}
                Some(_) => return Err(Rejection::new("invalid token")),
                None => return Err(Rejection::new("missing token")),
            }
        }

        self.connected_at = Some(Utc::now());
        Ok(())
    }

    async fn handle_inbound(&mut self, body: Frame) -> InboundOutcome {
        self.inbound_count += 1;

        if body.opcode == Opcode::Binary {
            return InboundOutcome::Accepted;
        }

        match body.payload.as_str() {
            "ping" => InboundOutcome::ok(Frame::text("pong")),
            "close" => InboundOutcome::stop("client requested close"),
            _ => InboundOutcome::ok(body),
        }
    }

    async fn handle_async(&mut self, event: serde_json::Value) -> AsyncOutcome {
        match event {
            serde_json::Value::Null => AsyncOutcome::Noop,
            serde_json::Value::String(text) => AsyncOutcome::Push(Frame::text(text)),
            serde_json::Value::Object(ref map) if map.contains_key("stop") => {
                let reason = map
                    .get("stop")
                    .and_then(|v| v.as_str())
                    .unwrap_or("stop requested")
                    .to_string();
                AsyncOutcome::Stop { reason }
            }
            other => AsyncOutcome::Push(Frame::text(other.to_string())),
        }
    }

    async fn terminate(&mut self, reason: &TerminateReason) {
        let lifetime_secs = self
            .connected_at
            .map(|at| (Utc::now() - at).num_seconds())
            .unwrap_or(0);

        tracing::info!(
            reason = %reason,
            inbound_count = self.inbound_count,
            lifetime_secs,
            "Echo handler terminated"
        );
    }
}
