use async_trait::async_trait;
use std::sync::{Arc, Mutex};

use super::{AsyncOutcome, ConnectInfo, InboundOutcome, Rejection, SessionHandler, TerminateReason};
use crate::models::Frame;

/// Scriptable handler that records every callback it receives.
///
/// Inbound: "deny" replies with status "unauthorized", "quiet" is accepted,
/// "slow" is accepted after two seconds, "quit" stops, anything else is
/// echoed ("ping" answers "pong").
/// Async: "halt" stops, null is a no-op, other strings are pushed.
/// Connect is refused when the `reject` param is present.
pub(crate) struct RecordingHandler {
    calls: Arc<Mutex<Vec<String>>>,
    terminations: Arc<Mutex<Vec<TerminateReason>>>,
}

#[derive(Clone)]
pub(crate) struct Recorder {
    calls: Arc<Mutex<Vec<String>>>,
    terminations: Arc<Mutex<Vec<TerminateReason>>>,
}

impl Recorder {
    pub fn calls(&self) -> Vec<String> {
        self.calls.lock().unwrap().clone()
    }

    pub fn terminations(&self) -> Vec<TerminateReason> {
        self.terminations.lock().unwrap().clone()
    }
}

impl RecordingHandler {
    pub fn new() -> (Self, Recorder) {
        let calls = Arc::new(Mutex::new(Vec::new()));
        let terminations = Arc::new(Mutex::new(Vec::new()));
        let recorder = Recorder {
            calls: calls.clone(),
            terminations: terminations.clone(),
        };
        (Self { calls, terminations }, recorder)
    }

    fn record(&self, call: impl Into<String>) {
        self.calls.lock().unwrap().push(call.into());
    }
}

#[async_trait]
impl SessionHandler for RecordingHandler {
    fn name(&self) -> &str {
        "recording"
    }

    async fn connect(&mut self, info: &ConnectInfo) -> Result<(), Rejection> {
        self.record("connect");
        if info.params.contains_key("reject") {
            return Err(Rejection::new("rejected by test"));
        }
        Ok(())
    }

    async fn init(&mut self) {
        self.record("init");
    }

    async fn handle_inbound(&mut self, body: Frame) -> InboundOutcome {
        self.record(format!("inbound:{}", body.payload));
        match body.payload.as_str() {
            "ping" => InboundOutcome::ok(Frame::text("pong")),
            "deny" => InboundOutcome::Reply {
                status: "unauthorized".to_string(),
                payload: Frame::text("denied"),
            },
            "quiet" => InboundOutcome::Accepted,
            "slow" => {
                tokio::time::sleep(std::time::Duration::from_secs(2)).await;
                InboundOutcome::Accepted
            }
            "quit" => InboundOutcome::stop("quit requested"),
            _ => InboundOutcome::ok(body),
        }
    }

    async fn handle_async(&mut self, event: serde_json::Value) -> AsyncOutcome {
        self.record(format!("async:{}", event));
        match event {
            serde_json::Value::Null => AsyncOutcome::Noop,
            serde_json::Value::String(ref s) if s == "halt" => AsyncOutcome::Stop {
                reason: "halted".to_string(),
            },
            serde_json::Value::String(s) => AsyncOutcome::Push(Frame::text(s)),
            other => AsyncOutcome::Push(Frame::text(other.to_string())),
        }
    }

    async fn terminate(&mut self, reason: &TerminateReason) {
        self.record(format!("terminate:{}", reason.label()));
        self.terminations.lock().unwrap().push(reason.clone());
    }
}
