use std::time::Duration;
use tokio::time::Instant;

use crate::config::inactivity_window;
use crate::messaging::ReplyTo;
use crate::models::{CorrelationId, Frame, SessionReply};

// ============================================================================
// Session State
// ============================================================================
//
// The buffer / parked-poll / inactivity bookkeeping of one session, kept free
// of actor plumbing. Every method returns the reply (if any) the caller must
// deliver; nothing here does I/O.
//
// Invariants:
// - the buffer is drained completely whenever it is delivered
// - at most one poll is parked
// - every poll gets exactly one response: messages, a data-available wake,
//   or an empty result when a newer poll supersedes it
//
// ============================================================================

/// A flush held open until data arrives.
#[derive(Debug)]
pub struct ParkedPoll {
    pub from: ReplyTo,
    pub correlation_id: CorrelationId,
}

/// A reply addressed to a recipient.
pub type Outgoing = (ReplyTo, SessionReply);

#[derive(Debug)]
pub enum FlushOutcome {
    Delivered { reply: Outgoing, frames: usize },
    Parked { superseded: Option<Outgoing> },
}

#[derive(Debug, PartialEq, Eq)]
pub enum Inactivity {
    Expired { idle: Duration },
    Remaining(Duration),
}

#[derive(Debug)]
pub struct SessionState {
    buffer: Vec<Frame>,
    window: Duration,
    last_client_poll: Instant,
    parked_poll: Option<ParkedPoll>,
}

impl SessionState {
    pub fn new(base_timeout: Duration, now: Instant) -> Self {
        Self {
            buffer: Vec::new(),
            window: inactivity_window(base_timeout),
            last_client_poll: now,
            parked_poll: None,
        }
    }

    pub fn window(&self) -> Duration {
        self.window
    }

    pub fn buffered(&self) -> usize {
        self.buffer.len()
    }

    pub fn is_parked(&self) -> bool {
        self.parked_poll.is_some()
    }

    pub fn idle(&self, now: Instant) -> Duration {
        now.saturating_duration_since(self.last_client_poll)
    }

    /// Handle a poll. Delivers the whole buffer if there is anything to
    /// deliver, otherwise parks the poll.
    pub fn flush(&mut self, from: ReplyTo, correlation_id: CorrelationId, now: Instant) -> FlushOutcome {
        self.last_client_poll = now;

        if !self.buffer.is_empty() {
            // A parked poll cannot coexist with a non-empty buffer: pushing
            // wakes and clears it.
            self.parked_poll = None;
            let messages = std::mem::take(&mut self.buffer);
            let frames = messages.len();
            return FlushOutcome::Delivered {
                reply: (from, SessionReply::Messages { messages, correlation_id }),
                frames,
            };
        }

        let superseded = self.parked_poll.replace(ParkedPoll { from, correlation_id }).map(|old| {
            let reply = SessionReply::Messages {
                messages: Vec::new(),
                correlation_id: old.correlation_id,
            };
            (old.from, reply)
        });

        FlushOutcome::Parked { superseded }
    }

    /// Buffer a frame. Returns the wake-up for a parked poll, if any.
    pub fn push(&mut self, frame: Frame) -> Option<Outgoing> {
        self.buffer.push(frame);

        self.parked_poll.take().map(|parked| {
            let reply = SessionReply::DataAvailable {
                correlation_id: parked.correlation_id,
            };
            (parked.from, reply)
        })
    }

    pub fn check_inactivity(&self, now: Instant) -> Inactivity {
        let idle = self.idle(now);
        if idle >= self.window {
            Inactivity::Expired { idle }
        } else {
            Inactivity::Remaining(self.window - idle)
        }
    }
}
