// ============================================================================
// Actors Module
// ============================================================================
//
// One kameo actor per long-poll session, plus the spawner that creates them.
//
// Structure:
// - session/   - LongPollSession actor, its messages, state and timer
// - spawner.rs - handshake + subscription + spawn, and the SessionHandle
//
// Sessions are unsupervised: nothing restarts a session that stops.
//
// ============================================================================

mod session;
mod spawner;

pub use session::{
    Dispatch, Flush, FlushOutcome, GetSessionInfo, HandlerEvent, Inactivity, LongPollSession,
    SessionInfo, SessionState, Subscribe,
};
pub use spawner::{SessionArgs, SessionHandle, SessionSpawner};
