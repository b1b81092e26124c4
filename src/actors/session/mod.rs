mod actor;
mod messages;
mod state;
mod timer;

pub use actor::LongPollSession;
pub(crate) use actor::SessionSetup;
pub use messages::{Dispatch, Flush, GetSessionInfo, HandlerEvent, SessionInfo, Subscribe};
pub use state::{FlushOutcome, Inactivity, SessionState};
