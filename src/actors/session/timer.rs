use kameo::actor::WeakActorRef;
use std::time::Duration;
use tokio::task::JoinHandle;

use super::actor::LongPollSession;
use super::messages::InactivityCheck;

/// One-shot inactivity check, re-armed by the session after every check.
///
/// Holds only a weak reference so a pending check never keeps a finished
/// session alive.
#[derive(Default)]
pub(crate) struct InactivityTimer {
    handle: Option<JoinHandle<()>>,
}

impl InactivityTimer {
    pub fn arm(&mut self, session: WeakActorRef<LongPollSession>, delay: Duration) {
        self.cancel();

        self.handle = Some(tokio::spawn(async move {
            tokio::time::sleep(delay).await;

            if let Some(session) = session.upgrade() {
                let _ = session.tell(InactivityCheck).send().await;
            }
        }));
    }

    pub fn cancel(&mut self) {
        if let Some(handle) = self.handle.take() {
            handle.abort();
        }
    }
}

impl Drop for InactivityTimer {
    fn drop(&mut self) {
        self.cancel();
    }
}
