use kameo::actor::{ActorRef, WeakActorRef};
use kameo::error::{ActorStopReason, Infallible};
use kameo::message::{Context, Message};
use kameo::Actor;
use std::sync::Arc;
use std::time::Duration;
use tokio::task::JoinHandle;
use tokio::time::Instant;

use super::messages::{
    Dispatch, Flush, GetSessionInfo, HandlerEvent, InactivityCheck, SessionInfo, Subscribe,
    SubscriptionLost,
};
use super::state::{FlushOutcome, Inactivity, SessionState};
use super::timer::InactivityTimer;
use crate::handler::{AsyncOutcome, InboundOutcome, SessionHandler, TerminateReason};
use crate::messaging::{ReplyRouter, ReplyTo, Subscription, WireSerializer};
use crate::metrics::{FlushOutcomeLabel, Metrics};
use crate::models::{AckStatus, ControlMessage, CorrelationId, Frame, SessionId, SessionReply};

// ============================================================================
// Long-Poll Session Actor
// ============================================================================
//
// One actor per client session. Emulates a persistent connection over
// request/response polling:
//
// - Dispatch  -> handler inbound callback, exactly one ack to the caller
// - Subscribe -> liveness ack
// - Flush     -> deliver the buffer, or park the poll until data arrives
// - HandlerEvent -> handler async callback (push / noop / stop)
// - InactivityCheck -> stop when no flush arrived within the window
//
// The routing subscription is drained by a forwarder task that decodes
// control envelopes into actor messages. When the subscription ends the
// session stops. Whatever ends the session, the handler's terminate hook
// runs exactly once, from on_stop.
//
// ============================================================================

/// Everything a session needs once the handshake has succeeded.
pub(crate) struct SessionSetup {
    pub session_id: SessionId,
    pub endpoint: String,
    pub handler: Box<dyn SessionHandler>,
    pub base_timeout: Duration,
    pub routing_address: String,
    pub subscription: Subscription,
    pub router: ReplyRouter,
    pub metrics: Arc<Metrics>,
}

pub struct LongPollSession {
    session_id: SessionId,
    endpoint: String,
    handler: Box<dyn SessionHandler>,
    state: SessionState,
    routing_address: String,
    router: ReplyRouter,
    subscription: Option<Subscription>,
    forwarder: Option<JoinHandle<()>>,
    timer: InactivityTimer,
    self_ref: Option<WeakActorRef<Self>>,
    /// Set by whichever path decided to end the session.
    stop_reason: Option<TerminateReason>,
    metrics: Arc<Metrics>,
}

impl LongPollSession {
    pub(crate) fn new(setup: SessionSetup) -> Self {
        Self {
            session_id: setup.session_id,
            endpoint: setup.endpoint,
            handler: setup.handler,
            state: SessionState::new(setup.base_timeout, Instant::now()),
            routing_address: setup.routing_address,
            router: setup.router,
            subscription: Some(setup.subscription),
            forwarder: None,
            timer: InactivityTimer::default(),
            self_ref: None,
            stop_reason: None,
            metrics: setup.metrics,
        }
    }

    /// Record why the session ends and queue a stop behind whatever is
    /// already in the mailbox. The first reason wins.
    ///
    /// Messages queued ahead of the stop are still handled: a dispatch gets
    /// an `error` ack, events and timer checks are ignored.
    async fn stop_with(&mut self, reason: TerminateReason) {
        if self.stop_reason.is_some() {
            return;
        }
        self.stop_reason = Some(reason);
        self.timer.cancel();

        if let Some(session) = self.self_ref.as_ref().and_then(|weak| weak.upgrade()) {
            // Unbounded mailbox: enqueueing from inside a handler cannot block
            let _ = session.stop_gracefully().await;
        }
    }

    fn stopping(&self) -> bool {
        self.stop_reason.is_some()
    }

    async fn acknowledge(
        router: &ReplyRouter,
        metrics: &Metrics,
        to: &ReplyTo,
        status: AckStatus,
        correlation_id: CorrelationId,
    ) {
        metrics.record_dispatch(status);
        router
            .deliver(to, SessionReply::Ack { status, correlation_id })
            .await;
    }

    /// Buffer a frame and wake the parked poll, if there is one.
    async fn publish(&mut self, frame: Frame) {
        if let Some((to, wake)) = self.state.push(frame) {
            tracing::debug!(
                session_id = %self.session_id,
                correlation_id = %wake.correlation_id(),
                "Waking parked poll"
            );
            self.router.deliver(&to, wake).await;
        }
    }
}

/// Drains the routing subscription into the session's mailbox.
fn spawn_forwarder(
    mut subscription: Subscription,
    serializer: Arc<dyn WireSerializer>,
    session: ActorRef<LongPollSession>,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        while let Some(bytes) = subscription.recv().await {
            let control = match serializer.decode_control(&bytes) {
                Ok(control) => control,
                Err(e) => {
                    tracing::warn!(
                        topic = %subscription.topic(),
                        error = %e,
                        "Dropping undecodable control message"
                    );
                    continue;
                }
            };

            let delivered = match control {
                ControlMessage::Dispatch {
                    from,
                    body,
                    correlation_id,
                } => session
                    .tell(Dispatch {
                        from: ReplyTo::Topic(from),
                        body,
                        correlation_id,
                    })
                    .send()
                    .await
                    .is_ok(),
                ControlMessage::Subscribe {
                    from,
                    correlation_id,
                } => session
                    .tell(Subscribe {
                        from: ReplyTo::Topic(from),
                        correlation_id,
                    })
                    .send()
                    .await
                    .is_ok(),
                ControlMessage::Flush {
                    from,
                    correlation_id,
                } => session
                    .tell(Flush {
                        from: ReplyTo::Topic(from),
                        correlation_id,
                    })
                    .send()
                    .await
                    .is_ok(),
                ControlMessage::Event { payload } => {
                    session.tell(HandlerEvent(payload)).send().await.is_ok()
                }
            };

            if !delivered {
                // Session already gone
                return;
            }
        }

        let _ = session
            .tell(SubscriptionLost {
                topic: subscription.topic().to_string(),
            })
            .send()
            .await;
    })
}

impl Actor for LongPollSession {
    type Args = Self;
    type Error = Infallible;

    async fn on_start(mut state: Self::Args, actor_ref: ActorRef<Self>) -> Result<Self, Self::Error> {
        state.handler.init().await;

        if let Some(subscription) = state.subscription.take() {
            let serializer = state.router.serializer().clone();
            state.forwarder = Some(spawn_forwarder(subscription, serializer, actor_ref.clone()));
        }

        let weak = actor_ref.downgrade();
        state.timer.arm(weak.clone(), state.state.window());
        state.self_ref = Some(weak);

        tracing::info!(
            session_id = %state.session_id,
            endpoint = %state.endpoint,
            handler = %state.handler.name(),
            routing_address = %state.routing_address,
            serializer = state.router.serializer().name(),
            window_ms = state.state.window().as_millis() as u64,
            "LongPollSession started"
        );

        Ok(state)
    }

    async fn on_stop(
        &mut self,
        _actor_ref: WeakActorRef<Self>,
        reason: ActorStopReason,
    ) -> Result<(), Self::Error> {
        self.timer.cancel();
        if let Some(forwarder) = self.forwarder.take() {
            forwarder.abort();
        }

        let reason = self.stop_reason.take().unwrap_or_else(|| match reason {
            ActorStopReason::Normal => TerminateReason::Shutdown,
            other => TerminateReason::Crashed(format!("{:?}", other)),
        });

        tracing::info!(
            session_id = %self.session_id,
            reason = %reason,
            buffered = self.state.buffered(),
            "🔴 LongPollSession terminated"
        );

        self.handler.terminate(&reason).await;
        self.metrics.record_session_terminated(&reason);

        Ok(())
    }
}

// ============================================================================
// Message Handlers
// ============================================================================

impl Message<Dispatch> for LongPollSession {
    type Reply = ();

    async fn handle(&mut self, msg: Dispatch, _ctx: &mut Context<Self, Self::Reply>) -> Self::Reply {
        if self.stopping() {
            Self::acknowledge(&self.router, &self.metrics, &msg.from, AckStatus::Error, msg.correlation_id)
                .await;
            return;
        }

        match self.handler.handle_inbound(msg.body).await {
            InboundOutcome::Reply { status, payload } => {
                let status = AckStatus::normalize(&status);
                Self::acknowledge(&self.router, &self.metrics, &msg.from, status, msg.correlation_id)
                    .await;
                self.publish(payload).await;
            }
            InboundOutcome::Accepted => {
                Self::acknowledge(&self.router, &self.metrics, &msg.from, AckStatus::Ok, msg.correlation_id)
                    .await;
            }
            InboundOutcome::Stop { reason } => {
                Self::acknowledge(&self.router, &self.metrics, &msg.from, AckStatus::Error, msg.correlation_id)
                    .await;

                tracing::info!(
                    session_id = %self.session_id,
                    reason = %reason,
                    "Handler requested stop during dispatch"
                );
                self.stop_with(TerminateReason::Handler(reason)).await;
            }
        }
    }
}

impl Message<Subscribe> for LongPollSession {
    type Reply = ();

    async fn handle(&mut self, msg: Subscribe, _ctx: &mut Context<Self, Self::Reply>) -> Self::Reply {
        self.router
            .deliver(
                &msg.from,
                SessionReply::SubscribeAck {
                    correlation_id: msg.correlation_id,
                },
            )
            .await;
    }
}

impl Message<Flush> for LongPollSession {
    type Reply = ();

    async fn handle(&mut self, msg: Flush, _ctx: &mut Context<Self, Self::Reply>) -> Self::Reply {
        match self.state.flush(msg.from, msg.correlation_id, Instant::now()) {
            FlushOutcome::Delivered { reply: (to, reply), frames } => {
                tracing::debug!(
                    session_id = %self.session_id,
                    correlation_id = %reply.correlation_id(),
                    frames = frames,
                    "Flushing buffered frames"
                );
                self.metrics.record_flush(FlushOutcomeLabel::Delivered, frames);
                self.router.deliver(&to, reply).await;
            }
            FlushOutcome::Parked { superseded } => {
                self.metrics.record_flush(FlushOutcomeLabel::Parked, 0);

                if let Some((to, reply)) = superseded {
                    tracing::debug!(
                        session_id = %self.session_id,
                        correlation_id = %reply.correlation_id(),
                        "Superseded parked poll answered empty"
                    );
                    self.metrics.record_flush(FlushOutcomeLabel::Superseded, 0);
                    self.router.deliver(&to, reply).await;
                }
            }
        }
    }
}

impl Message<HandlerEvent> for LongPollSession {
    type Reply = ();

    async fn handle(&mut self, msg: HandlerEvent, _ctx: &mut Context<Self, Self::Reply>) -> Self::Reply {
        if self.stopping() {
            return;
        }

        match self.handler.handle_async(msg.0).await {
            AsyncOutcome::Push(frame) => self.publish(frame).await,
            AsyncOutcome::Noop => {}
            AsyncOutcome::Stop { reason } => {
                tracing::info!(
                    session_id = %self.session_id,
                    reason = %reason,
                    "Handler requested stop"
                );
                self.stop_with(TerminateReason::Handler(reason)).await;
            }
        }
    }
}

impl Message<InactivityCheck> for LongPollSession {
    type Reply = ();

    async fn handle(&mut self, _msg: InactivityCheck, _ctx: &mut Context<Self, Self::Reply>) -> Self::Reply {
        if self.stopping() {
            return;
        }

        match self.state.check_inactivity(Instant::now()) {
            Inactivity::Expired { idle } => {
                tracing::info!(
                    session_id = %self.session_id,
                    idle_ms = idle.as_millis() as u64,
                    window_ms = self.state.window().as_millis() as u64,
                    "⏱️ No poll within inactivity window"
                );
                self.stop_with(TerminateReason::Inactive).await;
            }
            Inactivity::Remaining(delay) => {
                if let Some(session) = self.self_ref.clone() {
                    self.timer.arm(session, delay);
                }
            }
        }
    }
}

impl Message<SubscriptionLost> for LongPollSession {
    type Reply = ();

    async fn handle(&mut self, msg: SubscriptionLost, _ctx: &mut Context<Self, Self::Reply>) -> Self::Reply {
        tracing::warn!(
            session_id = %self.session_id,
            topic = %msg.topic,
            "Routing subscription lost"
        );
        self.stop_with(TerminateReason::SubscriptionLost(msg.topic)).await;
    }
}

impl Message<GetSessionInfo> for LongPollSession {
    type Reply = SessionInfo;

    async fn handle(&mut self, _msg: GetSessionInfo, _ctx: &mut Context<Self, Self::Reply>) -> Self::Reply {
        SessionInfo {
            session_id: self.session_id,
            routing_address: self.routing_address.clone(),
            handler: self.handler.name().to_string(),
            serializer: self.router.serializer().name(),
            buffered: self.state.buffered(),
            parked: self.state.is_parked(),
            window: self.state.window(),
            idle: self.state.idle(Instant::now()),
        }
    }
}

#[cfg(test)]
mod tests {
    use std::collections::HashMap;
    use tokio::sync::mpsc::UnboundedReceiver;

    use super::*;
    use crate::actors::{SessionArgs, SessionHandle, SessionSpawner};
    use crate::config::SessionConfig;
    use crate::errors::SpawnError;
    use crate::handler::testing::{Recorder, RecordingHandler};
    use crate::messaging::{JsonSerializer, LocalPubSub, PubSub};

    struct Harness {
        bus: Arc<LocalPubSub>,
        metrics: Arc<Metrics>,
        spawner: SessionSpawner,
    }

    impl Harness {
        fn new() -> Self {
            let bus = Arc::new(LocalPubSub::new());
            let metrics = Arc::new(Metrics::new().unwrap());
            let spawner = SessionSpawner::new(bus.clone(), metrics.clone());
            Self { bus, metrics, spawner }
        }

        async fn start(&self, base_timeout: Duration) -> (SessionHandle, Recorder) {
            let (handler, recorder) = RecordingHandler::new();
            let args = SessionArgs::new(handler, &SessionConfig::default()).with_timeout(base_timeout);
            let handle = self.spawner.spawn(args).await.unwrap();
            (handle, recorder)
        }
    }

    async fn next(rx: &mut UnboundedReceiver<SessionReply>) -> SessionReply {
        tokio::time::timeout(Duration::from_secs(2), rx.recv())
            .await
            .expect("timed out waiting for reply")
            .expect("reply channel closed")
    }

    fn cid(id: &str) -> CorrelationId {
        CorrelationId::from(id)
    }

    fn ack(status: AckStatus, id: &str) -> SessionReply {
        SessionReply::Ack {
            status,
            correlation_id: cid(id),
        }
    }

    async fn shut_down(handle: &SessionHandle) {
        tokio::time::timeout(Duration::from_secs(2), handle.wait_for_shutdown())
            .await
            .expect("session did not stop");
    }

    #[tokio::test]
    async fn test_one_ack_per_dispatch() {
        let harness = Harness::new();
        let (session, recorder) = harness.start(Duration::from_secs(10)).await;
        let (me, mut rx) = ReplyTo::channel();

        session.dispatch(me.clone(), Frame::text("ping"), cid("d1")).await.unwrap();
        session.dispatch(me.clone(), Frame::text("quiet"), cid("d2")).await.unwrap();
        session.dispatch(me.clone(), Frame::text("deny"), cid("d3")).await.unwrap();

        assert_eq!(next(&mut rx).await, ack(AckStatus::Ok, "d1"));
        assert_eq!(next(&mut rx).await, ack(AckStatus::Ok, "d2"));
        // Any status other than ok collapses to error
        assert_eq!(next(&mut rx).await, ack(AckStatus::Error, "d3"));

        session.flush(me, cid("f1")).await.unwrap();
        assert_eq!(
            next(&mut rx).await,
            SessionReply::Messages {
                messages: vec![Frame::text("pong"), Frame::text("denied")],
                correlation_id: cid("f1"),
            }
        );

        assert_eq!(
            recorder.calls(),
            vec!["connect", "init", "inbound:ping", "inbound:quiet", "inbound:deny"]
        );
        assert_eq!(harness.metrics.dispatch_total.with_label_values(&["error"]).get(), 1);
    }

    #[tokio::test]
    async fn test_pong_flush_then_park() {
        let harness = Harness::new();
        let (session, _recorder) = harness.start(Duration::from_secs(10)).await;
        let (me, mut rx) = ReplyTo::channel();

        session.dispatch(me.clone(), Frame::text("ping"), cid("d1")).await.unwrap();
        assert_eq!(next(&mut rx).await, ack(AckStatus::Ok, "d1"));

        session.flush(me.clone(), cid("f1")).await.unwrap();
        assert_eq!(
            next(&mut rx).await,
            SessionReply::Messages {
                messages: vec![Frame::text("pong")],
                correlation_id: cid("f1"),
            }
        );

        session.flush(me, cid("f2")).await.unwrap();
        let info = session.info().await.unwrap();
        assert_eq!(info.buffered, 0);
        assert!(info.parked);
        assert!(rx.try_recv().is_err());
    }

    #[tokio::test]
    async fn test_parked_poll_woken_by_push() {
        let harness = Harness::new();
        let (session, _recorder) = harness.start(Duration::from_secs(10)).await;
        let (me, mut rx) = ReplyTo::channel();

        session.flush(me.clone(), cid("p1")).await.unwrap();
        session.push_event(serde_json::json!("news")).await.unwrap();

        assert_eq!(
            next(&mut rx).await,
            SessionReply::DataAvailable {
                correlation_id: cid("p1")
            }
        );

        session.flush(me, cid("p2")).await.unwrap();
        assert_eq!(
            next(&mut rx).await,
            SessionReply::Messages {
                messages: vec![Frame::text("news")],
                correlation_id: cid("p2"),
            }
        );
        assert!(!session.info().await.unwrap().parked);
    }

    #[tokio::test]
    async fn test_superseded_poll_gets_empty_result() {
        let harness = Harness::new();
        let (session, _recorder) = harness.start(Duration::from_secs(10)).await;
        let (first, mut first_rx) = ReplyTo::channel();
        let (second, mut second_rx) = ReplyTo::channel();

        session.flush(first, cid("old")).await.unwrap();
        session.flush(second, cid("new")).await.unwrap();

        assert_eq!(
            next(&mut first_rx).await,
            SessionReply::Messages {
                messages: vec![],
                correlation_id: cid("old"),
            }
        );

        session.push_event(serde_json::json!("x")).await.unwrap();
        assert_eq!(
            next(&mut second_rx).await,
            SessionReply::DataAvailable {
                correlation_id: cid("new")
            }
        );
        assert!(first_rx.try_recv().is_err());
        assert_eq!(
            harness.metrics.flush_total.with_label_values(&["superseded"]).get(),
            1
        );
    }

    #[tokio::test]
    async fn test_dispatch_stop_acks_before_terminating() {
        let harness = Harness::new();
        let (session, recorder) = harness.start(Duration::from_secs(10)).await;
        let (me, mut rx) = ReplyTo::channel();

        session.dispatch(me.clone(), Frame::text("quit"), cid("q1")).await.unwrap();
        assert_eq!(next(&mut rx).await, ack(AckStatus::Error, "q1"));

        shut_down(&session).await;
        assert!(!session.is_alive());
        assert_eq!(
            recorder.terminations(),
            vec![TerminateReason::Handler("quit requested".to_string())]
        );
        assert_eq!(recorder.calls().last().map(String::as_str), Some("terminate:handler"));

        assert!(session.dispatch(me, Frame::text("ping"), cid("q2")).await.is_err());
    }

    #[tokio::test]
    async fn test_dispatch_queued_behind_handler_stop_is_acked() {
        let harness = Harness::new();
        let (session, recorder) = harness.start(Duration::from_secs(10)).await;
        let (me, mut rx) = ReplyTo::channel();

        session.dispatch(me.clone(), Frame::text("quit"), cid("q1")).await.unwrap();
        session.dispatch(me.clone(), Frame::text("ping"), cid("q2")).await.unwrap();

        assert_eq!(next(&mut rx).await, ack(AckStatus::Error, "q1"));
        assert_eq!(next(&mut rx).await, ack(AckStatus::Error, "q2"));

        shut_down(&session).await;
        assert!(rx.try_recv().is_err());
        assert!(!recorder.calls().contains(&"inbound:ping".to_string()));
        assert_eq!(
            recorder.terminations(),
            vec![TerminateReason::Handler("quit requested".to_string())]
        );
    }

    #[tokio::test(start_paused = true)]
    async fn test_dispatch_queued_behind_inactivity_expiry_is_acked() {
        let harness = Harness::new();
        let (session, recorder) = harness.start(Duration::from_millis(1000)).await;
        let (me, mut rx) = ReplyTo::channel();

        // Keeps the actor busy until t=2000; the 1500ms check queues behind it
        session.dispatch(me.clone(), Frame::text("slow"), cid("s1")).await.unwrap();
        tokio::time::sleep(Duration::from_millis(1600)).await;
        session.dispatch(me.clone(), Frame::text("ping"), cid("s2")).await.unwrap();

        assert_eq!(next(&mut rx).await, ack(AckStatus::Ok, "s1"));
        assert_eq!(next(&mut rx).await, ack(AckStatus::Error, "s2"));

        shut_down(&session).await;
        assert!(rx.try_recv().is_err());
        assert!(!recorder.calls().contains(&"inbound:ping".to_string()));
        assert_eq!(recorder.terminations(), vec![TerminateReason::Inactive]);
    }

    #[tokio::test]
    async fn test_async_stop_ends_session_silently() {
        let harness = Harness::new();
        let (session, recorder) = harness.start(Duration::from_secs(10)).await;
        let (me, mut rx) = ReplyTo::channel();

        session.flush(me, cid("p1")).await.unwrap();
        session.push_event(serde_json::json!("halt")).await.unwrap();

        shut_down(&session).await;
        assert_eq!(
            recorder.terminations(),
            vec![TerminateReason::Handler("halted".to_string())]
        );
        // The parked poll is abandoned, never answered
        assert!(rx.try_recv().is_err());
    }

    #[tokio::test]
    async fn test_noop_event_leaves_buffer_alone() {
        let harness = Harness::new();
        let (session, recorder) = harness.start(Duration::from_secs(10)).await;

        session.push_event(serde_json::Value::Null).await.unwrap();
        let info = session.info().await.unwrap();

        assert_eq!(info.buffered, 0);
        assert_eq!(info.handler, "recording");
        assert_eq!(info.serializer, "json");
        assert_eq!(info.window, Duration::from_millis(15_000));
        assert_eq!(recorder.calls().last().map(String::as_str), Some("async:null"));
    }

    #[tokio::test(start_paused = true)]
    async fn test_inactivity_window_is_one_and_a_half_times_base() {
        let harness = Harness::new();
        let (session, recorder) = harness.start(Duration::from_millis(1000)).await;
        let (me, _rx) = ReplyTo::channel();

        session.flush(me, cid("p1")).await.unwrap();

        tokio::time::sleep(Duration::from_millis(1400)).await;
        assert!(session.is_alive());

        tokio::time::timeout(Duration::from_millis(200), session.wait_for_shutdown())
            .await
            .expect("session should be gone by 1600ms");

        assert_eq!(recorder.terminations(), vec![TerminateReason::Inactive]);
        assert_eq!(
            harness.metrics.sessions_terminated.with_label_values(&["inactive"]).get(),
            1
        );
    }

    #[tokio::test(start_paused = true)]
    async fn test_flush_extends_inactivity_window() {
        let harness = Harness::new();
        let (session, recorder) = harness.start(Duration::from_millis(1000)).await;
        let (me, _rx) = ReplyTo::channel();

        tokio::time::sleep(Duration::from_millis(1000)).await;
        session.flush(me, cid("p1")).await.unwrap();

        tokio::time::sleep(Duration::from_millis(1400)).await;
        assert!(session.is_alive());

        tokio::time::timeout(Duration::from_millis(200), session.wait_for_shutdown())
            .await
            .expect("session should be gone 1500ms after the last flush");
        assert_eq!(recorder.terminations(), vec![TerminateReason::Inactive]);
    }

    #[tokio::test]
    async fn test_rejected_handshake_creates_nothing() {
        let harness = Harness::new();
        let (handler, recorder) = RecordingHandler::new();
        let args = SessionArgs::new(handler, &SessionConfig::default())
            .with_params(HashMap::from([("reject".to_string(), "yes".to_string())]))
            .with_routing_address("longpoll:test:rejected");

        let result = harness.spawner.spawn(args).await;

        assert!(matches!(result, Err(SpawnError::Rejected(_))));
        assert_eq!(harness.bus.subscriber_count("longpoll:test:rejected").await, 0);
        assert_eq!(recorder.calls(), vec!["connect"]);
        assert_eq!(harness.metrics.sessions_rejected.get(), 1);
        assert_eq!(harness.metrics.sessions_active.get(), 0);
    }

    #[tokio::test]
    async fn test_subscription_loss_terminates_session() {
        let harness = Harness::new();
        let (session, recorder) = harness.start(Duration::from_secs(10)).await;
        assert_eq!(harness.bus.subscriber_count(session.routing_address()).await, 1);

        harness.bus.close_topic(session.routing_address()).await;

        shut_down(&session).await;
        assert_eq!(
            recorder.terminations(),
            vec![TerminateReason::SubscriptionLost(session.routing_address().to_string())]
        );
    }

    #[tokio::test]
    async fn test_control_messages_over_topics() {
        let harness = Harness::new();
        let (session, _recorder) = harness.start(Duration::from_secs(10)).await;
        let serializer = JsonSerializer;
        let mut client = harness.bus.subscribe("client:1").await.unwrap();

        let send = |message: ControlMessage| {
            let bus = harness.bus.clone();
            let address = session.routing_address().to_string();
            async move {
                let bytes = serializer.encode_control(&message).unwrap();
                bus.broadcast(&address, bytes).await.unwrap();
            }
        };

        // Garbage on the routing address is dropped, not fatal
        harness
            .bus
            .broadcast(session.routing_address(), b"not json".to_vec())
            .await
            .unwrap();

        send(ControlMessage::Subscribe {
            from: "client:1".to_string(),
            correlation_id: cid("s1"),
        })
        .await;
        send(ControlMessage::Dispatch {
            from: "client:1".to_string(),
            body: Frame::text("ping"),
            correlation_id: cid("d1"),
        })
        .await;
        send(ControlMessage::Flush {
            from: "client:1".to_string(),
            correlation_id: cid("f1"),
        })
        .await;

        let mut replies = Vec::new();
        for _ in 0..3 {
            let bytes = tokio::time::timeout(Duration::from_secs(2), client.recv())
                .await
                .unwrap()
                .unwrap();
            replies.push(serializer.decode_reply(&bytes).unwrap());
        }

        assert_eq!(
            replies,
            vec![
                SessionReply::SubscribeAck {
                    correlation_id: cid("s1")
                },
                ack(AckStatus::Ok, "d1"),
                SessionReply::Messages {
                    messages: vec![Frame::text("pong")],
                    correlation_id: cid("f1"),
                },
            ]
        );
        assert!(session.is_alive());
    }

    #[tokio::test]
    async fn test_external_stop_reports_shutdown() {
        let harness = Harness::new();
        let (session, recorder) = harness.start(Duration::from_secs(10)).await;
        assert_eq!(harness.metrics.sessions_active.get(), 1);

        session.stop().await.unwrap();
        shut_down(&session).await;

        assert_eq!(recorder.terminations(), vec![TerminateReason::Shutdown]);
        assert_eq!(harness.metrics.sessions_active.get(), 0);
        assert!(session.info().await.is_err());
    }
}
