use kameo::actor::ActorRef;
use kameo::mailbox;
use kameo::prelude::*;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use super::session::{
    Dispatch, Flush, GetSessionInfo, HandlerEvent, LongPollSession, SessionInfo, SessionSetup,
    Subscribe,
};
use crate::config::SessionConfig;
use crate::errors::{SessionError, SpawnError};
use crate::handler::{ConnectInfo, SessionHandler, TerminateReason};
use crate::messaging::{JsonSerializer, PubSub, ReplyRouter, ReplyTo, WireSerializer};
use crate::metrics::Metrics;
use crate::models::{CorrelationId, Frame, SessionId};

// ============================================================================
// Session Spawner
// ============================================================================
//
// Runs the handshake, subscribes the routing address and starts one
// unsupervised LongPollSession per client. Nothing is restarted: a session
// that dies is gone and the client has to establish a new one.
//
// ============================================================================

/// Construction parameters for one session.
pub struct SessionArgs {
    pub session_id: SessionId,
    pub handler: Box<dyn SessionHandler>,
    pub endpoint: String,
    pub transport: String,
    pub params: HashMap<String, String>,
    pub base_timeout: Duration,
    pub serializer: Arc<dyn WireSerializer>,
    /// Defaults to `SessionId::routing_address`.
    pub routing_address: Option<String>,
}

impl SessionArgs {
    pub fn new(handler: impl SessionHandler, config: &SessionConfig) -> Self {
        Self {
            session_id: SessionId::new(),
            handler: Box::new(handler),
            endpoint: config.endpoint.clone(),
            transport: config.transport.clone(),
            params: HashMap::new(),
            base_timeout: config.base_timeout,
            serializer: Arc::new(JsonSerializer),
            routing_address: None,
        }
    }

    pub fn with_params(mut self, params: HashMap<String, String>) -> Self {
        self.params = params;
        self
    }

    pub fn with_param(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.params.insert(key.into(), value.into());
        self
    }

    pub fn with_serializer(mut self, serializer: Arc<dyn WireSerializer>) -> Self {
        self.serializer = serializer;
        self
    }

    pub fn with_routing_address(mut self, address: impl Into<String>) -> Self {
        self.routing_address = Some(address.into());
        self
    }

    pub fn with_timeout(mut self, base_timeout: Duration) -> Self {
        self.base_timeout = base_timeout;
        self
    }
}

#[derive(Clone)]
pub struct SessionSpawner {
    pubsub: Arc<dyn PubSub>,
    metrics: Arc<Metrics>,
}

impl SessionSpawner {
    pub fn new(pubsub: Arc<dyn PubSub>, metrics: Arc<Metrics>) -> Self {
        Self { pubsub, metrics }
    }

    pub async fn spawn(&self, args: SessionArgs) -> Result<SessionHandle, SpawnError> {
        let SessionArgs {
            session_id,
            mut handler,
            endpoint,
            transport,
            params,
            base_timeout,
            serializer,
            routing_address,
        } = args;

        let info = ConnectInfo {
            session_id,
            endpoint: endpoint.clone(),
            transport,
            params,
        };

        if let Err(rejection) = handler.connect(&info).await {
            // Refusal is a normal outcome, not an error
            tracing::debug!(
                session_id = %session_id,
                handler = %handler.name(),
                reason = %rejection,
                "Session refused during handshake"
            );
            self.metrics.record_session_rejected();
            return Err(SpawnError::Rejected(rejection));
        }

        let routing_address = routing_address.unwrap_or_else(|| session_id.routing_address());

        let subscription = match self.pubsub.subscribe(&routing_address).await {
            Ok(subscription) => subscription,
            Err(source) => {
                tracing::error!(
                    session_id = %session_id,
                    routing_address = %routing_address,
                    error = %source,
                    "Failed to subscribe routing address"
                );
                handler
                    .terminate(&TerminateReason::SubscriptionLost(routing_address.clone()))
                    .await;
                return Err(SpawnError::Subscribe {
                    address: routing_address,
                    source,
                });
            }
        };

        let router = ReplyRouter::new(self.pubsub.clone(), serializer, subscription.id());

        self.metrics.record_session_started();

        let session = LongPollSession::new(SessionSetup {
            session_id,
            endpoint,
            handler,
            base_timeout,
            routing_address: routing_address.clone(),
            subscription,
            router,
            metrics: self.metrics.clone(),
        });

        // The session queues its own stop signal from inside a handler, so
        // the mailbox must never be full.
        let actor_ref = LongPollSession::spawn_with_mailbox(session, mailbox::unbounded());

        tracing::info!(
            session_id = %session_id,
            routing_address = %routing_address,
            "🟢 Session spawned"
        );

        Ok(SessionHandle {
            session_id,
            routing_address,
            actor_ref,
        })
    }
}

// ============================================================================
// Session Handle
// ============================================================================

/// Same-node access to a running session.
///
/// All sends are fire-and-forget: replies arrive at the `ReplyTo` passed
/// with the request. An error only means the session is no longer running.
#[derive(Clone)]
pub struct SessionHandle {
    session_id: SessionId,
    routing_address: String,
    actor_ref: ActorRef<LongPollSession>,
}

impl SessionHandle {
    pub fn session_id(&self) -> SessionId {
        self.session_id
    }

    pub fn routing_address(&self) -> &str {
        &self.routing_address
    }

    pub async fn dispatch(
        &self,
        from: ReplyTo,
        body: Frame,
        correlation_id: CorrelationId,
    ) -> Result<(), SessionError> {
        self.actor_ref
            .tell(Dispatch {
                from,
                body,
                correlation_id,
            })
            .send()
            .await
            .map_err(|_| SessionError::Gone)
    }

    pub async fn subscribe(
        &self,
        from: ReplyTo,
        correlation_id: CorrelationId,
    ) -> Result<(), SessionError> {
        self.actor_ref
            .tell(Subscribe {
                from,
                correlation_id,
            })
            .send()
            .await
            .map_err(|_| SessionError::Gone)
    }

    pub async fn flush(&self, from: ReplyTo, correlation_id: CorrelationId) -> Result<(), SessionError> {
        self.actor_ref
            .tell(Flush {
                from,
                correlation_id,
            })
            .send()
            .await
            .map_err(|_| SessionError::Gone)
    }

    /// Hand an event to the handler's async callback.
    pub async fn push_event(&self, event: serde_json::Value) -> Result<(), SessionError> {
        self.actor_ref
            .tell(HandlerEvent(event))
            .send()
            .await
            .map_err(|_| SessionError::Gone)
    }

    pub async fn info(&self) -> Result<SessionInfo, SessionError> {
        self.actor_ref
            .ask(GetSessionInfo)
            .await
            .map_err(|_| SessionError::Gone)
    }

    /// Stop after already-queued messages; terminate runs with `Shutdown`.
    pub async fn stop(&self) -> Result<(), SessionError> {
        self.actor_ref
            .stop_gracefully()
            .await
            .map_err(|_| SessionError::Gone)
    }

    pub fn is_alive(&self) -> bool {
        self.actor_ref.is_alive()
    }

    pub async fn wait_for_shutdown(&self) {
        self.actor_ref.wait_for_shutdown().await;
    }
}
