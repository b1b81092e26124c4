use std::sync::Arc;
use std::time::Duration;
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

use longpoll_session::actors::{SessionArgs, SessionSpawner};
use longpoll_session::config::SessionConfig;
use longpoll_session::handler::EchoHandler;
use longpoll_session::messaging::{
    JsonSerializer, LocalPubSub, PubSub, RedisPubSub, ReplyTo, WireSerializer,
};
use longpoll_session::metrics::{self, Metrics};
use longpoll_session::models::{ControlMessage, CorrelationId, Frame};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Initialize structured logging with environment-based filtering
    // Default to INFO level, can be overridden with RUST_LOG env var
    // Example: RUST_LOG=debug cargo run
    tracing_subscriber::registry()
        .with(fmt::layer().with_target(true).with_thread_ids(true))
        .with(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new("info,longpoll_session=debug")),
        )
        .init();

    tracing::info!("🚀 Starting long-poll session demo");

    let config = SessionConfig::load();
    tracing::info!(
        endpoint = %config.endpoint,
        base_timeout_ms = config.base_timeout.as_millis() as u64,
        window_ms = config.window().as_millis() as u64,
        "Loaded configuration"
    );

    // === 1. Initialize Prometheus metrics ===
    let metrics = Arc::new(Metrics::new()?);
    tracing::info!("📊 Metrics registry created with {} metrics", metrics.registry().gather().len());

    // Start metrics HTTP server in background thread
    let metrics_registry = Arc::new(metrics.registry().clone());
    let metrics_port = config.metrics_port;
    std::thread::spawn(move || {
        let rt = match tokio::runtime::Runtime::new() {
            Ok(rt) => rt,
            Err(e) => {
                tracing::error!("Failed to build metrics runtime: {}", e);
                return;
            }
        };
        rt.block_on(async {
            if let Err(e) = metrics::start_metrics_server(metrics_registry, metrics_port).await {
                tracing::error!("Metrics server error: {}", e);
            }
        });
    });

    // === 2. Pub/sub transport ===
    let redis = match &config.redis_url {
        Some(url) => {
            tracing::info!("Connecting to Redis pub/sub...");
            Some(Arc::new(RedisPubSub::connect(url).await?))
        }
        None => None,
    };
    let pubsub: Arc<dyn PubSub> = match &redis {
        Some(redis) => redis.clone() as Arc<dyn PubSub>,
        None => {
            tracing::info!("Using in-process pub/sub");
            Arc::new(LocalPubSub::new())
        }
    };

    // === 3. Spawn a session ===
    let spawner = SessionSpawner::new(pubsub.clone(), metrics.clone());
    let session = spawner
        .spawn(SessionArgs::new(EchoHandler::new(), &config))
        .await?;

    tracing::info!(session_id = %session.session_id(), "✅ Session ready");

    // === 4. Same-node round trip: dispatch, flush, parked poll ===
    let (me, mut replies) = ReplyTo::channel();

    session
        .dispatch(me.clone(), Frame::text("ping"), CorrelationId::random())
        .await?;
    if let Some(reply) = replies.recv().await {
        tracing::info!(?reply, "Dispatch acknowledged");
    }

    session.flush(me.clone(), CorrelationId::random()).await?;
    if let Some(reply) = replies.recv().await {
        tracing::info!(?reply, "Flushed");
    }

    // Empty buffer: this poll parks until the handler pushes something
    session.flush(me.clone(), CorrelationId::random()).await?;
    session
        .push_event(serde_json::json!("server-side news"))
        .await?;
    if let Some(reply) = replies.recv().await {
        tracing::info!(?reply, "Parked poll woken");
    }

    session.flush(me, CorrelationId::random()).await?;
    if let Some(reply) = replies.recv().await {
        tracing::info!(?reply, "Flushed after wake-up");
    }

    // === 5. Cross-node style: control messages over the routing topic ===
    let serializer = JsonSerializer;
    let client_topic = format!("longpoll:client:{}", uuid::Uuid::new_v4());
    let mut client = pubsub.subscribe(&client_topic).await?;

    let liveness = ControlMessage::Subscribe {
        from: client_topic.clone(),
        correlation_id: CorrelationId::random(),
    };
    pubsub
        .broadcast(session.routing_address(), serializer.encode_control(&liveness)?)
        .await?;

    match tokio::time::timeout(Duration::from_secs(5), client.recv()).await {
        Ok(Some(bytes)) => {
            let reply = serializer.decode_reply(&bytes)?;
            tracing::info!(?reply, "Reply over pub/sub");
        }
        Ok(None) => tracing::warn!("Client subscription closed"),
        Err(_) => tracing::warn!("No reply over pub/sub within 5s"),
    }

    if let Some(redis) = &redis {
        tracing::info!(circuit = ?redis.publisher_state().await, "Redis publisher");
    }

    let info = session.info().await?;
    tracing::info!(
        buffered = info.buffered,
        parked = info.parked,
        idle_ms = info.idle.as_millis() as u64,
        "Session snapshot"
    );

    // === 6. Stop polling and let the inactivity window expire ===
    let grace = config.window() + Duration::from_secs(1);
    tracing::info!("⏳ Waiting up to {:?} for the session to expire...", grace);

    if tokio::time::timeout(grace, session.wait_for_shutdown()).await.is_err() {
        tracing::warn!("Session still alive, stopping it");
        session.stop().await?;
        session.wait_for_shutdown().await;
    }

    tracing::info!("👋 Demo finished");
    Ok(())
}
