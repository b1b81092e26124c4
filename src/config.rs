use clap::Parser;
use std::time::Duration;

// ============================================================================
// Session Configuration
// ============================================================================
//
// Defaults suit a local demo. Every field can be set by flag or from the
// environment:
//
//   --timeout-ms     LONGPOLL_TIMEOUT_MS   base inactivity timeout (window = 1.5x)
//   --endpoint       LONGPOLL_ENDPOINT     endpoint identity passed to handlers
//   --redis-url      REDIS_URL             use Redis pub/sub instead of the local bus
//   --metrics-port   METRICS_PORT          port for /metrics and /health
//
// ============================================================================

pub const DEFAULT_TIMEOUT_MS: u64 = 10_000;
pub const DEFAULT_METRICS_PORT: u16 = 9090;

#[derive(Clone, Debug, Parser)]
#[command(name = "longpoll_session", about = "Long-poll session actor demo")]
pub struct SessionConfig {
    /// Base inactivity timeout in milliseconds, supplied by the endpoint
    #[arg(
        long = "timeout-ms",
        env = "LONGPOLL_TIMEOUT_MS",
        default_value = "10000",
        value_parser = parse_millis
    )]
    pub base_timeout: Duration,

    #[arg(long, env = "LONGPOLL_ENDPOINT", default_value = "longpoll")]
    pub endpoint: String,

    #[arg(long, default_value = "longpoll")]
    pub transport: String,

    /// Redis URL; the in-process bus is used when unset
    #[arg(long, env = "REDIS_URL")]
    pub redis_url: Option<String>,

    #[arg(long, env = "METRICS_PORT", default_value_t = DEFAULT_METRICS_PORT)]
    pub metrics_port: u16,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            base_timeout: Duration::from_millis(DEFAULT_TIMEOUT_MS),
            endpoint: "longpoll".to_string(),
            transport: "longpoll".to_string(),
            redis_url: None,
            metrics_port: DEFAULT_METRICS_PORT,
        }
    }
}

impl SessionConfig {
    /// Parse flags and environment. Exits with usage on invalid values.
    pub fn load() -> Self {
        Self::parse().normalized()
    }

    fn normalized(mut self) -> Self {
        self.redis_url = self.redis_url.filter(|url| !url.trim().is_empty());
        self
    }

    /// Effective inactivity window: 1.5x the base timeout, leaving slack
    /// for client scheduling jitter.
    pub fn window(&self) -> Duration {
        inactivity_window(self.base_timeout)
    }
}

pub fn inactivity_window(base_timeout: Duration) -> Duration {
    base_timeout * 3 / 2
}

fn parse_millis(raw: &str) -> Result<Duration, String> {
    match raw.trim().parse::<u64>() {
        Ok(0) => Err("timeout must be greater than zero".to_string()),
        Ok(ms) => Ok(Duration::from_millis(ms)),
        Err(e) => Err(format!("invalid milliseconds `{}`: {}", raw, e)),
    }
}
