pub mod actors;
pub mod config;
pub mod errors;
pub mod handler;
pub mod messaging;
pub mod metrics;
pub mod models;
pub mod utils;

pub use actors::{SessionArgs, SessionHandle, SessionSpawner};
pub use config::SessionConfig;
pub use handler::{EchoHandler, SessionHandler, TerminateReason};
