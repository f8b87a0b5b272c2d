pub mod config;
pub mod handler;
pub mod metrics;
pub mod server;

pub use config::ServerConfig;
pub use handler::{ServerHandler, TrackedJob};
pub use metrics::ServerMetrics;
pub use server::BatchServer;
