//! Tool-server discovery daemon
//!
//! Runs the [`discovery::DiscoveryController`] in the background and
//! exposes it, together with the model server client, over a small HTTP
//! API for UI layers.
//!
//! # Components
//!
//! - **Config**: YAML configuration with validation
//! - **MetricsRegistry**: Prometheus metrics fed from controller events
//! - **http_server**: axum routes for services, discovery lifecycle,
//!   server-sent events, metrics and model passthrough
//! - **DiscoveryServer**: wires the above together and handles shutdown

pub mod config;
pub mod http_server;
pub mod metrics;
pub mod server;

pub use config::{Config, ConfigError, LogFormat};
pub use http_server::{ApiServer, AppState, router};
pub use metrics::MetricsRegistry;
pub use server::{DiscoveryServer, shutdown_signal};
