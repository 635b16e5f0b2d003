//! sesh-cache demo server — an axum host for session-scoped query caching.

pub mod config;
pub mod pages;
pub mod session;
pub mod store;
pub mod transport;
pub mod types;

pub use config::{ConfigOverrides, ServerConfig};
pub use session::PageRequest;
pub use store::UserDirectory;
pub use transport::{router, spawn_cache_sweeper, sweep_interval, AppState, HttpTransport};
