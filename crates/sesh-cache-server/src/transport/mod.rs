//! Transport layer for the demo host.

pub mod http;

pub use http::{router, spawn_cache_sweeper, sweep_interval, AppState, HttpTransport};
