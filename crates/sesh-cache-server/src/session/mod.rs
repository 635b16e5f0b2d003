//! Per-request session context.

pub mod request;

pub use request::PageRequest;
