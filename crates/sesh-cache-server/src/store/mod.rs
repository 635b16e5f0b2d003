//! Backing data source for the demo pages.

pub mod users;

pub use users::{LookupError, UserDirectory};
