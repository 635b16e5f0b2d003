//! Data types used by the server.

pub mod error;
pub mod user;

pub use error::*;
pub use user::*;
