//! Shared data types and the library error type.

use serde::{Deserialize, Serialize};

/// Visibility state of the page hosting a session issuer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Visibility {
    Visible,
    Hidden,
}

impl Visibility {
    pub fn is_visible(self) -> bool {
        matches!(self, Visibility::Visible)
    }
}

/// Options for the session issuer.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct IssuerOptions {
    /// Never write the session cookie, even if the document supports cookies.
    #[serde(default)]
    pub has_disabled_cookies: bool,
}

/// Hit/miss counters reported by a host cache.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CacheStats {
    pub hits: u64,
    pub misses: u64,
    pub entries: usize,
}

/// Errors that can occur in the session cache library.
#[derive(thiserror::Error, Debug, Clone, PartialEq, Eq)]
pub enum SeshError {
    #[error("Invalid session token: {0:?}")]
    InvalidToken(String),

    #[error("Cookies unavailable: {0}")]
    CookiesUnavailable(String),
}

/// Convenience result type.
pub type SeshResult<T> = Result<T, SeshError>;
