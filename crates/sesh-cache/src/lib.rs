//! sesh-cache — session-scoped query caching for server-rendered pages.
//!
//! Cached query results are partitioned by an opaque per-browser session
//! token carried in the `browser-session-id` cookie. Requests without that
//! cookie bypass cross-request caching so one visitor's data is never served
//! to another.

pub mod cache;
pub mod cookie;
pub mod issuer;
pub mod key;
pub mod query;
pub mod render;
pub mod token;
pub mod types;

pub use cache::{cached, CacheOptions, CachedValue, HostCache, MemoryCache, DEFAULT_MAX_ENTRIES};
pub use cookie::{CookieJar, SetCookie, SESSION_COOKIE, SESSION_COOKIE_DAYS};
pub use issuer::{Document, ListenerId, MemoryDocument, Refresh, SessionIssuer};
pub use key::{CacheKey, Tags};
pub use query::{query, query_async, Query, RequestContext, NO_SESSION};
pub use render::RenderScope;
pub use token::SessionToken;
pub use types::*;
