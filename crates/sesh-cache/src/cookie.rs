//! Session cookie encoding and request cookie parsing.

use std::collections::HashMap;
use std::fmt;

use chrono::{DateTime, Duration, Utc};

use crate::token::SessionToken;

/// Name of the cookie carrying the session token.
pub const SESSION_COOKIE: &str = "browser-session-id";

/// Validity horizon of the session cookie, in days.
pub const SESSION_COOKIE_DAYS: i64 = 1;

/// Path attribute of the session cookie.
pub const SESSION_COOKIE_PATH: &str = "/";

/// Cookies sent with an incoming request.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CookieJar {
    cookies: HashMap<String, String>,
}

impl CookieJar {
    pub fn new() -> Self {
        Self::default()
    }

    /// Parse a `Cookie` request header (`a=1; b=2`). Malformed pairs are
    /// skipped and the first occurrence of a repeated name wins.
    pub fn parse(header: &str) -> Self {
        let mut cookies = HashMap::new();
        for pair in header.split(';') {
            let Some((name, value)) = pair.split_once('=') else {
                continue;
            };
            let name = name.trim();
            if name.is_empty() {
                continue;
            }
            let value = value.trim().trim_matches('"');
            cookies
                .entry(name.to_string())
                .or_insert_with(|| value.to_string());
        }
        Self { cookies }
    }

    pub fn get(&self, name: &str) -> Option<&str> {
        self.cookies.get(name).map(String::as_str)
    }

    pub fn insert(&mut self, name: impl Into<String>, value: impl Into<String>) {
        self.cookies.insert(name.into(), value.into());
    }

    pub fn len(&self) -> usize {
        self.cookies.len()
    }

    pub fn is_empty(&self) -> bool {
        self.cookies.is_empty()
    }
}

/// A cookie to be written by the session issuer.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SetCookie {
    pub name: String,
    pub value: String,
    pub expires: DateTime<Utc>,
    pub path: String,
}

impl SetCookie {
    /// The session cookie for `token`, expiring one day after `now`.
    pub fn session(token: &SessionToken, now: DateTime<Utc>) -> Self {
        Self {
            name: SESSION_COOKIE.to_string(),
            value: token.as_str().to_string(),
            expires: now + Duration::days(SESSION_COOKIE_DAYS),
            path: SESSION_COOKIE_PATH.to_string(),
        }
    }

    pub fn is_expired_at(&self, now: DateTime<Utc>) -> bool {
        self.expires <= now
    }
}

impl fmt::Display for SetCookie {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{}={}; Expires={}; Path={}",
            self.name,
            self.value,
            self.expires.format("%a, %d %b %Y %H:%M:%S GMT"),
            self.path
        )
    }
}
