//! Opaque browser session tokens.
//!
//! A token is a base36 millisecond timestamp joined to a base36 random
//! component. It partitions cache entries per browser session and carries no
//! authority: never use it to authenticate or authorize anything.

use std::fmt;
use std::time::{SystemTime, UNIX_EPOCH};

use rand::Rng;
use serde::{Deserialize, Serialize};

use crate::types::{SeshError, SeshResult};

/// Number of leading characters shown in timing records.
const SHORT_LEN: usize = 5;

const BASE36: &[u8; 36] = b"0123456789abcdefghijklmnopqrstuvwxyz";

/// Opaque per-browser-session cache partition key.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct SessionToken(String);

impl SessionToken {
    /// Mint a fresh token.
    pub fn generate() -> Self {
        let millis = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .unwrap_or_default()
            .as_millis() as u64;
        let random: u64 = rand::thread_rng().gen();
        Self(format!("{}-{}", to_base36(millis), to_base36(random)))
    }

    /// Mint a token guaranteed to differ from `previous`.
    pub fn generate_distinct(previous: Option<&SessionToken>) -> Self {
        loop {
            let token = Self::generate();
            if previous != Some(&token) {
                return token;
            }
        }
    }

    /// Accept a token received from a cookie.
    pub fn parse(value: &str) -> SeshResult<Self> {
        if value.is_empty() || !value.chars().all(is_cookie_octet) {
            return Err(SeshError::InvalidToken(value.to_string()));
        }
        Ok(Self(value.to_string()))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Truncated form for log lines.
    pub fn short(&self) -> &str {
        match self.0.char_indices().nth(SHORT_LEN) {
            Some((idx, _)) => &self.0[..idx],
            None => &self.0,
        }
    }
}

impl fmt::Display for SessionToken {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl TryFrom<String> for SessionToken {
    type Error = SeshError;

    fn try_from(value: String) -> SeshResult<Self> {
        Self::parse(&value)
    }
}

impl From<SessionToken> for String {
    fn from(token: SessionToken) -> Self {
        token.0
    }
}

/// RFC 6265 `cookie-octet`.
fn is_cookie_octet(c: char) -> bool {
    c.is_ascii() && !c.is_ascii_control() && !matches!(c, ' ' | '"' | ',' | ';' | '\\')
}

fn to_base36(mut n: u64) -> String {
    if n == 0 {
        return "0".to_string();
    }
    let mut digits = Vec::new();
    while n > 0 {
        digits.push(BASE36[(n % 36) as usize]);
        n /= 36;
    }
    digits.reverse();
    String::from_utf8(digits).unwrap_or_default()
}
