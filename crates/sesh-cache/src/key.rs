//! Cache key derivation.
//!
//! A query names itself with one or more tags. Cross-request cache entries are
//! keyed on those tags followed by the session token, so two sessions asking
//! the same question never share an entry while one session asking twice does.

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::token::SessionToken;

/// Ordered tags identifying a logical query. Also used as invalidation labels.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Tags(Vec<String>);

impl Tags {
    pub fn new(tags: Vec<String>) -> Self {
        Self(tags)
    }

    /// The tag that names the query in timing records.
    pub fn primary(&self) -> Option<&str> {
        self.0.first().map(String::as_str)
    }

    pub fn as_slice(&self) -> &[String] {
        &self.0
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn to_vec(&self) -> Vec<String> {
        self.0.clone()
    }
}

impl From<&str> for Tags {
    fn from(tag: &str) -> Self {
        Self(vec![tag.to_string()])
    }
}

impl From<String> for Tags {
    fn from(tag: String) -> Self {
        Self(vec![tag])
    }
}

impl From<Vec<String>> for Tags {
    fn from(tags: Vec<String>) -> Self {
        Self(tags)
    }
}

impl From<Vec<&str>> for Tags {
    fn from(tags: Vec<&str>) -> Self {
        Self(tags.into_iter().map(str::to_string).collect())
    }
}

impl<const N: usize> From<[&str; N]> for Tags {
    fn from(tags: [&str; N]) -> Self {
        Self(tags.iter().map(|t| t.to_string()).collect())
    }
}

/// Key of one cross-request cache entry.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct CacheKey(Vec<String>);

impl CacheKey {
    /// An unscoped key, shared by every visitor.
    pub fn new<I, S>(parts: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self(parts.into_iter().map(Into::into).collect())
    }

    /// `tags ++ [token]`.
    pub fn session_scoped(tags: &Tags, token: &SessionToken) -> Self {
        let mut parts = Vec::with_capacity(tags.len() + 1);
        parts.extend(tags.as_slice().iter().cloned());
        parts.push(token.as_str().to_string());
        Self(parts)
    }

    pub fn parts(&self) -> &[String] {
        &self.0
    }

    /// Extend the key with a stringified argument.
    pub fn with_part(mut self, part: impl Into<String>) -> Self {
        self.0.push(part.into());
        self
    }
}

impl fmt::Display for CacheKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0.join("/"))
    }
}
