//! In-memory user directory with simulated latency.
//!
//! Stands in for a database: every call to [`UserDirectory::find`] counts as
//! one real lookup, which is what the caching routes try to avoid.

use std::collections::BTreeMap;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::time::Duration;

use tokio::sync::RwLock;

use crate::types::User;

/// Failure of the backing data source.
#[derive(thiserror::Error, Debug, Clone, PartialEq, Eq)]
pub enum LookupError {
    #[error("user directory unavailable: {0}")]
    Unavailable(String),
}

pub struct UserDirectory {
    users: RwLock<BTreeMap<u32, User>>,
    delay: Duration,
    lookups: AtomicU64,
    available: AtomicBool,
}

impl UserDirectory {
    pub fn new(delay: Duration) -> Self {
        Self {
            users: RwLock::new(BTreeMap::new()),
            delay,
            lookups: AtomicU64::new(0),
            available: AtomicBool::new(true),
        }
    }

    /// A directory holding the two demo users.
    pub fn seeded(delay: Duration) -> Self {
        let mut users = BTreeMap::new();
        users.insert(1, User::new(1, "Ada Lovelace", "ada@example.com"));
        users.insert(2, User::new(2, "Grace Hopper", "grace@example.com"));
        Self {
            users: RwLock::new(users),
            ..Self::new(delay)
        }
    }

    pub async fn find(&self, id: u32) -> Result<Option<User>, LookupError> {
        self.lookups.fetch_add(1, Ordering::SeqCst);
        if !self.delay.is_zero() {
            tokio::time::sleep(self.delay).await;
        }
        if !self.available.load(Ordering::SeqCst) {
            return Err(LookupError::Unavailable("connection refused".into()));
        }
        Ok(self.users.read().await.get(&id).cloned())
    }

    pub async fn count(&self) -> usize {
        self.users.read().await.len()
    }

    /// Number of real lookups served so far.
    pub fn lookups(&self) -> u64 {
        self.lookups.load(Ordering::SeqCst)
    }

    /// Simulate the data source going down or coming back.
    pub fn set_available(&self, available: bool) {
        self.available.store(available, Ordering::SeqCst);
    }
}
