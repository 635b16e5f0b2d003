//! Request-scoped deduplication.
//!
//! One [`RenderScope`] lives for one request. Identical keyed calls made while
//! rendering it share a single underlying future, and its outcome is reused
//! for the rest of the render.

use std::any::Any;
use std::future::Future;

use dashmap::mapref::entry::Entry;
use dashmap::DashMap;
use futures::future::{BoxFuture, FutureExt, Shared};

use crate::key::CacheKey;

type SharedLookup<T, E> = Shared<BoxFuture<'static, Result<T, E>>>;

/// Per-render memo of in-flight and completed lookups.
#[derive(Default)]
pub struct RenderScope {
    lookups: DashMap<CacheKey, Box<dyn Any + Send + Sync>>,
}

impl RenderScope {
    pub fn new() -> Self {
        Self::default()
    }

    /// Run `make` at most once per `key` during this render.
    ///
    /// Later callers with the same key await the first caller's future. If the
    /// key is already taken by a lookup of a different type, `make` runs
    /// unshared.
    pub async fn dedupe<T, E, F, Fut>(&self, key: CacheKey, make: F) -> Result<T, E>
    where
        T: Clone + Send + Sync + 'static,
        E: Clone + Send + Sync + 'static,
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<T, E>> + Send + 'static,
    {
        let existing = match self.lookups.entry(key) {
            Entry::Occupied(entry) => entry
                .get()
                .downcast_ref::<SharedLookup<T, E>>()
                .cloned(),
            Entry::Vacant(entry) => {
                let shared: SharedLookup<T, E> = make().boxed().shared();
                entry.insert(Box::new(shared.clone()));
                return shared.await;
            }
        };

        match existing {
            Some(shared) => shared.await,
            None => {
                tracing::debug!("render key reused with a different result type, running unshared");
                make().await
            }
        }
    }

    /// Number of distinct keys seen during this render.
    pub fn len(&self) -> usize {
        self.lookups.len()
    }

    pub fn is_empty(&self) -> bool {
        self.lookups.is_empty()
    }
}
