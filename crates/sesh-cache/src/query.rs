//! Session-scoped query memoizer.
//!
//! [`Query`] wraps an async lookup. Each call reads the session token from the
//! request's cookies:
//!
//! - token present: the result is cached in the host cache under
//!   `tags ++ [token, args]`, labelled with `tags` for invalidation. `args` is
//!   the JSON encoding of the call arguments, so arguments the key function
//!   does not name still get their own entry;
//! - token absent (or no tags): the lookup runs directly and nothing is
//!   stored, since the entry could not be tied to one browser session.
//!
//! Every call emits a timing record on the `sesh_cache::timing` target.

use std::future::Future;
use std::sync::Arc;
use std::time::{Duration, Instant};

use futures::future::{self, BoxFuture};
use futures::FutureExt;
use serde::Serialize;

use crate::cache::{cached, CacheOptions, HostCache};
use crate::cookie::{CookieJar, SESSION_COOKIE};
use crate::key::{CacheKey, Tags};
use crate::render::RenderScope;
use crate::token::SessionToken;

/// Sentinel printed in timing records when the request has no session.
pub const NO_SESSION: &str = "no-session";

/// Request-scoped view of what the memoizer needs from an incoming request.
#[derive(Debug, Clone, Default)]
pub struct RequestContext {
    cookies: CookieJar,
}

impl RequestContext {
    pub fn new(cookies: CookieJar) -> Self {
        Self { cookies }
    }

    /// Build from a raw `Cookie` header value.
    pub fn from_cookie_header(header: &str) -> Self {
        Self::new(CookieJar::parse(header))
    }

    /// Add a cookie, mainly for tests and non-HTTP hosts.
    pub fn with_cookie(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.cookies.insert(name, value);
        self
    }

    pub fn cookies(&self) -> &CookieJar {
        &self.cookies
    }

    /// The session token, if the request carries a usable one.
    pub fn session_token(&self) -> Option<SessionToken> {
        let raw = self.cookies.get(SESSION_COOKIE)?;
        if raw.is_empty() {
            return None;
        }
        match SessionToken::parse(raw) {
            Ok(token) => Some(token),
            Err(e) => {
                tracing::debug!("ignoring session cookie: {e}");
                None
            }
        }
    }
}

type LookupFn<A, T, E> = dyn Fn(A) -> BoxFuture<'static, Result<T, E>> + Send + Sync;
type KeyFn<A> = dyn Fn(&A) -> BoxFuture<'static, Tags> + Send + Sync;

/// A lookup memoized per browser session.
pub struct Query<A, T, E> {
    lookup: Arc<LookupFn<A, T, E>>,
    key_fn: Arc<KeyFn<A>>,
    cache: Arc<dyn HostCache>,
    revalidate: Option<Duration>,
}

impl<A, T, E> Clone for Query<A, T, E> {
    fn clone(&self) -> Self {
        Self {
            lookup: self.lookup.clone(),
            key_fn: self.key_fn.clone(),
            cache: self.cache.clone(),
            revalidate: self.revalidate,
        }
    }
}

/// Shorthand for [`Query::new`].
pub fn query<A, T, E, F, Fut, K, P>(cache: Arc<dyn HostCache>, lookup: F, key_fn: K) -> Query<A, T, E>
where
    A: Serialize + Send + 'static,
    T: Clone + Send + Sync + 'static,
    E: Send + 'static,
    F: Fn(A) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = Result<T, E>> + Send + 'static,
    K: Fn(&A) -> P + Send + Sync + 'static,
    P: Into<Tags> + Send + 'static,
{
    Query::new(cache, lookup, key_fn)
}

/// Shorthand for [`Query::new_async`].
pub fn query_async<A, T, E, F, Fut, K, KFut, P>(
    cache: Arc<dyn HostCache>,
    lookup: F,
    key_fn: K,
) -> Query<A, T, E>
where
    A: Serialize + Send + 'static,
    T: Clone + Send + Sync + 'static,
    E: Send + 'static,
    F: Fn(A) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = Result<T, E>> + Send + 'static,
    K: Fn(&A) -> KFut + Send + Sync + 'static,
    KFut: Future<Output = P> + Send + 'static,
    P: Into<Tags>,
{
    Query::new_async(cache, lookup, key_fn)
}

impl<A, T, E> Query<A, T, E>
where
    A: Serialize + Send + 'static,
    T: Clone + Send + Sync + 'static,
    E: Send + 'static,
{
    /// Wrap `lookup`, naming each call with the tags `key_fn` derives from its
    /// arguments.
    pub fn new<F, Fut, K, P>(cache: Arc<dyn HostCache>, lookup: F, key_fn: K) -> Self
    where
        F: Fn(A) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<T, E>> + Send + 'static,
        K: Fn(&A) -> P + Send + Sync + 'static,
        P: Into<Tags> + Send + 'static,
    {
        Self::new_async(cache, lookup, move |args: &A| future::ready(key_fn(args)))
    }

    /// Like [`Query::new`], for key functions that must await something
    /// (a tenant lookup, say) before naming the query.
    pub fn new_async<F, Fut, K, KFut, P>(cache: Arc<dyn HostCache>, lookup: F, key_fn: K) -> Self
    where
        F: Fn(A) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<T, E>> + Send + 'static,
        K: Fn(&A) -> KFut + Send + Sync + 'static,
        KFut: Future<Output = P> + Send + 'static,
        P: Into<Tags>,
    {
        Self {
            lookup: Arc::new(move |args: A| lookup(args).boxed()),
            key_fn: Arc::new(move |args: &A| -> BoxFuture<'static, Tags> {
                key_fn(args).map(|tags: P| -> Tags { tags.into() }).boxed()
            }),
            cache,
            revalidate: None,
        }
    }

    /// Revalidation window for entries this query stores.
    pub fn revalidate(mut self, window: Duration) -> Self {
        self.revalidate = Some(window);
        self
    }

    /// Run the lookup, cached per session when the request has one.
    pub async fn call(&self, ctx: &RequestContext, args: A) -> Result<T, E> {
        let token = ctx.session_token();
        let tags = (self.key_fn)(&args).await;
        let encoded = encode_args(&args);
        self.call_keyed(token, tags, encoded, args).await
    }

    /// [`Query::call`] deduplicated within one render: concurrent or repeated
    /// calls with the same tags and arguments share one underlying call.
    pub async fn call_in(&self, render: &RenderScope, ctx: &RequestContext, args: A) -> Result<T, E>
    where
        E: Clone + Sync,
    {
        let token = ctx.session_token();
        let tags = (self.key_fn)(&args).await;
        let Some(encoded) = encode_args(&args) else {
            return self.call_keyed(token, tags, None, args).await;
        };

        let key = match &token {
            Some(token) => CacheKey::session_scoped(&tags, token),
            None => CacheKey::new(tags.as_slice().iter().cloned()),
        }
        .with_part(encoded.clone());

        let this = self.clone();
        render
            .dedupe(key, move || async move {
                this.call_keyed(token, tags, Some(encoded), args).await
            })
            .await
    }

    async fn call_keyed(
        &self,
        token: Option<SessionToken>,
        tags: Tags,
        encoded: Option<String>,
        args: A,
    ) -> Result<T, E> {
        let start = Instant::now();
        let result = self.run(token.as_ref(), &tags, encoded, args).await;
        log_timing(start.elapsed(), token.as_ref(), &tags);
        result
    }

    async fn run(
        &self,
        token: Option<&SessionToken>,
        tags: &Tags,
        encoded: Option<String>,
        args: A,
    ) -> Result<T, E> {
        match (token, encoded) {
            (Some(token), Some(encoded)) if !tags.is_empty() => {
                let key = CacheKey::session_scoped(tags, token).with_part(encoded);
                let options = CacheOptions::tagged(tags).with_revalidate(self.revalidate);
                let lookup = self.lookup.clone();
                cached(self.cache.as_ref(), key, &options, move || lookup(args)).await
            }
            (Some(_), Some(_)) => {
                tracing::warn!("query has no tags; skipping cross-request caching");
                (self.lookup)(args).await
            }
            (Some(_), None) => {
                tracing::warn!("query arguments are not serializable; skipping cross-request caching");
                (self.lookup)(args).await
            }
            (None, _) => {
                tracing::warn!(
                    "⚠️ Cookies are disabled; skipping cross-request caching to prevent data leakage."
                );
                (self.lookup)(args).await
            }
        }
    }
}

/// Stable key part for the call arguments.
fn encode_args<A: Serialize>(args: &A) -> Option<String> {
    match serde_json::to_string(args) {
        Ok(encoded) => Some(encoded),
        Err(e) => {
            tracing::debug!("cannot encode query arguments: {e}");
            None
        }
    }
}

fn log_timing(elapsed: Duration, token: Option<&SessionToken>, tags: &Tags) {
    let elapsed_ms = elapsed.as_millis();
    let session = token.map(SessionToken::short).unwrap_or(NO_SESSION);
    let query = tags.primary().unwrap_or("");
    tracing::info!(
        target: "sesh_cache::timing",
        elapsed_ms = elapsed_ms as u64,
        session,
        query,
        "⏳{elapsed_ms:>3}ms S:{session} Q:{query}"
    );
}
