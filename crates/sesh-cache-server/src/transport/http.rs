//! HTTP transport — axum router serving the demo pages, the JSON API, tag
//! revalidation and /health.

use std::sync::Arc;
use std::time::{Duration, Instant};

use axum::{
    extract::{Path, State},
    http::StatusCode,
    response::{Html, IntoResponse, Json, Response},
    routing::{get, post},
    Router,
};
use tower_http::trace::TraceLayer;

use sesh_cache::{cached, query, CacheKey, CacheOptions, HostCache, MemoryCache, Query};

use crate::config::ServerConfig;
use crate::pages;
use crate::session::PageRequest;
use crate::store::{LookupError, UserDirectory};
use crate::types::{ServerError, ServerResult, User};

/// Tag shared by every entry of the unscoped user cache.
pub const SHARED_USER_TAG: &str = "user";

/// Session-scoped user lookup.
pub type UserQuery = Query<u32, Option<User>, LookupError>;

/// Shared server state passed to all handlers via axum State.
pub struct AppState {
    pub users: Arc<UserDirectory>,
    pub cache: Arc<MemoryCache>,
    pub user_query: UserQuery,
    pub revalidate: Duration,
}

impl AppState {
    pub fn new(users: Arc<UserDirectory>, cache: Arc<MemoryCache>, revalidate: Duration) -> Self {
        let lookup_users = users.clone();
        let user_query = query(
            cache.clone(),
            move |id: u32| {
                let users = lookup_users.clone();
                async move { users.find(id).await }
            },
            |id: &u32| format!("user-{id}"),
        )
        .revalidate(revalidate);

        Self {
            users,
            cache,
            user_query,
            revalidate,
        }
    }

    /// State backed by the seeded directory, per `config`.
    pub fn from_config(config: &ServerConfig) -> Self {
        Self::new(
            Arc::new(UserDirectory::seeded(config.lookup_delay)),
            Arc::new(MemoryCache::new(Some(config.revalidate))),
            config.revalidate,
        )
    }
}

/// Build the application router.
pub fn router(state: Arc<AppState>) -> Router {
    Router::new()
        .route("/users/:id", get(handle_user_page))
        .route("/users/:id/shared", get(handle_shared_page))
        .route("/users/:id/direct", get(handle_direct_page))
        .route("/api/users/:id", get(handle_api_user))
        .route("/revalidate/:tag", post(handle_revalidate))
        .route("/health", get(handle_health))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

/// Sweep period for expired host cache entries. Never shorter than one second.
pub fn sweep_interval(revalidate: Duration) -> Duration {
    revalidate.max(Duration::from_secs(1))
}

/// Periodically reclaim expired entries, so abandoned sessions do not
/// accumulate between requests.
pub fn spawn_cache_sweeper(cache: Arc<MemoryCache>, every: Duration) -> tokio::task::JoinHandle<()> {
    tokio::spawn(async move {
        let mut ticker = tokio::time::interval(every);
        ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
        loop {
            ticker.tick().await;
            let removed = cache.cleanup_expired();
            if removed > 0 {
                tracing::debug!("cache sweep reclaimed {removed} entries");
            }
        }
    })
}

/// HTTP transport for the demo host.
pub struct HttpTransport {
    state: Arc<AppState>,
}

impl HttpTransport {
    pub fn new(state: AppState) -> Self {
        Self {
            state: Arc::new(state),
        }
    }

    /// Run the HTTP server on the given address.
    pub async fn run(&self, addr: &str) -> ServerResult<()> {
        let app = router(self.state.clone());

        let listener = tokio::net::TcpListener::bind(addr).await?;

        tracing::info!("HTTP transport listening on {addr}");

        let sweeper = spawn_cache_sweeper(
            self.state.cache.clone(),
            sweep_interval(self.state.revalidate),
        );
        let served = axum::serve(listener, app).await;
        sweeper.abort();
        served.map_err(|e| ServerError::Transport(e.to_string()))?;

        Ok(())
    }
}

fn user_response(user: Option<User>, suffix: &str) -> Response {
    match user {
        Some(user) => Html(pages::user_page(&user, suffix)).into_response(),
        None => (StatusCode::NOT_FOUND, Html(pages::not_found_page())).into_response(),
    }
}

/// Session-scoped page: cached per browser session when the cookie is present.
async fn handle_user_page(
    State(state): State<Arc<AppState>>,
    Path(id): Path<u32>,
    page: PageRequest,
) -> ServerResult<Response> {
    let user = state.user_query.call_in(&page.render, &page.ctx, id).await?;
    Ok(user_response(user, ""))
}

/// Unscoped page: one cache entry per user shared by every visitor.
async fn handle_shared_page(
    State(state): State<Arc<AppState>>,
    Path(id): Path<u32>,
) -> ServerResult<Response> {
    let start = Instant::now();
    let key = CacheKey::new(["user-lookup"]).with_part(id.to_string());
    let options = CacheOptions {
        tags: vec![SHARED_USER_TAG.to_string()],
        revalidate: Some(state.revalidate),
    };
    let users = state.users.clone();
    let user = cached(state.cache.as_ref() as &dyn HostCache, key, &options, || async move {
        users.find(id).await
    })
    .await?;
    tracing::info!("⏳{:>3}ms cached lookup", start.elapsed().as_millis());
    Ok(user_response(user, "/shared"))
}

/// Uncached page: every request reaches the directory.
async fn handle_direct_page(
    State(state): State<Arc<AppState>>,
    Path(id): Path<u32>,
) -> ServerResult<Response> {
    let start = Instant::now();
    let user = state.users.find(id).await?;
    tracing::info!("⏳{:>3}ms ", start.elapsed().as_millis());
    Ok(user_response(user, "/direct"))
}

/// JSON lookup through the session-scoped query.
async fn handle_api_user(
    State(state): State<Arc<AppState>>,
    Path(id): Path<u32>,
    page: PageRequest,
) -> ServerResult<Json<User>> {
    state
        .user_query
        .call_in(&page.render, &page.ctx, id)
        .await?
        .map(Json)
        .ok_or(ServerError::UserNotFound(id))
}

/// Drop every host cache entry labelled with `tag`.
async fn handle_revalidate(
    State(state): State<Arc<AppState>>,
    Path(tag): Path<String>,
) -> ServerResult<Json<serde_json::Value>> {
    if tag.trim().is_empty() {
        return Err(ServerError::InvalidParams("tag must not be empty".into()));
    }
    let dropped = state.cache.revalidate_tag(&tag).await;
    Ok(Json(serde_json::json!({
        "tag": tag,
        "dropped": dropped,
    })))
}

/// Health check endpoint.
async fn handle_health(State(state): State<Arc<AppState>>) -> Json<serde_json::Value> {
    Json(serde_json::json!({
        "status": "ok",
        "version": env!("CARGO_PKG_VERSION"),
        "cache": state.cache.stats(),
        "users": state.users.count().await,
        "lookups": state.users.lookups(),
    }))
}
