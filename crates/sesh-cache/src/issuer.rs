//! Client-side session token issuer.
//!
//! The issuer mints a token when mounted and again each time its page becomes
//! visible, writes it to the `browser-session-id` cookie when cookies are
//! allowed, and asks the view to refresh so server-rendered data is fetched
//! under the new token. The memoizer only ever sees the cookie on the next
//! request.
//!
//! The host delivers visibility events by calling
//! [`SessionIssuer::on_visibility_change`] while the issuer is mounted.

use std::cell::{Cell, RefCell};
use std::collections::{BTreeMap, BTreeSet};

use chrono::Utc;

use crate::cookie::{SetCookie, SESSION_COOKIE};
use crate::token::SessionToken;
use crate::types::{IssuerOptions, SeshError, SeshResult, Visibility};

/// Handle for a registered visibility listener.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct ListenerId(pub u64);

/// The page an issuer runs in.
pub trait Document {
    fn visibility(&self) -> Visibility;

    /// Whether the user agent accepts cookies at all.
    fn cookies_enabled(&self) -> bool;

    fn write_cookie(&self, cookie: &SetCookie) -> SeshResult<()>;

    fn add_visibility_listener(&self) -> ListenerId;

    fn remove_visibility_listener(&self, id: ListenerId);
}

/// Re-requests the current view from the server. Fire-and-forget.
pub trait Refresh {
    fn refresh(&self);
}

impl<F: Fn()> Refresh for F {
    fn refresh(&self) {
        self()
    }
}

/// Mints and persists session tokens over a page's lifetime.
pub struct SessionIssuer<D: Document, R: Refresh> {
    document: D,
    refresher: R,
    options: IssuerOptions,
    token: Option<SessionToken>,
    persisted: bool,
    listener: Option<ListenerId>,
}

impl<D: Document, R: Refresh> SessionIssuer<D, R> {
    pub fn new(document: D, refresher: R, options: IssuerOptions) -> Self {
        Self {
            document,
            refresher,
            options,
            token: None,
            persisted: false,
            listener: None,
        }
    }

    /// Issue the first token and start listening for visibility changes.
    /// Mounting twice is a no-op apart from returning the current token.
    pub fn mount(&mut self) -> &SessionToken {
        if self.listener.is_none() {
            self.regenerate();
            self.listener = Some(self.document.add_visibility_listener());
        }
        self.token
            .get_or_insert_with(|| SessionToken::generate_distinct(None))
    }

    /// Handle a `visibilitychange` event. Returns the new token when one was
    /// issued.
    pub fn on_visibility_change(&mut self) -> Option<&SessionToken> {
        if self.listener.is_none() || !self.document.visibility().is_visible() {
            return None;
        }
        self.regenerate();
        self.refresher.refresh();
        self.token.as_ref()
    }

    /// Stop listening. The last token stays in its cookie until it expires.
    pub fn unmount(&mut self) {
        if let Some(id) = self.listener.take() {
            self.document.remove_visibility_listener(id);
        }
    }

    pub fn is_mounted(&self) -> bool {
        self.listener.is_some()
    }

    pub fn session_token(&self) -> Option<&SessionToken> {
        self.token.as_ref()
    }

    /// Whether the current token reached the cookie jar.
    pub fn is_persisted(&self) -> bool {
        self.persisted
    }

    pub fn document(&self) -> &D {
        &self.document
    }

    fn regenerate(&mut self) {
        let token = SessionToken::generate_distinct(self.token.as_ref());
        self.persisted = self.persist(&token);
        tracing::info!("New session ID generated: {token}");
        self.token = Some(token);
    }

    fn persist(&self, token: &SessionToken) -> bool {
        if self.options.has_disabled_cookies || !self.document.cookies_enabled() {
            tracing::warn!("Cookies are disabled; session-scoped caching is limited.");
            return false;
        }
        match self.document.write_cookie(&SetCookie::session(token, Utc::now())) {
            Ok(()) => true,
            Err(e) => {
                tracing::warn!("Could not write session cookie ({e}); session-scoped caching is limited.");
                false
            }
        }
    }
}

impl<D: Document, R: Refresh> Drop for SessionIssuer<D, R> {
    fn drop(&mut self) {
        self.unmount();
    }
}

/// Headless in-memory document.
///
/// Cookies are stored by name, so each write replaces the previous value.
#[derive(Debug)]
pub struct MemoryDocument {
    visibility: Cell<Visibility>,
    cookies_enabled: bool,
    reject_writes: Cell<bool>,
    cookies: RefCell<BTreeMap<String, SetCookie>>,
    cookie_writes: Cell<usize>,
    listeners: RefCell<BTreeSet<ListenerId>>,
    next_listener: Cell<u64>,
}

impl MemoryDocument {
    pub fn new(cookies_enabled: bool) -> Self {
        Self {
            visibility: Cell::new(Visibility::Visible),
            cookies_enabled,
            reject_writes: Cell::new(false),
            cookies: RefCell::new(BTreeMap::new()),
            cookie_writes: Cell::new(0),
            listeners: RefCell::new(BTreeSet::new()),
            next_listener: Cell::new(1),
        }
    }

    pub fn set_visibility(&self, visibility: Visibility) {
        self.visibility.set(visibility);
    }

    /// Make cookie writes fail, as a full or locked-down cookie store would.
    pub fn reject_cookie_writes(&self, reject: bool) {
        self.reject_writes.set(reject);
    }

    pub fn cookie(&self, name: &str) -> Option<SetCookie> {
        self.cookies.borrow().get(name).cloned()
    }

    pub fn cookie_count(&self) -> usize {
        self.cookies.borrow().len()
    }

    /// Total successful cookie writes.
    pub fn cookie_writes(&self) -> usize {
        self.cookie_writes.get()
    }

    pub fn listener_count(&self) -> usize {
        self.listeners.borrow().len()
    }

    /// The `Cookie` header this document would send with its next request.
    pub fn cookie_header(&self) -> String {
        let now = Utc::now();
        self.cookies
            .borrow()
            .values()
            .filter(|c| !c.is_expired_at(now))
            .map(|c| format!("{}={}", c.name, c.value))
            .collect::<Vec<_>>()
            .join("; ")
    }

    pub fn session_cookie(&self) -> Option<String> {
        self.cookie(SESSION_COOKIE).map(|c| c.value)
    }
}

impl Default for MemoryDocument {
    fn default() -> Self {
        Self::new(true)
    }
}

impl Document for MemoryDocument {
    fn visibility(&self) -> Visibility {
        self.visibility.get()
    }

    fn cookies_enabled(&self) -> bool {
        self.cookies_enabled
    }

    fn write_cookie(&self, cookie: &SetCookie) -> SeshResult<()> {
        if self.reject_writes.get() {
            return Err(SeshError::CookiesUnavailable("cookie store rejected the write".into()));
        }
        self.cookies
            .borrow_mut()
            .insert(cookie.name.clone(), cookie.clone());
        self.cookie_writes.set(self.cookie_writes.get() + 1);
        Ok(())
    }

    fn add_visibility_listener(&self) -> ListenerId {
        let id = ListenerId(self.next_listener.get());
        self.next_listener.set(id.0 + 1);
        self.listeners.borrow_mut().insert(id);
        id
    }

    fn remove_visibility_listener(&self, id: ListenerId) {
        self.listeners.borrow_mut().remove(&id);
    }
}

impl<T: Document + ?Sized> Document for &T {
    fn visibility(&self) -> Visibility {
        (**self).visibility()
    }

    fn cookies_enabled(&self) -> bool {
        (**self).cookies_enabled()
    }

    fn write_cookie(&self, cookie: &SetCookie) -> SeshResult<()> {
        (**self).write_cookie(cookie)
    }

    fn add_visibility_listener(&self) -> ListenerId {
        (**self).add_visibility_listener()
    }

    fn remove_visibility_listener(&self, id: ListenerId) {
        (**self).remove_visibility_listener(id)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::rc::Rc;

    fn counter() -> (Rc<Cell<usize>>, impl Fn()) {
        let count = Rc::new(Cell::new(0));
        let c = count.clone();
        (count, move || c.set(c.get() + 1))
    }

    #[test]
    fn test_mount_writes_cookie_without_refresh() {
        let doc = MemoryDocument::default();
        let (refreshes, refresh) = counter();
        let mut issuer = SessionIssuer::new(&doc, refresh, IssuerOptions::default());

        let token = issuer.mount().clone();
        assert_eq!(doc.session_cookie().as_deref(), Some(token.as_str()));
        assert!(issuer.is_persisted());
        assert_eq!(doc.listener_count(), 1);
        assert_eq!(refreshes.get(), 0);

        let cookie = doc.cookie(SESSION_COOKIE).unwrap();
        assert_eq!(cookie.path, "/");
        let horizon = cookie.expires - Utc::now();
        assert!(horizon <= chrono::Duration::days(1));
        assert!(horizon > chrono::Duration::hours(23));
    }

    #[test]
    fn test_visible_transition_overwrites_cookie_and_refreshes() {
        let doc = MemoryDocument::default();
        let (refreshes, refresh) = counter();
        let mut issuer = SessionIssuer::new(&doc, refresh, IssuerOptions::default());
        let first = issuer.mount().clone();

        doc.set_visibility(Visibility::Hidden);
        assert!(issuer.on_visibility_change().is_none());
        assert_eq!(refreshes.get(), 0);

        doc.set_visibility(Visibility::Visible);
        let second = issuer.on_visibility_change().cloned().unwrap();
        assert_ne!(first, second);
        assert_eq!(doc.session_cookie().as_deref(), Some(second.as_str()));
        assert_eq!(doc.cookie_count(), 1);
        assert_eq!(doc.cookie_writes(), 2);
        assert_eq!(refreshes.get(), 1);
    }

    #[test]
    fn test_disabled_cookies_never_write() {
        let doc = MemoryDocument::new(true);
        let (_, refresh) = counter();
        let options = IssuerOptions { has_disabled_cookies: true };
        let mut issuer = SessionIssuer::new(&doc, refresh, options);

        issuer.mount();
        issuer.on_visibility_change();
        assert!(issuer.session_token().is_some());
        assert!(!issuer.is_persisted());
        assert_eq!(doc.cookie_writes(), 0);
        assert!(doc.session_cookie().is_none());
    }

    #[test]
    fn test_unsupported_cookies_keep_token_in_memory() {
        let doc = MemoryDocument::new(false);
        let (_, refresh) = counter();
        let mut issuer = SessionIssuer::new(&doc, refresh, IssuerOptions::default());

        let token = issuer.mount().clone();
        assert_eq!(issuer.session_token(), Some(&token));
        assert_eq!(doc.cookie_writes(), 0);
    }

    #[test]
    fn test_rejected_write_is_not_fatal() {
        let doc = MemoryDocument::default();
        doc.reject_cookie_writes(true);
        let (_, refresh) = counter();
        let mut issuer = SessionIssuer::new(&doc, refresh, IssuerOptions::default());

        issuer.mount();
        assert!(!issuer.is_persisted());
        assert!(issuer.session_token().is_some());

        doc.reject_cookie_writes(false);
        issuer.on_visibility_change();
        assert!(issuer.is_persisted());
    }

    #[test]
    fn test_unmount_and_drop_deregister() {
        let doc = MemoryDocument::default();
        {
            let (_, refresh) = counter();
            let mut issuer = SessionIssuer::new(&doc, refresh, IssuerOptions::default());
            issuer.mount();
            issuer.mount();
            assert_eq!(doc.listener_count(), 1);
            issuer.unmount();
            assert_eq!(doc.listener_count(), 0);
            assert!(issuer.on_visibility_change().is_none());
        }
        {
            let (_, refresh) = counter();
            let mut issuer = SessionIssuer::new(&doc, refresh, IssuerOptions::default());
            issuer.mount();
            assert_eq!(doc.listener_count(), 1);
        }
        assert_eq!(doc.listener_count(), 0);
    }

    #[test]
    fn test_cookie_header() {
        let doc = MemoryDocument::default();
        assert_eq!(doc.cookie_header(), "");
        let (_, refresh) = counter();
        let mut issuer = SessionIssuer::new(&doc, refresh, IssuerOptions::default());
        let token = issuer.mount().clone();
        assert_eq!(doc.cookie_header(), format!("browser-session-id={token}"));
    }
}
