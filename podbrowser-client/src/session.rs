// SPDX-License-Identifier: MIT OR Apache-2.0

//! Authentication state gating every network call.
use std::fmt::{Debug, Formatter};
use std::future::Future;
use std::sync::{Arc, RwLock, RwLockReadGuard, RwLockWriteGuard};

use futures_util::future::BoxFuture;
use podbrowser_core::{Fetch, FetchError, Request, Response, WebId};
use tokio::sync::broadcast;
use tracing::{debug, trace, warn};

/// Capacity of the channel broadcasting session transitions.
const SESSION_EVENTS_CAPACITY: usize = 16;

/// Incremented on every session transition.
pub type SessionId = u64;

/// Snapshot of the authentication state.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct SessionState {
    pub session_id: SessionId,
    pub web_id: Option<WebId>,
    pub is_loading: bool,
}

impl SessionState {
    pub fn is_logged_in(&self) -> bool {
        !self.is_loading && self.web_id.is_some()
    }
}

/// Fetch bound to one session.
///
/// All consumers within one session observe the same underlying fetch. Before the session
/// resolved, and after a logout, requests are sent anonymously.
#[derive(Clone)]
pub struct AuthenticatedFetch {
    session_id: SessionId,
    web_id: Option<WebId>,
    inner: Arc<dyn Fetch>,
}

impl AuthenticatedFetch {
    pub fn session_id(&self) -> SessionId {
        self.session_id
    }

    /// Identity requests are made for, `None` for anonymous requests.
    pub fn web_id(&self) -> Option<&WebId> {
        self.web_id.as_ref()
    }

    /// Returns true if both handles were minted for the same session.
    pub fn same_as(&self, other: &Self) -> bool {
        self.session_id == other.session_id && Arc::ptr_eq(&self.inner, &other.inner)
    }
}

impl Fetch for AuthenticatedFetch {
    fn fetch(&self, request: Request) -> BoxFuture<'static, Result<Response, FetchError>> {
        trace!(
            session_id = self.session_id,
            method = %request.method,
            url = %request.url,
            "fetch"
        );
        self.inner.fetch(request)
    }
}

impl Debug for AuthenticatedFetch {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AuthenticatedFetch")
            .field("session_id", &self.session_id)
            .field("web_id", &self.web_id)
            .finish_non_exhaustive()
    }
}

/// Outcome of a successful authentication: the identity and a fetch carrying its credentials.
#[derive(Clone)]
pub struct Login {
    pub web_id: WebId,
    pub fetch: Arc<dyn Fetch>,
}

impl Login {
    pub fn new(web_id: WebId, fetch: impl Fetch) -> Self {
        Self {
            web_id,
            fetch: Arc::new(fetch),
        }
    }
}

impl Debug for Login {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Login")
            .field("web_id", &self.web_id)
            .finish_non_exhaustive()
    }
}

/// External collaborator negotiating authentication with an identity provider.
pub trait AuthProvider: Send + Sync {
    /// Resolves a previously established login, `None` if there is nothing to restore.
    fn restore(&self) -> impl Future<Output = Result<Option<Login>, FetchError>> + Send;
}

struct Current {
    state: SessionState,
    fetch: AuthenticatedFetch,
}

struct Inner {
    anonymous: Arc<dyn Fetch>,
    current: RwLock<Current>,
    tx: broadcast::Sender<SessionState>,
}

/// Current authentication identity of the application.
///
/// A session starts out loading without identity and stays alive for the lifetime of the
/// application. Every transition (resolved, login, logout) is broadcast exactly once to all
/// subscribers and mints a new [`AuthenticatedFetch`] with a fresh [`SessionId`].
///
/// Cloning is cheap, all clones observe the same state.
#[derive(Clone)]
pub struct Session {
    inner: Arc<Inner>,
}

impl Session {
    /// Creates a loading session, `anonymous` serves requests until someone logs in.
    pub fn new(anonymous: impl Fetch) -> Self {
        let anonymous: Arc<dyn Fetch> = Arc::new(anonymous);
        let (tx, _) = broadcast::channel(SESSION_EVENTS_CAPACITY);

        let current = Current {
            state: SessionState {
                session_id: 0,
                web_id: None,
                is_loading: true,
            },
            fetch: AuthenticatedFetch {
                session_id: 0,
                web_id: None,
                inner: anonymous.clone(),
            },
        };

        Self {
            inner: Arc::new(Inner {
                anonymous,
                current: RwLock::new(current),
                tx,
            }),
        }
    }

    pub fn state(&self) -> SessionState {
        self.read_current().state.clone()
    }

    pub fn web_id(&self) -> Option<WebId> {
        self.read_current().state.web_id.clone()
    }

    pub fn is_loading(&self) -> bool {
        self.read_current().state.is_loading
    }

    pub fn is_logged_in(&self) -> bool {
        self.read_current().state.is_logged_in()
    }

    /// Fetch of the current session. Always callable, anonymous while loading.
    pub fn fetch(&self) -> AuthenticatedFetch {
        self.read_current().fetch.clone()
    }

    /// State and fetch taken at the same instant.
    pub(crate) fn snapshot(&self) -> (SessionState, AuthenticatedFetch) {
        let current = self.read_current();
        (current.state.clone(), current.fetch.clone())
    }

    /// Subscribe to session transitions.
    pub fn subscribe(&self) -> broadcast::Receiver<SessionState> {
        self.inner.tx.subscribe()
    }

    /// Resolves the session with an authenticated identity.
    pub fn login(&self, login: Login) -> SessionState {
        debug!(web_id = %login.web_id, "login");
        self.transition(Some(login.web_id), login.fetch, |_| true)
    }

    /// Drops the identity, following requests are anonymous again.
    pub fn logout(&self) -> SessionState {
        self.transition(None, self.inner.anonymous.clone(), |state| {
            state.is_loading || state.web_id.is_some()
        })
    }

    /// Resolves a loading session without identity.
    pub fn finish_loading(&self) -> SessionState {
        self.transition(None, self.inner.anonymous.clone(), |state| state.is_loading)
    }

    /// Asks the authentication collaborator for a previous login and applies the outcome.
    ///
    /// The session is resolved in every case, also when the provider fails.
    pub async fn restore<P>(&self, provider: &P) -> Result<SessionState, FetchError>
    where
        P: AuthProvider,
    {
        match provider.restore().await {
            Ok(Some(login)) => Ok(self.login(login)),
            Ok(None) => Ok(self.finish_loading()),
            Err(err) => {
                warn!(%err, "failed restoring session");
                self.finish_loading();
                Err(err)
            }
        }
    }

    /// Moves to a new session if `applies` holds for the current state, otherwise returns the
    /// current state unchanged.
    ///
    /// Check, update and broadcast happen under the write lock, so transitions are observed in
    /// `SessionId` order and a no-op never notifies.
    fn transition<P>(
        &self,
        web_id: Option<WebId>,
        fetch: Arc<dyn Fetch>,
        applies: P,
    ) -> SessionState
    where
        P: FnOnce(&SessionState) -> bool,
    {
        let mut current = self.write_current();
        if !applies(&current.state) {
            return current.state.clone();
        }

        let session_id = current.state.session_id + 1;
        current.state = SessionState {
            session_id,
            web_id: web_id.clone(),
            is_loading: false,
        };
        current.fetch = AuthenticatedFetch {
            session_id,
            web_id,
            inner: fetch,
        };

        debug!(
            session_id,
            web_id = ?current.state.web_id,
            "broadcast session transition"
        );

        // Sending only fails when nobody is subscribed.
        let _ = self.inner.tx.send(current.state.clone());
        current.state.clone()
    }

    fn read_current(&self) -> RwLockReadGuard<'_, Current> {
        self.inner
            .current
            .read()
            .expect("acquire shared read access on session")
    }

    fn write_current(&self) -> RwLockWriteGuard<'_, Current> {
        self.inner
            .current
            .write()
            .expect("acquire exclusive write access on session")
    }
}

impl Debug for Session {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Session")
            .field("state", &self.state())
            .finish_non_exhaustive()
    }
}
