// SPDX-License-Identifier: MIT OR Apache-2.0

//! Observable permission state for whatever resource is currently selected.
use std::fmt::{Debug, Formatter};
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

use podbrowser_client::{Connector, SessionState};
use podbrowser_core::FetchError;
use tokio::sync::broadcast::error::{RecvError, TryRecvError};
use tokio::sync::{broadcast, watch};
use tokio::task::JoinHandle;
use tracing::{debug, trace};

use crate::control::{AccessControl, AccessControlHandle};
use crate::resolver::{Permission, PermissionResolver};

/// Value observed by consumers of a [`PermissionsHook`].
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct PermissionsState {
    /// Resolved permissions, `None` when no handle is selected or nothing resolved yet.
    pub permissions: Option<Vec<Permission>>,
    pub is_loading: bool,

    /// Error of the last listing, cleared by the next request.
    pub error: Option<FetchError>,
}

/// Keeps the permissions of the selected access-control handle up-to-date.
///
/// Every request supersedes the previous one: its task is aborted and a result it might still
/// deliver is discarded, so the state always belongs to the handle requested last. Without a
/// handle the state is empty and never loading.
///
/// Every session transition clears the permissions and lists them again under the new session.
///
/// Requests spawn onto the tokio runtime the hook is used on. Dropping the hook aborts work in
/// flight.
pub struct PermissionsHook<A, C> {
    resolver: PermissionResolver<C>,
    handle: Option<AccessControlHandle<A>>,
    generation: Arc<AtomicU64>,
    state: Arc<watch::Sender<PermissionsState>>,
    task: Option<JoinHandle<()>>,
}

impl<A, C> PermissionsHook<A, C>
where
    A: AccessControl,
    C: Connector,
{
    pub fn new(resolver: PermissionResolver<C>) -> Self {
        let (state, _) = watch::channel(PermissionsState::default());

        Self {
            resolver,
            handle: None,
            generation: Arc::new(AtomicU64::new(0)),
            state: Arc::new(state),
            task: None,
        }
    }

    pub fn state(&self) -> PermissionsState {
        self.state.borrow().clone()
    }

    /// Subscribe to state changes.
    pub fn subscribe(&self) -> watch::Receiver<PermissionsState> {
        self.state.subscribe()
    }

    pub fn handle(&self) -> Option<&AccessControlHandle<A>> {
        self.handle.as_ref()
    }

    /// Selects another handle. Selecting the handle already selected does nothing.
    pub fn update(&mut self, handle: Option<AccessControlHandle<A>>) {
        let unchanged = match (&self.handle, &handle) {
            (None, None) => true,
            (Some(current), Some(next)) => current.same_as(next),
            _ => false,
        };
        if unchanged {
            return;
        }

        self.handle = handle;
        self.run(false);
    }

    /// Lists the permissions of the selected handle again from the remote access-control data,
    /// keeping the current value visible while loading.
    pub fn refresh(&mut self) {
        if let Some(handle) = &self.handle {
            self.resolver.invalidate(handle.resource());
        }
        self.run(true);
    }

    fn run(&mut self, keep_permissions: bool) {
        if let Some(task) = self.task.take() {
            task.abort();
        }

        let mut generation = 0;
        let has_handle = self.handle.is_some();
        self.state.send_modify(|state| {
            generation = self.generation.fetch_add(1, Ordering::SeqCst) + 1;

            if !has_handle {
                *state = PermissionsState::default();
                return;
            }

            state.is_loading = true;
            state.error = None;
            if !keep_permissions {
                state.permissions = None;
            }
        });

        let Some(handle) = self.handle.clone() else {
            trace!(generation, "no handle selected");
            return;
        };

        debug!(generation, resource = %handle.resource(), "list permissions");

        let request = Request {
            resolver: self.resolver.clone(),
            handle,
            generation,
            current: self.generation.clone(),
            state: self.state.clone(),
        };
        self.task = Some(tokio::spawn(request.run()));
    }
}

/// Work of one request, alive until it gets superseded.
struct Request<A, C> {
    resolver: PermissionResolver<C>,
    handle: AccessControlHandle<A>,
    generation: u64,
    current: Arc<AtomicU64>,
    state: Arc<watch::Sender<PermissionsState>>,
}

impl<A, C> Request<A, C>
where
    A: AccessControl,
    C: Connector,
{
    /// Lists the permissions and lists them again on every session transition, so the state
    /// never shows permissions read under a previous identity.
    async fn run(self) {
        let mut transitions = self.resolver.reader().session().subscribe();

        loop {
            let result = self.list_when_ready(&mut transitions).await;

            let committed = self.commit(|state| {
                match result {
                    Ok(permissions) => state.permissions = Some(permissions),
                    Err(err) => state.error = Some(err),
                }
                state.is_loading = false;
            });
            if !committed {
                trace!(generation = self.generation, "discard superseded permissions");
                return;
            }

            if !next_transition(&mut transitions).await {
                return;
            }

            debug!(
                generation = self.generation,
                resource = %self.handle.resource(),
                "session changed, list permissions again"
            );

            let committed = self.commit(|state| {
                *state = PermissionsState {
                    permissions: None,
                    is_loading: true,
                    error: None,
                };
            });
            if !committed {
                return;
            }
        }
    }

    /// Lists permissions, waiting for the session to resolve first if it is still loading.
    async fn list_when_ready(
        &self,
        transitions: &mut broadcast::Receiver<SessionState>,
    ) -> Result<Vec<Permission>, FetchError> {
        loop {
            // The listing reads the current session, transitions up to now are covered by it.
            drain(transitions);

            match self.resolver.list_permissions(&self.handle).await {
                Err(FetchError::AuthNotReady) => {
                    if !next_transition(transitions).await {
                        return Err(FetchError::AuthNotReady);
                    }
                }
                result => return result,
            }
        }
    }

    /// Applies `change` unless a newer request superseded this one.
    fn commit<F>(&self, change: F) -> bool
    where
        F: FnOnce(&mut PermissionsState),
    {
        self.state.send_if_modified(|state| {
            if self.current.load(Ordering::SeqCst) != self.generation {
                return false;
            }

            change(state);
            true
        })
    }
}

/// Waits for the next session transition, false if the session is gone.
async fn next_transition(transitions: &mut broadcast::Receiver<SessionState>) -> bool {
    match transitions.recv().await {
        Ok(_) | Err(RecvError::Lagged(_)) => true,
        Err(RecvError::Closed) => false,
    }
}

fn drain(transitions: &mut broadcast::Receiver<SessionState>) {
    loop {
        match transitions.try_recv() {
            Ok(_) | Err(TryRecvError::Lagged(_)) => continue,
            Err(TryRecvError::Empty) | Err(TryRecvError::Closed) => return,
        }
    }
}

impl<A, C> Drop for PermissionsHook<A, C> {
    fn drop(&mut self) {
        if let Some(task) = self.task.take() {
            task.abort();
        }
    }
}

impl<A, C> Debug for PermissionsHook<A, C> {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PermissionsHook")
            .field("handle", &self.handle.as_ref().map(|handle| handle.id()))
            .field("generation", &self.generation.load(Ordering::SeqCst))
            .field("state", &*self.state.borrow())
            .finish()
    }
}
