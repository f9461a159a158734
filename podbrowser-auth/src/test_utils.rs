// SPDX-License-Identifier: MIT OR Apache-2.0

//! Test utilities for mocking access-control clients.
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};

use podbrowser_core::{FetchError, Iri, WebId};
use tokio::sync::Semaphore;

use crate::access::AccessModes;
use crate::control::{AccessControl, Grant};

pub use podbrowser_client::test_utils::setup_logging;

#[derive(Debug, Default)]
struct MockAccessControlState {
    grants: Vec<Grant>,
    read_failure: Option<FetchError>,
    write_failure: Option<FetchError>,
}

#[derive(Debug)]
struct Inner {
    resource: Iri,
    state: Mutex<MockAccessControlState>,
    list_calls: AtomicUsize,

    /// When set, every listing waits for a permit released by the test.
    gate: Option<Semaphore>,
}

/// In-memory access-control data of a single resource.
///
/// Writes change the stored entries the way a remote access-control resource would. Clones share
/// the same data.
#[derive(Clone, Debug)]
pub struct MockAccessControl {
    inner: Arc<Inner>,
}

impl MockAccessControl {
    pub fn new(resource: &Iri) -> Self {
        Self::with_grants(resource, Vec::new())
    }

    pub fn with_grants(resource: &Iri, grants: Vec<Grant>) -> Self {
        Self::build(resource, grants, None)
    }

    /// Listings block until [`MockAccessControl::release`] is called, once per listing.
    pub fn gated(resource: &Iri, grants: Vec<Grant>) -> Self {
        Self::build(resource, grants, Some(Semaphore::new(0)))
    }

    fn build(resource: &Iri, grants: Vec<Grant>, gate: Option<Semaphore>) -> Self {
        Self {
            inner: Arc::new(Inner {
                resource: resource.clone(),
                state: Mutex::new(MockAccessControlState {
                    grants,
                    ..Default::default()
                }),
                list_calls: AtomicUsize::new(0),
                gate,
            }),
        }
    }

    /// Lets one waiting (or the next) listing through.
    pub fn release(&self) {
        if let Some(gate) = &self.inner.gate {
            gate.add_permits(1);
        }
    }

    pub fn list_calls(&self) -> usize {
        self.inner.list_calls.load(Ordering::SeqCst)
    }

    /// Raw entries as currently stored.
    pub fn grants(&self) -> Vec<Grant> {
        self.state().grants.clone()
    }

    pub fn fail_reads(&self, err: FetchError) {
        self.state().read_failure = Some(err);
    }

    pub fn fail_writes(&self, err: FetchError) {
        self.state().write_failure = Some(err);
    }

    pub fn recover(&self) {
        let mut state = self.state();
        state.read_failure = None;
        state.write_failure = None;
    }

    fn state(&self) -> MutexGuard<'_, MockAccessControlState> {
        self.inner
            .state
            .lock()
            .expect("acquire mock access control state")
    }

    /// Applies `change` to the current modes of `web_id`, collapsing its entries into one.
    fn write<F>(&self, web_id: &WebId, change: F) -> Result<(), FetchError>
    where
        F: FnOnce(AccessModes) -> AccessModes,
    {
        let mut state = self.state();
        if let Some(err) = &state.write_failure {
            return Err(err.clone());
        }

        let position = state
            .grants
            .iter()
            .position(|grant| &grant.web_id == web_id);
        let current = state
            .grants
            .iter()
            .filter(|grant| &grant.web_id == web_id)
            .fold(AccessModes::empty(), |modes, grant| modes.union(grant.modes));
        let modes = change(current);

        state.grants.retain(|grant| &grant.web_id != web_id);
        if !modes.is_empty() {
            let grant = Grant::new(web_id.clone(), modes);
            match position {
                Some(position) => state.grants.insert(position, grant),
                None => state.grants.push(grant),
            }
        }

        Ok(())
    }
}

impl AccessControl for MockAccessControl {
    fn resource(&self) -> &Iri {
        &self.inner.resource
    }

    async fn list_raw(&self) -> Result<Vec<Grant>, FetchError> {
        self.inner.list_calls.fetch_add(1, Ordering::SeqCst);

        if let Some(gate) = &self.inner.gate {
            gate.acquire()
                .await
                .expect("gate semaphore is never closed")
                .forget();
        }

        let state = self.state();
        match &state.read_failure {
            Some(err) => Err(err.clone()),
            None => Ok(state.grants.clone()),
        }
    }

    async fn grant(&self, web_id: &WebId, modes: AccessModes) -> Result<(), FetchError> {
        self.write(web_id, |current| current.union(modes))
    }

    async fn modify(&self, web_id: &WebId, modes: AccessModes) -> Result<(), FetchError> {
        self.write(web_id, |_| modes)
    }

    async fn revoke(&self, web_id: &WebId, modes: AccessModes) -> Result<(), FetchError> {
        self.write(web_id, |current| current.difference(modes))
    }
}
