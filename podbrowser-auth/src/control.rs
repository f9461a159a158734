// SPDX-License-Identifier: MIT OR Apache-2.0

use std::fmt::{Debug, Formatter};
use std::future::Future;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

use podbrowser_core::{FetchError, Iri, WebId};
use serde::{Deserialize, Serialize};

use crate::access::AccessModes;

/// Raw access-control entry as stored in the remote access-control resource.
///
/// The same agent may appear in several entries.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Grant {
    pub web_id: WebId,
    pub modes: AccessModes,
}

impl Grant {
    pub fn new(web_id: WebId, modes: AccessModes) -> Self {
        Self { web_id, modes }
    }
}

/// Access-control data of one resource, supplied by an access-control client.
///
/// The remote access-control resource is the source of truth. Each write is expected to be
/// atomic: it either takes effect completely or fails without changes.
pub trait AccessControl: Send + Sync + 'static {
    /// Resource this access-control data governs.
    fn resource(&self) -> &Iri;

    fn list_raw(&self) -> impl Future<Output = Result<Vec<Grant>, FetchError>> + Send;

    /// Adds `modes` to what `web_id` is already granted.
    fn grant(
        &self,
        web_id: &WebId,
        modes: AccessModes,
    ) -> impl Future<Output = Result<(), FetchError>> + Send;

    /// Replaces everything `web_id` is granted with exactly `modes`.
    fn modify(
        &self,
        web_id: &WebId,
        modes: AccessModes,
    ) -> impl Future<Output = Result<(), FetchError>> + Send;

    /// Removes `modes` from `web_id`. Agents left without any mode are removed.
    fn revoke(
        &self,
        web_id: &WebId,
        modes: AccessModes,
    ) -> impl Future<Output = Result<(), FetchError>> + Send;
}

/// Process-unique identity of an [`AccessControlHandle`].
pub type HandleId = u64;

static NEXT_HANDLE_ID: AtomicU64 = AtomicU64::new(1);

/// Shared handle on access-control data with a stable identity.
///
/// Clones keep the identity of the handle they were cloned from, every call to
/// [`AccessControlHandle::new`] creates a new one. Cached permission listings are bound to this
/// identity.
pub struct AccessControlHandle<A> {
    id: HandleId,
    inner: Arc<A>,
}

impl<A> Clone for AccessControlHandle<A> {
    fn clone(&self) -> Self {
        Self {
            id: self.id,
            inner: self.inner.clone(),
        }
    }
}

impl<A> Debug for AccessControlHandle<A>
where
    A: AccessControl,
{
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AccessControlHandle")
            .field("id", &self.id)
            .field("resource", self.inner.resource())
            .finish()
    }
}

impl<A> AccessControlHandle<A> {
    pub fn id(&self) -> HandleId {
        self.id
    }

    pub fn same_as(&self, other: &Self) -> bool {
        self.id == other.id
    }
}

impl<A> AccessControlHandle<A>
where
    A: AccessControl,
{
    pub fn new(access_control: A) -> Self {
        Self {
            id: NEXT_HANDLE_ID.fetch_add(1, Ordering::Relaxed),
            inner: Arc::new(access_control),
        }
    }

    pub fn resource(&self) -> &Iri {
        self.inner.resource()
    }

    pub fn access_control(&self) -> &A {
        &self.inner
    }
}

#[cfg(test)]
mod tests {
    use crate::test_utils::MockAccessControl;

    use super::AccessControlHandle;

    #[test]
    fn identity_follows_construction() {
        let resource = "https://pod.example.com/notes/".parse().unwrap();

        let handle = AccessControlHandle::new(MockAccessControl::new(&resource));
        let clone = handle.clone();
        let other = AccessControlHandle::new(MockAccessControl::new(&resource));

        assert!(handle.same_as(&clone));
        assert!(!handle.same_as(&other));
        assert_eq!(handle.resource(), other.resource());
    }
}
