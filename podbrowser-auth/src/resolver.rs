// SPDX-License-Identifier: MIT OR Apache-2.0

//! Effective permissions per resource, derived from raw access-control entries.
use std::collections::HashMap;
use std::fmt::{Debug, Formatter};

use futures_util::future::join_all;
use podbrowser_client::{Connector, FetchCache, PodReader, SessionId};
use podbrowser_core::{FetchError, Iri, Profile, WebId};
use thiserror::Error;
use tracing::{debug, warn};

use crate::access::AccessModes;
use crate::control::{AccessControl, AccessControlHandle, HandleId};

/// Everything one agent may do on a resource.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Permission {
    pub web_id: WebId,
    pub modes: AccessModes,

    /// Profile of the agent, `None` if it could not be fetched.
    pub profile: Option<Profile>,
}

#[derive(Clone, Debug, PartialEq, Eq, Hash)]
struct ListingKey {
    session_id: SessionId,
    resource: Iri,
    handle: HandleId,
}

/// Lists and changes who has access to a resource.
///
/// Listings are cached per access-control handle. Every successful change invalidates all
/// cached listings of the changed resource, so the next listing reflects it.
pub struct PermissionResolver<C> {
    reader: PodReader<C>,
    listings: FetchCache<ListingKey, Vec<Permission>>,
}

impl<C> Clone for PermissionResolver<C> {
    fn clone(&self) -> Self {
        Self {
            reader: self.reader.clone(),
            listings: self.listings.clone(),
        }
    }
}

impl<C> Debug for PermissionResolver<C> {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PermissionResolver")
            .field("reader", &self.reader)
            .field("listings", &self.listings.len())
            .finish()
    }
}

impl<C> PermissionResolver<C>
where
    C: Connector,
{
    pub fn new(reader: PodReader<C>) -> Self {
        Self {
            reader,
            listings: FetchCache::default(),
        }
    }

    pub fn reader(&self) -> &PodReader<C> {
        &self.reader
    }

    /// Effective permissions of every agent on the handle's resource, in the order agents first
    /// appear in the access-control data.
    ///
    /// Modes granted to one agent in several entries are merged. Profiles of all agents are
    /// fetched concurrently.
    pub async fn list_permissions<A>(
        &self,
        handle: &AccessControlHandle<A>,
    ) -> Result<Vec<Permission>, FetchError>
    where
        A: AccessControl,
    {
        let key = self.listing_key(handle)?;

        let fetcher = {
            let reader = self.reader.clone();
            let handle = handle.clone();
            move || async move { resolve(&reader, &handle).await }
        };

        let permissions = self.listings.get(Some(key), fetcher).await?;
        Ok(permissions.unwrap_or_default())
    }

    /// Permission of a single agent, `None` if the agent has no access.
    pub async fn permission_for<A>(
        &self,
        handle: &AccessControlHandle<A>,
        web_id: &WebId,
    ) -> Result<Option<Permission>, FetchError>
    where
        A: AccessControl,
    {
        let permissions = self.list_permissions(handle).await?;
        Ok(permissions
            .into_iter()
            .find(|permission| &permission.web_id == web_id))
    }

    /// Adds `modes` to what `web_id` may do on the handle's resource.
    pub async fn grant<A>(
        &self,
        handle: &AccessControlHandle<A>,
        web_id: &WebId,
        modes: AccessModes,
    ) -> Result<(), PermissionError>
    where
        A: AccessControl,
    {
        self.ensure_writable(web_id, modes)?;
        handle.access_control().grant(web_id, modes).await?;
        debug!(resource = %handle.resource(), %web_id, %modes, "granted access");
        self.invalidate(handle.resource());
        Ok(())
    }

    /// Sets what `web_id` may do on the handle's resource to exactly `modes`.
    pub async fn modify<A>(
        &self,
        handle: &AccessControlHandle<A>,
        web_id: &WebId,
        modes: AccessModes,
    ) -> Result<(), PermissionError>
    where
        A: AccessControl,
    {
        self.ensure_writable(web_id, modes)?;
        handle.access_control().modify(web_id, modes).await?;
        debug!(resource = %handle.resource(), %web_id, %modes, "modified access");
        self.invalidate(handle.resource());
        Ok(())
    }

    /// Takes `modes` away from `web_id` on the handle's resource.
    pub async fn revoke<A>(
        &self,
        handle: &AccessControlHandle<A>,
        web_id: &WebId,
        modes: AccessModes,
    ) -> Result<(), PermissionError>
    where
        A: AccessControl,
    {
        self.ensure_writable(web_id, modes)?;
        handle.access_control().revoke(web_id, modes).await?;
        debug!(resource = %handle.resource(), %web_id, %modes, "revoked access");
        self.invalidate(handle.resource());
        Ok(())
    }

    /// Drops every cached listing of `resource`, regardless of the handle it was read through.
    pub fn invalidate(&self, resource: &Iri) -> usize {
        self.listings
            .invalidate_where(|key| &key.resource == resource)
    }

    fn listing_key<A>(&self, handle: &AccessControlHandle<A>) -> Result<ListingKey, FetchError>
    where
        A: AccessControl,
    {
        let state = self.reader.session().state();
        if state.is_loading {
            return Err(FetchError::AuthNotReady);
        }

        // Listings of earlier sessions are never read again.
        self.listings
            .invalidate_where(|key| key.session_id < state.session_id);

        Ok(ListingKey {
            session_id: state.session_id,
            resource: handle.resource().clone(),
            handle: handle.id(),
        })
    }

    fn ensure_writable(&self, web_id: &WebId, modes: AccessModes) -> Result<(), PermissionError> {
        if self.reader.session().is_loading() {
            return Err(PermissionError::AuthNotReady);
        }

        if modes.is_empty() {
            return Err(PermissionError::EmptyModes(web_id.clone()));
        }

        Ok(())
    }
}

/// Reads the raw entries, merges them per agent and attaches profiles.
async fn resolve<C, A>(
    reader: &PodReader<C>,
    handle: &AccessControlHandle<A>,
) -> Result<Vec<Permission>, FetchError>
where
    C: Connector,
    A: AccessControl,
{
    let grants = handle.access_control().list_raw().await?;

    let mut permissions: Vec<Permission> = Vec::with_capacity(grants.len());
    {
        let mut positions: HashMap<WebId, usize> = HashMap::new();

        for grant in grants {
            match positions.get(&grant.web_id) {
                Some(&position) => {
                    let merged = permissions[position].modes.union(grant.modes);
                    permissions[position].modes = merged;
                }
                None => {
                    positions.insert(grant.web_id.clone(), permissions.len());
                    permissions.push(Permission {
                        web_id: grant.web_id,
                        modes: grant.modes,
                        profile: None,
                    });
                }
            }
        }
    }

    permissions.retain(|permission| !permission.modes.is_empty());

    let profiles = join_all(
        permissions
            .iter()
            .map(|permission| reader.profile(Some(permission.web_id.as_str()))),
    )
    .await;

    for (permission, profile) in permissions.iter_mut().zip(profiles) {
        match profile {
            Ok(profile) => permission.profile = profile,
            Err(err) => {
                warn!(web_id = %permission.web_id, %err, "failed fetching profile");
            }
        }
    }

    debug!(
        resource = %handle.resource(),
        agents = permissions.len(),
        "resolved permissions"
    );

    Ok(permissions)
}

#[derive(Clone, Debug, PartialEq, Eq, Error)]
pub enum PermissionError {
    #[error("session is still loading")]
    AuthNotReady,

    #[error("no access modes given for {0}, revoke access instead")]
    EmptyModes(WebId),

    #[error(transparent)]
    Fetch(#[from] FetchError),
}
