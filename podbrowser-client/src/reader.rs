// SPDX-License-Identifier: MIT OR Apache-2.0

//! Typed reads of remote resources on top of the fetch cache.
use std::fmt::{Debug, Display, Formatter};
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

use podbrowser_core::{Dataset, FetchError, Iri, Profile, ResourceInfo, WebId};
use tracing::{debug, trace};

use crate::cache::FetchCache;
use crate::config::{CacheConfig, ReadOptions, Revalidate};
use crate::connector::Connector;
use crate::session::{AuthenticatedFetch, Session, SessionId};

/// Read operation a cache entry was produced by.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum Operation {
    GetDataset,
    GetResourceInfo,
    GetProfile,
}

impl Display for Operation {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            Operation::GetDataset => "GET_DATASET",
            Operation::GetResourceInfo => "GET_RESOURCE_INFO",
            Operation::GetProfile => "GET_PROFILE",
        };

        write!(f, "{}", s)
    }
}

/// Address of a cached read: the resource, the operation and the session it was read in.
///
/// Scoping keys by session guarantees that no read after a login or logout is ever served with
/// data fetched under another identity.
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub struct CacheKey {
    session_id: SessionId,
    iri: Iri,
    operation: Operation,
}

impl CacheKey {
    pub fn new(session_id: SessionId, iri: Iri, operation: Operation) -> Self {
        Self {
            session_id,
            iri,
            operation,
        }
    }

    pub fn session_id(&self) -> SessionId {
        self.session_id
    }

    pub fn iri(&self) -> &Iri {
        &self.iri
    }

    pub fn operation(&self) -> Operation {
        self.operation
    }
}

impl Display for CacheKey {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "[\"{}\", \"{}\"]", self.iri, self.operation)
    }
}

struct Inner<C> {
    session: Session,
    connector: Arc<C>,
    datasets: FetchCache<CacheKey, Dataset>,
    resource_info: FetchCache<CacheKey, ResourceInfo>,
    profiles: FetchCache<CacheKey, Profile>,

    /// Most recent session a read was issued in.
    observed_session: AtomicU64,
}

/// Reads datasets, resource metadata and profiles through the current session's fetch.
///
/// Reads for an absent or unresolved identifier, and reads while the session is still loading,
/// return `Ok(None)` without touching the network. Everything else goes through a
/// deduplicating [`FetchCache`] per read operation.
pub struct PodReader<C> {
    inner: Arc<Inner<C>>,
}

impl<C> Clone for PodReader<C> {
    fn clone(&self) -> Self {
        Self {
            inner: self.inner.clone(),
        }
    }
}

impl<C> Debug for PodReader<C> {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PodReader")
            .field("session", &self.inner.session)
            .field("datasets", &self.inner.datasets.len())
            .field("resource_info", &self.inner.resource_info.len())
            .field("profiles", &self.inner.profiles.len())
            .finish_non_exhaustive()
    }
}

impl<C> PodReader<C>
where
    C: Connector,
{
    pub fn new(session: Session, connector: C) -> Self {
        PodReaderBuilder::new(session, connector).build()
    }

    pub fn builder(session: Session, connector: C) -> PodReaderBuilder<C> {
        PodReaderBuilder::new(session, connector)
    }

    pub fn session(&self) -> &Session {
        &self.inner.session
    }

    pub fn connector(&self) -> &C {
        &self.inner.connector
    }

    pub async fn dataset(&self, iri: Option<&str>) -> Result<Option<Dataset>, FetchError> {
        self.dataset_with(iri, ReadOptions::default()).await
    }

    pub async fn dataset_with(
        &self,
        iri: Option<&str>,
        options: ReadOptions,
    ) -> Result<Option<Dataset>, FetchError> {
        let Some((key, fetch)) = self.prepare(iri, Operation::GetDataset)? else {
            return Ok(None);
        };

        let connector = self.inner.connector.clone();
        let target = key.iri.clone();

        self.inner
            .datasets
            .get_with(Some(key), options, move || async move {
                connector.get_solid_dataset(&target, &fetch).await
            })
            .await
    }

    pub async fn resource_info(
        &self,
        iri: Option<&str>,
    ) -> Result<Option<ResourceInfo>, FetchError> {
        self.resource_info_with(iri, ReadOptions::default()).await
    }

    pub async fn resource_info_with(
        &self,
        iri: Option<&str>,
        options: ReadOptions,
    ) -> Result<Option<ResourceInfo>, FetchError> {
        let Some((key, fetch)) = self.prepare(iri, Operation::GetResourceInfo)? else {
            return Ok(None);
        };

        let connector = self.inner.connector.clone();
        let target = key.iri.clone();

        self.inner
            .resource_info
            .get_with(Some(key), options, move || async move {
                connector.get_resource_info(&target, &fetch).await
            })
            .await
    }

    pub async fn profile(&self, web_id: Option<&str>) -> Result<Option<Profile>, FetchError> {
        self.profile_with(web_id, ReadOptions::default()).await
    }

    pub async fn profile_with(
        &self,
        web_id: Option<&str>,
        options: ReadOptions,
    ) -> Result<Option<Profile>, FetchError> {
        let Some((key, fetch)) = self.prepare(web_id, Operation::GetProfile)? else {
            return Ok(None);
        };

        let connector = self.inner.connector.clone();
        let target = WebId::from(key.iri.clone());

        self.inner
            .profiles
            .get_with(Some(key), options, move || async move {
                connector.fetch_profile(&target, &fetch).await
            })
            .await
    }

    /// Key a read of `identifier` would be cached under in the current session.
    ///
    /// `None` for absent or unresolved identifiers and while the session is loading.
    pub fn cache_key(
        &self,
        identifier: Option<&str>,
        operation: Operation,
    ) -> Result<Option<CacheKey>, FetchError> {
        Ok(self.prepare(identifier, operation)?.map(|(key, _)| key))
    }

    /// Returns true if a resolved value exists for `key`.
    pub fn is_cached(&self, key: &CacheKey) -> bool {
        match key.operation {
            Operation::GetDataset => self.inner.datasets.peek(key).is_some(),
            Operation::GetResourceInfo => self.inner.resource_info.peek(key).is_some(),
            Operation::GetProfile => self.inner.profiles.peek(key).is_some(),
        }
    }

    pub fn invalidate_dataset(&self, iri: &Iri) -> usize {
        self.inner
            .datasets
            .invalidate_where(|key| key.iri() == iri)
    }

    pub fn invalidate_resource_info(&self, iri: &Iri) -> usize {
        self.inner
            .resource_info
            .invalidate_where(|key| key.iri() == iri)
    }

    pub fn invalidate_profile(&self, web_id: &WebId) -> usize {
        self.inner
            .profiles
            .invalidate_where(|key| key.iri() == web_id.as_iri())
    }

    pub fn invalidate_all(&self) {
        self.inner.datasets.clear();
        self.inner.resource_info.clear();
        self.inner.profiles.clear();
    }

    /// Computes the cache key and picks up the fetch of the current session.
    fn prepare(
        &self,
        identifier: Option<&str>,
        operation: Operation,
    ) -> Result<Option<(CacheKey, AuthenticatedFetch)>, FetchError> {
        let Some(iri) = Iri::from_route_param(identifier)? else {
            trace!(%operation, "no identifier, skip read");
            return Ok(None);
        };

        let (state, fetch) = self.inner.session.snapshot();
        if state.is_loading {
            trace!(%operation, %iri, "session is loading, skip read");
            return Ok(None);
        }

        self.observe_session(state.session_id);

        Ok(Some((
            CacheKey::new(state.session_id, iri, operation),
            fetch,
        )))
    }

    /// Drops reads of earlier sessions once a newer session was seen.
    fn observe_session(&self, session_id: SessionId) {
        let previous = self
            .inner
            .observed_session
            .fetch_max(session_id, Ordering::AcqRel);

        if previous < session_id {
            let is_stale = |key: &CacheKey| key.session_id < session_id;
            let removed = self.inner.datasets.invalidate_where(is_stale)
                + self.inner.resource_info.invalidate_where(is_stale)
                + self.inner.profiles.invalidate_where(is_stale);

            debug!(session_id, removed, "purge reads of previous sessions");
        }
    }
}

/// Assembles a [`PodReader`].
pub struct PodReaderBuilder<C> {
    session: Session,
    connector: C,
    config: CacheConfig,
}

impl<C> Debug for PodReaderBuilder<C> {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PodReaderBuilder")
            .field("config", &self.config)
            .finish_non_exhaustive()
    }
}

impl<C> PodReaderBuilder<C>
where
    C: Connector,
{
    pub fn new(session: Session, connector: C) -> Self {
        Self {
            session,
            connector,
            config: CacheConfig::default(),
        }
    }

    pub fn cache_config(mut self, config: CacheConfig) -> Self {
        self.config = config;
        self
    }

    pub fn revalidate(mut self, policy: Revalidate) -> Self {
        self.config.revalidate = policy;
        self
    }

    pub fn build(self) -> PodReader<C> {
        let inner = Inner {
            session: self.session,
            connector: Arc::new(self.connector),
            datasets: FetchCache::new(self.config.clone()),
            resource_info: FetchCache::new(self.config.clone()),
            profiles: FetchCache::new(self.config),
            observed_session: AtomicU64::new(0),
        };

        PodReader {
            inner: Arc::new(inner),
        }
    }
}
