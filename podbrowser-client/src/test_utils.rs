// SPDX-License-Identifier: MIT OR Apache-2.0

//! Test utilities for mocking the protocol client and authentication collaborators.
use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard};

use podbrowser_core::test_utils::MockFetch;
use podbrowser_core::{
    Dataset, Fetch, FetchError, Iri, Profile, Request, ResourceInfo, WebId,
};

use crate::reader::Operation;
use crate::session::{AuthProvider, Login};

pub fn setup_logging() {
    if std::env::var("RUST_LOG").is_ok() {
        let _ = tracing_subscriber::fmt()
            .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
            .try_init();
    }
}

#[derive(Debug, Default)]
struct MockConnectorState {
    calls: Vec<(Operation, Iri)>,
    datasets: HashMap<Iri, Dataset>,
    resource_info: HashMap<Iri, ResourceInfo>,
    profiles: HashMap<WebId, Profile>,
    failures: HashMap<Iri, FetchError>,
}

/// Connector issuing one request per read through the given fetch and answering with
/// programmable read models.
///
/// Responses of the fetch are checked for errors first, so failures can be injected both on the
/// fetch and on the connector. Unknown resources resolve to empty read models.
#[derive(Clone, Debug, Default)]
pub struct MockConnector {
    state: Arc<Mutex<MockConnectorState>>,
}

impl MockConnector {
    pub fn insert_dataset(&self, dataset: Dataset) {
        self.state().datasets.insert(dataset.iri.clone(), dataset);
    }

    pub fn insert_resource_info(&self, info: ResourceInfo) {
        self.state().resource_info.insert(info.iri.clone(), info);
    }

    pub fn insert_profile(&self, profile: Profile) {
        self.state()
            .profiles
            .insert(profile.web_id.clone(), profile);
    }

    /// Let every read of `iri` fail with `err`.
    pub fn fail(&self, iri: &Iri, err: FetchError) {
        self.state().failures.insert(iri.clone(), err);
    }

    pub fn recover(&self, iri: &Iri) {
        self.state().failures.remove(iri);
    }

    /// Number of reads issued for an operation.
    pub fn calls(&self, operation: Operation) -> usize {
        self.state()
            .calls
            .iter()
            .filter(|(called, _)| *called == operation)
            .count()
    }

    pub fn calls_for(&self, operation: Operation, iri: &Iri) -> usize {
        self.state()
            .calls
            .iter()
            .filter(|(called, target)| *called == operation && target == iri)
            .count()
    }

    pub fn total_calls(&self) -> usize {
        self.state().calls.len()
    }

    fn state(&self) -> MutexGuard<'_, MockConnectorState> {
        self.state.lock().expect("acquire mock connector state")
    }

    /// Records the call and returns an injected failure, if any.
    fn record(&self, operation: Operation, iri: &Iri) -> Option<FetchError> {
        let mut state = self.state();
        state.calls.push((operation, iri.clone()));
        state.failures.get(iri).cloned()
    }
}

impl crate::Connector for MockConnector {
    async fn get_solid_dataset<F: Fetch>(
        &self,
        iri: &Iri,
        fetch: &F,
    ) -> Result<Dataset, FetchError> {
        let failure = self.record(Operation::GetDataset, iri);

        let request = Request::get(iri.clone()).with_header("accept", "text/turtle");
        fetch.fetch(request).await?.error_for_status()?;

        if let Some(err) = failure {
            return Err(err);
        }

        let dataset = self.state().datasets.get(iri).cloned();
        Ok(dataset.unwrap_or_else(|| Dataset::new(iri.clone())))
    }

    async fn get_resource_info<F: Fetch>(
        &self,
        iri: &Iri,
        fetch: &F,
    ) -> Result<ResourceInfo, FetchError> {
        let failure = self.record(Operation::GetResourceInfo, iri);

        fetch.fetch(Request::head(iri.clone())).await?.error_for_status()?;

        if let Some(err) = failure {
            return Err(err);
        }

        let info = self.state().resource_info.get(iri).cloned();
        Ok(info.unwrap_or_else(|| ResourceInfo::new(iri.clone())))
    }

    async fn fetch_profile<F: Fetch>(
        &self,
        web_id: &WebId,
        fetch: &F,
    ) -> Result<Profile, FetchError> {
        let failure = self.record(Operation::GetProfile, web_id.as_iri());

        fetch
            .fetch(Request::get(web_id.as_iri().clone()))
            .await?
            .error_for_status()?;

        if let Some(err) = failure {
            return Err(err);
        }

        let profile = self.state().profiles.get(web_id).cloned();
        Ok(profile.unwrap_or_else(|| Profile::new(web_id.clone())))
    }
}

/// Authentication collaborator with a fixed outcome.
#[derive(Clone, Debug)]
pub struct MockAuthProvider {
    outcome: Result<Option<WebId>, FetchError>,
}

impl MockAuthProvider {
    pub fn logged_in(web_id: &WebId) -> Self {
        Self {
            outcome: Ok(Some(web_id.clone())),
        }
    }

    pub fn anonymous() -> Self {
        Self { outcome: Ok(None) }
    }

    pub fn failing(err: FetchError) -> Self {
        Self { outcome: Err(err) }
    }
}

impl AuthProvider for MockAuthProvider {
    async fn restore(&self) -> Result<Option<Login>, FetchError> {
        let web_id = self.outcome.clone()?;
        Ok(web_id.map(|web_id| Login::new(web_id.clone(), MockFetch::for_identity(&web_id))))
    }
}
