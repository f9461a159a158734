// SPDX-License-Identifier: MIT OR Apache-2.0

use std::future::Future;

use podbrowser_core::{Dataset, Fetch, FetchError, Iri, Profile, ResourceInfo, WebId};

/// Remote-read primitives of a Solid protocol client.
///
/// Every read receives the fetch it has to use, implementations never hold on to credentials
/// themselves. Failures should be mapped onto [`FetchError`] so callers can tell a missing
/// resource apart from a denied or failed request.
pub trait Connector: Send + Sync + 'static {
    /// Downloads and parses the resource at `iri`.
    fn get_solid_dataset<F: Fetch>(
        &self,
        iri: &Iri,
        fetch: &F,
    ) -> impl Future<Output = Result<Dataset, FetchError>> + Send;

    /// Reads metadata of the resource at `iri` without downloading its contents.
    fn get_resource_info<F: Fetch>(
        &self,
        iri: &Iri,
        fetch: &F,
    ) -> impl Future<Output = Result<ResourceInfo, FetchError>> + Send;

    fn fetch_profile<F: Fetch>(
        &self,
        web_id: &WebId,
        fetch: &F,
    ) -> impl Future<Output = Result<Profile, FetchError>> + Send;
}
