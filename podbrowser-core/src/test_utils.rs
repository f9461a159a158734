// SPDX-License-Identifier: MIT OR Apache-2.0

//! Test utilities for mocking fetch implementations.
use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use futures_util::FutureExt;
use futures_util::future::BoxFuture;

use crate::{Fetch, FetchError, Iri, Request, Response, WebId};

#[derive(Debug, Default)]
struct MockFetchState {
    requests: Vec<Request>,
    responses: HashMap<Iri, Result<u16, FetchError>>,
}

/// Fetch which records every request and answers with programmable status codes.
///
/// Unknown urls are answered with `200`. Every response carries an `x-mock-identity` header
/// naming the identity the mock was created for, so tests can tell which fetch served a request.
#[derive(Clone, Debug, Default)]
pub struct MockFetch {
    identity: Option<WebId>,
    state: Arc<Mutex<MockFetchState>>,
}

impl MockFetch {
    pub fn anonymous() -> Self {
        Self::default()
    }

    pub fn for_identity(web_id: &WebId) -> Self {
        Self {
            identity: Some(web_id.clone()),
            state: Arc::default(),
        }
    }

    pub fn identity(&self) -> Option<&WebId> {
        self.identity.as_ref()
    }

    pub fn respond_with(&self, url: &Iri, status: u16) {
        self.state
            .lock()
            .expect("acquire mock fetch state")
            .responses
            .insert(url.clone(), Ok(status));
    }

    pub fn fail_with(&self, url: &Iri, err: FetchError) {
        self.state
            .lock()
            .expect("acquire mock fetch state")
            .responses
            .insert(url.clone(), Err(err));
    }

    pub fn requests(&self) -> Vec<Request> {
        self.state
            .lock()
            .expect("acquire mock fetch state")
            .requests
            .clone()
    }
}

impl Fetch for MockFetch {
    fn fetch(&self, request: Request) -> BoxFuture<'static, Result<Response, FetchError>> {
        let result = {
            let mut state = self.state.lock().expect("acquire mock fetch state");
            let outcome = state
                .responses
                .get(&request.url)
                .cloned()
                .unwrap_or(Ok(200));
            let url = request.url.clone();
            state.requests.push(request);
            outcome.map(|status| {
                let identity = self
                    .identity
                    .as_ref()
                    .map(|web_id| web_id.to_string())
                    .unwrap_or_default();
                Response::new(url, status).with_header("x-mock-identity", &identity)
            })
        };

        async move { result }.boxed()
    }
}
