// SPDX-License-Identifier: MIT OR Apache-2.0

use std::fmt::{Display, Formatter};

use futures_util::future::BoxFuture;
use serde::{Deserialize, Serialize};

use crate::{FetchError, Iri};

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Method {
    Get,
    Head,
    Post,
    Put,
    Patch,
    Delete,
}

impl Display for Method {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            Method::Get => "GET",
            Method::Head => "HEAD",
            Method::Post => "POST",
            Method::Put => "PUT",
            Method::Patch => "PATCH",
            Method::Delete => "DELETE",
        };

        write!(f, "{}", s)
    }
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Request {
    pub url: Iri,
    pub method: Method,
    pub headers: Vec<(String, String)>,
    pub body: Option<Vec<u8>>,
}

impl Request {
    pub fn new(method: Method, url: Iri) -> Self {
        Self {
            url,
            method,
            headers: Vec::new(),
            body: None,
        }
    }

    pub fn get(url: Iri) -> Self {
        Self::new(Method::Get, url)
    }

    pub fn head(url: Iri) -> Self {
        Self::new(Method::Head, url)
    }

    pub fn with_header(mut self, name: &str, value: &str) -> Self {
        self.headers.push((name.to_string(), value.to_string()));
        self
    }

    pub fn with_body(mut self, body: Vec<u8>) -> Self {
        self.body = Some(body);
        self
    }

    /// Header lookup, case-insensitive on the name.
    pub fn header(&self, name: &str) -> Option<&str> {
        find_header(&self.headers, name)
    }
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Response {
    pub url: Iri,
    pub status: u16,
    pub headers: Vec<(String, String)>,
    pub body: Vec<u8>,
}

impl Response {
    pub fn new(url: Iri, status: u16) -> Self {
        Self {
            url,
            status,
            headers: Vec::new(),
            body: Vec::new(),
        }
    }

    pub fn with_header(mut self, name: &str, value: &str) -> Self {
        self.headers.push((name.to_string(), value.to_string()));
        self
    }

    pub fn with_body(mut self, body: Vec<u8>) -> Self {
        self.body = body;
        self
    }

    pub fn is_success(&self) -> bool {
        (200..300).contains(&self.status)
    }

    pub fn header(&self, name: &str) -> Option<&str> {
        find_header(&self.headers, name)
    }

    /// Turns non-successful responses into the matching [`FetchError`].
    pub fn error_for_status(self) -> Result<Self, FetchError> {
        match FetchError::from_status(&self.url, self.status) {
            Some(err) => Err(err),
            None => Ok(self),
        }
    }
}

fn find_header<'a>(headers: &'a [(String, String)], name: &str) -> Option<&'a str> {
    headers
        .iter()
        .find(|(key, _)| key.eq_ignore_ascii_case(name))
        .map(|(_, value)| value.as_str())
}

/// Performs HTTP requests against remote resources.
///
/// Implementations decide which credentials get attached. An implementation without an identity
/// behaves like a plain anonymous fetch.
pub trait Fetch: Send + Sync + 'static {
    fn fetch(&self, request: Request) -> BoxFuture<'static, Result<Response, FetchError>>;
}

#[cfg(test)]
mod tests {
    use crate::{FetchError, Iri};

    use super::{Method, Request, Response};

    #[test]
    fn headers_are_case_insensitive() {
        let url: Iri = "https://pod.example.com/".parse().unwrap();

        let request = Request::get(url.clone()).with_header("Accept", "text/turtle");
        assert_eq!(request.method, Method::Get);
        assert_eq!(request.header("accept"), Some("text/turtle"));
        assert_eq!(request.header("content-type"), None);

        let response = Response::new(url, 200).with_header("Content-Type", "text/turtle");
        assert_eq!(response.header("CONTENT-TYPE"), Some("text/turtle"));
    }

    #[test]
    fn error_for_status() {
        let url: Iri = "https://pod.example.com/private/".parse().unwrap();

        assert!(Response::new(url.clone(), 204).error_for_status().is_ok());
        assert_eq!(
            Response::new(url.clone(), 403).error_for_status(),
            Err(FetchError::PermissionDenied(url))
        );
    }
}
