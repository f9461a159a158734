// SPDX-License-Identifier: MIT OR Apache-2.0

//! Shared data types for authenticated access to resources stored in a Solid Pod.
//!
//! This crate holds the vocabulary every other part of the data-access layer speaks: validated
//! identifiers for resources and agents ([`Iri`], [`WebId`]), the [`Fetch`] abstraction through
//! which all network traffic flows, the read models returned by remote reads and the
//! [`FetchError`] taxonomy.
mod error;
mod fetch;
mod iri;
mod resource;
#[cfg(any(test, feature = "test_utils"))]
pub mod test_utils;

pub use error::FetchError;
pub use fetch::{Fetch, Method, Request, Response};
pub use iri::{Iri, IriError, WebId, is_unresolved};
pub use resource::{Dataset, Profile, ResourceInfo};
