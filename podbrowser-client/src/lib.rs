// SPDX-License-Identifier: MIT OR Apache-2.0

//! Authenticated, deduplicated reads of resources stored in a Solid Pod.
//!
//! A [`Session`] holds the current identity and hands out the [`AuthenticatedFetch`] every
//! request goes through. [`PodReader`] offers typed reads (datasets, resource metadata,
//! profiles) on top of a [`FetchCache`], which makes sure identical reads issued by many
//! consumers result in a single request.
//!
//! The protocol client performing the actual reads is supplied by the application through the
//! [`Connector`] trait.
mod cache;
mod config;
mod connector;
mod reader;
mod session;
#[cfg(any(test, feature = "test_utils"))]
pub mod test_utils;

pub use cache::FetchCache;
pub use config::{CacheConfig, ReadOptions, Revalidate};
pub use connector::Connector;
pub use reader::{CacheKey, Operation, PodReader, PodReaderBuilder};
pub use session::{AuthProvider, AuthenticatedFetch, Login, Session, SessionId, SessionState};
