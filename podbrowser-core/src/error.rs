// SPDX-License-Identifier: MIT OR Apache-2.0

use std::fmt::Display;

use thiserror::Error;

use crate::{Iri, IriError};

/// Failures surfaced by reads and writes against a Pod.
///
/// Errors are cloneable so that a single failed request can be delivered to every caller which
/// was waiting for it.
#[derive(Clone, Debug, PartialEq, Eq, Error)]
pub enum FetchError {
    /// Session is still resolving, callers should treat this as "no data yet".
    #[error("session is still loading")]
    AuthNotReady,

    /// Request could not be completed. Re-invoking the read retries it.
    #[error("request to {url} failed: {reason}")]
    Network { url: String, reason: String },

    #[error("resource {0} not found")]
    NotFound(Iri),

    /// Remote store rejected the request for the current identity.
    #[error("access to {0} denied")]
    PermissionDenied(Iri),

    #[error("unexpected status {status} from {url}")]
    Status { url: Iri, status: u16 },

    #[error(transparent)]
    InvalidIri(#[from] IriError),
}

impl FetchError {
    pub fn network(url: impl Display, reason: impl Display) -> Self {
        Self::Network {
            url: url.to_string(),
            reason: reason.to_string(),
        }
    }

    /// Maps an HTTP status code onto the error taxonomy, `None` for successful responses.
    pub fn from_status(url: &Iri, status: u16) -> Option<Self> {
        match status {
            200..=299 => None,
            401 | 403 => Some(Self::PermissionDenied(url.clone())),
            404 | 410 => Some(Self::NotFound(url.clone())),
            _ => Some(Self::Status {
                url: url.clone(),
                status,
            }),
        }
    }

    /// Failures which might go away when the same request is issued again.
    pub fn is_retryable(&self) -> bool {
        match self {
            Self::Network { .. } => true,
            Self::Status { status, .. } => *status >= 500,
            _ => false,
        }
    }

    pub fn is_not_found(&self) -> bool {
        matches!(self, Self::NotFound(_))
    }
}
