// SPDX-License-Identifier: MIT OR Apache-2.0

use std::time::Duration;

use serde::{Deserialize, Serialize};

/// When a resolved cache entry gets fetched again.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub enum Revalidate {
    /// Resolved values are served until they get invalidated explicitly.
    #[default]
    Never,

    /// Every read issues a new request, concurrent reads still share one request.
    Always,

    /// Resolved values older than the given duration are fetched again.
    After(Duration),
}

impl Revalidate {
    pub(crate) fn is_stale(&self, age: Duration) -> bool {
        match self {
            Revalidate::Never => false,
            Revalidate::Always => true,
            Revalidate::After(max_age) => age >= *max_age,
        }
    }
}

/// Configuration for a fetch cache.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CacheConfig {
    /// Revalidation policy used when a call site does not override it.
    pub revalidate: Revalidate,
}

impl CacheConfig {
    pub fn new(revalidate: Revalidate) -> Self {
        Self { revalidate }
    }
}

/// Per call-site options for a read.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct ReadOptions {
    pub revalidate: Option<Revalidate>,
}

impl ReadOptions {
    pub fn revalidate(policy: Revalidate) -> Self {
        Self {
            revalidate: Some(policy),
        }
    }

    /// Bypass any resolved value and fetch again.
    pub fn force() -> Self {
        Self::revalidate(Revalidate::Always)
    }
}
