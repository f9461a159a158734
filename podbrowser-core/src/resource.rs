// SPDX-License-Identifier: MIT OR Apache-2.0

//! Read models returned by the remote-read primitives.
use serde::{Deserialize, Serialize};

use crate::{Iri, WebId};

/// Parsed contents of a remote resource.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Dataset {
    pub iri: Iri,

    /// Resources listed as members when the dataset describes a container.
    pub contains: Vec<Iri>,
}

impl Dataset {
    pub fn new(iri: Iri) -> Self {
        Self {
            iri,
            contains: Vec::new(),
        }
    }

    pub fn with_contains(mut self, contains: Vec<Iri>) -> Self {
        self.contains = contains;
        self
    }
}

/// Metadata of a remote resource, obtained without downloading its contents.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ResourceInfo {
    pub iri: Iri,
    pub content_type: Option<String>,
    pub content_length: Option<u64>,
    pub is_container: bool,

    /// Location of the access-control resource governing this resource, if advertised.
    pub acl: Option<Iri>,
}

impl ResourceInfo {
    pub fn new(iri: Iri) -> Self {
        let is_container = iri.is_container();
        Self {
            iri,
            content_type: None,
            content_length: None,
            is_container,
            acl: None,
        }
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Profile {
    pub web_id: WebId,
    pub name: Option<String>,
    pub avatar: Option<Iri>,

    /// Storage roots this agent advertises.
    pub storages: Vec<Iri>,
}

impl Profile {
    pub fn new(web_id: WebId) -> Self {
        Self {
            web_id,
            name: None,
            avatar: None,
            storages: Vec::new(),
        }
    }

    pub fn with_name(mut self, name: &str) -> Self {
        self.name = Some(name.to_string());
        self
    }

    /// Name to show for this agent, falls back to the WebID.
    pub fn display_name(&self) -> &str {
        match &self.name {
            Some(name) if !name.trim().is_empty() => name,
            _ => self.web_id.as_str(),
        }
    }
}

#[cfg(test)]
mod tests {
    use crate::WebId;

    use super::Profile;

    #[test]
    fn display_name_falls_back_to_web_id() {
        let web_id: WebId = "https://alice.example.com/profile/card#me".parse().unwrap();

        let profile = Profile::new(web_id.clone());
        assert_eq!(profile.display_name(), web_id.as_str());

        let profile = Profile::new(web_id.clone()).with_name("  ");
        assert_eq!(profile.display_name(), web_id.as_str());

        let profile = Profile::new(web_id).with_name("Alice");
        assert_eq!(profile.display_name(), "Alice");
    }
}
