// SPDX-License-Identifier: MIT OR Apache-2.0

//! Identifiers for remote resources and agents.
use std::fmt::{Display, Formatter};
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use thiserror::Error;

const SEPARATOR: char = '/';

/// Textual value an unresolved route parameter takes when it gets stringified on its way into
/// the data layer.
const UNDEFINED: &str = "undefined";

/// Returns true if the given value stands for "no identifier yet".
///
/// Upstream components may hand over an unresolved parameter during their first render pass.
/// Such values must never reach the network.
pub fn is_unresolved(value: &str) -> bool {
    let value = value.trim();
    value.is_empty() || value == UNDEFINED
}

/// Absolute `http` or `https` identifier of a remote resource.
#[derive(Clone, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct Iri(String);

impl Iri {
    /// Parses an optional, possibly unresolved identifier.
    ///
    /// Absent and unresolved values yield `Ok(None)`, meaning "no key, no fetch".
    pub fn from_route_param(value: Option<&str>) -> Result<Option<Self>, IriError> {
        match value {
            Some(value) if !is_unresolved(value) => Ok(Some(value.parse()?)),
            _ => Ok(None),
        }
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Containers are identified by a trailing slash.
    pub fn is_container(&self) -> bool {
        self.0.ends_with(SEPARATOR)
    }

    /// Returns the container this resource lives in, `None` for the root of the storage.
    pub fn parent(&self) -> Option<Iri> {
        let authority_end = self.authority_end();
        let path = &self.0[authority_end..];
        let trimmed = path.trim_end_matches(SEPARATOR);

        if trimmed.is_empty() {
            return None;
        }

        let cut = trimmed.rfind(SEPARATOR)?;
        Some(Iri(format!("{}{}", &self.0[..authority_end], &path[..=cut])))
    }

    /// Byte offset where the path of the identifier starts.
    fn authority_end(&self) -> usize {
        // Validated on construction: scheme is followed by "://" and a non-empty authority.
        let after_scheme = self.0.find("://").map(|pos| pos + 3).unwrap_or(0);
        self.0[after_scheme..]
            .find(SEPARATOR)
            .map(|pos| after_scheme + pos)
            .unwrap_or(self.0.len())
    }
}

impl Display for Iri {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl FromStr for Iri {
    type Err = IriError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        let value = value.trim();

        if value.is_empty() {
            return Err(IriError::EmptyString);
        }

        if value == UNDEFINED {
            return Err(IriError::Unresolved);
        }

        let Some((scheme, rest)) = value.split_once("://") else {
            return Err(IriError::MissingScheme(value.to_string()));
        };

        if !matches!(scheme.to_ascii_lowercase().as_str(), "http" | "https") {
            return Err(IriError::UnsupportedScheme(scheme.to_string()));
        }

        let authority = rest.split(['/', '?', '#']).next().unwrap_or_default();
        if authority.is_empty() {
            return Err(IriError::MissingAuthority(value.to_string()));
        }

        Ok(Self(value.to_string()))
    }
}

impl TryFrom<&str> for Iri {
    type Error = IriError;

    fn try_from(value: &str) -> Result<Self, Self::Error> {
        value.parse()
    }
}

impl TryFrom<String> for Iri {
    type Error = IriError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        value.parse()
    }
}

impl From<Iri> for String {
    fn from(iri: Iri) -> Self {
        iri.0
    }
}

/// Identifier of an agent, used as the authenticated identity of a session and as the subject
/// of access-control entries.
#[derive(Clone, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct WebId(Iri);

impl WebId {
    pub fn as_iri(&self) -> &Iri {
        &self.0
    }

    pub fn as_str(&self) -> &str {
        self.0.as_str()
    }
}

impl Display for WebId {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl FromStr for WebId {
    type Err = IriError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        Ok(Self(value.parse()?))
    }
}

impl From<Iri> for WebId {
    fn from(iri: Iri) -> Self {
        Self(iri)
    }
}

impl From<WebId> for Iri {
    fn from(web_id: WebId) -> Self {
        web_id.0
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Error)]
pub enum IriError {
    #[error("string is empty")]
    EmptyString,

    #[error("identifier is an unresolved parameter")]
    Unresolved,

    #[error("missing scheme in identifier: {0}")]
    MissingScheme(String),

    #[error("unsupported scheme {0}, expected http or https")]
    UnsupportedScheme(String),

    #[error("missing authority in identifier: {0}")]
    MissingAuthority(String),
}

#[cfg(test)]
mod tests {
    use super::{Iri, IriError, WebId, is_unresolved};

    #[test]
    fn parse_and_reject() {
        assert!("https://pod.example.com/".parse::<Iri>().is_ok());
        assert!("http://example.com".parse::<Iri>().is_ok());

        assert_eq!("".parse::<Iri>(), Err(IriError::EmptyString));
        assert_eq!("undefined".parse::<Iri>(), Err(IriError::Unresolved));
        assert_eq!(
            "example.com/foo".parse::<Iri>(),
            Err(IriError::MissingScheme("example.com/foo".into()))
        );
        assert_eq!(
            "ftp://example.com".parse::<Iri>(),
            Err(IriError::UnsupportedScheme("ftp".into()))
        );
        assert_eq!(
            "https:///path".parse::<Iri>(),
            Err(IriError::MissingAuthority("https:///path".into()))
        );
    }

    #[test]
    fn unresolved_route_params() {
        assert!(is_unresolved("undefined"));
        assert!(is_unresolved(" "));
        assert!(!is_unresolved("https://example.com/undefined"));

        assert_eq!(Iri::from_route_param(None), Ok(None));
        assert_eq!(Iri::from_route_param(Some("undefined")), Ok(None));
        assert_eq!(
            Iri::from_route_param(Some("https://example.com/")),
            Ok(Some("https://example.com/".parse().unwrap()))
        );
        assert!(Iri::from_route_param(Some("not an iri")).is_err());
    }

    #[test]
    fn containers_and_parents() {
        let root: Iri = "https://pod.example.com/".parse().unwrap();
        let container: Iri = "https://pod.example.com/photos/".parse().unwrap();
        let file: Iri = "https://pod.example.com/photos/cat.jpg".parse().unwrap();

        assert!(root.is_container());
        assert!(container.is_container());
        assert!(!file.is_container());

        assert_eq!(file.parent(), Some(container.clone()));
        assert_eq!(container.parent(), Some(root.clone()));
        assert_eq!(root.parent(), None);

        let bare: Iri = "https://pod.example.com".parse().unwrap();
        assert_eq!(bare.parent(), None);
    }

    #[test]
    fn serde_as_plain_string() {
        let web_id: WebId = "https://alice.example.com/profile/card#me".parse().unwrap();
        let json = serde_json::to_string(&web_id).unwrap();
        assert_eq!(json, "\"https://alice.example.com/profile/card#me\"");

        let again: WebId = serde_json::from_str(&json).unwrap();
        assert_eq!(again, web_id);

        assert!(serde_json::from_str::<Iri>("\"undefined\"").is_err());
    }
}
