// SPDX-License-Identifier: MIT OR Apache-2.0

use std::fmt::Display;
use std::ops::BitOr;

use serde::{Deserialize, Serialize};

/// The four access modes which can be granted to an agent on a resource.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum AccessMode {
    /// Permission to read the resource.
    Read,

    /// Permission to add data to the resource without changing existing data.
    Append,

    /// Permission to change or delete the resource.
    Write,

    /// Permission to read and change who has access to the resource.
    Control,
}

impl AccessMode {
    pub const ALL: [AccessMode; 4] = [
        AccessMode::Read,
        AccessMode::Append,
        AccessMode::Write,
        AccessMode::Control,
    ];

    const fn bit(self) -> u8 {
        match self {
            AccessMode::Read => 1,
            AccessMode::Append => 1 << 1,
            AccessMode::Write => 1 << 2,
            AccessMode::Control => 1 << 3,
        }
    }
}

impl Display for AccessMode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            AccessMode::Read => "read",
            AccessMode::Append => "append",
            AccessMode::Write => "write",
            AccessMode::Control => "control",
        };

        write!(f, "{}", s)
    }
}

/// Set of access modes.
#[derive(Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(from = "Vec<AccessMode>", into = "Vec<AccessMode>")]
pub struct AccessModes(u8);

impl AccessModes {
    pub const fn empty() -> Self {
        Self(0)
    }

    pub fn all() -> Self {
        AccessMode::ALL.into_iter().collect()
    }

    /// Read access.
    pub fn read() -> Self {
        Self::empty().with(AccessMode::Read)
    }

    /// Read and write access, as usually given to editors.
    pub fn editor() -> Self {
        Self::read().with(AccessMode::Append).with(AccessMode::Write)
    }

    pub fn with(self, mode: AccessMode) -> Self {
        Self(self.0 | mode.bit())
    }

    pub fn without(self, mode: AccessMode) -> Self {
        Self(self.0 & !mode.bit())
    }

    pub fn contains(&self, mode: AccessMode) -> bool {
        self.0 & mode.bit() != 0
    }

    /// Returns true if this set permits `mode`. Write access permits appending as well.
    pub fn allows(&self, mode: AccessMode) -> bool {
        self.contains(mode) || (mode == AccessMode::Append && self.contains(AccessMode::Write))
    }

    /// Returns true if every mode of `other` is contained in this set.
    pub fn includes(&self, other: AccessModes) -> bool {
        self.0 & other.0 == other.0
    }

    pub fn union(self, other: AccessModes) -> Self {
        Self(self.0 | other.0)
    }

    pub fn difference(self, other: AccessModes) -> Self {
        Self(self.0 & !other.0)
    }

    pub fn is_empty(&self) -> bool {
        self.0 == 0
    }

    pub fn iter(&self) -> impl Iterator<Item = AccessMode> + use<> {
        let modes = *self;
        AccessMode::ALL
            .into_iter()
            .filter(move |mode| modes.contains(*mode))
    }
}

impl From<AccessMode> for AccessModes {
    fn from(mode: AccessMode) -> Self {
        Self::empty().with(mode)
    }
}

impl FromIterator<AccessMode> for AccessModes {
    fn from_iter<I: IntoIterator<Item = AccessMode>>(iter: I) -> Self {
        iter.into_iter()
            .fold(Self::empty(), |modes, mode| modes.with(mode))
    }
}

impl From<Vec<AccessMode>> for AccessModes {
    fn from(modes: Vec<AccessMode>) -> Self {
        modes.into_iter().collect()
    }
}

impl From<AccessModes> for Vec<AccessMode> {
    fn from(modes: AccessModes) -> Self {
        modes.iter().collect()
    }
}

impl BitOr for AccessModes {
    type Output = AccessModes;

    fn bitor(self, rhs: Self) -> Self::Output {
        self.union(rhs)
    }
}

impl BitOr<AccessMode> for AccessModes {
    type Output = AccessModes;

    fn bitor(self, rhs: AccessMode) -> Self::Output {
        self.with(rhs)
    }
}

impl std::fmt::Debug for AccessModes {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_set().entries(self.iter()).finish()
    }
}

impl Display for AccessModes {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        if self.is_empty() {
            return write!(f, "none");
        }

        let modes: Vec<String> = self.iter().map(|mode| mode.to_string()).collect();
        write!(f, "{}", modes.join(", "))
    }
}

#[cfg(test)]
mod tests {
    use super::{AccessMode, AccessModes};

    #[test]
    fn set_operations() {
        let read_control = AccessModes::read() | AccessMode::Control;

        assert!(read_control.contains(AccessMode::Read));
        assert!(read_control.contains(AccessMode::Control));
        assert!(!read_control.contains(AccessMode::Write));

        assert_eq!(
            read_control.union(AccessModes::editor()),
            AccessModes::all()
        );
        assert_eq!(
            read_control.difference(AccessMode::Control.into()),
            AccessModes::read()
        );
        assert!(AccessModes::all().includes(read_control));
        assert!(!read_control.includes(AccessModes::editor()));
        assert!(read_control.without(AccessMode::Read).without(AccessMode::Control).is_empty());
    }

    #[test]
    fn write_allows_append() {
        let write: AccessModes = AccessMode::Write.into();

        assert!(write.allows(AccessMode::Append));
        assert!(!write.contains(AccessMode::Append));
        assert!(!AccessModes::read().allows(AccessMode::Append));
    }

    #[test]
    fn display_and_serde() {
        let modes = AccessModes::read() | AccessMode::Control;
        assert_eq!(modes.to_string(), "read, control");
        assert_eq!(AccessModes::empty().to_string(), "none");
        assert_eq!(format!("{:?}", modes), "{Read, Control}");

        let json = serde_json::to_string(&modes).unwrap();
        assert_eq!(json, r#"["Read","Control"]"#);
        let again: AccessModes = serde_json::from_str(&json).unwrap();
        assert_eq!(again, modes);
    }
}
