// SPDX-License-Identifier: MIT OR Apache-2.0

//! Who may do what on a resource stored in a Solid Pod.
//!
//! [`PermissionResolver`] turns the raw entries of an access-control resource into one
//! [`Permission`] per agent, enriched with the agent's profile, and applies grants, changes and
//! revocations. [`PermissionsHook`] keeps the permissions of the currently selected resource
//! observable for user interfaces.
mod access;
mod control;
mod hook;
mod resolver;
#[cfg(any(test, feature = "test_utils"))]
pub mod test_utils;

pub use access::{AccessMode, AccessModes};
pub use control::{AccessControl, AccessControlHandle, Grant, HandleId};
pub use hook::{PermissionsHook, PermissionsState};
pub use resolver::{Permission, PermissionError, PermissionResolver};
