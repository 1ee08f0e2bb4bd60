// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Fundamental types shared by the other one-pf-manage crates.
//!
//! This crate defines the entity model (disks, VM records, permissions,
//! lifecycle states and platform naming) such that the definition resolver,
//! the reconciliation core and the control-plane backends can all use those
//! types without depending on one another.

mod disk;
mod permissions;
mod platform;
mod vm;

pub use disk::{DiskError, DiskSpec};
pub use permissions::{AccessBits, Permissions, PermissionsError};
pub use platform::{NamingMode, Platform, PlatformError};
pub use vm::{LifecycleState, VmId, VmRecord, DEFAULT_VCPU};
