// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Reconciliation of a declared VM fleet against a control plane.
//!
//! Target records come from resolved definition documents
//! ([`opm_definition`]); observed records come from a [`ControlPlane`]
//! backend. [`diff::compare`] computes the field-level changes between the
//! two, [`plan::Partition`] decides which VMs an [`Action`] touches, and
//! [`Reconciler`] carries the resulting steps out, one at a time.

use opm_types::DiskError;
use thiserror::Error;

pub mod diff;
pub mod gateway;
pub mod plan;
mod reconcile;

pub use gateway::{ControlPlane, Gateway, Resize};
pub use plan::Action;
pub use reconcile::Reconciler;

#[derive(Error, Debug)]
pub enum Error {
    #[error(transparent)]
    Gateway(#[from] gateway::Error),

    #[error(transparent)]
    Disk(#[from] DiskError),

    #[error("Both VMs do not refer to the same host ({observed} vs {target})")]
    NameMismatch { observed: String, target: String },

    #[error("Failed to write report: {0}")]
    Io(#[from] std::io::Error),
}
