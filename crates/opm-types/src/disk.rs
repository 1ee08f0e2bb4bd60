// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

use std::fmt::Display;

use serde::{Deserialize, Serialize};
use thiserror::Error;

#[derive(Error, Debug, PartialEq, Eq)]
pub enum DiskError {
    #[error("A disk must be based on an image")]
    MissingImage,
}

/// A disk attached to a VM, identified by the image it is created from.
#[derive(Clone, Debug, Default, PartialEq, Eq, Deserialize, Serialize)]
pub struct DiskSpec {
    pub image: Option<String>,

    /// Overrides the default size of the image.
    pub size_mb: Option<u64>,

    /// Overrides the device naming prefix (`hd`, `sd`, `vd`).
    pub dev_prefix: Option<String>,
}

impl DiskSpec {
    pub fn from_image<S: Into<String>>(image: S) -> Self {
        Self { image: Some(image.into()), ..Default::default() }
    }

    /// Compares two disks the way the reconciler does: both must name an
    /// image, and the image, size and device prefix must all agree.
    pub fn matches(&self, other: &DiskSpec) -> Result<bool, DiskError> {
        match (&self.image, &other.image) {
            (Some(mine), Some(theirs)) => Ok(mine == theirs
                && self.size_mb == other.size_mb
                && self.dev_prefix == other.dev_prefix),
            _ => Err(DiskError::MissingImage),
        }
    }
}

impl Display for DiskSpec {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "image {} of ", self.image.as_deref().unwrap_or("unset"))?;
        match self.size_mb {
            Some(size) => write!(f, "size {} Mbytes", size)?,
            None => write!(f, "default size")?,
        }
        match &self.dev_prefix {
            Some(prefix) => write!(f, " with dev_prefix {}", prefix),
            None => write!(f, " with default dev_prefix"),
        }
    }
}
