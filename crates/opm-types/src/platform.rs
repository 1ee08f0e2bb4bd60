// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

use std::fmt::Display;

use thiserror::Error;

#[derive(Error, Debug, PartialEq, Eq)]
pub enum PlatformError {
    #[error(
        "Platform name cannot be empty, because every accessible VM would be \
        considered part of the platform"
    )]
    EmptyName,
}

/// How VM names are derived from host keys.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum NamingMode {
    /// `{platform}-{host}`
    #[default]
    Prefix,
    /// `{host}.{platform}`
    Domain,
}

/// The namespace owning a set of VMs.
///
/// Every VM whose name does not follow the platform's naming pattern is
/// invisible to reconciliation.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Platform {
    name: String,
    naming: NamingMode,
}

impl Platform {
    pub fn new(name: &str, naming: NamingMode) -> Result<Self, PlatformError> {
        let name = name.trim();
        if name.is_empty() {
            return Err(PlatformError::EmptyName);
        }
        Ok(Self { name: name.to_string(), naming })
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// Derives the VM name for a host key.
    pub fn vm_name(&self, host: &str) -> String {
        match self.naming {
            NamingMode::Prefix => format!("{}-{}", self.name, host),
            NamingMode::Domain => format!("{}.{}", host, self.name),
        }
    }

    /// Returns true if `vm_name` follows this platform's naming pattern.
    pub fn owns(&self, vm_name: &str) -> bool {
        match self.naming {
            NamingMode::Prefix => vm_name
                .strip_prefix(self.name.as_str())
                .is_some_and(|rest| rest.starts_with('-')),
            NamingMode::Domain => vm_name
                .strip_suffix(self.name.as_str())
                .is_some_and(|rest| rest.ends_with('.')),
        }
    }
}

impl Display for Platform {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        self.name.fmt(f)
    }
}
