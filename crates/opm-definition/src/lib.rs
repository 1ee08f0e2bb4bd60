// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Desired-state definition documents.
//!
//! A definition document describes the fleet of VMs owned by one platform:
//! optional `defaults`, named `classes` which may inherit from one another,
//! and the `hosts` themselves. [`Document::resolve`] flattens all of that
//! into one [`VmRecord`] per host.

use std::collections::BTreeMap;
use std::path::Path;

use opm_types::{PlatformError, Platform, VmRecord};
use serde_derive::Deserialize;
use slog::Logger;
use thiserror::Error;

mod overrides;
mod resolve;

pub use overrides::{Overrides, Patch};

/// The only document layout understood by this version of the tool.
pub const SUPPORTED_FORMAT_VERSION: u64 = 4;

/// A parsed (but not yet resolved) definition document.
#[derive(Clone, Debug, Deserialize, PartialEq)]
pub struct Document {
    pub platform_name: String,

    /// Name VMs `{host}.{platform}` instead of `{platform}-{host}`.
    #[serde(default)]
    pub platform_is_domain: bool,

    #[serde(default)]
    pub defaults: Option<Overrides>,

    #[serde(default)]
    pub classes: BTreeMap<String, Overrides>,

    pub hosts: BTreeMap<String, Overrides>,
}

/// The resolved desired state of a platform.
#[derive(Clone, Debug)]
pub struct Definition {
    pub platform: Platform,

    /// Target records, keyed by VM name.
    pub targets: BTreeMap<String, VmRecord>,
}

/// Errors which may be returned when loading or resolving a definition.
#[derive(Error, Debug)]
pub enum DefinitionError {
    #[error("Cannot parse json: {0}")]
    Json(#[from] serde_json::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Definition has no format_version")]
    MissingFormatVersion,

    #[error("Unhandled format {0}")]
    UnsupportedFormat(String),

    #[error(transparent)]
    Platform(#[from] PlatformError),

    #[error("Class {class} referenced by {referrer} is not defined")]
    UnknownClass { class: String, referrer: String },

    #[error("Class {0} is part of an inheritance cycle")]
    ClassCycle(String),

    #[error("Disk {index} of VM {vm} is not based on an image")]
    DiskWithoutImage { vm: String, index: usize },
}

fn format_version(value: &serde_json::Value) -> Option<u64> {
    match value {
        serde_json::Value::Number(n) => n.as_u64().or_else(|| {
            n.as_f64()
                .filter(|f| *f >= 0.0 && f.fract() == 0.0)
                .map(|f| f as u64)
        }),
        serde_json::Value::String(s) => s.trim().parse().ok(),
        _ => None,
    }
}

/// Parses a JSON definition document, checking its format version before
/// looking at anything else.
pub fn parse_str(contents: &str) -> Result<Document, DefinitionError> {
    let raw: serde_json::Value = serde_json::from_str(contents)?;
    let version = raw
        .get("format_version")
        .ok_or(DefinitionError::MissingFormatVersion)?;
    match format_version(version) {
        Some(SUPPORTED_FORMAT_VERSION) => Ok(serde_json::from_value(raw)?),
        _ => Err(DefinitionError::UnsupportedFormat(version.to_string())),
    }
}

/// Parses a JSON file into a definition document.
pub fn parse<P: AsRef<Path>>(path: P) -> Result<Document, DefinitionError> {
    let contents = std::fs::read_to_string(path.as_ref())?;
    parse_str(&contents)
}

/// Parses and resolves a JSON definition file.
pub fn load<P: AsRef<Path>>(
    path: P,
    log: &Logger,
) -> Result<Definition, DefinitionError> {
    parse(path)?.resolve(log)
}
