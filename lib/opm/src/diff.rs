// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Field-level comparison of an observed record against its target.

use std::fmt::Display;

use opm_types::{DiskError, DiskSpec, Permissions, VmRecord};

use crate::gateway::Resize;

/// The current and desired value of a field which must be reconciled.
#[derive(Clone, Debug, PartialEq)]
pub struct Delta<T> {
    pub current: T,
    pub target: T,
}

impl<T: Clone> Delta<T> {
    fn of(current: &T, target: &T) -> Self {
        Self { current: current.clone(), target: target.clone() }
    }
}

/// Fields which differ between two records. A field set to `None` needs no
/// action.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct ChangeSet {
    pub group: Option<Delta<String>>,
    pub permissions: Option<Delta<Permissions>>,
    pub cpu: Option<Delta<Option<f64>>>,
    pub vcpu: Option<Delta<u32>>,
    pub mem_mb: Option<Delta<Option<u64>>>,
    pub arch: Option<Delta<Option<String>>>,
    pub boot: Option<Delta<Option<String>>>,
    pub networks: Option<Delta<Vec<String>>>,
    pub disks: Option<Delta<Vec<DiskSpec>>>,
}

fn scalar<T: Clone + PartialEq>(current: &T, target: &T) -> Option<Delta<T>> {
    (current != target).then(|| Delta::of(current, target))
}

/// Only compared when both sides hold a value; unset means unmanaged.
fn managed<T: Clone + PartialEq>(
    current: &Option<T>,
    target: &Option<T>,
) -> Option<Delta<T>> {
    match (current, target) {
        (Some(current), Some(target)) => scalar(current, target),
        _ => None,
    }
}

fn disks(
    current: &Option<Vec<DiskSpec>>,
    target: &Option<Vec<DiskSpec>>,
) -> Result<Option<Delta<Vec<DiskSpec>>>, DiskError> {
    let (Some(current), Some(target)) = (current, target) else {
        return Ok(None);
    };
    let mut differ = current.len() != target.len();
    for (mine, theirs) in current.iter().zip(target.iter()) {
        if differ {
            break;
        }
        differ = !mine.matches(theirs)?;
    }
    Ok(differ.then(|| Delta::of(current, target)))
}

/// Computes the changes needed to turn `observed` into `target`.
///
/// Fails if a pair of disks has to be compared and one of them is not based
/// on an image.
pub fn compare(
    observed: &VmRecord,
    target: &VmRecord,
) -> Result<ChangeSet, DiskError> {
    Ok(ChangeSet {
        group: managed(&observed.group, &target.group),
        permissions: managed(&observed.permissions, &target.permissions),
        cpu: scalar(&observed.cpu, &target.cpu),
        vcpu: scalar(&observed.vcpu, &target.vcpu),
        mem_mb: scalar(&observed.mem_mb, &target.mem_mb),
        arch: scalar(&observed.arch, &target.arch),
        boot: scalar(&observed.boot, &target.boot),
        networks: scalar(&observed.networks, &target.networks),
        disks: disks(&observed.disks, &target.disks)?,
    })
}

fn opt<T: Display>(value: &Option<T>) -> String {
    match value {
        Some(value) => value.to_string(),
        None => "unset".to_string(),
    }
}

fn list<T: Display>(values: &[T]) -> String {
    let items: Vec<String> = values.iter().map(ToString::to_string).collect();
    format!("[{}]", items.join(", "))
}

fn render<T>(
    name: &'static str,
    delta: &Option<Delta<T>>,
    fmt: impl Fn(&T) -> String,
) -> Option<(&'static str, String, String)> {
    delta.as_ref().map(|d| (name, fmt(&d.current), fmt(&d.target)))
}

impl ChangeSet {
    pub fn is_empty(&self) -> bool {
        self.changes().is_empty()
    }

    /// Names (as used in definition documents) of the differing fields.
    pub fn fields(&self) -> Vec<&'static str> {
        self.changes().into_iter().map(|(name, _, _)| name).collect()
    }

    /// Differing fields with their rendered current and target values.
    pub fn changes(&self) -> Vec<(&'static str, String, String)> {
        [
            render("group", &self.group, String::clone),
            render("permissions", &self.permissions, ToString::to_string),
            render("cpu_percent", &self.cpu, opt),
            render("vcpu_count", &self.vcpu, ToString::to_string),
            render("mem_mb", &self.mem_mb, opt),
            render("arch", &self.arch, opt),
            render("boot", &self.boot, opt),
            render("networks", &self.networks, |n| list(n)),
            render("disks", &self.disks, |d| list(d)),
        ]
        .into_iter()
        .flatten()
        .collect()
    }

    /// One line summary: `changing cpu_percent from 0.1 to 0.2, ...`
    pub fn describe(&self) -> String {
        self.changes()
            .into_iter()
            .map(|(name, current, target)| {
                format!("changing {} from {} to {}", name, current, target)
            })
            .collect::<Vec<_>>()
            .join(", ")
    }

    /// The envelope changes which can be applied. A target left unset is
    /// not something a VM can be resized to.
    pub fn resize(&self) -> Resize {
        Resize {
            cpu: self.cpu.as_ref().and_then(|d| d.target),
            vcpu: self.vcpu.as_ref().map(|d| d.target),
            mem_mb: self.mem_mb.as_ref().and_then(|d| d.target),
        }
    }
}
