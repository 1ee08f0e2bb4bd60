// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

use opm_types::{DiskSpec, Permissions, VmRecord, DEFAULT_VCPU};
use serde::de::{Deserialize, Deserializer};
use serde_derive::Deserialize;
use slog::{debug, Logger};

/// A field of an override object: missing from the document, explicitly
/// `null`, or carrying a value.
#[derive(Clone, Debug, PartialEq)]
pub enum Patch<T> {
    Absent,
    Null,
    Value(T),
}

impl<T> Default for Patch<T> {
    fn default() -> Self {
        Patch::Absent
    }
}

impl<T> Patch<T> {
    pub fn is_absent(&self) -> bool {
        matches!(self, Patch::Absent)
    }
}

impl<T: Clone> Patch<T> {
    /// Writes the patch into an optional slot. Returns false if the slot was
    /// left untouched.
    fn apply_to(&self, slot: &mut Option<T>) -> bool {
        match self {
            Patch::Absent => return false,
            Patch::Null => *slot = None,
            Patch::Value(value) => *slot = Some(value.clone()),
        }
        true
    }

    /// Like `apply_to`, for slots where `null` means "back to `fallback`".
    fn apply_or(&self, slot: &mut T, fallback: T) -> bool {
        match self {
            Patch::Absent => return false,
            Patch::Null => *slot = fallback,
            Patch::Value(value) => *slot = value.clone(),
        }
        true
    }
}

impl<'de, T: Deserialize<'de>> Deserialize<'de> for Patch<T> {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: Deserializer<'de>,
    {
        Ok(match Option::<T>::deserialize(deserializer)? {
            Some(value) => Patch::Value(value),
            None => Patch::Null,
        })
    }
}

/// A set of field overrides, as found under `defaults`, `classes` and
/// `hosts` in a definition document.
#[derive(Clone, Debug, Default, Deserialize, PartialEq)]
#[serde(default)]
pub struct Overrides {
    pub cpu_percent: Patch<f64>,
    pub vcpu_count: Patch<u32>,
    pub mem_mb: Patch<u64>,
    pub arch: Patch<String>,
    pub boot: Patch<String>,
    pub networks: Patch<Vec<String>>,
    pub disks: Patch<Vec<DiskSpec>>,
    pub one_template: Patch<String>,
    pub group: Patch<String>,
    pub permissions: Patch<Permissions>,

    /// Parent class, applied before these overrides.
    pub class: Option<String>,
}

impl Overrides {
    /// Applies every field present in this override set to `vm`, leaving the
    /// others untouched. `class` is not followed here.
    pub fn apply(&self, vm: &mut VmRecord, log: &Logger) {
        if self.cpu_percent.apply_to(&mut vm.cpu) {
            debug!(log, "cpu overridden"; "vm" => &vm.name, "cpu" => ?vm.cpu);
        }
        if self.vcpu_count.apply_or(&mut vm.vcpu, DEFAULT_VCPU) {
            debug!(log, "vcpu overridden"; "vm" => &vm.name, "vcpu" => vm.vcpu);
        }
        if self.mem_mb.apply_to(&mut vm.mem_mb) {
            debug!(log, "mem_mb overridden";
                "vm" => &vm.name, "mem_mb" => ?vm.mem_mb);
        }
        if self.arch.apply_to(&mut vm.arch) {
            debug!(log, "arch overridden"; "vm" => &vm.name, "arch" => ?vm.arch);
        }
        if self.boot.apply_to(&mut vm.boot) {
            debug!(log, "boot overridden"; "vm" => &vm.name, "boot" => ?vm.boot);
        }
        if self.networks.apply_or(&mut vm.networks, Vec::new()) {
            debug!(log, "networks overridden";
                "vm" => &vm.name, "networks" => ?vm.networks);
        }
        if self.disks.apply_to(&mut vm.disks) {
            debug!(log, "disks overridden";
                "vm" => &vm.name, "disks" => ?vm.disks);
        }
        if self.one_template.apply_to(&mut vm.template) {
            debug!(log, "one_template overridden";
                "vm" => &vm.name, "template" => ?vm.template);
        }
        if self.group.apply_to(&mut vm.group) {
            debug!(log, "group overridden";
                "vm" => &vm.name, "group" => ?vm.group);
        }
        if self.permissions.apply_to(&mut vm.permissions) {
            debug!(log, "permissions overridden";
                "vm" => &vm.name, "permissions" => ?vm.permissions);
        }
    }
}
