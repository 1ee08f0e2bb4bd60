// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

use std::fmt::Display;

use crate::{DiskSpec, Permissions};

/// Number of virtual CPUs a VM gets when nothing says otherwise.
pub const DEFAULT_VCPU: u32 = 1;

/// Identifier assigned to a VM by the control plane.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct VmId(pub u64);

impl Display for VmId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        self.0.fmt(f)
    }
}

/// Opaque lifecycle state code reported by the control plane.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct LifecycleState(pub u32);

impl LifecycleState {
    pub const HOLD: Self = Self(2);
    pub const ACTIVE: Self = Self(3);
    pub const STOPPED: Self = Self(4);
    pub const SUSPENDED: Self = Self(5);
    pub const POWEROFF: Self = Self(8);
    pub const UNDEPLOYED: Self = Self(9);

    /// States in which the CPU/memory envelope of a VM may be changed.
    const ENVELOPE_MUTABLE: [Self; 5] = [
        Self::HOLD,
        Self::STOPPED,
        Self::SUSPENDED,
        Self::POWEROFF,
        Self::UNDEPLOYED,
    ];

    pub fn envelope_mutable(&self) -> bool {
        Self::ENVELOPE_MUTABLE.contains(self)
    }

    pub fn name(&self) -> Option<&'static str> {
        let name = match self.0 {
            0 => "INIT",
            1 => "PENDING",
            2 => "HOLD",
            3 => "ACTIVE",
            4 => "STOPPED",
            5 => "SUSPENDED",
            6 => "DONE",
            8 => "POWEROFF",
            9 => "UNDEPLOYED",
            10 => "CLONING",
            11 => "CLONING_FAILURE",
            _ => return None,
        };
        Some(name)
    }
}

impl Display for LifecycleState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self.name() {
            Some(name) => write!(f, "{} ({})", self.0, name),
            None => write!(f, "{}", self.0),
        }
    }
}

/// A fully resolved VM configuration, either desired (target) or observed.
///
/// `id` and `lifecycle_state` are only known for VMs that exist in the
/// control plane.
#[derive(Clone, Debug, PartialEq)]
pub struct VmRecord {
    pub name: String,
    pub group: Option<String>,
    pub permissions: Option<Permissions>,
    pub cpu: Option<f64>,
    pub vcpu: u32,
    pub mem_mb: Option<u64>,
    pub arch: Option<String>,
    pub boot: Option<String>,
    /// Network names, ordered by NIC index.
    pub networks: Vec<String>,
    /// `None` leaves the disk topology unmanaged.
    pub disks: Option<Vec<DiskSpec>>,
    /// Named template to instantiate instead of creating from raw
    /// parameters.
    pub template: Option<String>,
    pub id: Option<VmId>,
    pub lifecycle_state: Option<LifecycleState>,
}

impl VmRecord {
    pub fn new<S: Into<String>>(name: S) -> Self {
        Self {
            name: name.into(),
            group: None,
            permissions: None,
            cpu: None,
            vcpu: DEFAULT_VCPU,
            mem_mb: None,
            arch: None,
            boot: None,
            networks: Vec::new(),
            disks: None,
            template: None,
            id: None,
            lifecycle_state: None,
        }
    }
}

struct Unset<'a, T>(&'a Option<T>);

impl<T: Display> Display for Unset<'_, T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self.0 {
            Some(value) => value.fmt(f),
            None => write!(f, "unset"),
        }
    }
}

/// Multi-line rendering used when printing resolved definitions.
impl Display for VmRecord {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        writeln!(f, "name: {}", self.name)?;
        writeln!(f, "\tgroup: {}", Unset(&self.group))?;
        writeln!(f, "\tpermissions: {}", Unset(&self.permissions))?;
        writeln!(f, "\tcpu: {}", Unset(&self.cpu))?;
        writeln!(f, "\tvcpu: {}", self.vcpu)?;
        writeln!(f, "\tmem_mb: {}", Unset(&self.mem_mb))?;
        writeln!(f, "\tarch: {}", Unset(&self.arch))?;
        writeln!(f, "\tboot: {}", Unset(&self.boot))?;
        writeln!(f, "\tone_template: {}", Unset(&self.template))?;
        write!(f, "\tnetworks: {}", self.networks.len())?;
        for network in &self.networks {
            write!(f, "\n\t\t{}", network)?;
        }
        let disks = self.disks.as_deref().unwrap_or_default();
        write!(f, "\n\tdisks: {}", disks.len())?;
        for disk in disks {
            write!(f, "\n\t\t{}", disk)?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn envelope_mutable_states() {
        for code in [2, 4, 5, 8, 9] {
            assert!(LifecycleState(code).envelope_mutable(), "state {code}");
        }
        for code in [0, 1, 3, 6, 7, 10, 11, 42] {
            assert!(!LifecycleState(code).envelope_mutable(), "state {code}");
        }
    }

    #[test]
    fn lifecycle_state_display() {
        assert_eq!(LifecycleState::ACTIVE.to_string(), "3 (ACTIVE)");
        assert_eq!(LifecycleState(42).to_string(), "42");
    }

    #[test]
    fn new_record_defaults() {
        let vm = VmRecord::new("demo-web");
        assert_eq!(vm.name, "demo-web");
        assert_eq!(vm.vcpu, DEFAULT_VCPU);
        assert!(vm.networks.is_empty());
        assert!(vm.disks.is_none());
        assert!(vm.id.is_none());
    }

    #[test]
    fn pretty_rendering() {
        let vm = VmRecord {
            group: Some("ops".to_string()),
            permissions: Some("640".parse().unwrap()),
            cpu: Some(0.5),
            vcpu: 2,
            mem_mb: Some(1024),
            networks: vec!["lan".to_string(), "dmz".to_string()],
            disks: Some(vec![DiskSpec::from_image("debian")]),
            ..VmRecord::new("demo-db")
        };
        let expected = "name: demo-db\n\
            \tgroup: ops\n\
            \tpermissions: 640\n\
            \tcpu: 0.5\n\
            \tvcpu: 2\n\
            \tmem_mb: 1024\n\
            \tarch: unset\n\
            \tboot: unset\n\
            \tone_template: unset\n\
            \tnetworks: 2\n\
            \t\tlan\n\
            \t\tdmz\n\
            \tdisks: 1\n\
            \t\timage debian of default size with default dev_prefix";
        assert_eq!(vm.to_string(), expected);
    }

    #[test]
    fn pretty_rendering_without_disks() {
        let rendered = VmRecord::new("demo-web").to_string();
        assert!(rendered.ends_with("\tnetworks: 0\n\tdisks: 0"));
    }
}
