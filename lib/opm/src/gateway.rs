// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! The boundary between reconciliation and the infrastructure control plane.
//!
//! [`ControlPlane`] is the narrow set of imperative verbs a backend has to
//! provide. [`Gateway`] wraps a backend with the rules reconciliation relies
//! on: a session check done once, platform scoping of discovered VMs, and
//! lifecycle-state gating of envelope changes.

use std::collections::BTreeMap;

use opm_types::{LifecycleState, Permissions, Platform, VmId, VmRecord};
use slog::{debug, info, warn, Logger};
use thiserror::Error;

use crate::diff::ChangeSet;

#[derive(Error, Debug)]
pub enum Error {
    #[error(
        "VM {id} is in a state ({state}) where its envelope cannot be modified"
    )]
    ImmutableEnvelope { id: VmId, state: LifecycleState },

    #[error("VM {0} has no known lifecycle state")]
    UnknownState(VmId),

    #[error("VM {0} has no identifier")]
    MissingId(String),

    #[error(transparent)]
    Backend(Box<dyn std::error::Error + Send + Sync + 'static>),
}

impl Error {
    pub fn backend<E>(err: E) -> Self
    where
        E: std::error::Error + Send + Sync + 'static,
    {
        Error::Backend(Box::new(err))
    }
}

/// New CPU/vCPU/memory values for a VM; `None` leaves a value alone.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct Resize {
    pub cpu: Option<f64>,
    pub vcpu: Option<u32>,
    pub mem_mb: Option<u64>,
}

impl Resize {
    pub fn is_empty(&self) -> bool {
        self.cpu.is_none() && self.vcpu.is_none() && self.mem_mb.is_none()
    }
}

/// Verbs offered by an infrastructure control plane.
///
/// Every call is a single blocking round-trip; an error leaves whatever the
/// control plane did in place.
#[cfg_attr(test, mockall::automock)]
pub trait ControlPlane {
    /// Checks that the control plane is reachable and that the caller holds a
    /// valid authorization.
    fn verify(&mut self) -> Result<(), Error>;

    /// Lists every VM visible to the caller.
    fn list(&self) -> Result<Vec<VmRecord>, Error>;

    /// Creates a VM from `target`, returning its identifier.
    fn create(&self, target: &VmRecord) -> Result<VmId, Error>;

    fn terminate(&self, id: VmId) -> Result<(), Error>;

    fn resize(&self, id: VmId, resize: &Resize) -> Result<(), Error>;

    fn set_group(&self, id: VmId, group: &str) -> Result<(), Error>;

    fn set_permissions(
        &self,
        id: VmId,
        permissions: &Permissions,
    ) -> Result<(), Error>;
}

fn id_of(vm: &VmRecord) -> Result<VmId, Error> {
    vm.id.ok_or_else(|| Error::MissingId(vm.name.clone()))
}

pub struct Gateway<C> {
    control_plane: C,
    verified: bool,
    log: Logger,
}

impl<C: ControlPlane> Gateway<C> {
    pub fn new(control_plane: C, log: Logger) -> Self {
        Self { control_plane, verified: false, log }
    }

    /// Verifies the control-plane session, the first time only.
    pub fn ensure_session(&mut self) -> Result<(), Error> {
        if !self.verified {
            self.control_plane.verify()?;
            self.verified = true;
        }
        Ok(())
    }

    /// Discovers the VMs owned by `platform`, keyed by name.
    pub fn discover(
        &mut self,
        platform: &Platform,
    ) -> Result<BTreeMap<String, VmRecord>, Error> {
        self.ensure_session()?;
        let vms: BTreeMap<String, VmRecord> = self
            .control_plane
            .list()?
            .into_iter()
            .filter(|vm| platform.owns(&vm.name))
            .map(|vm| (vm.name.clone(), vm))
            .collect();

        let names: Vec<&str> = vms.keys().map(String::as_str).collect();
        let names =
            if names.is_empty() { "none".to_string() } else { names.join(", ") };
        info!(self.log, "Existing managed VMs";
            "platform" => %platform, "vms" => names);
        Ok(vms)
    }

    /// Creates `target`, recording the assigned identifier in it, then
    /// applies its group and permissions if it has any.
    pub fn create(&self, target: &mut VmRecord) -> Result<VmId, Error> {
        debug!(self.log, "creating VM"; "vm" => ?target);
        let id = self.control_plane.create(target)?;
        target.id = Some(id);

        if let Some(group) = &target.group {
            self.control_plane.set_group(id, group)?;
        }
        if let Some(permissions) = &target.permissions {
            self.control_plane.set_permissions(id, permissions)?;
        }
        Ok(id)
    }

    pub fn destroy(&self, vm: &VmRecord) -> Result<VmId, Error> {
        debug!(self.log, "destroying VM"; "vm" => ?vm);
        let id = id_of(vm)?;
        self.control_plane.terminate(id)?;
        Ok(id)
    }

    pub fn set_group(&self, vm: &VmRecord, group: &str) -> Result<(), Error> {
        debug!(self.log, "setting group"; "vm" => &vm.name, "group" => group);
        self.control_plane.set_group(id_of(vm)?, group)
    }

    pub fn set_permissions(
        &self,
        vm: &VmRecord,
        permissions: &Permissions,
    ) -> Result<(), Error> {
        debug!(self.log, "setting permissions";
            "vm" => &vm.name, "permissions" => %permissions);
        self.control_plane.set_permissions(id_of(vm)?, permissions)
    }

    /// Changes the envelope of `vm`. Only allowed while the VM is in a state
    /// where the envelope is mutable.
    pub fn resize(&self, vm: &VmRecord, resize: &Resize) -> Result<(), Error> {
        if resize.is_empty() {
            info!(self.log,
                "No difference in vcpu/cpu/mem detected, not resizing";
                "vm" => &vm.name);
            return Ok(());
        }

        let id = id_of(vm)?;
        match vm.lifecycle_state {
            Some(state) if state.envelope_mutable() => {}
            Some(state) => return Err(Error::ImmutableEnvelope { id, state }),
            None => return Err(Error::UnknownState(id)),
        }

        debug!(self.log, "resizing VM"; "vm" => &vm.name, "resize" => ?resize);
        self.control_plane.resize(id, resize)?;
        info!(self.log, "Resizing VM done"; "vm" => &vm.name, "id" => id.0);
        Ok(())
    }

    /// Applies `changes` to the existing VM `observed`.
    ///
    /// Group and permissions are applied first, then the envelope. Disk and
    /// network topology changes are reported and left alone.
    pub fn synchronize(
        &self,
        observed: &mut VmRecord,
        changes: &ChangeSet,
    ) -> Result<(), Error> {
        debug!(self.log, "synchronizing VM"; "vm" => ?observed);

        if let Some(group) = &changes.group {
            self.set_group(observed, &group.target)?;
        }
        if let Some(permissions) = &changes.permissions {
            self.set_permissions(observed, &permissions.target)?;
        }

        let resize = changes.resize();
        self.resize(observed, &resize)?;
        if let Some(cpu) = resize.cpu {
            observed.cpu = Some(cpu);
        }
        if let Some(vcpu) = resize.vcpu {
            observed.vcpu = vcpu;
        }
        if let Some(mem_mb) = resize.mem_mb {
            observed.mem_mb = Some(mem_mb);
        }
        debug!(self.log, "VM after resize"; "vm" => ?observed);

        if changes.arch.is_some() || changes.boot.is_some() {
            warn!(self.log,
                "Changing arch/boot of an existing VM is not implemented, \
                modifications should be done by hand";
                "vm" => &observed.name);
        }
        if changes.disks.is_some() {
            warn!(self.log,
                "Changing disk topology could lead to data loss, so this \
                function is not implemented and modifications should be done \
                manually";
                "vm" => &observed.name);
        }
        if changes.networks.is_some() {
            warn!(self.log,
                "Changing network topology could break the network \
                configuration of the guest (lose mac/ip leases, change \
                interface names) so this function is not implemented and \
                modifications should be done by hand";
                "vm" => &observed.name);
        }
        Ok(())
    }
}
