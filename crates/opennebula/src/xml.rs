// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Conversion of `onevm list --xml` / `oneuser show --xml` output.

use std::collections::BTreeMap;
use std::str::FromStr;

use opm_types::{
    AccessBits, DiskSpec, LifecycleState, Permissions, VmId, VmRecord,
    DEFAULT_VCPU,
};
use serde_derive::Deserialize;

use crate::Error;

#[derive(Debug, Deserialize)]
struct VmPool {
    #[serde(rename = "VM", default)]
    vms: Vec<Vm>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
struct Vm {
    id: u64,
    name: String,
    gname: Option<String>,
    permissions: Option<PermissionMatrix>,
    state: Option<u32>,
    #[serde(default)]
    template: Template,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
struct PermissionMatrix {
    owner_u: u8,
    owner_m: u8,
    owner_a: u8,
    group_u: u8,
    group_m: u8,
    group_a: u8,
    other_u: u8,
    other_m: u8,
    other_a: u8,
}

impl PermissionMatrix {
    fn permissions(&self) -> Permissions {
        let bits = |u: u8, m: u8, a: u8| AccessBits {
            use_: u != 0,
            manage: m != 0,
            admin: a != 0,
        };
        Permissions::from_bits(
            bits(self.owner_u, self.owner_m, self.owner_a),
            bits(self.group_u, self.group_m, self.group_a),
            bits(self.other_u, self.other_m, self.other_a),
        )
    }
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
struct Template {
    cpu: Option<String>,
    vcpu: Option<String>,
    memory: Option<String>,
    os: Option<Os>,
    #[serde(default)]
    nic: Vec<Nic>,
    #[serde(default)]
    disk: Vec<Disk>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
struct Os {
    arch: Option<String>,
    boot: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
struct Nic {
    network: Option<String>,
    network_uname: Option<String>,
    nic_id: u32,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
struct Disk {
    image: Option<String>,
    image_uname: Option<String>,
    size: Option<String>,
    dev_prefix: Option<String>,
}

/// The authenticated user, as shown by `oneuser show --xml`.
#[derive(Clone, Copy, Debug, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "UPPERCASE")]
pub struct User {
    pub id: u64,
    pub gid: u64,
}

/// Resources not owned by the caller are shown as `owner[name]`.
fn owned(name: String, owner: Option<String>) -> String {
    match owner {
        Some(owner) => format!("{}[{}]", owner, name),
        None => name,
    }
}

fn parse_field<T: FromStr>(
    vm: &str,
    field: &'static str,
    value: Option<String>,
) -> Result<Option<T>, Error> {
    value
        .map(|v| {
            v.trim().parse().map_err(|_| Error::InvalidValue {
                vm: vm.to_string(),
                field,
                value: v.clone(),
            })
        })
        .transpose()
}

impl Vm {
    fn into_record(self) -> Result<VmRecord, Error> {
        let Vm { id, name, gname, permissions, state, template } = self;
        let Template { cpu, vcpu, memory, os, nic, disk } = template;
        let (arch, boot) = os.map_or((None, None), |os| (os.arch, os.boot));

        let mut networks = BTreeMap::new();
        for nic in nic {
            let network = nic.network.ok_or_else(|| Error::InvalidValue {
                vm: name.clone(),
                field: "NIC/NETWORK",
                value: String::new(),
            })?;
            networks.insert(nic.nic_id, owned(network, nic.network_uname));
        }

        let mut disks = Vec::with_capacity(disk.len());
        for d in disk {
            disks.push(DiskSpec {
                image: d.image.map(|image| owned(image, d.image_uname)),
                size_mb: parse_field(&name, "DISK/SIZE", d.size)?,
                dev_prefix: d.dev_prefix,
            });
        }

        let cpu = parse_field(&name, "CPU", cpu)?;
        let vcpu = parse_field(&name, "VCPU", vcpu)?.unwrap_or(DEFAULT_VCPU);
        let mem_mb = parse_field(&name, "MEMORY", memory)?;

        Ok(VmRecord {
            group: gname,
            permissions: permissions.as_ref().map(PermissionMatrix::permissions),
            cpu,
            vcpu,
            mem_mb,
            arch,
            boot,
            networks: networks.into_values().collect(),
            disks: Some(disks),
            template: None,
            id: Some(VmId(id)),
            lifecycle_state: state.map(LifecycleState),
            ..VmRecord::new(name)
        })
    }
}

/// Parses the output of `onevm list --xml`.
pub fn parse_vm_pool(xml: &str) -> Result<Vec<VmRecord>, Error> {
    let pool: VmPool = quick_xml::de::from_str(xml)?;
    pool.vms.into_iter().map(Vm::into_record).collect()
}

/// Parses the output of `oneuser show --xml`.
pub fn parse_user(xml: &str) -> Result<User, Error> {
    Ok(quick_xml::de::from_str(xml)?)
}
