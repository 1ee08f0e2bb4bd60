// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! OpenNebula backend, driving the `oneuser`, `onevm` and `onetemplate`
//! command line tools.

use std::process::ExitStatus;

use opm::gateway::{self, ControlPlane, Resize};
use opm_types::{DiskSpec, Permissions, VmId, VmRecord};
use slog::{debug, info, warn, Logger};
use thiserror::Error;

mod command;
mod xml;

use command::Input;
pub use xml::{parse_user, parse_vm_pool, User};

/// Environment variable naming the XML-RPC endpoint used by the tools.
pub const ENDPOINT_VAR: &str = "ONE_XMLRPC";

const TOOLS: [&str; 3] = ["oneuser", "onevm", "onetemplate"];

#[derive(Error, Debug)]
pub enum Error {
    #[error(
        "Undefined environment variable ONE_XMLRPC, define it with: \
        export ONE_XMLRPC=\"http://your_opennebula_host:2633/RPC2\""
    )]
    MissingEndpoint,

    #[error("Error while running command {command}: {source}")]
    Spawn {
        command: String,
        #[source]
        source: std::io::Error,
    },

    #[error(
        "Command {command} failed ({status}, stdout: {stdout:?}, stderr: {stderr:?})"
    )]
    Failed { command: String, status: ExitStatus, stdout: String, stderr: String },

    #[error("Malformed XML from the control plane: {0}")]
    Xml(#[from] quick_xml::DeError),

    #[error("VM {vm}: invalid {field} value {value:?}")]
    InvalidValue { vm: String, field: &'static str, value: String },

    #[error("Could not detect the VM id after creating {0}")]
    MissingVmId(String),

    #[error("VM {vm}: disk {index} has no image")]
    DiskWithoutImage { vm: String, index: usize },

    #[error(
        "{0}; try to log in using `oneuser login your_user_name --force` first"
    )]
    NotLoggedIn(#[source] Box<Error>),
}

impl From<Error> for gateway::Error {
    fn from(err: Error) -> Self {
        gateway::Error::backend(err)
    }
}

/// Checks the value of [`ENDPOINT_VAR`].
pub fn verify_endpoint(endpoint: Option<String>) -> Result<String, Error> {
    endpoint.filter(|e| !e.trim().is_empty()).ok_or(Error::MissingEndpoint)
}

/// `image`, `image:size=S`, `image:dev_prefix=P` or
/// `image:size=S:dev_prefix=P`.
pub fn disk_arg(disk: &DiskSpec) -> Option<String> {
    let mut arg = disk.image.clone()?;
    if let Some(size) = disk.size_mb {
        arg.push_str(&format!(":size={}", size));
    }
    if let Some(prefix) = &disk.dev_prefix {
        arg.push_str(&format!(":dev_prefix={}", prefix));
    }
    Some(arg)
}

/// Arguments shared by `onevm create` and `onetemplate instantiate`.
///
/// VMs are always created on hold so that nothing boots before the caller
/// has had a chance to adjust ownership.
pub fn create_args(vm: &VmRecord) -> Result<Vec<String>, Error> {
    let mut args = vec!["--name".to_string(), vm.name.clone(), "--hold".to_string()];
    if let Some(cpu) = vm.cpu {
        args.extend(["--cpu".to_string(), cpu.to_string()]);
    }
    args.extend(["--vcpu".to_string(), vm.vcpu.to_string()]);
    if let Some(mem) = vm.mem_mb {
        args.extend(["--memory".to_string(), format!("{}m", mem)]);
    }
    if let Some(arch) = &vm.arch {
        args.extend(["--arch".to_string(), arch.clone()]);
    }
    if let Some(boot) = &vm.boot {
        args.extend(["--boot".to_string(), boot.clone()]);
    }
    if !vm.networks.is_empty() {
        args.extend(["--nic".to_string(), vm.networks.join(",")]);
    }
    if let Some(disks) = vm.disks.as_ref().filter(|d| !d.is_empty()) {
        let disks = disks
            .iter()
            .enumerate()
            .map(|(index, disk)| {
                disk_arg(disk).ok_or_else(|| Error::DiskWithoutImage {
                    vm: vm.name.clone(),
                    index,
                })
            })
            .collect::<Result<Vec<_>, _>>()?;
        args.extend(["--disk".to_string(), disks.join(",")]);
    }
    Ok(args)
}

/// Arguments of `onevm resize`, without the trailing VM id.
pub fn resize_args(resize: &Resize) -> Vec<String> {
    let mut args = Vec::new();
    if let Some(cpu) = resize.cpu {
        args.extend(["--cpu".to_string(), cpu.to_string()]);
    }
    if let Some(vcpu) = resize.vcpu {
        args.extend(["--vcpu".to_string(), vcpu.to_string()]);
    }
    if let Some(mem) = resize.mem_mb {
        args.extend(["--memory".to_string(), mem.to_string()]);
    }
    args
}

/// Finds the identifier on a `<prefix><n>` line of a creation command's
/// output.
pub fn created_id(output: &str, prefix: &str) -> Option<VmId> {
    output.lines().find_map(|line| {
        line.trim_end().strip_prefix(prefix)?.trim().parse().ok().map(VmId)
    })
}

/// Drives OpenNebula through its command line tools.
pub struct OneCli {
    log: Logger,
}

impl OneCli {
    pub fn new(log: Logger) -> Self {
        Self { log }
    }

    fn onevm(&self, args: Vec<String>) -> Result<String, Error> {
        command::run(&self.log, "onevm", &args, Input::Null)
    }
}

fn argv<const N: usize>(args: [&str; N]) -> Vec<String> {
    args.iter().map(|s| s.to_string()).collect()
}

impl ControlPlane for OneCli {
    fn verify(&mut self) -> Result<(), gateway::Error> {
        let endpoint = verify_endpoint(std::env::var(ENDPOINT_VAR).ok())?;
        info!(self.log, "Using OpenNebula endpoint"; "var" => ENDPOINT_VAR, "endpoint" => &endpoint);

        for tool in TOOLS {
            command::probe(&self.log, tool)?;
        }

        let user = command::run(
            &self.log,
            "oneuser",
            &argv(["show", "--xml"]),
            Input::Null,
        )
        .and_then(|out| parse_user(&out))
        .map_err(|e| Error::NotLoggedIn(Box::new(e)))?;
        info!(self.log, "User has a valid authorization token";
            "uid" => user.id, "gid" => user.gid);
        Ok(())
    }

    fn list(&self) -> Result<Vec<VmRecord>, gateway::Error> {
        let out = self.onevm(argv(["list", "--xml"]))?;
        let vms = parse_vm_pool(&out)?;
        debug!(self.log, "Listed VMs"; "count" => vms.len());
        Ok(vms)
    }

    fn create(&self, target: &VmRecord) -> Result<VmId, gateway::Error> {
        let mut args = create_args(target)?;
        let (out, prefix) = match &target.template {
            None => (self.onevm([vec!["create".to_string()], args].concat())?, "ID:"),
            Some(template) => {
                warn!(self.log, "Instantiating a template may prompt; accepting the default";
                    "vm" => &target.name, "template" => template);
                args.insert(0, "instantiate".to_string());
                args.push(template.clone());
                let out = command::run(&self.log, "onetemplate", &args, Input::Enter)?;
                (out, "VM ID:")
            }
        };
        let id = created_id(&out, prefix)
            .ok_or_else(|| Error::MissingVmId(target.name.clone()))?;
        debug!(self.log, "Created VM"; "vm" => &target.name, "id" => %id);
        Ok(id)
    }

    fn terminate(&self, id: VmId) -> Result<(), gateway::Error> {
        self.onevm(argv(["terminate", "--hard", &id.to_string()]))?;
        Ok(())
    }

    fn resize(&self, id: VmId, resize: &Resize) -> Result<(), gateway::Error> {
        let mut args = resize_args(resize);
        if args.is_empty() {
            return Ok(());
        }
        args.insert(0, "resize".to_string());
        args.push(id.to_string());
        self.onevm(args)?;
        Ok(())
    }

    fn set_group(&self, id: VmId, group: &str) -> Result<(), gateway::Error> {
        self.onevm(argv(["chgrp", &id.to_string(), group]))?;
        Ok(())
    }

    fn set_permissions(
        &self,
        id: VmId,
        permissions: &Permissions,
    ) -> Result<(), gateway::Error> {
        self.onevm(argv(["chmod", &id.to_string(), &permissions.to_string()]))?;
        Ok(())
    }
}

#[cfg(test)]
mod test {
    use super::*;

    fn web() -> VmRecord {
        VmRecord {
            cpu: Some(0.1),
            vcpu: 2,
            mem_mb: Some(256),
            networks: vec!["cloud".to_string(), "netadmin[dmz]".to_string()],
            disks: Some(vec![
                DiskSpec::from_image("ttylinux"),
                DiskSpec {
                    size_mb: Some(1024),
                    dev_prefix: Some("vd".to_string()),
                    ..DiskSpec::from_image("data")
                },
            ]),
            ..VmRecord::new("demo-web")
        }
    }

    #[test]
    fn endpoint_must_be_set() {
        assert!(matches!(verify_endpoint(None), Err(Error::MissingEndpoint)));
        assert!(matches!(
            verify_endpoint(Some(" ".to_string())),
            Err(Error::MissingEndpoint)
        ));
        let url = "http://one:2633/RPC2".to_string();
        assert_eq!(verify_endpoint(Some(url.clone())).unwrap(), url);
        assert!(Error::MissingEndpoint.to_string().contains("export ONE_XMLRPC="));
    }

    #[test]
    fn disk_arguments() {
        let disk = |size, prefix: Option<&str>| DiskSpec {
            size_mb: size,
            dev_prefix: prefix.map(str::to_string),
            ..DiskSpec::from_image("img")
        };
        assert_eq!(disk_arg(&disk(None, None)).as_deref(), Some("img"));
        assert_eq!(disk_arg(&disk(Some(5), None)).as_deref(), Some("img:size=5"));
        assert_eq!(
            disk_arg(&disk(None, Some("sd"))).as_deref(),
            Some("img:dev_prefix=sd")
        );
        assert_eq!(
            disk_arg(&disk(Some(5), Some("sd"))).as_deref(),
            Some("img:size=5:dev_prefix=sd")
        );
        assert_eq!(disk_arg(&DiskSpec::default()), None);
    }

    #[test]
    fn full_create_arguments() {
        let vm = VmRecord {
            arch: Some("x86_64".to_string()),
            boot: Some("disk0".to_string()),
            ..web()
        };
        assert_eq!(
            create_args(&vm).unwrap(),
            vec![
                "--name", "demo-web", "--hold",
                "--cpu", "0.1",
                "--vcpu", "2",
                "--memory", "256m",
                "--arch", "x86_64",
                "--boot", "disk0",
                "--nic", "cloud,netadmin[dmz]",
                "--disk", "ttylinux,data:size=1024:dev_prefix=vd",
            ]
        );
    }

    #[test]
    fn minimal_create_arguments() {
        let vm = VmRecord { disks: Some(Vec::new()), ..VmRecord::new("demo-x") };
        assert_eq!(
            create_args(&vm).unwrap(),
            vec!["--name", "demo-x", "--hold", "--vcpu", "1"]
        );
    }

    #[test]
    fn create_rejects_imageless_disk() {
        let vm = VmRecord {
            disks: Some(vec![DiskSpec::from_image("a"), DiskSpec::default()]),
            ..web()
        };
        match create_args(&vm) {
            Err(Error::DiskWithoutImage { vm, index }) => {
                assert_eq!(vm, "demo-web");
                assert_eq!(index, 1);
            }
            other => panic!("unexpected result {:?}", other),
        }
    }

    #[test]
    fn resize_arguments() {
        assert!(resize_args(&Resize::default()).is_empty());
        assert_eq!(
            resize_args(&Resize { cpu: Some(0.5), vcpu: None, mem_mb: Some(512) }),
            vec!["--cpu", "0.5", "--memory", "512"]
        );
    }

    #[test]
    fn identifier_from_output() {
        assert_eq!(created_id("ID: 42\n", "ID:"), Some(VmId(42)));
        assert_eq!(
            created_id("Template ID: 3\nVM ID: 57\n", "VM ID:"),
            Some(VmId(57))
        );
        // `VM ID:` lines must not satisfy the onevm pattern
        assert_eq!(created_id("VM ID: 57\n", "ID:"), None);
        assert_eq!(created_id("nothing here", "ID:"), None);
        assert_eq!(created_id("ID: many\n", "ID:"), None);
    }

    #[test]
    fn backend_errors_convert() {
        let err: gateway::Error = Error::MissingVmId("demo-web".to_string()).into();
        assert!(matches!(err, gateway::Error::Backend(_)));
        assert_eq!(err.to_string(), "Could not detect the VM id after creating demo-web");
    }

    #[test]
    fn login_hint() {
        let err = Error::NotLoggedIn(Box::new(Error::MissingVmId("x".to_string())));
        assert!(err.to_string().contains("oneuser login"));
    }
}
