// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

use std::collections::BTreeMap;
use std::io::Write;

use opm_definition::Definition;
use opm_types::VmRecord;
use slog::{debug, info, Logger};

use crate::diff::compare;
use crate::gateway::{ControlPlane, Gateway};
use crate::plan::{Action, Partition, Step};
use crate::Error;

/// Drives definition documents against a control plane, writing one report
/// line per VM touched to `out`.
pub struct Reconciler<C, W> {
    gateway: Gateway<C>,
    out: W,
    log: Logger,
}

/// The VMs of one document, while it is being reconciled.
struct Fleet {
    targets: BTreeMap<String, VmRecord>,
    observed: BTreeMap<String, VmRecord>,
}

impl Fleet {
    fn target(&mut self, name: &str) -> &mut VmRecord {
        self.targets.get_mut(name).expect("planned target exists")
    }

    fn observed(&mut self, name: &str) -> &mut VmRecord {
        self.observed.get_mut(name).expect("planned VM was observed")
    }
}

fn id_label(vm: &VmRecord) -> String {
    match vm.id {
        Some(id) => id.to_string(),
        None => "unknown".to_string(),
    }
}

impl<C: ControlPlane, W: Write> Reconciler<C, W> {
    pub fn new(control_plane: C, out: W, log: Logger) -> Self {
        let gateway = Gateway::new(control_plane, log.new(slog::o!()));
        Self { gateway, out, log }
    }

    pub fn into_output(self) -> W {
        self.out
    }

    /// Reconciles one resolved definition.
    ///
    /// The first failing step aborts the remaining ones; steps already taken
    /// are not undone.
    pub fn run(
        &mut self,
        action: Action,
        definition: Definition,
    ) -> Result<(), Error> {
        let Definition { platform, targets } = definition;
        let log = self.log.new(slog::o!("platform" => platform.to_string()));

        let observed = if action.needs_discovery() {
            self.gateway.discover(&platform)?
        } else {
            BTreeMap::new()
        };

        let partition = Partition::new(
            observed.keys().map(String::as_str),
            targets.keys().map(String::as_str),
        );
        debug!(log, "partitioned VMs"; "partition" => ?partition);

        let mut fleet = Fleet { targets, observed };
        for step in partition.plan(action) {
            self.step(&log, &mut fleet, step)?;
        }
        Ok(())
    }

    fn step(
        &mut self,
        log: &Logger,
        fleet: &mut Fleet,
        step: Step,
    ) -> Result<(), Error> {
        match step {
            Step::ReportMissing(name) => {
                writeln!(self.out, "{}: missing", name)?;
            }
            Step::ReportPresent(name) => {
                let vm = fleet.observed(&name);
                writeln!(self.out, "{}: present ID {}", name, id_label(vm))?;
            }
            Step::ReportUnreferenced(name) => {
                let vm = fleet.observed(&name);
                writeln!(self.out, "{}: unreferenced ID {}", name, id_label(vm))?;
            }
            Step::Print(name) => {
                writeln!(self.out, "{}", fleet.target(&name))?;
            }
            Step::Create(name) => {
                info!(log, "VM does not exist, creating it"; "vm" => &name);
                let id = self.gateway.create(fleet.target(&name))?;
                debug!(log, "Created VM"; "vm" => &name, "id" => id.0);
                writeln!(self.out, "{}: created ID {}", name, id)?;
            }
            Step::Destroy(name) => {
                info!(log, "Destroying VM"; "vm" => &name);
                let id = self.gateway.destroy(fleet.observed(&name))?;
                debug!(log, "Destroyed VM"; "vm" => &name, "id" => id.0);
                writeln!(self.out, "{}: destroyed ID {}", name, id)?;
            }
            Step::Synchronize(name) => {
                info!(log, "Synchronizing VM"; "vm" => &name);
                let target = fleet.targets[&name].clone();
                let observed = fleet.observed(&name);
                if observed.name != target.name {
                    return Err(Error::NameMismatch {
                        observed: observed.name.clone(),
                        target: target.name,
                    });
                }

                let changes = compare(observed, &target)?;
                if !changes.is_empty() {
                    writeln!(
                        self.out,
                        "{}: ID {}, {}",
                        name,
                        id_label(observed),
                        changes.describe()
                    )?;
                    self.gateway.synchronize(observed, &changes)?;
                }
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::gateway::{self, MockControlPlane, Resize};
    use mockall::predicate::eq;
    use mockall::Sequence;
    use opm_types::{DiskSpec, LifecycleState, VmId};

    fn logger() -> Logger {
        Logger::root(slog::Discard, slog::o!())
    }

    fn definition(json: &str) -> Definition {
        opm_definition::parse_str(json).unwrap().resolve(&logger()).unwrap()
    }

    fn demo() -> Definition {
        definition(
            r#"{
                "format_version": 4,
                "platform_name": "demo",
                "defaults": {"cpu_percent": 0.2, "mem_mb": 1024, "networks": ["lan"]},
                "hosts": {
                    "web": {},
                    "db": {"cpu_percent": 0.5},
                    "cache": {}
                }
            }"#,
        )
    }

    fn observed(name: &str, id: u64, state: LifecycleState) -> VmRecord {
        VmRecord {
            cpu: Some(0.2),
            mem_mb: Some(1024),
            networks: vec!["lan".to_string()],
            disks: Some(Vec::new()),
            id: Some(VmId(id)),
            lifecycle_state: Some(state),
            ..VmRecord::new(name)
        }
    }

    fn control_plane(vms: Vec<VmRecord>) -> MockControlPlane {
        let mut cp = MockControlPlane::new();
        cp.expect_verify().times(1).returning(|| Ok(()));
        cp.expect_list().returning(move || Ok(vms.clone()));
        cp
    }

    fn output<C: ControlPlane>(r: Reconciler<C, Vec<u8>>) -> String {
        String::from_utf8(r.into_output()).unwrap()
    }

    #[test]
    fn status_reports_every_set() {
        let cp = control_plane(vec![
            observed("demo-web", 10, LifecycleState::ACTIVE),
            observed("demo-old", 11, LifecycleState::ACTIVE),
            observed("unrelated", 12, LifecycleState::ACTIVE),
        ]);
        let mut r = Reconciler::new(cp, Vec::new(), logger());
        r.run(Action::Status, demo()).unwrap();
        assert_eq!(
            output(r),
            "demo-cache: missing\n\
            demo-db: missing\n\
            demo-web: present ID 10\n\
            demo-old: unreferenced ID 11\n"
        );
    }

    #[test]
    fn parse_only_never_contacts_the_control_plane() {
        let mut cp = MockControlPlane::new();
        cp.expect_verify().never();
        cp.expect_list().never();

        let mut r = Reconciler::new(cp, Vec::new(), logger());
        r.run(Action::ParseOnly, demo()).unwrap();
        let out = output(r);
        assert!(out.starts_with("name: demo-cache\n"));
        assert!(out.contains("name: demo-db\n\tgroup: unset\n"));
        assert!(out.contains("\tcpu: 0.5\n"));
        assert_eq!(out.matches("name: ").count(), 3);
    }

    #[test]
    fn create_missing_in_name_order() {
        let mut cp = control_plane(vec![observed(
            "demo-web",
            10,
            LifecycleState::ACTIVE,
        )]);
        let mut seq = Sequence::new();
        cp.expect_create()
            .withf(|vm: &VmRecord| vm.name == "demo-cache")
            .times(1)
            .in_sequence(&mut seq)
            .returning(|_| Ok(VmId(20)));
        cp.expect_create()
            .withf(|vm: &VmRecord| vm.name == "demo-db" && vm.cpu == Some(0.5))
            .times(1)
            .in_sequence(&mut seq)
            .returning(|_| Ok(VmId(21)));

        let mut r = Reconciler::new(cp, Vec::new(), logger());
        r.run(Action::CreateMissing, demo()).unwrap();
        assert_eq!(
            output(r),
            "demo-cache: created ID 20\ndemo-db: created ID 21\n"
        );
    }

    #[test]
    fn failing_step_aborts_the_rest() {
        let mut cp = control_plane(Vec::new());
        cp.expect_create().times(1).returning(|_| {
            Err(gateway::Error::backend(std::io::Error::other("boom")))
        });

        let mut r = Reconciler::new(cp, Vec::new(), logger());
        let res = r.run(Action::CreateMissing, demo());
        assert!(matches!(res, Err(Error::Gateway(gateway::Error::Backend(_)))));
        assert_eq!(output(r), "");
    }

    #[test]
    fn synchronize_resizes_changed_vms() {
        let mut cp = control_plane(vec![
            observed("demo-web", 10, LifecycleState::POWEROFF),
            observed("demo-db", 11, LifecycleState::POWEROFF),
        ]);
        cp.expect_resize()
            .with(
                eq(VmId(11)),
                eq(Resize { cpu: Some(0.5), ..Default::default() }),
            )
            .times(1)
            .returning(|_, _| Ok(()));

        let mut r = Reconciler::new(cp, Vec::new(), logger());
        r.run(Action::Synchronize, demo()).unwrap();
        assert_eq!(
            output(r),
            "demo-db: ID 11, changing cpu_percent from 0.2 to 0.5\n"
        );
    }

    #[test]
    fn synchronize_while_running_fails_without_resizing() {
        let mut cp = control_plane(vec![observed(
            "demo-db",
            11,
            LifecycleState::ACTIVE,
        )]);
        cp.expect_resize().never();

        let mut r = Reconciler::new(cp, Vec::new(), logger());
        let res = r.run(Action::Synchronize, demo());
        assert!(matches!(
            res,
            Err(Error::Gateway(gateway::Error::ImmutableEnvelope { .. }))
        ));
    }

    #[test]
    fn synchronize_leaves_network_changes_alone() {
        let mut web = observed("demo-web", 10, LifecycleState::ACTIVE);
        web.networks = vec!["dmz".to_string()];
        let mut cp = control_plane(vec![web]);
        cp.expect_resize().never();
        cp.expect_set_group().never();
        cp.expect_set_permissions().never();

        let mut r = Reconciler::new(cp, Vec::new(), logger());
        r.run(Action::Synchronize, demo()).unwrap();
        assert_eq!(
            output(r),
            "demo-web: ID 10, changing networks from [dmz] to [lan]\n"
        );
    }

    #[test]
    fn synchronize_propagates_disk_precondition() {
        let def = definition(
            r#"{
                "format_version": 4,
                "platform_name": "demo",
                "hosts": {"web": {"disks": [{"image": "debian"}]}}
            }"#,
        );
        let web = VmRecord {
            disks: Some(vec![DiskSpec { size_mb: Some(1), ..Default::default() }]),
            id: Some(VmId(10)),
            lifecycle_state: Some(LifecycleState::ACTIVE),
            ..VmRecord::new("demo-web")
        };
        let cp = control_plane(vec![web]);

        let mut r = Reconciler::new(cp, Vec::new(), logger());
        let res = r.run(Action::Synchronize, def);
        assert!(matches!(res, Err(Error::Disk(_))));
    }

    #[test]
    fn delete_unreferenced_and_delete_all() {
        let vms = vec![
            observed("demo-web", 10, LifecycleState::ACTIVE),
            observed("demo-old", 11, LifecycleState::ACTIVE),
        ];

        let mut cp = control_plane(vms.clone());
        cp.expect_terminate()
            .with(eq(VmId(11)))
            .times(1)
            .returning(|_| Ok(()));
        let mut r = Reconciler::new(cp, Vec::new(), logger());
        r.run(Action::DeleteUnreferenced, demo()).unwrap();
        assert_eq!(output(r), "demo-old: destroyed ID 11\n");

        let mut cp = control_plane(vms);
        cp.expect_terminate()
            .with(eq(VmId(10)))
            .times(1)
            .returning(|_| Ok(()));
        let mut r = Reconciler::new(cp, Vec::new(), logger());
        r.run(Action::DeleteAll, demo()).unwrap();
        assert_eq!(output(r), "demo-web: destroyed ID 10\n");
    }

    #[test]
    fn documents_share_one_session_check() {
        let cp = control_plane(Vec::new());
        let mut r = Reconciler::new(cp, Vec::new(), logger());
        r.run(Action::Status, demo()).unwrap();
        r.run(Action::Status, demo()).unwrap();
        assert_eq!(output(r).lines().count(), 6);
    }
}
