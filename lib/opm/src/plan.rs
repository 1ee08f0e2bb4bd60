// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Partitioning of observed and target VMs, and the action plans built on it.

use std::collections::BTreeSet;

use strum::{Display, EnumIter, EnumString};

/// What to do with a definition document.
#[derive(
    Clone, Copy, Debug, PartialEq, Eq, Display, EnumIter, EnumString,
)]
#[strum(serialize_all = "kebab-case")]
pub enum Action {
    /// Report missing, present and unreferenced VMs.
    Status,
    CreateMissing,
    /// Bring present VMs in line with their definition.
    Synchronize,
    DeleteUnreferenced,
    /// Destroy every present VM of the platform.
    DeleteAll,
    /// Print the resolved definitions without contacting the control plane.
    ParseOnly,
}

impl Action {
    /// Whether the action needs to know which VMs exist.
    pub fn needs_discovery(&self) -> bool {
        !matches!(self, Action::ParseOnly)
    }
}

/// Observed and target VM names split three ways.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct Partition {
    /// Targets which do not exist.
    pub missing: BTreeSet<String>,
    /// Targets which exist.
    pub present: BTreeSet<String>,
    /// Existing VMs which are not targets.
    pub unreferenced: BTreeSet<String>,
}

impl Partition {
    pub fn new<'a, O, T>(observed: O, target: T) -> Self
    where
        O: IntoIterator<Item = &'a str>,
        T: IntoIterator<Item = &'a str>,
    {
        let observed: BTreeSet<&str> = observed.into_iter().collect();
        let target: BTreeSet<&str> = target.into_iter().collect();
        let owned = |set: BTreeSet<&&str>| {
            set.into_iter().map(|s| s.to_string()).collect::<BTreeSet<_>>()
        };

        Self {
            missing: owned(target.difference(&observed).collect()),
            present: owned(target.intersection(&observed).collect()),
            unreferenced: owned(observed.difference(&target).collect()),
        }
    }

    /// Lays out the steps of `action`, in a stable order.
    pub fn plan(&self, action: Action) -> Vec<Step> {
        let steps = |names: &BTreeSet<String>, step: fn(String) -> Step| {
            names.iter().cloned().map(step).collect::<Vec<_>>()
        };

        match action {
            Action::Status => {
                let mut plan = steps(&self.missing, Step::ReportMissing);
                plan.extend(steps(&self.present, Step::ReportPresent));
                plan.extend(steps(&self.unreferenced, Step::ReportUnreferenced));
                plan
            }
            Action::CreateMissing => steps(&self.missing, Step::Create),
            Action::Synchronize => steps(&self.present, Step::Synchronize),
            Action::DeleteUnreferenced => {
                steps(&self.unreferenced, Step::Destroy)
            }
            Action::DeleteAll => steps(&self.present, Step::Destroy),
            Action::ParseOnly => {
                let targets: BTreeSet<String> =
                    self.missing.union(&self.present).cloned().collect();
                steps(&targets, Step::Print)
            }
        }
    }
}

/// A single operation on a named VM.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Step {
    ReportMissing(String),
    ReportPresent(String),
    ReportUnreferenced(String),
    Create(String),
    Synchronize(String),
    Destroy(String),
    Print(String),
}
