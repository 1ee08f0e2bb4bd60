// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

use std::collections::{BTreeMap, BTreeSet};

use opm_types::{NamingMode, Platform, VmRecord};
use slog::{debug, Logger};

use crate::{Definition, DefinitionError, Document, Overrides};

impl Document {
    pub fn platform(&self) -> Result<Platform, DefinitionError> {
        let naming = if self.platform_is_domain {
            NamingMode::Domain
        } else {
            NamingMode::Prefix
        };
        Ok(Platform::new(&self.platform_name, naming)?)
    }

    /// Resolves every host of the document into its effective record.
    ///
    /// Precedence, lowest first: `defaults`, the most distant ancestor class,
    /// ..., the host's own class, the host's own overrides.
    pub fn resolve(&self, log: &Logger) -> Result<Definition, DefinitionError> {
        let platform = self.platform()?;

        let mut targets = BTreeMap::new();
        for (host, host_def) in self.hosts.iter() {
            debug!(log, "resolving host"; "host" => host, "definition" => ?host_def);
            let vm = self.resolve_host(&platform, host, host_def, log)?;
            debug!(log, "VM final configuration"; "vm" => ?vm);
            targets.insert(vm.name.clone(), vm);
        }

        Ok(Definition { platform, targets })
    }

    fn resolve_host(
        &self,
        platform: &Platform,
        host: &str,
        host_def: &Overrides,
        log: &Logger,
    ) -> Result<VmRecord, DefinitionError> {
        let mut vm = VmRecord::new(platform.vm_name(host));

        if let Some(defaults) = &self.defaults {
            defaults.apply(&mut vm, log);
        }

        for layer in self.class_chain(host, host_def)?.into_iter().rev() {
            layer.apply(&mut vm, log);
        }

        if let Some(disks) = &vm.disks {
            if let Some(index) = disks.iter().position(|d| d.image.is_none()) {
                return Err(DefinitionError::DiskWithoutImage {
                    vm: vm.name.clone(),
                    index,
                });
            }
        }

        Ok(vm)
    }

    /// Returns `host_def` followed by its ancestors, nearest first.
    fn class_chain<'a>(
        &'a self,
        host: &str,
        host_def: &'a Overrides,
    ) -> Result<Vec<&'a Overrides>, DefinitionError> {
        let mut chain = vec![host_def];
        let mut visited = BTreeSet::new();
        let mut referrer = format!("host {}", host);
        let mut current = host_def;

        while let Some(class) = &current.class {
            if !visited.insert(class.as_str()) {
                return Err(DefinitionError::ClassCycle(class.clone()));
            }
            current = self.classes.get(class).ok_or_else(|| {
                DefinitionError::UnknownClass {
                    class: class.clone(),
                    referrer: referrer.clone(),
                }
            })?;
            chain.push(current);
            referrer = format!("class {}", class);
        }

        Ok(chain)
    }
}
