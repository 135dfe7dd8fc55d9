// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Cross-cutting safety checks consulted before destroy, migrate, and
//! scale operations commit to anything.

use crate::app::Orchestrator;
use corral_common::api::external::Error;
use corral_model::Host;
use corral_model::Instance;
use uuid::Uuid;

impl Orchestrator {
    /// Refuse to destroy or move an instance while the backup pipeline
    /// still owns a snapshot of one of its volumes.  "Try later" rather
    /// than racing the backup.
    pub(crate) fn check_no_snapshot_in_flight(
        &self,
        instance_id: &Uuid,
    ) -> Result<(), Error> {
        if self.datastore.snapshot_in_flight_for_instance(instance_id) {
            return Err(Error::invalid_request(&format!(
                "instance {} has a volume snapshot in progress; try again \
                 once it completes",
                instance_id
            )));
        }
        Ok(())
    }

    /// Host-to-host migration compatibility.
    ///
    /// Families must match.  If disks move with the instance, both ends
    /// need a hypervisor version that supports live storage motion, and
    /// volumes on host-local storage cannot move at all without an explicit
    /// storage-migration path.  The destination must also share a storage
    /// access group with every pool holding one of the instance's volumes.
    pub(crate) fn check_migration_compat(
        &self,
        instance: &Instance,
        source: &Host,
        dest: &Host,
    ) -> Result<(), Error> {
        if source.hypervisor != dest.hypervisor {
            return Err(Error::invalid_request(&format!(
                "cannot migrate between hypervisor families {} and {}",
                source.hypervisor, dest.hypervisor
            )));
        }

        let volumes = self.datastore.volumes_for_instance(&instance.id);
        let disks_move = source.cluster_id != dest.cluster_id;
        for volume in &volumes {
            let Some(pool_id) = volume.pool_id else {
                continue;
            };
            let pool = self.datastore.pool_fetch(&pool_id)?;
            if disks_move {
                if pool.local {
                    return Err(Error::invalid_request(&format!(
                        "volume {} lives on host-local storage; use a \
                         storage migration instead",
                        volume.id
                    )));
                }
                if !source.live_storage_motion || !dest.live_storage_motion {
                    return Err(Error::invalid_request(
                        "hypervisor version does not support moving storage \
                         with a live migration",
                    ));
                }
            }
            if !pool.access_groups.is_empty()
                && pool
                    .access_groups
                    .intersection(&dest.storage_access_groups)
                    .next()
                    .is_none()
            {
                return Err(Error::invalid_request(&format!(
                    "host {} has no storage access to pool {}",
                    dest.id, pool.id
                )));
            }
        }
        Ok(())
    }
}
