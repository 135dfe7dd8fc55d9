// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! [`DataStore`] methods on volumes and volume snapshots.

use crate::DataStore;
use corral_common::api::external::ByteCount;
use corral_common::api::external::CreateResult;
use corral_common::api::external::DeleteResult;
use corral_common::api::external::Error;
use corral_common::api::external::LookupResult;
use corral_common::api::external::ResourceType;
use corral_common::api::external::UpdateResult;
use corral_model::Volume;
use corral_model::VolumeKind;
use corral_model::VolumeSnapshot;
use corral_model::VolumeSnapshotState;
use corral_model::VolumeState;
use uuid::Uuid;

impl DataStore {
    pub fn volume_create(&self, volume: Volume) -> CreateResult<Volume> {
        let mut tables = self.tables();
        if tables.volumes.contains_key(&volume.id) {
            return Err(Error::ObjectAlreadyExists {
                type_name: ResourceType::Volume,
                object_name: volume.id.to_string(),
            });
        }
        if volume.kind == VolumeKind::Root {
            if let Some(instance_id) = volume.instance_id {
                let has_root = tables.volumes.values().any(|v| {
                    v.instance_id == Some(instance_id)
                        && v.kind == VolumeKind::Root
                        && v.state != VolumeState::Destroy
                });
                if has_root {
                    return Err(Error::invalid_request(&format!(
                        "instance {} already has a ROOT volume",
                        instance_id
                    )));
                }
            }
        }
        tables.volumes.insert(volume.id, volume.clone());
        Ok(volume)
    }

    pub fn volume_fetch(&self, volume_id: &Uuid) -> LookupResult<Volume> {
        self.tables().volumes.get(volume_id).cloned().ok_or_else(|| {
            Error::not_found_by_id(ResourceType::Volume, volume_id)
        })
    }

    pub fn volumes_for_instance(&self, instance_id: &Uuid) -> Vec<Volume> {
        self.tables()
            .volumes
            .values()
            .filter(|volume| volume.instance_id == Some(*instance_id))
            .cloned()
            .collect()
    }

    pub fn root_volume_for_instance(
        &self,
        instance_id: &Uuid,
    ) -> LookupResult<Volume> {
        self.tables()
            .volumes
            .values()
            .find(|volume| {
                volume.instance_id == Some(*instance_id)
                    && volume.kind == VolumeKind::Root
                    && volume.state != VolumeState::Destroy
            })
            .cloned()
            .ok_or_else(|| {
                Error::not_found_by_name(
                    ResourceType::Volume,
                    &format!("ROOT volume of instance {}", instance_id),
                )
            })
    }

    /// Locate the ROOT volume of a soft-deleted instance so recovery can
    /// re-attach it.  Unlike [`DataStore::root_volume_for_instance`] this
    /// includes volumes already marked for destruction.
    pub fn root_volume_for_recovery(
        &self,
        instance_id: &Uuid,
    ) -> LookupResult<Volume> {
        self.tables()
            .volumes
            .values()
            .find(|volume| {
                volume.instance_id == Some(*instance_id)
                    && volume.kind == VolumeKind::Root
            })
            .cloned()
            .ok_or_else(|| {
                Error::not_found_by_name(
                    ResourceType::Volume,
                    &format!("ROOT volume of instance {}", instance_id),
                )
            })
    }

    pub fn volume_update_state(
        &self,
        volume_id: &Uuid,
        state: VolumeState,
    ) -> UpdateResult<Volume> {
        let mut tables = self.tables();
        let volume = tables.volumes.get_mut(volume_id).ok_or_else(|| {
            Error::not_found_by_id(ResourceType::Volume, volume_id)
        })?;
        volume.state = state;
        Ok(volume.clone())
    }

    pub fn volume_set_pool(
        &self,
        volume_id: &Uuid,
        pool_id: Uuid,
    ) -> UpdateResult<Volume> {
        let mut tables = self.tables();
        let volume = tables.volumes.get_mut(volume_id).ok_or_else(|| {
            Error::not_found_by_id(ResourceType::Volume, volume_id)
        })?;
        volume.pool_id = Some(pool_id);
        Ok(volume.clone())
    }

    /// Apply a new disk offering (and size) to a volume, as part of a scale
    /// operation.
    pub fn volume_set_disk_offering(
        &self,
        volume_id: &Uuid,
        disk_offering_id: Uuid,
        size: ByteCount,
    ) -> UpdateResult<Volume> {
        let mut tables = self.tables();
        let volume = tables.volumes.get_mut(volume_id).ok_or_else(|| {
            Error::not_found_by_id(ResourceType::Volume, volume_id)
        })?;
        volume.disk_offering_id = Some(disk_offering_id);
        volume.size = size;
        Ok(volume.clone())
    }

    /// Hard-delete a volume record and any snapshots hanging off it.
    pub fn volume_remove(&self, volume_id: &Uuid) -> DeleteResult {
        let mut tables = self.tables();
        if tables.volumes.remove(volume_id).is_none() {
            return Err(Error::not_found_by_id(
                ResourceType::Volume,
                volume_id,
            ));
        }
        tables.snapshots.retain(|_, snap| snap.volume_id != *volume_id);
        Ok(())
    }

    pub fn snapshot_create(
        &self,
        snapshot: VolumeSnapshot,
    ) -> CreateResult<VolumeSnapshot> {
        let mut tables = self.tables();
        if !tables.volumes.contains_key(&snapshot.volume_id) {
            return Err(Error::not_found_by_id(
                ResourceType::Volume,
                &snapshot.volume_id,
            ));
        }
        tables.snapshots.insert(snapshot.id, snapshot.clone());
        Ok(snapshot)
    }

    pub fn snapshot_update_state(
        &self,
        snapshot_id: &Uuid,
        state: VolumeSnapshotState,
    ) -> UpdateResult<VolumeSnapshot> {
        let mut tables = self.tables();
        let snapshot =
            tables.snapshots.get_mut(snapshot_id).ok_or_else(|| {
                Error::not_found_by_id(ResourceType::VolumeSnapshot, snapshot_id)
            })?;
        snapshot.state = state;
        Ok(snapshot.clone())
    }

    /// Whether any volume of this instance has a snapshot the backup
    /// pipeline still owns.  Destroy and migrate must not race those.
    pub fn snapshot_in_flight_for_instance(&self, instance_id: &Uuid) -> bool {
        let tables = self.tables();
        tables.snapshots.values().any(|snapshot| {
            if snapshot.state.is_terminal() {
                return false;
            }
            tables
                .volumes
                .get(&snapshot.volume_id)
                .map(|volume| volume.instance_id == Some(*instance_id))
                .unwrap_or(false)
        })
    }
}
