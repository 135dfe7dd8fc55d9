// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Volumes and volume snapshots.

use chrono::DateTime;
use chrono::Utc;
use corral_common::api::external::ByteCount;
use serde::Deserialize;
use serde::Serialize;
use uuid::Uuid;

#[derive(Copy, Clone, Debug, Deserialize, Eq, PartialEq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum VolumeKind {
    Root,
    Data,
}

#[derive(Copy, Clone, Debug, Deserialize, Eq, PartialEq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum VolumeState {
    Allocated,
    Ready,
    Destroy,
}

/// A block storage volume.  Every instance has exactly one ROOT volume;
/// DATADISK volumes are optional.
#[derive(Clone, Debug, Deserialize, Serialize)]
pub struct Volume {
    pub id: Uuid,
    pub name: String,
    pub kind: VolumeKind,
    pub instance_id: Option<Uuid>,
    pub size: ByteCount,
    pub disk_offering_id: Option<Uuid>,
    pub pool_id: Option<Uuid>,
    pub state: VolumeState,
    pub time_created: DateTime<Utc>,
}

impl Volume {
    pub fn new(
        name: &str,
        kind: VolumeKind,
        instance_id: Uuid,
        size: ByteCount,
        disk_offering_id: Option<Uuid>,
    ) -> Self {
        Volume {
            id: Uuid::new_v4(),
            name: name.to_owned(),
            kind,
            instance_id: Some(instance_id),
            size,
            disk_offering_id,
            pool_id: None,
            state: VolumeState::Allocated,
            time_created: Utc::now(),
        }
    }
}

/// States a volume snapshot moves through on its way to the backup store
#[derive(Copy, Clone, Debug, Deserialize, Eq, PartialEq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum VolumeSnapshotState {
    Creating,
    Staging,
    BackingUp,
    BackedUp,
    Error,
}

impl VolumeSnapshotState {
    /// Non-terminal snapshots are still owned by the backup pipeline;
    /// destroy and migrate operations must not race them.
    pub fn is_terminal(&self) -> bool {
        match self {
            VolumeSnapshotState::Creating
            | VolumeSnapshotState::Staging
            | VolumeSnapshotState::BackingUp => false,
            VolumeSnapshotState::BackedUp | VolumeSnapshotState::Error => true,
        }
    }
}

#[derive(Clone, Debug, Deserialize, Serialize)]
pub struct VolumeSnapshot {
    pub id: Uuid,
    pub volume_id: Uuid,
    pub state: VolumeSnapshotState,
    pub time_created: DateTime<Utc>,
}

impl VolumeSnapshot {
    pub fn new(volume_id: Uuid, state: VolumeSnapshotState) -> Self {
        VolumeSnapshot {
            id: Uuid::new_v4(),
            volume_id,
            state,
            time_created: Utc::now(),
        }
    }
}
