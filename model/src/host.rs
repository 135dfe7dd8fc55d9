// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! The placement hierarchy: zones contain pods contain clusters contain
//! hosts.  Storage pools hang off clusters.

use crate::offering::HypervisorFamily;
use corral_common::api::external::ByteCount;
use serde::Deserialize;
use serde::Serialize;
use std::collections::BTreeSet;
use uuid::Uuid;

#[derive(Clone, Debug, Deserialize, Serialize)]
pub struct Zone {
    pub id: Uuid,
    pub name: String,
    pub enabled: bool,
}

#[derive(Clone, Debug, Deserialize, Serialize)]
pub struct Pod {
    pub id: Uuid,
    pub zone_id: Uuid,
    pub name: String,
    pub enabled: bool,
}

#[derive(Clone, Debug, Deserialize, Serialize)]
pub struct Cluster {
    pub id: Uuid,
    pub pod_id: Uuid,
    pub zone_id: Uuid,
    pub name: String,
    pub enabled: bool,
    pub hypervisor: HypervisorFamily,
}

/// A hypervisor host
#[derive(Clone, Debug, Deserialize, Serialize)]
pub struct Host {
    pub id: Uuid,
    pub name: String,
    pub zone_id: Uuid,
    pub pod_id: Uuid,
    pub cluster_id: Uuid,
    /// total CPU capacity in MHz (cores x clock)
    pub cpu_mhz_capacity: u64,
    pub memory_capacity: ByteCount,
    pub tags: BTreeSet<String>,
    pub enabled: bool,
    pub up: bool,
    /// when set, only instances of this account may be placed here
    pub dedicated_to: Option<Uuid>,
    pub hypervisor: HypervisorFamily,
    /// hypervisor version on this host supports moving disks along with a
    /// live migration
    pub live_storage_motion: bool,
    pub storage_access_groups: BTreeSet<String>,
}

impl Host {
    /// Whether this host may receive new instances at all.
    pub fn is_eligible(&self) -> bool {
        self.enabled && self.up
    }
}

/// Primary storage backing volumes in a cluster
#[derive(Clone, Debug, Deserialize, Serialize)]
pub struct StoragePool {
    pub id: Uuid,
    pub name: String,
    pub cluster_id: Uuid,
    /// host-local storage; volumes here cannot move with a plain migration
    pub local: bool,
    pub access_groups: BTreeSet<String>,
}
