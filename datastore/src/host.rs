// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! [`DataStore`] methods on the placement hierarchy, including the capacity
//! sums the destination selector runs on.

use crate::DataStore;
use corral_common::api::external::Error;
use corral_common::api::external::LookupResult;
use corral_common::api::external::ResourceType;
use corral_model::Cluster;
use corral_model::Host;
use corral_model::Pod;
use corral_model::StoragePool;
use corral_model::Zone;
use uuid::Uuid;

/// CPU (MHz) and memory (bytes) committed to instances on one host
#[derive(Copy, Clone, Debug, Default, Eq, PartialEq)]
pub struct HostAllocation {
    pub cpu_mhz: u64,
    pub memory_bytes: u64,
}

impl DataStore {
    pub fn zone_upsert(&self, zone: Zone) -> Zone {
        self.tables().zones.insert(zone.id, zone.clone());
        zone
    }

    pub fn pod_upsert(&self, pod: Pod) -> Pod {
        self.tables().pods.insert(pod.id, pod.clone());
        pod
    }

    pub fn cluster_upsert(&self, cluster: Cluster) -> Cluster {
        self.tables().clusters.insert(cluster.id, cluster.clone());
        cluster
    }

    pub fn host_upsert(&self, host: Host) -> Host {
        self.tables().hosts.insert(host.id, host.clone());
        host
    }

    pub fn pool_upsert(&self, pool: StoragePool) -> StoragePool {
        self.tables().pools.insert(pool.id, pool.clone());
        pool
    }

    pub fn host_fetch(&self, host_id: &Uuid) -> LookupResult<Host> {
        self.tables().hosts.get(host_id).cloned().ok_or_else(|| {
            Error::not_found_by_id(ResourceType::Host, host_id)
        })
    }

    pub fn cluster_fetch(&self, cluster_id: &Uuid) -> LookupResult<Cluster> {
        self.tables().clusters.get(cluster_id).cloned().ok_or_else(|| {
            Error::not_found_by_id(ResourceType::Cluster, cluster_id)
        })
    }

    pub fn pool_fetch(&self, pool_id: &Uuid) -> LookupResult<StoragePool> {
        self.tables().pools.get(pool_id).cloned().ok_or_else(|| {
            Error::not_found_by_id(ResourceType::StoragePool, pool_id)
        })
    }

    pub fn pods_in_zone(&self, zone_id: &Uuid) -> Vec<Pod> {
        self.tables()
            .pods
            .values()
            .filter(|pod| pod.zone_id == *zone_id)
            .cloned()
            .collect()
    }

    pub fn clusters_in_pod(&self, pod_id: &Uuid) -> Vec<Cluster> {
        self.tables()
            .clusters
            .values()
            .filter(|cluster| cluster.pod_id == *pod_id)
            .cloned()
            .collect()
    }

    pub fn hosts_in_cluster(&self, cluster_id: &Uuid) -> Vec<Host> {
        self.tables()
            .hosts
            .values()
            .filter(|host| host.cluster_id == *cluster_id)
            .cloned()
            .collect()
    }

    pub fn pools_in_cluster(&self, cluster_id: &Uuid) -> Vec<StoragePool> {
        self.tables()
            .pools
            .values()
            .filter(|pool| pool.cluster_id == *cluster_id)
            .cloned()
            .collect()
    }

    /// Sum of offering-level CPU and memory committed to instances with an
    /// active presence on this host.
    ///
    /// An instance whose offering has gone missing contributes nothing; that
    /// inconsistency is logged rather than silently ignored.
    pub fn host_allocation(&self, host_id: &Uuid) -> HostAllocation {
        let tables = self.tables();
        let mut total = HostAllocation::default();
        for instance in tables.instances.values() {
            if instance.host_id.as_ref() != Some(host_id)
                || instance.state().is_halted()
            {
                continue;
            }
            match tables.offerings.get(&instance.offering_id) {
                Some(offering) => {
                    total.cpu_mhz += offering.cpu_mhz_total();
                    total.memory_bytes += offering.memory.to_bytes();
                }
                None => {
                    slog::error!(self.log,
                        "instance references missing offering";
                        "instance_id" => %instance.id,
                        "offering_id" => %instance.offering_id,
                    );
                }
            }
        }
        total
    }

    /// Fraction of a cluster's total CPU capacity currently committed, used
    /// by the scale-up threshold check.  An empty cluster reports 0.
    pub fn cluster_cpu_utilization(&self, cluster_id: &Uuid) -> f64 {
        let hosts = self.hosts_in_cluster(cluster_id);
        let capacity: u64 = hosts.iter().map(|h| h.cpu_mhz_capacity).sum();
        if capacity == 0 {
            return 0.0;
        }
        let allocated: u64 = hosts
            .iter()
            .map(|host| self.host_allocation(&host.id).cpu_mhz)
            .sum();
        allocated as f64 / capacity as f64
    }
}
