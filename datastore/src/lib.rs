// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! The Corral persistence boundary.
//!
//! [`DataStore`] presents the shape a database-backed store would: records
//! are fetched and updated by value, state changes go through a
//! compare-and-swap gate, and mutual exclusion is expressed as leases with
//! expiry rather than in-memory mutexes, because a fleet of orchestrator
//! processes is assumed to share the store.  The in-process tables behind it
//! keep critical sections short and never hold a lock across an await point.

mod catalog;
mod events;
mod host;
mod instance;
mod lease;
mod network;
mod provisioning;
mod volume;

pub use host::HostAllocation;
pub use instance::UpdaterLock;
pub use lease::ClusterLeaseGuard;
pub use provisioning::Reservation;
pub use provisioning::ReservationSet;
pub use provisioning::ResourceDelta;

use chrono::DateTime;
use chrono::Utc;
use corral_model::Account;
use corral_model::AlertEvent;
use corral_model::AuditEvent;
use corral_model::Cluster;
use corral_model::ComputeOffering;
use corral_model::DiskOffering;
use corral_model::Host;
use corral_model::Instance;
use corral_model::Network;
use corral_model::Nic;
use corral_model::Pod;
use corral_model::StoragePool;
use corral_model::UsageEvent;
use corral_model::Volume;
use corral_model::VolumeSnapshot;
use corral_model::Zone;
use slog::o;
use slog::Logger;
use std::collections::BTreeMap;
use std::sync::Arc;
use std::sync::Mutex;
use std::sync::MutexGuard;
use uuid::Uuid;

pub struct DataStore {
    log: Logger,
    inner: Mutex<Tables>,
    provisioning: Arc<provisioning::ProvisioningState>,
}

/// Every record table in one place, guarded by a single mutex
///
/// This mirrors a transactional store: any multi-table read the components
/// need (capacity sums, snapshot joins) happens under one consistent view.
#[derive(Default)]
struct Tables {
    accounts: BTreeMap<Uuid, Account>,
    instances: BTreeMap<Uuid, Instance>,
    updater_leases: BTreeMap<Uuid, instance::UpdaterLease>,
    cluster_leases: BTreeMap<String, lease::ClusterLease>,
    offerings: BTreeMap<Uuid, ComputeOffering>,
    disk_offerings: BTreeMap<Uuid, DiskOffering>,
    volumes: BTreeMap<Uuid, Volume>,
    snapshots: BTreeMap<Uuid, VolumeSnapshot>,
    zones: BTreeMap<Uuid, Zone>,
    pods: BTreeMap<Uuid, Pod>,
    clusters: BTreeMap<Uuid, Cluster>,
    hosts: BTreeMap<Uuid, Host>,
    pools: BTreeMap<Uuid, StoragePool>,
    networks: BTreeMap<Uuid, Network>,
    nics: BTreeMap<Uuid, Nic>,
    usage_events: Vec<UsageEvent>,
    alert_events: Vec<AlertEvent>,
    audit_events: Vec<AuditEvent>,
}

impl DataStore {
    pub fn new(log: &Logger) -> Arc<DataStore> {
        Arc::new(DataStore {
            log: log.new(o!("component" => "DataStore")),
            inner: Mutex::new(Tables::default()),
            provisioning: Arc::new(provisioning::ProvisioningState::default()),
        })
    }

    fn tables(&self) -> MutexGuard<'_, Tables> {
        // Poisoning requires a panic while the lock is held; treat that as
        // fatal rather than limping along with torn tables.
        self.inner.lock().expect("datastore tables poisoned")
    }
}

/// Returns whether a lease expiry in the past makes the lease free for the
/// taking.
fn lease_expired(expires: DateTime<Utc>) -> bool {
    expires <= Utc::now()
}
