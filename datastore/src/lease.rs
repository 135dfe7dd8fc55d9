// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! The cluster-wide lease used to keep background sweeps from running on
//! more than one orchestrator at a time.
//!
//! This is best-effort mutual exclusion: acquisition tries for a short,
//! fixed time and then gives up, so a contended cycle is skipped rather
//! than queued.  The lease carries a TTL so a crashed holder frees itself.

use crate::lease_expired;
use crate::DataStore;
use chrono::DateTime;
use chrono::Duration as ChronoDuration;
use chrono::Utc;
use std::sync::Arc;
use std::time::Duration;
use std::time::Instant;
use uuid::Uuid;

const LEASE_RETRY_INTERVAL: Duration = Duration::from_millis(20);

/// Store-side state of one named cluster lease.
pub(crate) struct ClusterLease {
    holder: Uuid,
    gen: u64,
    expires: DateTime<Utc>,
}

/// Holds a named cluster lease; released on drop.
pub struct ClusterLeaseGuard {
    datastore: Arc<DataStore>,
    name: String,
    holder: Uuid,
    gen: u64,
}

impl Drop for ClusterLeaseGuard {
    fn drop(&mut self) {
        let mut tables = self.datastore.tables();
        if let Some(lease) = tables.cluster_leases.get(&self.name) {
            // Only release our own incarnation of the lease; if the TTL
            // lapsed and somebody else took it, leave theirs alone.
            if lease.holder == self.holder && lease.gen == self.gen {
                tables.cluster_leases.remove(&self.name);
            }
        }
    }
}

impl DataStore {
    /// Try to take the named cluster lease, waiting at most `timeout`.
    ///
    /// Returns `None` on contention: callers are expected to skip their
    /// cycle, not to queue up behind the current holder.
    pub async fn cluster_lease_try_acquire(
        self: &Arc<Self>,
        name: &str,
        holder: Uuid,
        timeout: Duration,
        ttl: Duration,
    ) -> Option<ClusterLeaseGuard> {
        let deadline = Instant::now() + timeout;
        loop {
            {
                let mut tables = self.tables();
                let taken = match tables.cluster_leases.get_mut(name) {
                    Some(lease) if !lease_expired(lease.expires) => None,
                    Some(lease) => {
                        lease.holder = holder;
                        lease.gen += 1;
                        lease.expires = lease_expiry(ttl);
                        Some(lease.gen)
                    }
                    None => {
                        tables.cluster_leases.insert(
                            name.to_owned(),
                            ClusterLease {
                                holder,
                                gen: 1,
                                expires: lease_expiry(ttl),
                            },
                        );
                        Some(1)
                    }
                };
                if let Some(gen) = taken {
                    return Some(ClusterLeaseGuard {
                        datastore: Arc::clone(self),
                        name: name.to_owned(),
                        holder,
                        gen,
                    });
                }
            }

            if Instant::now() >= deadline {
                slog::debug!(self.log, "cluster lease contended, skipping";
                    "lease" => name,
                    "holder" => %holder,
                );
                return None;
            }
            tokio::time::sleep(LEASE_RETRY_INTERVAL).await;
        }
    }
}

fn lease_expiry(ttl: Duration) -> DateTime<Utc> {
    Utc::now()
        + ChronoDuration::from_std(ttl)
            .unwrap_or_else(|_| ChronoDuration::seconds(60))
}
