// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Learns guest IPv4 addresses on networks where the control plane cannot
//! assign them itself.
//!
//! On Shared and L2 networks the guest's address shows up only inside the
//! guest, so the orchestrator probes the agent for it after boot.  Each
//! tracked NIC gets a bounded number of probe attempts; on success the
//! address is persisted, on exhaustion the NIC is dropped from the tracker
//! and an alert is emitted.  The tracker is process-local and rebuilt from
//! persisted state ("Running instances on Shared/L2 networks missing an
//! IPv4 address"), so losing it only delays convergence.

use crate::agent::VmmCommand;
use crate::app::background::BackgroundTask;
use crate::app::Orchestrator;
use crate::context::OpContext;
use corral_common::api::external::Generation;
use corral_model::AlertKind;
use futures::future::BoxFuture;
use futures::FutureExt;
use std::collections::BTreeMap;
use std::collections::BTreeSet;
use std::net::Ipv4Addr;
use std::sync::Arc;
use tokio::sync::Semaphore;
use tokio::task::JoinSet;
use uuid::Uuid;

const LEASE_NAME: &str = "ip-fetch";

/// Background task that reconciles guest-reported IP addresses.
pub struct IpFetchTask {
    orchestrator: Arc<Orchestrator>,
    /// per-NIC retry budget; process-local
    tracker: BTreeMap<Uuid, IpFetchEntry>,
    /// NICs that ran out of retries, with the instance state generation at
    /// the time; a later generation means the instance booted again and the
    /// NIC becomes eligible for tracking once more
    exhausted: BTreeMap<Uuid, Generation>,
}

struct IpFetchEntry {
    instance_id: Uuid,
    retries_remaining: u32,
}

#[derive(Debug, Default)]
struct ActivationResults {
    tracked: usize,
    fetched: usize,
    exhausted: usize,
    error_count: usize,
}

impl IpFetchTask {
    pub fn new(orchestrator: Arc<Orchestrator>) -> Self {
        Self {
            orchestrator,
            tracker: BTreeMap::new(),
            exhausted: BTreeMap::new(),
        }
    }

    /// Reconcile the tracker against persisted state: adopt NICs that
    /// newly need an address, drop ones that no longer do.
    fn sync_tracker(&mut self) {
        let datastore = self.orchestrator.datastore();
        let max_retries =
            self.orchestrator.config().background.ip_fetch.max_retries;
        let missing = datastore.nics_missing_guest_ip();
        let missing_ids: BTreeSet<Uuid> =
            missing.iter().map(|nic| nic.id).collect();

        self.tracker.retain(|nic_id, _| missing_ids.contains(nic_id));
        self.exhausted.retain(|nic_id, _| missing_ids.contains(nic_id));

        for nic in missing {
            if self.tracker.contains_key(&nic.id) {
                continue;
            }
            if let Some(exhausted_gen) = self.exhausted.get(&nic.id) {
                match datastore.instance_fetch(&nic.instance_id) {
                    Ok(instance)
                        if instance.runtime.gen == *exhausted_gen =>
                    {
                        // Same boot we already gave up on.
                        continue;
                    }
                    _ => {
                        self.exhausted.remove(&nic.id);
                    }
                }
            }
            self.tracker.insert(
                nic.id,
                IpFetchEntry {
                    instance_id: nic.instance_id,
                    retries_remaining: max_retries,
                },
            );
        }
    }

    /// Probe every tracked NIC on a bounded worker pool and apply the
    /// results to the tracker.
    async fn fetch_all(
        &mut self,
        results: &mut ActivationResults,
        opctx: &OpContext,
    ) {
        results.tracked = self.tracker.len();
        if self.tracker.is_empty() {
            return;
        }

        let pool_size =
            self.orchestrator.config().background.ip_fetch.pool_size.max(1);
        let semaphore = Arc::new(Semaphore::new(pool_size));
        let mut probes: JoinSet<(Uuid, Option<Ipv4Addr>)> = JoinSet::new();
        for (nic_id, entry) in &self.tracker {
            // Submission applies backpressure: wait for a pool slot rather
            // than spawning without bound.
            let permit = Arc::clone(&semaphore)
                .acquire_owned()
                .await
                .expect("probe pool semaphore closed");
            let orchestrator = Arc::clone(&self.orchestrator);
            let nic_id = *nic_id;
            let instance_id = entry.instance_id;
            probes.spawn(async move {
                let _permit = permit;
                (nic_id, probe_guest_ip(&orchestrator, instance_id, nic_id).await)
            });
        }

        let mut outcomes = Vec::with_capacity(self.tracker.len());
        while let Some(joined) = probes.join_next().await {
            match joined {
                Ok(outcome) => outcomes.push(outcome),
                Err(error) => {
                    slog::error!(opctx.log, "ip probe task panicked";
                        "error" => %error);
                    results.error_count += 1;
                }
            }
        }

        let datastore = self.orchestrator.datastore();
        for (nic_id, fetched) in outcomes {
            let Some(entry) = self.tracker.get_mut(&nic_id) else {
                continue;
            };
            match fetched {
                Some(address) => {
                    if let Err(error) =
                        datastore.nic_set_ipv4(&nic_id, Some(address))
                    {
                        slog::error!(opctx.log, "failed to persist guest ip";
                            "nic_id" => %nic_id,
                            "error" => %error,
                        );
                        results.error_count += 1;
                        continue;
                    }
                    slog::info!(opctx.log, "guest ip learned";
                        "nic_id" => %nic_id,
                        "address" => %address,
                    );
                    self.tracker.remove(&nic_id);
                    results.fetched += 1;
                }
                None => {
                    entry.retries_remaining =
                        entry.retries_remaining.saturating_sub(1);
                    if entry.retries_remaining == 0 {
                        let instance_id = entry.instance_id;
                        self.tracker.remove(&nic_id);
                        if let Ok(instance) =
                            datastore.instance_fetch(&instance_id)
                        {
                            self.exhausted
                                .insert(nic_id, instance.runtime.gen);
                        }
                        datastore.alert_event_record(
                            AlertKind::IpFetchExhausted,
                            &format!(
                                "gave up waiting for instance {} to report \
                                 an address on nic {}",
                                instance_id, nic_id
                            ),
                        );
                        results.exhausted += 1;
                    }
                }
            }
        }
    }
}

/// One probe: ask the agent on the instance's host what the guest reports
/// for this NIC.  Any failure (agent unreachable, command unsuccessful,
/// instance not placed) counts as "no address yet".
async fn probe_guest_ip(
    orchestrator: &Orchestrator,
    instance_id: Uuid,
    nic_id: Uuid,
) -> Option<Ipv4Addr> {
    let instance = orchestrator.datastore().instance_fetch(&instance_id).ok()?;
    let host_id = instance.host_id?;
    match orchestrator
        .agent_call(host_id, VmmCommand::FetchGuestIp { instance_id, nic_id })
        .await
    {
        Ok(answer) if answer.success => answer.guest_ip(),
        Ok(_) => None,
        Err(_) => None,
    }
}

impl BackgroundTask for IpFetchTask {
    fn activate<'a>(
        &'a mut self,
        opctx: &'a OpContext,
    ) -> BoxFuture<'a, serde_json::Value> {
        async move {
            let orchestrator = Arc::clone(&self.orchestrator);
            let locks = &orchestrator.config().locks;
            let Some(_lease) = orchestrator
                .datastore()
                .cluster_lease_try_acquire(
                    LEASE_NAME,
                    orchestrator.id,
                    locks.cluster_lease_timeout(),
                    locks.cluster_lease_ttl(),
                )
                .await
            else {
                return serde_json::json!({ "skipped": "lease contended" });
            };

            self.sync_tracker();
            let mut results = ActivationResults::default();
            self.fetch_all(&mut results, opctx).await;
            serde_json::json!({
                "tracked": results.tracked,
                "fetched": results.fetched,
                "exhausted": results.exhausted,
                "error_count": results.error_count,
                "remaining": self.tracker.len(),
            })
        }
        .boxed()
    }
}
