// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Deployment and migration destination selection.
//!
//! A caller may pin a host (or narrow the search to a cluster or pod); the
//! pinned host is validated for eligibility, tag compatibility, and
//! capacity.  Unpinned requests go through a [`Planner`], which walks the
//! placement hierarchy in suitability order honoring the exclude list and
//! dedication constraints.  Crossing a dedication boundary is never a hard
//! error; it raises an operator alert only.

use crate::app::Orchestrator;
use corral_common::api::external::Error;
use corral_model::AlertKind;
use corral_model::ComputeOffering;
use corral_model::Host;
use corral_model::Instance;
use std::collections::BTreeSet;
use uuid::Uuid;

/// A resolved placement target
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub struct Destination {
    pub zone_id: Uuid,
    pub pod_id: Uuid,
    pub cluster_id: Uuid,
    pub host_id: Uuid,
}

impl Destination {
    fn for_host(host: &Host) -> Destination {
        Destination {
            zone_id: host.zone_id,
            pod_id: host.pod_id,
            cluster_id: host.cluster_id,
            host_id: host.id,
        }
    }
}

/// Hosts already tried or known unsuitable for the current operation
#[derive(Clone, Debug, Default)]
pub struct ExcludeList {
    hosts: BTreeSet<Uuid>,
}

impl ExcludeList {
    pub fn new() -> ExcludeList {
        ExcludeList::default()
    }

    pub fn add_host(&mut self, host_id: Uuid) {
        self.hosts.insert(host_id);
    }

    pub fn contains_host(&self, host_id: &Uuid) -> bool {
        self.hosts.contains(host_id)
    }
}

/// Caller-supplied placement constraints: pin a specific host, or narrow
/// the open search to one cluster or pod.
#[derive(Clone, Debug, Default)]
pub struct HostPin {
    pub host_id: Option<Uuid>,
    pub cluster_id: Option<Uuid>,
    pub pod_id: Option<Uuid>,
}

/// Everything a planner needs to know about what is being placed
pub struct PlacementRequest<'a> {
    pub instance: &'a Instance,
    pub offering: &'a ComputeOffering,
    /// narrow the search to this pod, if set
    pub pod_id: Option<Uuid>,
    /// narrow the search to this cluster, if set
    pub cluster_id: Option<Uuid>,
}

impl PlacementRequest<'_> {
    fn account_id(&self) -> Uuid {
        self.instance.account_id
    }

    fn zone_id(&self) -> Uuid {
        self.instance.zone_id
    }
}

/// Pluggable placement-search strategy used when no host is pinned
pub trait Planner: Send + Sync {
    fn name(&self) -> &'static str;

    /// Return the first suitable destination, or `None` when nothing in the
    /// zone fits.
    fn select(
        &self,
        orchestrator: &Orchestrator,
        request: &PlacementRequest<'_>,
        excluded: &ExcludeList,
    ) -> Option<Destination>;
}

/// The default planner: walk pods, clusters, and hosts in name order and
/// take the first host that fits.
pub struct FirstFitPlanner;

impl Planner for FirstFitPlanner {
    fn name(&self) -> &'static str {
        "first-fit"
    }

    fn select(
        &self,
        orchestrator: &Orchestrator,
        request: &PlacementRequest<'_>,
        excluded: &ExcludeList,
    ) -> Option<Destination> {
        let datastore = orchestrator.datastore();
        let mut pods = datastore.pods_in_zone(&request.zone_id());
        pods.sort_by(|a, b| a.name.cmp(&b.name));
        for pod in pods.into_iter().filter(|pod| pod.enabled) {
            if let Some(pod_pin) = request.pod_id {
                if pod.id != pod_pin {
                    continue;
                }
            }
            let mut clusters = datastore.clusters_in_pod(&pod.id);
            clusters.sort_by(|a, b| a.name.cmp(&b.name));
            for cluster in
                clusters.into_iter().filter(|cluster| cluster.enabled)
            {
                if let Some(cluster_pin) = request.cluster_id {
                    if cluster.id != cluster_pin {
                        continue;
                    }
                }
                let mut hosts = datastore.hosts_in_cluster(&cluster.id);
                hosts.sort_by(|a, b| a.name.cmp(&b.name));
                for host in hosts {
                    if excluded.contains_host(&host.id) {
                        continue;
                    }
                    if !host.is_eligible() {
                        continue;
                    }
                    // Hosts dedicated to somebody else are an implicit
                    // constraint for the open search; only a pin overrides.
                    if let Some(owner) = host.dedicated_to {
                        if owner != request.account_id() {
                            continue;
                        }
                    }
                    if !orchestrator
                        .host_tags_compatible(&host, request.offering)
                    {
                        continue;
                    }
                    if !orchestrator.host_has_capacity(
                        &host,
                        request.offering.cpu_mhz_total(),
                        request.offering.memory.to_bytes(),
                    ) {
                        continue;
                    }
                    return Some(Destination::for_host(&host));
                }
            }
        }
        None
    }
}

impl Orchestrator {
    /// Whether `host` has room for `extra` CPU and memory on top of what is
    /// already committed to it, with over-provisioning factored in.
    pub(crate) fn host_has_capacity(
        &self,
        host: &Host,
        extra_cpu_mhz: u64,
        extra_memory_bytes: u64,
    ) -> bool {
        let allocation = self.datastore.host_allocation(&host.id);
        let cpu_limit = host.cpu_mhz_capacity as f64
            * self.config.placement.cpu_overprovisioning_factor;
        let memory_limit = host.memory_capacity.to_bytes() as f64
            * self.config.placement.memory_overprovisioning_factor;
        (allocation.cpu_mhz + extra_cpu_mhz) as f64 <= cpu_limit
            && (allocation.memory_bytes + extra_memory_bytes) as f64
                <= memory_limit
    }

    /// Tag compatibility between a host and an offering.
    ///
    /// Every tag the offering requires must be on the host.  Tags on the
    /// configured strict list work the other way as well: a host carrying a
    /// strict tag is reserved for offerings that name it.
    pub(crate) fn host_tags_compatible(
        &self,
        host: &Host,
        offering: &ComputeOffering,
    ) -> bool {
        for required in &offering.host_tags {
            if !host.tags.contains(required) {
                return false;
            }
        }
        for strict in &self.config.placement.strict_host_tags {
            if host.tags.contains(strict)
                && !offering.host_tags.iter().any(|tag| tag == strict)
            {
                return false;
            }
        }
        true
    }

    /// Raise an alert when a placement crosses a dedication boundary:
    /// landing a foreign instance on a dedicated host, or moving between
    /// hosts with different dedication.
    pub(crate) fn note_dedication_crossing(
        &self,
        instance: &Instance,
        dest: &Host,
    ) {
        if let Some(owner) = dest.dedicated_to {
            if owner != instance.account_id {
                self.datastore.alert_event_record(
                    AlertKind::DedicationCrossed,
                    &format!(
                        "instance {} of account {} placed on host {} \
                         dedicated to account {}",
                        instance.id, instance.account_id, dest.id, owner
                    ),
                );
                return;
            }
        }

        let previous = instance.host_id.or(instance.last_host_id);
        if let Some(previous_id) = previous {
            if previous_id == dest.id {
                return;
            }
            if let Ok(previous_host) = self.datastore.host_fetch(&previous_id)
            {
                if previous_host.dedicated_to != dest.dedicated_to {
                    self.datastore.alert_event_record(
                        AlertKind::DedicationCrossed,
                        &format!(
                            "instance {} moved across a dedication boundary \
                             (host {} -> host {})",
                            instance.id, previous_id, dest.id
                        ),
                    );
                }
            }
        }
    }

    /// Resolve a destination for deploying or migrating an instance.
    ///
    /// With a pinned host: validate it and either take it or (by policy)
    /// fall back to the open search.  Without: delegate to the named
    /// planner.  No fit anywhere is [`Error::InsufficientCapacity`].
    pub(crate) fn select_destination(
        &self,
        instance: &Instance,
        offering: &ComputeOffering,
        pin: &HostPin,
        excluded: &ExcludeList,
        planner_name: Option<&str>,
    ) -> Result<Destination, Error> {
        if let Some(host_id) = pin.host_id {
            let host = self.datastore.host_fetch(&host_id)?;
            let suitable = host.zone_id == instance.zone_id
                && host.is_eligible()
                && !excluded.contains_host(&host.id)
                && self.host_tags_compatible(&host, offering)
                && self.host_has_capacity(
                    &host,
                    offering.cpu_mhz_total(),
                    offering.memory.to_bytes(),
                );
            if suitable {
                self.note_dedication_crossing(instance, &host);
                return Ok(Destination::for_host(&host));
            }
            if !self.config.placement.allow_deploy_fallback {
                return Err(Error::insufficient_capacity(&format!(
                    "pinned host {} cannot take instance {}",
                    host_id, instance.id
                )));
            }
            slog::info!(self.log,
                "pinned host unsuitable, falling back to open search";
                "instance_id" => %instance.id,
                "host_id" => %host_id,
            );
        }

        let planner = self.planner(planner_name)?;
        let request = PlacementRequest {
            instance,
            offering,
            pod_id: pin.pod_id,
            cluster_id: pin.cluster_id,
        };
        match planner.select(self, &request, excluded) {
            Some(destination) => {
                let host = self.datastore.host_fetch(&destination.host_id)?;
                self.note_dedication_crossing(instance, &host);
                Ok(destination)
            }
            None => Err(Error::insufficient_capacity(&format!(
                "no host in zone {} can take instance {}",
                instance.zone_id, instance.id
            ))),
        }
    }
}
