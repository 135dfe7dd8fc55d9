// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Live scale-up of a running instance to a larger compute offering.
//!
//! The contract is checked in full before any reservation or host probe:
//! only strictly-upward changes to (cpu x speed) and memory are accepted,
//! unsupported hypervisor families are rejected immediately, and the
//! cluster-level disable threshold is evaluated exactly once.  The work
//! itself is a bounded retry loop; every failed attempt releases its delta
//! reservation before the next one starts.

use crate::agent::VmmCommand;
use crate::app::ExcludeList;
use crate::app::HostPin;
use crate::app::Orchestrator;
use crate::context::OpContext;
use corral_common::api::external::Error;
use corral_common::api::external::InstanceState;
use corral_common::api::external::ResourceKind;
use corral_common::api::external::UpdateResult;
use corral_datastore::ResourceDelta;
use corral_model::ComputeOffering;
use corral_model::DiskOffering;
use corral_model::Instance;
use corral_model::StateEvent;
use corral_model::UsageEventKind;
use uuid::Uuid;

/// The positive reservations and post-success decrements implied by moving
/// between two offerings.
struct ScaleDelta {
    reserve: Vec<ResourceDelta>,
    /// dimensions that shrank (fewer, faster cores); applied only after the
    /// reconfiguration succeeds
    decrement: Vec<ResourceDelta>,
}

impl ScaleDelta {
    fn between(
        current: &ComputeOffering,
        new: &ComputeOffering,
        disk_change: Option<&(DiskOffering, i64)>,
    ) -> ScaleDelta {
        let mut reserve = Vec::new();
        let mut decrement = Vec::new();
        let mut push = |kind: ResourceKind, delta: i64| {
            if delta > 0 {
                reserve.push(ResourceDelta::untagged(kind, delta));
            } else if delta < 0 {
                decrement.push(ResourceDelta::untagged(kind, -delta));
            }
        };
        push(
            ResourceKind::Cpu,
            i64::from(new.cpu_count.0) - i64::from(current.cpu_count.0),
        );
        push(
            ResourceKind::Memory,
            new.memory.to_whole_mebibytes() as i64
                - current.memory.to_whole_mebibytes() as i64,
        );
        push(
            ResourceKind::Gpu,
            i64::from(new.gpu_count.unwrap_or(0))
                - i64::from(current.gpu_count.unwrap_or(0)),
        );
        if let Some((_, storage_delta_mib)) = disk_change {
            push(ResourceKind::PrimaryStorage, *storage_delta_mib);
        }
        ScaleDelta { reserve, decrement }
    }
}

impl Orchestrator {
    /// Scale a running instance up to `new_offering_id`.
    pub async fn instance_scale(
        &self,
        opctx: &OpContext,
        instance_id: &Uuid,
        new_offering_id: &Uuid,
    ) -> UpdateResult<Instance> {
        let instance = self.datastore.instance_fetch(instance_id)?;
        self.check_access(opctx, &instance)?;
        let current = self.datastore.offering_fetch(&instance.offering_id)?;
        let new = self.datastore.offering_fetch(new_offering_id)?;

        // Contract checks, all before any reservation or host probe.
        if instance.state() != InstanceState::Running {
            return Err(Error::invalid_request(&format!(
                "cannot scale instance {} in state \"{}\"",
                instance_id,
                instance.state()
            )));
        }
        if !instance.dynamically_scalable {
            return Err(Error::invalid_request(&format!(
                "instance {} is not dynamically scalable",
                instance_id
            )));
        }
        let cpu_up = new.cpu_mhz_total() >= current.cpu_mhz_total();
        let memory_up = new.memory >= current.memory;
        let any_growth = new.cpu_mhz_total() > current.cpu_mhz_total()
            || new.memory > current.memory;
        if !(cpu_up && memory_up && any_growth) {
            return Err(Error::invalid_request(&format!(
                "scaling only goes up: offering {} does not strictly grow \
                 cpu and memory over offering {}",
                new.name, current.name
            )));
        }

        let host_id = instance.host_id.ok_or_else(|| {
            Error::internal_error(&format!(
                "running instance {} has no host on record",
                instance_id
            ))
        })?;
        let host = self.datastore.host_fetch(&host_id)?;
        if !self
            .config
            .scale
            .supported_hypervisors
            .contains(&host.hypervisor)
        {
            return Err(Error::invalid_request(&format!(
                "live scale is not supported on {} hosts",
                host.hypervisor
            )));
        }

        // The cluster-level disable threshold is evaluated once, not per
        // attempt.
        let utilization =
            self.datastore.cluster_cpu_utilization(&host.cluster_id);
        if utilization >= self.config.scale.cluster_disable_threshold {
            return Err(Error::insufficient_capacity(&format!(
                "cluster {} is above the scale-disable threshold \
                 ({:.0}% allocated)",
                host.cluster_id,
                utilization * 100.0
            )));
        }

        let disk_change = self.scale_disk_change(&instance, &current, &new)?;

        let lock = self.lock_instance(instance_id).await?;
        let result = self
            .instance_scale_locked(opctx, instance_id, &current, &new, &disk_change)
            .await;
        self.unlock_instance(instance_id, &lock);
        result
    }

    /// Work out whether the scale carries the ROOT volume to a new disk
    /// offering, and by how much its size grows.
    fn scale_disk_change(
        &self,
        instance: &Instance,
        current: &ComputeOffering,
        new: &ComputeOffering,
    ) -> Result<Option<(DiskOffering, i64)>, Error> {
        if !new.disk_offering_strict
            || !self.config.scale.allow_disk_offering_change
        {
            return Ok(None);
        }
        let Some(new_disk_id) = new.disk_offering_id else {
            return Ok(None);
        };
        if current.disk_offering_id == Some(new_disk_id) {
            return Ok(None);
        }
        let disk_offering = self.datastore.disk_offering_fetch(&new_disk_id)?;
        let root = self.datastore.root_volume_for_instance(&instance.id)?;
        let delta_mib = disk_offering.size.to_whole_mebibytes() as i64
            - root.size.to_whole_mebibytes() as i64;
        Ok(Some((disk_offering, delta_mib)))
    }

    async fn instance_scale_locked(
        &self,
        opctx: &OpContext,
        instance_id: &Uuid,
        current: &ComputeOffering,
        new: &ComputeOffering,
        disk_change: &Option<(DiskOffering, i64)>,
    ) -> UpdateResult<Instance> {
        let mut excluded = ExcludeList::new();
        let mut last_error = Error::unavail("scale retry budget exhausted");

        for attempt in 1..=self.config.scale.retry_budget {
            // Each attempt reserves the delta afresh and releases it on the
            // way out of a failure, so a stuck attempt never pins quota.
            let instance = self.datastore.instance_fetch(instance_id)?;
            let delta = ScaleDelta::between(current, new, disk_change.as_ref());
            let reservations = self.datastore.resource_reservations_acquire(
                instance.account_id,
                delta.reserve.clone(),
            )?;

            let host_id = instance.host_id.ok_or_else(|| {
                Error::internal_error("scaling instance lost its host")
            })?;
            let host = self.datastore.host_fetch(&host_id)?;

            // Headroom probe on the current host.  The instance's existing
            // footprint is already part of the host allocation, so only the
            // growth has to fit.
            let fits_in_place = self.host_tags_compatible(&host, new)
                && self.host_has_capacity(
                    &host,
                    new.cpu_mhz_total() - current.cpu_mhz_total(),
                    new.memory.to_bytes() - current.memory.to_bytes(),
                );

            if !fits_in_place {
                excluded.add_host(host_id);
                let destination = match self.select_destination(
                    &instance,
                    new,
                    &HostPin::default(),
                    &excluded,
                    None,
                ) {
                    Ok(destination) => destination,
                    Err(error) => {
                        // No alternate destination: the reservation is
                        // released (dropped) and the failure is final.
                        drop(reservations);
                        return Err(error);
                    }
                };

                self.datastore.instance_update_state(
                    instance_id,
                    StateEvent::MigrateRequested,
                )?;
                match self
                    .agent_call_checked(
                        host_id,
                        VmmCommand::Migrate {
                            instance_id: *instance_id,
                            dest_host_id: destination.host_id,
                        },
                    )
                    .await
                {
                    Ok(_) => {
                        self.datastore.instance_set_host(
                            instance_id,
                            Some(destination.host_id),
                        )?;
                        self.datastore.instance_update_state(
                            instance_id,
                            StateEvent::MigrateSucceeded,
                        )?;
                    }
                    Err(error) => {
                        self.datastore.instance_update_state(
                            instance_id,
                            StateEvent::MigrateFailed,
                        )?;
                        slog::warn!(self.log, "scale migration attempt failed";
                            "instance_id" => %instance_id,
                            "attempt" => attempt,
                            "error" => %error,
                        );
                        drop(reservations);
                        excluded.add_host(destination.host_id);
                        last_error = error;
                        continue;
                    }
                }
            }

            // Apply the hypervisor-side reconfiguration on whichever host
            // the instance is on now.
            let instance = self.datastore.instance_fetch(instance_id)?;
            let run_host = instance.host_id.ok_or_else(|| {
                Error::internal_error("scaling instance lost its host")
            })?;
            match self
                .agent_call_checked(
                    run_host,
                    VmmCommand::Reconfigure {
                        instance_id: *instance_id,
                        offering: new.clone(),
                    },
                )
                .await
            {
                Ok(_) => {}
                Err(error) => {
                    slog::warn!(self.log, "scale reconfigure attempt failed";
                        "instance_id" => %instance_id,
                        "attempt" => attempt,
                        "error" => %error,
                    );
                    drop(reservations);
                    if !error.retryable() {
                        return Err(error);
                    }
                    last_error = error;
                    continue;
                }
            }

            // Success: make it all permanent.
            reservations.commit();
            for shrink in &delta.decrement {
                self.datastore.resource_count_decrement(
                    instance.account_id,
                    shrink.kind,
                    shrink.tag.as_deref(),
                    shrink.delta,
                );
            }
            self.datastore.instance_set_offering(instance_id, new.id)?;
            if let Some((disk_offering, _)) = disk_change {
                let root =
                    self.datastore.root_volume_for_instance(instance_id)?;
                self.datastore.volume_set_disk_offering(
                    &root.id,
                    disk_offering.id,
                    disk_offering.size,
                )?;
            }
            self.datastore.usage_event_record(
                UsageEventKind::OfferingChange,
                instance.account_id,
                *instance_id,
                &format!("{} -> {}", current.name, new.name),
            );
            self.datastore.audit_event_record(
                opctx.account_id,
                "instance-scale",
                Some(*instance_id),
            );
            slog::info!(self.log, "instance scaled";
                "instance_id" => %instance_id,
                "from" => %current.name,
                "to" => %new.name,
                "attempt" => attempt,
            );
            return self.datastore.instance_fetch(instance_id);
        }

        Err(last_error)
    }
}
