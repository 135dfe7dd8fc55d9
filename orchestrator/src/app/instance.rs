// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Instance lifecycle operations: deploy, start, stop, reboot, destroy,
//! expunge, recover, migrate.
//!
//! Every mutating operation takes the per-instance updater lease for its
//! duration, then drives the persisted state through the datastore's
//! transition gate.  The lease serializes whole operations across the
//! orchestrator fleet; the gate is the last line of defense for the state
//! machine itself.

use crate::agent::VmmCommand;
use crate::app::ExcludeList;
use crate::app::HostPin;
use crate::app::Orchestrator;
use crate::bindings::BindingClass;
use crate::context::OpContext;
use corral_common::api::external::ByteCount;
use corral_common::api::external::CreateResult;
use corral_common::api::external::Error;
use corral_common::api::external::InstanceState;
use corral_common::api::external::UpdateResult;
use corral_model::AlertKind;
use corral_model::Instance;
use corral_model::Nic;
use corral_model::StateEvent;
use corral_model::UsageEventKind;
use corral_model::Volume;
use corral_model::VolumeKind;
use corral_model::VolumeState;
use uuid::Uuid;

/// ROOT volume size when the compute offering has no linked disk offering.
const DEFAULT_ROOT_SIZE_GIB: u32 = 8;

/// Parameters for deploying a new instance
#[derive(Clone, Debug)]
pub struct InstanceCreateParams {
    pub name: String,
    pub zone_id: Uuid,
    pub offering_id: Uuid,
    pub template_id: Uuid,
    pub network_ids: Vec<Uuid>,
    /// add a DATADISK volume sized by this disk offering
    pub data_disk_offering_id: Option<Uuid>,
    pub pin: HostPin,
    pub planner: Option<String>,
}

/// What an expunge managed to clean up
#[derive(Clone, Debug)]
pub struct ExpungeOutcome {
    pub instance_id: Uuid,
    /// false when a best-effort sub-step (rule release, host-side destroy)
    /// failed; the instance record is gone either way
    pub cleanup_complete: bool,
}

impl Orchestrator {
    pub(crate) fn check_access(
        &self,
        opctx: &OpContext,
        instance: &Instance,
    ) -> Result<(), Error> {
        if opctx.is_admin || opctx.account_id == instance.account_id {
            Ok(())
        } else {
            Err(Error::Forbidden)
        }
    }

    /// Deploy a new instance: reserve quota, pick a destination, and
    /// persist the Allocated record with its volumes and NICs.
    ///
    /// Quota holds are taken before any record is created and either
    /// committed with the records in place or dropped with nothing
    /// persisted; a rejected deploy leaves no partially-created instance.
    pub async fn instance_create(
        &self,
        opctx: &OpContext,
        params: InstanceCreateParams,
    ) -> CreateResult<Instance> {
        let account = self.datastore.account_fetch(&opctx.account_id)?;
        let offering = self.datastore.offering_fetch(&params.offering_id)?;

        // Validate collaborating records up front so that record creation
        // below cannot fail halfway.
        for network_id in &params.network_ids {
            self.datastore.network_fetch(network_id)?;
        }
        let root_size = match offering.disk_offering_id {
            Some(disk_offering_id) => {
                self.datastore.disk_offering_fetch(&disk_offering_id)?.size
            }
            None => ByteCount::from_gibibytes_u32(DEFAULT_ROOT_SIZE_GIB),
        };
        let data_disk = params
            .data_disk_offering_id
            .map(|id| self.datastore.disk_offering_fetch(&id))
            .transpose()?;

        let instance = Instance::new(
            &params.name,
            account.id,
            params.zone_id,
            offering.id,
            params.template_id,
        );

        let mut volumes = vec![Volume::new(
            &format!("ROOT-{}", instance.id),
            VolumeKind::Root,
            instance.id,
            root_size,
            offering.disk_offering_id,
        )];
        if let Some(disk_offering) = &data_disk {
            volumes.push(Volume::new(
                &format!("DATA-{}", instance.id),
                VolumeKind::Data,
                instance.id,
                disk_offering.size,
                Some(disk_offering.id),
            ));
        }

        // Quota first: the in-flight hold makes us visible to concurrent
        // deploys before we touch anything else, and is dropped on every
        // error path below.
        let reservations = self.datastore.resource_reservations_acquire(
            account.id,
            Self::instance_footprint(&offering, &volumes),
        )?;

        let destination = self.select_destination(
            &instance,
            &offering,
            &params.pin,
            &ExcludeList::new(),
            params.planner.as_deref(),
        )?;

        let mut instance = self.datastore.instance_create(instance)?;
        instance = self
            .datastore
            .instance_set_host(&instance.id, Some(destination.host_id))?;
        for volume in volumes {
            self.datastore.volume_create(volume)?;
        }
        for network_id in &params.network_ids {
            self.datastore.nic_create(Nic {
                id: Uuid::new_v4(),
                instance_id: instance.id,
                network_id: *network_id,
                mac: generate_mac(),
                ipv4: None,
                is_default: *network_id == params.network_ids[0],
            })?;
        }

        reservations.commit();
        self.datastore.usage_event_record(
            UsageEventKind::InstanceCreate,
            account.id,
            instance.id,
            &format!("offering {}", offering.name),
        );
        self.datastore.audit_event_record(
            opctx.account_id,
            "instance-create",
            Some(instance.id),
        );
        slog::info!(self.log, "instance deployed";
            "instance_id" => %instance.id,
            "host_id" => %destination.host_id,
            "offering" => %offering.name,
        );
        Ok(instance)
    }

    /// Make sure the given instance is running.
    pub async fn instance_start(
        &self,
        opctx: &OpContext,
        instance_id: &Uuid,
    ) -> UpdateResult<Instance> {
        let lock = self.lock_instance(instance_id).await?;
        let result = self.instance_start_locked(opctx, instance_id).await;
        self.unlock_instance(instance_id, &lock);
        result
    }

    async fn instance_start_locked(
        &self,
        opctx: &OpContext,
        instance_id: &Uuid,
    ) -> UpdateResult<Instance> {
        let instance = self.datastore.instance_fetch(instance_id)?;
        self.check_access(opctx, &instance)?;
        let offering = self.datastore.offering_fetch(&instance.offering_id)?;

        let origin = instance.state();
        if !StateEvent::StartRequested.permitted_sources().contains(&origin) {
            return Err(Error::invalid_request(&format!(
                "cannot start instance {} in state \"{}\"",
                instance_id, origin
            )));
        }

        // Resolve placement before touching the state machine, so a
        // placement failure leaves the record exactly as it was.  We hold
        // the updater lease, so nothing else can slip in between.  The
        // planned or previous host is a preference only; if it cannot take
        // the instance any more, search the zone.
        let preferred = instance.host_id.or(instance.last_host_id);
        let pin = HostPin { host_id: preferred, ..Default::default() };
        let destination = match self.select_destination(
            &instance,
            &offering,
            &pin,
            &ExcludeList::new(),
            None,
        ) {
            Ok(destination) => destination,
            Err(Error::InsufficientCapacity { .. })
                if preferred.is_some() =>
            {
                self.select_destination(
                    &instance,
                    &offering,
                    &HostPin::default(),
                    &ExcludeList::new(),
                    None,
                )?
            }
            Err(error) => return Err(error),
        };

        self.datastore
            .instance_update_state(instance_id, StateEvent::StartRequested)?;
        self.datastore
            .instance_set_host(instance_id, Some(destination.host_id))?;

        match self
            .agent_call_checked(
                destination.host_id,
                VmmCommand::Start {
                    instance_id: *instance_id,
                    offering: offering.clone(),
                },
            )
            .await
        {
            Ok(_) => {}
            Err(error) => {
                return self
                    .instance_start_failed(opctx, instance_id, origin, error)
                    .await;
            }
        }

        self.datastore
            .instance_update_state(instance_id, StateEvent::StartSucceeded)?;
        self.datastore.usage_event_record(
            UsageEventKind::InstanceStart,
            instance.account_id,
            *instance_id,
            "",
        );
        self.datastore.audit_event_record(
            opctx.account_id,
            "instance-start",
            Some(*instance_id),
        );
        slog::info!(self.log, "instance started";
            "instance_id" => %instance_id,
            "host_id" => %destination.host_id,
        );
        self.datastore.instance_fetch(instance_id)
    }

    /// Total start failure: move the instance to Error, alert, and (for a
    /// first boot that never ran) tear its volumes down as compensating
    /// cleanup.
    async fn instance_start_failed(
        &self,
        _opctx: &OpContext,
        instance_id: &Uuid,
        origin: InstanceState,
        error: Error,
    ) -> UpdateResult<Instance> {
        slog::error!(self.log, "instance failed to start";
            "instance_id" => %instance_id,
            "origin" => %origin,
            "error" => %error,
        );
        self.datastore
            .instance_update_state(instance_id, StateEvent::StartFailed)?;
        if origin == InstanceState::Allocated {
            for volume in self.datastore.volumes_for_instance(instance_id) {
                if volume.state != VolumeState::Destroy {
                    self.datastore
                        .volume_update_state(&volume.id, VolumeState::Destroy)?;
                }
            }
        }
        self.datastore.alert_event_record(
            AlertKind::StartFailed,
            &format!("instance {} failed to start: {}", instance_id, error),
        );
        Err(error)
    }

    /// Make sure the given instance is stopped.
    ///
    /// `force` skips the graceful guest shutdown; `None` takes the
    /// configured default.  Forced stops require an elevated caller.
    pub async fn instance_stop(
        &self,
        opctx: &OpContext,
        instance_id: &Uuid,
        force: Option<bool>,
    ) -> UpdateResult<Instance> {
        let force = force.unwrap_or(self.config.stop.force_default);
        if force && !opctx.is_admin {
            return Err(Error::Forbidden);
        }
        let lock = self.lock_instance(instance_id).await?;
        let result = async {
            let instance = self.datastore.instance_fetch(instance_id)?;
            self.check_access(opctx, &instance)?;
            self.instance_stop_locked(opctx, &instance, force).await
        }
        .await;
        self.unlock_instance(instance_id, &lock);
        result
    }

    /// Stop an instance while already holding its updater lease.
    async fn instance_stop_locked(
        &self,
        opctx: &OpContext,
        instance: &Instance,
        force: bool,
    ) -> UpdateResult<Instance> {
        let instance_id = instance.id;
        self.datastore
            .instance_update_state(&instance_id, StateEvent::StopRequested)?;

        let stop_result = match instance.host_id {
            Some(host_id) => {
                self.agent_call_checked(
                    host_id,
                    VmmCommand::Stop { instance_id, force },
                )
                .await
                .map(|_| ())
            }
            None => {
                // No host on record for a Running instance; nothing to tell
                // the agent, but that should not have happened.
                slog::error!(self.log, "running instance has no host";
                    "instance_id" => %instance_id);
                Ok(())
            }
        };

        if let Err(error) = stop_result {
            if !force {
                self.datastore.instance_update_state(
                    &instance_id,
                    StateEvent::StopFailed,
                )?;
                return Err(error);
            }
            // A forced stop proceeds even when the agent cannot confirm:
            // the operator asked for the instance to be down, and the
            // host-side presence will be reconciled later.
            slog::warn!(self.log, "forced stop proceeding past agent failure";
                "instance_id" => %instance_id,
                "error" => %error,
            );
        }

        self.datastore
            .instance_update_state(&instance_id, StateEvent::StopSucceeded)?;
        self.datastore.instance_set_host(&instance_id, None)?;
        self.datastore.usage_event_record(
            UsageEventKind::InstanceStop,
            instance.account_id,
            instance_id,
            if force { "forced" } else { "" },
        );
        self.datastore.audit_event_record(
            opctx.account_id,
            "instance-stop",
            Some(instance_id),
        );
        self.datastore.instance_fetch(&instance_id)
    }

    /// Reboot the given instance.
    ///
    /// Implemented as stop followed by start, re-applying DHCP and
    /// user-data afterwards.  Instances on a volatile offering instead get
    /// their ROOT volume discarded and recreated from the template.
    pub async fn instance_reboot(
        &self,
        opctx: &OpContext,
        instance_id: &Uuid,
    ) -> UpdateResult<Instance> {
        let lock = self.lock_instance(instance_id).await?;
        let result = self.instance_reboot_locked(opctx, instance_id).await;
        self.unlock_instance(instance_id, &lock);
        result
    }

    async fn instance_reboot_locked(
        &self,
        opctx: &OpContext,
        instance_id: &Uuid,
    ) -> UpdateResult<Instance> {
        let instance = self.datastore.instance_fetch(instance_id)?;
        self.check_access(opctx, &instance)?;
        let offering = self.datastore.offering_fetch(&instance.offering_id)?;
        if instance.state() != InstanceState::Running {
            return Err(Error::invalid_request(&format!(
                "cannot reboot instance {} in state \"{}\"",
                instance_id,
                instance.state()
            )));
        }

        self.instance_stop_locked(opctx, &instance, false).await?;

        if offering.volatile {
            self.restore_root_volume(&instance).await?;
        }

        let restarted = self.instance_start_locked(opctx, instance_id).await?;

        // The guest comes back with a fresh lease and user-data; ask the
        // agent to push both.
        if let Some(host_id) = restarted.host_id {
            self.agent_call_checked(
                host_id,
                VmmCommand::RefreshGuestConfig { instance_id: *instance_id },
            )
            .await?;
        }
        Ok(restarted)
    }

    /// Replace the ROOT volume with a fresh copy provisioned from the
    /// template (the "volatile offering" reboot behavior).
    async fn restore_root_volume(
        &self,
        instance: &Instance,
    ) -> Result<(), Error> {
        let old_root = self.datastore.root_volume_for_instance(&instance.id)?;
        self.datastore.volume_remove(&old_root.id)?;
        self.datastore.volume_create(Volume::new(
            &format!("ROOT-{}", instance.id),
            VolumeKind::Root,
            instance.id,
            old_root.size,
            old_root.disk_offering_id,
        ))?;
        if let Some(host_id) = instance.host_id.or(instance.last_host_id) {
            self.agent_call_checked(
                host_id,
                VmmCommand::RestoreRoot {
                    instance_id: instance.id,
                    template_id: instance.template_id,
                },
            )
            .await?;
        }
        slog::info!(self.log, "root volume restored from template";
            "instance_id" => %instance.id,
            "template_id" => %instance.template_id,
        );
        Ok(())
    }

    /// Soft-delete an instance: stop it if running, mark it Destroyed, and
    /// return its resources to the account.  `expunge_now` cascades
    /// straight into finalization.
    pub async fn instance_destroy(
        &self,
        opctx: &OpContext,
        instance_id: &Uuid,
        expunge_now: bool,
    ) -> UpdateResult<Instance> {
        let lock = self.lock_instance(instance_id).await?;
        let result = self
            .instance_destroy_locked(opctx, instance_id, expunge_now)
            .await;
        self.unlock_instance(instance_id, &lock);
        result
    }

    async fn instance_destroy_locked(
        &self,
        opctx: &OpContext,
        instance_id: &Uuid,
        expunge_now: bool,
    ) -> UpdateResult<Instance> {
        let instance = self.datastore.instance_fetch(instance_id)?;
        self.check_access(opctx, &instance)?;

        // Before anything else: a snapshot mid-backup means "try later",
        // with the instance untouched.
        self.check_no_snapshot_in_flight(instance_id)?;

        if !StateEvent::DestroyRequested
            .permitted_sources()
            .contains(&instance.state())
        {
            return Err(Error::invalid_request(&format!(
                "cannot destroy instance {} in state \"{}\"",
                instance_id,
                instance.state()
            )));
        }

        if instance.state() == InstanceState::Running {
            self.instance_stop_locked(opctx, &instance, true).await?;
        }
        self.datastore
            .instance_update_state(instance_id, StateEvent::DestroyRequested)?;

        // Return the footprint to the account and retire the volumes.  The
        // records stay until expunge finalizes them.
        let offering = self.datastore.offering_fetch(&instance.offering_id)?;
        let volumes: Vec<_> = self
            .datastore
            .volumes_for_instance(instance_id)
            .into_iter()
            .filter(|volume| volume.state != VolumeState::Destroy)
            .collect();
        let footprint = Self::instance_footprint(&offering, &volumes);
        self.decrement_footprint(instance.account_id, &footprint);
        for volume in &volumes {
            self.datastore
                .volume_update_state(&volume.id, VolumeState::Destroy)?;
        }

        self.datastore.usage_event_record(
            UsageEventKind::InstanceDestroy,
            instance.account_id,
            *instance_id,
            "",
        );
        self.datastore.audit_event_record(
            opctx.account_id,
            "instance-destroy",
            Some(*instance_id),
        );
        slog::info!(self.log, "instance destroyed";
            "instance_id" => %instance_id,
            "expunge_now" => expunge_now,
        );

        if expunge_now {
            self.instance_expunge_locked(opctx, instance_id).await?;
        }
        self.datastore.instance_fetch(instance_id).or_else(|_| {
            // Cascaded expunge removed the record; hand back our last view.
            let mut finished = instance;
            finished.runtime.state = InstanceState::Expunging;
            Ok(finished)
        })
    }

    /// Finalize a Destroyed (or Error) instance: release its external
    /// bindings, remove its host-side presence, and delete its records.
    pub async fn instance_expunge(
        &self,
        opctx: &OpContext,
        instance_id: &Uuid,
    ) -> Result<ExpungeOutcome, Error> {
        let lock = self.lock_instance(instance_id).await?;
        let result = self.instance_expunge_locked(opctx, instance_id).await;
        // The lease record is removed along with the instance; this is a
        // no-op on success and releases the lease on failure.
        self.unlock_instance(instance_id, &lock);
        result
    }

    async fn instance_expunge_locked(
        &self,
        opctx: &OpContext,
        instance_id: &Uuid,
    ) -> Result<ExpungeOutcome, Error> {
        let instance = self.datastore.instance_fetch(instance_id)?;
        self.check_access(opctx, &instance)?;
        self.check_no_snapshot_in_flight(instance_id)?;

        // An errored instance never went through destroy, so its footprint
        // was never returned to the account; settle that here.
        if instance.state() == InstanceState::Error {
            let offering =
                self.datastore.offering_fetch(&instance.offering_id)?;
            let volumes = self.datastore.volumes_for_instance(instance_id);
            let footprint = Self::instance_footprint(&offering, &volumes);
            self.decrement_footprint(instance.account_id, &footprint);
        }

        self.datastore
            .instance_update_state(instance_id, StateEvent::ExpungeRequested)?;

        // Everything from here on is best effort: a rule class that fails
        // to release is logged and noted, never a reason to leave the
        // instance half-expunged.
        let mut cleanup_complete = true;
        for class in BindingClass::ALL {
            if let Err(error) =
                self.bindings.release(class, *instance_id).await
            {
                slog::warn!(self.log, "failed to release bindings";
                    "instance_id" => %instance_id,
                    "class" => %class,
                    "error" => %error,
                );
                cleanup_complete = false;
            }
        }

        if let Some(host_id) = instance.host_id.or(instance.last_host_id) {
            if let Err(error) = self
                .agent_call_checked(
                    host_id,
                    VmmCommand::Destroy { instance_id: *instance_id },
                )
                .await
            {
                slog::warn!(self.log, "failed to clean up host-side presence";
                    "instance_id" => %instance_id,
                    "host_id" => %host_id,
                    "error" => %error,
                );
                cleanup_complete = false;
            }
        }

        for volume in self.datastore.volumes_for_instance(instance_id) {
            self.datastore.volume_remove(&volume.id)?;
        }
        self.datastore.instance_remove(instance_id)?;
        self.datastore.audit_event_record(
            opctx.account_id,
            "instance-expunge",
            Some(*instance_id),
        );
        slog::info!(self.log, "instance expunged";
            "instance_id" => %instance_id,
            "cleanup_complete" => cleanup_complete,
        );
        Ok(ExpungeOutcome { instance_id: *instance_id, cleanup_complete })
    }

    /// Bring a Destroyed instance back to Allocated, re-validating the
    /// account's limits and re-attaching the ROOT volume.
    pub async fn instance_recover(
        &self,
        opctx: &OpContext,
        instance_id: &Uuid,
    ) -> UpdateResult<Instance> {
        let lock = self.lock_instance(instance_id).await?;
        let result = self.instance_recover_locked(opctx, instance_id).await;
        self.unlock_instance(instance_id, &lock);
        result
    }

    async fn instance_recover_locked(
        &self,
        opctx: &OpContext,
        instance_id: &Uuid,
    ) -> UpdateResult<Instance> {
        let instance = self.datastore.instance_fetch(instance_id)?;
        self.check_access(opctx, &instance)?;
        if instance.state() != InstanceState::Destroyed {
            return Err(Error::invalid_request(&format!(
                "cannot recover instance {} in state \"{}\"",
                instance_id,
                instance.state()
            )));
        }

        let offering = self.datastore.offering_fetch(&instance.offering_id)?;
        let root = self.datastore.root_volume_for_recovery(instance_id)?;

        // The footprint was decremented at destroy time, so recovery has to
        // pass the limit check again like any new allocation would.
        let reservations = self.datastore.resource_reservations_acquire(
            instance.account_id,
            Self::instance_footprint(&offering, std::slice::from_ref(&root)),
        )?;

        self.datastore
            .instance_update_state(instance_id, StateEvent::RecoverRequested)?;
        self.datastore.volume_update_state(&root.id, VolumeState::Allocated)?;
        reservations.commit();

        self.datastore.audit_event_record(
            opctx.account_id,
            "instance-recover",
            Some(*instance_id),
        );
        slog::info!(self.log, "instance recovered";
            "instance_id" => %instance_id);
        self.datastore.instance_fetch(instance_id)
    }

    /// Migrate a running instance to another host, selected openly or
    /// pinned by the caller.
    pub async fn instance_migrate(
        &self,
        opctx: &OpContext,
        instance_id: &Uuid,
        dest_host_id: Option<Uuid>,
    ) -> UpdateResult<Instance> {
        let lock = self.lock_instance(instance_id).await?;
        let result = self
            .instance_migrate_locked(opctx, instance_id, dest_host_id)
            .await;
        self.unlock_instance(instance_id, &lock);
        result
    }

    async fn instance_migrate_locked(
        &self,
        opctx: &OpContext,
        instance_id: &Uuid,
        dest_host_id: Option<Uuid>,
    ) -> UpdateResult<Instance> {
        let instance = self.datastore.instance_fetch(instance_id)?;
        self.check_access(opctx, &instance)?;
        self.check_no_snapshot_in_flight(instance_id)?;

        if instance.state() != InstanceState::Running {
            return Err(Error::invalid_request(&format!(
                "cannot migrate instance {} in state \"{}\"",
                instance_id,
                instance.state()
            )));
        }
        let source_host_id = instance.host_id.ok_or_else(|| {
            Error::internal_error(&format!(
                "running instance {} has no host on record",
                instance_id
            ))
        })?;
        let source = self.datastore.host_fetch(&source_host_id)?;
        let offering = self.datastore.offering_fetch(&instance.offering_id)?;

        let mut excluded = ExcludeList::new();
        excluded.add_host(source_host_id);
        let pin = HostPin { host_id: dest_host_id, ..Default::default() };
        let destination = self.select_destination(
            &instance,
            &offering,
            &pin,
            &excluded,
            None,
        )?;
        let dest = self.datastore.host_fetch(&destination.host_id)?;
        self.check_migration_compat(&instance, &source, &dest)?;

        self.datastore
            .instance_update_state(instance_id, StateEvent::MigrateRequested)?;
        match self
            .agent_call_checked(
                source_host_id,
                VmmCommand::Migrate {
                    instance_id: *instance_id,
                    dest_host_id: dest.id,
                },
            )
            .await
        {
            Ok(_) => {}
            Err(error) => {
                // The instance stays on the source; surface the failure as
                // retryable without retrying internally.
                self.datastore.instance_update_state(
                    instance_id,
                    StateEvent::MigrateFailed,
                )?;
                slog::warn!(self.log, "migration failed";
                    "instance_id" => %instance_id,
                    "dest_host_id" => %dest.id,
                    "error" => %error,
                );
                return Err(error);
            }
        }

        self.datastore.instance_set_host(instance_id, Some(dest.id))?;
        self.datastore
            .instance_update_state(instance_id, StateEvent::MigrateSucceeded)?;
        self.datastore.audit_event_record(
            opctx.account_id,
            "instance-migrate",
            Some(*instance_id),
        );
        slog::info!(self.log, "instance migrated";
            "instance_id" => %instance_id,
            "source_host_id" => %source_host_id,
            "dest_host_id" => %dest.id,
        );
        self.datastore.instance_fetch(instance_id)
    }
}

fn generate_mac() -> String {
    let id = Uuid::new_v4();
    let bytes = id.as_bytes();
    format!(
        "02:00:{:02x}:{:02x}:{:02x}:{:02x}",
        bytes[0], bytes[1], bytes[2], bytes[3]
    )
}
