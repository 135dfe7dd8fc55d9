// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! The orchestrator application: lifecycle operations and the components
//! they are built from.

pub mod background;
mod instance;
mod placement;
mod safety;
mod scale;

pub use instance::ExpungeOutcome;
pub use instance::InstanceCreateParams;
pub use placement::Destination;
pub use placement::ExcludeList;
pub use placement::FirstFitPlanner;
pub use placement::HostPin;
pub use placement::PlacementRequest;
pub use placement::Planner;

use crate::agent::VmmAgent;
use crate::agent::VmmAnswer;
use crate::agent::VmmCommand;
use crate::bindings::ExternalBindings;
use crate::config::OrchestratorConfig;
use corral_common::api::external::Error;
use corral_common::api::external::ResourceKind;
use corral_datastore::DataStore;
use corral_datastore::ResourceDelta;
use corral_datastore::UpdaterLock;
use corral_model::ComputeOffering;
use corral_model::Volume;
use slog::o;
use slog::Logger;
use std::collections::BTreeMap;
use std::sync::Arc;
use uuid::Uuid;

/// The orchestrator
///
/// One of these exists per control plane process.  Several of them may run
/// concurrently against the same store, which is why per-instance mutual
/// exclusion and the background-task leases live in the datastore rather
/// than in this struct.
pub struct Orchestrator {
    /// identifies this process as a lease holder
    pub(crate) id: Uuid,
    pub(crate) log: Logger,
    pub(crate) datastore: Arc<DataStore>,
    pub(crate) agent: Arc<dyn VmmAgent>,
    pub(crate) bindings: Arc<dyn ExternalBindings>,
    pub(crate) config: OrchestratorConfig,
    planners: BTreeMap<String, Arc<dyn Planner>>,
}

impl Orchestrator {
    pub fn new(
        log: &Logger,
        datastore: Arc<DataStore>,
        agent: Arc<dyn VmmAgent>,
        bindings: Arc<dyn ExternalBindings>,
        config: OrchestratorConfig,
    ) -> Arc<Orchestrator> {
        let id = Uuid::new_v4();
        let mut planners: BTreeMap<String, Arc<dyn Planner>> = BTreeMap::new();
        let first_fit = Arc::new(FirstFitPlanner);
        planners.insert(first_fit.name().to_owned(), first_fit);
        Arc::new(Orchestrator {
            id,
            log: log.new(o!("component" => "Orchestrator", "process_id" => id.to_string())),
            datastore,
            agent,
            bindings,
            config,
            planners,
        })
    }

    pub fn datastore(&self) -> &Arc<DataStore> {
        &self.datastore
    }

    pub fn config(&self) -> &OrchestratorConfig {
        &self.config
    }

    pub(crate) fn planner(
        &self,
        name: Option<&str>,
    ) -> Result<Arc<dyn Planner>, Error> {
        let name = name.unwrap_or(FirstFitPlanner.name());
        self.planners.get(name).cloned().ok_or_else(|| {
            Error::invalid_request(&format!("no such planner: {:?}", name))
        })
    }

    /// Send one command to the agent on a host, bounded by the configured
    /// call timeout.  A timeout is reported the same way as an unreachable
    /// agent: a retryable [`Error::ServiceUnavailable`].
    pub(crate) async fn agent_call(
        &self,
        host_id: Uuid,
        command: VmmCommand,
    ) -> Result<VmmAnswer, Error> {
        let label = command.label();
        match tokio::time::timeout(
            self.config.agent.call_timeout(),
            self.agent.send(host_id, command),
        )
        .await
        {
            Ok(result) => result,
            Err(_) => Err(Error::unavail(&format!(
                "agent command {:?} to host {} timed out",
                label, host_id
            ))),
        }
    }

    /// Like [`Orchestrator::agent_call`], but an unsuccessful answer is
    /// folded into an error carrying the agent's detail.
    pub(crate) async fn agent_call_checked(
        &self,
        host_id: Uuid,
        command: VmmCommand,
    ) -> Result<VmmAnswer, Error> {
        let label = command.label();
        let answer = self.agent_call(host_id, command).await?;
        if !answer.success {
            return Err(Error::unavail(&format!(
                "agent command {:?} failed on host {}: {}",
                label,
                host_id,
                answer.payload.as_deref().unwrap_or("no detail"),
            )));
        }
        Ok(answer)
    }

    /// Serialize a mutating operation against this instance, fleet-wide.
    pub(crate) async fn lock_instance(
        &self,
        instance_id: &Uuid,
    ) -> Result<UpdaterLock, Error> {
        self.datastore
            .instance_updater_lock(
                instance_id,
                self.id,
                self.config.locks.updater_timeout(),
                self.config.locks.updater_ttl(),
            )
            .await
    }

    pub(crate) fn unlock_instance(
        &self,
        instance_id: &Uuid,
        lock: &UpdaterLock,
    ) {
        self.datastore.instance_updater_unlock(instance_id, lock);
    }

    /// The full resource footprint of an instance with the given offering
    /// and volumes, in counter units (memory and storage count MiB).
    ///
    /// Deploy reserves and commits exactly this; destroy decrements it;
    /// recover re-reserves it.
    pub(crate) fn instance_footprint(
        offering: &ComputeOffering,
        volumes: &[Volume],
    ) -> Vec<ResourceDelta> {
        let mut deltas = vec![
            ResourceDelta::untagged(ResourceKind::Instance, 1),
            ResourceDelta::untagged(
                ResourceKind::Cpu,
                i64::from(offering.cpu_count.0),
            ),
            ResourceDelta::untagged(
                ResourceKind::Memory,
                offering.memory.to_whole_mebibytes() as i64,
            ),
        ];
        if let Some(gpus) = offering.gpu_count {
            deltas.push(ResourceDelta::untagged(
                ResourceKind::Gpu,
                i64::from(gpus),
            ));
        }
        if !volumes.is_empty() {
            deltas.push(ResourceDelta::untagged(
                ResourceKind::Volume,
                volumes.len() as i64,
            ));
            deltas.push(ResourceDelta::untagged(
                ResourceKind::PrimaryStorage,
                volumes
                    .iter()
                    .map(|v| v.size.to_whole_mebibytes() as i64)
                    .sum(),
            ));
        }
        deltas
    }

    pub(crate) fn decrement_footprint(
        &self,
        account_id: Uuid,
        deltas: &[ResourceDelta],
    ) {
        for delta in deltas {
            self.datastore.resource_count_decrement(
                account_id,
                delta.kind,
                delta.tag.as_deref(),
                delta.delta,
            );
        }
    }
}
