// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Shared fixture for the orchestrator integration tests: a datastore, a
//! simulated agent, and a small seeded fleet.

// Not every test binary touches every part of the fixture.
#![allow(dead_code)]

use corral_common::api::external::ByteCount;
use corral_common::api::external::InstanceCpuCount;
use corral_common::api::external::ResourceKind;
use corral_datastore::DataStore;
use corral_model::Account;
use corral_model::Cluster;
use corral_model::ComputeOffering;
use corral_model::Host;
use corral_model::HypervisorFamily;
use corral_model::Instance;
use corral_model::Network;
use corral_model::NetworkKind;
use corral_model::Pod;
use corral_model::Zone;
use corral_orchestrator::app::HostPin;
use corral_orchestrator::app::InstanceCreateParams;
use corral_orchestrator::app::Orchestrator;
use corral_orchestrator::bindings::SimBindings;
use corral_orchestrator::config::OrchestratorConfig;
use corral_orchestrator::context::OpContext;
use corral_orchestrator::sim::SimAgent;
use slog::Logger;
use std::collections::BTreeSet;
use std::sync::Arc;
use uuid::Uuid;

/// Host CPU capacity in the fixture, sized so that the small offering
/// always fits, the medium offering fits next to a small one, and the
/// large offering never fits on a host that is already running anything.
pub const HOST_CPU_MHZ: u64 = 2500;

pub struct TestContext {
    pub log: Logger,
    pub datastore: Arc<DataStore>,
    pub agent: Arc<SimAgent>,
    pub bindings: Arc<SimBindings>,
    pub orchestrator: Arc<Orchestrator>,
    pub account: Account,
    pub zone: Zone,
    pub pod: Pod,
    pub cluster: Cluster,
    pub hosts: Vec<Host>,
    pub network: Network,
    /// 1 cpu x 1000 MHz, 512 MiB
    pub offering_small: ComputeOffering,
    /// 2 cpu x 1000 MHz, 512 MiB
    pub offering_medium: ComputeOffering,
    /// 4 cpu x 1000 MHz, 512 MiB
    pub offering_large: ComputeOffering,
}

impl TestContext {
    pub fn new(test_name: &str) -> TestContext {
        Self::with_config(test_name, test_config())
    }

    pub fn with_config(
        test_name: &str,
        config: OrchestratorConfig,
    ) -> TestContext {
        let log = corral_test_utils::test_setup_log(test_name);
        let datastore = DataStore::new(&log);
        let agent = SimAgent::new(&log);
        let bindings = Arc::new(SimBindings::new());
        let orchestrator = Orchestrator::new(
            &log,
            Arc::clone(&datastore),
            agent.clone(),
            bindings.clone(),
            config,
        );

        let zone = datastore.zone_upsert(Zone {
            id: Uuid::new_v4(),
            name: "zone-1".to_string(),
            enabled: true,
        });
        let pod = datastore.pod_upsert(Pod {
            id: Uuid::new_v4(),
            zone_id: zone.id,
            name: "pod-1".to_string(),
            enabled: true,
        });
        let cluster = datastore.cluster_upsert(Cluster {
            id: Uuid::new_v4(),
            pod_id: pod.id,
            zone_id: zone.id,
            name: "cluster-1".to_string(),
            enabled: true,
            hypervisor: HypervisorFamily::Kvm,
        });
        let hosts: Vec<Host> = (1..=2)
            .map(|n| {
                datastore.host_upsert(fixture_host(
                    &format!("host-{}", n),
                    &zone,
                    &pod,
                    &cluster,
                ))
            })
            .collect();
        let network = datastore
            .network_create(Network {
                id: Uuid::new_v4(),
                name: "shared-1".to_string(),
                kind: NetworkKind::Shared,
            })
            .unwrap();

        let offering_small = datastore.offering_create(offering("small", 1));
        let offering_medium = datastore.offering_create(offering("medium", 2));
        let offering_large = datastore.offering_create(offering("large", 4));

        let account = datastore.account_create(Account {
            id: Uuid::new_v4(),
            name: "hawthorn".to_string(),
        });
        datastore.resource_limit_set(
            account.id,
            ResourceKind::Instance,
            None,
            20,
        );

        TestContext {
            log,
            datastore,
            agent,
            bindings,
            orchestrator,
            account,
            zone,
            pod,
            cluster,
            hosts,
            network,
            offering_small,
            offering_medium,
            offering_large,
        }
    }

    pub fn opctx(&self) -> OpContext {
        OpContext::for_account(&self.log, self.account.id)
    }

    pub fn admin_opctx(&self) -> OpContext {
        OpContext::for_service(&self.log)
    }

    pub fn create_params(&self, name: &str) -> InstanceCreateParams {
        InstanceCreateParams {
            name: name.to_string(),
            zone_id: self.zone.id,
            offering_id: self.offering_small.id,
            template_id: Uuid::new_v4(),
            network_ids: vec![self.network.id],
            data_disk_offering_id: None,
            pin: HostPin::default(),
            planner: None,
        }
    }

    pub async fn deploy(&self, name: &str) -> Instance {
        self.orchestrator
            .instance_create(&self.opctx(), self.create_params(name))
            .await
            .expect("fixture deploy should succeed")
    }

    pub async fn deploy_and_start(&self, name: &str) -> Instance {
        let instance = self.deploy(name).await;
        self.orchestrator
            .instance_start(&self.opctx(), &instance.id)
            .await
            .expect("fixture start should succeed")
    }

    /// Take a host out of the placement pool.
    pub fn disable_host(&self, host_id: &Uuid) {
        let mut host = self.datastore.host_fetch(host_id).unwrap();
        host.enabled = false;
        self.datastore.host_upsert(host);
    }
}

/// A config with short lock timeouts and an immediate scavenger grace,
/// suitable for tests.
pub fn test_config() -> OrchestratorConfig {
    let mut config = OrchestratorConfig::default();
    config.locks.updater_timeout_secs = 1;
    config.locks.cluster_lease_timeout_secs = 0;
    config.background.destroy_scavenger.grace_secs = 0;
    config.background.ip_fetch.max_retries = 3;
    config.background.ip_fetch.pool_size = 2;
    config.agent.call_timeout_secs = 5;
    config
}

fn offering(name: &str, cpus: u16) -> ComputeOffering {
    ComputeOffering {
        id: Uuid::new_v4(),
        name: name.to_string(),
        cpu_count: InstanceCpuCount(cpus),
        cpu_speed_mhz: 1000,
        memory: ByteCount::from_mebibytes_u32(512),
        gpu_count: None,
        dynamic: true,
        disk_offering_id: None,
        disk_offering_strict: false,
        host_tags: Vec::new(),
        volatile: false,
    }
}

fn fixture_host(
    name: &str,
    zone: &Zone,
    pod: &Pod,
    cluster: &Cluster,
) -> Host {
    Host {
        id: Uuid::new_v4(),
        name: name.to_string(),
        zone_id: zone.id,
        pod_id: pod.id,
        cluster_id: cluster.id,
        cpu_mhz_capacity: HOST_CPU_MHZ,
        memory_capacity: ByteCount::from_gibibytes_u32(4),
        tags: BTreeSet::new(),
        enabled: true,
        up: true,
        dedicated_to: None,
        hypervisor: HypervisorFamily::Kvm,
        live_storage_motion: true,
        storage_access_groups: BTreeSet::new(),
    }
}
