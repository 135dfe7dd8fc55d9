// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Developer harness: boots the orchestrator against a simulated fleet,
//! deploys a demo instance, and leaves the background loops running.

use anyhow::Context;
use clap::Parser;
use corral_common::api::external::ByteCount;
use corral_common::api::external::InstanceCpuCount;
use corral_common::api::external::ResourceKind;
use corral_datastore::DataStore;
use corral_model::Account;
use corral_model::Cluster;
use corral_model::ComputeOffering;
use corral_model::Host;
use corral_model::HypervisorFamily;
use corral_model::Network;
use corral_model::NetworkKind;
use corral_model::Pod;
use corral_model::Zone;
use corral_orchestrator::app::background::tasks::destroy_scavenger::DestroyScavenger;
use corral_orchestrator::app::background::tasks::ip_fetch::IpFetchTask;
use corral_orchestrator::app::background::Driver;
use corral_orchestrator::app::HostPin;
use corral_orchestrator::app::InstanceCreateParams;
use corral_orchestrator::app::Orchestrator;
use corral_orchestrator::bindings::SimBindings;
use corral_orchestrator::config::OrchestratorConfig;
use corral_orchestrator::context::OpContext;
use corral_orchestrator::sim::SimAgent;
use slog::o;
use slog::Drain;
use std::collections::BTreeSet;
use std::path::PathBuf;
use std::sync::Arc;
use uuid::Uuid;

#[derive(Debug, Parser)]
#[clap(name = "corral-dev", about = "run Corral against a simulated fleet")]
struct Args {
    /// path to an orchestrator config file (defaults apply if omitted)
    #[clap(long)]
    config: Option<PathBuf>,
}

#[tokio::main]
async fn main() -> Result<(), anyhow::Error> {
    let args = Args::parse();
    let config = match &args.config {
        Some(path) => OrchestratorConfig::from_file(path)?,
        None => OrchestratorConfig::default(),
    };

    let decorator = slog_term::TermDecorator::new().build();
    let drain = slog_term::FullFormat::new(decorator).build().fuse();
    let drain = slog_async::Async::new(drain).build().fuse();
    let log = slog::Logger::root(drain, o!("name" => "corral-dev"));

    let datastore = DataStore::new(&log);
    let agent = SimAgent::new(&log);
    let bindings = Arc::new(SimBindings::new());
    let orchestrator = Orchestrator::new(
        &log,
        Arc::clone(&datastore),
        agent.clone(),
        bindings,
        config.clone(),
    );

    // A small simulated fleet: one zone, one pod, one cluster, two hosts.
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
    for n in 1..=2 {
        datastore.host_upsert(Host {
            id: Uuid::new_v4(),
            name: format!("host-{}", n),
            zone_id: zone.id,
            pod_id: pod.id,
            cluster_id: cluster.id,
            cpu_mhz_capacity: 32_000,
            memory_capacity: ByteCount::from_gibibytes_u32(128),
            tags: BTreeSet::new(),
            enabled: true,
            up: true,
            dedicated_to: None,
            hypervisor: HypervisorFamily::Kvm,
            live_storage_motion: true,
            storage_access_groups: BTreeSet::new(),
        });
    }
    let network = datastore
        .network_create(Network {
            id: Uuid::new_v4(),
            name: "shared-1".to_string(),
            kind: NetworkKind::Shared,
        })
        .context("seeding demo network")?;
    let offering = datastore.offering_create(ComputeOffering {
        id: Uuid::new_v4(),
        name: "small".to_string(),
        cpu_count: InstanceCpuCount(2),
        cpu_speed_mhz: 1000,
        memory: ByteCount::from_gibibytes_u32(4),
        gpu_count: None,
        dynamic: false,
        disk_offering_id: None,
        disk_offering_strict: false,
        host_tags: Vec::new(),
        volatile: false,
    });
    let account = datastore.account_create(Account {
        id: Uuid::new_v4(),
        name: "demo".to_string(),
    });
    datastore.resource_limit_set(account.id, ResourceKind::Instance, None, 20);

    let opctx = OpContext::for_account(&log, account.id);
    let instance = orchestrator
        .instance_create(
            &opctx,
            InstanceCreateParams {
                name: "demo-vm".to_string(),
                zone_id: zone.id,
                offering_id: offering.id,
                template_id: Uuid::new_v4(),
                network_ids: vec![network.id],
                data_disk_offering_id: None,
                pin: HostPin::default(),
                planner: None,
            },
        )
        .await
        .context("deploying demo instance")?;
    let instance = orchestrator
        .instance_start(&opctx, &instance.id)
        .await
        .context("starting demo instance")?;
    slog::info!(log, "demo instance is up";
        "instance_id" => %instance.id,
        "state" => %instance.state(),
    );

    let service_opctx = OpContext::for_service(&log);
    let mut driver = Driver::new();
    driver.register(
        "destroy-scavenger",
        "expunges instances destroyed longer than the grace delay",
        config.background.destroy_scavenger.period(),
        Box::new(DestroyScavenger::new(Arc::clone(&orchestrator))),
        service_opctx.clone(),
    );
    driver.register(
        "ip-fetch",
        "learns guest-reported addresses on shared/L2 networks",
        config.background.ip_fetch.period(),
        Box::new(IpFetchTask::new(Arc::clone(&orchestrator))),
        service_opctx,
    );

    slog::info!(log, "background tasks running; press ctrl-c to exit");
    tokio::signal::ctrl_c().await.context("waiting for ctrl-c")?;
    Ok(())
}
