// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Integration tests for the instance lifecycle operations.

mod common;

use assert_matches::assert_matches;
use common::TestContext;
use corral_common::api::external::Error;
use corral_common::api::external::InstanceCpuCount;
use corral_common::api::external::InstanceState;
use corral_common::api::external::ResourceKind;
use corral_model::UsageEventKind;
use corral_model::VolumeSnapshot;
use corral_model::VolumeSnapshotState;
use corral_model::VolumeState;
use corral_orchestrator::bindings::BindingClass;
use std::sync::Arc;
use uuid::Uuid;

#[tokio::test]
async fn test_deploy_and_start_end_to_end() {
    let ctx = TestContext::new("test_deploy_and_start_end_to_end");
    let opctx = ctx.opctx();

    let instance = ctx
        .orchestrator
        .instance_create(&opctx, ctx.create_params("wren"))
        .await
        .unwrap();
    assert_eq!(instance.state(), InstanceState::Allocated);
    assert!(instance.host_id.is_some());

    let root = ctx.datastore.root_volume_for_instance(&instance.id).unwrap();
    assert_eq!(root.instance_id, Some(instance.id));
    assert_eq!(ctx.datastore.nics_for_instance(&instance.id).len(), 1);

    let started =
        ctx.orchestrator.instance_start(&opctx, &instance.id).await.unwrap();
    assert_eq!(started.state(), InstanceState::Running);

    let usage: Vec<_> = ctx
        .datastore
        .usage_events()
        .into_iter()
        .map(|event| event.kind)
        .collect();
    assert!(usage.contains(&UsageEventKind::InstanceCreate));
    assert!(usage.contains(&UsageEventKind::InstanceStart));

    // Committed counts reflect exactly one small instance.
    assert_eq!(
        ctx.datastore.resource_counts(
            ctx.account.id,
            ResourceKind::Instance,
            None
        ),
        (1, 0)
    );
    assert_eq!(
        ctx.datastore.resource_counts(ctx.account.id, ResourceKind::Cpu, None),
        (1, 0)
    );
}

#[tokio::test(flavor = "multi_thread")]
async fn test_concurrent_deploys_admit_exactly_quota() {
    let ctx = TestContext::new("test_concurrent_deploys_admit_exactly_quota");
    ctx.datastore.resource_limit_set(
        ctx.account.id,
        ResourceKind::Instance,
        None,
        3,
    );

    let mut handles = Vec::new();
    for n in 0..10 {
        let orchestrator = Arc::clone(&ctx.orchestrator);
        let opctx = ctx.opctx();
        let params = ctx.create_params(&format!("vm-{}", n));
        handles.push(tokio::spawn(async move {
            orchestrator.instance_create(&opctx, params).await
        }));
    }

    let mut admitted = 0;
    let mut rejected = 0;
    for handle in handles {
        match handle.await.unwrap() {
            Ok(_) => admitted += 1,
            Err(Error::ResourceExhausted { .. }) => rejected += 1,
            Err(other) => panic!("unexpected deploy error: {}", other),
        }
    }
    assert_eq!(admitted, 3);
    assert_eq!(rejected, 7);

    // No partially-created instances among the rejected: exactly the
    // admitted instances and their ROOT volumes exist, and no reservation
    // is left in flight.
    let instances = ctx.datastore.instance_list();
    assert_eq!(instances.len(), 3);
    for instance in &instances {
        assert_eq!(ctx.datastore.volumes_for_instance(&instance.id).len(), 1);
    }
    assert_eq!(
        ctx.datastore.resource_counts(
            ctx.account.id,
            ResourceKind::Instance,
            None
        ),
        (3, 0)
    );
}

#[tokio::test]
async fn test_illegal_transitions_are_rejected_without_side_effect() {
    let ctx = TestContext::new(
        "test_illegal_transitions_are_rejected_without_side_effect",
    );
    let opctx = ctx.opctx();
    let instance = ctx.deploy("wren").await;

    // Allocated instances cannot stop, reboot, or migrate.
    assert_matches!(
        ctx.orchestrator.instance_stop(&opctx, &instance.id, None).await,
        Err(Error::InvalidRequest { .. })
    );
    assert_matches!(
        ctx.orchestrator.instance_reboot(&opctx, &instance.id).await,
        Err(Error::InvalidRequest { .. })
    );
    assert_matches!(
        ctx.orchestrator.instance_migrate(&opctx, &instance.id, None).await,
        Err(Error::InvalidRequest { .. })
    );
    let after = ctx.datastore.instance_fetch(&instance.id).unwrap();
    assert_eq!(after.state(), InstanceState::Allocated);
    assert_eq!(after.runtime.gen, instance.runtime.gen);

    // A running instance cannot be started again.
    let started =
        ctx.orchestrator.instance_start(&opctx, &instance.id).await.unwrap();
    assert_matches!(
        ctx.orchestrator.instance_start(&opctx, &instance.id).await,
        Err(Error::InvalidRequest { .. })
    );
    let after = ctx.datastore.instance_fetch(&instance.id).unwrap();
    assert_eq!(after.runtime.gen, started.runtime.gen);
}

#[tokio::test]
async fn test_forced_stop_requires_elevated_caller() {
    let ctx = TestContext::new("test_forced_stop_requires_elevated_caller");
    let instance = ctx.deploy_and_start("wren").await;

    assert_matches!(
        ctx.orchestrator
            .instance_stop(&ctx.opctx(), &instance.id, Some(true))
            .await,
        Err(Error::Forbidden)
    );

    let stopped = ctx
        .orchestrator
        .instance_stop(&ctx.admin_opctx(), &instance.id, Some(true))
        .await
        .unwrap();
    assert_eq!(stopped.state(), InstanceState::Stopped);
}

#[tokio::test]
async fn test_graceful_stop_failure_leaves_instance_running() {
    let ctx =
        TestContext::new("test_graceful_stop_failure_leaves_instance_running");
    let opctx = ctx.opctx();
    let instance = ctx.deploy_and_start("wren").await;

    ctx.agent.fail_next("stop", 1);
    let result =
        ctx.orchestrator.instance_stop(&opctx, &instance.id, None).await;
    assert_matches!(result, Err(Error::ServiceUnavailable { .. }));

    let after = ctx.datastore.instance_fetch(&instance.id).unwrap();
    assert_eq!(after.state(), InstanceState::Running);

    // A forced stop by an operator powers through the same failure.
    ctx.agent.fail_next("stop", 1);
    let stopped = ctx
        .orchestrator
        .instance_stop(&ctx.admin_opctx(), &instance.id, Some(true))
        .await
        .unwrap();
    assert_eq!(stopped.state(), InstanceState::Stopped);
}

#[tokio::test]
async fn test_first_boot_failure_cleans_up_and_lands_in_error() {
    let ctx = TestContext::new(
        "test_first_boot_failure_cleans_up_and_lands_in_error",
    );
    let opctx = ctx.opctx();
    let instance = ctx.deploy("wren").await;

    ctx.agent.fail_next("start", 1);
    let result = ctx.orchestrator.instance_start(&opctx, &instance.id).await;
    assert_matches!(result, Err(Error::ServiceUnavailable { .. }));

    let after = ctx.datastore.instance_fetch(&instance.id).unwrap();
    assert_eq!(after.state(), InstanceState::Error);
    for volume in ctx.datastore.volumes_for_instance(&instance.id) {
        assert_eq!(volume.state, VolumeState::Destroy);
    }
    assert!(!ctx.datastore.alert_events().is_empty());

    // Error is recoverable only via expunge.
    assert_matches!(
        ctx.orchestrator.instance_start(&opctx, &instance.id).await,
        Err(Error::InvalidRequest { .. })
    );
    let outcome =
        ctx.orchestrator.instance_expunge(&opctx, &instance.id).await.unwrap();
    assert!(outcome.cleanup_complete);
    assert_matches!(
        ctx.datastore.instance_fetch(&instance.id),
        Err(Error::ObjectNotFound { .. })
    );

    // Expunging an errored instance settles the account's counts, since
    // destroy never ran for it.
    assert_eq!(
        ctx.datastore.resource_counts(
            ctx.account.id,
            ResourceKind::Instance,
            None
        ),
        (0, 0)
    );
    assert_eq!(
        ctx.datastore.resource_counts(ctx.account.id, ResourceKind::Cpu, None),
        (0, 0)
    );
}

#[tokio::test]
async fn test_destroy_rejected_while_root_snapshot_in_flight() {
    let ctx = TestContext::new(
        "test_destroy_rejected_while_root_snapshot_in_flight",
    );
    let opctx = ctx.opctx();
    let instance = ctx.deploy_and_start("wren").await;
    let root = ctx.datastore.root_volume_for_instance(&instance.id).unwrap();

    let snapshot = ctx
        .datastore
        .snapshot_create(VolumeSnapshot::new(
            root.id,
            VolumeSnapshotState::BackingUp,
        ))
        .unwrap();

    let before = ctx.datastore.instance_fetch(&instance.id).unwrap();
    assert_matches!(
        ctx.orchestrator.instance_destroy(&opctx, &instance.id, false).await,
        Err(Error::InvalidRequest { .. })
    );
    let after = ctx.datastore.instance_fetch(&instance.id).unwrap();
    assert_eq!(after.state(), InstanceState::Running);
    assert_eq!(after.runtime.gen, before.runtime.gen);

    // Once the backup pipeline is done with the snapshot, destroy goes
    // through and returns the footprint to the account.
    ctx.datastore
        .snapshot_update_state(&snapshot.id, VolumeSnapshotState::BackedUp)
        .unwrap();
    let destroyed = ctx
        .orchestrator
        .instance_destroy(&opctx, &instance.id, false)
        .await
        .unwrap();
    assert_eq!(destroyed.state(), InstanceState::Destroyed);
    assert_eq!(
        ctx.datastore.resource_counts(ctx.account.id, ResourceKind::Cpu, None),
        (0, 0)
    );
    assert_eq!(
        ctx.datastore.resource_counts(
            ctx.account.id,
            ResourceKind::Instance,
            None
        ),
        (0, 0)
    );
}

#[tokio::test]
async fn test_recover_revalidates_limits_and_reattaches_root() {
    let ctx = TestContext::new(
        "test_recover_revalidates_limits_and_reattaches_root",
    );
    let opctx = ctx.opctx();
    let instance = ctx.deploy("wren").await;

    // Recover only applies to Destroyed instances.
    assert_matches!(
        ctx.orchestrator.instance_recover(&opctx, &instance.id).await,
        Err(Error::InvalidRequest { .. })
    );

    ctx.orchestrator
        .instance_destroy(&opctx, &instance.id, false)
        .await
        .unwrap();

    // With the quota consumed by somebody else in the meantime, recovery
    // is refused.
    ctx.datastore.resource_limit_set(
        ctx.account.id,
        ResourceKind::Instance,
        None,
        0,
    );
    assert_matches!(
        ctx.orchestrator.instance_recover(&opctx, &instance.id).await,
        Err(Error::ResourceExhausted { .. })
    );

    ctx.datastore.resource_limit_set(
        ctx.account.id,
        ResourceKind::Instance,
        None,
        20,
    );
    let recovered =
        ctx.orchestrator.instance_recover(&opctx, &instance.id).await.unwrap();
    assert_eq!(recovered.state(), InstanceState::Allocated);
    let root = ctx.datastore.root_volume_for_instance(&instance.id).unwrap();
    assert_eq!(root.state, VolumeState::Allocated);
    assert_eq!(
        ctx.datastore.resource_counts(
            ctx.account.id,
            ResourceKind::Instance,
            None
        ),
        (1, 0)
    );

    // And the recovered instance can be started again.
    let started =
        ctx.orchestrator.instance_start(&opctx, &instance.id).await.unwrap();
    assert_eq!(started.state(), InstanceState::Running);
}

#[tokio::test]
async fn test_expunge_aggregates_best_effort_cleanup_failures() {
    let ctx = TestContext::new(
        "test_expunge_aggregates_best_effort_cleanup_failures",
    );
    let opctx = ctx.opctx();
    let instance = ctx.deploy_and_start("wren").await;
    ctx.orchestrator
        .instance_destroy(&opctx, &instance.id, false)
        .await
        .unwrap();

    ctx.bindings.fail_class(BindingClass::Firewall);
    let outcome =
        ctx.orchestrator.instance_expunge(&opctx, &instance.id).await.unwrap();

    // The failing rule class is reported, but the expunge completes and the
    // other classes were still released.
    assert!(!outcome.cleanup_complete);
    assert_matches!(
        ctx.datastore.instance_fetch(&instance.id),
        Err(Error::ObjectNotFound { .. })
    );
    let released: Vec<BindingClass> = ctx
        .bindings
        .released()
        .into_iter()
        .map(|(class, _)| class)
        .collect();
    assert!(released.contains(&BindingClass::LoadBalancer));
    assert!(released.contains(&BindingClass::StaticNat));
    assert!(released.contains(&BindingClass::SecurityGroup));
    assert!(!released.contains(&BindingClass::Firewall));
}

#[tokio::test]
async fn test_destroy_can_cascade_to_expunge() {
    let ctx = TestContext::new("test_destroy_can_cascade_to_expunge");
    let opctx = ctx.opctx();
    let instance = ctx.deploy_and_start("wren").await;

    ctx.orchestrator
        .instance_destroy(&opctx, &instance.id, true)
        .await
        .unwrap();
    assert_matches!(
        ctx.datastore.instance_fetch(&instance.id),
        Err(Error::ObjectNotFound { .. })
    );
    assert!(ctx.datastore.volumes_for_instance(&instance.id).is_empty());
}

#[tokio::test]
async fn test_migrate_moves_between_hosts() {
    let ctx = TestContext::new("test_migrate_moves_between_hosts");
    let opctx = ctx.opctx();
    let instance = ctx.deploy_and_start("wren").await;
    let source = instance.host_id.unwrap();

    let migrated = ctx
        .orchestrator
        .instance_migrate(&opctx, &instance.id, None)
        .await
        .unwrap();
    assert_eq!(migrated.state(), InstanceState::Running);
    let dest = migrated.host_id.unwrap();
    assert_ne!(dest, source);
    assert_eq!(migrated.last_host_id, Some(source));
}

#[tokio::test]
async fn test_failed_migration_leaves_instance_on_source() {
    let ctx =
        TestContext::new("test_failed_migration_leaves_instance_on_source");
    let opctx = ctx.opctx();
    let instance = ctx.deploy_and_start("wren").await;
    let source = instance.host_id.unwrap();

    ctx.agent.set_unreachable(source, true);
    let result =
        ctx.orchestrator.instance_migrate(&opctx, &instance.id, None).await;
    let error = result.unwrap_err();
    assert!(error.retryable(), "migration failure must surface as retryable");

    let after = ctx.datastore.instance_fetch(&instance.id).unwrap();
    assert_eq!(after.state(), InstanceState::Running);
    assert_eq!(after.host_id, Some(source));
}

#[tokio::test]
async fn test_reboot_on_volatile_offering_restores_root() {
    let ctx =
        TestContext::new("test_reboot_on_volatile_offering_restores_root");
    let opctx = ctx.opctx();

    let mut volatile = ctx.offering_small.clone();
    volatile.id = Uuid::new_v4();
    volatile.name = "small-volatile".to_string();
    volatile.cpu_count = InstanceCpuCount(1);
    volatile.volatile = true;
    let volatile = ctx.datastore.offering_create(volatile);

    let mut params = ctx.create_params("phoenix");
    params.offering_id = volatile.id;
    let instance =
        ctx.orchestrator.instance_create(&opctx, params).await.unwrap();
    let instance =
        ctx.orchestrator.instance_start(&opctx, &instance.id).await.unwrap();
    let old_root = ctx.datastore.root_volume_for_instance(&instance.id).unwrap();

    let rebooted =
        ctx.orchestrator.instance_reboot(&opctx, &instance.id).await.unwrap();
    assert_eq!(rebooted.state(), InstanceState::Running);

    let new_root = ctx.datastore.root_volume_for_instance(&instance.id).unwrap();
    assert_ne!(new_root.id, old_root.id);
    assert_eq!(new_root.size, old_root.size);
    let labels: Vec<&str> = ctx
        .agent
        .commands_sent()
        .into_iter()
        .map(|(_, label)| label)
        .collect();
    assert!(labels.contains(&"restore-root"));
    assert!(labels.contains(&"refresh-guest-config"));
}

#[tokio::test]
async fn test_reboot_plain_offering_keeps_root_and_refreshes_guest() {
    let ctx = TestContext::new(
        "test_reboot_plain_offering_keeps_root_and_refreshes_guest",
    );
    let opctx = ctx.opctx();
    let instance = ctx.deploy_and_start("wren").await;
    let old_root = ctx.datastore.root_volume_for_instance(&instance.id).unwrap();

    let rebooted =
        ctx.orchestrator.instance_reboot(&opctx, &instance.id).await.unwrap();
    assert_eq!(rebooted.state(), InstanceState::Running);
    let new_root = ctx.datastore.root_volume_for_instance(&instance.id).unwrap();
    assert_eq!(new_root.id, old_root.id);
    let labels: Vec<&str> = ctx
        .agent
        .commands_sent()
        .into_iter()
        .map(|(_, label)| label)
        .collect();
    assert!(labels.contains(&"refresh-guest-config"));
    assert!(!labels.contains(&"restore-root"));
}

#[tokio::test]
async fn test_pinned_host_fallback_policy() {
    let ctx = TestContext::new("test_pinned_host_fallback_policy");
    let opctx = ctx.opctx();
    let pinned = ctx.hosts[0].id;
    ctx.disable_host(&pinned);

    // With fallback enabled (the default), the deploy lands elsewhere.
    let mut params = ctx.create_params("wren");
    params.pin.host_id = Some(pinned);
    let instance =
        ctx.orchestrator.instance_create(&opctx, params).await.unwrap();
    assert_eq!(instance.host_id, Some(ctx.hosts[1].id));

    // With fallback disabled, the same pin is a hard failure.
    let mut config = common::test_config();
    config.placement.allow_deploy_fallback = false;
    let strict_ctx =
        TestContext::with_config("test_pinned_host_fallback_policy_strict", config);
    let strict_pinned = strict_ctx.hosts[0].id;
    strict_ctx.disable_host(&strict_pinned);
    let mut params = strict_ctx.create_params("lark");
    params.pin.host_id = Some(strict_pinned);
    assert_matches!(
        strict_ctx
            .orchestrator
            .instance_create(&strict_ctx.opctx(), params)
            .await,
        Err(Error::InsufficientCapacity { .. })
    );
}

#[tokio::test]
async fn test_dedicated_host_crossing_alerts_but_succeeds() {
    let ctx =
        TestContext::new("test_dedicated_host_crossing_alerts_but_succeeds");
    let opctx = ctx.opctx();

    // Dedicate the only usable host to some other account.
    let other_account = Uuid::new_v4();
    let mut host = ctx.datastore.host_fetch(&ctx.hosts[0].id).unwrap();
    host.dedicated_to = Some(other_account);
    ctx.datastore.host_upsert(host);
    ctx.disable_host(&ctx.hosts[1].id);

    // Pinning the dedicated host works, but raises an alert rather than an
    // error.
    let mut params = ctx.create_params("wren");
    params.pin.host_id = Some(ctx.hosts[0].id);
    let instance =
        ctx.orchestrator.instance_create(&opctx, params).await.unwrap();
    assert_eq!(instance.host_id, Some(ctx.hosts[0].id));
    assert!(ctx
        .datastore
        .alert_events()
        .iter()
        .any(|alert| alert.message.contains("dedicated")));

    // The open search, by contrast, treats foreign dedication as a
    // constraint and finds nothing.
    let params = ctx.create_params("lark");
    assert_matches!(
        ctx.orchestrator.instance_create(&opctx, params).await,
        Err(Error::InsufficientCapacity { .. })
    );
}
