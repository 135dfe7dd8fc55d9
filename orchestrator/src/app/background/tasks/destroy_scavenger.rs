// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Finalizes soft-deleted instances.
//!
//! An instance that has been Destroyed for longer than the configured grace
//! delay is expunged.  The sweep runs under the cluster-wide lease so only
//! one orchestrator process works a cycle; on contention the cycle is
//! skipped, not queued.  Each instance is expunged independently: one bad
//! instance is logged and counted, never a reason to abandon the batch.

use crate::app::background::BackgroundTask;
use crate::app::Orchestrator;
use crate::context::OpContext;
use chrono::Duration as ChronoDuration;
use chrono::Utc;
use futures::future::BoxFuture;
use futures::FutureExt;
use std::sync::Arc;

const LEASE_NAME: &str = "destroy-scavenger";

/// Background task that expunges overdue Destroyed instances.
pub struct DestroyScavenger {
    orchestrator: Arc<Orchestrator>,
}

#[derive(Debug, Default)]
struct ActivationResults {
    found: usize,
    expunged: usize,
    incomplete_cleanups: usize,
    error_count: usize,
}

impl DestroyScavenger {
    pub fn new(orchestrator: Arc<Orchestrator>) -> Self {
        Self { orchestrator }
    }

    async fn scavenge(
        &self,
        results: &mut ActivationResults,
        opctx: &OpContext,
    ) {
        let orchestrator = &self.orchestrator;
        let datastore = orchestrator.datastore();
        let grace = orchestrator
            .config()
            .background
            .destroy_scavenger
            .grace();
        let cutoff = Utc::now()
            - ChronoDuration::from_std(grace)
                .unwrap_or_else(|_| ChronoDuration::zero());

        let overdue = datastore.instances_destroyed_before(cutoff);
        results.found = overdue.len();
        if overdue.is_empty() {
            return;
        }
        slog::info!(opctx.log, "destroy scavenger found overdue instances";
            "count" => overdue.len());

        for instance in overdue {
            match orchestrator.instance_expunge(opctx, &instance.id).await {
                Ok(outcome) => {
                    results.expunged += 1;
                    if !outcome.cleanup_complete {
                        results.incomplete_cleanups += 1;
                    }
                }
                Err(error) => {
                    // Isolate the failure and keep sweeping.
                    slog::warn!(opctx.log, "failed to expunge instance";
                        "instance_id" => %instance.id,
                        "error" => %error,
                    );
                    results.error_count += 1;
                }
            }
        }
    }
}

impl BackgroundTask for DestroyScavenger {
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

            let mut results = ActivationResults::default();
            self.scavenge(&mut results, opctx).await;
            if results.error_count > 0 {
                slog::error!(opctx.log, "destroy scavenger pass had errors";
                    "found" => results.found,
                    "expunged" => results.expunged,
                    "error_count" => results.error_count,
                );
            }
            serde_json::json!({
                "found": results.found,
                "expunged": results.expunged,
                "incomplete_cleanups": results.incomplete_cleanups,
                "error_count": results.error_count,
            })
        }
        .boxed()
    }
}
