// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! The Instance record and its lifecycle transition table.

use chrono::DateTime;
use chrono::Utc;
use corral_common::api::external::Generation;
use corral_common::api::external::InstanceState;
use serde::Deserialize;
use serde::Serialize;
use std::collections::BTreeMap;
use uuid::Uuid;

/// Runtime state of an Instance, updated only through the datastore's
/// compare-and-swap gate
#[derive(Clone, Debug, Deserialize, Serialize)]
pub struct InstanceRuntimeState {
    pub state: InstanceState,
    /// generation number for this runtime state, bumped on every accepted
    /// transition
    pub gen: Generation,
    pub time_updated: DateTime<Utc>,
}

impl InstanceRuntimeState {
    pub fn new(state: InstanceState) -> Self {
        InstanceRuntimeState {
            state,
            gen: Generation::new(),
            time_updated: Utc::now(),
        }
    }
}

/// A virtual machine instance
///
/// Created in the Allocated state by a deploy request and mutated only
/// through the lifecycle state machine.  Soft-deleted (Destroyed) before
/// being hard-deleted (Expunging, then removed from the store).
#[derive(Clone, Debug, Deserialize, Serialize)]
pub struct Instance {
    pub id: Uuid,
    pub name: String,
    pub account_id: Uuid,
    pub zone_id: Uuid,
    pub offering_id: Uuid,
    pub template_id: Uuid,
    /// host currently running (or last asked to run) this instance
    pub host_id: Option<Uuid>,
    /// host this instance most recently ran on; used as a placement hint
    /// and to tear down stale presence after failures
    pub last_host_id: Option<Uuid>,
    pub ha_enabled: bool,
    pub display: bool,
    pub dynamically_scalable: bool,
    /// free-form details bag (userdata keys, driver hints, and the like)
    pub details: BTreeMap<String, String>,
    pub runtime: InstanceRuntimeState,
    pub time_created: DateTime<Utc>,
}

impl Instance {
    pub fn new(
        name: &str,
        account_id: Uuid,
        zone_id: Uuid,
        offering_id: Uuid,
        template_id: Uuid,
    ) -> Self {
        Instance {
            id: Uuid::new_v4(),
            name: name.to_owned(),
            account_id,
            zone_id,
            offering_id,
            template_id,
            host_id: None,
            last_host_id: None,
            ha_enabled: false,
            display: true,
            dynamically_scalable: true,
            details: BTreeMap::new(),
            runtime: InstanceRuntimeState::new(InstanceState::Allocated),
            time_created: Utc::now(),
        }
    }

    pub fn state(&self) -> InstanceState {
        self.runtime.state
    }
}

/// Events that drive the instance state machine
///
/// Every persisted state change is the application of one of these events.
/// An event carries its permitted source states and its target state; the
/// datastore's gate rejects an event whose source set does not contain the
/// instance's current persisted state.
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub enum StateEvent {
    StartRequested,
    StartSucceeded,
    StartFailed,
    StopRequested,
    StopSucceeded,
    StopFailed,
    MigrateRequested,
    MigrateSucceeded,
    MigrateFailed,
    DestroyRequested,
    ExpungeRequested,
    RecoverRequested,
}

impl StateEvent {
    /// The set of persisted states from which this event may be applied.
    pub fn permitted_sources(&self) -> &'static [InstanceState] {
        use InstanceState::*;
        match self {
            StateEvent::StartRequested => &[Allocated, Stopped],
            StateEvent::StartSucceeded => &[Starting],
            StateEvent::StartFailed => &[Starting],
            StateEvent::StopRequested => &[Running],
            StateEvent::StopSucceeded => &[Stopping],
            StateEvent::StopFailed => &[Stopping],
            StateEvent::MigrateRequested => &[Running],
            StateEvent::MigrateSucceeded => &[Migrating],
            StateEvent::MigrateFailed => &[Migrating],
            // Allocated is included so a recovered (or never started)
            // instance can be destroyed again.
            StateEvent::DestroyRequested => &[Allocated, Running, Stopped],
            StateEvent::ExpungeRequested => &[Destroyed, Error],
            StateEvent::RecoverRequested => &[Destroyed],
        }
    }

    /// The state an instance lands in when this event is applied.
    pub fn target(&self) -> InstanceState {
        use InstanceState::*;
        match self {
            StateEvent::StartRequested => Starting,
            StateEvent::StartSucceeded => Running,
            StateEvent::StartFailed => Error,
            StateEvent::StopRequested => Stopping,
            StateEvent::StopSucceeded => Stopped,
            // A failed graceful stop leaves the guest running.
            StateEvent::StopFailed => Running,
            StateEvent::MigrateRequested => Migrating,
            // A failed migration leaves the instance running on the source.
            StateEvent::MigrateSucceeded => Running,
            StateEvent::MigrateFailed => Running,
            StateEvent::DestroyRequested => Destroyed,
            StateEvent::ExpungeRequested => Expunging,
            StateEvent::RecoverRequested => Allocated,
        }
    }

    pub fn label(&self) -> &'static str {
        match self {
            StateEvent::StartRequested => "start-requested",
            StateEvent::StartSucceeded => "start-succeeded",
            StateEvent::StartFailed => "start-failed",
            StateEvent::StopRequested => "stop-requested",
            StateEvent::StopSucceeded => "stop-succeeded",
            StateEvent::StopFailed => "stop-failed",
            StateEvent::MigrateRequested => "migrate-requested",
            StateEvent::MigrateSucceeded => "migrate-succeeded",
            StateEvent::MigrateFailed => "migrate-failed",
            StateEvent::DestroyRequested => "destroy-requested",
            StateEvent::ExpungeRequested => "expunge-requested",
            StateEvent::RecoverRequested => "recover-requested",
        }
    }
}

impl std::fmt::Display for StateEvent {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.label())
    }
}
