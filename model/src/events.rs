// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Append-only event records: usage (billing), alerts (operators), audit
//! (admin-visible history).

use chrono::DateTime;
use chrono::Utc;
use serde::Deserialize;
use serde::Serialize;
use uuid::Uuid;

#[derive(Copy, Clone, Debug, Deserialize, Eq, PartialEq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum UsageEventKind {
    InstanceCreate,
    InstanceDestroy,
    InstanceStart,
    InstanceStop,
    OfferingChange,
}

/// One billing record.  Formatting for the billing pipeline happens
/// downstream; the orchestrator only appends.
#[derive(Clone, Debug, Deserialize, Serialize)]
pub struct UsageEvent {
    pub id: Uuid,
    pub kind: UsageEventKind,
    pub account_id: Uuid,
    pub instance_id: Uuid,
    pub description: String,
    pub time: DateTime<Utc>,
}

#[derive(Copy, Clone, Debug, Deserialize, Eq, PartialEq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum AlertKind {
    /// a placement or migration crossed a dedication boundary
    DedicationCrossed,
    /// an instance failed to come up and was moved to Error
    StartFailed,
    /// the guest never reported an address within the retry budget
    IpFetchExhausted,
    MigrationAnomaly,
}

#[derive(Clone, Debug, Deserialize, Serialize)]
pub struct AlertEvent {
    pub id: Uuid,
    pub kind: AlertKind,
    pub message: String,
    pub time: DateTime<Utc>,
}

#[derive(Clone, Debug, Deserialize, Serialize)]
pub struct AuditEvent {
    pub id: Uuid,
    pub account_id: Uuid,
    pub operation: String,
    pub instance_id: Option<Uuid>,
    pub time: DateTime<Utc>,
}
