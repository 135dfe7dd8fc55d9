// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Append-only event tables: usage (billing), alerts, audit history.

use crate::DataStore;
use chrono::Utc;
use corral_model::AlertEvent;
use corral_model::AlertKind;
use corral_model::AuditEvent;
use corral_model::UsageEvent;
use corral_model::UsageEventKind;
use uuid::Uuid;

impl DataStore {
    pub fn usage_event_record(
        &self,
        kind: UsageEventKind,
        account_id: Uuid,
        instance_id: Uuid,
        description: &str,
    ) {
        self.tables().usage_events.push(UsageEvent {
            id: Uuid::new_v4(),
            kind,
            account_id,
            instance_id,
            description: description.to_owned(),
            time: Utc::now(),
        });
    }

    pub fn alert_event_record(&self, kind: AlertKind, message: &str) {
        slog::warn!(self.log, "operator alert";
            "kind" => ?kind,
            "message" => message,
        );
        self.tables().alert_events.push(AlertEvent {
            id: Uuid::new_v4(),
            kind,
            message: message.to_owned(),
            time: Utc::now(),
        });
    }

    pub fn audit_event_record(
        &self,
        account_id: Uuid,
        operation: &str,
        instance_id: Option<Uuid>,
    ) {
        self.tables().audit_events.push(AuditEvent {
            id: Uuid::new_v4(),
            account_id,
            operation: operation.to_owned(),
            instance_id,
            time: Utc::now(),
        });
    }

    pub fn usage_events(&self) -> Vec<UsageEvent> {
        self.tables().usage_events.clone()
    }

    pub fn alert_events(&self) -> Vec<AlertEvent> {
        self.tables().alert_events.clone()
    }

    pub fn audit_events(&self) -> Vec<AuditEvent> {
        self.tables().audit_events.clone()
    }
}
