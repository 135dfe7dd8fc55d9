// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Shared operation context.

use slog::o;
use slog::Logger;
use uuid::Uuid;

/// Provided to every orchestrator operation: who is asking, and the logger
/// their actions should be attributed to.
#[derive(Clone)]
pub struct OpContext {
    pub log: Logger,
    pub account_id: Uuid,
    /// elevated callers may force-stop instances and act across accounts
    pub is_admin: bool,
}

impl OpContext {
    pub fn for_account(log: &Logger, account_id: Uuid) -> OpContext {
        OpContext {
            log: log.new(o!("account_id" => account_id.to_string())),
            account_id,
            is_admin: false,
        }
    }

    /// Context for internal work (background tasks, the dev binary).
    pub fn for_service(log: &Logger) -> OpContext {
        OpContext {
            log: log.new(o!("caller" => "service")),
            account_id: Uuid::nil(),
            is_admin: true,
        }
    }
}
