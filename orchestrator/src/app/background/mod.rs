// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Background tasks: periodic reconciliation work that runs inside every
//! orchestrator process.
//!
//! Tasks that must not run on more than one process at a time (the destroy
//! scavenger, the IP-fetch retry task) guard their bodies with the
//! datastore's cluster lease and skip the cycle on contention.

mod driver;
pub mod tasks;

pub use driver::Driver;
pub use driver::LastCompleted;

use crate::context::OpContext;
use futures::future::BoxFuture;

/// An operation activated periodically (or explicitly) by the [`Driver`]
///
/// The returned value is a task-specific status report, surfaced for
/// observability; activations are expected to handle their own errors and
/// fold them into that report.
pub trait BackgroundTask: Send + Sync {
    fn activate<'a>(
        &'a mut self,
        opctx: &'a OpContext,
    ) -> BoxFuture<'a, serde_json::Value>;
}

/// Identifies a background task registered with the [`Driver`]
#[derive(Clone, Debug, Eq, Ord, PartialEq, PartialOrd)]
pub struct TaskName(pub(crate) String);

impl TaskName {
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for TaskName {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}
