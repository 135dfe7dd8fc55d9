// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Manages execution of background tasks

use super::BackgroundTask;
use super::TaskName;
use crate::context::OpContext;
use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;
use tokio::sync::Notify;
use tokio::time::MissedTickBehavior;

/// Drives the execution of background tasks
///
/// Each orchestrator process has one Driver.  All background tasks are
/// registered with it at startup; the Driver runs each in its own tokio
/// task, activating it when its period elapses or when a caller explicitly
/// asks for it.
pub struct Driver {
    tasks: BTreeMap<TaskName, Task>,
}

/// Driver-side state of a background task
struct Task {
    /// what this task does (for developers)
    description: String,
    /// configured period of the task
    period: Duration,
    /// latest completion reported by the task's tokio task
    status: watch::Receiver<Option<LastCompleted>>,
    /// join handle for the tokio task executing this background task
    tokio_task: tokio::task::JoinHandle<()>,
    /// used to wake the tokio task for an explicit activation
    notify: Arc<Notify>,
}

/// Report of a task's most recent completed activation
#[derive(Clone, Debug)]
pub struct LastCompleted {
    pub iteration: u64,
    pub details: serde_json::Value,
}

/// Why an activation fired, for the logs
#[derive(Copy, Clone, Debug)]
enum ActivationReason {
    Timeout,
    Signaled,
}

impl Driver {
    pub fn new() -> Driver {
        Driver { tasks: BTreeMap::new() }
    }

    /// Register a new background task
    ///
    /// The task activates immediately, then every `period`, then whenever
    /// [`Driver::activate`] is called for it.  Panics on a duplicate name.
    pub fn register(
        &mut self,
        name: &str,
        description: &str,
        period: Duration,
        imp: Box<dyn BackgroundTask>,
        opctx: OpContext,
    ) -> TaskName {
        let (status_tx, status_rx) = watch::channel(None);
        let notify = Arc::new(Notify::new());

        let task_exec = TaskExec {
            period,
            imp,
            notify: Arc::clone(&notify),
            opctx,
            status_tx,
            iteration: 0,
        };
        let tokio_task = tokio::task::spawn(task_exec.run());

        let task = Task {
            description: description.to_owned(),
            period,
            status: status_rx,
            tokio_task,
            notify,
        };
        let name = TaskName(name.to_owned());
        if self.tasks.insert(name.clone(), task).is_some() {
            panic!("started two background tasks called {:?}", name.as_str());
        }
        name
    }

    /// Enumerate all registered background tasks
    pub fn tasks(&self) -> impl Iterator<Item = &TaskName> {
        self.tasks.keys()
    }

    fn task_required(&self, task: &TaskName) -> &Task {
        self.tasks.get(task).unwrap_or_else(|| {
            panic!("attempted to get non-existent background task: {:?}", task)
        })
    }

    /// Returns a summary of what this task does (for developers)
    pub fn task_description(&self, task: &TaskName) -> &str {
        &self.task_required(task).description
    }

    /// Returns the configured period of the task
    pub fn task_period(&self, task: &TaskName) -> Duration {
        self.task_required(task).period
    }

    /// Activate the specified background task
    ///
    /// If the task is currently running, it will be activated again when it
    /// finishes.
    pub fn activate(&self, task: &TaskName) {
        self.task_required(task).notify.notify_one();
    }

    /// Returns the most recent completed activation, if any
    pub fn task_status(&self, task: &TaskName) -> Option<LastCompleted> {
        self.task_required(task).status.borrow().clone()
    }

    /// Returns a watcher that sees every subsequent completion of the task
    pub fn task_watcher(
        &self,
        task: &TaskName,
    ) -> watch::Receiver<Option<LastCompleted>> {
        self.task_required(task).status.clone()
    }
}

impl Drop for Driver {
    fn drop(&mut self) {
        // Terminate all the tokio tasks used to run background tasks.
        for (_, t) in &self.tasks {
            t.tokio_task.abort();
        }
    }
}

/// State needed by the tokio task managing activation of one background
/// task
struct TaskExec {
    period: Duration,
    imp: Box<dyn BackgroundTask>,
    notify: Arc<Notify>,
    opctx: OpContext,
    status_tx: watch::Sender<Option<LastCompleted>>,
    /// counts iterations of the task, for debuggability
    iteration: u64,
}

impl TaskExec {
    async fn run(mut self) {
        let mut interval = tokio::time::interval(self.period);
        interval.set_missed_tick_behavior(MissedTickBehavior::Delay);

        loop {
            tokio::select! {
                _ = interval.tick() => {
                    self.activate(ActivationReason::Timeout).await;
                },

                _ = self.notify.notified() => {
                    self.activate(ActivationReason::Signaled).await;
                }
            }
        }
    }

    async fn activate(&mut self, reason: ActivationReason) {
        self.iteration += 1;
        let iteration = self.iteration;

        slog::debug!(&self.opctx.log, "activating";
            "reason" => ?reason,
            "iteration" => iteration,
        );

        let details = self.imp.activate(&self.opctx).await;

        self.status_tx
            .send_replace(Some(LastCompleted { iteration, details }));

        slog::debug!(&self.opctx.log, "activation complete";
            "iteration" => iteration,
        );
    }
}
