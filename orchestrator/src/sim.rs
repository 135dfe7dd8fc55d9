// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! A simulated hypervisor agent.
//!
//! Commands succeed by default; tests program failures, unreachable hosts,
//! and guest-reported addresses to exercise the orchestrator's error and
//! retry paths.  The dev binary runs against this as well.

use crate::agent::VmmAgent;
use crate::agent::VmmAnswer;
use crate::agent::VmmCommand;
use async_trait::async_trait;
use corral_common::api::external::Error;
use slog::o;
use slog::Logger;
use std::collections::BTreeMap;
use std::collections::BTreeSet;
use std::net::Ipv4Addr;
use std::sync::Arc;
use std::sync::Mutex;
use uuid::Uuid;

pub struct SimAgent {
    log: Logger,
    inner: Mutex<SimState>,
}

#[derive(Default)]
struct SimState {
    unreachable: BTreeSet<Uuid>,
    /// remaining failures to inject, per command label
    fail_counts: BTreeMap<&'static str, u32>,
    /// what the guest will eventually report, per NIC: the address and how
    /// many probes fail before it appears
    guest_ips: BTreeMap<Uuid, GuestIp>,
    /// observed probe count per NIC
    probes: BTreeMap<Uuid, u32>,
    commands: Vec<(Uuid, &'static str)>,
}

struct GuestIp {
    address: Ipv4Addr,
    failures_before_success: u32,
}

impl SimAgent {
    pub fn new(log: &Logger) -> Arc<SimAgent> {
        Arc::new(SimAgent {
            log: log.new(o!("component" => "SimAgent")),
            inner: Mutex::new(SimState::default()),
        })
    }

    fn state(&self) -> std::sync::MutexGuard<'_, SimState> {
        self.inner.lock().unwrap()
    }

    pub fn set_unreachable(&self, host_id: Uuid, unreachable: bool) {
        let mut state = self.state();
        if unreachable {
            state.unreachable.insert(host_id);
        } else {
            state.unreachable.remove(&host_id);
        }
    }

    /// Make the next `count` commands with this label fail.
    pub fn fail_next(&self, label: &'static str, count: u32) {
        self.state().fail_counts.insert(label, count);
    }

    /// Program the guest address a NIC reports, optionally only after a
    /// number of failed probes.
    pub fn set_guest_ip_after(
        &self,
        nic_id: Uuid,
        address: Ipv4Addr,
        failures_before_success: u32,
    ) {
        self.state().guest_ips.insert(
            nic_id,
            GuestIp { address, failures_before_success },
        );
    }

    pub fn set_guest_ip(&self, nic_id: Uuid, address: Ipv4Addr) {
        self.set_guest_ip_after(nic_id, address, 0);
    }

    pub fn probe_count(&self, nic_id: &Uuid) -> u32 {
        self.state().probes.get(nic_id).copied().unwrap_or(0)
    }

    pub fn commands_sent(&self) -> Vec<(Uuid, &'static str)> {
        self.state().commands.clone()
    }
}

#[async_trait]
impl VmmAgent for SimAgent {
    async fn send(
        &self,
        host_id: Uuid,
        command: VmmCommand,
    ) -> Result<VmmAnswer, Error> {
        let label = command.label();
        let mut state = self.state();
        state.commands.push((host_id, label));

        if state.unreachable.contains(&host_id) {
            return Err(Error::unavail(&format!(
                "agent on host {} is unreachable",
                host_id
            )));
        }

        if let Some(remaining) = state.fail_counts.get_mut(label) {
            if *remaining > 0 {
                *remaining -= 1;
                slog::debug!(self.log, "injecting command failure";
                    "host_id" => %host_id,
                    "command" => label,
                );
                return Ok(VmmAnswer::failed("injected failure"));
            }
        }

        if let VmmCommand::FetchGuestIp { nic_id, .. } = command {
            *state.probes.entry(nic_id).or_insert(0) += 1;
            return Ok(match state.guest_ips.get_mut(&nic_id) {
                Some(guest) if guest.failures_before_success == 0 => {
                    VmmAnswer {
                        success: true,
                        payload: Some(guest.address.to_string()),
                    }
                }
                Some(guest) => {
                    guest.failures_before_success -= 1;
                    VmmAnswer::failed("guest has not reported an address")
                }
                None => VmmAnswer::failed("guest has not reported an address"),
            });
        }

        Ok(VmmAnswer::ok())
    }
}
