// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! The hypervisor agent port.
//!
//! The orchestrator talks to the process managing VMs on each host through
//! this narrow interface: one synchronous command, one answer with a
//! success flag.  Transport details (and the hypervisor protocol itself)
//! live behind the trait; the orchestrator only assumes that a call may
//! time out or find the agent unavailable.

use async_trait::async_trait;
use corral_common::api::external::Error;
use corral_model::ComputeOffering;
use std::net::Ipv4Addr;
use uuid::Uuid;

/// A command dispatched to the agent on one host
#[derive(Clone, Debug)]
pub enum VmmCommand {
    /// Boot an instance, with its offering describing the virtual hardware.
    Start { instance_id: Uuid, offering: ComputeOffering },
    /// Shut an instance down.  `force` skips the graceful guest shutdown.
    Stop { instance_id: Uuid, force: bool },
    Reboot { instance_id: Uuid },
    /// Move a running instance to `dest_host_id`.
    Migrate { instance_id: Uuid, dest_host_id: Uuid },
    /// Remove any remaining presence of the instance from the host.
    Destroy { instance_id: Uuid },
    /// Discard the ROOT disk and reprovision it from the template.
    RestoreRoot { instance_id: Uuid, template_id: Uuid },
    /// Re-apply DHCP and user-data inside the guest after a reboot.
    RefreshGuestConfig { instance_id: Uuid },
    /// Live-resize the instance to a new offering.
    Reconfigure { instance_id: Uuid, offering: ComputeOffering },
    /// Ask the guest for the IPv4 address of one of its NICs.
    FetchGuestIp { instance_id: Uuid, nic_id: Uuid },
}

impl VmmCommand {
    pub fn label(&self) -> &'static str {
        match self {
            VmmCommand::Start { .. } => "start",
            VmmCommand::Stop { .. } => "stop",
            VmmCommand::Reboot { .. } => "reboot",
            VmmCommand::Migrate { .. } => "migrate",
            VmmCommand::Destroy { .. } => "destroy",
            VmmCommand::RestoreRoot { .. } => "restore-root",
            VmmCommand::RefreshGuestConfig { .. } => "refresh-guest-config",
            VmmCommand::Reconfigure { .. } => "reconfigure",
            VmmCommand::FetchGuestIp { .. } => "fetch-guest-ip",
        }
    }
}

/// The answer to a [`VmmCommand`]
#[derive(Clone, Debug)]
pub struct VmmAnswer {
    pub success: bool,
    /// command-specific result detail (an error message, a fetched address)
    pub payload: Option<String>,
}

impl VmmAnswer {
    pub fn ok() -> VmmAnswer {
        VmmAnswer { success: true, payload: None }
    }

    pub fn failed(detail: &str) -> VmmAnswer {
        VmmAnswer { success: false, payload: Some(detail.to_owned()) }
    }

    /// Parse the payload of a successful FetchGuestIp answer.
    pub fn guest_ip(&self) -> Option<Ipv4Addr> {
        self.payload.as_deref().and_then(|raw| raw.parse().ok())
    }
}

/// Transport to the VM management agents, one per host
///
/// An implementation returns `Err(Error::ServiceUnavailable)` when the agent
/// cannot be reached at all; an answer with `success == false` means the
/// agent executed the command and it failed.
#[async_trait]
pub trait VmmAgent: Send + Sync {
    async fn send(
        &self,
        host_id: Uuid,
        command: VmmCommand,
    ) -> Result<VmmAnswer, Error>;
}
