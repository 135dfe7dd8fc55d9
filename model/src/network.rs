// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Networks and guest NICs.

use serde::Deserialize;
use serde::Serialize;
use std::net::Ipv4Addr;
use uuid::Uuid;

/// How addresses are managed on a network
///
/// On Shared and L2 networks the control plane does not assign guest
/// addresses itself; it learns them from the guest after boot, which is what
/// the IP-fetch reconciliation task exists for.
#[derive(Copy, Clone, Debug, Deserialize, Eq, PartialEq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum NetworkKind {
    Shared,
    L2,
    Isolated,
}

impl NetworkKind {
    pub fn guest_reports_ip(&self) -> bool {
        matches!(self, NetworkKind::Shared | NetworkKind::L2)
    }
}

#[derive(Clone, Debug, Deserialize, Serialize)]
pub struct Network {
    pub id: Uuid,
    pub name: String,
    pub kind: NetworkKind,
}

#[derive(Clone, Debug, Deserialize, Serialize)]
pub struct Nic {
    pub id: Uuid,
    pub instance_id: Uuid,
    pub network_id: Uuid,
    pub mac: String,
    pub ipv4: Option<Ipv4Addr>,
    pub is_default: bool,
}
