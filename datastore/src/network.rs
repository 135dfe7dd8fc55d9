// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! [`DataStore`] methods on networks and guest NICs.

use crate::DataStore;
use corral_common::api::external::CreateResult;
use corral_common::api::external::Error;
use corral_common::api::external::InstanceState;
use corral_common::api::external::LookupResult;
use corral_common::api::external::ResourceType;
use corral_common::api::external::UpdateResult;
use corral_model::Network;
use corral_model::Nic;
use std::net::Ipv4Addr;
use uuid::Uuid;

impl DataStore {
    pub fn network_create(&self, network: Network) -> CreateResult<Network> {
        let mut tables = self.tables();
        if tables.networks.contains_key(&network.id) {
            return Err(Error::ObjectAlreadyExists {
                type_name: ResourceType::Network,
                object_name: network.id.to_string(),
            });
        }
        tables.networks.insert(network.id, network.clone());
        Ok(network)
    }

    pub fn network_fetch(&self, network_id: &Uuid) -> LookupResult<Network> {
        self.tables().networks.get(network_id).cloned().ok_or_else(|| {
            Error::not_found_by_id(ResourceType::Network, network_id)
        })
    }

    pub fn nic_create(&self, nic: Nic) -> CreateResult<Nic> {
        let mut tables = self.tables();
        if !tables.networks.contains_key(&nic.network_id) {
            return Err(Error::not_found_by_id(
                ResourceType::Network,
                &nic.network_id,
            ));
        }
        tables.nics.insert(nic.id, nic.clone());
        Ok(nic)
    }

    pub fn nic_fetch(&self, nic_id: &Uuid) -> LookupResult<Nic> {
        self.tables()
            .nics
            .get(nic_id)
            .cloned()
            .ok_or_else(|| Error::not_found_by_id(ResourceType::Nic, nic_id))
    }

    pub fn nics_for_instance(&self, instance_id: &Uuid) -> Vec<Nic> {
        self.tables()
            .nics
            .values()
            .filter(|nic| nic.instance_id == *instance_id)
            .cloned()
            .collect()
    }

    pub fn nic_set_ipv4(
        &self,
        nic_id: &Uuid,
        ipv4: Option<Ipv4Addr>,
    ) -> UpdateResult<Nic> {
        let mut tables = self.tables();
        let nic = tables
            .nics
            .get_mut(nic_id)
            .ok_or_else(|| Error::not_found_by_id(ResourceType::Nic, nic_id))?;
        nic.ipv4 = ipv4;
        Ok(nic.clone())
    }

    /// NICs whose address the control plane has to learn from the guest and
    /// hasn't yet: Running instance, Shared/L2 network, no IPv4 on record.
    ///
    /// This is the rebuild query for the IP-fetch tracker; the tracker
    /// itself is process-local and this scan reconstructs it after a
    /// restart.
    pub fn nics_missing_guest_ip(&self) -> Vec<Nic> {
        let tables = self.tables();
        tables
            .nics
            .values()
            .filter(|nic| {
                if nic.ipv4.is_some() {
                    return false;
                }
                let on_reporting_network = tables
                    .networks
                    .get(&nic.network_id)
                    .map(|network| network.kind.guest_reports_ip())
                    .unwrap_or(false);
                if !on_reporting_network {
                    return false;
                }
                tables
                    .instances
                    .get(&nic.instance_id)
                    .map(|instance| {
                        instance.state() == InstanceState::Running
                    })
                    .unwrap_or(false)
            })
            .cloned()
            .collect()
    }
}
