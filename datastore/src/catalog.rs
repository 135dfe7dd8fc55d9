// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! [`DataStore`] methods on reference data: accounts and offerings.

use crate::DataStore;
use corral_common::api::external::Error;
use corral_common::api::external::LookupResult;
use corral_common::api::external::ResourceType;
use corral_model::Account;
use corral_model::ComputeOffering;
use corral_model::DiskOffering;
use uuid::Uuid;

impl DataStore {
    pub fn account_create(&self, account: Account) -> Account {
        self.tables().accounts.insert(account.id, account.clone());
        account
    }

    pub fn account_fetch(&self, account_id: &Uuid) -> LookupResult<Account> {
        self.tables().accounts.get(account_id).cloned().ok_or_else(|| {
            Error::not_found_by_id(ResourceType::Account, account_id)
        })
    }

    pub fn offering_create(&self, offering: ComputeOffering) -> ComputeOffering {
        self.tables().offerings.insert(offering.id, offering.clone());
        offering
    }

    pub fn offering_fetch(
        &self,
        offering_id: &Uuid,
    ) -> LookupResult<ComputeOffering> {
        self.tables().offerings.get(offering_id).cloned().ok_or_else(|| {
            Error::not_found_by_id(ResourceType::ComputeOffering, offering_id)
        })
    }

    pub fn disk_offering_create(&self, offering: DiskOffering) -> DiskOffering {
        self.tables().disk_offerings.insert(offering.id, offering.clone());
        offering
    }

    pub fn disk_offering_fetch(
        &self,
        offering_id: &Uuid,
    ) -> LookupResult<DiskOffering> {
        self.tables().disk_offerings.get(offering_id).cloned().ok_or_else(
            || Error::not_found_by_id(ResourceType::DiskOffering, offering_id),
        )
    }
}
