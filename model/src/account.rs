// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Accounts and their configured resource limits.

use corral_common::api::external::ResourceKind;
use serde::Deserialize;
use serde::Serialize;
use uuid::Uuid;

#[derive(Clone, Debug, Deserialize, Serialize)]
pub struct Account {
    pub id: Uuid,
    pub name: String,
}

/// A configured ceiling for one (account, resource kind, tag) combination
///
/// A limit with no tag applies to untagged usage of that kind; tagged usage
/// is tracked under its own counter key.
#[derive(Clone, Debug, Deserialize, Serialize)]
pub struct ResourceLimit {
    pub account_id: Uuid,
    pub kind: ResourceKind,
    pub tag: Option<String>,
    pub max: i64,
}
