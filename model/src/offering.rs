// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Compute and disk offerings.

use corral_common::api::external::ByteCount;
use corral_common::api::external::InstanceCpuCount;
use serde::Deserialize;
use serde::Serialize;
use uuid::Uuid;

/// Hypervisor families a host can run
#[derive(Copy, Clone, Debug, Deserialize, Eq, PartialEq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum HypervisorFamily {
    Kvm,
    Xen,
    Vmware,
    Hyperv,
}

impl HypervisorFamily {
    pub fn label(&self) -> &'static str {
        match self {
            HypervisorFamily::Kvm => "kvm",
            HypervisorFamily::Xen => "xen",
            HypervisorFamily::Vmware => "vmware",
            HypervisorFamily::Hyperv => "hyperv",
        }
    }
}

impl std::fmt::Display for HypervisorFamily {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.label())
    }
}

/// A named bundle of compute parameters attached to an instance
///
/// Immutable reference data: scale operations compare a "current" and a
/// "new" offering, they never mutate one.
#[derive(Clone, Debug, Deserialize, Serialize)]
pub struct ComputeOffering {
    pub id: Uuid,
    pub name: String,
    pub cpu_count: InstanceCpuCount,
    pub cpu_speed_mhz: u32,
    pub memory: ByteCount,
    pub gpu_count: Option<u32>,
    /// offering parameters may be customized per instance at deploy time
    pub dynamic: bool,
    pub disk_offering_id: Option<Uuid>,
    /// when set, the linked disk offering follows the compute offering on
    /// scale operations
    pub disk_offering_strict: bool,
    /// tags a host must carry to run instances with this offering
    pub host_tags: Vec<String>,
    /// reboot discards and recreates the ROOT volume from the template
    pub volatile: bool,
}

impl ComputeOffering {
    /// Total CPU capacity this offering consumes on a host, in MHz.
    pub fn cpu_mhz_total(&self) -> u64 {
        u64::from(self.cpu_count.0) * u64::from(self.cpu_speed_mhz)
    }
}

/// A named bundle of disk parameters
#[derive(Clone, Debug, Deserialize, Serialize)]
pub struct DiskOffering {
    pub id: Uuid,
    pub name: String,
    pub size: ByteCount,
}
