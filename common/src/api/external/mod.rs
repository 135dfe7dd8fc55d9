// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Data structures and related facilities for representing resources in the
//! external view of the control plane
//!
//! These types are used by every component, from the datastore up to the
//! orchestrator's operation entry points.

mod error;

pub use error::Error;
pub use error::LookupType;

use anyhow::Context;
use serde::Deserialize;
use serde::Serialize;
use std::fmt::Display;
use std::fmt::Formatter;
use std::fmt::Result as FormatResult;

/// Result of a create operation for the specified type
pub type CreateResult<T> = Result<T, Error>;
/// Result of a delete operation for the specified type
pub type DeleteResult = Result<(), Error>;
/// Result of a list operation that returns an ObjectStream
pub type ListResultVec<T> = Result<Vec<T>, Error>;
/// Result of a lookup operation for the specified type
pub type LookupResult<T> = Result<T, Error>;
/// Result of an update operation for the specified type
pub type UpdateResult<T> = Result<T, Error>;

/// A count of bytes, typically used either for memory or storage capacity
///
/// The maximum supported byte count is [`i64::MAX`].  This makes it one bit
/// smaller than a full u64, so that the value survives a round trip through
/// any store that only has signed 64-bit integers.
#[derive(
    Copy,
    Clone,
    Debug,
    Deserialize,
    Eq,
    Ord,
    PartialEq,
    PartialOrd,
    Serialize,
)]
pub struct ByteCount(u64);

impl ByteCount {
    pub fn from_mebibytes_u32(mebibytes: u32) -> ByteCount {
        ByteCount::try_from(1024 * 1024 * u64::from(mebibytes)).unwrap()
    }

    pub fn from_gibibytes_u32(gibibytes: u32) -> ByteCount {
        ByteCount::try_from(1024 * 1024 * 1024 * u64::from(gibibytes)).unwrap()
    }

    pub fn to_bytes(&self) -> u64 {
        self.0
    }
    pub fn to_whole_mebibytes(&self) -> u64 {
        self.to_bytes() / 1024 / 1024
    }
    pub fn to_whole_gibibytes(&self) -> u64 {
        self.to_bytes() / 1024 / 1024 / 1024
    }
}

impl TryFrom<u64> for ByteCount {
    type Error = anyhow::Error;

    fn try_from(bytes: u64) -> Result<Self, Self::Error> {
        anyhow::ensure!(
            i64::try_from(bytes).is_ok(),
            "value {} exceeds the maximum byte count",
            bytes
        );
        Ok(ByteCount(bytes))
    }
}

impl From<&ByteCount> for i64 {
    fn from(b: &ByteCount) -> Self {
        // We have already validated that this value is in range.
        i64::try_from(b.0).unwrap()
    }
}

impl Display for ByteCount {
    fn fmt(&self, f: &mut Formatter<'_>) -> FormatResult {
        if self.to_bytes() == 0 {
            write!(f, "0 B")
        } else if self.to_bytes() % (1024 * 1024 * 1024) == 0 {
            write!(f, "{} GiB", self.to_whole_gibibytes())
        } else if self.to_bytes() % (1024 * 1024) == 0 {
            write!(f, "{} MiB", self.to_whole_mebibytes())
        } else {
            write!(f, "{} B", self.to_bytes())
        }
    }
}

/// Generation numbers stored with each record that changes over time
///
/// Comparing generations lets concurrent writers detect that their view of a
/// record is stale without comparing whole records.
#[derive(
    Copy,
    Clone,
    Debug,
    Deserialize,
    Eq,
    Ord,
    PartialEq,
    PartialOrd,
    Serialize,
)]
pub struct Generation(u64);

impl Generation {
    pub fn new() -> Generation {
        Generation(1)
    }

    pub fn next(&self) -> Generation {
        // It should technically be an operational error if this wraps or even
        // exceeds the value allowed by an i64.  But it seems unlikely enough
        // to happen in practice that we can probably feel safe with this.
        let next_gen = self.0 + 1;
        assert!(next_gen <= u64::try_from(i64::MAX).unwrap());
        Generation(next_gen)
    }
}

impl Default for Generation {
    fn default() -> Self {
        Generation::new()
    }
}

impl Display for Generation {
    fn fmt(&self, f: &mut Formatter<'_>) -> FormatResult {
        f.write_str(&self.0.to_string())
    }
}

/// The number of virtual CPUs assigned to an instance
#[derive(
    Copy,
    Clone,
    Debug,
    Deserialize,
    Eq,
    Ord,
    PartialEq,
    PartialOrd,
    Serialize,
)]
pub struct InstanceCpuCount(pub u16);

impl TryFrom<i64> for InstanceCpuCount {
    type Error = anyhow::Error;

    fn try_from(value: i64) -> Result<Self, Self::Error> {
        Ok(InstanceCpuCount(u16::try_from(value).context("parsing CPU count")?))
    }
}

impl From<&InstanceCpuCount> for i64 {
    fn from(c: &InstanceCpuCount) -> Self {
        i64::from(c.0)
    }
}

impl Display for InstanceCpuCount {
    fn fmt(&self, f: &mut Formatter<'_>) -> FormatResult {
        write!(f, "{}", self.0)
    }
}

/// Running state of an Instance
///
/// This typically reflects whether the instance is booted or stopped, but
/// also includes states covering the rest of the instance lifecycle: from
/// initial allocation all the way through expunge.
#[derive(
    Copy,
    Clone,
    Debug,
    Deserialize,
    Eq,
    Ord,
    PartialEq,
    PartialOrd,
    Serialize,
)]
#[serde(rename_all = "lowercase")]
pub enum InstanceState {
    /// Admitted by the control plane, not yet started for the first time.
    Allocated,
    Starting,
    Running,
    /// Implied that a transition to "Stopped" is imminent.
    Stopping,
    /// The instance is currently stopped.
    Stopped,
    /// The instance is being moved between hosts.
    Migrating,
    /// Soft-deleted.  Still occupies a record; the scavenger (or an explicit
    /// expunge) finalizes it, and recovery can still resurrect it.
    Destroyed,
    /// Finalization in progress; the record is removed when it completes.
    Expunging,
    /// A lifecycle operation failed in a way that needs operator attention.
    /// Recoverable only via an explicit recovery transition.
    Error,
}

impl InstanceState {
    pub fn label(&self) -> &'static str {
        match self {
            InstanceState::Allocated => "allocated",
            InstanceState::Starting => "starting",
            InstanceState::Running => "running",
            InstanceState::Stopping => "stopping",
            InstanceState::Stopped => "stopped",
            InstanceState::Migrating => "migrating",
            InstanceState::Destroyed => "destroyed",
            InstanceState::Expunging => "expunging",
            InstanceState::Error => "error",
        }
    }

    /// Returns true if the given state represents an instance with no
    /// presence on any host.  A transition from a !is_halted() state must go
    /// through Stopping.
    pub fn is_halted(&self) -> bool {
        match self {
            InstanceState::Starting => false,
            InstanceState::Running => false,
            InstanceState::Stopping => false,
            InstanceState::Migrating => false,

            InstanceState::Allocated => true,
            InstanceState::Stopped => true,
            InstanceState::Destroyed => true,
            InstanceState::Expunging => true,
            InstanceState::Error => true,
        }
    }
}

impl Display for InstanceState {
    fn fmt(&self, f: &mut Formatter<'_>) -> FormatResult {
        write!(f, "{}", self.label())
    }
}

impl TryFrom<&str> for InstanceState {
    type Error = String;

    fn try_from(variant: &str) -> Result<Self, String> {
        let r = match variant {
            "allocated" => InstanceState::Allocated,
            "starting" => InstanceState::Starting,
            "running" => InstanceState::Running,
            "stopping" => InstanceState::Stopping,
            "stopped" => InstanceState::Stopped,
            "migrating" => InstanceState::Migrating,
            "destroyed" => InstanceState::Destroyed,
            "expunging" => InstanceState::Expunging,
            "error" => InstanceState::Error,
            _ => return Err(format!("Unexpected variant {}", variant)),
        };
        Ok(r)
    }
}

/// Kinds of resources counted against an account's limits
///
/// The variant order here is load-bearing: multi-kind reservations are
/// acquired in ascending `ResourceKind` order so that concurrent requests
/// never hold counters in conflicting orders.
#[derive(
    Copy,
    Clone,
    Debug,
    Deserialize,
    Eq,
    Ord,
    PartialEq,
    PartialOrd,
    Serialize,
)]
#[serde(rename_all = "snake_case")]
pub enum ResourceKind {
    Instance,
    Cpu,
    Memory,
    Gpu,
    Volume,
    PrimaryStorage,
}

impl ResourceKind {
    pub fn label(&self) -> &'static str {
        match self {
            ResourceKind::Instance => "instance",
            ResourceKind::Cpu => "cpu",
            ResourceKind::Memory => "memory",
            ResourceKind::Gpu => "gpu",
            ResourceKind::Volume => "volume",
            ResourceKind::PrimaryStorage => "primary_storage",
        }
    }
}

impl Display for ResourceKind {
    fn fmt(&self, f: &mut Formatter<'_>) -> FormatResult {
        write!(f, "{}", self.label())
    }
}

/// Identifies a type of control plane resource, mostly for error messages
#[derive(Copy, Clone, Debug, Deserialize, Eq, PartialEq, Serialize)]
pub enum ResourceType {
    Account,
    Instance,
    ComputeOffering,
    DiskOffering,
    Volume,
    VolumeSnapshot,
    Zone,
    Pod,
    Cluster,
    Host,
    StoragePool,
    Network,
    Nic,
}

impl Display for ResourceType {
    fn fmt(&self, f: &mut Formatter<'_>) -> FormatResult {
        write!(
            f,
            "{}",
            match self {
                ResourceType::Account => "account",
                ResourceType::Instance => "instance",
                ResourceType::ComputeOffering => "compute offering",
                ResourceType::DiskOffering => "disk offering",
                ResourceType::Volume => "volume",
                ResourceType::VolumeSnapshot => "volume snapshot",
                ResourceType::Zone => "zone",
                ResourceType::Pod => "pod",
                ResourceType::Cluster => "cluster",
                ResourceType::Host => "host",
                ResourceType::StoragePool => "storage pool",
                ResourceType::Network => "network",
                ResourceType::Nic => "nic",
            }
        )
    }
}
