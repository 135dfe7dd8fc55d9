// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Record types persisted by the Corral datastore.
//!
//! These are deliberately plain structs: all mutation policy (state machine
//! gating, quota accounting, lease management) lives in `corral-datastore`.

mod account;
mod events;
mod host;
mod instance;
mod network;
mod offering;
mod volume;

pub use account::Account;
pub use account::ResourceLimit;
pub use events::AlertEvent;
pub use events::AlertKind;
pub use events::AuditEvent;
pub use events::UsageEvent;
pub use events::UsageEventKind;
pub use host::Cluster;
pub use host::Host;
pub use host::Pod;
pub use host::StoragePool;
pub use host::Zone;
pub use instance::Instance;
pub use instance::InstanceRuntimeState;
pub use instance::StateEvent;
pub use network::Network;
pub use network::NetworkKind;
pub use network::Nic;
pub use offering::ComputeOffering;
pub use offering::DiskOffering;
pub use offering::HypervisorFamily;
pub use volume::Volume;
pub use volume::VolumeKind;
pub use volume::VolumeSnapshot;
pub use volume::VolumeSnapshotState;
pub use volume::VolumeState;
