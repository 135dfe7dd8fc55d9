// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Configuration recognized by the orchestrator, deserialized from TOML.
//!
//! Everything has a default so that an empty file (or an empty section) is a
//! valid configuration; deployments override only what they need.

use anyhow::Context;
use corral_model::HypervisorFamily;
use serde::Deserialize;
use serde::Serialize;
use std::path::Path;
use std::time::Duration;

#[derive(Clone, Debug, Default, Deserialize, PartialEq, Serialize)]
#[serde(deny_unknown_fields)]
pub struct OrchestratorConfig {
    #[serde(default)]
    pub placement: PlacementConfig,
    #[serde(default)]
    pub scale: ScaleConfig,
    #[serde(default)]
    pub stop: StopConfig,
    #[serde(default)]
    pub locks: LockConfig,
    #[serde(default)]
    pub agent: AgentConfig,
    #[serde(default)]
    pub background: BackgroundTaskConfig,
}

impl OrchestratorConfig {
    pub fn from_file(path: &Path) -> Result<OrchestratorConfig, anyhow::Error> {
        let contents = std::fs::read_to_string(path)
            .with_context(|| format!("read config at {}", path.display()))?;
        toml::from_str(&contents)
            .with_context(|| format!("parse config at {}", path.display()))
    }
}

#[derive(Clone, Debug, Deserialize, PartialEq, Serialize)]
#[serde(deny_unknown_fields)]
pub struct PlacementConfig {
    /// when a pinned host fails validation, fall back to an open search
    /// instead of failing the deployment
    #[serde(default = "default_true")]
    pub allow_deploy_fallback: bool,
    /// host tags that only offerings explicitly naming them may use
    #[serde(default)]
    pub strict_host_tags: Vec<String>,
    #[serde(default = "default_overprovisioning")]
    pub cpu_overprovisioning_factor: f64,
    #[serde(default = "default_overprovisioning")]
    pub memory_overprovisioning_factor: f64,
}

impl Default for PlacementConfig {
    fn default() -> Self {
        PlacementConfig {
            allow_deploy_fallback: true,
            strict_host_tags: Vec::new(),
            cpu_overprovisioning_factor: 1.0,
            memory_overprovisioning_factor: 1.0,
        }
    }
}

#[derive(Clone, Debug, Deserialize, PartialEq, Serialize)]
#[serde(deny_unknown_fields)]
pub struct ScaleConfig {
    /// attempts the scale-up loop makes before giving up
    #[serde(default = "default_scale_retry_budget")]
    pub retry_budget: u32,
    /// clusters with CPU utilization at or above this fraction refuse
    /// scale-ups entirely
    #[serde(default = "default_cluster_disable_threshold")]
    pub cluster_disable_threshold: f64,
    /// whether a strict linked disk offering follows the compute offering
    #[serde(default = "default_true")]
    pub allow_disk_offering_change: bool,
    /// hypervisor families that support live reconfiguration
    #[serde(default = "default_scale_hypervisors")]
    pub supported_hypervisors: Vec<HypervisorFamily>,
}

impl Default for ScaleConfig {
    fn default() -> Self {
        ScaleConfig {
            retry_budget: default_scale_retry_budget(),
            cluster_disable_threshold: default_cluster_disable_threshold(),
            allow_disk_offering_change: true,
            supported_hypervisors: default_scale_hypervisors(),
        }
    }
}

#[derive(Clone, Debug, Default, Deserialize, PartialEq, Serialize)]
#[serde(deny_unknown_fields)]
pub struct StopConfig {
    /// whether a plain stop request defaults to a forced stop
    #[serde(default)]
    pub force_default: bool,
}

#[derive(Clone, Debug, Deserialize, PartialEq, Serialize)]
#[serde(deny_unknown_fields)]
pub struct LockConfig {
    #[serde(default = "default_updater_timeout_secs")]
    pub updater_timeout_secs: u64,
    #[serde(default = "default_updater_ttl_secs")]
    pub updater_ttl_secs: u64,
    #[serde(default = "default_cluster_lease_timeout_secs")]
    pub cluster_lease_timeout_secs: u64,
    #[serde(default = "default_cluster_lease_ttl_secs")]
    pub cluster_lease_ttl_secs: u64,
}

impl Default for LockConfig {
    fn default() -> Self {
        LockConfig {
            updater_timeout_secs: default_updater_timeout_secs(),
            updater_ttl_secs: default_updater_ttl_secs(),
            cluster_lease_timeout_secs: default_cluster_lease_timeout_secs(),
            cluster_lease_ttl_secs: default_cluster_lease_ttl_secs(),
        }
    }
}

impl LockConfig {
    pub fn updater_timeout(&self) -> Duration {
        Duration::from_secs(self.updater_timeout_secs)
    }
    pub fn updater_ttl(&self) -> Duration {
        Duration::from_secs(self.updater_ttl_secs)
    }
    pub fn cluster_lease_timeout(&self) -> Duration {
        Duration::from_secs(self.cluster_lease_timeout_secs)
    }
    pub fn cluster_lease_ttl(&self) -> Duration {
        Duration::from_secs(self.cluster_lease_ttl_secs)
    }
}

#[derive(Clone, Debug, Deserialize, PartialEq, Serialize)]
#[serde(deny_unknown_fields)]
pub struct AgentConfig {
    /// ceiling on any single agent command round trip
    #[serde(default = "default_agent_call_timeout_secs")]
    pub call_timeout_secs: u64,
}

impl Default for AgentConfig {
    fn default() -> Self {
        AgentConfig { call_timeout_secs: default_agent_call_timeout_secs() }
    }
}

impl AgentConfig {
    pub fn call_timeout(&self) -> Duration {
        Duration::from_secs(self.call_timeout_secs)
    }
}

#[derive(Clone, Debug, Default, Deserialize, PartialEq, Serialize)]
#[serde(deny_unknown_fields)]
pub struct BackgroundTaskConfig {
    #[serde(default)]
    pub destroy_scavenger: DestroyScavengerConfig,
    #[serde(default)]
    pub ip_fetch: IpFetchConfig,
}

#[derive(Clone, Debug, Deserialize, PartialEq, Serialize)]
#[serde(deny_unknown_fields)]
pub struct DestroyScavengerConfig {
    #[serde(default = "default_scavenger_period_secs")]
    pub period_secs: u64,
    /// how long an instance stays Destroyed before it is expunged
    #[serde(default = "default_scavenger_grace_secs")]
    pub grace_secs: u64,
}

impl Default for DestroyScavengerConfig {
    fn default() -> Self {
        DestroyScavengerConfig {
            period_secs: default_scavenger_period_secs(),
            grace_secs: default_scavenger_grace_secs(),
        }
    }
}

impl DestroyScavengerConfig {
    pub fn period(&self) -> Duration {
        Duration::from_secs(self.period_secs)
    }
    pub fn grace(&self) -> Duration {
        Duration::from_secs(self.grace_secs)
    }
}

#[derive(Clone, Debug, Deserialize, PartialEq, Serialize)]
#[serde(deny_unknown_fields)]
pub struct IpFetchConfig {
    #[serde(default = "default_ip_fetch_period_secs")]
    pub period_secs: u64,
    /// probe attempts per NIC before giving up and alerting
    #[serde(default = "default_ip_fetch_max_retries")]
    pub max_retries: u32,
    /// concurrent guest probes
    #[serde(default = "default_ip_fetch_pool_size")]
    pub pool_size: usize,
}

impl Default for IpFetchConfig {
    fn default() -> Self {
        IpFetchConfig {
            period_secs: default_ip_fetch_period_secs(),
            max_retries: default_ip_fetch_max_retries(),
            pool_size: default_ip_fetch_pool_size(),
        }
    }
}

impl IpFetchConfig {
    pub fn period(&self) -> Duration {
        Duration::from_secs(self.period_secs)
    }
}

fn default_true() -> bool {
    true
}
fn default_overprovisioning() -> f64 {
    1.0
}
fn default_scale_retry_budget() -> u32 {
    3
}
fn default_cluster_disable_threshold() -> f64 {
    0.95
}
fn default_scale_hypervisors() -> Vec<HypervisorFamily> {
    vec![HypervisorFamily::Kvm, HypervisorFamily::Vmware]
}
fn default_updater_timeout_secs() -> u64 {
    5
}
fn default_updater_ttl_secs() -> u64 {
    120
}
fn default_cluster_lease_timeout_secs() -> u64 {
    1
}
fn default_cluster_lease_ttl_secs() -> u64 {
    120
}
fn default_agent_call_timeout_secs() -> u64 {
    30
}
fn default_scavenger_period_secs() -> u64 {
    300
}
fn default_scavenger_grace_secs() -> u64 {
    86400
}
fn default_ip_fetch_period_secs() -> u64 {
    180
}
fn default_ip_fetch_max_retries() -> u32 {
    10
}
fn default_ip_fetch_pool_size() -> usize {
    4
}

#[cfg(test)]
mod test {
    use super::OrchestratorConfig;
    use corral_model::HypervisorFamily;

    #[test]
    fn test_empty_config_uses_defaults() {
        let config: OrchestratorConfig = toml::from_str("").unwrap();
        assert!(config.placement.allow_deploy_fallback);
        assert_eq!(config.scale.retry_budget, 3);
        assert_eq!(config.background.ip_fetch.max_retries, 10);
        assert_eq!(config.background.destroy_scavenger.grace_secs, 86400);
        assert!(!config.stop.force_default);
    }

    #[test]
    fn test_full_config_round_trip() {
        let raw = r#"
            [placement]
            allow_deploy_fallback = false
            strict_host_tags = ["gpu", "nvme"]
            cpu_overprovisioning_factor = 2.0
            memory_overprovisioning_factor = 1.5

            [scale]
            retry_budget = 5
            cluster_disable_threshold = 0.9
            allow_disk_offering_change = false
            supported_hypervisors = ["kvm"]

            [stop]
            force_default = true

            [locks]
            updater_timeout_secs = 2
            updater_ttl_secs = 60
            cluster_lease_timeout_secs = 1
            cluster_lease_ttl_secs = 30

            [agent]
            call_timeout_secs = 10

            [background.destroy_scavenger]
            period_secs = 60
            grace_secs = 600

            [background.ip_fetch]
            period_secs = 30
            max_retries = 3
            pool_size = 2
        "#;
        let config: OrchestratorConfig = toml::from_str(raw).unwrap();
        assert!(!config.placement.allow_deploy_fallback);
        assert_eq!(config.placement.strict_host_tags, vec!["gpu", "nvme"]);
        assert_eq!(
            config.scale.supported_hypervisors,
            vec![HypervisorFamily::Kvm]
        );
        assert_eq!(config.background.ip_fetch.pool_size, 2);

        // Serializing and re-parsing must round trip.
        let serialized = toml::to_string(&config).unwrap();
        let reparsed: OrchestratorConfig =
            toml::from_str(&serialized).unwrap();
        assert_eq!(config, reparsed);
    }

    #[test]
    fn test_unknown_keys_rejected() {
        assert!(
            toml::from_str::<OrchestratorConfig>("[placement]\nbogus = 1")
                .is_err()
        );
    }
}
