// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! [`DataStore`] methods on [`Instance`]s: CRUD, the state transition gate,
//! and the per-instance updater lease.

use crate::lease_expired;
use crate::DataStore;
use chrono::DateTime;
use chrono::Duration as ChronoDuration;
use chrono::Utc;
use corral_common::api::external::CreateResult;
use corral_common::api::external::DeleteResult;
use corral_common::api::external::Error;
use corral_common::api::external::InstanceState;
use corral_common::api::external::LookupResult;
use corral_common::api::external::ResourceType;
use corral_common::api::external::UpdateResult;
use corral_model::Instance;
use corral_model::StateEvent;
use std::time::Duration;
use std::time::Instant;
use uuid::Uuid;

/// How long a contended lock acquisition sleeps between attempts.
const LOCK_RETRY_INTERVAL: Duration = Duration::from_millis(20);

/// Store-side state of a per-instance updater lease.
pub(crate) struct UpdaterLease {
    holder: Uuid,
    /// bumped every time the lease is taken, so a stale unlock (or an
    /// expired holder coming back) cannot release somebody else's lease
    gen: u64,
    expires: DateTime<Utc>,
}

/// A token proving that the caller holds the updater lease on an instance.
///
/// Returned by [`DataStore::instance_updater_lock`], passed back to
/// [`DataStore::instance_updater_unlock`].
#[derive(Clone, Debug)]
pub struct UpdaterLock {
    holder: Uuid,
    locked_gen: u64,
}

impl DataStore {
    /// Insert a record for a freshly allocated instance.
    pub fn instance_create(&self, instance: Instance) -> CreateResult<Instance> {
        let mut tables = self.tables();
        if tables.instances.contains_key(&instance.id) {
            return Err(Error::ObjectAlreadyExists {
                type_name: ResourceType::Instance,
                object_name: instance.id.to_string(),
            });
        }
        if tables.instances.values().any(|existing| {
            existing.account_id == instance.account_id
                && existing.name == instance.name
        }) {
            return Err(Error::ObjectAlreadyExists {
                type_name: ResourceType::Instance,
                object_name: instance.name.clone(),
            });
        }
        tables.instances.insert(instance.id, instance.clone());
        Ok(instance)
    }

    pub fn instance_fetch(&self, instance_id: &Uuid) -> LookupResult<Instance> {
        self.tables()
            .instances
            .get(instance_id)
            .cloned()
            .ok_or_else(|| {
                Error::not_found_by_id(ResourceType::Instance, instance_id)
            })
    }

    pub fn instance_list(&self) -> Vec<Instance> {
        self.tables().instances.values().cloned().collect()
    }

    /// Instances with an active presence on the given host, for capacity
    /// accounting.
    pub fn instance_list_by_host(&self, host_id: &Uuid) -> Vec<Instance> {
        self.tables()
            .instances
            .values()
            .filter(|instance| {
                instance.host_id.as_ref() == Some(host_id)
                    && !instance.state().is_halted()
            })
            .cloned()
            .collect()
    }

    /// Instances soft-deleted at or before `cutoff`, ready for the
    /// scavenger.
    pub fn instances_destroyed_before(
        &self,
        cutoff: DateTime<Utc>,
    ) -> Vec<Instance> {
        self.tables()
            .instances
            .values()
            .filter(|instance| {
                instance.state() == InstanceState::Destroyed
                    && instance.runtime.time_updated <= cutoff
            })
            .cloned()
            .collect()
    }

    /// The state transition gate.
    ///
    /// Applies `event` if and only if the instance's current persisted state
    /// is in the event's permitted source set, bumping the state generation.
    /// Returns `Ok(false)` without modifying anything when the instance is
    /// already in the event's target state (another orchestrator got there
    /// first); any other out-of-set state is an [`Error::InvalidRequest`]
    /// and the record is untouched.
    pub fn instance_update_state(
        &self,
        instance_id: &Uuid,
        event: StateEvent,
    ) -> Result<bool, Error> {
        let mut tables = self.tables();
        let instance =
            tables.instances.get_mut(instance_id).ok_or_else(|| {
                Error::not_found_by_id(ResourceType::Instance, instance_id)
            })?;

        let current = instance.runtime.state;
        if !event.permitted_sources().contains(&current) {
            if current == event.target() {
                return Ok(false);
            }
            return Err(Error::invalid_request(&format!(
                "cannot apply {} to instance {} in state \"{}\"",
                event, instance_id, current
            )));
        }

        instance.runtime.state = event.target();
        instance.runtime.gen = instance.runtime.gen.next();
        instance.runtime.time_updated = Utc::now();
        slog::debug!(self.log, "instance state transition";
            "instance_id" => %instance_id,
            "event" => %event,
            "from" => %current,
            "to" => %event.target(),
            "gen" => %instance.runtime.gen,
        );
        Ok(true)
    }

    /// Point an instance at a host (or clear its placement).  The previous
    /// host is retained as `last_host_id`.
    pub fn instance_set_host(
        &self,
        instance_id: &Uuid,
        host_id: Option<Uuid>,
    ) -> UpdateResult<Instance> {
        let mut tables = self.tables();
        let instance =
            tables.instances.get_mut(instance_id).ok_or_else(|| {
                Error::not_found_by_id(ResourceType::Instance, instance_id)
            })?;
        if let Some(previous) = instance.host_id {
            instance.last_host_id = Some(previous);
        }
        instance.host_id = host_id;
        Ok(instance.clone())
    }

    /// Record that an instance now runs with a different compute offering.
    pub fn instance_set_offering(
        &self,
        instance_id: &Uuid,
        offering_id: Uuid,
    ) -> UpdateResult<Instance> {
        let mut tables = self.tables();
        let instance =
            tables.instances.get_mut(instance_id).ok_or_else(|| {
                Error::not_found_by_id(ResourceType::Instance, instance_id)
            })?;
        instance.offering_id = offering_id;
        Ok(instance.clone())
    }

    /// Hard-delete an instance record.  Only legal for an instance that has
    /// made it to Expunging; its NICs go with it.
    pub fn instance_remove(&self, instance_id: &Uuid) -> DeleteResult {
        let mut tables = self.tables();
        let instance = tables.instances.get(instance_id).ok_or_else(|| {
            Error::not_found_by_id(ResourceType::Instance, instance_id)
        })?;
        if instance.state() != InstanceState::Expunging {
            return Err(Error::invalid_request(&format!(
                "cannot remove instance {} in state \"{}\"",
                instance_id,
                instance.state()
            )));
        }
        tables.instances.remove(instance_id);
        tables.nics.retain(|_, nic| nic.instance_id != *instance_id);
        tables.updater_leases.remove(instance_id);
        Ok(())
    }

    /// Acquire the updater lease on an instance, waiting up to `timeout`.
    ///
    /// The lease carries a TTL so that a crashed holder cannot wedge the
    /// instance forever.  Contention past the timeout is reported as a fast
    /// [`Error::ServiceUnavailable`], never an unbounded wait.
    pub async fn instance_updater_lock(
        &self,
        instance_id: &Uuid,
        holder: Uuid,
        timeout: Duration,
        ttl: Duration,
    ) -> Result<UpdaterLock, Error> {
        let deadline = Instant::now() + timeout;
        loop {
            {
                let mut tables = self.tables();
                if !tables.instances.contains_key(instance_id) {
                    return Err(Error::not_found_by_id(
                        ResourceType::Instance,
                        instance_id,
                    ));
                }
                let expires = Utc::now()
                    + ChronoDuration::from_std(ttl)
                        .map_err(|_| Error::internal_error("lease ttl out of range"))?;
                match tables.updater_leases.get_mut(instance_id) {
                    Some(lease) if !lease_expired(lease.expires) => {
                        // Held by someone else; fall through to wait.
                    }
                    Some(lease) => {
                        lease.holder = holder;
                        lease.gen += 1;
                        lease.expires = expires;
                        return Ok(UpdaterLock {
                            holder,
                            locked_gen: lease.gen,
                        });
                    }
                    None => {
                        tables.updater_leases.insert(
                            *instance_id,
                            UpdaterLease { holder, gen: 1, expires },
                        );
                        return Ok(UpdaterLock { holder, locked_gen: 1 });
                    }
                }
            }

            if Instant::now() >= deadline {
                return Err(Error::unavail(&format!(
                    "instance {} is locked by another operation",
                    instance_id
                )));
            }
            tokio::time::sleep(LOCK_RETRY_INTERVAL).await;
        }
    }

    /// Release the updater lease.  A stale token (expired and re-taken by
    /// somebody else) is ignored rather than clobbering the new holder.
    pub fn instance_updater_unlock(
        &self,
        instance_id: &Uuid,
        lock: &UpdaterLock,
    ) {
        let mut tables = self.tables();
        if let Some(lease) = tables.updater_leases.get(instance_id) {
            if lease.holder == lock.holder && lease.gen == lock.locked_gen {
                tables.updater_leases.remove(instance_id);
            } else {
                slog::warn!(self.log,
                    "ignoring stale updater lease release";
                    "instance_id" => %instance_id,
                    "holder" => %lock.holder,
                );
            }
        }
    }
}

#[cfg(test)]
mod test {
    use crate::DataStore;
    use assert_matches::assert_matches;
    use corral_common::api::external::Error;
    use corral_common::api::external::InstanceState;
    use corral_model::Instance;
    use corral_model::StateEvent;
    use corral_test_utils::test_setup_log;
    use std::time::Duration;
    use uuid::Uuid;

    fn new_instance() -> Instance {
        Instance::new(
            "wren",
            Uuid::new_v4(),
            Uuid::new_v4(),
            Uuid::new_v4(),
            Uuid::new_v4(),
        )
    }

    #[tokio::test]
    async fn test_transition_gate_rejects_and_leaves_state_unchanged() {
        let log = test_setup_log(
            "test_transition_gate_rejects_and_leaves_state_unchanged",
        );
        let datastore = DataStore::new(&log);
        let instance = datastore.instance_create(new_instance()).unwrap();

        // An allocated instance cannot stop, migrate, or recover.
        for event in [
            StateEvent::StopRequested,
            StateEvent::MigrateRequested,
            StateEvent::RecoverRequested,
        ] {
            assert_matches!(
                datastore.instance_update_state(&instance.id, event),
                Err(Error::InvalidRequest { .. })
            );
            let after = datastore.instance_fetch(&instance.id).unwrap();
            assert_eq!(after.state(), InstanceState::Allocated);
            assert_eq!(after.runtime.gen, instance.runtime.gen);
        }

        // The legal path bumps the generation each time.
        assert!(datastore
            .instance_update_state(&instance.id, StateEvent::StartRequested)
            .unwrap());
        assert!(datastore
            .instance_update_state(&instance.id, StateEvent::StartSucceeded)
            .unwrap());
        let after = datastore.instance_fetch(&instance.id).unwrap();
        assert_eq!(after.state(), InstanceState::Running);
        assert!(after.runtime.gen > instance.runtime.gen);
    }

    #[tokio::test]
    async fn test_transition_gate_is_idempotent_on_lost_races() {
        let log =
            test_setup_log("test_transition_gate_is_idempotent_on_lost_races");
        let datastore = DataStore::new(&log);
        let instance = datastore.instance_create(new_instance()).unwrap();
        datastore
            .instance_update_state(&instance.id, StateEvent::StartRequested)
            .unwrap();
        datastore
            .instance_update_state(&instance.id, StateEvent::StartSucceeded)
            .unwrap();
        datastore
            .instance_update_state(&instance.id, StateEvent::StopRequested)
            .unwrap();
        assert!(datastore
            .instance_update_state(&instance.id, StateEvent::StopSucceeded)
            .unwrap());

        // A second orchestrator applying the same completion loses the race
        // benignly: no error, no change.
        let before = datastore.instance_fetch(&instance.id).unwrap();
        assert!(!datastore
            .instance_update_state(&instance.id, StateEvent::StopSucceeded)
            .unwrap());
        let after = datastore.instance_fetch(&instance.id).unwrap();
        assert_eq!(after.runtime.gen, before.runtime.gen);
    }

    #[tokio::test]
    async fn test_updater_lock_contention_fails_fast() {
        let log = test_setup_log("test_updater_lock_contention_fails_fast");
        let datastore = DataStore::new(&log);
        let instance = datastore.instance_create(new_instance()).unwrap();

        let lock = datastore
            .instance_updater_lock(
                &instance.id,
                Uuid::new_v4(),
                Duration::from_millis(50),
                Duration::from_secs(30),
            )
            .await
            .unwrap();

        // A second holder times out quickly with a retryable error.
        let contender = datastore
            .instance_updater_lock(
                &instance.id,
                Uuid::new_v4(),
                Duration::from_millis(50),
                Duration::from_secs(30),
            )
            .await;
        assert_matches!(contender, Err(Error::ServiceUnavailable { .. }));
        assert!(contender.unwrap_err().retryable());

        datastore.instance_updater_unlock(&instance.id, &lock);
        datastore
            .instance_updater_lock(
                &instance.id,
                Uuid::new_v4(),
                Duration::from_millis(50),
                Duration::from_secs(30),
            )
            .await
            .unwrap();
    }

    #[tokio::test]
    async fn test_updater_lock_expires() {
        let log = test_setup_log("test_updater_lock_expires");
        let datastore = DataStore::new(&log);
        let instance = datastore.instance_create(new_instance()).unwrap();

        let stale = datastore
            .instance_updater_lock(
                &instance.id,
                Uuid::new_v4(),
                Duration::from_millis(50),
                Duration::from_millis(10),
            )
            .await
            .unwrap();
        tokio::time::sleep(Duration::from_millis(30)).await;

        // The first holder's TTL has lapsed, so a new holder gets in.
        let lock = datastore
            .instance_updater_lock(
                &instance.id,
                Uuid::new_v4(),
                Duration::from_millis(50),
                Duration::from_secs(30),
            )
            .await
            .unwrap();

        // The stale token must not release the new holder's lease.
        datastore.instance_updater_unlock(&instance.id, &stale);
        let contender = datastore
            .instance_updater_lock(
                &instance.id,
                Uuid::new_v4(),
                Duration::from_millis(50),
                Duration::from_secs(30),
            )
            .await;
        assert_matches!(contender, Err(Error::ServiceUnavailable { .. }));
        datastore.instance_updater_unlock(&instance.id, &lock);
    }

    #[tokio::test]
    async fn test_set_host_tracks_last_host() {
        let log = test_setup_log("test_set_host_tracks_last_host");
        let datastore = DataStore::new(&log);
        let instance = datastore.instance_create(new_instance()).unwrap();
        let host_a = Uuid::new_v4();
        let host_b = Uuid::new_v4();

        datastore.instance_set_host(&instance.id, Some(host_a)).unwrap();
        let moved =
            datastore.instance_set_host(&instance.id, Some(host_b)).unwrap();
        assert_eq!(moved.host_id, Some(host_b));
        assert_eq!(moved.last_host_id, Some(host_a));

        let cleared = datastore.instance_set_host(&instance.id, None).unwrap();
        assert_eq!(cleared.host_id, None);
        assert_eq!(cleared.last_host_id, Some(host_b));
    }

    #[tokio::test]
    async fn test_duplicate_names_rejected_per_account() {
        let log = test_setup_log("test_duplicate_names_rejected_per_account");
        let datastore = DataStore::new(&log);
        let account_id = Uuid::new_v4();
        let zone_id = Uuid::new_v4();
        let offering_id = Uuid::new_v4();
        let template_id = Uuid::new_v4();

        datastore
            .instance_create(Instance::new(
                "wren", account_id, zone_id, offering_id, template_id,
            ))
            .unwrap();
        assert_matches!(
            datastore.instance_create(Instance::new(
                "wren", account_id, zone_id, offering_id, template_id,
            )),
            Err(Error::ObjectAlreadyExists { .. })
        );

        // Same name under a different account is fine.
        datastore
            .instance_create(Instance::new(
                "wren",
                Uuid::new_v4(),
                zone_id,
                offering_id,
                template_id,
            ))
            .unwrap();
    }
}
