// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Account resource accounting: persisted counts, configured limits, and
//! the in-flight reservations that keep concurrent requests from racing
//! past a quota.
//!
//! The invariant maintained here is that for every counter,
//! `persisted + in_flight <= limit` at all times.  A [`Reservation`] is an
//! in-flight hold: it is taken before any side effect of the guarded
//! operation, released automatically on every exit path, and converted into
//! a persisted count only by an explicit [`Reservation::commit`].

use crate::DataStore;
use corral_common::api::external::CreateResult;
use corral_common::api::external::Error;
use corral_common::api::external::ResourceKind;
use std::collections::BTreeMap;
use std::sync::Arc;
use std::sync::Mutex;
use uuid::Uuid;

/// Key for one usage counter: account, resource kind, optional tag.
type CounterKey = (Uuid, ResourceKind, Option<String>);

#[derive(Default, Debug)]
struct Counter {
    limit: Option<i64>,
    persisted: i64,
    in_flight: i64,
}

#[derive(Default, Debug)]
pub(crate) struct ProvisioningState {
    counters: Mutex<BTreeMap<CounterKey, Counter>>,
}

impl ProvisioningState {
    fn release(&self, key: &CounterKey, delta: i64) {
        let mut counters =
            self.counters.lock().expect("provisioning counters poisoned");
        if let Some(counter) = counters.get_mut(key) {
            counter.in_flight -= delta;
        }
    }

    fn commit(&self, key: &CounterKey, delta: i64) {
        let mut counters =
            self.counters.lock().expect("provisioning counters poisoned");
        if let Some(counter) = counters.get_mut(key) {
            counter.in_flight -= delta;
            counter.persisted += delta;
        }
    }
}

/// A requested change to one resource counter
#[derive(Clone, Debug)]
pub struct ResourceDelta {
    pub kind: ResourceKind,
    pub tag: Option<String>,
    pub delta: i64,
}

impl ResourceDelta {
    pub fn untagged(kind: ResourceKind, delta: i64) -> ResourceDelta {
        ResourceDelta { kind, tag: None, delta }
    }
}

/// An in-flight hold on one resource counter
///
/// Dropping the handle releases the hold; committing it converts the hold
/// into a persisted count.  Exactly one of the two happens.
#[derive(Debug)]
pub struct Reservation {
    state: Arc<ProvisioningState>,
    key: CounterKey,
    delta: i64,
    committed: bool,
}

impl Reservation {
    /// Convert this hold into a permanent count.
    pub fn commit(mut self) {
        self.state.commit(&self.key, self.delta);
        self.committed = true;
    }
}

impl Drop for Reservation {
    fn drop(&mut self) {
        if !self.committed {
            self.state.release(&self.key, self.delta);
        }
    }
}

/// A bundle of reservations acquired for a single operation
///
/// Always acquired in ascending [`ResourceKind`] order so that concurrent
/// operations touching overlapping counter sets cannot deadlock on ordering.
#[derive(Debug, Default)]
pub struct ReservationSet {
    reservations: Vec<Reservation>,
}

impl ReservationSet {
    pub fn commit(self) {
        for reservation in self.reservations {
            reservation.commit();
        }
    }

    pub fn is_empty(&self) -> bool {
        self.reservations.is_empty()
    }
}

impl DataStore {
    /// Configure the limit for one (account, kind, tag) counter.
    pub fn resource_limit_set(
        &self,
        account_id: Uuid,
        kind: ResourceKind,
        tag: Option<&str>,
        max: i64,
    ) {
        let mut counters = self
            .provisioning
            .counters
            .lock()
            .expect("provisioning counters poisoned");
        counters
            .entry((account_id, kind, tag.map(str::to_owned)))
            .or_default()
            .limit = Some(max);
    }

    /// Returns `(persisted, in_flight)` for one counter.
    pub fn resource_counts(
        &self,
        account_id: Uuid,
        kind: ResourceKind,
        tag: Option<&str>,
    ) -> (i64, i64) {
        let counters = self
            .provisioning
            .counters
            .lock()
            .expect("provisioning counters poisoned");
        match counters.get(&(account_id, kind, tag.map(str::to_owned))) {
            Some(counter) => (counter.persisted, counter.in_flight),
            None => (0, 0),
        }
    }

    /// Take an in-flight hold of `delta` units against one counter.
    ///
    /// Fails with [`Error::ResourceExhausted`] when projected usage
    /// (persisted + in-flight + requested) would exceed the configured
    /// limit.  A counter with no configured limit is unlimited.
    pub fn resource_reservation_acquire(
        &self,
        account_id: Uuid,
        kind: ResourceKind,
        tag: Option<&str>,
        delta: i64,
    ) -> CreateResult<Reservation> {
        assert!(delta > 0, "reservations hold positive deltas");
        let key = (account_id, kind, tag.map(str::to_owned));
        let mut counters = self
            .provisioning
            .counters
            .lock()
            .expect("provisioning counters poisoned");
        let counter = counters.entry(key.clone()).or_default();
        if let Some(limit) = counter.limit {
            let projected = counter.persisted + counter.in_flight + delta;
            if projected > limit {
                return Err(Error::resource_exhausted(&format!(
                    "account {} would exceed its {} limit \
                     (used {}, reserved {}, requested {}, limit {})",
                    account_id,
                    kind,
                    counter.persisted,
                    counter.in_flight,
                    delta,
                    limit,
                )));
            }
        }
        counter.in_flight += delta;
        Ok(Reservation {
            state: Arc::clone(&self.provisioning),
            key,
            delta,
            committed: false,
        })
    }

    /// Take holds for a whole operation.
    ///
    /// The deltas are sorted into the fixed [`ResourceKind`] order before
    /// acquisition.  On any failure the holds already taken are released
    /// (by drop) and the error is returned with nothing retained.
    pub fn resource_reservations_acquire(
        &self,
        account_id: Uuid,
        mut deltas: Vec<ResourceDelta>,
    ) -> CreateResult<ReservationSet> {
        deltas.sort_by(|a, b| {
            a.kind.cmp(&b.kind).then_with(|| a.tag.cmp(&b.tag))
        });
        let mut set = ReservationSet::default();
        for d in deltas {
            if d.delta == 0 {
                continue;
            }
            let reservation = self.resource_reservation_acquire(
                account_id,
                d.kind,
                d.tag.as_deref(),
                d.delta,
            )?;
            set.reservations.push(reservation);
        }
        Ok(set)
    }

    /// Remove `delta` units from a persisted count (instance destroyed,
    /// volume reclaimed, and so on).
    pub fn resource_count_decrement(
        &self,
        account_id: Uuid,
        kind: ResourceKind,
        tag: Option<&str>,
        delta: i64,
    ) {
        let mut counters = self
            .provisioning
            .counters
            .lock()
            .expect("provisioning counters poisoned");
        if let Some(counter) =
            counters.get_mut(&(account_id, kind, tag.map(str::to_owned)))
        {
            counter.persisted -= delta;
            if counter.persisted < 0 {
                // An over-decrement means our accounting is wrong somewhere;
                // clamp and complain rather than going negative forever.
                slog::error!(self.log,
                    "resource counter went negative";
                    "account_id" => %account_id,
                    "kind" => %kind,
                    "persisted" => counter.persisted,
                );
                counter.persisted = 0;
            }
        }
    }
}

#[cfg(test)]
mod test {
    use super::ResourceDelta;
    use crate::DataStore;
    use assert_matches::assert_matches;
    use corral_common::api::external::Error;
    use corral_common::api::external::ResourceKind;
    use corral_test_utils::test_setup_log;
    use std::sync::Arc;
    use uuid::Uuid;

    #[tokio::test]
    async fn test_reservation_released_on_drop() {
        let log = test_setup_log("test_reservation_released_on_drop");
        let datastore = DataStore::new(&log);
        let account_id = Uuid::new_v4();
        datastore.resource_limit_set(account_id, ResourceKind::Cpu, None, 4);

        let reservation = datastore
            .resource_reservation_acquire(account_id, ResourceKind::Cpu, None, 3)
            .unwrap();
        assert_eq!(
            datastore.resource_counts(account_id, ResourceKind::Cpu, None),
            (0, 3)
        );

        // A second request that does not fit must fail while the first hold
        // is outstanding...
        assert_matches!(
            datastore.resource_reservation_acquire(
                account_id,
                ResourceKind::Cpu,
                None,
                2
            ),
            Err(Error::ResourceExhausted { .. })
        );

        // ...and succeed once it is dropped uncommitted.
        drop(reservation);
        assert_eq!(
            datastore.resource_counts(account_id, ResourceKind::Cpu, None),
            (0, 0)
        );
        let reservation = datastore
            .resource_reservation_acquire(account_id, ResourceKind::Cpu, None, 2)
            .unwrap();
        reservation.commit();
        assert_eq!(
            datastore.resource_counts(account_id, ResourceKind::Cpu, None),
            (2, 0)
        );
    }

    #[tokio::test]
    async fn test_reservation_set_releases_partial_acquisition() {
        let log =
            test_setup_log("test_reservation_set_releases_partial_acquisition");
        let datastore = DataStore::new(&log);
        let account_id = Uuid::new_v4();
        datastore.resource_limit_set(account_id, ResourceKind::Cpu, None, 8);
        datastore.resource_limit_set(account_id, ResourceKind::Memory, None, 1);

        // Cpu fits, memory does not; the cpu hold must not leak.
        let result = datastore.resource_reservations_acquire(
            account_id,
            vec![
                ResourceDelta::untagged(ResourceKind::Memory, 2),
                ResourceDelta::untagged(ResourceKind::Cpu, 4),
            ],
        );
        assert_matches!(result, Err(Error::ResourceExhausted { .. }));
        assert_eq!(
            datastore.resource_counts(account_id, ResourceKind::Cpu, None),
            (0, 0)
        );
        assert_eq!(
            datastore.resource_counts(account_id, ResourceKind::Memory, None),
            (0, 0)
        );
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn test_concurrent_reservations_admit_exactly_what_fits() {
        let log = test_setup_log(
            "test_concurrent_reservations_admit_exactly_what_fits",
        );
        let datastore = DataStore::new(&log);
        let account_id = Uuid::new_v4();
        datastore
            .resource_limit_set(account_id, ResourceKind::Instance, None, 3);

        let mut handles = Vec::new();
        for _ in 0..10 {
            let datastore = Arc::clone(&datastore);
            handles.push(tokio::spawn(async move {
                match datastore.resource_reservation_acquire(
                    account_id,
                    ResourceKind::Instance,
                    None,
                    1,
                ) {
                    Ok(reservation) => {
                        reservation.commit();
                        true
                    }
                    Err(_) => false,
                }
            }));
        }

        let mut admitted = 0;
        for handle in handles {
            if handle.await.unwrap() {
                admitted += 1;
            }
        }
        assert_eq!(admitted, 3);
        assert_eq!(
            datastore.resource_counts(account_id, ResourceKind::Instance, None),
            (3, 0)
        );
    }

    #[tokio::test]
    async fn test_tagged_counters_are_independent() {
        let log = test_setup_log("test_tagged_counters_are_independent");
        let datastore = DataStore::new(&log);
        let account_id = Uuid::new_v4();
        datastore.resource_limit_set(
            account_id,
            ResourceKind::Instance,
            Some("gpu"),
            1,
        );

        // The untagged counter has no limit configured.
        datastore
            .resource_reservation_acquire(
                account_id,
                ResourceKind::Instance,
                None,
                5,
            )
            .unwrap()
            .commit();

        datastore
            .resource_reservation_acquire(
                account_id,
                ResourceKind::Instance,
                Some("gpu"),
                1,
            )
            .unwrap()
            .commit();
        assert_matches!(
            datastore.resource_reservation_acquire(
                account_id,
                ResourceKind::Instance,
                Some("gpu"),
                1,
            ),
            Err(Error::ResourceExhausted { .. })
        );
    }
}
