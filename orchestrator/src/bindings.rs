// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Port to the external systems that hold network bindings for an instance.
//!
//! Rule storage and element programming belong to their own services; the
//! orchestrator only needs to ask for everything referencing an instance to
//! be released before it finishes expunging it.

use async_trait::async_trait;
use corral_common::api::external::Error;
use std::collections::BTreeSet;
use std::sync::Mutex;
use uuid::Uuid;

#[derive(Copy, Clone, Debug, Eq, Ord, PartialEq, PartialOrd)]
pub enum BindingClass {
    Firewall,
    LoadBalancer,
    StaticNat,
    SecurityGroup,
}

impl BindingClass {
    pub fn label(&self) -> &'static str {
        match self {
            BindingClass::Firewall => "firewall",
            BindingClass::LoadBalancer => "load-balancer",
            BindingClass::StaticNat => "static-nat",
            BindingClass::SecurityGroup => "security-group",
        }
    }

    pub const ALL: [BindingClass; 4] = [
        BindingClass::Firewall,
        BindingClass::LoadBalancer,
        BindingClass::StaticNat,
        BindingClass::SecurityGroup,
    ];
}

impl std::fmt::Display for BindingClass {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.label())
    }
}

#[async_trait]
pub trait ExternalBindings: Send + Sync {
    /// Release every binding of `class` that references the instance.
    async fn release(
        &self,
        class: BindingClass,
        instance_id: Uuid,
    ) -> Result<(), Error>;
}

/// In-process bindings used by tests and the dev binary
///
/// Records what was released and can be told to fail specific classes.
#[derive(Default)]
pub struct SimBindings {
    inner: Mutex<SimBindingsState>,
}

#[derive(Default)]
struct SimBindingsState {
    failing: BTreeSet<BindingClass>,
    released: Vec<(BindingClass, Uuid)>,
}

impl SimBindings {
    pub fn new() -> SimBindings {
        SimBindings::default()
    }

    pub fn fail_class(&self, class: BindingClass) {
        self.inner.lock().unwrap().failing.insert(class);
    }

    pub fn released(&self) -> Vec<(BindingClass, Uuid)> {
        self.inner.lock().unwrap().released.clone()
    }
}

#[async_trait]
impl ExternalBindings for SimBindings {
    async fn release(
        &self,
        class: BindingClass,
        instance_id: Uuid,
    ) -> Result<(), Error> {
        let mut state = self.inner.lock().unwrap();
        if state.failing.contains(&class) {
            return Err(Error::unavail(&format!(
                "{} rule store unavailable",
                class
            )));
        }
        state.released.push((class, instance_id));
        Ok(())
    }
}
