// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Types and facilities shared by every Corral component.
//!
//! Anything in this crate is part of the contract between components and
//! changes here ripple through the whole control plane.  Keep it small.

pub mod api;
