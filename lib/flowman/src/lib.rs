// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

// Copyright 2025 Oxide Computer Company

//! flowman: the flow-table cache of a virtual switch control plane.
//!
//! The topology layer registers wildcard flows describing policy.
//! When a packet misses the datapath, the pipeline hands its exact
//! match to the [`engine::manager::FlowManager`], which picks the
//! wildcard flow that applies and installs an exact-match datapath
//! flow derived from it.

#![cfg_attr(not(feature = "std"), no_std)]
#![allow(clippy::len_without_is_empty)]
#![deny(unreachable_patterns)]
#![deny(unused_must_use)]

#[macro_use]
extern crate alloc;

use alloc::boxed::Box;

pub mod api;
pub mod engine;
#[cfg(any(feature = "std", test))]
pub mod print;
pub mod provider;
#[cfg(any(feature = "std", test))]
pub mod sync;

pub use provider::LogLevel;
pub use provider::LogProvider;

/// The `ExecCtx` provides implementations of specific features that
/// vary with the context the engine runs in.
pub struct ExecCtx {
    pub log: Box<dyn LogProvider>,
}

impl ExecCtx {
    pub fn new(log: Box<dyn LogProvider>) -> Self {
        Self { log }
    }
}

#[cfg(any(feature = "std", test))]
impl Default for ExecCtx {
    fn default() -> Self {
        Self { log: Box::new(provider::PrintlnLog) }
    }
}
