// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

// Copyright 2025 Oxide Computer Company

//! The flow engine.
//!
//! The [`manager::FlowManager`] composes three tables which are only
//! ever modified together:
//!
//! * [`wildcard::WildcardIndex`]: the registered wildcard flows,
//!   grouped by pattern.
//! * [`dp_table::DpFlowTable`]: the installed datapath flows in
//!   insertion order.
//! * [`xref::XrefIndex`]: which wildcard flow spawned which datapath
//!   flow, in both directions.
pub mod dp_table;
pub mod flow;
pub mod manager;
pub mod stat;
pub mod wildcard;
pub mod xref;

pub use flow::InstalledFlow;
pub use flow::WildcardFlow;
pub use manager::FlowManager;
