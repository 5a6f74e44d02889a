// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

// Copyright 2025 Oxide Computer Company

//! Counters kept by the flow manager.

use crate::api::FlowManagerStatsSnap;

#[derive(Debug, Default)]
pub struct FlowManagerStats {
    /// The number of classifications answered by an existing
    /// datapath flow.
    pub dp_hit: u64,

    /// The number of classifications which required a search of the
    /// wildcard flows.
    pub dp_miss: u64,

    /// The number of searches which found a wildcard flow.
    pub wc_match: u64,

    /// The number of searches which found no wildcard flow.
    pub wc_nomatch: u64,

    /// Datapath flows installed by classification.
    pub dp_flows_installed: u64,

    /// Datapath flows bound explicitly by the caller.
    pub dp_flows_bound: u64,

    pub dp_flows_evicted: u64,

    /// Datapath flows removed singly or by cascade from a wildcard
    /// flow removal.
    pub dp_flows_removed: u64,

    pub wc_registered: u64,

    /// Registrations refused because the match was already present.
    pub wc_rejected: u64,

    pub wc_unregistered: u64,
}

impl FlowManagerStats {
    pub fn new() -> Self {
        Self::default()
    }

    /// Return a snapshot of the stats.
    pub fn snapshot(&self) -> FlowManagerStatsSnap {
        FlowManagerStatsSnap {
            dp_hit: self.dp_hit,
            dp_miss: self.dp_miss,
            wc_match: self.wc_match,
            wc_nomatch: self.wc_nomatch,
            dp_flows_installed: self.dp_flows_installed,
            dp_flows_bound: self.dp_flows_bound,
            dp_flows_evicted: self.dp_flows_evicted,
            dp_flows_removed: self.dp_flows_removed,
            wc_registered: self.wc_registered,
            wc_rejected: self.wc_rejected,
            wc_unregistered: self.wc_unregistered,
        }
    }
}
