// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

// Copyright 2025 Oxide Computer Company

//! The link between wildcard flows and the datapath flows they
//! spawned.
//!
//! Both directions are kept here and only ever updated together: a
//! datapath flow maps to exactly one wildcard flow, and that wildcard
//! flow's spawned set contains it.

use crate::api::ExactMatch;
use crate::api::WildcardFlowId;
use alloc::collections::BTreeMap;
use alloc::collections::BTreeSet;

#[derive(Debug, Default)]
pub struct XrefIndex {
    owners: BTreeMap<ExactMatch, WildcardFlowId>,
    spawned: BTreeMap<WildcardFlowId, BTreeSet<ExactMatch>>,
}

impl XrefIndex {
    pub fn clear(&mut self) {
        self.owners.clear();
        self.spawned.clear();
    }

    pub fn is_tracked(&self, id: WildcardFlowId) -> bool {
        self.spawned.contains_key(&id)
    }

    /// Link `flow` to the wildcard flow `id`.
    ///
    /// Returns `false`, leaving the index untouched, if `id` is not
    /// tracked. A flow that was linked to another wildcard flow is
    /// moved to `id`.
    pub fn link(&mut self, flow: ExactMatch, id: WildcardFlowId) -> bool {
        if !self.spawned.contains_key(&id) {
            return false;
        }

        if let Some(prev) = self.owners.insert(flow.clone(), id) {
            if let Some(set) = self.spawned.get_mut(&prev) {
                set.remove(&flow);
            }
        }

        if let Some(set) = self.spawned.get_mut(&id) {
            set.insert(flow);
        }

        true
    }

    /// Iterate each tracked wildcard flow and its spawned set.
    pub fn iter(
        &self,
    ) -> impl Iterator<Item = (WildcardFlowId, &BTreeSet<ExactMatch>)> {
        self.spawned.iter().map(|(id, flows)| (*id, flows))
    }

    pub fn new() -> Self {
        Self::default()
    }

    pub fn num_links(&self) -> usize {
        self.owners.len()
    }

    pub fn num_tracked(&self) -> usize {
        self.spawned.len()
    }

    pub fn owner_of(&self, flow: &ExactMatch) -> Option<WildcardFlowId> {
        self.owners.get(flow).copied()
    }

    /// The datapath flows spawned by `id`.
    pub fn spawned(&self, id: WildcardFlowId) -> Option<&BTreeSet<ExactMatch>> {
        self.spawned.get(&id)
    }

    /// Start tracking a newly registered wildcard flow with an empty
    /// spawned set.
    pub fn track(&mut self, id: WildcardFlowId) {
        self.spawned.entry(id).or_default();
    }

    /// Remove the link for a single datapath flow, returning the
    /// wildcard flow it belonged to.
    pub fn unlink(&mut self, flow: &ExactMatch) -> Option<WildcardFlowId> {
        let id = self.owners.remove(flow)?;
        if let Some(set) = self.spawned.get_mut(&id) {
            set.remove(flow);
        }
        Some(id)
    }

    /// Stop tracking `id`, returning every datapath flow it spawned.
    pub fn unlink_all(
        &mut self,
        id: WildcardFlowId,
    ) -> Option<BTreeSet<ExactMatch>> {
        let flows = self.spawned.remove(&id)?;
        for flow in &flows {
            self.owners.remove(flow);
        }
        Some(flows)
    }
}
