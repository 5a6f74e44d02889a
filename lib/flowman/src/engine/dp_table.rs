// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

// Copyright 2025 Oxide Computer Company

//! The datapath flow table.
//!
//! This maps each installed exact match to its actions. Entries are
//! kept in insertion order so that the oldest flows may be evicted
//! first. Looking a flow up never changes its place in that order.

use crate::api::ActionList;
use crate::api::ExactMatch;
use crate::api::FlowManError;
use alloc::collections::BTreeMap;
use alloc::string::String;
use alloc::vec::Vec;

type Result<T> = core::result::Result<T, FlowManError>;

/// A datapath flow, minus the match which is its key.
#[derive(Clone, Debug)]
pub struct DpFlowEntry {
    /// Insertion sequence number, the key into the age order.
    seq: u64,

    actions: ActionList,

    /// Number of times this flow has been matched.
    hits: u64,
}

impl DpFlowEntry {
    pub fn actions(&self) -> &ActionList {
        &self.actions
    }

    pub fn hit(&mut self) {
        self.hits += 1;
    }

    pub fn hits(&self) -> u64 {
        self.hits
    }
}

#[derive(Debug)]
pub struct DpFlowTable {
    name: String,
    map: BTreeMap<ExactMatch, DpFlowEntry>,

    /// The flows in insertion order.
    age: BTreeMap<u64, ExactMatch>,

    next_seq: u64,
}

impl DpFlowTable {
    /// Add a new entry to the flow table.
    ///
    /// Returns `false`, leaving the table untouched, if an entry
    /// already exists for `flow`.
    pub fn add(&mut self, flow: ExactMatch, actions: ActionList) -> bool {
        if self.map.contains_key(&flow) {
            return false;
        }

        let seq = self.next_seq;
        self.next_seq += 1;
        self.age.insert(seq, flow.clone());
        self.map.insert(flow, DpFlowEntry { seq, actions, hits: 0 });
        true
    }

    /// Clear all entries from the flow table.
    pub fn clear(&mut self) {
        self.map.clear();
        self.age.clear();
    }

    pub fn contains(&self, flow: &ExactMatch) -> bool {
        self.map.contains_key(flow)
    }

    /// Remove up to `n` flows, oldest first, returning the matches
    /// removed.
    ///
    /// # Errors
    ///
    /// An `n` of zero is rejected and nothing is removed.
    pub fn evict_oldest(&mut self, n: usize) -> Result<Vec<ExactMatch>> {
        if n == 0 {
            return Err(FlowManError::InvalidArgument(format!(
                "{}: number of flows to evict must be positive",
                self.name
            )));
        }

        let mut evicted = Vec::with_capacity(n.min(self.map.len()));
        while evicted.len() < n {
            let Some((_, flow)) = self.age.pop_first() else {
                break;
            };
            self.map.remove(&flow);
            evicted.push(flow);
        }

        Ok(evicted)
    }

    /// Get a reference to the entry for a given flow, if one exists.
    pub fn get(&self, flow: &ExactMatch) -> Option<&DpFlowEntry> {
        self.map.get(flow)
    }

    /// Get a mutable reference to the entry for a given flow, if one
    /// exists.
    pub fn get_mut(&mut self, flow: &ExactMatch) -> Option<&mut DpFlowEntry> {
        self.map.get_mut(flow)
    }

    /// Iterate the flows from oldest to newest.
    pub fn iter(&self) -> impl Iterator<Item = (&ExactMatch, &DpFlowEntry)> {
        self.age.values().filter_map(|flow| self.map.get_key_value(flow))
    }

    pub fn new(name: &str) -> Self {
        Self {
            name: String::from(name),
            map: BTreeMap::new(),
            age: BTreeMap::new(),
            next_seq: 0,
        }
    }

    /// Get the number of flows in this table.
    pub fn num_flows(&self) -> u32 {
        self.map.len() as u32
    }

    /// The oldest flow in the table.
    pub fn oldest(&self) -> Option<&ExactMatch> {
        self.age.first_key_value().map(|(_, flow)| flow)
    }

    pub fn remove(&mut self, flow: &ExactMatch) -> Option<DpFlowEntry> {
        let entry = self.map.remove(flow)?;
        self.age.remove(&entry.seq);
        Some(entry)
    }
}
