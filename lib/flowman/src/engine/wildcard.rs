// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

// Copyright 2025 Oxide Computer Company

//! The wildcard pattern index.
//!
//! Wildcard flows are grouped by their [`Pattern`]. Each group is a
//! table from wildcard match to flow, so classifying an exact match
//! costs one projection and one lookup per pattern rather than one
//! comparison per flow.

use super::flow::WildcardFlow;
use crate::api::ExactMatch;
use crate::api::FlowManError;
use crate::api::Pattern;
use crate::api::WildcardFlowId;
use crate::api::WildcardMatch;
use alloc::collections::BTreeMap;

type Result<T> = core::result::Result<T, FlowManError>;

/// The flows sharing one pattern.
pub type PatternTable = BTreeMap<WildcardMatch, WildcardFlowId>;

#[derive(Debug, Default)]
pub struct WildcardIndex {
    tables: BTreeMap<Pattern, PatternTable>,
    flows: BTreeMap<WildcardFlowId, WildcardFlow>,
    next_id: u64,
}

impl WildcardIndex {
    pub fn clear(&mut self) {
        self.tables.clear();
        self.flows.clear();
    }

    /// Find the id of the flow registered under exactly `wmatch`.
    pub fn find(&self, wmatch: &WildcardMatch) -> Option<WildcardFlowId> {
        self.tables.get(&wmatch.pattern())?.get(wmatch).copied()
    }

    /// Find the wildcard flow which applies to `flow`.
    ///
    /// The exact match is projected onto every pattern. A pattern
    /// requiring an attribute the match lacks is skipped. Of the flows
    /// found, the one with the lowest priority value wins; equal
    /// priorities go to the earliest registration.
    pub fn find_match(&self, flow: &ExactMatch) -> Option<WildcardFlowId> {
        let mut best: Option<(u16, WildcardFlowId)> = None;

        for (pattern, table) in &self.tables {
            let Some(projected) = flow.project(pattern) else {
                continue;
            };

            let Some(&id) = table.get(&projected) else {
                continue;
            };

            let Some(wflow) = self.flows.get(&id) else {
                continue;
            };

            let candidate = (wflow.priority(), id);
            best = match best {
                Some(curr) if curr <= candidate => Some(curr),
                _ => Some(candidate),
            };
        }

        best.map(|(_, id)| id)
    }

    pub fn get(&self, id: WildcardFlowId) -> Option<&WildcardFlow> {
        self.flows.get(&id)
    }

    /// Iterate the flows registered under each pattern.
    pub fn iter_patterns(
        &self,
    ) -> impl Iterator<Item = (&Pattern, &PatternTable)> {
        self.tables.iter()
    }

    pub fn new() -> Self {
        Self::default()
    }

    pub fn num_flows(&self) -> usize {
        self.flows.len()
    }

    pub fn num_patterns(&self) -> usize {
        self.tables.len()
    }

    /// Register a wildcard flow.
    ///
    /// Returns `None`, leaving the index untouched, if a flow with the
    /// same match is already registered. A flow with an equal match
    /// value but a different pattern cannot exist: the pattern is
    /// derived from the match.
    pub fn register(&mut self, flow: WildcardFlow) -> Option<WildcardFlowId> {
        let table = self.tables.entry(flow.pattern()).or_default();
        if table.contains_key(flow.wmatch()) {
            return None;
        }

        let id = WildcardFlowId(self.next_id);
        self.next_id += 1;
        table.insert(flow.wmatch().clone(), id);
        self.flows.insert(id, flow);
        Some(id)
    }

    /// Remove the flow `id` from its pattern table, dropping the
    /// table once it is empty.
    pub fn unregister(&mut self, id: WildcardFlowId) -> Result<WildcardFlow> {
        let flow = self
            .flows
            .remove(&id)
            .ok_or(FlowManError::WildcardFlowNotFound(id))?;

        let pattern = flow.pattern();
        if let Some(table) = self.tables.get_mut(&pattern) {
            table.remove(flow.wmatch());
            if table.is_empty() {
                self.tables.remove(&pattern);
            }
        }

        Ok(flow)
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::api::FlowAction;
    use crate::api::FlowKey;

    fn wc(s: &str, priority: u16) -> WildcardFlow {
        WildcardFlow::new(s.parse().unwrap(), priority, vec![FlowAction::Flood])
    }

    fn em(s: &str) -> ExactMatch {
        s.parse().unwrap()
    }

    #[test]
    fn register_rejects_duplicate_match() {
        let mut idx = WildcardIndex::new();
        let id = idx.register(wc("l4_dst=80", 10)).unwrap();
        assert!(idx.register(wc("l4_dst=80", 1)).is_none());
        assert_eq!(idx.num_flows(), 1);
        assert_eq!(idx.get(id).unwrap().priority(), 10);
        assert_eq!(idx.find(&"l4_dst=80".parse().unwrap()), Some(id));
    }

    #[test]
    fn ids_are_not_reused() {
        let mut idx = WildcardIndex::new();
        let a = idx.register(wc("l4_dst=80", 10)).unwrap();
        idx.unregister(a).unwrap();
        let b = idx.register(wc("l4_dst=80", 10)).unwrap();
        assert_ne!(a, b);
    }

    #[test]
    fn unregister_drops_empty_pattern() {
        let mut idx = WildcardIndex::new();
        let a = idx.register(wc("l4_dst=80", 10)).unwrap();
        let b = idx.register(wc("l4_dst=443", 10)).unwrap();
        idx.register(wc("ip4_dst=10.0.0.1", 10)).unwrap();
        assert_eq!(idx.num_patterns(), 2);

        idx.unregister(a).unwrap();
        assert_eq!(idx.num_patterns(), 2);
        idx.unregister(b).unwrap();
        assert_eq!(idx.num_patterns(), 1);

        assert_eq!(
            idx.unregister(b),
            Err(FlowManError::WildcardFlowNotFound(b))
        );
        assert_eq!(idx.num_flows(), 1);
    }

    #[test]
    fn find_match_requires_every_pattern_key() {
        let mut idx = WildcardIndex::new();
        let web = idx.register(wc("ip4_dst=10.0.0.1,l4_dst=80", 10)).unwrap();

        let flow = em("ip4_dst=10.0.0.1,l4_dst=80,l4_src=999");
        assert_eq!(idx.find_match(&flow), Some(web));
        assert_eq!(idx.find_match(&em("ip4_dst=10.0.0.1")), None);
        assert_eq!(idx.find_match(&em("ip4_dst=10.0.0.1,l4_dst=81")), None);
    }

    #[test]
    fn find_match_lowest_priority_wins() {
        // Registration order must not matter.
        for flip in [false, true] {
            let mut idx = WildcardIndex::new();
            let (lo, hi) = if flip {
                let hi = idx.register(wc("ip4_dst=10.0.0.1", 10)).unwrap();
                let lo = idx.register(wc("l4_dst=80", 5)).unwrap();
                (lo, hi)
            } else {
                let lo = idx.register(wc("l4_dst=80", 5)).unwrap();
                let hi = idx.register(wc("ip4_dst=10.0.0.1", 10)).unwrap();
                (lo, hi)
            };

            let flow = em("ip4_dst=10.0.0.1,l4_dst=80");
            assert_eq!(idx.find_match(&flow), Some(lo));
            idx.unregister(lo).unwrap();
            assert_eq!(idx.find_match(&flow), Some(hi));
        }
    }

    #[test]
    fn find_match_tie_goes_to_first_registered() {
        let mut idx = WildcardIndex::new();
        let first = idx.register(wc("l4_dst=80", 7)).unwrap();
        let second = idx.register(wc("in_port=1", 7)).unwrap();
        assert!(first < second);
        assert_eq!(idx.find_match(&em("in_port=1,l4_dst=80")), Some(first));
    }

    #[test]
    fn catch_all_flow() {
        let mut idx = WildcardIndex::new();
        let any = idx.register(wc("*", u16::MAX)).unwrap();
        let flow = ExactMatch::new().with_key(FlowKey::InPort(4));
        assert_eq!(idx.find_match(&flow), Some(any));
        assert_eq!(idx.find_match(&ExactMatch::new()), Some(any));
    }
}
