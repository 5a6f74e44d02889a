// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

// Copyright 2025 Oxide Computer Company

//! The flow manager.
//!
//! The manager answers "which actions apply to this exact match",
//! installing a datapath flow from the best wildcard flow on a miss.
//!
//! The manager holds no lock. Callers must serialize every mutating
//! call (`&mut self`) against all other calls, for example by running
//! it on a single event loop or by wrapping it in
//! [`crate::sync::SharedFlowManager`]. The three tables are one unit
//! of consistency: locking them separately would expose half-finished
//! cascades.

use super::dp_table::DpFlowTable;
use super::flow::InstalledFlow;
use super::flow::WildcardFlow;
use super::stat::FlowManagerStats;
use super::wildcard::WildcardIndex;
use super::xref::XrefIndex;
use crate::ExecCtx;
use crate::LogLevel;
use crate::api::ActionList;
use crate::api::DpFlowDump;
use crate::api::DumpDpFlowsResp;
use crate::api::DumpWildcardFlowsResp;
use crate::api::ExactMatch;
use crate::api::FlowManError;
use crate::api::FlowManagerCfg;
use crate::api::FlowManagerStatsSnap;
use crate::api::PatternDump;
use crate::api::WildcardFlowDump;
use crate::api::WildcardFlowId;
use crate::api::WildcardMatch;
use alloc::collections::BTreeSet;
use alloc::string::String;
use alloc::sync::Arc;
use alloc::vec::Vec;
use core::num::NonZeroU32;

type Result<T> = core::result::Result<T, FlowManError>;

pub struct FlowManager {
    name: String,
    dp_flow_limit: Option<NonZeroU32>,
    wildcards: WildcardIndex,
    dp_flows: DpFlowTable,
    xref: XrefIndex,
    stats: FlowManagerStats,
    ectx: Arc<ExecCtx>,
}

impl FlowManager {
    /// Return the actions of the datapath flow for `flow`, if one is
    /// installed.
    ///
    /// This is a pure lookup: it never installs a flow and does not
    /// count a hit.
    pub fn actions_for(&self, flow: &ExactMatch) -> Option<ActionList> {
        self.dp_flows.get(flow).map(|entry| entry.actions().clone())
    }

    /// Bind `flow` to the wildcard flow `id`, installing a datapath
    /// flow carrying its actions.
    ///
    /// This is for callers which have already classified the traffic
    /// themselves. Returns `Ok(false)`, changing nothing, if a datapath
    /// flow for `flow` already exists.
    ///
    /// # Errors
    ///
    /// If `id` is not registered an error is returned and no
    /// modification is made.
    pub fn bind_dp_flow(
        &mut self,
        flow: ExactMatch,
        id: WildcardFlowId,
    ) -> Result<bool> {
        let Some(wflow) = self.wildcards.get(id) else {
            self.ectx.log.log(
                LogLevel::Warn,
                &format!(
                    "{}: cannot bind {flow}: wildcard flow {id} not found",
                    self.name
                ),
            );
            return Err(FlowManError::WildcardFlowNotFound(id));
        };

        if self.dp_flows.contains(&flow) {
            return Ok(false);
        }

        let actions = wflow.actions().clone();
        self.install(flow, actions, id);
        self.stats.dp_flows_bound += 1;
        Ok(true)
    }

    /// Verify that the three tables agree with each other.
    ///
    /// Every datapath flow must be owned by exactly one registered
    /// wildcard flow whose spawned set contains it, and every spawned
    /// set must only name installed datapath flows.
    #[cfg(any(feature = "test-help", test))]
    pub fn check_consistency(&self) -> core::result::Result<(), String> {
        if self.dp_flows.num_flows() as usize != self.xref.num_links() {
            return Err(format!(
                "{} datapath flows but {} links",
                self.dp_flows.num_flows(),
                self.xref.num_links()
            ));
        }

        if self.xref.num_tracked() != self.wildcards.num_flows() {
            return Err(format!(
                "{} wildcard flows but {} tracked",
                self.wildcards.num_flows(),
                self.xref.num_tracked()
            ));
        }

        for (flow, _) in self.dp_flows.iter() {
            let id = self
                .xref
                .owner_of(flow)
                .ok_or_else(|| format!("{flow} has no owner"))?;

            if self.wildcards.get(id).is_none() {
                return Err(format!("{flow} owned by unknown flow {id}"));
            }

            let spawned = self
                .xref
                .spawned(id)
                .ok_or_else(|| format!("wildcard flow {id} not tracked"))?;

            if !spawned.contains(flow) {
                return Err(format!("{flow} missing from spawned set of {id}"));
            }
        }

        for (id, spawned) in self.xref.iter() {
            for flow in spawned {
                if !self.dp_flows.contains(flow) {
                    return Err(format!("{id} spawned {flow} not installed"));
                }

                if self.xref.owner_of(flow) != Some(id) {
                    return Err(format!("{id} spawned {flow} owned elsewhere"));
                }
            }
        }

        Ok(())
    }

    /// Return the datapath flow for `flow`, installing one from the
    /// best matching wildcard flow if none exists.
    ///
    /// Returns `None` if no wildcard flow covers `flow`. That is a
    /// normal outcome: it is up to the caller to decide what to do
    /// with traffic no policy speaks for.
    pub fn classify_and_install(
        &mut self,
        flow: &ExactMatch,
    ) -> Option<InstalledFlow> {
        if let Some(entry) = self.dp_flows.get_mut(flow) {
            entry.hit();
            self.stats.dp_hit += 1;
            return Some(InstalledFlow {
                flow: flow.clone(),
                actions: entry.actions().clone(),
            });
        }

        self.stats.dp_miss += 1;
        let Some(id) = self.wildcards.find_match(flow) else {
            self.stats.wc_nomatch += 1;
            return None;
        };

        self.stats.wc_match += 1;
        let actions = self.wildcards.get(id)?.actions().clone();
        self.stats.dp_flows_installed += 1;
        Some(self.install(flow.clone(), actions, id))
    }

    /// Remove every wildcard and datapath flow.
    pub fn clear(&mut self) {
        self.ectx.log.log(
            LogLevel::Note,
            &format!(
                "{}: clearing {} wildcard flows and {} datapath flows",
                self.name,
                self.wildcards.num_flows(),
                self.dp_flows.num_flows()
            ),
        );
        self.wildcards.clear();
        self.dp_flows.clear();
        self.xref.clear();
    }

    pub fn dump_dp_flows(&self) -> DumpDpFlowsResp {
        let flows = self
            .dp_flows
            .iter()
            .map(|(flow, entry)| DpFlowDump {
                flow: flow.clone(),
                actions: entry.actions().to_vec(),
                owner: self.xref.owner_of(flow),
                hits: entry.hits(),
            })
            .collect();

        DumpDpFlowsResp {
            name: self.name.clone(),
            num_flows: self.dp_flows.num_flows(),
            limit: self.dp_flow_limit.map(NonZeroU32::get),
            flows,
        }
    }

    pub fn dump_wildcard_flows(&self) -> DumpWildcardFlowsResp {
        let mut patterns = Vec::with_capacity(self.wildcards.num_patterns());

        for (pattern, table) in self.wildcards.iter_patterns() {
            let flows = table
                .values()
                .filter_map(|id| {
                    let wflow = self.wildcards.get(*id)?;
                    let dp_flows = self
                        .xref
                        .spawned(*id)
                        .map(|s| s.len() as u32)
                        .unwrap_or(0);

                    Some(WildcardFlowDump {
                        id: *id,
                        priority: wflow.priority(),
                        wmatch: wflow.wmatch().clone(),
                        actions: wflow.actions().to_vec(),
                        dp_flows,
                    })
                })
                .collect();

            patterns.push(PatternDump { pattern: pattern.clone(), flows });
        }

        DumpWildcardFlowsResp {
            name: self.name.clone(),
            num_flows: self.wildcards.num_flows() as u32,
            patterns,
        }
    }

    /// Remove up to `n` of the oldest datapath flows, returning their
    /// matches.
    ///
    /// Age is insertion order; lookups and hits do not refresh a
    /// flow. The wildcard flows which spawned the evicted flows stay
    /// registered.
    ///
    /// # Errors
    ///
    /// An `n` of zero is rejected and nothing is evicted.
    pub fn evict_oldest_flows(&mut self, n: usize) -> Result<Vec<ExactMatch>> {
        let evicted = match self.dp_flows.evict_oldest(n) {
            Ok(evicted) => evicted,
            Err(e) => {
                self.ectx.log.log(
                    LogLevel::Warn,
                    &format!("{}: eviction rejected: {e}", self.name),
                );
                return Err(e);
            }
        };

        for flow in &evicted {
            self.xref.unlink(flow);
        }

        if !evicted.is_empty() {
            self.stats.dp_flows_evicted += evicted.len() as u64;
            self.ectx.log.log(
                LogLevel::Note,
                &format!(
                    "{}: evicted {} datapath flows, {} remain",
                    self.name,
                    evicted.len(),
                    self.dp_flows.num_flows()
                ),
            );
        }

        Ok(evicted)
    }

    /// Evict the oldest datapath flows above the configured limit.
    ///
    /// The manager never calls this itself; enforcing the limit is a
    /// policy decision left to the caller.
    pub fn evict_excess(&mut self) -> Vec<ExactMatch> {
        match self.excess_flows() {
            0 => Vec::new(),
            n => self.evict_oldest_flows(n).unwrap_or_default(),
        }
    }

    /// The number of datapath flows above the configured limit, or
    /// zero if there is no limit.
    pub fn excess_flows(&self) -> usize {
        match self.dp_flow_limit {
            Some(limit) => {
                self.dp_flows.num_flows().saturating_sub(limit.get()) as usize
            }

            None => 0,
        }
    }

    /// Find the id of the wildcard flow registered under exactly
    /// `wmatch`.
    pub fn find_wildcard_flow(
        &self,
        wmatch: &WildcardMatch,
    ) -> Option<WildcardFlowId> {
        self.wildcards.find(wmatch)
    }

    fn install(
        &mut self,
        flow: ExactMatch,
        actions: ActionList,
        id: WildcardFlowId,
    ) -> InstalledFlow {
        let added = self.dp_flows.add(flow.clone(), actions.clone());
        debug_assert!(added);
        let linked = self.xref.link(flow.clone(), id);
        debug_assert!(linked);
        InstalledFlow { flow, actions }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn new(cfg: FlowManagerCfg, ectx: Arc<ExecCtx>) -> Self {
        Self {
            dp_flows: DpFlowTable::new(&cfg.name),
            name: cfg.name,
            dp_flow_limit: cfg.dp_flow_limit,
            wildcards: WildcardIndex::new(),
            xref: XrefIndex::new(),
            stats: FlowManagerStats::new(),
            ectx,
        }
    }

    /// Get the number of installed datapath flows.
    pub fn num_dp_flows(&self) -> u32 {
        self.dp_flows.num_flows()
    }

    /// Get the number of registered wildcard flows.
    pub fn num_wildcard_flows(&self) -> u32 {
        self.wildcards.num_flows() as u32
    }

    /// The wildcard flow which spawned the datapath flow `flow`.
    pub fn owner_of(&self, flow: &ExactMatch) -> Option<WildcardFlowId> {
        self.xref.owner_of(flow)
    }

    /// Register a wildcard flow, returning its id.
    ///
    /// Returns `None`, changing nothing, if a wildcard flow with the
    /// same match is already registered. Callers may probe with this
    /// freely; it is not an error.
    pub fn register_wildcard_flow(
        &mut self,
        flow: WildcardFlow,
    ) -> Option<WildcardFlowId> {
        let Some(id) = self.wildcards.register(flow) else {
            self.stats.wc_rejected += 1;
            return None;
        };

        self.xref.track(id);
        self.stats.wc_registered += 1;
        if let Some(wflow) = self.wildcards.get(id) {
            self.ectx.log.log(
                LogLevel::Note,
                &format!(
                    "{}: registered wildcard flow {id}: {wflow}",
                    self.name
                ),
            );
        }
        Some(id)
    }

    /// Remove the datapath flow for `flow`, for example because the
    /// datapath reported it expired. Its wildcard flow stays
    /// registered.
    pub fn remove_dp_flow(
        &mut self,
        flow: &ExactMatch,
    ) -> Option<InstalledFlow> {
        let entry = self.dp_flows.remove(flow)?;
        self.xref.unlink(flow);
        self.stats.dp_flows_removed += 1;
        Some(InstalledFlow {
            flow: flow.clone(),
            actions: entry.actions().clone(),
        })
    }

    /// The datapath flows spawned by the wildcard flow `id`.
    pub fn spawned_by(
        &self,
        id: WildcardFlowId,
    ) -> Option<&BTreeSet<ExactMatch>> {
        self.xref.spawned(id)
    }

    pub fn stats_snap(&self) -> FlowManagerStatsSnap {
        self.stats.snapshot()
    }

    /// Remove the wildcard flow `id` along with every datapath flow it
    /// spawned, returning the matches of those datapath flows.
    ///
    /// # Errors
    ///
    /// If `id` is not registered an error is returned and no
    /// modification is made.
    pub fn unregister_wildcard_flow(
        &mut self,
        id: WildcardFlowId,
    ) -> Result<BTreeSet<ExactMatch>> {
        let wflow = match self.wildcards.unregister(id) {
            Ok(wflow) => wflow,
            Err(e) => {
                self.ectx.log.log(
                    LogLevel::Warn,
                    &format!("{}: cannot unregister: {e}", self.name),
                );
                return Err(e);
            }
        };

        let spawned = self.xref.unlink_all(id).unwrap_or_default();
        for flow in &spawned {
            self.dp_flows.remove(flow);
        }

        self.stats.wc_unregistered += 1;
        self.stats.dp_flows_removed += spawned.len() as u64;
        self.ectx.log.log(
            LogLevel::Note,
            &format!(
                "{}: unregistered wildcard flow {id} ({wflow}), \
                 removed {} datapath flows",
                self.name,
                spawned.len()
            ),
        );

        Ok(spawned)
    }

    /// Return the registered wildcard flow `id`.
    pub fn wildcard_flow(&self, id: WildcardFlowId) -> Option<&WildcardFlow> {
        self.wildcards.get(id)
    }
}
