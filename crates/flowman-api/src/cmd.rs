// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

// Copyright 2025 Oxide Computer Company

use super::flow::ExactMatch;
use super::flow::FlowAction;
use super::flow::Pattern;
use super::flow::WildcardFlowId;
use super::flow::WildcardMatch;
use alloc::string::String;
use alloc::vec::Vec;
use core::num::NonZeroU32;
use serde::Deserialize;
use serde::Serialize;
use thiserror::Error;

/// Errors reported by the flow manager.
///
/// Benign outcomes, such as registering a flow whose match is already
/// present or classifying traffic that no wildcard flow covers, are
/// not errors. Every error is detected before any state is modified.
#[derive(Clone, Debug, Deserialize, Eq, Error, PartialEq, Serialize)]
pub enum FlowManError {
    /// The wildcard flow is not registered: it was never registered,
    /// or it has already been removed.
    #[error("wildcard flow {0} not found")]
    WildcardFlowNotFound(WildcardFlowId),

    #[error("invalid argument: {0}")]
    InvalidArgument(String),

    /// A thread panicked while holding the manager's lock.
    #[error("flow manager lock poisoned")]
    Poisoned,
}

/// Configuration of a flow manager.
#[derive(Clone, Debug, Deserialize, Eq, PartialEq, Serialize)]
#[serde(default)]
pub struct FlowManagerCfg {
    /// The name used in logs and dumps.
    pub name: String,

    /// The number of datapath flows the caller intends to keep.
    ///
    /// The manager never evicts on its own; this only drives
    /// `excess_flows()` and `evict_excess()`.
    pub dp_flow_limit: Option<NonZeroU32>,
}

impl Default for FlowManagerCfg {
    fn default() -> Self {
        Self { name: String::from("flowman"), dp_flow_limit: None }
    }
}

/// A datapath flow as presented by a dump.
#[derive(Clone, Debug, Deserialize, Serialize)]
pub struct DpFlowDump {
    pub flow: ExactMatch,
    pub actions: Vec<FlowAction>,
    pub owner: Option<WildcardFlowId>,
    pub hits: u64,
}

/// The contents of the datapath flow table, oldest flow first.
#[derive(Clone, Debug, Deserialize, Serialize)]
pub struct DumpDpFlowsResp {
    pub name: String,
    pub num_flows: u32,
    pub limit: Option<u32>,
    pub flows: Vec<DpFlowDump>,
}

#[derive(Clone, Debug, Deserialize, Serialize)]
pub struct WildcardFlowDump {
    pub id: WildcardFlowId,
    pub priority: u16,
    pub wmatch: WildcardMatch,
    pub actions: Vec<FlowAction>,

    /// The number of datapath flows derived from this flow.
    pub dp_flows: u32,
}

#[derive(Clone, Debug, Deserialize, Serialize)]
pub struct PatternDump {
    pub pattern: Pattern,
    pub flows: Vec<WildcardFlowDump>,
}

/// The registered wildcard flows, grouped by pattern.
#[derive(Clone, Debug, Deserialize, Serialize)]
pub struct DumpWildcardFlowsResp {
    pub name: String,
    pub num_flows: u32,
    pub patterns: Vec<PatternDump>,
}

/// A point-in-time copy of the flow manager's counters.
#[derive(Clone, Copy, Debug, Default, Deserialize, Eq, PartialEq, Serialize)]
pub struct FlowManagerStatsSnap {
    pub dp_hit: u64,
    pub dp_miss: u64,
    pub wc_match: u64,
    pub wc_nomatch: u64,
    pub dp_flows_installed: u64,
    pub dp_flows_bound: u64,
    pub dp_flows_evicted: u64,
    pub dp_flows_removed: u64,
    pub wc_registered: u64,
    pub wc_rejected: u64,
    pub wc_unregistered: u64,
}
