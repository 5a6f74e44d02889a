// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

// Copyright 2025 Oxide Computer Company

//! A flow manager which may be shared between threads.
//!
//! The whole manager sits behind a single reader/writer lock. Every
//! mutating operation holds the write lock from start to finish, so no
//! reader can observe a wildcard flow removed while its datapath
//! flows are still installed. Read-only queries share the read lock.

use crate::ExecCtx;
use crate::api::ActionList;
use crate::api::DumpDpFlowsResp;
use crate::api::DumpWildcardFlowsResp;
use crate::api::ExactMatch;
use crate::api::FlowManError;
use crate::api::FlowManagerCfg;
use crate::api::FlowManagerStatsSnap;
use crate::api::WildcardFlowId;
use crate::engine::FlowManager;
use crate::engine::InstalledFlow;
use crate::engine::WildcardFlow;
use std::collections::BTreeSet;
use std::sync::Arc;
use std::sync::RwLock;
use std::sync::RwLockReadGuard;
use std::sync::RwLockWriteGuard;
use std::vec::Vec;

type Result<T> = core::result::Result<T, FlowManError>;

/// A [`FlowManager`] guarded by one lock.
///
/// Cloning the handle shares the same manager.
#[derive(Clone)]
pub struct SharedFlowManager {
    inner: Arc<RwLock<FlowManager>>,
}

impl SharedFlowManager {
    pub fn new(cfg: FlowManagerCfg, ectx: Arc<ExecCtx>) -> Self {
        Self::from_manager(FlowManager::new(cfg, ectx))
    }

    pub fn from_manager(mgr: FlowManager) -> Self {
        Self { inner: Arc::new(RwLock::new(mgr)) }
    }

    /// Acquire the read lock for a series of queries.
    pub fn read(&self) -> Result<RwLockReadGuard<'_, FlowManager>> {
        self.inner.read().map_err(|_| FlowManError::Poisoned)
    }

    /// Acquire the write lock for a series of operations which must
    /// appear atomic to every other user of the manager.
    pub fn write(&self) -> Result<RwLockWriteGuard<'_, FlowManager>> {
        self.inner.write().map_err(|_| FlowManError::Poisoned)
    }

    pub fn actions_for(&self, flow: &ExactMatch) -> Result<Option<ActionList>> {
        Ok(self.read()?.actions_for(flow))
    }

    pub fn bind_dp_flow(
        &self,
        flow: ExactMatch,
        id: WildcardFlowId,
    ) -> Result<bool> {
        self.write()?.bind_dp_flow(flow, id)
    }

    pub fn classify_and_install(
        &self,
        flow: &ExactMatch,
    ) -> Result<Option<InstalledFlow>> {
        Ok(self.write()?.classify_and_install(flow))
    }

    pub fn dump_dp_flows(&self) -> Result<DumpDpFlowsResp> {
        Ok(self.read()?.dump_dp_flows())
    }

    pub fn dump_wildcard_flows(&self) -> Result<DumpWildcardFlowsResp> {
        Ok(self.read()?.dump_wildcard_flows())
    }

    pub fn evict_oldest_flows(&self, n: usize) -> Result<Vec<ExactMatch>> {
        self.write()?.evict_oldest_flows(n)
    }

    pub fn num_dp_flows(&self) -> Result<u32> {
        Ok(self.read()?.num_dp_flows())
    }

    pub fn register_wildcard_flow(
        &self,
        flow: WildcardFlow,
    ) -> Result<Option<WildcardFlowId>> {
        Ok(self.write()?.register_wildcard_flow(flow))
    }

    pub fn stats_snap(&self) -> Result<FlowManagerStatsSnap> {
        Ok(self.read()?.stats_snap())
    }

    pub fn unregister_wildcard_flow(
        &self,
        id: WildcardFlowId,
    ) -> Result<BTreeSet<ExactMatch>> {
        self.write()?.unregister_wildcard_flow(id)
    }
}
