// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

// Copyright 2025 Oxide Computer Company

//! Flow manager administration library
//!
//! A topology file is a TOML document describing a flow manager and
//! the wildcard flows to register with it:
//!
//! ```toml
//! [manager]
//! name = "br0"
//! dp_flow_limit = 4096
//!
//! [[wildcard]]
//! match = "ether_dst=FF:FF:FF:FF:FF:FF"
//! priority = 10
//! actions = ["flood"]
//! ```

use flowman::ExecCtx;
use flowman::api::ActionList;
use flowman::api::FlowAction;
use flowman::api::FlowManagerCfg;
use flowman::api::WildcardMatch;
use flowman::engine::FlowManager;
use flowman::engine::WildcardFlow;
use serde::Deserialize;
use serde::Serialize;
use std::path::Path;
use std::sync::Arc;

#[derive(Debug, thiserror::Error)]
pub enum CfgError {
    #[error("failed to read {path}: {source}")]
    Read { path: String, source: std::io::Error },

    #[error("bad topology: {0}")]
    Toml(#[from] toml::de::Error),

    #[error("wildcard {index}: bad match {text:?}: {msg}")]
    BadMatch { index: usize, text: String, msg: String },

    #[error("wildcard {index}: bad action {text:?}: {msg}")]
    BadAction { index: usize, text: String, msg: String },

    #[error("wildcard {index}: match {wmatch} is already registered")]
    Duplicate { index: usize, wmatch: WildcardMatch },
}

/// One `[[wildcard]]` entry of a topology file.
#[derive(Clone, Debug, Deserialize, Serialize)]
pub struct WildcardCfg {
    #[serde(rename = "match")]
    pub wmatch: String,
    pub priority: u16,
    #[serde(default)]
    pub actions: Vec<String>,
}

impl WildcardCfg {
    fn to_flow(&self, index: usize) -> Result<WildcardFlow, CfgError> {
        let wmatch = self.wmatch.parse::<WildcardMatch>().map_err(|msg| {
            CfgError::BadMatch { index, text: self.wmatch.clone(), msg }
        })?;

        let actions = self
            .actions
            .iter()
            .map(|a| {
                a.parse::<FlowAction>().map_err(|msg| CfgError::BadAction {
                    index,
                    text: a.clone(),
                    msg,
                })
            })
            .collect::<Result<ActionList, _>>()?;

        Ok(WildcardFlow::new(wmatch, self.priority, actions))
    }
}

/// A flow manager topology.
#[derive(Clone, Debug, Default, Deserialize, Serialize)]
#[serde(default)]
pub struct Topology {
    pub manager: FlowManagerCfg,
    pub wildcard: Vec<WildcardCfg>,
}

impl Topology {
    pub fn from_toml(text: &str) -> Result<Self, CfgError> {
        Ok(toml::from_str(text)?)
    }

    pub fn load(path: &Path) -> Result<Self, CfgError> {
        let text = std::fs::read_to_string(path).map_err(|source| {
            CfgError::Read { path: path.display().to_string(), source }
        })?;
        Self::from_toml(&text)
    }

    /// Build a flow manager with every wildcard flow registered, in
    /// file order.
    ///
    /// All entries are parsed before the manager is built, so a bad
    /// entry anywhere in the file yields no manager.
    pub fn build(&self, ectx: Arc<ExecCtx>) -> Result<FlowManager, CfgError> {
        let flows = self
            .wildcard
            .iter()
            .enumerate()
            .map(|(i, wc)| wc.to_flow(i))
            .collect::<Result<Vec<_>, _>>()?;

        let mut mgr = FlowManager::new(self.manager.clone(), ectx);
        for (index, flow) in flows.into_iter().enumerate() {
            let wmatch = flow.wmatch().clone();
            if mgr.register_wildcard_flow(flow).is_none() {
                return Err(CfgError::Duplicate { index, wmatch });
            }
        }

        Ok(mgr)
    }
}
