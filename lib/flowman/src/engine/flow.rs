// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

// Copyright 2025 Oxide Computer Company

//! Wildcard flows and the datapath flows installed from them.

use crate::api::ActionList;
use crate::api::ExactMatch;
use crate::api::FlowAction;
use crate::api::Pattern;
use crate::api::WildcardMatch;
use crate::api::actions_str;
use core::fmt;
use core::fmt::Display;

/// A policy covering all traffic carrying the keys of its match.
///
/// When several wildcard flows cover the same traffic, the one with
/// the numerically lowest priority wins.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct WildcardFlow {
    wmatch: WildcardMatch,
    priority: u16,
    actions: ActionList,
}

impl WildcardFlow {
    pub fn new<A>(wmatch: WildcardMatch, priority: u16, actions: A) -> Self
    where
        A: Into<ActionList>,
    {
        Self { wmatch, priority, actions: actions.into() }
    }

    pub fn actions(&self) -> &ActionList {
        &self.actions
    }

    pub fn pattern(&self) -> Pattern {
        self.wmatch.pattern()
    }

    pub fn priority(&self) -> u16 {
        self.priority
    }

    pub fn wmatch(&self) -> &WildcardMatch {
        &self.wmatch
    }
}

impl Display for WildcardFlow {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(
            f,
            "pri={} match={} actions={}",
            self.priority,
            self.wmatch,
            actions_str(&self.actions)
        )
    }
}

/// An exact-match flow as pushed to the datapath.
///
/// This is not stored by the engine; it is rebuilt from the datapath
/// flow table whenever it is handed out.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct InstalledFlow {
    pub flow: ExactMatch,
    pub actions: ActionList,
}

impl InstalledFlow {
    pub fn actions(&self) -> &[FlowAction] {
        &self.actions
    }
}

impl Display for InstalledFlow {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "{} => {}", self.flow, actions_str(&self.actions))
    }
}
