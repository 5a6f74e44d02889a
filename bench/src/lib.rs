// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

// Copyright 2025 Oxide Computer Company

//! Canned switch setups shared by the benchmarks.

use flowman_test_utils::*;
use rand::Rng;
use rand::SeedableRng;
use rand::rngs::StdRng;
use std::num::NonZeroU32;
use std::sync::Arc;

/// A flow manager loaded with a plausible set of wildcard flows.
pub struct Switch {
    pub mgr: FlowManager,
    pub rng: StdRng,
    pub ports: u32,
}

impl Switch {
    /// Build a switch with `ports` ports, one wildcard flow forwarding
    /// to each port, a broadcast flood flow, per-port web ACLs and a
    /// catch-all.
    ///
    /// Every TCP flow generated by [`Switch::flow()`] matches at least
    /// the catch-all, so classification always installs.
    pub fn new(ports: u32, dp_flow_limit: Option<NonZeroU32>) -> Self {
        let cfg = FlowManagerCfg { name: "bench".to_string(), dp_flow_limit };
        let mut mgr =
            FlowManager::new(cfg, Arc::new(ExecCtx::new(Box::new(NoLog))));

        mgr.register_wildcard_flow(wc_flow(
            "ether_dst=FF:FF:FF:FF:FF:FF",
            10,
            &[FlowAction::Flood],
        ));

        for port in 1..=ports {
            mgr.register_wildcard_flow(wc_flow(
                &format!("in_port={port},l4_dst=80"),
                20,
                &[FlowAction::Output(port % ports + 1)],
            ));
            mgr.register_wildcard_flow(wc_flow(
                &format!("in_port={port}"),
                100,
                &[FlowAction::Userspace],
            ));
        }

        mgr.register_wildcard_flow(wc_flow("*", u16::MAX, &[FlowAction::Drop]));

        Self { mgr, rng: StdRng::seed_from_u64(0x0f10_3a4d), ports }
    }

    /// Generate a random TCP flow on one of the switch's ports.
    pub fn flow(&mut self) -> ExactMatch {
        random_flow(&mut self.rng, self.ports)
    }
}

/// Generate a random TCP flow on one of ports `1..=ports`.
pub fn random_flow<R: Rng>(rng: &mut R, ports: u32) -> ExactMatch {
    let port = rng.random_range(1..=ports);
    rand_tcp4_flow(rng, port)
}
