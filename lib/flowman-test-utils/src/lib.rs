// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

// Copyright 2025 Oxide Computer Company

//! Common routines for integration tests and benchmarks.

// This type of pedantry is more trouble than it's worth here.
#![allow(dead_code)]

use rand::Rng;
use std::boxed::Box;
use std::sync::Arc;

// Let's make our lives easier and pub use a bunch of stuff.
pub use flowman::ExecCtx;
pub use flowman::api::ActionList;
pub use flowman::api::AttrKind;
pub use flowman::api::ExactMatch;
pub use flowman::api::FlowAction;
pub use flowman::api::FlowKey;
pub use flowman::api::FlowManError;
pub use flowman::api::FlowManagerCfg;
pub use flowman::api::Ipv4Addr;
pub use flowman::api::MacAddr;
pub use flowman::api::WildcardFlowId;
pub use flowman::api::WildcardMatch;
pub use flowman::engine::FlowManager;
pub use flowman::engine::InstalledFlow;
pub use flowman::engine::WildcardFlow;
pub use flowman::provider::NoLog;
pub use flowman::provider::PrintlnLog;

/// Assert that the manager's tables agree with each other.
#[macro_export]
macro_rules! assert_consistent {
    ($mgr:expr) => {
        if let Err(msg) = $mgr.check_consistency() {
            panic!("flow manager inconsistent: {msg}");
        }
    };
}

/// Build a manager which logs to stdout, so that `cargo test --
/// --nocapture` shows what the engine did.
pub fn test_mgr(name: &str) -> FlowManager {
    let cfg = FlowManagerCfg { name: name.to_string(), dp_flow_limit: None };
    FlowManager::new(cfg, Arc::new(ExecCtx::new(Box::new(PrintlnLog))))
}

/// Build a manager which logs nothing.
pub fn quiet_mgr(name: &str) -> FlowManager {
    let cfg = FlowManagerCfg { name: name.to_string(), dp_flow_limit: None };
    FlowManager::new(cfg, Arc::new(ExecCtx::new(Box::new(NoLog))))
}

pub fn exact(s: &str) -> ExactMatch {
    s.parse().unwrap()
}

pub fn wmatch(s: &str) -> WildcardMatch {
    s.parse().unwrap()
}

/// Build a wildcard flow from its textual match and actions.
pub fn wc_flow(m: &str, priority: u16, actions: &[FlowAction]) -> WildcardFlow {
    WildcardFlow::new(wmatch(m), priority, actions)
}

pub fn ether_dst(mac: &str) -> FlowKey {
    FlowKey::EtherDst(mac.parse().unwrap())
}

pub fn ether_src(mac: &str) -> FlowKey {
    FlowKey::EtherSrc(mac.parse().unwrap())
}

pub fn ip4_src(ip: &str) -> FlowKey {
    FlowKey::Ip4Src(ip.parse().unwrap())
}

pub fn ip4_dst(ip: &str) -> FlowKey {
    FlowKey::Ip4Dst(ip.parse().unwrap())
}

/// Generate a random TCP/IPv4 exact match arriving on `in_port`.
pub fn rand_tcp4_flow<R: Rng>(rng: &mut R, in_port: u32) -> ExactMatch {
    let src_mac: [u8; 6] = [0x02, 0x08, 0x20, rng.random(), rng.random(), 1];
    let dst_mac: [u8; 6] = [0x02, 0x08, 0x20, rng.random(), rng.random(), 2];

    ExactMatch::new()
        .with_key(FlowKey::InPort(in_port))
        .with_key(FlowKey::EtherSrc(MacAddr::from(src_mac)))
        .with_key(FlowKey::EtherDst(MacAddr::from(dst_mac)))
        .with_key(FlowKey::EtherType(0x0800))
        .with_key(FlowKey::Ip4Src(Ipv4Addr::from([10, 0, 0, rng.random()])))
        .with_key(FlowKey::Ip4Dst(Ipv4Addr::from([10, 0, 1, rng.random()])))
        .with_key(FlowKey::IpProto(6))
        .with_key(FlowKey::L4Src(rng.random_range(1024..=u16::MAX)))
        .with_key(FlowKey::L4Dst(rng.random_range(1..1024)))
}
