// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

// Copyright 2025 Oxide Computer Company

use flowman_test_utils as common;

use common::*;
use flowman::print::print_classify_results_into;
use flowman::print::print_dp_flows_into;
use flowman::print::print_stats_into;
use flowman::print::print_wildcard_flows_into;
use flowman_test_utils::assert_consistent;
use std::collections::BTreeSet;

const BCAST: &str = "FF:FF:FF:FF:FF:FF";

// Register a broadcast flood policy, classify broadcast traffic
// against it, then remove the policy.
#[test]
fn broadcast_flood_lifecycle() {
    let mut mgr = test_mgr("bcast");
    let flood = mgr
        .register_wildcard_flow(wc_flow(
            &format!("ether_dst={BCAST}"),
            10,
            &[FlowAction::Flood],
        ))
        .unwrap();

    let flow = ExactMatch::new()
        .with_key(ether_dst(BCAST))
        .with_key(ip4_src("10.0.0.1"));

    let inst = mgr.classify_and_install(&flow).unwrap();
    assert_eq!(inst.flow, flow);
    assert_eq!(inst.actions(), &[FlowAction::Flood]);
    assert_eq!(mgr.num_dp_flows(), 1);
    assert_eq!(mgr.owner_of(&flow), Some(flood));
    assert_consistent!(mgr);

    let spawned = mgr.unregister_wildcard_flow(flood).unwrap();
    assert_eq!(spawned, BTreeSet::from([flow.clone()]));
    assert_eq!(mgr.num_dp_flows(), 0);
    assert!(mgr.classify_and_install(&flow).is_none());
    assert_consistent!(mgr);
}

// A second insert of the same exact match is refused and leaves the
// first actions in place.
#[test]
fn exact_match_uniqueness() {
    let mut mgr = test_mgr("uniq");
    let out1 = mgr
        .register_wildcard_flow(wc_flow(
            "in_port=1",
            10,
            &[FlowAction::Output(1)],
        ))
        .unwrap();
    let out2 = mgr
        .register_wildcard_flow(wc_flow(
            "in_port=2",
            10,
            &[FlowAction::Output(2)],
        ))
        .unwrap();

    let flow = exact("in_port=1,l4_dst=80");
    assert_eq!(mgr.bind_dp_flow(flow.clone(), out1), Ok(true));
    assert_eq!(mgr.bind_dp_flow(flow.clone(), out2), Ok(false));
    assert_eq!(
        mgr.actions_for(&flow).unwrap().as_ref(),
        &[FlowAction::Output(1)]
    );
    assert_eq!(mgr.owner_of(&flow), Some(out1));
    assert_eq!(mgr.num_dp_flows(), 1);
    assert_consistent!(mgr);
}

// Identical wildcard values under different patterns are distinct
// entries, and a duplicate match within one pattern is refused.
#[test]
fn pattern_isolation() {
    let mut mgr = test_mgr("patterns");
    let mac = "A8:40:25:00:00:63";

    let by_src = mgr
        .register_wildcard_flow(WildcardFlow::new(
            WildcardMatch::new().with_key(ether_src(mac)),
            10,
            vec![FlowAction::Output(1)],
        ))
        .unwrap();
    let by_dst = mgr
        .register_wildcard_flow(WildcardFlow::new(
            WildcardMatch::new().with_key(ether_dst(mac)),
            20,
            vec![FlowAction::Output(2)],
        ))
        .unwrap();
    assert_ne!(by_src, by_dst);
    assert_eq!(mgr.num_wildcard_flows(), 2);
    assert_eq!(mgr.dump_wildcard_flows().patterns.len(), 2);

    // Same match, same pattern: refused without error.
    assert!(
        mgr.register_wildcard_flow(wc_flow(
            &format!("ether_src={mac}"),
            1,
            &[FlowAction::Drop],
        ))
        .is_none()
    );
    assert_eq!(mgr.stats_snap().wc_rejected, 1);

    let from_mac = exact(&format!("ether_src={mac},ether_dst={BCAST}"));
    let to_mac = exact(&format!("ether_src=02:08:20:00:00:01,ether_dst={mac}"));
    assert_eq!(
        mgr.classify_and_install(&from_mac).unwrap().actions(),
        &[FlowAction::Output(1)]
    );
    assert_eq!(
        mgr.classify_and_install(&to_mac).unwrap().actions(),
        &[FlowAction::Output(2)]
    );

    // Removing one leaves the other and its datapath flow alone.
    let spawned = mgr.unregister_wildcard_flow(by_src).unwrap();
    assert_eq!(spawned, BTreeSet::from([from_mac.clone()]));
    assert!(mgr.actions_for(&from_mac).is_none());
    assert!(mgr.actions_for(&to_mac).is_some());
    assert_eq!(
        mgr.find_wildcard_flow(&wmatch(&format!("ether_dst={mac}"))),
        Some(by_dst)
    );
    let by_src_match = wmatch(&format!("ether_src={mac}"));
    assert_eq!(mgr.find_wildcard_flow(&by_src_match), None);
    assert_consistent!(mgr);
}

// Removing a wildcard flow removes every datapath flow it spawned and
// nothing else.
#[test]
fn cascading_delete() {
    let mut mgr = test_mgr("cascade");
    let web = mgr
        .register_wildcard_flow(wc_flow(
            "l4_dst=80",
            10,
            &[FlowAction::Output(3)],
        ))
        .unwrap();
    let ssh = mgr
        .register_wildcard_flow(wc_flow("l4_dst=22", 10, &[FlowAction::Drop]))
        .unwrap();

    let m1 = exact("ip4_src=10.0.0.1,l4_dst=80");
    let m2 = exact("ip4_src=10.0.0.2,l4_dst=80");
    let m3 = exact("ip4_src=10.0.0.1,l4_dst=22");
    for m in [&m1, &m2, &m3] {
        assert!(mgr.classify_and_install(m).is_some());
    }
    assert_eq!(mgr.spawned_by(web).unwrap().len(), 2);

    let spawned = mgr.unregister_wildcard_flow(web).unwrap();
    assert_eq!(spawned, BTreeSet::from([m1.clone(), m2.clone()]));
    assert!(mgr.actions_for(&m1).is_none());
    assert!(mgr.actions_for(&m2).is_none());
    assert_eq!(mgr.owner_of(&m1), None);
    assert!(mgr.spawned_by(web).is_none());
    assert!(mgr.wildcard_flow(web).is_none());

    assert_eq!(mgr.actions_for(&m3).unwrap().as_ref(), &[FlowAction::Drop]);
    assert_eq!(mgr.owner_of(&m3), Some(ssh));
    assert_eq!(mgr.num_dp_flows(), 1);
    assert_eq!(mgr.stats_snap().dp_flows_removed, 2);
    assert_consistent!(mgr);

    // A second removal of the same flow is reported, not ignored.
    assert_eq!(
        mgr.unregister_wildcard_flow(web),
        Err(FlowManError::WildcardFlowNotFound(web))
    );
    assert_eq!(mgr.num_dp_flows(), 1);
    assert_consistent!(mgr);
}

// The lower priority value wins no matter which flow was registered
// first.
#[test]
fn priority_selection_ignores_registration_order() {
    let flow = exact("in_port=1,ip4_dst=10.0.0.9,l4_dst=443");
    let orders: [[(&str, u16, FlowAction); 2]; 2] = [
        [
            ("ip4_dst=10.0.0.9", 5, FlowAction::Output(5)),
            ("l4_dst=443", 10, FlowAction::Output(10)),
        ],
        [
            ("l4_dst=443", 10, FlowAction::Output(10)),
            ("ip4_dst=10.0.0.9", 5, FlowAction::Output(5)),
        ],
    ];

    for order in orders {
        let mut mgr = quiet_mgr("priority");
        for (m, pri, act) in order {
            mgr.register_wildcard_flow(wc_flow(m, pri, &[act])).unwrap();
        }

        let inst = mgr.classify_and_install(&flow).unwrap();
        assert_eq!(inst.actions(), &[FlowAction::Output(5)]);
        let owner = mgr.owner_of(&flow).unwrap();
        assert_eq!(mgr.wildcard_flow(owner).unwrap().priority(), 5);
    }
}

// With the only candidate found in the last pattern searched, the
// first and only candidate must still be chosen.
#[test]
fn single_candidate_in_any_pattern() {
    let mut mgr = quiet_mgr("single");
    mgr.register_wildcard_flow(wc_flow("in_port=9", 1, &[FlowAction::Drop]))
        .unwrap();
    mgr.register_wildcard_flow(wc_flow("tunnel_id=7", 1, &[FlowAction::Drop]))
        .unwrap();
    let only = mgr
        .register_wildcard_flow(wc_flow("l4_src=5", 3, &[FlowAction::Flood]))
        .unwrap();

    let flow = exact("in_port=1,l4_src=5");
    assert!(mgr.classify_and_install(&flow).is_some());
    assert_eq!(mgr.owner_of(&flow), Some(only));
}

// Eviction is by insertion order; lookups and hits do not refresh a
// flow.
#[test]
fn eviction_is_fifo_by_insertion() {
    let mut mgr = test_mgr("fifo");
    let any = mgr
        .register_wildcard_flow(wc_flow("*", 100, &[FlowAction::Userspace]))
        .unwrap();

    let m1 = exact("in_port=1");
    let m2 = exact("in_port=2");
    let m3 = exact("in_port=3");
    for m in [&m1, &m2, &m3] {
        mgr.classify_and_install(m).unwrap();
    }

    for _ in 0..10 {
        assert!(mgr.actions_for(&m1).is_some());
        assert!(mgr.classify_and_install(&m1).is_some());
    }

    assert_eq!(mgr.evict_oldest_flows(1).unwrap(), vec![m1.clone()]);
    assert!(mgr.actions_for(&m1).is_none());
    assert_eq!(mgr.owner_of(&m1), None);
    assert_eq!(mgr.spawned_by(any).unwrap().len(), 2);

    // The wildcard flow survives eviction.
    assert!(mgr.wildcard_flow(any).is_some());
    assert_consistent!(mgr);

    // Asking for more than is present evicts what is there.
    assert_eq!(mgr.evict_oldest_flows(10).unwrap(), vec![m2, m3]);
    assert_eq!(mgr.num_dp_flows(), 0);
    assert_eq!(mgr.stats_snap().dp_flows_evicted, 3);
    assert_consistent!(mgr);

    // Re-classifying after eviction reinstalls from the wildcard flow.
    assert!(mgr.classify_and_install(&m1).is_some());
    assert_eq!(mgr.owner_of(&m1), Some(any));
    assert_consistent!(mgr);
}

#[test]
fn evict_zero_is_invalid() {
    let mut mgr = test_mgr("evict-zero");
    mgr.register_wildcard_flow(wc_flow("*", 100, &[FlowAction::Flood]))
        .unwrap();
    mgr.classify_and_install(&exact("in_port=1")).unwrap();

    assert!(matches!(
        mgr.evict_oldest_flows(0),
        Err(FlowManError::InvalidArgument(_))
    ));
    assert_eq!(mgr.num_dp_flows(), 1);
    assert_consistent!(mgr);
}

// Classifying the same match twice returns the same flow and
// installs nothing new.
#[test]
fn classification_is_idempotent() {
    let mut mgr = test_mgr("idempotent");
    mgr.register_wildcard_flow(wc_flow(
        "ether_type=0x0806",
        1,
        &[FlowAction::Userspace],
    ))
    .unwrap();

    let arp = exact("in_port=4,ether_type=0x0806");
    let first = mgr.classify_and_install(&arp).unwrap();
    let count = mgr.num_dp_flows();
    let second = mgr.classify_and_install(&arp).unwrap();
    assert_eq!(first, second);
    assert_eq!(mgr.num_dp_flows(), count);
    assert_eq!(mgr.stats_snap().dp_flows_installed, 1);
}

#[test]
fn no_match_is_not_an_error() {
    let mut mgr = test_mgr("nomatch");
    assert!(mgr.classify_and_install(&exact("in_port=1")).is_none());

    mgr.register_wildcard_flow(wc_flow(
        "in_port=2,l4_dst=53",
        1,
        &[FlowAction::Drop],
    ))
    .unwrap();

    // Matches the value of one key, but lacks the other.
    assert!(mgr.classify_and_install(&exact("in_port=2")).is_none());
    assert_eq!(mgr.num_dp_flows(), 0);
    assert_eq!(mgr.stats_snap().wc_nomatch, 2);
}

#[test]
fn bind_requires_registered_flow() {
    let mut mgr = test_mgr("bind");
    let id = mgr
        .register_wildcard_flow(wc_flow("in_port=1", 1, &[FlowAction::Drop]))
        .unwrap();
    mgr.unregister_wildcard_flow(id).unwrap();

    let flow = exact("in_port=1");
    assert_eq!(
        mgr.bind_dp_flow(flow.clone(), id),
        Err(FlowManError::WildcardFlowNotFound(id))
    );
    assert_eq!(mgr.num_dp_flows(), 0);
    assert!(mgr.actions_for(&flow).is_none());
    assert_consistent!(mgr);
}

// A bound flow is owned like a classified one and cascades the same
// way.
#[test]
fn bound_flow_cascades() {
    let mut mgr = test_mgr("bind-cascade");
    let id = mgr
        .register_wildcard_flow(wc_flow("in_port=1", 1, &[FlowAction::PopVlan]))
        .unwrap();

    // Bind a flow the wildcard flow would not have matched.
    let flow = exact("in_port=7,vlan=100");
    assert_eq!(mgr.bind_dp_flow(flow.clone(), id), Ok(true));
    assert_eq!(mgr.stats_snap().dp_flows_bound, 1);
    assert_eq!(mgr.unregister_wildcard_flow(id).unwrap().len(), 1);
    assert!(mgr.actions_for(&flow).is_none());
    assert_consistent!(mgr);
}

#[test]
fn dumps_and_printing() {
    let mut mgr = test_mgr("dump");
    mgr.register_wildcard_flow(wc_flow(
        "ip4_dst=10.0.0.5,l4_dst=80",
        10,
        &[
            FlowAction::SetEtherDst("02:08:20:00:00:05".parse().unwrap()),
            FlowAction::Output(5),
        ],
    ))
    .unwrap();
    mgr.register_wildcard_flow(wc_flow("*", 65535, &[FlowAction::Drop]))
        .unwrap();

    let f1 = exact("ip4_dst=10.0.0.5,l4_dst=80,l4_src=4000");
    let f2 = exact("ip4_dst=10.0.0.6,l4_dst=80");
    mgr.classify_and_install(&f1).unwrap();
    mgr.classify_and_install(&f2).unwrap();
    mgr.classify_and_install(&f1).unwrap();

    let dp = mgr.dump_dp_flows();
    assert_eq!(dp.num_flows, 2);
    assert_eq!(dp.flows[0].flow, f1);
    assert_eq!(dp.flows[0].hits, 1);
    assert_eq!(dp.flows[1].actions, vec![FlowAction::Drop]);

    let wc = mgr.dump_wildcard_flows();
    assert_eq!(wc.num_flows, 2);
    let total: u32 =
        wc.patterns.iter().flat_map(|p| &p.flows).map(|f| f.dp_flows).sum();
    assert_eq!(total, 2);

    let mut out = Vec::new();
    print_dp_flows_into(&mut out, &dp).unwrap();
    let text = String::from_utf8(out).unwrap();
    assert!(text.contains("Datapath Flows: 2 (dump)"));
    assert!(text.contains("set_ether_dst:02:08:20:00:00:05,output:5"));

    let mut out = Vec::new();
    print_wildcard_flows_into(&mut out, &wc).unwrap();
    let text = String::from_utf8(out).unwrap();
    assert!(text.contains("Pattern ip4_dst,l4_dst"));
    assert!(text.contains("Pattern *"));

    // The dumps are plain serde types.
    let json = serde_json::to_string(&dp).unwrap();
    assert!(json.contains("\"num_flows\":2"));
}

#[test]
fn print_classify_results_and_stats() {
    let mut mgr = test_mgr("print");
    mgr.register_wildcard_flow(wc_flow("in_port=1", 10, &[]))
        .unwrap();
    mgr.register_wildcard_flow(wc_flow("in_port=2", 10, &[FlowAction::Drop]))
        .unwrap();

    let results = ["in_port=1", "in_port=2", "in_port=3", "in_port=1"]
        .into_iter()
        .map(|text| (text.to_string(), mgr.classify_and_install(&exact(text))))
        .collect::<Vec<_>>();

    let mut out = Vec::new();
    print_classify_results_into(&mut out, &results).unwrap();
    let text = String::from_utf8(out).unwrap();
    let rows = text
        .lines()
        .map(|l| l.split_whitespace().collect::<Vec<_>>())
        .collect::<Vec<_>>();
    assert_eq!(rows[0], ["MATCH", "RESULT"]);
    assert_eq!(rows[1], ["in_port=1", "-"]);
    assert_eq!(rows[2], ["in_port=2", "drop"]);
    assert_eq!(rows[3], ["in_port=3", "NO", "MATCH"]);
    assert_eq!(rows[4], ["in_port=1", "-"]);

    let mut out = Vec::new();
    print_stats_into(&mut out, &mgr.stats_snap()).unwrap();
    let text = String::from_utf8(out).unwrap();
    let stat = |name: &str| -> u64 {
        text.lines()
            .find_map(|l| {
                let mut cols = l.split_whitespace();
                (cols.next() == Some(name))
                    .then(|| cols.next().unwrap().parse().unwrap())
            })
            .unwrap()
    };
    assert_eq!(stat("dp_hit"), 1);
    assert_eq!(stat("dp_miss"), 3);
    assert_eq!(stat("wc_nomatch"), 1);
    assert_eq!(stat("dp_flows_installed"), 2);
    assert_eq!(stat("wc_registered"), 2);
}
