// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

// Copyright 2025 Oxide Computer Company

//! Print flow manager dumps in a human-friendly manner.
//!
//! This is mostly just a place to hang printing routines so that they
//! can be used by both flowadm and integration tests.

use crate::api::DpFlowDump;
use crate::api::DumpDpFlowsResp;
use crate::api::DumpWildcardFlowsResp;
use crate::api::FlowManagerStatsSnap;
use crate::api::WildcardFlowDump;
use crate::api::actions_str;
use crate::engine::InstalledFlow;
use itertools::Itertools;
use std::collections::VecDeque;
use std::io::Write;
use std::string::String;
use std::string::ToString;
use tabwriter::TabWriter;

/// Print a [`DumpWildcardFlowsResp`].
pub fn print_wildcard_flows(
    resp: &DumpWildcardFlowsResp,
) -> std::io::Result<()> {
    print_wildcard_flows_into(&mut std::io::stdout(), resp)
}

/// Print a [`DumpWildcardFlowsResp`] into a given writer.
pub fn print_wildcard_flows_into(
    writer: &mut impl Write,
    resp: &DumpWildcardFlowsResp,
) -> std::io::Result<()> {
    let mut t = TabWriter::new(writer);

    writeln!(t, "Wildcard Flows: {} ({})", resp.num_flows, resp.name)?;
    write_hrb(&mut t)?;
    for pd in &resp.patterns {
        writeln!(t, "Pattern {}", pd.pattern)?;
        write_hr(&mut t)?;
        print_wildcard_flow_header(&mut t)?;
        // Within a pattern, list flows in the order they would win.
        for wfd in pd.flows.iter().sorted_by_key(|f| (f.priority, f.id)) {
            print_wildcard_flow(&mut t, wfd)?;
        }
        writeln!(t)?;
        t.flush()?;
    }

    t.flush()
}

/// Print the header for the [`print_wildcard_flow()`] output.
pub fn print_wildcard_flow_header(t: &mut impl Write) -> std::io::Result<()> {
    writeln!(t, "ID\tPRI\tDP FLOWS\tMATCH\tACTIONS")
}

/// Print a [`WildcardFlowDump`].
///
/// The first key of the match shares the line with the rest of the
/// flow, each further key gets a line of its own.
pub fn print_wildcard_flow(
    t: &mut impl Write,
    wfd: &WildcardFlowDump,
) -> std::io::Result<()> {
    let mut keys = wfd
        .wmatch
        .keys()
        .map(ToString::to_string)
        .collect::<VecDeque<String>>();

    let first_key = keys.pop_front().unwrap_or_else(|| "*".to_string());

    writeln!(
        t,
        "{}\t{}\t{}\t{first_key}\t{}",
        wfd.id,
        wfd.priority,
        wfd.dp_flows,
        actions_str(&wfd.actions)
    )?;

    let mut multi_keys = false;
    while let Some(key) = keys.pop_front() {
        writeln!(t, "\t\t\t{key}\t")?;
        multi_keys = true;
    }

    // Separate flows with multiple keys so it's easier to discern
    // where one flow ends and another begins.
    if multi_keys {
        writeln!(t, "\t\t\t\t")?;
    }

    Ok(())
}

/// Print a [`DumpDpFlowsResp`].
pub fn print_dp_flows(resp: &DumpDpFlowsResp) -> std::io::Result<()> {
    print_dp_flows_into(&mut std::io::stdout(), resp)
}

/// Print a [`DumpDpFlowsResp`] into a given writer.
pub fn print_dp_flows_into(
    writer: &mut impl Write,
    resp: &DumpDpFlowsResp,
) -> std::io::Result<()> {
    let mut t = TabWriter::new(writer);

    match resp.limit {
        Some(limit) => writeln!(
            t,
            "Datapath Flows: {}/{limit} ({})",
            resp.num_flows, resp.name
        )?,
        None => {
            writeln!(t, "Datapath Flows: {} ({})", resp.num_flows, resp.name)?
        }
    }
    write_hr(&mut t)?;
    print_dp_flow_header(&mut t)?;
    for dfd in &resp.flows {
        print_dp_flow(&mut t, dfd)?;
    }

    t.flush()
}

/// Print the header for the [`print_dp_flow()`] output.
pub fn print_dp_flow_header(t: &mut impl Write) -> std::io::Result<()> {
    writeln!(t, "OWNER\tHITS\tMATCH\tACTIONS")
}

/// Print a [`DpFlowDump`], oldest first.
pub fn print_dp_flow(
    t: &mut impl Write,
    dfd: &DpFlowDump,
) -> std::io::Result<()> {
    let owner = match dfd.owner {
        Some(id) => id.to_string(),
        None => "--".to_string(),
    };

    writeln!(
        t,
        "{owner}\t{}\t{}\t{}",
        dfd.hits,
        dfd.flow,
        actions_str(&dfd.actions)
    )
}

/// Print the result of classifying each match in `results`.
pub fn print_classify_results_into(
    writer: &mut impl Write,
    results: &[(String, Option<InstalledFlow>)],
) -> std::io::Result<()> {
    let mut t = TabWriter::new(writer);
    writeln!(t, "MATCH\tRESULT")?;
    for (flow, installed) in results {
        match installed {
            Some(inst) => {
                writeln!(t, "{flow}\t{}", actions_str(inst.actions()))?;
            }
            None => writeln!(t, "{flow}\tNO MATCH")?,
        }
    }
    t.flush()
}

/// Print a [`FlowManagerStatsSnap`].
pub fn print_stats_into(
    writer: &mut impl Write,
    snap: &FlowManagerStatsSnap,
) -> std::io::Result<()> {
    let mut t = TabWriter::new(writer);
    let rows = [
        ("dp_hit", snap.dp_hit),
        ("dp_miss", snap.dp_miss),
        ("wc_match", snap.wc_match),
        ("wc_nomatch", snap.wc_nomatch),
        ("dp_flows_installed", snap.dp_flows_installed),
        ("dp_flows_bound", snap.dp_flows_bound),
        ("dp_flows_evicted", snap.dp_flows_evicted),
        ("dp_flows_removed", snap.dp_flows_removed),
        ("wc_registered", snap.wc_registered),
        ("wc_rejected", snap.wc_rejected),
        ("wc_unregistered", snap.wc_unregistered),
    ];

    writeln!(t, "STAT\tVALUE")?;
    for (name, val) in rows {
        writeln!(t, "{name}\t{val}")?;
    }
    t.flush()
}

/// Print a horizontal rule.
pub fn write_hr(t: &mut impl Write) -> std::io::Result<()> {
    writeln!(t, "{:-<70}", "")
}

/// Print a bold horizontal rule.
pub fn write_hrb(t: &mut impl Write) -> std::io::Result<()> {
    writeln!(t, "{:=<70}", "")
}
