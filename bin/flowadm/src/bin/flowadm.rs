// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

// Copyright 2025 Oxide Computer Company

use std::io;
use std::io::Write;
use std::path::PathBuf;
use std::sync::Arc;

use anyhow::Context;
use clap::Args;
use clap::Parser;
use clap::Subcommand;
use slog::Drain;

use flowadm::Topology;
use flowman::ExecCtx;
use flowman::api::ExactMatch;
use flowman::engine::FlowManager;
use flowman::engine::InstalledFlow;
use flowman::print::print_classify_results_into;
use flowman::print::print_dp_flows;
use flowman::print::print_stats_into;
use flowman::print::print_wildcard_flows;
use flowman::provider::SlogLog;

/// Replay a flow manager topology and inspect its tables
#[derive(Debug, Parser)]
#[command(version)]
struct Cli {
    /// The TOML topology file.
    #[arg(short, long = "config", global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    cmd: Command,
}

#[derive(Debug, Subcommand)]
enum Command {
    /// Classify each exact match, installing datapath flows.
    Classify {
        #[command(flatten)]
        flows: Flows,

        #[arg(long)]
        json: bool,
    },

    /// Dump the wildcard flows, grouped by pattern.
    DumpWildcard {
        #[arg(long)]
        json: bool,
    },

    /// Classify each exact match, then dump the datapath flows.
    DumpDp {
        #[command(flatten)]
        flows: Flows,

        #[arg(long)]
        json: bool,
    },

    /// Classify each exact match, then print the manager stats.
    Stats {
        #[command(flatten)]
        flows: Flows,

        #[arg(long)]
        json: bool,
    },
}

#[derive(Args, Debug)]
struct Flows {
    /// Exact matches such as `in_port=1,ip4_dst=10.0.0.5`. If none
    /// are given they are read from stdin, one per line.
    flows: Vec<String>,
}

impl Flows {
    fn parse(self) -> anyhow::Result<Vec<(String, ExactMatch)>> {
        let lines = if self.flows.is_empty() {
            io::stdin()
                .lines()
                .collect::<Result<Vec<_>, _>>()
                .context("failed to read flows from stdin")?
        } else {
            self.flows
        };

        lines
            .into_iter()
            .map(|l| l.trim().to_string())
            .filter(|l| !l.is_empty() && !l.starts_with('#'))
            .map(|l| {
                let flow = l
                    .parse::<ExactMatch>()
                    .map_err(|e| anyhow::anyhow!("invalid flow {l:?}: {e}"))?;
                Ok((l, flow))
            })
            .collect()
    }
}

fn logger() -> slog::Logger {
    let decorator = slog_term::TermDecorator::new().stderr().build();
    let drain = slog_term::FullFormat::new(decorator).build().fuse();
    let drain = slog_envlogger::new(drain).fuse();
    let drain = slog_async::Async::new(drain).build().fuse();
    slog::Logger::root(drain, slog::o!("component" => "flowadm"))
}

fn build_mgr(
    path: Option<&PathBuf>,
    log: &slog::Logger,
) -> anyhow::Result<FlowManager> {
    let topo = match path {
        Some(path) => Topology::load(path)
            .with_context(|| format!("loading {}", path.display()))?,
        None => Topology::default(),
    };

    let ectx = Arc::new(ExecCtx::new(Box::new(SlogLog::new(log.clone()))));
    topo.build(ectx).context("building flow manager")
}

/// Classify every flow, evicting down to the configured limit after
/// each install.
fn classify_all(
    mgr: &mut FlowManager,
    flows: Vec<(String, ExactMatch)>,
) -> Vec<(String, Option<InstalledFlow>)> {
    flows
        .into_iter()
        .map(|(text, flow)| {
            let inst = mgr.classify_and_install(&flow);
            mgr.evict_excess();
            (text, inst)
        })
        .collect()
}

fn print_json<T: serde::Serialize>(val: &T) -> anyhow::Result<()> {
    let mut out = io::stdout().lock();
    serde_json::to_writer_pretty(&mut out, val)?;
    writeln!(out)?;
    Ok(())
}

fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    let log = logger();
    let mut mgr = build_mgr(cli.config.as_ref(), &log)?;

    match cli.cmd {
        Command::Classify { flows, json } => {
            let results = classify_all(&mut mgr, flows.parse()?);
            if json {
                let results = results
                    .iter()
                    .map(|(text, inst)| {
                        (text, inst.as_ref().map(|i| i.actions().to_vec()))
                    })
                    .collect::<Vec<_>>();
                print_json(&results)?;
            } else {
                print_classify_results_into(&mut io::stdout(), &results)?;
            }
        }

        Command::DumpWildcard { json } => {
            let dump = mgr.dump_wildcard_flows();
            if json {
                print_json(&dump)?;
            } else {
                print_wildcard_flows(&dump)?;
            }
        }

        Command::DumpDp { flows, json } => {
            classify_all(&mut mgr, flows.parse()?);
            let dump = mgr.dump_dp_flows();
            if json {
                print_json(&dump)?;
            } else {
                print_dp_flows(&dump)?;
            }
        }

        Command::Stats { flows, json } => {
            classify_all(&mut mgr, flows.parse()?);
            let snap = mgr.stats_snap();
            if json {
                print_json(&snap)?;
            } else {
                print_stats_into(&mut io::stdout(), &snap)?;
            }
        }
    }

    Ok(())
}

#[cfg(test)]
mod test {
    use super::*;
    use clap::CommandFactory;

    #[test]
    fn classify_all_holds_the_limit() {
        let topo = Topology::from_toml(
            r#"
[manager]
dp_flow_limit = 2

[[wildcard]]
match = "in_port=1"
priority = 10
actions = ["userspace"]
"#,
        )
        .unwrap();
        let ectx = Arc::new(ExecCtx::new(Box::new(flowman::provider::NoLog)));
        let mut mgr = topo.build(ectx).unwrap();

        let flows = [
            "in_port=1,l4_dst=1",
            "in_port=1,l4_dst=2",
            "in_port=2",
            "in_port=1,l4_dst=3",
        ]
        .into_iter()
        .map(|t| (t.to_string(), t.parse::<ExactMatch>().unwrap()))
        .collect::<Vec<_>>();
        let results = classify_all(&mut mgr, flows);

        assert_eq!(results.len(), 4);
        assert!(results[2].1.is_none());
        assert!(results[3].1.is_some());

        // The oldest flow made room for the newest.
        let dump = mgr.dump_dp_flows();
        assert_eq!(dump.num_flows, 2);
        assert_eq!(dump.flows[0].flow.to_string(), "in_port=1,l4_dst=2");
        assert_eq!(mgr.stats_snap().dp_flows_evicted, 1);

        let mut out = Vec::new();
        print_classify_results_into(&mut out, &results).unwrap();
        let text = String::from_utf8(out).unwrap();
        assert!(text.contains("NO MATCH"));
        assert_eq!(text.matches("userspace").count(), 3);
    }

    #[test]
    fn cli_is_well_formed() {
        Cli::command().debug_assert();
    }

    #[test]
    fn parse_commands() {
        let cli = Cli::try_parse_from([
            "flowadm",
            "-c",
            "topo.toml",
            "classify",
            "--json",
            "in_port=1,l4_dst=80",
            "in_port=2",
        ])
        .unwrap();
        assert_eq!(cli.config, Some(PathBuf::from("topo.toml")));
        match cli.cmd {
            Command::Classify { flows, json } => {
                assert!(json);
                let flows = flows.parse().unwrap();
                assert_eq!(flows.len(), 2);
                let port2 = "in_port=2".parse::<ExactMatch>().unwrap();
                assert_eq!(flows[1].1, port2);
            }
            cmd => panic!("unexpected command: {cmd:?}"),
        }

        let cli =
            Cli::try_parse_from(["flowadm", "dump-wildcard", "--config", "t"])
                .unwrap();
        assert!(matches!(cli.cmd, Command::DumpWildcard { json: false }));
    }

    #[test]
    fn bad_flow_is_an_error() {
        let cli = Cli::try_parse_from(["flowadm", "stats", "in_port=x"])
            .unwrap();
        let Command::Stats { flows, .. } = cli.cmd else {
            panic!("expected stats");
        };
        assert!(flows.parse().is_err());

        // A kind given twice is refused rather than collapsed.
        let cli = Cli::try_parse_from([
            "flowadm",
            "classify",
            "in_port=1,in_port=2,l4_dst=80",
        ])
        .unwrap();
        let Command::Classify { flows, .. } = cli.cmd else {
            panic!("expected classify");
        };
        assert!(flows.parse().is_err());
    }
}
