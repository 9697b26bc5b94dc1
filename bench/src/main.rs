mod config;
mod orchestrator;
mod report;
mod round;
mod tracker;

#[cfg(test)]
#[path = "tests/common.rs"]
mod common;
#[cfg(test)]
#[path = "tests/orchestrator_tests.rs"]
mod orchestrator_tests;
#[cfg(test)]
#[path = "tests/round_tests.rs"]
mod round_tests;
#[cfg(test)]
#[path = "tests/tracker_tests.rs"]
mod tracker_tests;

use crate::config::RunConfig;
use crate::orchestrator::Orchestrator;
use crate::round::RoundRunner;
use crate::tracker::{CommitmentTracker, Strategy};

use anyhow::{Context, Result};
use clap::{crate_name, crate_version, App, AppSettings};
use env_logger::Env;
use ledger::{wait_until_reachable, ReplicaClient, TcpReplica};
use log::info;
use std::collections::HashMap;
use std::net::SocketAddr;
use std::path::{Path, PathBuf};
use std::sync::Arc;

#[tokio::main]
async fn main() -> Result<()> {
    // Set up logging
    env_logger::Builder::from_env(Env::default().default_filter_or("info"))
        .format_timestamp_millis()
        .init();

    // Parse command line arguments
    let matches = App::new(crate_name!())
        .version(crate_version!())
        .about("Put/get latency benchmark for a replicated timestamping ledger.")
        .args_from_usage("--config=<FILE> 'Path to the JSON run configuration'")
        .args_from_usage("--counts=[INT]... 'Override the configured operation counts'")
        .args_from_usage("--repetitions=[INT] 'Override the configured repetition count'")
        .args_from_usage("--strategy=[STRING] 'Commitment strategy: events or polling'")
        .args_from_usage("--report=[FILE] 'Override the report output path'")
        .setting(AppSettings::ArgRequiredElseHelp)
        .get_matches();

    let config_path = Path::new(matches.value_of("config").unwrap());
    let mut config = RunConfig::load(config_path)?;

    if let Some(counts) = matches.values_of("counts") {
        config.counts = counts
            .map(|count| count.parse::<usize>())
            .collect::<Result<Vec<_>, _>>()
            .context("Operation counts must be non-negative integers")?;
    }
    if let Some(repetitions) = matches.value_of("repetitions") {
        config.repetitions = repetitions
            .parse::<usize>()
            .context("The repetition count must be a non-negative integer")?;
    }
    if let Some(strategy) = matches.value_of("strategy") {
        config.strategy = strategy
            .parse::<Strategy>()
            .map_err(anyhow::Error::msg)
            .context("Invalid commitment strategy")?;
    }
    if let Some(path) = matches.value_of("report") {
        config.report_path = Some(PathBuf::from(path));
    }
    config.validate()?;

    info!("contract: {}", config.contract);
    info!("operation counts: {:?}", config.counts);
    info!("repetitions: {}", config.repetitions);
    info!("strategy: {:?}", config.strategy);
    info!("round timeout: {} ms", config.round_timeout_ms);

    // One client per distinct replica endpoint.
    let mut clients: HashMap<SocketAddr, Arc<dyn ReplicaClient>> = HashMap::new();
    let mut client_for = |addr: SocketAddr| -> Arc<dyn ReplicaClient> {
        clients
            .entry(addr)
            .or_insert_with(|| Arc::new(TcpReplica::new(addr)))
            .clone()
    };
    let write_target = client_for(config.write_target);
    let read_target = client_for(config.read_target());
    let poll_target = client_for(config.poll_target());
    let commit_targets: Vec<Arc<dyn ReplicaClient>> = config
        .commit_targets()
        .into_iter()
        .map(&mut client_for)
        .collect();

    // Wait for all replicas to be online before starting the benchmark.
    let mut addrs: Vec<SocketAddr> = config.commit_targets();
    addrs.push(config.write_target);
    addrs.push(config.read_target());
    addrs.push(config.poll_target());
    addrs.sort();
    addrs.dedup();
    info!("waiting for {} replica(s) to be reachable...", addrs.len());
    wait_until_reachable(&addrs).await;

    let tracker = CommitmentTracker::new(
        config.strategy,
        config.round_timeout(),
        config.poll_interval(),
        commit_targets,
        poll_target,
    );
    let runner = RoundRunner::new(
        write_target,
        read_target,
        config.contract.clone(),
        config.seed,
    );
    let orchestrator = Orchestrator::new(
        config.counts.clone(),
        config.repetitions,
        config.round_ceiling(),
        runner,
        tracker,
    );

    info!("Start sending transactions");
    let run_report = orchestrator.run().await;

    report::log_summary(&run_report);
    if let Some(path) = &config.report_path {
        report::write(&run_report, path)?;
    }

    Ok(())
}
