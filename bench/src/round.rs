//! One benchmark round: submit N writes concurrently, wait for commitment,
//! read the N values back, fold everything into a `RoundResult`.

use crate::tracker::CommitmentTracker;
use futures::future::join_all;
use ledger::{CommitmentOutcome, ContractRef, Key, Operation, ReplicaClient};
use log::{debug, info, warn};
use rand::rngs::StdRng;
use rand::SeedableRng;
use serde::Serialize;
use std::collections::HashSet;
use std::fmt;
use std::sync::Arc;
use tokio::time::Instant;

/// One-directional round lifecycle, logged as the round progresses.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum RoundPhase {
    Pending,
    Submitting,
    AwaitingCommitment,
    Reading,
    Completed,
}

impl fmt::Display for RoundPhase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            RoundPhase::Pending => "pending",
            RoundPhase::Submitting => "submitting",
            RoundPhase::AwaitingCommitment => "awaiting-commitment",
            RoundPhase::Reading => "reading",
            RoundPhase::Completed => "completed",
        };
        write!(f, "{}", name)
    }
}

/// Immutable outcome of one round. Counts always conserve the configured
/// total: committed + timed out + invalid + failed submissions.
#[derive(Clone, Debug, Serialize)]
pub struct RoundResult {
    pub configured_count: usize,
    pub put_latency_ms: u64,
    pub get_latency_ms: u64,
    pub committed_writes: usize,
    pub committed_reads: usize,
    pub timed_out: usize,
    pub invalid: usize,
    pub failed_submissions: usize,
    /// Raw read values decoded as big-endian timestamps; `None` for keys
    /// that were missing, unreadable, or still unset.
    pub timestamps: Vec<Option<u64>>,
}

pub struct RoundRunner {
    write_target: Arc<dyn ReplicaClient>,
    read_target: Arc<dyn ReplicaClient>,
    contract: ContractRef,
    rng: StdRng,
    // Keys already used by this run's write set; never reused.
    used_keys: HashSet<Key>,
}

impl RoundRunner {
    pub fn new(
        write_target: Arc<dyn ReplicaClient>,
        read_target: Arc<dyn ReplicaClient>,
        contract: ContractRef,
        seed: Option<u64>,
    ) -> Self {
        let rng = match seed {
            Some(seed) => StdRng::seed_from_u64(seed),
            None => StdRng::from_entropy(),
        };
        RoundRunner {
            write_target,
            read_target,
            contract,
            rng,
            used_keys: HashSet::new(),
        }
    }

    fn generate_keys(&mut self, count: usize) -> Vec<Key> {
        let mut keys = Vec::with_capacity(count);
        while keys.len() < count {
            let key = Key::random(&mut self.rng);
            if self.used_keys.insert(key) {
                keys.push(key);
            }
        }
        keys
    }

    /// Run one round. Never fails: every per-operation error is folded into
    /// the result so the orchestrator's sequencing is never interrupted.
    pub async fn run(&mut self, count: usize, tracker: &mut CommitmentTracker) -> RoundResult {
        let mut phase = RoundPhase::Pending;
        debug!("round of {} ops {}", count, phase);

        let keys = self.generate_keys(count);
        let operations: Vec<Operation> = keys.iter().map(|key| Operation::put(*key)).collect();

        // The start timestamp is captured strictly before the first submission.
        phase = RoundPhase::Submitting;
        debug!("round of {} ops {}", count, phase);
        let put_start = Instant::now();
        let submissions = join_all(
            operations
                .iter()
                .map(|op| self.write_target.submit(&self.contract, op)),
        )
        .await;

        let mut handles = Vec::with_capacity(count);
        let mut failed_submissions = 0;
        for (op, submission) in operations.iter().zip(submissions) {
            match submission {
                Ok(handle) => handles.push(handle),
                Err(e) => {
                    warn!("submission of {} failed: {}", op.key, e);
                    failed_submissions += 1;
                }
            }
        }

        phase = RoundPhase::AwaitingCommitment;
        debug!("round of {} ops {}", count, phase);
        let outcomes = tracker.await_commitment(&handles).await;
        let put_latency_ms = put_start.elapsed().as_millis() as u64;

        let mut committed_writes = 0;
        let mut timed_out = 0;
        let mut invalid = 0;
        for outcome in outcomes.values() {
            match outcome {
                CommitmentOutcome::Committed { .. } => committed_writes += 1,
                CommitmentOutcome::TimedOut => timed_out += 1,
                CommitmentOutcome::Invalid { code } => {
                    warn!("a write committed with invalid code {}", code);
                    invalid += 1;
                }
            }
        }
        if committed_writes < count {
            warn!("{} of {} commits confirmed", committed_writes, count);
        }

        phase = RoundPhase::Reading;
        debug!("round of {} ops {}", count, phase);
        let get_start = Instant::now();
        let reads = join_all(
            keys.iter()
                .map(|key| self.read_target.query(&self.contract, key)),
        )
        .await;
        let get_latency_ms = get_start.elapsed().as_millis() as u64;

        let timestamps: Vec<Option<u64>> = keys
            .iter()
            .zip(reads)
            .map(|(key, read)| match read {
                Ok(Some(value)) => decode_timestamp(&value),
                Ok(None) => None,
                Err(e) => {
                    warn!("read of {} failed: {}", key, e);
                    None
                }
            })
            .collect();
        let committed_reads = timestamps.iter().filter(|ts| ts.is_some()).count();

        phase = RoundPhase::Completed;
        info!(
            "round of {} ops {}: put {} ms, get {} ms, {} writes and {} reads confirmed",
            count, phase, put_latency_ms, get_latency_ms, committed_writes, committed_reads
        );

        RoundResult {
            configured_count: count,
            put_latency_ms,
            get_latency_ms,
            committed_writes,
            committed_reads,
            timed_out,
            invalid,
            failed_submissions,
            timestamps,
        }
    }
}

/// The timestamping contract stores an 8-byte big-endian commit timestamp
/// per key; zero means the write has not been applied yet.
fn decode_timestamp(value: &[u8]) -> Option<u64> {
    let bytes: [u8; 8] = value.get(..8)?.try_into().ok()?;
    let timestamp = u64::from_be_bytes(bytes);
    (timestamp != 0).then(|| timestamp)
}
