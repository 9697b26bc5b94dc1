//! Sequences the full benchmark run: an explicit task queue of rounds drained
//! strictly one at a time, each inside a cancellable timeout scope, followed
//! by aggregation over whatever subset of rounds produced a result.

use crate::round::{RoundResult, RoundRunner};
use crate::tracker::CommitmentTracker;
use log::{error, info};
use serde::Serialize;
use std::collections::HashMap;
use tokio::time::{timeout, Duration};

/// Mean latencies for one distinct configured count.
#[derive(Clone, Debug, Serialize)]
pub struct AggregateStat {
    pub count: usize,
    pub mean_put_ms: f64,
    pub mean_get_ms: f64,
    pub samples: usize,
}

/// Structured output of a whole run, ready for serialization.
#[derive(Clone, Debug, Serialize)]
pub struct RunReport {
    pub rounds: Vec<RoundResult>,
    pub aggregates: Vec<AggregateStat>,
    /// Writes accepted into the commitment pipeline across the run.
    pub submitted_total: usize,
    pub abandoned_rounds: usize,
}

pub struct Orchestrator {
    counts: Vec<usize>,
    repetitions: usize,
    round_ceiling: Duration,
    runner: RoundRunner,
    tracker: CommitmentTracker,
}

impl Orchestrator {
    pub fn new(
        counts: Vec<usize>,
        repetitions: usize,
        round_ceiling: Duration,
        runner: RoundRunner,
        tracker: CommitmentTracker,
    ) -> Self {
        Orchestrator {
            counts,
            repetitions,
            round_ceiling,
            runner,
            tracker,
        }
    }

    /// Pass-major task order: the whole count list, repeated. [8,16] x 2
    /// yields [8,16,8,16].
    fn task_queue(&self) -> Vec<usize> {
        let mut queue = Vec::with_capacity(self.counts.len() * self.repetitions);
        for _ in 0..self.repetitions {
            queue.extend_from_slice(&self.counts);
        }
        queue
    }

    pub async fn run(mut self) -> RunReport {
        let queue = self.task_queue();
        let total = queue.len();
        let mut results: Vec<RoundResult> = Vec::with_capacity(total);
        let mut abandoned_rounds = 0;

        for (index, count) in queue.into_iter().enumerate() {
            info!("starting round {}/{} with {} ops", index + 1, total, count);
            match timeout(self.round_ceiling, self.runner.run(count, &mut self.tracker)).await {
                Ok(result) => results.push(result),
                Err(_) => {
                    // A stuck round must never block the rest of the run.
                    error!(
                        "round {}/{} with {} ops exceeded the {} ms ceiling, abandoning",
                        index + 1,
                        total,
                        count,
                        self.round_ceiling.as_millis()
                    );
                    abandoned_rounds += 1;
                }
            }
        }

        let aggregates = aggregate(&results);
        let submitted_total = results
            .iter()
            .map(|round| round.configured_count - round.failed_submissions)
            .sum();

        RunReport {
            rounds: results,
            aggregates,
            submitted_total,
            abandoned_rounds,
        }
    }
}

/// Mean put/get latency per distinct count, in first-appearance order,
/// computed over a snapshot of the completed rounds.
pub fn aggregate(rounds: &[RoundResult]) -> Vec<AggregateStat> {
    let mut order: Vec<usize> = Vec::new();
    let mut buckets: HashMap<usize, Vec<&RoundResult>> = HashMap::new();
    for round in rounds {
        let bucket = buckets.entry(round.configured_count).or_default();
        if bucket.is_empty() {
            order.push(round.configured_count);
        }
        bucket.push(round);
    }

    order
        .into_iter()
        .map(|count| {
            let bucket = &buckets[&count];
            let samples = bucket.len();
            AggregateStat {
                count,
                mean_put_ms: bucket.iter().map(|r| r.put_latency_ms as f64).sum::<f64>()
                    / samples as f64,
                mean_get_ms: bucket.iter().map(|r| r.get_latency_ms as f64).sum::<f64>()
                    / samples as f64,
                samples,
            }
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn round(count: usize, put_ms: u64, get_ms: u64) -> RoundResult {
        RoundResult {
            configured_count: count,
            put_latency_ms: put_ms,
            get_latency_ms: get_ms,
            committed_writes: count,
            committed_reads: count,
            timed_out: 0,
            invalid: 0,
            failed_submissions: 0,
            timestamps: vec![Some(1); count],
        }
    }

    #[test]
    fn aggregate_groups_by_count_in_first_appearance_order() {
        let rounds = vec![
            round(8, 100, 10),
            round(16, 300, 30),
            round(8, 200, 20),
            round(16, 500, 50),
        ];
        let stats = aggregate(&rounds);
        assert_eq!(stats.len(), 2);
        assert_eq!(stats[0].count, 8);
        assert_eq!(stats[0].samples, 2);
        assert!((stats[0].mean_put_ms - 150.0).abs() < f64::EPSILON);
        assert!((stats[0].mean_get_ms - 15.0).abs() < f64::EPSILON);
        assert_eq!(stats[1].count, 16);
        assert!((stats[1].mean_put_ms - 400.0).abs() < f64::EPSILON);
    }

    #[test]
    fn aggregate_of_no_rounds_is_empty() {
        assert!(aggregate(&[]).is_empty());
    }
}
