//! Commitment confirmation: resolving submitted operation handles to terminal
//! outcomes within a deadline.
//!
//! Two interchangeable strategies. `Events` subscribes to each commit
//! replica's event stream and checks the validation code carried by every
//! event, so it can distinguish invalid commitments from timeouts. `Polling`
//! only checks block inclusion on one replica, so everything it does not see
//! in a block by the deadline is reported as timed out. `Events` is the
//! default.

use futures::future::join_all;
use futures::stream::{FuturesUnordered, StreamExt};
use ledger::{CommitEvent, CommitStatus, CommitmentOutcome, OperationHandle, ReplicaClient};
use log::{debug, error, warn};
use serde::{Deserialize, Serialize};
use std::collections::{HashMap, HashSet};
use std::str::FromStr;
use std::sync::{Arc, Mutex};
use std::time::SystemTime;
use tokio::sync::oneshot;
use tokio::task::JoinHandle;
use tokio::time::{interval, timeout_at, Duration, Instant};

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Strategy {
    Events,
    Polling,
}

impl FromStr for Strategy {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "events" => Ok(Strategy::Events),
            "polling" | "poll" => Ok(Strategy::Polling),
            other => Err(format!(
                "unknown strategy '{}', expected 'events' or 'polling'",
                other
            )),
        }
    }
}

type Registry = Arc<Mutex<HashMap<OperationHandle, oneshot::Sender<CommitEvent>>>>;

/// One live event subscription to a replica, reused across rounds.
struct Subscription {
    listeners: Registry,
    dispatcher: JoinHandle<()>,
}

impl Drop for Subscription {
    fn drop(&mut self) {
        self.dispatcher.abort();
    }
}

pub struct CommitmentTracker {
    strategy: Strategy,
    deadline: Duration,
    poll_interval: Duration,
    commit_targets: Vec<Arc<dyn ReplicaClient>>,
    poll_target: Arc<dyn ReplicaClient>,
    // One subscription per replica, opened lazily, keyed by replica identity.
    subscriptions: HashMap<String, Subscription>,
}

impl CommitmentTracker {
    pub fn new(
        strategy: Strategy,
        deadline: Duration,
        poll_interval: Duration,
        commit_targets: Vec<Arc<dyn ReplicaClient>>,
        poll_target: Arc<dyn ReplicaClient>,
    ) -> Self {
        CommitmentTracker {
            strategy,
            deadline,
            poll_interval,
            commit_targets,
            poll_target,
            subscriptions: HashMap::new(),
        }
    }

    /// Resolve every handle to exactly one terminal outcome. Always returns a
    /// full mapping; partial commitment shows up as `TimedOut`/`Invalid`
    /// entries, never as a missing one.
    pub async fn await_commitment(
        &mut self,
        handles: &[OperationHandle],
    ) -> HashMap<OperationHandle, CommitmentOutcome> {
        if handles.is_empty() {
            return HashMap::new();
        }
        match self.strategy {
            Strategy::Events => self.wait_events(handles).await,
            Strategy::Polling => self.wait_polling(handles).await,
        }
    }

    async fn ensure_subscription(
        &mut self,
        replica: &Arc<dyn ReplicaClient>,
    ) -> Result<Registry, ledger::LedgerError> {
        let id = replica.id().to_string();
        if let Some(subscription) = self.subscriptions.get(&id) {
            return Ok(subscription.listeners.clone());
        }

        let mut events = replica.subscribe_commits().await?;
        let listeners: Registry = Arc::new(Mutex::new(HashMap::new()));
        let routing = listeners.clone();
        let stream_id = id.clone();
        let dispatcher = tokio::spawn(async move {
            while let Some(event) = events.recv().await {
                // Removing the listener under the lock is what makes
                // resolution idempotent: a late event for an already
                // timed-out handle finds no entry and is dropped here.
                let listener = routing.lock().unwrap().remove(&event.handle);
                match listener {
                    Some(tx) => {
                        let _ = tx.send(event);
                    }
                    None => debug!(
                        "ignoring event from {} for unknown or resolved handle {}",
                        stream_id, event.handle
                    ),
                }
            }
            debug!("event stream from {} ended", stream_id);
        });

        self.subscriptions.insert(
            id,
            Subscription {
                listeners: listeners.clone(),
                dispatcher,
            },
        );
        Ok(listeners)
    }

    async fn wait_events(
        &mut self,
        handles: &[OperationHandle],
    ) -> HashMap<OperationHandle, CommitmentOutcome> {
        let targets = self.commit_targets.clone();
        let mut registries = Vec::new();
        for replica in &targets {
            match self.ensure_subscription(replica).await {
                Ok(registry) => registries.push(registry),
                Err(e) => error!("cannot subscribe to {}: {}", replica.id(), e),
            }
        }
        if registries.is_empty() {
            warn!("no commit replica reachable, whole batch will time out");
            return handles
                .iter()
                .map(|handle| (*handle, CommitmentOutcome::TimedOut))
                .collect();
        }

        let deadline = Instant::now() + self.deadline;
        let waits = handles.iter().map(|&handle| {
            let arms: Vec<_> = registries
                .iter()
                .map(|registry| {
                    let (tx, rx) = oneshot::channel();
                    registry.lock().unwrap().insert(handle, tx);
                    listen_one(registry.clone(), handle, rx, deadline)
                })
                .collect();
            async move {
                let mut arms: FuturesUnordered<_> = arms.into_iter().collect();
                let mut observations = Vec::with_capacity(arms.len());
                let mut invalid = None;
                while let Some(observation) = arms.next().await {
                    match observation {
                        Some(status) if !status.is_valid() => {
                            invalid = Some(CommitmentOutcome::Invalid {
                                code: status.code(),
                            });
                            break;
                        }
                        other => observations.push(other),
                    }
                }
                // A non-success code settles the handle at once; dropping the
                // remaining arms unregisters their listeners.
                drop(arms);
                let outcome = invalid.unwrap_or_else(|| fold_outcome(observations));
                (handle, outcome)
            }
        });
        join_all(waits).await.into_iter().collect()
    }

    async fn wait_polling(
        &mut self,
        handles: &[OperationHandle],
    ) -> HashMap<OperationHandle, CommitmentOutcome> {
        let deadline = Instant::now() + self.deadline;
        let mut state = PollState::new(handles);
        let mut ticker = interval(self.poll_interval);

        while !state.done() {
            if timeout_at(deadline, ticker.tick()).await.is_err() {
                break;
            }
            // The deadline bounds the poll call itself too: a replica that
            // accepts the connection but never answers must not pin the wait.
            match timeout_at(deadline, self.poll_target.latest_block()).await {
                Err(_) => break,
                Ok(Ok(block)) => {
                    state.observe(&block.handles);
                    debug!(
                        "block {} on {}: {} handles still outstanding",
                        block.height,
                        self.poll_target.id(),
                        state.outstanding()
                    );
                }
                Ok(Err(e)) => warn!(
                    "block poll on {} failed, retrying next tick: {}",
                    self.poll_target.id(),
                    e
                ),
            }
        }
        state.into_outcomes()
    }

    #[cfg(test)]
    pub(crate) fn registered_listeners(&self) -> usize {
        self.subscriptions
            .values()
            .map(|subscription| subscription.listeners.lock().unwrap().len())
            .sum()
    }
}

/// Unregisters a listener when its wait ends for any reason: event delivery
/// (a no-op, the dispatcher already removed it), deadline, or cancellation of
/// the whole round. No registration outlives its owning wait.
struct ListenerGuard {
    registry: Registry,
    handle: OperationHandle,
}

impl Drop for ListenerGuard {
    fn drop(&mut self) {
        self.registry.lock().unwrap().remove(&self.handle);
    }
}

/// Wait for one handle's event from one replica. Once this future is done or
/// dropped the listener is unregistered, so the dispatcher drops any event
/// that arrives late.
async fn listen_one(
    registry: Registry,
    handle: OperationHandle,
    rx: oneshot::Receiver<CommitEvent>,
    deadline: Instant,
) -> Option<CommitStatus> {
    let _guard = ListenerGuard { registry, handle };
    match timeout_at(deadline, rx).await {
        Ok(Ok(event)) => Some(event.status),
        // The dispatcher went away without delivering; treat as no event.
        Ok(Err(_)) => None,
        Err(_) => None,
    }
}

/// Combine per-replica observations for one handle: any invalid code wins,
/// otherwise committed only if every replica confirmed in time.
fn fold_outcome(observations: Vec<Option<CommitStatus>>) -> CommitmentOutcome {
    let mut all_valid = !observations.is_empty();
    for observation in &observations {
        match observation {
            Some(status) if status.is_valid() => {}
            Some(status) => return CommitmentOutcome::Invalid {
                code: status.code(),
            },
            None => all_valid = false,
        }
    }
    if all_valid {
        CommitmentOutcome::Committed {
            at: SystemTime::now(),
        }
    } else {
        CommitmentOutcome::TimedOut
    }
}

/// Tick-driven state of one polling wait: the outstanding set shrinks as
/// handles are seen in blocks, and is never re-grown.
pub struct PollState {
    outstanding: HashSet<OperationHandle>,
    seen: HashSet<OperationHandle>,
}

impl PollState {
    pub fn new(handles: &[OperationHandle]) -> Self {
        PollState {
            outstanding: handles.iter().copied().collect(),
            seen: HashSet::new(),
        }
    }

    pub fn observe(&mut self, block: &[OperationHandle]) {
        for handle in block {
            if self.outstanding.remove(handle) {
                self.seen.insert(*handle);
            }
        }
    }

    pub fn done(&self) -> bool {
        self.outstanding.is_empty()
    }

    pub fn outstanding(&self) -> usize {
        self.outstanding.len()
    }

    pub fn into_outcomes(self) -> HashMap<OperationHandle, CommitmentOutcome> {
        let committed_at = SystemTime::now();
        self.seen
            .into_iter()
            .map(|handle| (handle, CommitmentOutcome::Committed { at: committed_at }))
            .chain(
                self.outstanding
                    .into_iter()
                    .map(|handle| (handle, CommitmentOutcome::TimedOut)),
            )
            .collect()
    }
}
