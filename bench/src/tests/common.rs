use async_trait::async_trait;
use ledger::{
    BlockInfo, CommitEvent, CommitStatus, ContractRef, Key, LedgerError, Operation,
    OperationHandle, ReplicaClient,
};
use std::collections::{HashMap, VecDeque};
use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};
use std::sync::Mutex;
use tokio::sync::mpsc;

pub fn contract() -> ContractRef {
    ContractRef {
        name: "timestamping".into(),
        version: "v1".into(),
    }
}

pub fn handle(tag: u8) -> OperationHandle {
    OperationHandle::from_bytes([tag; 32])
}

const INVALID_CODE: u8 = 11;

/// Scripted in-memory replica. Knobs select which failure the test injects;
/// by default every accepted write is applied.
pub struct MockReplica {
    id: String,
    auto_commit: bool,
    serve_blocks: bool,
    hang_blocks: bool,
    commit_limit: Option<usize>,
    invalid_from: Option<usize>,
    reject_from: Option<usize>,
    stall_budget: AtomicUsize,
    attempts: AtomicUsize,
    next_ts: AtomicU64,
    submitted: Mutex<Vec<OperationHandle>>,
    store: Mutex<HashMap<Key, u64>>,
    commit_tx: Mutex<Option<mpsc::Sender<CommitEvent>>>,
    // Events emitted before any subscription exists are held back and
    // flushed when the subscriber arrives.
    pending_events: Mutex<Vec<CommitEvent>>,
    scripted_events: Mutex<Option<mpsc::Receiver<CommitEvent>>>,
    scripted_blocks: Mutex<VecDeque<Result<BlockInfo, LedgerError>>>,
    pub subscribe_count: AtomicUsize,
}

impl MockReplica {
    pub fn new(id: &str) -> Self {
        MockReplica {
            id: id.to_string(),
            auto_commit: false,
            serve_blocks: false,
            hang_blocks: false,
            commit_limit: None,
            invalid_from: None,
            reject_from: None,
            stall_budget: AtomicUsize::new(0),
            attempts: AtomicUsize::new(0),
            next_ts: AtomicU64::new(1),
            submitted: Mutex::new(Vec::new()),
            store: Mutex::new(HashMap::new()),
            commit_tx: Mutex::new(None),
            pending_events: Mutex::new(Vec::new()),
            scripted_events: Mutex::new(None),
            scripted_blocks: Mutex::new(VecDeque::new()),
            subscribe_count: AtomicUsize::new(0),
        }
    }

    /// Emit a commitment event for every accepted submission.
    pub fn auto_commit(mut self) -> Self {
        self.auto_commit = true;
        self
    }

    /// Expose accepted submissions through `latest_block`.
    pub fn serve_blocks(mut self) -> Self {
        self.serve_blocks = true;
        self
    }

    /// `latest_block` accepts the call but never answers.
    pub fn hang_blocks(mut self) -> Self {
        self.hang_blocks = true;
        self
    }

    /// Stop emitting commitment events after this many submissions.
    pub fn commit_limit(mut self, limit: usize) -> Self {
        self.commit_limit = Some(limit);
        self
    }

    /// Submissions at or past this index commit with an invalid code.
    pub fn invalid_from(mut self, index: usize) -> Self {
        self.invalid_from = Some(index);
        self
    }

    /// Submissions at or past this index are rejected outright.
    pub fn reject_from(mut self, index: usize) -> Self {
        self.reject_from = Some(index);
        self
    }

    /// `subscribe_commits` hands out this receiver; the test keeps the sender.
    pub fn scripted_events(self, rx: mpsc::Receiver<CommitEvent>) -> Self {
        *self.scripted_events.lock().unwrap() = Some(rx);
        self
    }

    /// The next `stall` submissions park forever (cancelled by the caller's
    /// timeout); later ones proceed normally.
    pub fn stall_next(&self, stall: usize) {
        self.stall_budget.store(stall, Ordering::SeqCst);
    }

    /// Queue one `latest_block` response.
    pub fn push_block(&self, block: Result<BlockInfo, LedgerError>) {
        self.scripted_blocks.lock().unwrap().push_back(block);
    }

    fn emit(&self, event: CommitEvent) {
        let tx = self.commit_tx.lock().unwrap();
        match tx.as_ref() {
            Some(tx) => {
                let _ = tx.try_send(event);
            }
            None => self.pending_events.lock().unwrap().push(event),
        }
    }
}

#[async_trait]
impl ReplicaClient for MockReplica {
    fn id(&self) -> &str {
        &self.id
    }

    async fn submit(
        &self,
        _contract: &ContractRef,
        op: &Operation,
    ) -> Result<OperationHandle, LedgerError> {
        loop {
            let budget = self.stall_budget.load(Ordering::SeqCst);
            if budget == 0 {
                break;
            }
            if self
                .stall_budget
                .compare_exchange(budget, budget - 1, Ordering::SeqCst, Ordering::SeqCst)
                .is_ok()
            {
                futures::future::pending::<()>().await;
            }
        }

        let index = self.attempts.fetch_add(1, Ordering::SeqCst);
        if let Some(from) = self.reject_from {
            if index >= from {
                return Err(LedgerError::Submission {
                    reason: "endorsement refused".into(),
                });
            }
        }

        let handle = OperationHandle::from_bytes(*op.key.as_bytes());
        self.submitted.lock().unwrap().push(handle);

        let status = match self.invalid_from {
            Some(from) if index >= from => CommitStatus(INVALID_CODE),
            _ => CommitStatus::VALID,
        };
        let emits_event = self.commit_limit.map_or(true, |limit| index < limit);
        let applied = status.is_valid() && (self.serve_blocks || (self.auto_commit && emits_event));
        if applied {
            let ts = self.next_ts.fetch_add(1, Ordering::SeqCst);
            self.store.lock().unwrap().insert(op.key, ts);
        }
        if self.auto_commit && emits_event {
            self.emit(CommitEvent { handle, status });
        }
        Ok(handle)
    }

    async fn query(
        &self,
        _contract: &ContractRef,
        key: &Key,
    ) -> Result<Option<Vec<u8>>, LedgerError> {
        Ok(self
            .store
            .lock()
            .unwrap()
            .get(key)
            .map(|ts| ts.to_be_bytes().to_vec()))
    }

    async fn latest_block(&self) -> Result<BlockInfo, LedgerError> {
        if self.hang_blocks {
            futures::future::pending::<()>().await;
        }
        if let Some(scripted) = self.scripted_blocks.lock().unwrap().pop_front() {
            return scripted;
        }
        if self.serve_blocks {
            let submitted = self.submitted.lock().unwrap();
            return Ok(BlockInfo {
                height: submitted.len() as u64,
                handles: submitted.clone(),
            });
        }
        Ok(BlockInfo {
            height: 0,
            handles: Vec::new(),
        })
    }

    async fn subscribe_commits(&self) -> Result<mpsc::Receiver<CommitEvent>, LedgerError> {
        self.subscribe_count.fetch_add(1, Ordering::SeqCst);
        if let Some(rx) = self.scripted_events.lock().unwrap().take() {
            return Ok(rx);
        }
        let (tx, rx) = mpsc::channel(1_000);
        for event in self.pending_events.lock().unwrap().drain(..) {
            let _ = tx.try_send(event);
        }
        *self.commit_tx.lock().unwrap() = Some(tx);
        Ok(rx)
    }
}
