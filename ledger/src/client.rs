use crate::error::LedgerError;
use crate::types::{BlockInfo, CommitEvent, ContractRef, Key, Operation, OperationHandle};
use async_trait::async_trait;
use tokio::sync::mpsc;

/// Client-side view of a single ledger replica. The benchmark core depends on
/// nothing else: submission, point reads, and the two commitment-confirmation
/// capabilities (event stream and latest-block polling).
#[async_trait]
pub trait ReplicaClient: Send + Sync {
    /// Stable identity of the replica, used as the subscription cache key.
    fn id(&self) -> &str;

    /// Submit a write. Returns the transaction handle once the replica has
    /// accepted the operation into its commitment pipeline.
    async fn submit(
        &self,
        contract: &ContractRef,
        op: &Operation,
    ) -> Result<OperationHandle, LedgerError>;

    /// Point read. `None` means not found; reading a key before its write
    /// commits is a normal outcome, not an error.
    async fn query(
        &self,
        contract: &ContractRef,
        key: &Key,
    ) -> Result<Option<Vec<u8>>, LedgerError>;

    /// Transaction handles included in the replica's latest block.
    async fn latest_block(&self) -> Result<BlockInfo, LedgerError>;

    /// Open a persistent commitment event stream. The caller owns the
    /// receiver; at most one subscription per replica should be live.
    async fn subscribe_commits(&self) -> Result<mpsc::Receiver<CommitEvent>, LedgerError>;
}
