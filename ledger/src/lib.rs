mod client;
mod error;
mod tcp;
mod types;
pub mod wire;

pub use crate::client::ReplicaClient;
pub use crate::error::LedgerError;
pub use crate::tcp::{wait_until_reachable, TcpReplica};
pub use crate::types::{
    BlockInfo, CommitEvent, CommitStatus, CommitmentOutcome, ContractRef, Key, OpKind, Operation,
    OperationHandle,
};
