use rand::Rng;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::time::SystemTime;

/// Fixed-size random identifier under which a value is stored on the ledger.
/// 32 bytes of entropy makes collisions within a benchmark run negligible.
#[derive(Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct Key([u8; 32]);

impl Key {
    pub fn random<R: Rng>(rng: &mut R) -> Self {
        let mut bytes = [0u8; 32];
        rng.fill(&mut bytes[..]);
        Key(bytes)
    }

    pub fn from_bytes(bytes: [u8; 32]) -> Self {
        Key(bytes)
    }

    pub fn as_bytes(&self) -> &[u8; 32] {
        &self.0
    }
}

impl fmt::Display for Key {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for byte in &self.0 {
            write!(f, "{:02x}", byte)?;
        }
        Ok(())
    }
}

impl fmt::Debug for Key {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Key({})", self)
    }
}

/// Opaque identifier correlating a submitted write to its commitment event.
/// This is the replica's transaction id for the submission.
#[derive(Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct OperationHandle([u8; 32]);

impl OperationHandle {
    pub fn from_bytes(bytes: [u8; 32]) -> Self {
        OperationHandle(bytes)
    }

    pub fn as_bytes(&self) -> &[u8; 32] {
        &self.0
    }
}

impl fmt::Display for OperationHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for byte in &self.0 {
            write!(f, "{:02x}", byte)?;
        }
        Ok(())
    }
}

impl fmt::Debug for OperationHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "OperationHandle({})", self)
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum OpKind {
    Put,
    Get,
}

/// A unit of benchmark work. Immutable once created.
#[derive(Clone, Copy, Debug)]
pub struct Operation {
    pub kind: OpKind,
    pub key: Key,
    pub created_at: SystemTime,
}

impl Operation {
    pub fn put(key: Key) -> Self {
        Operation {
            kind: OpKind::Put,
            key,
            created_at: SystemTime::now(),
        }
    }

    pub fn get(key: Key) -> Self {
        Operation {
            kind: OpKind::Get,
            key,
            created_at: SystemTime::now(),
        }
    }
}

/// Validation code a replica attaches to a committed transaction.
/// Zero is the success sentinel; anything else names a failure reason.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct CommitStatus(pub u8);

impl CommitStatus {
    pub const VALID: CommitStatus = CommitStatus(0);

    pub fn is_valid(self) -> bool {
        self == Self::VALID
    }

    pub fn code(self) -> u8 {
        self.0
    }
}

/// Commitment notification pushed over a replica's event stream.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct CommitEvent {
    pub handle: OperationHandle,
    pub status: CommitStatus,
}

/// Summary of the latest block, as returned by the polling interface.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct BlockInfo {
    pub height: u64,
    pub handles: Vec<OperationHandle>,
}

/// Terminal fate of a submitted operation. Produced exactly once per handle.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum CommitmentOutcome {
    Committed { at: SystemTime },
    TimedOut,
    Invalid { code: u8 },
}

impl CommitmentOutcome {
    pub fn is_committed(&self) -> bool {
        matches!(self, CommitmentOutcome::Committed { .. })
    }
}

/// Reference to the deployed contract the benchmark drives.
/// Deployment itself happens before the run; this is an opaque handle.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ContractRef {
    pub name: String,
    pub version: String,
}

impl fmt::Display for ContractRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.name, self.version)
    }
}
