//! Wire protocol spoken to replica endpoints: bincode-encoded messages in
//! length-delimited frames.

use crate::error::LedgerError;
use crate::types::{BlockInfo, CommitEvent, ContractRef, Key, OperationHandle};
use bytes::Bytes;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};

#[derive(Clone, Debug, Serialize, Deserialize)]
pub enum Request {
    Submit { contract: ContractRef, key: Key },
    Query { contract: ContractRef, key: Key },
    LatestBlock,
    Subscribe,
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub enum Response {
    Accepted { handle: OperationHandle },
    Rejected { code: u8 },
    Value { value: Option<Vec<u8>> },
    Block(BlockInfo),
    Subscribed,
    Commit(CommitEvent),
}

pub fn encode<T: Serialize>(message: &T) -> Result<Bytes, LedgerError> {
    Ok(Bytes::from(bincode::serialize(message)?))
}

pub fn decode<T: DeserializeOwned>(frame: &[u8]) -> Result<T, LedgerError> {
    Ok(bincode::deserialize(frame)?)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::CommitStatus;

    #[test]
    fn submit_request_roundtrip() {
        let request = Request::Submit {
            contract: ContractRef {
                name: "timestamping".into(),
                version: "v1".into(),
            },
            key: Key::from_bytes([3; 32]),
        };
        let frame = encode(&request).unwrap();
        match decode::<Request>(&frame).unwrap() {
            Request::Submit { contract, key } => {
                assert_eq!(contract.name, "timestamping");
                assert_eq!(key, Key::from_bytes([3; 32]));
            }
            other => panic!("decoded wrong variant: {:?}", other),
        }
    }

    #[test]
    fn commit_event_roundtrip() {
        let response = Response::Commit(CommitEvent {
            handle: OperationHandle::from_bytes([9; 32]),
            status: CommitStatus::VALID,
        });
        let frame = encode(&response).unwrap();
        match decode::<Response>(&frame).unwrap() {
            Response::Commit(event) => {
                assert_eq!(event.handle, OperationHandle::from_bytes([9; 32]));
                assert!(event.status.is_valid());
            }
            other => panic!("decoded wrong variant: {:?}", other),
        }
    }
}
