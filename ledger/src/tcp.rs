use crate::client::ReplicaClient;
use crate::error::LedgerError;
use crate::types::{BlockInfo, CommitEvent, ContractRef, Key, Operation, OperationHandle};
use crate::wire::{self, Request, Response};
use async_trait::async_trait;
use futures::future::join_all;
use futures::sink::SinkExt as _;
use futures::StreamExt;
use log::{debug, warn};
use std::net::SocketAddr;
use tokio::net::TcpStream;
use tokio::sync::mpsc;
use tokio::time::{sleep, Duration};
use tokio_util::codec::{Framed, LengthDelimitedCodec};

const EVENT_CHANNEL_DEPTH: usize = 1_000;

/// A replica endpoint reached over TCP with length-delimited bincode frames.
/// Requests open a fresh connection each; subscriptions hold a dedicated one.
pub struct TcpReplica {
    addr: SocketAddr,
    id: String,
}

impl TcpReplica {
    pub fn new(addr: SocketAddr) -> Self {
        TcpReplica {
            addr,
            id: addr.to_string(),
        }
    }

    async fn request(&self, request: &Request) -> Result<Response, LedgerError> {
        let stream = TcpStream::connect(self.addr).await?;
        let mut transport = Framed::new(stream, LengthDelimitedCodec::new());
        transport.send(wire::encode(request)?).await?;
        match transport.next().await {
            Some(Ok(frame)) => wire::decode(&frame),
            Some(Err(e)) => Err(e.into()),
            None => Err(LedgerError::Protocol {
                reason: format!("{} closed the connection mid-request", self.addr),
            }),
        }
    }
}

#[async_trait]
impl ReplicaClient for TcpReplica {
    fn id(&self) -> &str {
        &self.id
    }

    async fn submit(
        &self,
        contract: &ContractRef,
        op: &Operation,
    ) -> Result<OperationHandle, LedgerError> {
        let request = Request::Submit {
            contract: contract.clone(),
            key: op.key,
        };
        match self.request(&request).await? {
            Response::Accepted { handle } => {
                debug!("{} accepted {} as {}", self.id, op.key, handle);
                Ok(handle)
            }
            Response::Rejected { code } => Err(LedgerError::Submission {
                reason: format!("endorsement rejected with code {}", code),
            }),
            other => Err(LedgerError::Protocol {
                reason: format!("unexpected submit response: {:?}", other),
            }),
        }
    }

    async fn query(
        &self,
        contract: &ContractRef,
        key: &Key,
    ) -> Result<Option<Vec<u8>>, LedgerError> {
        let request = Request::Query {
            contract: contract.clone(),
            key: *key,
        };
        match self.request(&request).await? {
            Response::Value { value } => Ok(value),
            Response::Rejected { code } => Err(LedgerError::Query {
                reason: format!("replica rejected the query with code {}", code),
            }),
            other => Err(LedgerError::Protocol {
                reason: format!("unexpected query response: {:?}", other),
            }),
        }
    }

    async fn latest_block(&self) -> Result<BlockInfo, LedgerError> {
        match self.request(&Request::LatestBlock).await? {
            Response::Block(info) => Ok(info),
            other => Err(LedgerError::Protocol {
                reason: format!("unexpected block response: {:?}", other),
            }),
        }
    }

    async fn subscribe_commits(&self) -> Result<mpsc::Receiver<CommitEvent>, LedgerError> {
        let stream = TcpStream::connect(self.addr).await?;
        let mut transport = Framed::new(stream, LengthDelimitedCodec::new());
        transport.send(wire::encode(&Request::Subscribe)?).await?;

        let (tx, rx) = mpsc::channel(EVENT_CHANNEL_DEPTH);
        let id = self.id.clone();
        tokio::spawn(async move {
            while let Some(frame) = transport.next().await {
                let frame = match frame {
                    Ok(frame) => frame,
                    Err(e) => {
                        warn!("event stream from {} broke: {}", id, e);
                        break;
                    }
                };
                match wire::decode::<Response>(&frame) {
                    Ok(Response::Commit(event)) => {
                        if tx.send(event).await.is_err() {
                            // Subscriber is gone.
                            break;
                        }
                    }
                    Ok(Response::Subscribed) => debug!("subscription to {} confirmed", id),
                    Ok(other) => warn!("ignoring non-event frame from {}: {:?}", id, other),
                    Err(e) => {
                        warn!("undecodable frame from {}: {}", id, e);
                        break;
                    }
                }
            }
            debug!("event stream from {} closed", id);
        });
        Ok(rx)
    }
}

/// Wait for all replica endpoints to be online before starting the benchmark.
pub async fn wait_until_reachable(addrs: &[SocketAddr]) {
    join_all(addrs.iter().cloned().map(|address| {
        tokio::spawn(async move {
            while TcpStream::connect(address).await.is_err() {
                sleep(Duration::from_millis(10)).await;
            }
        })
    }))
    .await;
}
