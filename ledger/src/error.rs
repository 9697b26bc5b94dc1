use thiserror::Error;

#[derive(Debug, Error)]
pub enum LedgerError {
    #[error("submission rejected: {reason}")]
    Submission { reason: String },

    #[error("query failed: {reason}")]
    Query { reason: String },

    #[error("subscription failed: {reason}")]
    Subscription { reason: String },

    #[error("connection error: {0}")]
    Connection(#[from] std::io::Error),

    #[error("codec error: {0}")]
    Codec(#[from] bincode::Error),

    #[error("unexpected message from replica: {reason}")]
    Protocol { reason: String },
}
