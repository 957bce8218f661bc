use thiserror::Error;

/// Errors raised while probing or scoring a single FTP host.
#[derive(Debug, Error)]
pub enum ScanError {
    /// No complete reply arrived before the read deadline. The connection
    /// must be re-established before another command is sent.
    #[error("timed out waiting for a reply, reconnect required")]
    TransportTimeout,

    /// The peer closed the connection or a write failed.
    #[error("connection lost")]
    ConnectionLost,

    #[error("unparsable reply: {0}")]
    UnparsableReply(String),

    /// Every signature scored the same error; no candidate can be preferred.
    #[error("ambiguous match: all signatures scored identically")]
    AmbiguousMatch,

    #[error("invalid signature database: {0}")]
    InvalidSignatureDb(String),

    #[error(transparent)]
    Io(#[from] std::io::Error),

    #[error(transparent)]
    Json(#[from] serde_json::Error),
}

impl ScanError {
    /// Whether the transport has to reconnect before the next command.
    pub fn requires_reconnect(&self) -> bool {
        matches!(self, ScanError::TransportTimeout | ScanError::ConnectionLost)
    }
}

pub type ScanResult<T> = std::result::Result<T, ScanError>;
