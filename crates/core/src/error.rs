//! Error of ringlet_core

/// A wrap `Result` contains custom errors.
pub type Result<T> = std::result::Result<T, Error>;

/// Errors collections in ringlet-core.
#[derive(thiserror::Error, Debug)]
#[non_exhaustive]
pub enum Error {
    #[error("IOError: {0}")]
    IOError(#[from] std::io::Error),

    #[error("Could not bind listener on {addr}")]
    Bind {
        addr: String,
        #[source]
        source: std::io::Error,
    },

    #[error("Peer {peer} unreachable: {source}")]
    PeerUnreachable {
        peer: String,
        #[source]
        source: std::io::Error,
    },

    #[error("Timed out connecting to {0}")]
    ConnectTimeout(String),

    #[error("Timed out waiting for a reply from {0}")]
    ReplyTimeout(String),

    #[error("Peer {0} closed the connection before replying")]
    ConnectionClosed(String),

    #[error("Invalid ring id {0:?}")]
    InvalidRingId(String),

    #[error("Malformed command line {0:?}")]
    MalformedCommand(String),

    #[error("Malformed reply line {0:?}")]
    MalformedReply(String),

    #[error("Lookup did not resolve to a node")]
    LookupFailed,

    #[error("Node state lock poisoned")]
    StatePoisoned,
}
