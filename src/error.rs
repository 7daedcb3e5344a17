//! Error taxonomy: caller mistakes are rejected synchronously, remote
//! failures are logged and retried by the poll loop.
use thiserror::Error;

/// Errors surfaced by the adapter and its chain source.
#[derive(Debug, Error)]
pub enum Error {
    /// Malformed caller-supplied data (bad hash, empty transaction).
    /// Rejected up front, never retried, no network call is made.
    #[error("invalid input: {0}")]
    InvalidInput(String),

    /// Transport-level failure reaching the remote service (connection
    /// refused, timeout). The poll loop retries on its next tick.
    #[error("remote service unavailable: {0}")]
    RemoteUnavailable(String),

    /// The service answered but reported failure: `success: false` in a
    /// response body, or a rejected broadcast.
    #[error("remote service rejected the request: {0}")]
    RemoteRejected(String),

    /// The response body could not be decoded at all. Per-item decode
    /// failures are skipped instead and never produce this error.
    #[error("undecodable remote response: {0}")]
    Decode(String),
}

/// Crate-wide result alias.
pub type Result<T> = std::result::Result<T, Error>;
