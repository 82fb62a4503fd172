use thiserror::Error;

/// Peer send/receive failures. A `PeerError` always results in the
/// peer being disconnected; per-peer state is discarded.
#[derive(Error, Debug)]
pub enum PeerError {
    #[error("failed to send response to peer: {0}")]
    SendFailed(String),

    #[error("failed to decode a message from peer: {0}")]
    Decode(#[from] ledger_common::DecodeError),

    #[error("peer disconnected")]
    Disconnected,
}
