use thiserror::Error;

use crate::serializer::ReaderError;

/// Malformed input: bad hex, a truncated buffer, an unrecognized
/// discriminant. Decoding errors are never retried.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum DecodeError {
    #[error("failed to decode wire data: {0}")]
    Wire(#[from] ReaderError),

    #[error("invalid hex string: {0}")]
    Hex(String),

    #[error("transaction id does not match its content")]
    IdMismatch,
}

/// Semantic rejection of an otherwise well-formed transaction.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ValidationError {
    #[error("transaction tag is not registered with any processor")]
    UnknownTag,

    #[error("signature verification failed")]
    InvalidSignature,

    #[error("nonce {got} does not match the sender's expected nonce {expected}")]
    BadNonce { expected: u64, got: u64 },

    #[error("sender account does not exist and nonce is not zero")]
    SenderUnknown,
}
