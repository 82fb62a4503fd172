use thiserror::Error;

use ledger_common::{error::ValidationError, DecodeError};

/// Errors raised while loading or invoking a sandboxed processor.
/// Fatal to the current transaction; no state mutation is committed.
#[derive(Error, Debug)]
pub enum ProcessorError {
    #[error("no processor registered for tag {0}")]
    NotRegistered(u8),

    #[error("failed to load guest module {name}: {source}")]
    Load {
        name: String,
        #[source]
        source: anyhow::Error,
    },

    #[error("guest module does not export a `process` entrypoint")]
    MissingEntrypoint,

    #[error("processor explicitly aborted: {0}")]
    Aborted(String),

    #[error("processor exceeded its step budget")]
    Exhausted,

    #[error("host call misuse: {0}")]
    HostMisuse(String),

    #[error("guest trapped: {0}")]
    Trap(#[from] anyhow::Error),
}

/// The Account Store's error surface.
#[derive(Error, Debug)]
pub enum StoreError {
    #[error("key not found")]
    NotFound,

    #[error("storage IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("storage backend error: {0}")]
    Backend(String),

    #[error("failed to decode stored account: {0}")]
    Decode(#[from] DecodeError),
}

/// Errors surfaced by `apply_transaction` / the execution engine.
/// All are fatal to the current `apply` call.
#[derive(Error, Debug)]
pub enum BlockchainError {
    #[error("sender account is unknown and nonce is not zero")]
    SenderUnknown,

    #[error("failed to decode transaction: {0}")]
    DecodeError(#[from] DecodeError),

    #[error("processor error: {0}")]
    ProcessorError(#[from] ProcessorError),

    #[error("store error: {0}")]
    StoreError(#[from] StoreError),

    #[error("validation error: {0}")]
    ValidationError(#[from] ValidationError),
}
