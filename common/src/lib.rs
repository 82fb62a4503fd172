#![allow(clippy::too_many_arguments)]

//! Wire types and the canonical binary encoding shared by every
//! component of the ledger execution core: accounts, transactions,
//! deltas, hashing and sync chunks.

pub mod account;
pub mod chunk;
pub mod error;
pub mod hash;
pub mod serializer;
pub mod transaction;

pub use account::{Account, AccountState};
pub use chunk::{chunk_hash, split_into_chunks, Chunk};
pub use error::{DecodeError, ValidationError};
pub use hash::{hash, Hash, Hashable};
pub use serializer::{Reader, ReaderError, Serializer, Writer};
pub use transaction::{Delta, Transaction, TransactionTag};
