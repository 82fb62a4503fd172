//! Byte-key / byte-value persistence of account records.
//!
//! A production node's storage layer typically composes 30+
//! sub-traits for blocks, balances, contracts, assets and more. This
//! core only needs the account-record surface: raw get/put, account
//! load/save, and a diff dump for the sync service.

mod memory;
mod sled_store;

pub use memory::MemoryStorage;
pub use sled_store::SledStorage;

use async_trait::async_trait;
use ledger_common::{serializer::Serializer, Account};

use crate::core::error::StoreError;

/// Key prefix for account records: `"account_" || public_key`.
pub const ACCOUNT_KEY_PREFIX: &[u8] = b"account_";

pub fn account_key(public_key: &[u8; 32]) -> Vec<u8> {
    let mut key = Vec::with_capacity(ACCOUNT_KEY_PREFIX.len() + 32);
    key.extend_from_slice(ACCOUNT_KEY_PREFIX);
    key.extend_from_slice(public_key);
    key
}

/// One pending key/value write, staged so the execution engine can
/// flush every account touched by one `do_apply` call as a single
/// atomic unit.
pub enum BatchOp {
    Put(Vec<u8>, Vec<u8>),
    Delete(Vec<u8>),
}

/// A set of writes applied together. On backends that support it
/// (`sled`), `commit` is atomic; the in-memory backend applies the
/// ops in order, which is sufficient since there is no concurrent
/// reader mid-batch.
#[derive(Default)]
pub struct WriteBatch {
    ops: Vec<BatchOp>,
}

impl WriteBatch {
    pub fn new() -> Self {
        Self { ops: Vec::new() }
    }

    pub fn put(&mut self, key: Vec<u8>, value: Vec<u8>) {
        self.ops.push(BatchOp::Put(key, value));
    }

    pub fn delete(&mut self, key: Vec<u8>) {
        self.ops.push(BatchOp::Delete(key));
    }

    pub fn ops(&self) -> &[BatchOp] {
        &self.ops
    }
}

/// The raw key-value surface plus account-record and diff-dump
/// conveniences the rest of the core depends on.
#[async_trait]
pub trait Storage: Send + Sync {
    async fn get(&self, key: &[u8]) -> Result<Vec<u8>, StoreError>;
    async fn put(&self, key: &[u8], value: &[u8]) -> Result<(), StoreError>;
    async fn commit_batch(&self, batch: WriteBatch) -> Result<(), StoreError>;

    /// Every account key currently present, used by `dump_diff` and
    /// tests. Not a consumer-facing operation on its own — required
    /// to implement `dump_diff` over an opaque KV layer.
    async fn account_keys(&self) -> Result<Vec<Vec<u8>>, StoreError>;

    /// View-id at which each account was last written, used to filter
    /// `dump_diff`. Returns 0 for an account never recorded against a
    /// view.
    async fn account_view_id(&self, public_key: &[u8; 32]) -> Result<u64, StoreError>;

    async fn load_account(&self, public_key: &[u8; 32]) -> Result<Option<Account>, StoreError> {
        let key = account_key(public_key);
        match self.get(&key).await {
            Ok(bytes) => Ok(Some(Account::from_bytes(&bytes)?)),
            Err(StoreError::NotFound) => Ok(None),
            Err(other) => Err(other),
        }
    }

    async fn save_account(&self, account: &Account, view_id: u64) -> Result<(), StoreError> {
        let key = account_key(&account.public_key);
        let mut batch = WriteBatch::new();
        batch.put(key, account.to_bytes());
        self.record_account_view(&account.public_key, view_id, &mut batch);
        self.commit_batch(batch).await
    }

    /// Records the view-id an account was last touched at, so
    /// `dump_diff` can filter by "since view-id". Implemented by each
    /// backend because the bookkeeping key lives alongside the
    /// account record.
    fn record_account_view(&self, public_key: &[u8; 32], view_id: u64, batch: &mut WriteBatch);

    /// An opaque, deterministic encoding of every account whose
    /// `account_view_id` is strictly greater than `since_view_id`.
    /// Consumed only by the sync service.
    async fn dump_diff(&self, since_view_id: u64) -> Result<Vec<u8>, StoreError> {
        let mut keys = self.account_keys().await?;
        keys.sort();

        let mut writer = ledger_common::serializer::Writer::new();
        let mut changed: Vec<(Vec<u8>, Account)> = Vec::new();
        for key in keys {
            if key.len() != ACCOUNT_KEY_PREFIX.len() + 32 || !key.starts_with(ACCOUNT_KEY_PREFIX) {
                continue;
            }
            let public_key: [u8; 32] = key[ACCOUNT_KEY_PREFIX.len()..].try_into().unwrap();
            let view_id = self.account_view_id(&public_key).await?;
            if view_id > since_view_id {
                if let Some(account) = self.load_account(&public_key).await? {
                    changed.push((key, account));
                }
            }
        }

        writer.write_varint(changed.len() as u64);
        for (_, account) in changed {
            let encoded = account.to_bytes();
            writer.write_vec_u8(&encoded);
        }
        Ok(writer.into_bytes())
    }
}
