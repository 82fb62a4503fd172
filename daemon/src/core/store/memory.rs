use std::collections::HashMap;
use std::sync::RwLock;

use async_trait::async_trait;

use crate::core::error::StoreError;

use super::{BatchOp, Storage, WriteBatch};

/// `HashMap`-backed store used in tests: a cache-first read path with
/// no disk tier behind it.
#[derive(Default)]
pub struct MemoryStorage {
    data: RwLock<HashMap<Vec<u8>, Vec<u8>>>,
    account_views: RwLock<HashMap<[u8; 32], u64>>,
}

impl MemoryStorage {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl Storage for MemoryStorage {
    async fn get(&self, key: &[u8]) -> Result<Vec<u8>, StoreError> {
        self.data
            .read()
            .unwrap()
            .get(key)
            .cloned()
            .ok_or(StoreError::NotFound)
    }

    async fn put(&self, key: &[u8], value: &[u8]) -> Result<(), StoreError> {
        self.data
            .write()
            .unwrap()
            .insert(key.to_vec(), value.to_vec());
        Ok(())
    }

    async fn commit_batch(&self, batch: WriteBatch) -> Result<(), StoreError> {
        let mut data = self.data.write().unwrap();
        for op in batch.ops() {
            match op {
                BatchOp::Put(key, value) => {
                    data.insert(key.clone(), value.clone());
                }
                BatchOp::Delete(key) => {
                    data.remove(key);
                }
            }
        }
        Ok(())
    }

    async fn account_keys(&self) -> Result<Vec<Vec<u8>>, StoreError> {
        Ok(self.data.read().unwrap().keys().cloned().collect())
    }

    async fn account_view_id(&self, public_key: &[u8; 32]) -> Result<u64, StoreError> {
        Ok(self
            .account_views
            .read()
            .unwrap()
            .get(public_key)
            .copied()
            .unwrap_or(0))
    }

    fn record_account_view(&self, public_key: &[u8; 32], view_id: u64, _batch: &mut WriteBatch) {
        self.account_views
            .write()
            .unwrap()
            .insert(*public_key, view_id);
    }
}
