use async_trait::async_trait;

use crate::core::error::StoreError;

use super::{BatchOp, Storage, WriteBatch};

const VIEW_KEY_PREFIX: &[u8] = b"account_view_";

fn view_key(public_key: &[u8; 32]) -> Vec<u8> {
    let mut key = Vec::with_capacity(VIEW_KEY_PREFIX.len() + 32);
    key.extend_from_slice(VIEW_KEY_PREFIX);
    key.extend_from_slice(public_key);
    key
}

/// `sled`-backed store. `sled::Tree::apply_batch` gives the execution
/// engine a real atomic commit for multi-account writes.
pub struct SledStorage {
    tree: sled::Db,
}

impl SledStorage {
    pub fn open(path: impl AsRef<std::path::Path>) -> Result<Self, StoreError> {
        let tree = sled::open(path).map_err(|e| StoreError::Backend(e.to_string()))?;
        Ok(Self { tree })
    }

    pub fn temporary() -> Result<Self, StoreError> {
        let config = sled::Config::new().temporary(true);
        let tree = config
            .open()
            .map_err(|e| StoreError::Backend(e.to_string()))?;
        Ok(Self { tree })
    }
}

#[async_trait]
impl Storage for SledStorage {
    async fn get(&self, key: &[u8]) -> Result<Vec<u8>, StoreError> {
        match self.tree.get(key).map_err(|e| StoreError::Backend(e.to_string()))? {
            Some(ivec) => Ok(ivec.to_vec()),
            None => Err(StoreError::NotFound),
        }
    }

    async fn put(&self, key: &[u8], value: &[u8]) -> Result<(), StoreError> {
        self.tree
            .insert(key, value)
            .map_err(|e| StoreError::Backend(e.to_string()))?;
        Ok(())
    }

    async fn commit_batch(&self, batch: WriteBatch) -> Result<(), StoreError> {
        let mut sled_batch = sled::Batch::default();
        for op in batch.ops() {
            match op {
                BatchOp::Put(key, value) => sled_batch.insert(key.as_slice(), value.as_slice()),
                BatchOp::Delete(key) => sled_batch.remove(key.as_slice()),
            }
        }
        self.tree
            .apply_batch(sled_batch)
            .map_err(|e| StoreError::Backend(e.to_string()))?;
        Ok(())
    }

    async fn account_keys(&self) -> Result<Vec<Vec<u8>>, StoreError> {
        let mut keys = Vec::new();
        for item in self.tree.scan_prefix(super::ACCOUNT_KEY_PREFIX) {
            let (key, _) = item.map_err(|e| StoreError::Backend(e.to_string()))?;
            keys.push(key.to_vec());
        }
        Ok(keys)
    }

    async fn account_view_id(&self, public_key: &[u8; 32]) -> Result<u64, StoreError> {
        match self
            .tree
            .get(view_key(public_key))
            .map_err(|e| StoreError::Backend(e.to_string()))?
        {
            Some(ivec) => {
                let bytes: [u8; 8] = ivec
                    .as_ref()
                    .try_into()
                    .map_err(|_| StoreError::Backend("corrupt view-id record".to_string()))?;
                Ok(u64::from_be_bytes(bytes))
            }
            None => Ok(0),
        }
    }

    fn record_account_view(&self, public_key: &[u8; 32], view_id: u64, batch: &mut WriteBatch) {
        batch.put(view_key(public_key), view_id.to_be_bytes().to_vec());
    }
}
