//! Execution Engine: applies one transaction as a breadth-first drain
//! over a work queue, merging processor deltas into a per-call
//! account working set and committing it atomically to the Account
//! Store.

use std::collections::{HashMap, VecDeque};
use std::sync::Arc;

use ledger_common::account::PUBLIC_KEY_SIZE;
use ledger_common::error::ValidationError;
use ledger_common::{Account, Delta, Serializer, Transaction, TransactionTag};
use tokio::sync::Mutex as AsyncMutex;

use crate::core::error::{BlockchainError, StoreError};
use crate::core::processor::host::HostAccountReader;
use crate::core::processor::ProcessorRegistry;
use crate::core::store::{Storage, WriteBatch};
use crate::Config;

/// Bridges the processor host's synchronous `load` call to the async
/// Account Store. `block_in_place` + `Handle::block_on` is the
/// supported way to make a blocking call from inside an async task
/// without starving the runtime; it requires the engine to run on a
/// multi-threaded tokio runtime (the daemon always does — see
/// `daemon/src/lib.rs`).
struct BlockingStoreReader {
    store: Arc<dyn Storage>,
}

impl HostAccountReader for BlockingStoreReader {
    fn load(&self, account: &[u8; 32], key: &[u8]) -> Option<Vec<u8>> {
        let store = self.store.clone();
        let account = *account;
        let key = key.to_vec();
        tokio::task::block_in_place(|| {
            tokio::runtime::Handle::current().block_on(async move {
                store
                    .load_account(&account)
                    .await
                    .ok()
                    .flatten()
                    .and_then(|acc| acc.state.get(&key).cloned())
            })
        })
    }
}

/// Applies transactions against a shared Account Store through a
/// registry of sandboxed processors. A single writer lock serializes
/// `apply` calls so nonce reads/writes never race.
pub struct ExecutionEngine {
    store: Arc<dyn Storage>,
    registry: Arc<ProcessorRegistry>,
    config: Config,
    write_lock: AsyncMutex<()>,
    view_id: Arc<std::sync::atomic::AtomicU64>,
}

impl ExecutionEngine {
    pub fn new(store: Arc<dyn Storage>, registry: Arc<ProcessorRegistry>, config: Config) -> Self {
        Self {
            store,
            registry,
            config,
            write_lock: AsyncMutex::new(()),
            view_id: Arc::new(std::sync::atomic::AtomicU64::new(0)),
        }
    }

    pub fn view_id(&self) -> u64 {
        self.view_id.load(std::sync::atomic::Ordering::SeqCst)
    }

    /// Shared handle to the current view-id counter, so the sync
    /// service can report an up-to-date `latest_view_id` without the
    /// engine and sync service racing over two separate counters.
    pub fn view_id_handle(&self) -> Arc<std::sync::atomic::AtomicU64> {
        self.view_id.clone()
    }

    /// `apply(tx)`: BFS drain over a work queue. Holds the engine's
    /// single writer lock for the whole drain so a
    /// recursively-emitted pending transaction is applied with the
    /// same linearizability guarantee as the one that produced it.
    pub async fn apply(&self, tx: Transaction) -> Result<(), BlockchainError> {
        let _guard = self.write_lock.lock().await;

        let mut queue: VecDeque<Transaction> = VecDeque::new();
        queue.push_back(tx);

        while let Some(next) = queue.pop_front() {
            let pending = self.do_apply(&next).await?;
            for encoded in pending {
                let decoded = Transaction::from_bytes(&encoded)
                    .map_err(|e| BlockchainError::DecodeError(e.into()))?;
                queue.push_back(decoded);
            }
        }

        self.view_id.fetch_add(1, std::sync::atomic::Ordering::SeqCst);
        Ok(())
    }

    /// `do_apply(t)`: the single-transaction step — look up the
    /// sender, run the registered processor (or handle `Nop` directly),
    /// build a working set of touched accounts, apply deltas, bump the
    /// sender's nonce, and commit the whole set atomically.
    async fn do_apply(&self, t: &Transaction) -> Result<Vec<Vec<u8>>, BlockchainError> {
        let sender: [u8; PUBLIC_KEY_SIZE] = t.sender;

        if t.tag == TransactionTag::Nop {
            // Nop requires an existing account; unlike the general
            // path it never synthesizes one from nonce=0.
            let mut account = self
                .store
                .load_account(&sender)
                .await?
                .ok_or(BlockchainError::SenderUnknown)?;
            self.check_nonce(&account, t)?;
            account.nonce += 1;
            self.store.save_account(&account, self.view_id() + 1).await?;
            return Ok(Vec::new());
        }

        // Invoke the registered processor. An error aborts do_apply
        // before any account mutation is committed.
        let reader: Arc<dyn HostAccountReader> = Arc::new(BlockingStoreReader {
            store: self.store.clone(),
        });
        let (deltas, pending) = self.registry.run(t, reader, &self.config)?;

        // Build the working set, starting with the sender. A missing
        // sender is only synthesized for nonce=0; any other nonce
        // against a missing sender, or a mismatched nonce against an
        // existing one, rejects the whole transaction before any
        // delta is applied — this is what makes replaying an
        // already-applied transaction (same sender, same nonce) fail
        // the second time.
        let mut accounts: HashMap<[u8; PUBLIC_KEY_SIZE], Account> = HashMap::new();
        let sender_account = match self.store.load_account(&sender).await? {
            Some(account) => {
                self.check_nonce(&account, t)?;
                account
            }
            None if t.nonce == 0 => Account::new(sender),
            None => return Err(BlockchainError::SenderUnknown),
        };
        accounts.insert(sender, sender_account);

        // Apply each delta in emission order, accumulating across
        // every processor invoked for this transaction (there is one
        // processor per tag here, so this only matters for the BFS
        // tree: a later delta to the same account key overwrites an
        // earlier one rather than being rejected).
        for delta in &deltas {
            self.apply_delta(&mut accounts, delta).await?;
        }

        accounts.get_mut(&sender).expect("sender inserted above").nonce += 1;

        self.commit_working_set(accounts).await?;

        Ok(pending)
    }

    /// The replay guard: `t.nonce` must equal the sender's current
    /// nonce. Applying a transaction with a stale nonce — including a
    /// literal replay of one already applied — is rejected here.
    fn check_nonce(&self, account: &Account, t: &Transaction) -> Result<(), BlockchainError> {
        if t.nonce != account.nonce {
            return Err(BlockchainError::ValidationError(ValidationError::BadNonce {
                expected: account.nonce,
                got: t.nonce,
            }));
        }
        Ok(())
    }

    async fn apply_delta(
        &self,
        accounts: &mut HashMap<[u8; PUBLIC_KEY_SIZE], Account>,
        delta: &Delta,
    ) -> Result<(), BlockchainError> {
        if !accounts.contains_key(&delta.account) {
            let loaded = match self.store.load_account(&delta.account).await? {
                Some(account) => account,
                None => Account::new(delta.account),
            };
            accounts.insert(delta.account, loaded);
        }
        let account = accounts.get_mut(&delta.account).expect("inserted above");
        account.state = account.state.store(delta.key.clone(), delta.new_value.clone());
        Ok(())
    }

    /// A single store-level write batch covering every account
    /// touched by this `do_apply` frame, so a crash mid-commit can
    /// only lose this whole frame rather than leave one account's
    /// write applied and a sibling's lost.
    async fn commit_working_set(
        &self,
        accounts: HashMap<[u8; PUBLIC_KEY_SIZE], Account>,
    ) -> Result<(), StoreError> {
        let next_view_id = self.view_id() + 1;
        let mut batch = WriteBatch::new();
        for account in accounts.values() {
            batch.put(
                crate::core::store::account_key(&account.public_key),
                account.to_bytes(),
            );
            self.store
                .record_account_view(&account.public_key, next_view_id, &mut batch);
        }
        self.store.commit_batch(batch).await
    }
}
