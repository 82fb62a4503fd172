//! The explicit context struct wiring the Account Store, Processor
//! Registry and Execution Engine together, and exposing the
//! consumer-facing API a node runs against.
//!
//! `Ledger` replaces a string-keyed global singleton with an explicit
//! context struct passed into handler constructors: every peer
//! handler in `p2p::handlers` receives an `Arc<Ledger>` at
//! construction rather than reaching into a shared registry.

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;

use tokio::sync::RwLock;

use ledger_common::{Hash, Hashable, Transaction};

use crate::core::error::BlockchainError;
use crate::core::{ExecutionEngine, ProcessorRegistry, Storage};
use crate::Config;

/// The outcome of `receive_transaction`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Vote {
    Accepted,
    Rejected(String),
}

/// The consensus-external resolver the core consumes to learn the
/// currently preferred tip: how peers converge on one is outside this
/// crate. `Ledger` owns an in-process implementation sufficient for
/// the quorum bookkeeping the query/sync-view handlers need; a real
/// deployment can substitute its own.
pub trait Resolver: Send + Sync {
    fn preferred(&self) -> Option<Transaction>;
    fn set_preferred(&self, tx: Transaction);
    fn record_peer_root(&self, peer_root: Transaction);
}

/// Default resolver: last writer wins for both "preferred" and peer
/// roots. Good enough to drive the query/sync-view handlers in
/// `p2p::handlers`; the actual quorum algorithm is out of scope for
/// this crate.
#[derive(Default)]
pub struct SingleSlotResolver {
    preferred: std::sync::RwLock<Option<Transaction>>,
    peer_roots: std::sync::RwLock<Vec<Transaction>>,
}

impl Resolver for SingleSlotResolver {
    fn preferred(&self) -> Option<Transaction> {
        self.preferred.read().unwrap().clone()
    }

    fn set_preferred(&self, tx: Transaction) {
        *self.preferred.write().unwrap() = Some(tx);
    }

    fn record_peer_root(&self, peer_root: Transaction) {
        self.peer_roots.write().unwrap().push(peer_root);
    }
}

/// The node's ledger: the single entry point peer handlers call into.
pub struct Ledger {
    engine: Arc<ExecutionEngine>,
    store: Arc<dyn Storage>,
    root: RwLock<Transaction>,
    resolver: Arc<dyn Resolver>,
    transactions: RwLock<HashMap<Hash, Transaction>>,
    broadcaster_paused: AtomicBool,
}

impl Ledger {
    pub fn new(
        store: Arc<dyn Storage>,
        registry: Arc<ProcessorRegistry>,
        config: Config,
        genesis_root: Transaction,
        resolver: Arc<dyn Resolver>,
    ) -> Self {
        let engine = Arc::new(ExecutionEngine::new(store.clone(), registry, config));
        let mut transactions = HashMap::new();
        transactions.insert(genesis_root.hash(), genesis_root.clone());
        Self {
            engine,
            store,
            root: RwLock::new(genesis_root),
            resolver,
            transactions: RwLock::new(transactions),
            broadcaster_paused: AtomicBool::new(false),
        }
    }

    pub fn engine(&self) -> &Arc<ExecutionEngine> {
        &self.engine
    }

    pub fn store(&self) -> &Arc<dyn Storage> {
        &self.store
    }

    pub fn resolver(&self) -> Arc<dyn Resolver> {
        self.resolver.clone()
    }

    pub fn view_id(&self) -> u64 {
        self.engine.view_id()
    }

    pub async fn root(&self) -> Transaction {
        self.root.read().await.clone()
    }

    pub async fn set_root(&self, tx: Transaction) {
        *self.root.write().await = tx;
    }

    pub fn is_broadcaster_paused(&self) -> bool {
        self.broadcaster_paused.load(Ordering::SeqCst)
    }

    pub fn set_broadcaster_paused(&self, paused: bool) {
        self.broadcaster_paused.store(paused, Ordering::SeqCst);
    }

    /// `receive_transaction(tx) -> VoteAccepted | VoteRejected(reason)`.
    /// This is the network-ingress entry point (gossip and the query
    /// handler's accept-and-prefer path both call it directly), so it
    /// enforces the same id/signature checks `attach_sender` does
    /// before a transaction ever reaches the engine — a peer must not
    /// be able to get a transaction with a mismatched id or a forged
    /// signature applied just because its nonce happens to line up.
    /// Indexes the transaction by id on acceptance so
    /// `find_transaction` and sync's transaction-by-id queries can
    /// resolve it later.
    pub async fn receive_transaction(&self, tx: Transaction) -> Vote {
        if !tx.id_matches_content() {
            return Vote::Rejected(format_rejection(&BlockchainError::DecodeError(
                ledger_common::DecodeError::IdMismatch,
            )));
        }
        if !tx.verify_signature() {
            return Vote::Rejected(format_rejection(&BlockchainError::ValidationError(
                ledger_common::error::ValidationError::InvalidSignature,
            )));
        }

        let id = tx.id;
        match self.engine.apply(tx.clone()).await {
            Ok(()) => {
                self.transactions.write().await.insert(id, tx);
                Vote::Accepted
            }
            Err(err) => Vote::Rejected(format_rejection(&err)),
        }
    }

    /// `attach_sender(keys, tx) -> () | error`: validates `tx`'s
    /// signature and id against a set of acceptable sender keys
    /// before it is handed to `receive_transaction`. Kept distinct
    /// from `receive_transaction` since ingress validation
    /// (decode/signature) is a different error class than execution
    /// validation (nonce, processor).
    pub fn attach_sender(
        &self,
        acceptable_senders: &[[u8; 32]],
        tx: &Transaction,
    ) -> Result<(), BlockchainError> {
        if !tx.id_matches_content() {
            return Err(BlockchainError::DecodeError(ledger_common::DecodeError::IdMismatch));
        }
        if !tx.verify_signature() {
            return Err(BlockchainError::ValidationError(
                ledger_common::error::ValidationError::InvalidSignature,
            ));
        }
        if !acceptable_senders.contains(&tx.sender) {
            return Err(BlockchainError::ValidationError(
                ledger_common::error::ValidationError::SenderUnknown,
            ));
        }
        Ok(())
    }

    pub async fn find_transaction(&self, id: &Hash) -> Option<Transaction> {
        self.transactions.read().await.get(id).cloned()
    }
}

fn format_rejection(err: &BlockchainError) -> String {
    err.to_string()
}
