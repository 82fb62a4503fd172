//! Peer Message Dispatcher: one receive loop per connected peer,
//! selecting across a typed channel per opcode and spawning an
//! independent task per received request.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use tokio::sync::mpsc;
use tokio::task::JoinSet;

use crate::ledger::Ledger;
use crate::p2p::error::PeerError;
use crate::p2p::handlers;
use crate::p2p::packet::{
    GossipRequest, Packet, QueryRequest, SyncDiffChunkRequest, SyncDiffMetadataRequest,
    SyncTransactionRequest, SyncViewRequest,
};
use crate::p2p::sync::{ChunkCache, SyncService};

/// Abstracts "typed message send/receive per peer" — the underlying
/// network framing layer is presumed to already deliver/accept whole
/// `Packet`s.
#[async_trait]
pub trait PeerSink: Send + Sync {
    async fn send(&self, packet: Packet) -> Result<(), PeerError>;
}

/// Inbound, already-demultiplexed-by-opcode request channels for one
/// peer connection.
pub struct PeerChannels {
    pub gossip: mpsc::Receiver<GossipRequest>,
    pub query: mpsc::Receiver<QueryRequest>,
    pub sync_view: mpsc::Receiver<SyncViewRequest>,
    pub sync_diff_metadata: mpsc::Receiver<SyncDiffMetadataRequest>,
    pub sync_diff_chunk: mpsc::Receiver<SyncDiffChunkRequest>,
    pub sync_transaction: mpsc::Receiver<SyncTransactionRequest>,
}

/// Runs one peer's receive loop. Each request opcode is handled by a
/// spawned task so a slow sync-diff build never blocks gossip on the
/// same connection.
pub struct PeerDispatcher {
    ledger: Arc<Ledger>,
    sync_service: Arc<SyncService>,
    chunk_cache: Arc<ChunkCache>,
}

impl PeerDispatcher {
    pub fn new(ledger: Arc<Ledger>, sync_service: Arc<SyncService>, chunk_cache_ttl: Duration, chunk_cache_capacity: usize) -> Self {
        Self {
            ledger,
            sync_service,
            chunk_cache: Arc::new(ChunkCache::new(chunk_cache_capacity, chunk_cache_ttl)),
        }
    }

    /// Selects across every opcode channel until the peer disconnects
    /// (all channels closed), spawning one handler task per request.
    /// A handler's send failure disconnects the peer: the loop drains
    /// and returns rather than keep selecting on a dead sink.
    pub async fn run(&self, mut channels: PeerChannels, sink: Arc<dyn PeerSink>) {
        let mut tasks: JoinSet<Result<(), PeerError>> = JoinSet::new();

        loop {
            tokio::select! {
                Some(req) = channels.gossip.recv() => {
                    self.spawn_gossip(&mut tasks, req, sink.clone());
                }
                Some(req) = channels.query.recv() => {
                    self.spawn_query(&mut tasks, req, sink.clone());
                }
                Some(req) = channels.sync_view.recv() => {
                    self.spawn_sync_view(&mut tasks, req, sink.clone());
                }
                Some(req) = channels.sync_diff_metadata.recv() => {
                    self.spawn_sync_diff_metadata(&mut tasks, req, sink.clone());
                }
                Some(req) = channels.sync_diff_chunk.recv() => {
                    self.spawn_sync_diff_chunk(&mut tasks, req, sink.clone());
                }
                Some(req) = channels.sync_transaction.recv() => {
                    self.spawn_sync_transaction(&mut tasks, req, sink.clone());
                }
                else => break,
            }
        }

        // The peer is gone (or about to be); let in-flight handlers
        // finish or fail silently rather than aborting them mid-write.
        while let Some(result) = tasks.join_next().await {
            match result {
                Ok(Err(PeerError::SendFailed(reason))) => {
                    if log::log_enabled!(log::Level::Debug) {
                        log::debug!("disconnecting peer after send failure: {reason}");
                    }
                }
                Ok(_) => {}
                Err(join_err) => {
                    if log::log_enabled!(log::Level::Warn) {
                        log::warn!("peer handler task panicked: {join_err}");
                    }
                }
            }
        }
    }

    fn spawn_gossip(&self, tasks: &mut JoinSet<Result<(), PeerError>>, req: GossipRequest, sink: Arc<dyn PeerSink>) {
        let ledger = self.ledger.clone();
        tasks.spawn(async move {
            let response = handlers::handle_gossip(&ledger, req).await;
            sink.send(Packet::GossipResponse(response)).await
        });
    }

    fn spawn_query(&self, tasks: &mut JoinSet<Result<(), PeerError>>, req: QueryRequest, sink: Arc<dyn PeerSink>) {
        let ledger = self.ledger.clone();
        tasks.spawn(async move {
            let response = handlers::handle_query(&ledger, req).await;
            sink.send(Packet::QueryResponse(response)).await
        });
    }

    fn spawn_sync_view(&self, tasks: &mut JoinSet<Result<(), PeerError>>, req: SyncViewRequest, sink: Arc<dyn PeerSink>) {
        let ledger = self.ledger.clone();
        tasks.spawn(async move {
            let response = handlers::handle_sync_view(&ledger, req).await;
            sink.send(Packet::SyncViewResponse(response)).await
        });
    }

    fn spawn_sync_diff_metadata(
        &self,
        tasks: &mut JoinSet<Result<(), PeerError>>,
        req: SyncDiffMetadataRequest,
        sink: Arc<dyn PeerSink>,
    ) {
        let sync_service = self.sync_service.clone();
        let chunk_cache = self.chunk_cache.clone();
        tasks.spawn(async move {
            // A storage failure while building the diff is the local
            // node's problem, not a reason to disconnect the peer: it
            // gets an empty metadata response and can retry later.
            let (latest_view_id, chunk_hashes) =
                match sync_service.build_diff_metadata(req.view_id, &chunk_cache).await {
                    Ok(result) => result,
                    Err(err) => {
                        log::warn!("failed to build sync diff metadata: {err}");
                        (0, Vec::new())
                    }
                };
            sink.send(Packet::SyncDiffMetadataResponse(
                crate::p2p::packet::SyncDiffMetadataResponse {
                    latest_view_id,
                    chunk_hashes,
                },
            ))
            .await
        });
    }

    fn spawn_sync_diff_chunk(
        &self,
        tasks: &mut JoinSet<Result<(), PeerError>>,
        req: SyncDiffChunkRequest,
        sink: Arc<dyn PeerSink>,
    ) {
        let sync_service = self.sync_service.clone();
        let chunk_cache = self.chunk_cache.clone();
        tasks.spawn(async move {
            let (found, diff) = sync_service.get_chunk(&req.chunk_hash, &chunk_cache).await;
            sink.send(Packet::SyncDiffChunkResponse(
                crate::p2p::packet::SyncDiffChunkResponse { found, diff },
            ))
            .await
        });
    }

    fn spawn_sync_transaction(
        &self,
        tasks: &mut JoinSet<Result<(), PeerError>>,
        req: SyncTransactionRequest,
        sink: Arc<dyn PeerSink>,
    ) {
        let ledger = self.ledger.clone();
        tasks.spawn(async move {
            let mut transactions = Vec::with_capacity(req.ids.len());
            for id in &req.ids {
                if let Some(tx) = ledger.find_transaction(id).await {
                    transactions.push(tx);
                }
            }
            sink.send(Packet::SyncTransactionResponse(
                crate::p2p::packet::SyncTransactionResponse { transactions },
            ))
            .await
        });
    }
}
