//! Peer-facing wire types, request handlers and the per-peer dispatch
//! loop that ties them together with the Sync Service.

pub mod dispatcher;
pub mod error;
pub mod handlers;
pub mod packet;
pub mod sync;

pub use dispatcher::{PeerChannels, PeerDispatcher, PeerSink};
pub use error::PeerError;
pub use packet::Packet;
pub use sync::{ChunkCache, SyncService};
