//! The ledger execution core daemon: account storage, the processor
//! host, the execution engine, and the peer-facing sync/gossip/query
//! surface built on top of them.

pub mod config;
pub mod core;
pub mod ledger;
pub mod p2p;

pub use config::Config;
pub use ledger::{Ledger, Resolver, SingleSlotResolver, Vote};
