pub mod engine;
pub mod error;
pub mod processor;
pub mod store;

pub use engine::ExecutionEngine;
pub use error::{BlockchainError, ProcessorError, StoreError};
pub use processor::ProcessorRegistry;
pub use store::Storage;
