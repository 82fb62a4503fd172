//! Processor Registry & Host.
//!
//! Registration scans a directory of compiled `*.wasm` guest
//! binaries; the filename stem is the registered name. One processor
//! is registered per transaction tag; registration is final for the
//! process lifetime.

pub mod host;

use std::collections::HashMap;
use std::path::Path;
use std::sync::Arc;

use ledger_common::{transaction::Transaction, Delta};
use wasmtime::{Config as WasmtimeConfig, Engine};

use crate::core::error::ProcessorError;
use crate::Config;
pub use host::HostAccountReader;
use host::Processor;

/// Maps a guest binary's filename stem to the tag it handles. The
/// spec leaves this convention implementation-defined; this core
/// requires processor file names to match the lowercase tag name
/// (`transfer.wasm`, `createcontract.wasm`, `stake.wasm` — `nop` is
/// handled directly by the execution engine and never registered).
fn tag_for_name(name: &str) -> Option<u8> {
    match name {
        "transfer" => Some(ledger_common::transaction::TransactionTag::Transfer.as_byte()),
        "createcontract" => Some(ledger_common::transaction::TransactionTag::CreateContract.as_byte()),
        "stake" => Some(ledger_common::transaction::TransactionTag::Stake.as_byte()),
        _ => None,
    }
}

/// Holds loaded processors keyed by tag, plus the wasmtime `Engine`
/// every call shares: compiling a `Module` is the expensive part,
/// instantiating a `Store` per call is cheap.
pub struct ProcessorRegistry {
    engine: Engine,
    by_tag: HashMap<u8, Processor>,
}

impl ProcessorRegistry {
    /// Scans `dir` for `*.wasm` files and compiles each into a
    /// registered processor. A directory that does not exist yields
    /// an empty registry rather than an error, so a core can run with
    /// no processors configured (e.g. a pure-`Nop` test node).
    pub fn load_from_dir(dir: &Path, config: &Config) -> Result<Self, ProcessorError> {
        let mut wasmtime_config = WasmtimeConfig::new();
        wasmtime_config.consume_fuel(true);
        let engine = Engine::new(&wasmtime_config)
            .map_err(|e| ProcessorError::HostMisuse(format!("failed to start wasmtime engine: {e}")))?;

        let mut by_tag = HashMap::new();
        if !dir.is_dir() {
            return Ok(Self { engine, by_tag });
        }

        for entry in std::fs::read_dir(dir).map_err(|e| {
            ProcessorError::HostMisuse(format!("failed to scan processor directory: {e}"))
        })? {
            let entry = entry.map_err(|e| {
                ProcessorError::HostMisuse(format!("failed to read processor directory entry: {e}"))
            })?;
            let path = entry.path();
            if path.extension().and_then(|ext| ext.to_str()) != Some("wasm") {
                continue;
            }
            let Some(stem) = path.file_stem().and_then(|s| s.to_str()) else {
                continue;
            };
            let Some(tag) = tag_for_name(stem) else {
                log::warn!("skipping guest binary with unrecognized name: {stem}");
                continue;
            };

            let wasm_bytes = std::fs::read(&path).map_err(|e| ProcessorError::Load {
                name: stem.to_string(),
                source: e.into(),
            })?;
            let processor = Processor::compile(&engine, stem.to_string(), tag, &wasm_bytes)?;
            by_tag.insert(tag, processor);
        }

        let _ = config;
        Ok(Self { engine, by_tag })
    }

    pub fn get(&self, tag: u8) -> Option<&Processor> {
        self.by_tag.get(&tag)
    }

    pub fn is_registered(&self, tag: u8) -> bool {
        self.by_tag.contains_key(&tag)
    }

    /// Runs the processor registered for `tx.tag`. Synchronous from
    /// the caller's perspective: a fresh `Store` is instantiated for
    /// this call alone.
    pub fn run(
        &self,
        tx: &Transaction,
        reader: Arc<dyn HostAccountReader>,
        config: &Config,
    ) -> Result<(Vec<Delta>, Vec<Vec<u8>>), ProcessorError> {
        let processor = self
            .get(tx.tag.as_byte())
            .ok_or(ProcessorError::NotRegistered(tx.tag.as_byte()))?;
        host::run(&self.engine, processor, tx, reader, config)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_directory_yields_empty_registry() {
        let dir = tempdir::TempDir::new("processor-registry-test").unwrap();
        let registry = ProcessorRegistry::load_from_dir(dir.path(), &Config::default()).unwrap();
        assert!(!registry.is_registered(ledger_common::transaction::TransactionTag::Transfer.as_byte()));
    }

    #[test]
    fn missing_directory_yields_empty_registry_not_an_error() {
        let registry =
            ProcessorRegistry::load_from_dir(Path::new("/no/such/directory"), &Config::default())
                .unwrap();
        assert!(!registry.is_registered(0));
    }
}
