//! The host side of the guest ABI: binds a compiled module's
//! `process` export, exposes `tx_tag`/`tx_sender`/`tx_payload`/`load`/
//! `emit_delta`/`emit_pending`/`abort` to the guest, and runs it under
//! a fuel budget.
//!
//! Classic linear-memory ABI (ptr/len pairs into the guest's own
//! exported `memory`), not the component-model/WIT surface the
//! wasmtime example repo uses for richer host services — the guest
//! contract here is a flat function table, so there is nothing for
//! WIT bindgen to describe.

use std::sync::{Arc, Mutex};

use ledger_common::{transaction::Transaction, Delta};
use wasmtime::{Caller, Engine, Extern, Linker, Module, Store, StoreLimits, StoreLimitsBuilder};

use crate::core::error::ProcessorError;
use crate::Config;

/// Synchronous bridge from the host-function call (which cannot be
/// `async`) to the Account Store. The engine supplies an
/// implementation that reads a pre-fetched snapshot or blocks on the
/// async store via `tokio::runtime::Handle::block_on` — the same
/// sync/async boundary pattern used wherever a VM syscall needs
/// storage access.
pub trait HostAccountReader: Send + Sync {
    fn load(&self, account: &[u8; 32], key: &[u8]) -> Option<Vec<u8>>;
}

#[derive(Default)]
struct RunOutcome {
    deltas: Vec<Delta>,
    pending: Vec<Vec<u8>>,
    aborted: Option<String>,
}

struct HostState {
    tx_tag: u8,
    tx_sender: [u8; 32],
    tx_payload: Vec<u8>,
    reader: Arc<dyn HostAccountReader>,
    outcome: Arc<Mutex<RunOutcome>>,
    limits: StoreLimits,
}

fn memory(caller: &mut Caller<'_, HostState>) -> Option<wasmtime::Memory> {
    match caller.get_export("memory") {
        Some(Extern::Memory(mem)) => Some(mem),
        _ => None,
    }
}

fn write_guest(caller: &mut Caller<'_, HostState>, ptr: i32, bytes: &[u8]) -> Result<(), ProcessorError> {
    let memory = memory(caller).ok_or_else(|| ProcessorError::HostMisuse("no exported memory".into()))?;
    memory
        .write(&mut *caller, ptr as usize, bytes)
        .map_err(|e| ProcessorError::HostMisuse(format!("guest memory write out of bounds: {e}")))
}

fn read_guest(caller: &mut Caller<'_, HostState>, ptr: i32, len: i32) -> Result<Vec<u8>, ProcessorError> {
    let memory = memory(caller).ok_or_else(|| ProcessorError::HostMisuse("no exported memory".into()))?;
    let mut buf = vec![0u8; len as usize];
    memory
        .read(&caller, ptr as usize, &mut buf)
        .map_err(|e| ProcessorError::HostMisuse(format!("guest memory read out of bounds: {e}")))?;
    Ok(buf)
}

/// One compiled, registered processor. `module` is re-instantiated
/// into a fresh `Store` on every call rather than kept warm: a
/// contract's guest state never outlives the transaction it ran for.
pub struct Processor {
    pub name: String,
    pub tag: u8,
    module: Module,
}

impl Processor {
    pub fn compile(engine: &Engine, name: String, tag: u8, wasm_bytes: &[u8]) -> Result<Self, ProcessorError> {
        let module = Module::new(engine, wasm_bytes).map_err(|source| ProcessorError::Load {
            name: name.clone(),
            source,
        })?;
        if module.get_export_index("process").is_none() {
            return Err(ProcessorError::MissingEntrypoint);
        }
        Ok(Self { name, tag, module })
    }
}

/// Runs one processor for one transaction. Synchronous from the
/// engine's perspective: a private `Store` per call, bounded by
/// `config.vm_fuel`.
pub fn run(
    engine: &Engine,
    processor: &Processor,
    tx: &Transaction,
    reader: Arc<dyn HostAccountReader>,
    config: &Config,
) -> Result<(Vec<Delta>, Vec<Vec<u8>>), ProcessorError> {
    const WASM_PAGE_SIZE: usize = 64 * 1024;
    let limits = StoreLimitsBuilder::new()
        .memory_size(config.vm_pages as usize * WASM_PAGE_SIZE)
        .table_elements(config.vm_table_size as usize)
        .build();

    let state = HostState {
        tx_tag: tx.tag.as_byte(),
        tx_sender: tx.sender,
        tx_payload: tx.payload.clone(),
        reader,
        outcome: Arc::new(Mutex::new(RunOutcome::default())),
        limits,
    };
    let outcome_handle = state.outcome.clone();

    let mut store = Store::new(engine, state);
    store
        .set_fuel(config.vm_fuel)
        .map_err(|e| ProcessorError::HostMisuse(format!("fuel metering unavailable: {e}")))?;
    store.limiter(|state| &mut state.limits);

    let mut linker: Linker<HostState> = Linker::new(engine);
    bind_host_functions(&mut linker)?;

    let instance = linker
        .instantiate(&mut store, &processor.module)
        .map_err(ProcessorError::Trap)?;

    let process = instance
        .get_typed_func::<(), ()>(&mut store, "process")
        .map_err(|_| ProcessorError::MissingEntrypoint)?;

    match process.call(&mut store, ()) {
        Ok(()) => {}
        Err(trap) => {
            if store.get_fuel().unwrap_or(0) == 0 {
                return Err(ProcessorError::Exhausted);
            }
            return Err(ProcessorError::Trap(trap));
        }
    }

    let outcome = outcome_handle
        .lock()
        .map_err(|_| ProcessorError::HostMisuse("host outcome lock poisoned".into()))?;
    if let Some(reason) = &outcome.aborted {
        return Err(ProcessorError::Aborted(reason.clone()));
    }
    Ok((outcome.deltas.clone(), outcome.pending.clone()))
}

fn bind_host_functions(linker: &mut Linker<HostState>) -> Result<(), ProcessorError> {
    let wrap = |result: wasmtime::Result<()>| {
        result.map_err(|e| ProcessorError::HostMisuse(format!("failed to bind host function: {e}")))
    };

    wrap(linker.func_wrap("env", "tx_tag", |caller: Caller<'_, HostState>| -> i32 {
        caller.data().tx_tag as i32
    }))?;

    wrap(linker.func_wrap(
        "env",
        "tx_sender",
        |mut caller: Caller<'_, HostState>, ptr: i32| -> Result<(), wasmtime::Error> {
            let sender = caller.data().tx_sender;
            write_guest(&mut caller, ptr, &sender).map_err(anyhow::Error::from)
        },
    ))?;

    wrap(linker.func_wrap(
        "env",
        "tx_payload_len",
        |caller: Caller<'_, HostState>| -> i32 { caller.data().tx_payload.len() as i32 },
    ))?;

    wrap(linker.func_wrap(
        "env",
        "tx_payload",
        |mut caller: Caller<'_, HostState>, ptr: i32| -> Result<(), wasmtime::Error> {
            let payload = caller.data().tx_payload.clone();
            write_guest(&mut caller, ptr, &payload).map_err(anyhow::Error::from)
        },
    ))?;

    wrap(linker.func_wrap(
        "env",
        "load",
        |mut caller: Caller<'_, HostState>,
         account_ptr: i32,
         key_ptr: i32,
         key_len: i32,
         out_ptr: i32,
         out_cap: i32|
         -> Result<i32, wasmtime::Error> {
            let account_bytes = read_guest(&mut caller, account_ptr, 32).map_err(anyhow::Error::from)?;
            let account: [u8; 32] = account_bytes.try_into().unwrap();
            let key = read_guest(&mut caller, key_ptr, key_len).map_err(anyhow::Error::from)?;

            let value = caller.data().reader.load(&account, &key);
            match value {
                None => Ok(-1),
                Some(bytes) if bytes.len() as i32 > out_cap => Ok(-2),
                Some(bytes) => {
                    let len = bytes.len() as i32;
                    write_guest(&mut caller, out_ptr, &bytes).map_err(anyhow::Error::from)?;
                    Ok(len)
                }
            }
        },
    ))?;

    wrap(linker.func_wrap(
        "env",
        "emit_delta",
        |mut caller: Caller<'_, HostState>,
         account_ptr: i32,
         key_ptr: i32,
         key_len: i32,
         value_ptr: i32,
         value_len: i32|
         -> Result<(), wasmtime::Error> {
            let account_bytes = read_guest(&mut caller, account_ptr, 32).map_err(anyhow::Error::from)?;
            let account: [u8; 32] = account_bytes.try_into().unwrap();
            let key = read_guest(&mut caller, key_ptr, key_len).map_err(anyhow::Error::from)?;
            let new_value = read_guest(&mut caller, value_ptr, value_len).map_err(anyhow::Error::from)?;

            let outcome = caller.data().outcome.clone();
            outcome.lock().unwrap().deltas.push(Delta {
                account,
                key,
                old_value: None,
                new_value,
            });
            Ok(())
        },
    ))?;

    wrap(linker.func_wrap(
        "env",
        "emit_pending",
        |mut caller: Caller<'_, HostState>, tx_ptr: i32, tx_len: i32| -> Result<(), wasmtime::Error> {
            let encoded = read_guest(&mut caller, tx_ptr, tx_len).map_err(anyhow::Error::from)?;
            let outcome = caller.data().outcome.clone();
            outcome.lock().unwrap().pending.push(encoded);
            Ok(())
        },
    ))?;

    wrap(linker.func_wrap(
        "env",
        "abort",
        |mut caller: Caller<'_, HostState>, reason_ptr: i32, reason_len: i32| -> Result<(), wasmtime::Error> {
            let reason_bytes = read_guest(&mut caller, reason_ptr, reason_len).map_err(anyhow::Error::from)?;
            let reason = String::from_utf8_lossy(&reason_bytes).into_owned();
            let outcome = caller.data().outcome.clone();
            outcome.lock().unwrap().aborted = Some(reason);
            Ok(())
        },
    ))?;

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use ledger_common::Serializer;
    use wasmtime::Config as WasmtimeConfig;

    struct NullReader;
    impl HostAccountReader for NullReader {
        fn load(&self, _account: &[u8; 32], _key: &[u8]) -> Option<Vec<u8>> {
            None
        }
    }

    /// Renders `bytes` as a WAT string literal using `\XX` hex escapes
    /// for every byte, so arbitrary binary data (not just ASCII) can
    /// be embedded in a `(data ...)` segment.
    fn wat_bytes(bytes: &[u8]) -> String {
        bytes.iter().map(|b| format!("\\{:02x}", b)).collect()
    }

    fn engine_with_fuel() -> Engine {
        let mut config = WasmtimeConfig::new();
        config.consume_fuel(true);
        Engine::new(&config).unwrap()
    }

    fn compile(engine: &Engine, name: &str, wat: &str) -> Processor {
        let wasm = wat::parse_str(wat).unwrap();
        Processor::compile(engine, name.to_string(), 0, &wasm).unwrap()
    }

    #[test]
    fn guest_emit_delta_is_captured() {
        let engine = engine_with_fuel();
        let account = [9u8; 32];
        let wat = format!(
            r#"(module
                (import "env" "emit_delta" (func $emit_delta (param i32 i32 i32 i32 i32)))
                (memory (export "memory") 1)
                (data (i32.const 0) "{account}")
                (data (i32.const 32) "{key}")
                (data (i32.const 40) "{value}")
                (func (export "process")
                    (call $emit_delta (i32.const 0) (i32.const 32) (i32.const 1) (i32.const 40) (i32.const 2))))"#,
            account = wat_bytes(&account),
            key = wat_bytes(b"k"),
            value = wat_bytes(b"10"),
        );
        let processor = compile(&engine, "transfer", &wat);
        let tx = sample_tx();
        let (deltas, pending) =
            run(&engine, &processor, &tx, Arc::new(NullReader), &Config::default()).unwrap();

        assert!(pending.is_empty());
        assert_eq!(deltas.len(), 1);
        assert_eq!(deltas[0].account, account);
        assert_eq!(deltas[0].key, b"k".to_vec());
        assert_eq!(deltas[0].new_value, b"10".to_vec());
    }

    #[test]
    fn guest_emit_pending_round_trips_a_transaction() {
        let engine = engine_with_fuel();
        let pending_tx = sample_tx();
        let encoded = pending_tx.to_bytes();
        let wat = format!(
            r#"(module
                (import "env" "emit_pending" (func $emit_pending (param i32 i32)))
                (memory (export "memory") 2)
                (data (i32.const 0) "{encoded}")
                (func (export "process")
                    (call $emit_pending (i32.const 0) (i32.const {len}))))"#,
            encoded = wat_bytes(&encoded),
            len = encoded.len(),
        );
        let processor = compile(&engine, "createcontract", &wat);
        let tx = sample_tx();
        let (deltas, pending) =
            run(&engine, &processor, &tx, Arc::new(NullReader), &Config::default()).unwrap();

        assert!(deltas.is_empty());
        assert_eq!(pending.len(), 1);
        let decoded = Transaction::from_bytes(&pending[0]).unwrap();
        assert_eq!(decoded, pending_tx);
    }

    #[test]
    fn guest_abort_fails_the_call() {
        let engine = engine_with_fuel();
        let wat = format!(
            r#"(module
                (import "env" "abort" (func $abort (param i32 i32)))
                (memory (export "memory") 1)
                (data (i32.const 0) "{reason}")
                (func (export "process")
                    (call $abort (i32.const 0) (i32.const {len}))))"#,
            reason = wat_bytes(b"nonce too low"),
            len = b"nonce too low".len(),
        );
        let processor = compile(&engine, "stake", &wat);
        let tx = sample_tx();
        let result = run(&engine, &processor, &tx, Arc::new(NullReader), &Config::default());
        assert!(matches!(result, Err(ProcessorError::Aborted(reason)) if reason == "nonce too low"));
    }

    #[test]
    fn guest_exceeding_fuel_budget_is_exhausted() {
        let engine = engine_with_fuel();
        let wat = r#"(module
            (memory (export "memory") 1)
            (func (export "process")
                (loop $forever (br $forever))))"#;
        let processor = compile(&engine, "transfer", wat);
        let tx = sample_tx();
        let mut config = Config::default();
        config.vm_fuel = 1_000;
        let result = run(&engine, &processor, &tx, Arc::new(NullReader), &config);
        assert!(matches!(result, Err(ProcessorError::Exhausted)));
    }

    #[test]
    fn compiling_a_module_without_a_process_export_is_rejected() {
        let engine = engine_with_fuel();
        let wasm = wat::parse_str(r#"(module (memory (export "memory") 1))"#).unwrap();
        let result = Processor::compile(&engine, "transfer".to_string(), 1, &wasm);
        assert!(matches!(result, Err(ProcessorError::MissingEntrypoint)));
    }

    fn sample_tx() -> Transaction {
        Transaction::new(
            [2u8; 32],
            [2u8; 32],
            [0u8; 64],
            ledger_common::transaction::TransactionTag::Transfer,
            b"payload".to_vec(),
            0,
            7,
            Vec::new(),
            1,
        )
    }
}
