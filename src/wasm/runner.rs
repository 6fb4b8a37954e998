//! WebAssembly execution using Wasmtime
//!
//! Every call gets its own `Store` with an empty WASI preview1 context, so
//! nothing a function does survives into the next call. The `Engine` is
//! shared; it only holds compilation settings.

use std::sync::{Arc, Weak};
use std::time::Duration;

use tracing::{debug, trace};
use wasmtime::{Config, Engine, Linker, Module, Store, Trap, Val, ValType};
use wasmtime_wasi::preview1::{self, WasiP1Ctx};
use wasmtime_wasi::WasiCtxBuilder;

use crate::error::{Error, Result};

/// How often the epoch ticker advances the engine clock
pub const EPOCH_TICK: Duration = Duration::from_millis(10);

/// Configuration for the runner
#[derive(Debug, Clone, Default)]
pub struct RunnerConfig {
    /// Per-call deadline; `None` lets a function run forever
    pub timeout: Option<Duration>,
}

/// Compiles and invokes function bytecode, one sandbox per call
pub struct WasmRunner {
    engine: Engine,
    timeout: Option<Duration>,
    /// Dropping the runner drops this and stops the epoch ticker thread
    _ticker: Option<Arc<()>>,
}

impl WasmRunner {
    pub fn new(config: RunnerConfig) -> Result<Self> {
        let mut engine_config = Config::new();
        engine_config.epoch_interruption(config.timeout.is_some());

        let engine = Engine::new(&engine_config)
            .map_err(|e| Error::Internal(format!("Failed to create wasm engine: {}", e)))?;

        let ticker = match config.timeout {
            Some(_) => Some(spawn_epoch_ticker(&engine)?),
            None => None,
        };

        Ok(Self {
            engine,
            timeout: config.timeout,
            _ticker: ticker,
        })
    }

    /// Invoke export `name` of `bytecode` with `args` as raw 64-bit words.
    ///
    /// Returns the first result widened to `u64`, or 0 when the export
    /// returns nothing. The sandbox is dropped on every return path.
    pub fn run(&self, name: &str, bytecode: &[u8], args: &[u64]) -> Result<u64> {
        let mut store = Store::new(&self.engine, WasiCtxBuilder::new().build_p1());
        if let Some(timeout) = self.timeout {
            store.epoch_deadline_trap();
            store.set_epoch_deadline(deadline_ticks(timeout));
        }

        let mut linker: Linker<WasiP1Ctx> = Linker::new(&self.engine);
        preview1::add_to_linker_sync(&mut linker, |cx: &mut WasiP1Ctx| cx)
            .map_err(|e| Error::Internal(format!("Failed to link WASI shim: {}", e)))?;

        let module = Module::new(&self.engine, bytecode).map_err(|e| Error::Compile {
            name: name.to_string(),
            message: root_message(&e),
        })?;

        // Linker::instantiate never calls the WASI `_start` entry point
        let instance = linker.instantiate(&mut store, &module).map_err(|e| {
            self.trap_or(name, e, |message| Error::Instantiation {
                name: name.to_string(),
                message,
            })
        })?;

        let func = instance
            .get_func(&mut store, name)
            .ok_or_else(|| Error::ExportNotFound {
                name: name.to_string(),
            })?;

        let ty = func.ty(&store);
        let params = encode_args(name, ty.params(), args)?;
        let mut results = vec![Val::I64(0); ty.results().len()];

        trace!(function = %name, args = ?args, "Invoking export");
        func.call(&mut store, &params, &mut results)
            .map_err(|e| self.trap_or(name, e, |message| Error::execution_fault(name, message)))?;

        let result = match results.first() {
            Some(val) => decode_result(name, val)?,
            None => 0,
        };
        debug!(function = %name, result, "Export returned");
        Ok(result)
    }

    /// Epoch interrupts become `ExecutionTimeout`; anything else goes
    /// through `other`.
    fn trap_or(
        &self,
        name: &str,
        err: wasmtime::Error,
        other: impl FnOnce(String) -> Error,
    ) -> Error {
        match (err.downcast_ref::<Trap>(), self.timeout) {
            (Some(Trap::Interrupt), Some(timeout)) => Error::ExecutionTimeout {
                name: name.to_string(),
                timeout_ms: timeout.as_millis() as u64,
            },
            _ => other(root_message(&err)),
        }
    }
}

/// Number of epoch ticks covering `timeout`, rounded up
fn deadline_ticks(timeout: Duration) -> u64 {
    let tick = EPOCH_TICK.as_nanos();
    (timeout.as_nanos().div_ceil(tick) as u64).max(1)
}

/// Advance the engine epoch every tick until the returned token is dropped
fn spawn_epoch_ticker(engine: &Engine) -> Result<Arc<()>> {
    let alive = Arc::new(());
    let watch: Weak<()> = Arc::downgrade(&alive);
    let engine = engine.clone();

    std::thread::Builder::new()
        .name("wasm-epoch".to_string())
        .spawn(move || {
            while watch.strong_count() > 0 {
                std::thread::sleep(EPOCH_TICK);
                engine.increment_epoch();
            }
        })
        .map_err(|e| Error::Internal(format!("Failed to start epoch ticker: {}", e)))?;

    Ok(alive)
}

/// Reinterpret each word according to the export's parameter type
fn encode_args(
    name: &str,
    params: impl ExactSizeIterator<Item = ValType>,
    args: &[u64],
) -> Result<Vec<Val>> {
    if params.len() != args.len() {
        return Err(Error::execution_fault(
            name,
            format!("export takes {} arguments, got {}", params.len(), args.len()),
        ));
    }

    params
        .zip(args)
        .enumerate()
        .map(|(index, (ty, &word))| match ty {
            ValType::I32 => Ok(Val::I32(word as u32 as i32)),
            ValType::I64 => Ok(Val::I64(word as i64)),
            ValType::F32 => Ok(Val::F32(word as u32)),
            ValType::F64 => Ok(Val::F64(word)),
            _ => Err(Error::execution_fault(
                name,
                format!("parameter {} cannot be passed as a 64-bit word", index),
            )),
        })
        .collect()
}

fn decode_result(name: &str, val: &Val) -> Result<u64> {
    match val {
        Val::I32(v) => Ok(*v as u32 as u64),
        Val::I64(v) => Ok(*v as u64),
        Val::F32(bits) => Ok(*bits as u64),
        Val::F64(bits) => Ok(*bits),
        _ => Err(Error::execution_fault(
            name,
            "result cannot be returned as a 64-bit word",
        )),
    }
}

/// The innermost cause carries the useful text (trap kind, parse error);
/// outer layers are mostly wasm backtraces.
fn root_message(err: &wasmtime::Error) -> String {
    err.root_cause().to_string()
}
