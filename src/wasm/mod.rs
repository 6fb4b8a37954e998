//! WebAssembly functions: storage and sandboxed execution

mod registry;
mod runner;

pub use registry::FunctionRegistry;
pub use runner::{RunnerConfig, WasmRunner};
