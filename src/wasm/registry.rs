//! Named function store
//!
//! Maps function names to bytecode. Deploys are upserts; executions copy
//! the bytecode handle out under a read lock and run without holding it.

use std::collections::HashMap;
use std::sync::Arc;

use parking_lot::RwLock;
use tracing::debug;

use super::runner::WasmRunner;
use crate::error::{Error, Result};

pub struct FunctionRegistry {
    functions: RwLock<HashMap<String, Arc<[u8]>>>,
    runner: WasmRunner,
}

impl FunctionRegistry {
    pub fn new(runner: WasmRunner) -> Self {
        Self {
            functions: RwLock::new(HashMap::new()),
            runner,
        }
    }

    /// Store `bytecode` under `name`, replacing any previous entry.
    ///
    /// Bytecode is not validated here; a bad module surfaces on first
    /// execution.
    pub fn register(&self, name: impl Into<String>, bytecode: impl Into<Arc<[u8]>>) {
        let name = name.into();
        let bytecode = bytecode.into();
        let size = bytecode.len();

        let replaced = self.functions.write().insert(name.clone(), bytecode).is_some();
        debug!(function = %name, size, replaced, "Function registered");
    }

    /// Run the export called `name` from the module registered as `name`
    pub fn execute(&self, name: &str, args: &[u64]) -> Result<u64> {
        let bytecode = self
            .functions
            .read()
            .get(name)
            .cloned()
            .ok_or_else(|| Error::function_not_found(name))?;

        self.runner.run(name, &bytecode, args)
    }

    #[cfg(test)]
    pub fn contains(&self, name: &str) -> bool {
        self.functions.read().contains_key(name)
    }

    pub fn len(&self) -> usize {
        self.functions.read().len()
    }

    #[cfg(test)]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}
