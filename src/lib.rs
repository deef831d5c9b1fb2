//! ekjit - JIT driver for LLVM textual IR
//!
//! Hands a textual LLVM IR program to LLVM's MCJIT backend, optionally runs a
//! fixed optimization pipeline over it, and executes its `run` entry point.
//! Parsing, verification, optimization and code generation all belong to
//! LLVM; this crate only sequences them.
//!
//! # Example
//!
//! ```no_run
//! let execution = ekjit::compile_and_execute(
//!     "define i32 @run() {\n  ret i32 42\n}\n",
//!     true,
//! ).unwrap();
//!
//! assert_eq!(execution.result, 42);
//! println!("{}", execution.module_ir);
//! ```
//!
//! # Architecture
//!
//! ```text
//! ┌─────────────────┐
//! │   IR text       │  produced upstream (ekcc)
//! └────────┬────────┘
//!          │ ModuleCompiler: parse → [optimize] → verify
//!          ▼
//! ┌─────────────────┐
//! │   JitEngine     │  register + finalize (MCJIT)
//! └────────┬────────┘
//!          │ EntryInvoker: resolve `run`
//!          ▼
//! ┌─────────────────┐
//! │   i32 result    │
//! └─────────────────┘
//! ```

#![warn(clippy::all)]

pub mod compile;
pub mod config;
pub mod error;
pub mod jit;

pub use compile::{CompiledModule, ModuleCompiler, ModuleStage, OptimizationReport, PassPipeline};
pub use config::{CodegenLevel, ConfigError, DriverConfig, EngineConfig};
pub use error::{DriverError, DriverResult, ErrorKind};
pub use jit::{init_native_target, EntryInvoker, JitEngine, ENTRY_SYMBOL};

use inkwell::context::Context;

/// Outcome of one compile/execute cycle
#[derive(Debug, Clone)]
pub struct Execution {
    /// Module text at verification time (after optimization, if any)
    pub module_ir: String,
    /// Value returned by `run`
    pub result: i32,
    /// Pass change signals when the pipeline ran
    pub report: Option<OptimizationReport>,
}

/// Compile `source` on a fresh engine and run its entry point
pub fn compile_and_execute(source: &str, optimize: bool) -> DriverResult<Execution> {
    Driver::default().execute(source, optimize)
}

/// Compile-and-run front door configured from [`DriverConfig`]
#[derive(Debug, Clone, Default)]
pub struct Driver {
    config: DriverConfig,
}

impl Driver {
    pub fn new(config: DriverConfig) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &DriverConfig {
        &self.config
    }

    /// Run `source` using the configured `optimize` default
    pub fn run(&self, source: &str) -> DriverResult<Execution> {
        self.execute(source, self.config.driver.optimize)
    }

    /// Run `source` on a fresh context and engine
    pub fn execute(&self, source: &str, optimize: bool) -> DriverResult<Execution> {
        let context = Context::create();
        let mut engine = JitEngine::with_config(&context, &self.config.engine)?;

        let mut compiled = ModuleCompiler::new()
            .log_pass_changes(self.config.driver.log_pass_changes)
            .compile(&mut engine, source, optimize)?;
        let result = EntryInvoker::new().invoke(&engine, &mut compiled)?;

        Ok(Execution {
            module_ir: compiled.ir().to_string(),
            result,
            report: compiled.report().cloned(),
        })
    }
}

/// Library version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_compile_and_execute() {
        let execution =
            compile_and_execute("define i32 @run() {\n  ret i32 42\n}\n", false).unwrap();

        assert_eq!(execution.result, 42);
        assert!(execution.module_ir.contains("@run"));
        assert!(execution.report.is_none());
    }

    #[test]
    fn test_driver_uses_configured_default() {
        let mut config = DriverConfig::default();
        config.driver.optimize = true;
        config.driver.log_pass_changes = false;

        let execution = Driver::new(config)
            .run("define i32 @run() {\n  ret i32 7\n}\n")
            .unwrap();

        assert_eq!(execution.result, 7);
        assert!(execution.report.is_some());
    }
}
