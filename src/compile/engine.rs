//! Module compiler
//!
//! Turns textual LLVM IR into a finalized module registered with a
//! [`JitEngine`]: parse, optionally optimize, verify, register, finalize.

use crate::compile::passes::{OptimizationReport, PassPipeline};
use crate::error::{DriverError, DriverResult};
use crate::jit::JitEngine;
use inkwell::memory_buffer::MemoryBuffer;
use inkwell::module::Module;
use log::debug;
use std::time::Instant;

/// Buffer name the backend reports in parse diagnostics
const SOURCE_NAME: &str = "ekjit_module";

/// Lifecycle of one compile/execute cycle
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum ModuleStage {
    Unparsed,
    Parsed,
    Optimized,
    Verified,
    Finalized,
    Executed,
}

impl ModuleStage {
    /// Symbol addresses may only be taken from finalized code
    pub fn can_resolve(&self) -> bool {
        matches!(self, ModuleStage::Finalized | ModuleStage::Executed)
    }
}

/// A verified module whose machine code is resident in a [`JitEngine`]
pub struct CompiledModule<'ctx> {
    /// Owned by the execution engine once registered
    pub(crate) module: Module<'ctx>,
    pub(crate) stage: ModuleStage,
    ir: String,
    report: Option<OptimizationReport>,
    compile_time_us: u64,
}

impl<'ctx> CompiledModule<'ctx> {
    pub fn module(&self) -> &Module<'ctx> {
        &self.module
    }

    pub fn stage(&self) -> ModuleStage {
        self.stage
    }

    /// Textual IR as it was when verification passed
    pub fn ir(&self) -> &str {
        &self.ir
    }

    /// Pass change signals, present only when the module was optimized
    pub fn report(&self) -> Option<&OptimizationReport> {
        self.report.as_ref()
    }

    pub fn is_optimized(&self) -> bool {
        self.report.is_some()
    }

    /// Parse-to-finalize wall time in microseconds
    pub fn compile_time_us(&self) -> u64 {
        self.compile_time_us
    }

    pub(crate) fn mark_executed(&mut self) {
        self.stage = ModuleStage::Executed;
    }
}

/// Drives source text through the backend up to finalized machine code
pub struct ModuleCompiler {
    pipeline: PassPipeline,
    log_pass_changes: bool,
}

impl ModuleCompiler {
    /// Create a compiler running [`PassPipeline::FIXED`]
    pub fn new() -> Self {
        Self {
            pipeline: PassPipeline::FIXED,
            log_pass_changes: true,
        }
    }

    /// Toggle logging of pass change signals (the report is always kept)
    pub fn log_pass_changes(mut self, enabled: bool) -> Self {
        self.log_pass_changes = enabled;
        self
    }

    /// Pass pipeline applied when optimization is requested
    pub fn pipeline(&self) -> &PassPipeline {
        &self.pipeline
    }

    /// Compile `source` and register it with `engine`.
    ///
    /// Fails with [`DriverError::Parse`] before anything else runs, and with
    /// [`DriverError::Verification`] before the engine sees the module.
    pub fn compile<'ctx>(
        &self,
        engine: &mut JitEngine<'ctx>,
        source: &str,
        optimize: bool,
    ) -> DriverResult<CompiledModule<'ctx>> {
        let start = Instant::now();
        let mut stage = ModuleStage::Unparsed;

        let buffer = MemoryBuffer::create_from_memory_range_copy(source.as_bytes(), SOURCE_NAME);
        let module = engine
            .context()
            .create_module_from_ir(buffer)
            .map_err(|e| DriverError::Parse(e.to_string()))?;
        engine.retarget(&module);
        advance(&mut stage, ModuleStage::Parsed);

        let report = if optimize {
            let report = self.pipeline.run(&module, self.log_pass_changes);
            advance(&mut stage, ModuleStage::Optimized);
            Some(report)
        } else {
            None
        };

        module
            .verify()
            .map_err(|e| DriverError::Verification(e.to_string()))?;
        let ir = module.print_to_string().to_string();
        advance(&mut stage, ModuleStage::Verified);

        let thunk = engine.register(&module)?;
        engine.finalize(&thunk)?;
        advance(&mut stage, ModuleStage::Finalized);

        Ok(CompiledModule {
            module,
            stage,
            ir,
            report,
            compile_time_us: start.elapsed().as_micros() as u64,
        })
    }
}

impl Default for ModuleCompiler {
    fn default() -> Self {
        Self::new()
    }
}

fn advance(stage: &mut ModuleStage, next: ModuleStage) {
    debug_assert!(next > *stage);
    debug!("module stage {:?} -> {:?}", stage, next);
    *stage = next;
}
