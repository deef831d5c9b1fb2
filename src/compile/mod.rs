//! Compilation module
//!
//! Parses, optimizes, verifies and finalizes LLVM IR modules.

pub mod engine;
pub mod passes;

pub use engine::{CompiledModule, ModuleCompiler, ModuleStage};
pub use passes::{FunctionChange, FunctionPass, ModulePass, OptimizationReport, PassPipeline};
