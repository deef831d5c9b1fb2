//! Fixed optimization pipeline
//!
//! The pipeline is a constant value: which passes run, in which order, and
//! with which builder parameters. Applying it hands everything to LLVM's
//! legacy pass managers and records whether each run changed the IR.

use inkwell::module::Module;
use inkwell::passes::{PassManager, PassManagerBuilder, PassManagerSubType};
use inkwell::values::FunctionValue;
use inkwell::OptimizationLevel;
use log::info;
use serde::Serialize;

/// Passes scheduled on the module pass manager, in run order
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ModulePass {
    ConstantMerge,
    DeadArgElimination,
    FunctionAttrs,
    FunctionInlining,
    GlobalDce,
    GlobalOptimizer,
    Ipsccp,
    DeadCodeElimination,
    CfgSimplification,
    Gvn,
    InstructionCombining,
    Licm,
    Sccp,
    Sroa,
    TypeBasedAliasAnalysis,
    BasicAliasAnalysis,
}

impl ModulePass {
    pub fn name(&self) -> &'static str {
        match self {
            ModulePass::ConstantMerge => "constmerge",
            ModulePass::DeadArgElimination => "deadargelim",
            ModulePass::FunctionAttrs => "function-attrs",
            ModulePass::FunctionInlining => "inline",
            ModulePass::GlobalDce => "globaldce",
            ModulePass::GlobalOptimizer => "globalopt",
            ModulePass::Ipsccp => "ipsccp",
            ModulePass::DeadCodeElimination => "adce",
            ModulePass::CfgSimplification => "simplifycfg",
            ModulePass::Gvn => "gvn",
            ModulePass::InstructionCombining => "instcombine",
            ModulePass::Licm => "licm",
            ModulePass::Sccp => "sccp",
            ModulePass::Sroa => "sroa",
            ModulePass::TypeBasedAliasAnalysis => "tbaa",
            ModulePass::BasicAliasAnalysis => "basic-aa",
        }
    }

    fn schedule<T: PassManagerSubType>(self, pm: &PassManager<T>) {
        match self {
            ModulePass::ConstantMerge => pm.add_constant_merge_pass(),
            ModulePass::DeadArgElimination => pm.add_dead_arg_elimination_pass(),
            ModulePass::FunctionAttrs => pm.add_function_attrs_pass(),
            ModulePass::FunctionInlining => pm.add_function_inlining_pass(),
            ModulePass::GlobalDce => pm.add_global_dce_pass(),
            ModulePass::GlobalOptimizer => pm.add_global_optimizer_pass(),
            ModulePass::Ipsccp => pm.add_ipsccp_pass(),
            ModulePass::DeadCodeElimination => pm.add_aggressive_dce_pass(),
            ModulePass::CfgSimplification => pm.add_cfg_simplification_pass(),
            ModulePass::Gvn => pm.add_gvn_pass(),
            ModulePass::InstructionCombining => pm.add_instruction_combining_pass(),
            ModulePass::Licm => pm.add_licm_pass(),
            ModulePass::Sccp => pm.add_sccp_pass(),
            ModulePass::Sroa => pm.add_scalar_repl_aggregates_pass(),
            ModulePass::TypeBasedAliasAnalysis => pm.add_type_based_alias_analysis_pass(),
            ModulePass::BasicAliasAnalysis => pm.add_basic_alias_analysis_pass(),
        }
    }
}

/// Passes scheduled on the per-function pass manager
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum FunctionPass {
    BasicAliasAnalysis,
}

impl FunctionPass {
    pub fn name(&self) -> &'static str {
        match self {
            FunctionPass::BasicAliasAnalysis => "basic-aa",
        }
    }

    fn schedule<T: PassManagerSubType>(self, pm: &PassManager<T>) {
        match self {
            FunctionPass::BasicAliasAnalysis => pm.add_basic_alias_analysis_pass(),
        }
    }
}

/// Immutable description of the optimization pipeline
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct PassPipeline {
    /// Builder optimization level (0-3)
    pub opt_level: u32,
    /// Inliner threshold handed to the pass manager builder
    pub inlining_threshold: u32,
    pub loop_vectorize: bool,
    pub disable_unroll_loops: bool,
    /// Run per function before the module passes
    pub function_passes: &'static [FunctionPass],
    pub module_passes: &'static [ModulePass],
}

impl PassPipeline {
    /// The one pipeline the driver runs when optimization is requested
    pub const FIXED: PassPipeline = PassPipeline {
        opt_level: 3,
        inlining_threshold: 3,
        loop_vectorize: true,
        disable_unroll_loops: true,
        function_passes: &[FunctionPass::BasicAliasAnalysis],
        module_passes: &[
            ModulePass::ConstantMerge,
            ModulePass::DeadArgElimination,
            ModulePass::FunctionAttrs,
            ModulePass::FunctionInlining,
            ModulePass::GlobalDce,
            ModulePass::GlobalOptimizer,
            ModulePass::Ipsccp,
            ModulePass::DeadCodeElimination,
            ModulePass::CfgSimplification,
            ModulePass::Gvn,
            ModulePass::InstructionCombining,
            ModulePass::Licm,
            ModulePass::Sccp,
            ModulePass::Sroa,
            ModulePass::TypeBasedAliasAnalysis,
            ModulePass::BasicAliasAnalysis,
        ],
    };

    pub fn optimization_level(&self) -> OptimizationLevel {
        match self.opt_level {
            0 => OptimizationLevel::None,
            1 => OptimizationLevel::Less,
            2 => OptimizationLevel::Default,
            _ => OptimizationLevel::Aggressive,
        }
    }

    fn builder(&self) -> PassManagerBuilder {
        let builder = PassManagerBuilder::create();
        builder.set_optimization_level(self.optimization_level());
        builder.set_inliner_with_threshold(self.inlining_threshold);
        builder.set_disable_unroll_loops(self.disable_unroll_loops);
        builder
    }

    /// Run the pipeline over `module` in place.
    ///
    /// Change signals are only reported; they never alter what runs next.
    pub fn run<'ctx>(&self, module: &Module<'ctx>, log_changes: bool) -> OptimizationReport {
        let builder = self.builder();

        let fpm: PassManager<FunctionValue<'ctx>> = PassManager::create(module);
        for pass in self.function_passes {
            pass.schedule(&fpm);
        }
        builder.populate_function_pass_manager(&fpm);

        let mpm: PassManager<Module<'ctx>> = PassManager::create(());
        for pass in self.module_passes {
            pass.schedule(&mpm);
        }
        if self.loop_vectorize {
            mpm.add_loop_vectorize_pass();
        }
        builder.populate_module_pass_manager(&mpm);

        let mut functions = Vec::new();
        fpm.initialize();
        for function in module.get_functions() {
            if function.get_first_basic_block().is_none() {
                continue;
            }
            let name = function.get_name().to_string_lossy().into_owned();
            let changed = fpm.run_on(&function);
            if log_changes {
                info!("optimize function `{}`: changed={}", name, changed);
            }
            functions.push(FunctionChange { name, changed });
        }
        fpm.finalize();

        let module_changed = mpm.run_on(module);
        if log_changes {
            info!("optimize module: changed={}", module_changed);
        }

        OptimizationReport {
            functions,
            module_changed,
        }
    }
}

impl Default for PassPipeline {
    fn default() -> Self {
        Self::FIXED
    }
}

/// Whether the per-function pass manager changed one function
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct FunctionChange {
    pub name: String,
    pub changed: bool,
}

/// Change signals collected from one pipeline run
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct OptimizationReport {
    pub functions: Vec<FunctionChange>,
    pub module_changed: bool,
}

impl OptimizationReport {
    pub fn any_changed(&self) -> bool {
        self.module_changed || self.functions.iter().any(|f| f.changed)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::jit::init_native_target;
    use inkwell::context::Context;
    use inkwell::memory_buffer::MemoryBuffer;

    #[test]
    fn test_fixed_constants() {
        let pipeline = PassPipeline::FIXED;
        assert_eq!(pipeline.opt_level, 3);
        assert_eq!(pipeline.inlining_threshold, 3);
        assert!(pipeline.loop_vectorize);
        assert!(pipeline.disable_unroll_loops);
        assert_eq!(pipeline.optimization_level(), OptimizationLevel::Aggressive);
        assert_eq!(PassPipeline::default(), pipeline);
    }

    #[test]
    fn test_pass_order() {
        let names: Vec<_> = PassPipeline::FIXED
            .module_passes
            .iter()
            .map(|p| p.name())
            .collect();
        assert_eq!(
            names,
            vec![
                "constmerge",
                "deadargelim",
                "function-attrs",
                "inline",
                "globaldce",
                "globalopt",
                "ipsccp",
                "adce",
                "simplifycfg",
                "gvn",
                "instcombine",
                "licm",
                "sccp",
                "sroa",
                "tbaa",
                "basic-aa",
            ]
        );
        assert_eq!(
            PassPipeline::FIXED.function_passes,
            &[FunctionPass::BasicAliasAnalysis]
        );
    }

    #[test]
    fn test_pipeline_serializes() {
        let text = toml::to_string(&PassPipeline::FIXED).unwrap();
        assert!(text.contains("inlining_threshold = 3"));
        assert!(text.contains("\"type_based_alias_analysis\""));
    }

    #[test]
    fn test_run_reports_changes() {
        init_native_target().unwrap();
        let context = Context::create();
        let ir = r#"
define internal i32 @double(i32 %x) {
  %r = mul i32 %x, 2
  ret i32 %r
}

define i32 @run() {
  %slot = alloca i32
  store i32 21, i32* %slot
  %v = load i32, i32* %slot
  %r = call i32 @double(i32 %v)
  ret i32 %r
}
"#;
        let buffer = MemoryBuffer::create_from_memory_range_copy(ir.as_bytes(), "test");
        let module = context.create_module_from_ir(buffer).unwrap();

        let report = PassPipeline::FIXED.run(&module, false);

        assert!(report.any_changed());
        assert_eq!(report.functions.len(), 2);
        assert!(module.verify().is_ok());

        let text = module.print_to_string().to_string();
        assert!(text.contains("ret i32 42"), "not folded:\n{}", text);
        assert!(!text.contains("alloca"));
    }
}
