//! JIT Execution Context
//!
//! Owns the host target machine, an empty backing module and the MCJIT
//! execution engine that every compiled module is registered with.

use crate::config::EngineConfig;
use crate::error::{DriverError, DriverResult};
use crate::jit::ctors::{emit_thunk, take_constructors};
use crate::jit::executor::call_constructors;
use inkwell::context::Context;
use inkwell::execution_engine::ExecutionEngine;
use inkwell::module::{Linkage, Module};
use inkwell::OptimizationLevel;
use inkwell::targets::{
    CodeModel, InitializationConfig, RelocMode, Target, TargetMachine, TargetTriple,
};
use log::{debug, warn};
use once_cell::sync::OnceCell;
use std::collections::HashSet;

/// Outcome of the process-wide target registration, cached on first call
static NATIVE_TARGET: OnceCell<Result<(), String>> = OnceCell::new();

/// Register the native target, asm printer and asm parser with LLVM.
///
/// Safe to call any number of times; registration happens once per process
/// and later calls return the cached outcome.
pub fn init_native_target() -> DriverResult<()> {
    NATIVE_TARGET
        .get_or_init(|| {
            debug!("registering native LLVM target");
            ExecutionEngine::link_in_mc_jit();
            Target::initialize_native(&InitializationConfig::default())
        })
        .clone()
        .map_err(DriverError::BackendInitialization)
}

/// Reusable JIT execution context bound to the host machine
pub struct JitEngine<'ctx> {
    context: &'ctx Context,
    target_machine: TargetMachine,
    /// Kept alive alongside the engine it was created from
    _backing: Module<'ctx>,
    execution_engine: ExecutionEngine<'ctx>,
    /// Externally visible symbols defined by registered modules
    defined: HashSet<String>,
    modules_registered: usize,
    /// Suffix for the next static constructor thunk
    next_thunk: u64,
}

impl<'ctx> JitEngine<'ctx> {
    /// Create an engine for the host with default code generation settings
    pub fn new(context: &'ctx Context) -> DriverResult<Self> {
        Self::with_config(context, &EngineConfig::default())
    }

    /// Create an engine for the host with custom code generation settings
    pub fn with_config(context: &'ctx Context, config: &EngineConfig) -> DriverResult<Self> {
        init_native_target()?;

        let triple = TargetMachine::get_default_triple();
        let target = Target::from_triple(&triple)
            .map_err(|e| DriverError::BackendInitialization(e.to_string()))?;

        let cpu = TargetMachine::get_host_cpu_name().to_string();
        let features = TargetMachine::get_host_cpu_features().to_string();
        let level: OptimizationLevel = config.codegen_opt_level.into();

        let target_machine = target
            .create_target_machine(
                &triple,
                &cpu,
                &features,
                level,
                RelocMode::Default,
                CodeModel::JITDefault,
            )
            .ok_or_else(|| {
                DriverError::BackendInitialization(format!(
                    "cannot describe native target {}",
                    triple.as_str().to_string_lossy()
                ))
            })?;

        let backing = context.create_module("ekjit_backing");
        backing.set_triple(&triple);
        backing.set_data_layout(&target_machine.get_target_data().get_data_layout());

        let execution_engine = backing
            .create_jit_execution_engine(level)
            .map_err(|e| DriverError::BackendInitialization(e.to_string()))?;

        debug!(
            "provisioned JIT engine for {} (cpu {})",
            triple.as_str().to_string_lossy(),
            cpu
        );

        Ok(Self {
            context,
            target_machine,
            _backing: backing,
            execution_engine,
            defined: HashSet::new(),
            modules_registered: 0,
            next_thunk: 0,
        })
    }

    /// LLVM context every module of this engine lives in
    pub fn context(&self) -> &'ctx Context {
        self.context
    }

    pub fn target_machine(&self) -> &TargetMachine {
        &self.target_machine
    }

    /// Host target triple
    pub fn triple(&self) -> TargetTriple {
        self.target_machine.get_triple()
    }

    /// Number of modules registered so far
    pub fn modules_registered(&self) -> usize {
        self.modules_registered
    }

    /// Stamp the host triple and data layout onto a module that lacks them
    pub(crate) fn retarget(&self, module: &Module<'ctx>) {
        if module.get_triple().as_str().to_bytes().is_empty() {
            module.set_triple(&self.triple());
        }
        if module.get_data_layout().as_str().to_bytes().is_empty() {
            module.set_data_layout(&self.target_machine.get_target_data().get_data_layout());
        }
    }

    /// Hand a verified module to the execution engine.
    ///
    /// MCJIT resolves symbols by name across every module it owns, so a
    /// module redefining a name that is already registered is refused before
    /// the engine sees it.
    ///
    /// The module's `llvm.global_ctors` list is moved into an external
    /// `void ()` thunk whose name is returned; pass it to [`Self::finalize`].
    /// MCJIT's own constructor runner would re-run the constructors of every
    /// earlier module as well.
    pub(crate) fn register(&mut self, module: &Module<'ctx>) -> DriverResult<String> {
        let exported = exported_symbols(module);

        if let Some(name) = exported.iter().find(|name| self.defined.contains(*name)) {
            warn!("refusing module: `{}` is already defined on this engine", name);
            return Err(DriverError::DuplicateSymbol(name.clone()));
        }

        let thunk = format!("ekjit.ctors.{}", self.next_thunk);
        let ctors = take_constructors(module);
        emit_thunk(self.context, module, &thunk, &ctors)?;

        self.execution_engine.add_module(module).map_err(|()| {
            DriverError::Registration("module is already owned by an execution engine".into())
        })?;

        self.next_thunk += 1;
        self.defined.extend(exported);
        self.modules_registered += 1;
        Ok(thunk)
    }

    /// Make registered machine code resident and run the static constructors
    /// of the module registered with `thunk`.
    ///
    /// Resolving the thunk finalizes all pending code, so this also runs when
    /// the module has no constructors.
    pub(crate) fn finalize(&self, thunk: &str) -> DriverResult<()> {
        let address = self.function_address(thunk).map_err(|_| {
            DriverError::Registration(format!("constructor thunk `{}` did not resolve", thunk))
        })?;

        // SAFETY: `thunk` was emitted by `register` as `void ()` with external
        // linkage, and `get_function_address` finalized the code behind it.
        unsafe { call_constructors(address) };
        Ok(())
    }

    /// Native address of a symbol in finalized code
    pub(crate) fn function_address(&self, name: &str) -> DriverResult<usize> {
        self.execution_engine
            .get_function_address(name)
            .map_err(|e| {
                debug!("lookup of `{}` failed: {}", name, e);
                DriverError::SymbolNotFound(name.to_string())
            })
    }
}

/// Names of externally visible definitions: functions with a body and
/// global variables with an initializer.
///
/// Local linkages never collide across modules. `available_externally`
/// bodies are copies of a definition that lives elsewhere, and `llvm.*`
/// globals are intrinsic metadata such as `llvm.used`.
fn exported_symbols(module: &Module<'_>) -> Vec<String> {
    fn exported(linkage: Linkage) -> bool {
        !matches!(
            linkage,
            Linkage::Internal | Linkage::Private | Linkage::AvailableExternally | Linkage::Appending
        )
    }

    let functions = module
        .get_functions()
        .filter(|f| f.get_first_basic_block().is_some() && exported(f.get_linkage()))
        .map(|f| f.get_name().to_string_lossy().into_owned());

    let globals = module
        .get_globals()
        .filter(|g| !g.is_declaration() && exported(g.get_linkage()))
        .map(|g| g.get_name().to_string_lossy().into_owned());

    functions
        .chain(globals)
        .filter(|name| !name.starts_with("llvm."))
        .collect()
}
