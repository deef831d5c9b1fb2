//! Entry invoker
//!
//! Resolves the `run` symbol of a finalized module and calls it as native
//! code. Calls into JIT-compiled code go through [`call_entry`] and
//! [`call_constructors`], nothing else in the driver jumps to native code.

use crate::compile::CompiledModule;
use crate::error::{DriverError, DriverResult};
use crate::jit::context::JitEngine;
use inkwell::module::Module;
use inkwell::types::BasicTypeEnum;
use log::debug;

/// Symbol every program must define as `i32 ()`
pub const ENTRY_SYMBOL: &str = "run";

/// Signature the entry symbol is called with
const ENTRY_SIGNATURE: &str = "i32 ()";

type EntryFn = unsafe extern "C" fn() -> i32;

type ConstructorsFn = unsafe extern "C" fn();

/// Execution statistics
#[derive(Debug, Default)]
pub struct InvokeStats {
    pub invocations: u64,
}

/// Calls the entry point of finalized modules
#[derive(Debug, Default)]
pub struct EntryInvoker {
    pub stats: InvokeStats,
}

impl EntryInvoker {
    pub fn new() -> Self {
        Self::default()
    }

    /// Resolve and call `run` in `compiled`, returning its result verbatim.
    ///
    /// Blocks until the native code returns. Calling again on the same module
    /// is allowed and re-runs the program.
    pub fn invoke<'ctx>(
        &mut self,
        engine: &JitEngine<'ctx>,
        compiled: &mut CompiledModule<'ctx>,
    ) -> DriverResult<i32> {
        if !compiled.stage().can_resolve() {
            return Err(DriverError::NotFinalized(compiled.stage()));
        }

        check_entry(compiled.module())?;
        let address = engine.function_address(ENTRY_SYMBOL)?;
        debug!("resolved `{}` at {:#x}", ENTRY_SYMBOL, address);

        // SAFETY: `check_entry` confirmed the module defines `run` as `i32 ()`
        // and the engine finalized it before handing out the address.
        let result = unsafe { call_entry(address) };

        self.stats.invocations += 1;
        compiled.mark_executed();

        debug!("`{}` returned {}", ENTRY_SYMBOL, result);
        Ok(result)
    }
}

/// Check that `module` itself defines the entry symbol with the expected type
fn check_entry(module: &Module<'_>) -> DriverResult<()> {
    let function = module
        .get_function(ENTRY_SYMBOL)
        .filter(|f| f.get_first_basic_block().is_some())
        .ok_or_else(|| DriverError::SymbolNotFound(ENTRY_SYMBOL.to_string()))?;

    let fn_type = function.get_type();
    let returns_i32 = matches!(
        fn_type.get_return_type(),
        Some(BasicTypeEnum::IntType(ty)) if ty.get_bit_width() == 32
    );

    if !returns_i32 || fn_type.count_param_types() != 0 || fn_type.is_var_arg() {
        return Err(DriverError::SignatureMismatch {
            symbol: ENTRY_SYMBOL.to_string(),
            expected: ENTRY_SIGNATURE,
            found: fn_type.print_to_string().to_string(),
        });
    }
    Ok(())
}

/// Call native code at `address` as `extern "C" fn() -> i32`.
///
/// # Safety
/// `address` must be the start of finalized machine code for a function
/// taking no arguments and returning a 32-bit integer under the host C ABI.
unsafe fn call_entry(address: usize) -> i32 {
    let entry: EntryFn = std::mem::transmute(address);
    entry()
}

/// Call the static constructor thunk of a freshly registered module.
///
/// # Safety
/// `address` must be the start of finalized machine code for an
/// `extern "C" fn()` emitted by the engine at registration.
pub(crate) unsafe fn call_constructors(address: usize) {
    let thunk: ConstructorsFn = std::mem::transmute(address);
    thunk()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::compile::{ModuleCompiler, ModuleStage};
    use inkwell::context::Context;

    fn compile<'ctx>(engine: &mut JitEngine<'ctx>, ir: &str) -> CompiledModule<'ctx> {
        ModuleCompiler::new().compile(engine, ir, false).unwrap()
    }

    #[test]
    fn test_invoke_returns_value() {
        let context = Context::create();
        let mut engine = JitEngine::new(&context).unwrap();
        let mut compiled = compile(&mut engine, "define i32 @run() {\n  ret i32 42\n}\n");

        let mut invoker = EntryInvoker::new();
        assert_eq!(invoker.invoke(&engine, &mut compiled).unwrap(), 42);
        assert_eq!(compiled.stage(), ModuleStage::Executed);
        assert_eq!(invoker.stats.invocations, 1);
    }

    #[test]
    fn test_negative_result_verbatim() {
        let context = Context::create();
        let mut engine = JitEngine::new(&context).unwrap();
        let mut compiled = compile(&mut engine, "define i32 @run() {\n  ret i32 -7\n}\n");

        assert_eq!(
            EntryInvoker::new().invoke(&engine, &mut compiled).unwrap(),
            -7
        );
    }

    #[test]
    fn test_declared_only_entry_is_missing() {
        let context = Context::create();
        let mut engine = JitEngine::new(&context).unwrap();
        let ir = "declare i32 @run()\n\ndefine i32 @main() {\n  ret i32 0\n}\n";
        let mut compiled = compile(&mut engine, ir);

        match EntryInvoker::new().invoke(&engine, &mut compiled) {
            Err(DriverError::SymbolNotFound(name)) => assert_eq!(name, ENTRY_SYMBOL),
            other => panic!("Expected SymbolNotFound, got {:?}", other),
        }
        assert_eq!(compiled.stage(), ModuleStage::Finalized);
    }

    #[test]
    fn test_signature_mismatch() {
        let context = Context::create();
        let mut engine = JitEngine::new(&context).unwrap();
        let ir = "define i64 @run(i32 %x) {\n  %r = sext i32 %x to i64\n  ret i64 %r\n}\n";
        let mut compiled = compile(&mut engine, ir);

        match EntryInvoker::new().invoke(&engine, &mut compiled) {
            Err(DriverError::SignatureMismatch { found, .. }) => {
                assert!(found.starts_with("i64"), "found {}", found)
            }
            other => panic!("Expected SignatureMismatch, got {:?}", other),
        }
    }

    #[test]
    fn test_unfinalized_module_rejected() {
        let context = Context::create();
        let mut engine = JitEngine::new(&context).unwrap();
        let mut compiled = compile(&mut engine, "define i32 @run() {\n  ret i32 1\n}\n");
        compiled.stage = ModuleStage::Verified;

        match EntryInvoker::new().invoke(&engine, &mut compiled) {
            Err(DriverError::NotFinalized(stage)) => assert_eq!(stage, ModuleStage::Verified),
            other => panic!("Expected NotFinalized, got {:?}", other),
        }
    }
}
