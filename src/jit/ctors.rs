//! Per-module static constructors
//!
//! MCJIT's `runStaticConstructorsDestructors` walks every module the engine
//! owns, so constructors of earlier modules would run again each time a new
//! module is finalized. Instead each module's `llvm.global_ctors` list is
//! lowered into one external `void ()` thunk that is called exactly once,
//! right after that module is registered.

use crate::error::{DriverError, DriverResult};
use inkwell::context::Context;
use inkwell::module::Module;
use inkwell::values::AsValueRef;
use llvm_sys::core::{
    LLVMConstIntGetZExtValue, LLVMDeleteGlobal, LLVMGetInitializer, LLVMGetNumOperands,
    LLVMGetOperand, LLVMGetValueName2, LLVMIsAConstantInt, LLVMIsAFunction,
};
use log::{debug, warn};

/// Special global LLVM collects static constructors in
const GLOBAL_CTORS: &str = "llvm.global_ctors";

/// Remove `llvm.global_ctors` from `module` and return the constructor names
/// in run order (ascending priority, stable for equal priorities).
pub(crate) fn take_constructors(module: &Module<'_>) -> Vec<String> {
    let Some(global) = module.get_global(GLOBAL_CTORS) else {
        return Vec::new();
    };

    let mut ctors: Vec<(u64, String)> = Vec::new();

    // SAFETY: `global` belongs to `module`, which is alive for this call. Only
    // constant operands of its initializer are read before it is deleted, and
    // the deleted global is not touched afterwards.
    unsafe {
        let raw = global.as_value_ref();
        let init = LLVMGetInitializer(raw);
        if !init.is_null() {
            // zeroinitializer has no operands
            for i in 0..LLVMGetNumOperands(init).max(0) as u32 {
                let entry = LLVMGetOperand(init, i);
                if LLVMGetNumOperands(entry) < 2 {
                    continue;
                }

                let priority = LLVMGetOperand(entry, 0);
                let priority = if LLVMIsAConstantInt(priority).is_null() {
                    u64::from(u16::MAX)
                } else {
                    LLVMConstIntGetZExtValue(priority)
                };

                let function = LLVMGetOperand(entry, 1);
                if LLVMIsAFunction(function).is_null() {
                    warn!("skipping static constructor that is not a plain function");
                    continue;
                }

                let mut len = 0usize;
                let name = LLVMGetValueName2(function, &mut len);
                let bytes = std::slice::from_raw_parts(name as *const u8, len);
                ctors.push((priority, String::from_utf8_lossy(bytes).into_owned()));
            }
        }
        LLVMDeleteGlobal(raw);
    }

    ctors.sort_by_key(|(priority, _)| *priority);
    ctors.into_iter().map(|(_, name)| name).collect()
}

/// Add an external `void ()` function named `thunk` to `module` that calls
/// each constructor in order.
pub(crate) fn emit_thunk<'ctx>(
    context: &'ctx Context,
    module: &Module<'ctx>,
    thunk: &str,
    ctors: &[String],
) -> DriverResult<()> {
    let function = module.add_function(thunk, context.void_type().fn_type(&[], false), None);
    let builder = context.create_builder();
    builder.position_at_end(context.append_basic_block(function, "entry"));

    for name in ctors {
        let ctor = module.get_function(name).ok_or_else(|| {
            DriverError::Registration(format!("static constructor `{}` vanished", name))
        })?;
        builder
            .build_call(ctor, &[], "")
            .map_err(|e| DriverError::Registration(e.to_string()))?;
    }
    builder
        .build_return(None)
        .map_err(|e| DriverError::Registration(e.to_string()))?;

    debug!("lowered {} static constructor(s) into `{}`", ctors.len(), thunk);
    Ok(())
}
