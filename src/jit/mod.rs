//! JIT Execution Engine
//!
//! This module provisions the host execution context and invokes the entry
//! point of modules finalized in it:
//! - One-time native target registration
//! - Host target machine and MCJIT engine
//! - Per-module static constructors
//! - Entry symbol resolution behind a narrow unsafe call boundary

mod context;
mod ctors;
mod executor;

pub use context::{init_native_target, JitEngine};
pub use executor::{EntryInvoker, InvokeStats, ENTRY_SYMBOL};
