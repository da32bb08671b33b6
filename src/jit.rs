//! JIT execution of compiled programs.
//!
//! The harness compiles a program, runs a conservative module pass pipeline,
//! and executes the emitted `main` wrapper (which forwards `(0, null)` to
//! `__crystal_main` and converts the program value to an exit code) inside
//! an LLVM execution engine at optimization level 1.

use inkwell::context::Context;
use inkwell::module::Module;
use inkwell::passes::PassManager;
use inkwell::targets::{InitializationConfig, Target};
use inkwell::OptimizationLevel;

use crate::program::Program;
use crate::CodegenOptions;

/// A conservative cleanup pipeline run before execution: promote slots to
/// registers and simplify the control-flow skeleton the emitter produced.
pub fn optimize_module(module: &Module) {
    let mpm: PassManager<Module> = PassManager::create(());
    mpm.add_promote_memory_to_register_pass();
    mpm.add_reassociate_pass();
    mpm.add_sccp_pass();
    mpm.add_cfg_simplification_pass();
    mpm.add_aggressive_dce_pass();
    mpm.run_on(module);
}

/// Compiles `program` and runs it to completion, returning the process exit
/// value produced by the `main` wrapper.
pub fn run_program(program: &Program, options: &CodegenOptions) -> anyhow::Result<i32> {
    Target::initialize_native(&InitializationConfig::default())
        .map_err(|e| anyhow::anyhow!("failed to initialize native target: {}", e))?;

    let context = Context::create();
    let module = crate::compile_program(&context, program, options)?;
    if options.optimize {
        optimize_module(&module);
    }

    let engine = module
        .create_jit_execution_engine(OptimizationLevel::Less)
        .map_err(|e| anyhow::anyhow!("failed to create execution engine: {}", e.to_string()))?;

    let main = unsafe {
        engine
            .get_function::<unsafe extern "C" fn() -> i32>("main")
            .map_err(|e| anyhow::anyhow!("entry point lookup failed: {}", e))?
    };
    Ok(unsafe { main.call() })
}
