//! Code generation core for the Beryl language.
//!
//! The crate consumes a fully type-inferred [`program::Program`] — typed AST
//! plus the type oracle — and lowers it to a verified LLVM module suitable
//! for JIT execution ([`jit::run_program`]) or further ahead-of-time
//! processing. Parsing, inference and optimization policy live upstream; the
//! input is trusted to be well-typed and failures here are either internal
//! assertions or module verification errors, both carrying an IR dump.

pub mod ast;
pub mod codegen;
pub mod diagnostics;
pub mod jit;
pub mod program;
pub mod types;

use inkwell::context::Context;
use inkwell::module::Module;

/// Options for one code generation run.
///
/// Plain data: the compiler accepts explicit options rather than discovering
/// configuration from the environment. The only env hook is the
/// `BERYL_DUMP_IR` variable, which dumps the verified module to stderr.
#[derive(Debug, Clone)]
pub struct CodegenOptions {
    /// Name of the emitted LLVM module.
    pub module_name: String,
    /// Source filename recorded in debug metadata.
    pub source_file: String,
    /// Emit DWARF compile-unit/subprogram metadata.
    pub debug_info: bool,
    /// Run the cleanup pass pipeline before JIT execution.
    pub optimize: bool,
}

impl Default for CodegenOptions {
    fn default() -> Self {
        CodegenOptions {
            module_name: "main".to_string(),
            source_file: "main.beryl".to_string(),
            debug_info: false,
            optimize: true,
        }
    }
}

/// Compiles `program` into a verified LLVM module owned by `context`.
pub fn compile_program<'ctx>(
    context: &'ctx Context,
    program: &program::Program,
    options: &CodegenOptions,
) -> anyhow::Result<Module<'ctx>> {
    let generator = codegen::CodeGen::new(context, program, options.clone());
    generator
        .compile()
        .map_err(|d| anyhow::anyhow!("{}", d))?;
    let module = generator.finish().map_err(|d| anyhow::anyhow!("{}", d))?;
    if std::env::var("BERYL_DUMP_IR").is_ok() {
        eprintln!("{}", module.print_to_string().to_string());
    }
    Ok(module)
}
