//! DWARF debug metadata.
//!
//! When enabled, the module gets a compile unit pointing at the source
//! filename, and every materialized function (the entry point included)
//! gets a subprogram so profilers and debuggers can attribute samples.
//! Types and variable locations are not described; this is the minimum
//! metadata that keeps the module verifiable and symbolicated.

use inkwell::debug_info::{
    AsDIScope, DICompileUnit, DIFile, DIFlags, DIFlagsConstants, DWARFEmissionKind,
    DWARFSourceLanguage, DebugInfoBuilder,
};
use inkwell::module::Module;
use inkwell::values::FunctionValue;
use std::path::Path;

pub struct DebugInfoGenerator<'ctx> {
    builder: DebugInfoBuilder<'ctx>,
    compile_unit: DICompileUnit<'ctx>,
    file: DIFile<'ctx>,
}

impl<'ctx> DebugInfoGenerator<'ctx> {
    pub fn new(module: &Module<'ctx>, source_file: &str) -> Self {
        let path = Path::new(source_file);
        let directory = path
            .parent()
            .map(|p| p.to_string_lossy().to_string())
            .unwrap_or_else(|| ".".to_string());
        let filename = path
            .file_name()
            .map(|n| n.to_string_lossy().to_string())
            .unwrap_or_else(|| source_file.to_string());

        let (builder, compile_unit) = module.create_debug_info_builder(
            true,
            DWARFSourceLanguage::C,
            &filename,
            &directory,
            "berylc",
            false,
            "",
            0,
            "",
            DWARFEmissionKind::Full,
            0,
            true,
            false,
            "",
            "",
        );
        let file = builder.create_file(&filename, &directory);
        DebugInfoGenerator {
            builder,
            compile_unit,
            file,
        }
    }

    /// Attaches a minimal subprogram to `fun`.
    pub fn attach_subprogram(&self, fun: FunctionValue<'ctx>, name: &str) {
        let fn_type = self
            .builder
            .create_subroutine_type(self.file, None, &[], DIFlags::PUBLIC);
        let subprogram = self.builder.create_function(
            self.compile_unit.as_debug_info_scope(),
            name,
            None,
            self.file,
            0,
            fn_type,
            true,
            true,
            0,
            DIFlags::PUBLIC,
            false,
        );
        fun.set_subprogram(subprogram);
    }

    pub fn finalize(&self) {
        self.builder.finalize();
    }
}
