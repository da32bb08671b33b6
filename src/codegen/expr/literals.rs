//! Literal lowering.
//!
//! Scalar literals become LLVM constants directly. String literals are
//! interned module-level constants (see `CodeGen::intern_string_literal`);
//! symbol literals become their interned id, an index into the emitted
//! `symbol_table` global.

use inkwell::values::BasicValueEnum;

use crate::diagnostics::{bug, DiagnosticResult};
use crate::types::NumberKind;

use super::super::CodeGen;

impl<'ctx, 'p> CodeGen<'ctx, 'p> {
    pub(crate) fn lower_bool_literal(&self, value: bool) -> BasicValueEnum<'ctx> {
        self.i1_t.const_int(value as u64, false).into()
    }

    /// Characters are single bytes; wider code points are rejected upstream.
    pub(crate) fn lower_char_literal(&self, value: char) -> BasicValueEnum<'ctx> {
        self.i8_t.const_int(value as u32 as u64, false).into()
    }

    pub(crate) fn lower_number_literal(
        &self,
        text: &str,
        kind: NumberKind,
    ) -> DiagnosticResult<BasicValueEnum<'ctx>> {
        if kind.is_float() {
            let parsed: f64 = text
                .parse()
                .map_err(|_| self.op_err("malformed float literal"))?;
            let float_ty = if kind == NumberKind::F32 {
                self.f32_t
            } else {
                self.f64_t
            };
            return Ok(float_ty.const_float(parsed).into());
        }
        let int_ty = self.context.custom_width_int_type(kind.bits());
        let value = if kind.is_signed() {
            let parsed: i64 = text
                .parse()
                .map_err(|_| self.op_err("malformed integer literal"))?;
            int_ty.const_int(parsed as u64, true)
        } else {
            let parsed: u64 = text
                .parse()
                .map_err(|_| self.op_err("malformed integer literal"))?;
            int_ty.const_int(parsed, false)
        };
        Ok(value.into())
    }

    pub(crate) fn lower_symbol_literal(
        &self,
        name: &str,
    ) -> DiagnosticResult<BasicValueEnum<'ctx>> {
        match self.symbol_id(name) {
            Ok(id) => Ok(self.i32_t.const_int(id as u64, false).into()),
            Err(_) => bug(format!("symbol :{} was not collected", name)),
        }
    }
}
