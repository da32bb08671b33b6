//! Assignment lowering.
//!
//! Targets split into locals (declared on first assignment, slot in the
//! alloca block), instance variables (GEP through the receiver) and
//! global/class variables (lazy internal globals). Every store funnels
//! through `codegen_assign`: equal types store (or copy) directly, anything
//! else widens through the union utilities.

use inkwell::values::{BasicValueEnum, PointerValue};

use crate::ast::Node;
use crate::diagnostics::{bug, DiagnosticResult};
use crate::types::Ty;

use super::super::{CodeGen, VarBinding};

impl<'ctx, 'p> CodeGen<'ctx, 'p> {
    pub(crate) fn lower_assign(
        &self,
        target: &'p Node,
        value_node: &'p Node,
    ) -> DiagnosticResult<Option<BasicValueEnum<'ctx>>> {
        let value = self.lower_expr(value_node)?;
        if self.current_block_terminated() {
            return Ok(None);
        }
        let value_ty = value_node
            .ty()
            .unwrap_or_else(|| self.program.types.nil());

        match target {
            Node::Var { name, ty } => {
                let binding = self.declare_local(name, *ty)?;
                self.codegen_assign(binding.ptr, binding.ty, value_ty, value)?;
            }
            Node::InstanceVar { name, .. } => {
                let (field_ptr, field_ty) = self.instance_var_slot(name)?;
                self.codegen_assign(field_ptr, field_ty, value_ty, value)?;
            }
            Node::ClassVar { owner, name, ty } => {
                let mangled = format!("{}::{}", self.program.types.name(*owner), name);
                let binding = self.get_or_create_global(&mangled, *ty)?;
                self.codegen_assign(binding.ptr, binding.ty, value_ty, value)?;
            }
            Node::Global { name, ty } => {
                let binding = self.get_or_create_global(name, *ty)?;
                self.codegen_assign(binding.ptr, binding.ty, value_ty, value)?;
            }
            other => return bug(format!("unsupported assignment target {:?}", other)),
        }
        Ok(value.or_else(|| Some(self.nil_value())))
    }

    /// Returns the binding for local `name`, creating its stack slot with
    /// the declared type `ty` on first assignment.
    pub(crate) fn declare_local(&self, name: &str, ty: Ty) -> DiagnosticResult<VarBinding<'ctx>> {
        if let Some(binding) = self.vars.borrow().get(name) {
            return Ok(*binding);
        }
        let slot = self.entry_alloca(self.map_type_to_llvm(ty), name)?;
        let binding = VarBinding {
            ptr: slot,
            ty,
            treated_as_pointer: false,
        };
        self.vars.borrow_mut().insert(name.to_string(), binding);
        Ok(binding)
    }

    /// Stores `value` of type `value_ty` into the slot `ptr` declared at
    /// `target_ty`.
    pub(crate) fn codegen_assign(
        &self,
        ptr: PointerValue<'ctx>,
        target_ty: Ty,
        value_ty: Ty,
        value: Option<BasicValueEnum<'ctx>>,
    ) -> DiagnosticResult<()> {
        let types = &self.program.types;

        if target_ty == value_ty {
            // Unions copy through their slot; by-value structs copy their
            // storage; everything else is a direct store.
            if types.is_union(target_ty) || types.is_hierarchy(target_ty) {
                return self.store_into_union(ptr, target_ty, value_ty, value);
            }
            if types.passed_by_value(target_ty) {
                let src = value
                    .ok_or_else(|| self.op_err("missing struct value"))?
                    .into_pointer_value();
                let copied = self
                    .builder
                    .build_load(src, "copy")
                    .map_err(|_| self.op_err("struct load"))?;
                self.builder
                    .build_store(ptr, copied)
                    .map_err(|_| self.op_err("store"))?;
                return Ok(());
            }
            let value = value.unwrap_or_else(|| self.nil_value());
            self.builder
                .build_store(ptr, value)
                .map_err(|_| self.op_err("store"))?;
            return Ok(());
        }

        if types.is_union(target_ty) || types.is_hierarchy(target_ty) || types.is_nilable(target_ty)
        {
            return self.store_into_union(ptr, target_ty, value_ty, value);
        }

        let coerced = self.coerce_to(value, value_ty, target_ty)?;
        self.builder
            .build_store(ptr, coerced)
            .map_err(|_| self.op_err("store"))?;
        Ok(())
    }
}
