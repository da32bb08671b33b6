//! Constant initialization.
//!
//! Each constant's global is created lazily at its first reference. A simple
//! literal initializer becomes the global's constant initializer directly.
//! Anything else is emitted into the program's const chain: a fresh block
//! spliced between the entry function's alloca block and its first real
//! block, so every non-constant initializer runs exactly once before any
//! user code. If the computed IR value still folds to a constant it is
//! installed as the initializer and the global is marked constant; otherwise
//! the chain stores the value at startup.

use inkwell::module::Linkage;
use inkwell::values::{BasicValueEnum, PointerValue};

use crate::ast::{ConstId, Node};
use crate::diagnostics::{bug, DiagnosticResult};
use crate::types::Ty;

use super::CodeGen;

impl<'ctx, 'p> CodeGen<'ctx, 'p> {
    pub(crate) fn lower_const_read(
        &self,
        id: ConstId,
        requested: Ty,
    ) -> DiagnosticResult<BasicValueEnum<'ctx>> {
        let declared = self.program.constants[id].ty;
        let ptr = self.const_slot(id)?;
        self.read_slot(ptr, declared, requested, false)
    }

    /// The global backing constant `id`, creating and initializing it on
    /// first reference.
    fn const_slot(&self, id: ConstId) -> DiagnosticResult<PointerValue<'ctx>> {
        if let Some(ptr) = self.const_globals.borrow().get(&id) {
            return Ok(*ptr);
        }
        let constant = &self.program.constants[id];
        let llvm_ty = self.map_type_to_llvm(constant.ty);
        let global = self
            .module
            .add_global(llvm_ty, None, &format!("const.{}", constant.name));
        global.set_linkage(Linkage::Internal);
        let ptr = global.as_pointer_value();
        self.const_globals.borrow_mut().insert(id, ptr);

        if let Some(folded) = self.fold_literal(&constant.value)? {
            global.set_initializer(&folded);
            global.set_constant(true);
            return Ok(ptr);
        }

        global.set_initializer(&self.zero_value(llvm_ty));
        self.emit_const_initializer(id, ptr)?;
        Ok(ptr)
    }

    /// Emits a non-literal initializer into the const chain. Emission swaps
    /// to the entry function's context: a reference that first occurs while
    /// another def is being generated still initializes before `main`.
    fn emit_const_initializer(
        &self,
        id: ConstId,
        global: PointerValue<'ctx>,
    ) -> DiagnosticResult<()> {
        let constant = &self.program.constants[id];
        let main = match self.main_fun.get() {
            Some(f) => f,
            None => return bug("const chain requested before entry point exists"),
        };
        let tail = match self.const_tail.get() {
            Some(b) => b,
            None => return bug("const chain not initialized"),
        };

        let saved = self.save_function_state();
        self.fun.set(Some(main));
        self.alloca_block.set(self.main_alloca.get());
        self.self_type.set(None);
        self.fun_return_type.set(None);
        self.fun_return_union.set(None);
        self.return_block.set(None);
        self.break_block.set(None);

        // Splice a fresh block after the current chain tail.
        let init_block = self
            .context
            .append_basic_block(main, &format!("const.init.{}", constant.name));
        self.builder.position_at_end(tail);
        self.builder
            .build_unconditional_branch(init_block)
            .map_err(|_| self.op_err("const chain splice"))?;
        self.builder.position_at_end(init_block);

        let value = self.lower_expr(&constant.value)?;
        let value_ty = constant
            .value
            .ty()
            .unwrap_or_else(|| self.program.types.nil());

        if let Some(v) = value {
            if value_ty == constant.ty && is_constant_value(v) {
                // The initializer folded after all; keep it out of the chain.
                let gv = self
                    .module
                    .get_global(&format!("const.{}", constant.name))
                    .expect("const global");
                gv.set_initializer(&v);
                gv.set_constant(true);
            } else {
                self.codegen_assign(global, constant.ty, value_ty, Some(v))?;
            }
        } else {
            self.codegen_assign(global, constant.ty, value_ty, value)?;
        }

        // Initializers may open further blocks; the chain resumes at the
        // builder's final position.
        let new_tail = self
            .builder
            .get_insert_block()
            .ok_or_else(|| self.op_err("const chain tail"))?;
        self.const_tail.set(Some(new_tail));

        self.restore_function_state(saved);
        Ok(())
    }

    /// Folds a literal initializer to an LLVM constant without touching the
    /// builder. Returns `None` when the initializer needs the const chain.
    fn fold_literal(&self, node: &Node) -> DiagnosticResult<Option<BasicValueEnum<'ctx>>> {
        let folded = match node {
            Node::NilLit { .. } => Some(self.nil_value()),
            Node::BoolLit { value, .. } => Some(self.lower_bool_literal(*value)),
            Node::NumberLit { value, kind, .. } => Some(self.lower_number_literal(value, *kind)?),
            Node::CharLit { value, .. } => Some(self.lower_char_literal(*value)),
            Node::StringLit { value, .. } => Some(self.intern_string_literal(value).into()),
            Node::SymbolLit { value, .. } => Some(self.lower_symbol_literal(value)?),
            _ => None,
        };
        Ok(folded)
    }
}

fn is_constant_value(value: BasicValueEnum<'_>) -> bool {
    match value {
        BasicValueEnum::IntValue(v) => v.is_const(),
        BasicValueEnum::FloatValue(v) => v.is_const(),
        BasicValueEnum::PointerValue(v) => v.is_const(),
        _ => false,
    }
}
