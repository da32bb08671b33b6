//! Exception handler lowering: Itanium-style landing pads.
//!
//! A handler pushes its catch block on the handler stack and emits the
//! protected body; call lowering consults the stack to enter raising
//! callees with `invoke`. The catch block opens with a
//! `landingpad { i8*, i32 }` against the `__crystal_personality` routine;
//! the unwind object and the type id are extracted and each rescue clause
//! compares the id against its listed types — a flat disjunction, no
//! subtype chains. When no clause matches, the exception is re-raised
//! through `_Unwind_RaiseException`. The protected body's value and every
//! rescue arm's value meet in one sink; an `ensure` clause runs after the
//! merge with its value discarded.

use inkwell::module::Linkage;
use inkwell::values::{BasicValueEnum, FunctionValue};
use inkwell::IntPredicate;

use crate::ast::{Node, Rescue};
use crate::diagnostics::DiagnosticResult;
use crate::types::Ty;

use super::{CodeGen, HandlerFrame, VarBinding};

impl<'ctx, 'p> CodeGen<'ctx, 'p> {
    /// The `__crystal_personality` routine, declared on first use.
    fn personality(&self) -> FunctionValue<'ctx> {
        if let Some(f) = self.personality_fn.get() {
            return f;
        }
        let fn_type = self.i32_t.fn_type(&[], true);
        let f = self
            .module
            .add_function("__crystal_personality", fn_type, Some(Linkage::External));
        self.personality_fn.set(Some(f));
        f
    }

    /// `_Unwind_RaiseException(i8*) -> i8*`, used for the re-raise path.
    fn unwind_raise(&self) -> FunctionValue<'ctx> {
        if let Some(f) = self.module.get_function("_Unwind_RaiseException") {
            return f;
        }
        let fn_type = self.i8ptr_t.fn_type(&[self.i8ptr_t.into()], false);
        self.module
            .add_function("_Unwind_RaiseException", fn_type, Some(Linkage::External))
    }

    pub(crate) fn lower_handler(
        &self,
        body: &'p Node,
        rescues: &'p [Rescue],
        ensure: Option<&'p Node>,
        ty: Ty,
    ) -> DiagnosticResult<Option<BasicValueEnum<'ctx>>> {
        let types = &self.program.types;
        let nil = types.nil();
        let fun = self.current_fun()?;
        fun.set_personality_function(self.personality());

        let catch_block = self.context.append_basic_block(fun, "rescue.lpad");
        let mut sink = self.new_sink(ty, "eh.exit")?;

        // Protected body: raising calls inside it unwind to `catch_block`.
        self.handler_stack
            .borrow_mut()
            .push(HandlerFrame { catch_block });
        let body_value = self.lower_expr(body)?;
        self.handler_stack.borrow_mut().pop();
        self.sink_add(&mut sink, body.ty().unwrap_or(nil), body_value)?;

        // Landing pad: extract the unwind object and the raised type id.
        self.builder.position_at_end(catch_block);
        let lp_type = self
            .context
            .struct_type(&[self.i8ptr_t.into(), self.i32_t.into()], false);
        let catch_all: BasicValueEnum<'ctx> = self.i8ptr_t.const_null().into();
        let landing = self
            .builder
            .build_landing_pad(lp_type, self.personality(), &[catch_all], false, "lp")
            .map_err(|_| self.op_err("landing pad"))?
            .into_struct_value();
        let unwind_obj = self
            .builder
            .build_extract_value(landing, 0, "ex.obj")
            .map_err(|_| self.op_err("extract"))?
            .into_pointer_value();
        let ex_type_id = self
            .builder
            .build_extract_value(landing, 1, "ex.type_id")
            .map_err(|_| self.op_err("extract"))?
            .into_int_value();

        let mut caught_all = false;
        for rescue in rescues {
            match &rescue.types {
                Some(type_list) => {
                    let rescue_body = self.context.append_basic_block(fun, "rescue.body");
                    let next_rescue = self.context.append_basic_block(fun, "rescue.next");
                    let mut matched = self.i1_t.const_int(0, false);
                    for rescue_ty in type_list {
                        let id = self
                            .i32_t
                            .const_int(types.type_id(*rescue_ty) as u64, false);
                        let eq = self
                            .builder
                            .build_int_compare(IntPredicate::EQ, ex_type_id, id, "rescue.eq")
                            .map_err(|_| self.op_err("cmp"))?;
                        matched = self
                            .builder
                            .build_or(matched, eq, "rescue.match")
                            .map_err(|_| self.op_err("or"))?;
                    }
                    self.builder
                        .build_conditional_branch(matched, rescue_body, next_rescue)
                        .map_err(|_| self.op_err("cond branch"))?;

                    self.builder.position_at_end(rescue_body);
                    self.bind_rescue_var(rescue, unwind_obj)?;
                    let value = self.lower_expr(&rescue.body)?;
                    self.sink_add(&mut sink, rescue.body.ty().unwrap_or(nil), value)?;

                    self.builder.position_at_end(next_rescue);
                }
                None => {
                    self.bind_rescue_var(rescue, unwind_obj)?;
                    let value = self.lower_expr(&rescue.body)?;
                    self.sink_add(&mut sink, rescue.body.ty().unwrap_or(nil), value)?;
                    caught_all = true;
                    break;
                }
            }
        }

        if !caught_all {
            // No clause claimed the exception: propagate it.
            self.builder
                .build_call(self.unwind_raise(), &[unwind_obj.into()], "reraise")
                .map_err(|_| self.op_err("reraise"))?;
            self.builder
                .build_unreachable()
                .map_err(|_| self.op_err("unreachable"))?;
        }

        let result = self.sink_finish(sink)?;

        // The ensure value is discarded; the merged value survives it.
        if let Some(ensure_body) = ensure {
            if !self.current_block_terminated() {
                self.lower_expr(ensure_body)?;
            }
        }
        Ok(result)
    }

    /// A named rescue binds the unwind object pointer.
    fn bind_rescue_var(
        &self,
        rescue: &Rescue,
        unwind_obj: inkwell::values::PointerValue<'ctx>,
    ) -> DiagnosticResult<()> {
        let name = match &rescue.name {
            Some(n) => n,
            None => return Ok(()),
        };
        let ty = rescue
            .types
            .as_ref()
            .and_then(|ts| ts.first().copied())
            .unwrap_or_else(|| self.program.types.nil());
        let slot = self.entry_alloca(self.i8ptr_t.into(), name)?;
        self.builder
            .build_store(slot, unwind_obj)
            .map_err(|_| self.op_err("store"))?;
        self.vars.borrow_mut().insert(
            name.clone(),
            VarBinding {
                ptr: slot,
                ty,
                treated_as_pointer: false,
            },
        );
        Ok(())
    }
}
