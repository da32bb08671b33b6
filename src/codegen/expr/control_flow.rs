//! Conditionals, loops and non-local transfers.
//!
//! `if` and `||` assemble their result through a `BranchSink` (a phi for
//! scalar results, a pre-allocated union slot for union results). `while`
//! produces nil and rebinds the break target to its exit block. `return`
//! and `break` either reach the enclosing function's epilogue or, while a
//! callee is being inlined, the rendezvous block of the enclosing call.

use inkwell::values::BasicValueEnum;

use crate::ast::Node;
use crate::diagnostics::{bug, DiagnosticResult};
use crate::types::Ty;

use super::super::CodeGen;

impl<'ctx, 'p> CodeGen<'ctx, 'p> {
    pub(crate) fn lower_if(
        &self,
        cond: &'p Node,
        then: &'p Node,
        els: &'p Node,
        ty: Ty,
    ) -> DiagnosticResult<Option<BasicValueEnum<'ctx>>> {
        let nil = self.program.types.nil();
        let cond_value = self.lower_expr(cond)?;
        if self.current_block_terminated() {
            return Ok(None);
        }
        let cond_i1 = self.to_condition_i1(cond_value, cond.ty().unwrap_or(nil))?;

        let fun = self.current_fun()?;
        let then_bb = self.context.append_basic_block(fun, "if.then");
        let else_bb = self.context.append_basic_block(fun, "if.else");
        let mut sink = self.new_sink(ty, "if.exit")?;
        self.builder
            .build_conditional_branch(cond_i1, then_bb, else_bb)
            .map_err(|_| self.op_err("cond branch"))?;

        self.builder.position_at_end(then_bb);
        let then_value = self.lower_expr(then)?;
        self.sink_add(&mut sink, then.ty().unwrap_or(nil), then_value)?;

        self.builder.position_at_end(else_bb);
        let else_value = self.lower_expr(els)?;
        self.sink_add(&mut sink, els.ty().unwrap_or(nil), else_value)?;

        self.sink_finish(sink)
    }

    pub(crate) fn lower_while(
        &self,
        cond: &'p Node,
        body: &'p Node,
        run_once: bool,
        ty: Ty,
    ) -> DiagnosticResult<Option<BasicValueEnum<'ctx>>> {
        let fun = self.current_fun()?;
        let cond_bb = self.context.append_basic_block(fun, "while.cond");
        let body_bb = self.context.append_basic_block(fun, "while.body");
        let exit_bb = self.context.append_basic_block(fun, "while.exit");

        // A break in the body targets this loop's exit; its value is
        // discarded because the loop's value is nil.
        let saved_break_block = self.break_block.replace(Some(exit_bb));
        let saved_break_sink = self.break_sink.borrow_mut().take();

        self.ensure_branch(if run_once { body_bb } else { cond_bb })?;

        self.builder.position_at_end(cond_bb);
        let cond_value = self.lower_expr(cond)?;
        if !self.current_block_terminated() {
            let nil = self.program.types.nil();
            let cond_i1 = self.to_condition_i1(cond_value, cond.ty().unwrap_or(nil))?;
            self.builder
                .build_conditional_branch(cond_i1, body_bb, exit_bb)
                .map_err(|_| self.op_err("cond branch"))?;
        }

        self.builder.position_at_end(body_bb);
        self.lower_expr(body)?;
        self.ensure_branch(cond_bb)?;

        self.builder.position_at_end(exit_bb);
        self.break_block.set(saved_break_block);
        *self.break_sink.borrow_mut() = saved_break_sink;

        if self.program.types.is_no_return(ty) {
            self.builder
                .build_unreachable()
                .map_err(|_| self.op_err("unreachable"))?;
            return Ok(None);
        }
        Ok(Some(self.nil_value()))
    }

    pub(crate) fn lower_simple_or(
        &self,
        left: &'p Node,
        right: &'p Node,
        ty: Ty,
    ) -> DiagnosticResult<Option<BasicValueEnum<'ctx>>> {
        let nil = self.program.types.nil();
        let left_value = self.lower_expr(left)?;
        if self.current_block_terminated() {
            return Ok(None);
        }
        let cond = self.to_condition_i1(left_value, left.ty().unwrap_or(nil))?;

        let fun = self.current_fun()?;
        let lhs_bb = self.context.append_basic_block(fun, "or.lhs");
        let rhs_bb = self.context.append_basic_block(fun, "or.rhs");
        let mut sink = self.new_sink(ty, "or.exit")?;
        self.builder
            .build_conditional_branch(cond, lhs_bb, rhs_bb)
            .map_err(|_| self.op_err("cond branch"))?;

        self.builder.position_at_end(lhs_bb);
        self.sink_add(&mut sink, left.ty().unwrap_or(nil), left_value)?;

        self.builder.position_at_end(rhs_bb);
        let right_value = self.lower_expr(right)?;
        self.sink_add(&mut sink, right.ty().unwrap_or(nil), right_value)?;

        self.sink_finish(sink)
    }

    pub(crate) fn lower_return(
        &self,
        value_node: Option<&'p Node>,
    ) -> DiagnosticResult<Option<BasicValueEnum<'ctx>>> {
        let nil = self.program.types.nil();
        let (value, value_ty) = match value_node {
            Some(node) => {
                let v = self.lower_expr(node)?;
                if self.current_block_terminated() {
                    return Ok(None);
                }
                (v, node.ty().unwrap_or(nil))
            }
            None => (None, nil),
        };

        if self.return_block.get().is_some() {
            // Inside an inlined callee (or a block body whose `return`
            // belongs to a still-inlined surrounding method): rendezvous.
            let mut sink = match self.return_sink.borrow_mut().take() {
                Some(s) => s,
                None => return bug("return target without a sink"),
            };
            self.sink_add(&mut sink, value_ty, value)?;
            *self.return_sink.borrow_mut() = Some(sink);
        } else {
            self.emit_function_return(value, value_ty)?;
        }
        Ok(None)
    }

    pub(crate) fn lower_break(
        &self,
        value_node: Option<&'p Node>,
    ) -> DiagnosticResult<Option<BasicValueEnum<'ctx>>> {
        let nil = self.program.types.nil();
        let (value, value_ty) = match value_node {
            Some(node) => {
                let v = self.lower_expr(node)?;
                if self.current_block_terminated() {
                    return Ok(None);
                }
                (v, node.ty().unwrap_or(nil))
            }
            None => (None, nil),
        };

        let target = match self.break_block.get() {
            Some(bb) => bb,
            None => return bug("break outside of a loop or yielding call"),
        };
        let sink = self.break_sink.borrow_mut().take();
        match sink {
            Some(mut sink) => {
                // Breaking out of a yielding call: the break value becomes
                // the call's value.
                self.sink_add(&mut sink, value_ty, value)?;
                *self.break_sink.borrow_mut() = Some(sink);
            }
            None => {
                // Breaking out of a while loop: the value is discarded.
                self.ensure_branch(target)?;
            }
        }
        Ok(None)
    }
}
