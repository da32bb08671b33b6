//! Block (iterator closure) inlining.
//!
//! A call with an attached block never becomes an IR call: the callee's body
//! is emitted at the call site, inside the caller's function. The caller's
//! emission context (variable environment, receiver type, return targets) is
//! stashed on the block activation stack; the callee runs with a fresh
//! environment and a fresh rendezvous block that collects its fall-through
//! value, its `return`s, and — because `break` exits the yielding call —
//! every `break` executed inside the block body.
//!
//! At each `yield` the stashed caller context is reinstated for the block
//! body, so a `return` written in the block returns from the method that
//! contains the call, and the block's fall-through value becomes the value
//! of the `yield` expression.

use inkwell::values::BasicValueEnum;

use crate::ast::{Call, DefId, Node};
use crate::diagnostics::{bug, DiagnosticResult};
use crate::types::Ty;

use super::{BlockFrame, CodeGen, VarBinding};

impl<'ctx, 'p> CodeGen<'ctx, 'p> {
    pub(crate) fn lower_block_call(
        &self,
        call: &'p Call,
        def_id: DefId,
    ) -> DiagnosticResult<Option<BasicValueEnum<'ctx>>> {
        let types = &self.program.types;
        let nil = types.nil();
        let def = &self.program.defs[def_id];
        let block = call.block.as_ref().expect("block call without block");

        // Call-site evaluation happens in the caller's environment.
        let receiver = match &call.obj {
            Some(obj) => {
                let value = self.lower_expr(obj)?;
                if self.current_block_terminated() {
                    return Ok(None);
                }
                Some((value, obj.ty().unwrap_or(nil)))
            }
            None => None,
        };
        let mut arg_values = Vec::with_capacity(call.args.len());
        for arg in &call.args {
            let value = self.lower_expr(arg)?;
            if self.current_block_terminated() {
                return Ok(None);
            }
            arg_values.push((value, arg.ty().unwrap_or(nil)));
        }

        // The call's rendezvous: fall-through, `return` in the callee body
        // and `break` in the block body all meet here.
        let sink = self.new_sink(call.ty, "call.exit")?;
        let rendezvous = sink.exit;

        // Stash the caller context on the activation stack.
        self.block_stack.borrow_mut().push(BlockFrame {
            block,
            vars: self.vars.borrow().clone(),
            self_type: self.self_type.get(),
            return_block: self.return_block.get(),
            return_sink: self.return_sink.borrow_mut().take(),
            fun_return_type: self.fun_return_type.get(),
            fun_return_union: self.fun_return_union.get(),
        });

        // Fresh callee environment: receiver and formals get their own
        // slots initialized from the call-site values.
        self.vars.borrow_mut().clear();
        self.self_type.set(def.owner);
        self.return_block.set(Some(rendezvous));
        *self.return_sink.borrow_mut() = Some(sink);
        self.fun_return_type.set(Some(def.return_type));
        self.fun_return_union.set(None);

        if let Some(owner) = def.owner.filter(|o| types.passed_as_self(*o)) {
            let (value, from) = receiver
                .ok_or_else(|| self.op_err("block call without receiver"))?;
            let adapted = self.prepare_operand(value, from, owner)?;
            let binding = if adapted.is_pointer_value() && self.behind_pointer(owner) {
                VarBinding {
                    ptr: adapted.into_pointer_value(),
                    ty: owner,
                    treated_as_pointer: true,
                }
            } else {
                let slot = self.entry_alloca(self.map_type_to_llvm(owner), "self")?;
                self.builder
                    .build_store(slot, adapted)
                    .map_err(|_| self.op_err("store"))?;
                VarBinding {
                    ptr: slot,
                    ty: owner,
                    treated_as_pointer: false,
                }
            };
            self.vars.borrow_mut().insert("self".to_string(), binding);
        }
        for (param, (value, from)) in def.params.iter().zip(arg_values) {
            let slot = self.entry_alloca(self.map_type_to_llvm(param.ty), &param.name)?;
            self.codegen_assign(slot, param.ty, from, value)?;
            self.vars.borrow_mut().insert(
                param.name.clone(),
                VarBinding {
                    ptr: slot,
                    ty: param.ty,
                    treated_as_pointer: false,
                },
            );
        }

        // Inline the callee body.
        let body_value = self.lower_expr(&def.body)?;

        // Fall-through feeds the rendezvous like an implicit return.
        if !self.current_block_terminated() {
            let mut sink = self
                .return_sink
                .borrow_mut()
                .take()
                .ok_or_else(|| self.op_err("missing call sink"))?;
            let body_ty = def.body.ty().unwrap_or(nil);
            self.sink_add(&mut sink, body_ty, body_value)?;
            *self.return_sink.borrow_mut() = Some(sink);
        }

        // Tear down the callee context and restore the caller's.
        let call_sink = self
            .return_sink
            .borrow_mut()
            .take()
            .ok_or_else(|| self.op_err("missing call sink"))?;
        let frame = self
            .block_stack
            .borrow_mut()
            .pop()
            .ok_or_else(|| self.op_err("activation stack empty"))?;
        *self.vars.borrow_mut() = frame.vars;
        self.self_type.set(frame.self_type);
        self.return_block.set(frame.return_block);
        *self.return_sink.borrow_mut() = frame.return_sink;
        self.fun_return_type.set(frame.fun_return_type);
        self.fun_return_union.set(frame.fun_return_union);

        self.sink_finish(call_sink)
    }

    /// Inlines the caller-supplied block at a `yield` site.
    pub(crate) fn lower_yield(
        &self,
        args: &'p [Node],
        node_ty: Ty,
    ) -> DiagnosticResult<Option<BasicValueEnum<'ctx>>> {
        let nil = self.program.types.nil();
        let mut frame = match self.block_stack.borrow_mut().pop() {
            Some(f) => f,
            None => return bug("yield outside of a call with a block"),
        };

        // Yield arguments evaluate in the callee's environment.
        let mut arg_values = Vec::with_capacity(args.len());
        for arg in args {
            let value = self.lower_expr(arg)?;
            if self.current_block_terminated() {
                self.block_stack.borrow_mut().push(frame);
                return Ok(None);
            }
            arg_values.push((value, arg.ty().unwrap_or(nil)));
        }

        // Copy each argument into a slot named after the block parameter,
        // coercing to the parameter's declared type. Missing arguments read
        // as nil.
        let mut block_vars = frame.vars.clone();
        for (i, param) in frame.block.params.iter().enumerate() {
            let slot = self.entry_alloca(self.map_type_to_llvm(param.ty), &param.name)?;
            match arg_values.get(i) {
                Some((value, from)) => self.codegen_assign(slot, param.ty, *from, *value)?,
                None => self.codegen_assign(slot, param.ty, nil, None)?,
            }
            block_vars.insert(
                param.name.clone(),
                VarBinding {
                    ptr: slot,
                    ty: param.ty,
                    treated_as_pointer: false,
                },
            );
        }

        // Swap in the caller's context for the block body: `return` targets
        // the caller's return, `break` targets this call's rendezvous.
        let callee_vars = std::mem::replace(&mut *self.vars.borrow_mut(), block_vars);
        let callee_self = self.self_type.replace(frame.self_type);
        let callee_return_block = self.return_block.replace(frame.return_block);
        let callee_return_sink = std::mem::replace(
            &mut *self.return_sink.borrow_mut(),
            frame.return_sink.take(),
        );
        let callee_fun_return_type = self.fun_return_type.replace(frame.fun_return_type);
        let callee_fun_return_union = self.fun_return_union.replace(frame.fun_return_union);
        let saved_break_block = self.break_block.replace(callee_return_block);
        let saved_break_sink =
            std::mem::replace(&mut *self.break_sink.borrow_mut(), callee_return_sink);

        let value = self.lower_expr(&frame.block.body)?;
        let diverged = self.current_block_terminated();

        // Restore the callee context, keeping any sink updates made by
        // returns (caller sink) and breaks (call sink) inside the block.
        frame.return_sink = self.return_sink.borrow_mut().take();
        frame.vars = self.vars.borrow().clone();
        let callee_return_sink =
            std::mem::replace(&mut *self.break_sink.borrow_mut(), saved_break_sink);
        *self.vars.borrow_mut() = callee_vars;
        self.self_type.set(callee_self);
        self.return_block.set(callee_return_block);
        *self.return_sink.borrow_mut() = callee_return_sink;
        self.fun_return_type.set(callee_fun_return_type);
        self.fun_return_union.set(callee_fun_return_union);
        self.break_block.set(saved_break_block);

        let block_ty = frame.block.ty;
        self.block_stack.borrow_mut().push(frame);

        if diverged {
            return Ok(None);
        }
        // The block body's fall-through value is the yield's value.
        if block_ty == node_ty {
            return Ok(value.or_else(|| Some(self.nil_value())));
        }
        let types = &self.program.types;
        if types.is_union(node_ty) || types.is_hierarchy(node_ty) {
            return Ok(Some(self.box_value(value, block_ty, node_ty)?.into()));
        }
        self.coerce_to(value, block_ty, node_ty).map(Some)
    }
}
