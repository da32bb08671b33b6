//! Call lowering and monomorphization.
//!
//! A call resolves in one of three ways: a checker-expanded macro body is
//! emitted in place; multiple candidate defs go through the dispatch
//! cascade; a single target is monomorphized against the receiver's type
//! and called directly. Calls with an attached block never become real IR
//! calls: the callee is inlined at the call site (see `blocks`).
//!
//! Under an active exception handler a callee that can raise is entered
//! with `invoke` so unwinding lands in the handler's catch block.

use inkwell::values::{BasicMetadataValueEnum, BasicValueEnum, PointerValue};

use crate::ast::{Call, DefId, Node};
use crate::diagnostics::{bug, DiagnosticResult};
use crate::types::Ty;

use super::CodeGen;

/// An argument prepared for the ABI. `Raw` passes a value untouched (out
/// argument slots); `Value` is coerced to the parameter's declared type.
pub(crate) enum CallArg<'ctx> {
    Value(Option<BasicValueEnum<'ctx>>, Ty),
    Raw(BasicValueEnum<'ctx>),
}

impl<'ctx, 'p> CodeGen<'ctx, 'p> {
    pub(crate) fn lower_call(
        &self,
        call: &'p Call,
    ) -> DiagnosticResult<Option<BasicValueEnum<'ctx>>> {
        if let Some(expanded) = &call.expanded {
            return self.lower_expr(expanded);
        }
        if call.target_defs.is_empty() {
            return bug(format!("call {} resolved to no targets", call.name));
        }
        if call.target_defs.len() > 1 {
            return self.lower_dispatch(call);
        }
        let def_id = call.target_defs[0];
        if call.block.is_some() {
            return self.lower_block_call(call, def_id);
        }
        self.lower_plain_call(call, def_id)
    }

    fn lower_plain_call(
        &self,
        call: &'p Call,
        def_id: DefId,
    ) -> DiagnosticResult<Option<BasicValueEnum<'ctx>>> {
        let nil = self.program.types.nil();

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

        let mut args = Vec::with_capacity(call.args.len());
        let mut copy_backs: Vec<(PointerValue<'ctx>, PointerValue<'ctx>, Ty)> = Vec::new();
        for (i, arg) in call.args.iter().enumerate() {
            if let Node::Out { arg: inner } = arg {
                let (slot, temp) = self.prepare_out_arg(inner)?;
                if let Some((temp_ptr, struct_ty)) = temp {
                    copy_backs.push((slot, temp_ptr, struct_ty));
                    args.push(CallArg::Raw(temp_ptr.into()));
                } else {
                    args.push(CallArg::Raw(slot.into()));
                }
                continue;
            }
            let value = self.lower_expr(arg)?;
            if self.current_block_terminated() {
                return Ok(None);
            }
            args.push(CallArg::Value(value, arg.ty().unwrap_or(nil)));
        }

        let result = self.lower_call_values(def_id, receiver, args)?;

        // C-struct out arguments went through a local staging slot; copy the
        // result back into the caller's storage.
        for (dest, temp, struct_ty) in copy_backs {
            self.codegen_assign(dest, struct_ty, struct_ty, Some(temp.into()))?;
        }
        Ok(result)
    }

    /// An out argument passes the variable's slot pointer. C-struct/union
    /// out arguments stage through a fresh local struct that is copied back
    /// after the call.
    fn prepare_out_arg(
        &self,
        inner: &'p Node,
    ) -> DiagnosticResult<(PointerValue<'ctx>, Option<(PointerValue<'ctx>, Ty)>)> {
        let (name, ty) = match inner {
            Node::Var { name, ty } => (name, *ty),
            other => return bug(format!("out argument must be a variable, got {:?}", other)),
        };
        let binding = self.declare_local(name, ty)?;
        let types = &self.program.types;
        if types.is_c_struct(ty) || types.is_c_union(ty) {
            let temp = self.entry_alloca(self.map_struct_type(ty).into(), "out.staging")?;
            return Ok((binding.ptr, Some((temp, ty))));
        }
        Ok((binding.ptr, None))
    }

    /// Emits the monomorphic call to `def_id` with already-evaluated
    /// receiver and arguments. Used directly by the dispatch cascade with
    /// placeholder-bound values.
    pub(crate) fn lower_call_values(
        &self,
        def_id: DefId,
        receiver: Option<(Option<BasicValueEnum<'ctx>>, Ty)>,
        args: Vec<CallArg<'ctx>>,
    ) -> DiagnosticResult<Option<BasicValueEnum<'ctx>>> {
        let types = &self.program.types;
        let def = &self.program.defs[def_id];
        let owner = def.owner;

        let mut abi_args: Vec<BasicValueEnum<'ctx>> = Vec::with_capacity(args.len() + 1);
        if let Some(o) = owner.filter(|o| !def.is_extern && types.passed_as_self(*o)) {
            let (value, from) = receiver
                .ok_or_else(|| self.op_err("method call without receiver"))?;
            abi_args.push(self.prepare_operand(value, from, o)?);
        }
        for (i, arg) in args.into_iter().enumerate() {
            match arg {
                CallArg::Raw(value) => abi_args.push(value),
                CallArg::Value(value, from) => {
                    let param_ty = def
                        .params
                        .get(i)
                        .map(|p| p.ty)
                        .ok_or_else(|| self.op_err("argument arity mismatch"))?;
                    abi_args.push(self.prepare_operand(value, from, param_ty)?);
                }
            }
        }

        let fun = self.gen_def_ir(def_id, owner)?;

        // Under an active handler a raising callee is invoked so unwinding
        // reaches the handler's landing pad.
        let handler = self.handler_stack.borrow().last().copied();
        let call_site = match handler {
            Some(frame) if def.raises => {
                let cont = self
                    .context
                    .append_basic_block(self.current_fun()?, "invoke.cont");
                let site = self
                    .builder
                    .build_invoke(fun, &abi_args, cont, frame.catch_block, &def.name)
                    .map_err(|_| self.op_err("invoke"))?;
                self.builder.position_at_end(cont);
                site
            }
            _ => {
                let meta_args: Vec<BasicMetadataValueEnum<'ctx>> =
                    abi_args.iter().map(|v| (*v).into()).collect();
                self.builder
                    .build_call(fun, &meta_args, &def.name)
                    .map_err(|_| self.op_err("call"))?
            }
        };

        if types.is_no_return(def.return_type) {
            self.builder
                .build_unreachable()
                .map_err(|_| self.op_err("unreachable"))?;
            return Ok(None);
        }
        if types.is_void(def.return_type) {
            return Ok(Some(self.nil_value()));
        }
        let value = call_site
            .try_as_basic_value()
            .left()
            .ok_or_else(|| self.op_err("call result"))?;
        // Union aggregates come back by value; promote into a fresh slot so
        // unions keep living behind pointers.
        if types.is_union(def.return_type) || types.is_hierarchy(def.return_type) {
            return Ok(Some(
                self.promote_aggregate(value, def.return_type)?.into(),
            ));
        }
        Ok(Some(value))
    }

    /// Adapts an evaluated operand of static type `from` to a parameter (or
    /// receiver) of declared type `to`, in ABI form.
    pub(crate) fn prepare_operand(
        &self,
        value: Option<BasicValueEnum<'ctx>>,
        from: Ty,
        to: Ty,
    ) -> DiagnosticResult<BasicValueEnum<'ctx>> {
        let types = &self.program.types;
        if from == to {
            return self.abi_value(value, to);
        }
        if types.is_union(to) || types.is_hierarchy(to) {
            let slot = self.box_value(value, from, to)?;
            return self.abi_value(Some(slot.into()), to);
        }
        if types.is_nilable(to) {
            if types.is_nilable(from) || types.is_union(from) || types.is_hierarchy(from) {
                return self.narrow_to_concrete(value, from, to);
            }
            return self.coerce_to(value, from, to);
        }
        if types.is_union(from) || types.is_hierarchy(from) || types.is_nilable(from) {
            return self.narrow_to_concrete(value, from, to);
        }
        self.coerce_to(value, from, to)
    }

    /// Narrows a union/hierarchy/nilable value to one of its alternatives.
    /// The tag has already been checked (by dispatch or by the checker).
    pub(crate) fn narrow_to_concrete(
        &self,
        value: Option<BasicValueEnum<'ctx>>,
        from: Ty,
        to: Ty,
    ) -> DiagnosticResult<BasicValueEnum<'ctx>> {
        let types = &self.program.types;
        let value = value.ok_or_else(|| self.op_err("missing value to narrow"))?;
        if types.is_union(from) {
            if types.is_nilable(to) {
                let payload =
                    self.union_value_ptr_as(value.into_pointer_value(), from, self.i8ptr_t.into())?;
                return self
                    .builder
                    .build_load(payload, "narrowed")
                    .map_err(|_| self.op_err("load"));
            }
            return self.read_union_member(value.into_pointer_value(), from, to);
        }
        if types.is_hierarchy(from) {
            let payload = self.union_value_ptr(value.into_pointer_value(), from)?;
            return self
                .builder
                .build_load(payload, "unboxed")
                .map_err(|_| self.op_err("load"));
        }
        if types.is_nilable(from) {
            // The carrier pointer is the member reference (null only in the
            // nil arm, which dispatch routes elsewhere).
            return Ok(value);
        }
        bug(format!(
            "cannot narrow {} to {}",
            types.name(from),
            types.name(to)
        ))
    }
}
