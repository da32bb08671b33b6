//! Dynamic dispatch over runtime type ids.
//!
//! A call whose resolved target is a set of per-subtype defs compiles to a
//! cascade: the receiver (and each union/nilable argument) is evaluated once
//! into placeholder bindings, its runtime tag is extracted, and each
//! candidate gets a guard comparing the tags against the candidate's owner
//! and parameter types. Matching candidates are emitted as ordinary
//! monomorphic calls reading the placeholders; their results feed one shared
//! value sink. The terminal `unreachable` after the last candidate is dead
//! by construction: inference guarantees the candidate set covers the
//! receiver's type.

use inkwell::values::{BasicValueEnum, IntValue};

use crate::ast::Call;
use crate::diagnostics::{bug, DiagnosticResult};
use crate::types::Ty;

use super::calls::CallArg;
use super::CodeGen;

/// Runtime discriminator of one dispatched operand.
enum OperandTag<'ctx> {
    /// Tag word of a union or hierarchy value.
    TypeId(IntValue<'ctx>),
    /// Carrier pointer of a nilable value; null means nil.
    Carrier(inkwell::values::PointerValue<'ctx>),
    /// Statically known; every candidate matches.
    Fixed,
}

impl<'ctx, 'p> CodeGen<'ctx, 'p> {
    pub(crate) fn lower_dispatch(
        &self,
        call: &'p Call,
    ) -> DiagnosticResult<Option<BasicValueEnum<'ctx>>> {
        let types = &self.program.types;
        let nil = types.nil();
        if call.block.is_some() {
            return bug("dispatch over a call with a block");
        }

        // Evaluate receiver and arguments exactly once, bound to placeholder
        // names so each candidate re-reads them as an ordinary call.
        let receiver = match &call.obj {
            Some(obj) => {
                let value = self.lower_expr(obj)?;
                if self.current_block_terminated() {
                    return Ok(None);
                }
                let ty = obj.ty().unwrap_or(nil);
                Some((self.bind_placeholder("%self", value, ty)?, ty))
            }
            None => None,
        };
        let mut arg_slots = Vec::with_capacity(call.args.len());
        for (i, arg) in call.args.iter().enumerate() {
            let value = self.lower_expr(arg)?;
            if self.current_block_terminated() {
                return Ok(None);
            }
            let ty = arg.ty().unwrap_or(nil);
            arg_slots.push((self.bind_placeholder(&format!("%arg{}", i), value, ty)?, ty));
        }

        let recv_tag = match &receiver {
            Some((value, ty)) => Some(self.operand_tag(*value, *ty)?),
            None => None,
        };
        let mut arg_tags = Vec::with_capacity(arg_slots.len());
        for (value, ty) in &arg_slots {
            arg_tags.push(self.operand_tag(*value, *ty)?);
        }

        let fun = self.current_fun()?;
        let mut sink = self.new_sink(call.ty, "dispatch.exit")?;

        for &def_id in &call.target_defs {
            let def = &self.program.defs[def_id];
            let this_def = self.context.append_basic_block(fun, "current_def");
            let next_def = self.context.append_basic_block(fun, "next_def");

            // Guard: receiver matches the candidate's owner, every
            // discriminated argument matches the candidate's parameter.
            let mut cond = self.i1_t.const_int(1, false);
            if let (Some(tag), Some(owner)) = (&recv_tag, def.owner) {
                let matches = self.operand_matches(tag, owner)?;
                cond = self
                    .builder
                    .build_and(cond, matches, "dispatch.recv")
                    .map_err(|_| self.op_err("and"))?;
            }
            for (tag, param) in arg_tags.iter().zip(&def.params) {
                let matches = self.operand_matches(tag, param.ty)?;
                cond = self
                    .builder
                    .build_and(cond, matches, "dispatch.arg")
                    .map_err(|_| self.op_err("and"))?;
            }
            self.builder
                .build_conditional_branch(cond, this_def, next_def)
                .map_err(|_| self.op_err("cond branch"))?;

            self.builder.position_at_end(this_def);
            let recv_value = match &receiver {
                Some((value, ty)) => Some((Some(*value), *ty)),
                None => None,
            };
            let args: Vec<CallArg<'ctx>> = arg_slots
                .iter()
                .map(|(value, ty)| CallArg::Value(Some(*value), *ty))
                .collect();
            let result = self.lower_call_values(def_id, recv_value, args)?;
            self.sink_add(&mut sink, def.return_type, result)?;

            self.builder.position_at_end(next_def);
        }

        // Inference guarantees coverage; the fall-through is dead.
        self.builder
            .build_unreachable()
            .map_err(|_| self.op_err("unreachable"))?;
        self.sink_finish(sink)
    }

    /// Materializes a placeholder value that candidates re-read: values that
    /// already live behind pointers pass through, everything else is stored
    /// into a slot and reloaded per candidate through the shared pointer.
    fn bind_placeholder(
        &self,
        _name: &str,
        value: Option<BasicValueEnum<'ctx>>,
        ty: Ty,
    ) -> DiagnosticResult<BasicValueEnum<'ctx>> {
        if self.behind_pointer(ty) {
            return value.ok_or_else(|| self.op_err("missing dispatch operand"));
        }
        Ok(value.unwrap_or_else(|| self.nil_value()))
    }

    fn operand_tag(
        &self,
        value: BasicValueEnum<'ctx>,
        ty: Ty,
    ) -> DiagnosticResult<OperandTag<'ctx>> {
        let types = &self.program.types;
        if types.is_union(ty) || types.is_hierarchy(ty) {
            let tag = self.load_union_tag(value.into_pointer_value(), ty)?;
            return Ok(OperandTag::TypeId(tag));
        }
        if types.is_nilable(ty) {
            return Ok(OperandTag::Carrier(value.into_pointer_value()));
        }
        Ok(OperandTag::Fixed)
    }

    /// Whether an operand's runtime discriminator selects `candidate`: a
    /// disjunction over the candidate's concrete type ids for unions, a
    /// null-check for nilables, and a constant match otherwise.
    fn operand_matches(
        &self,
        tag: &OperandTag<'ctx>,
        candidate: Ty,
    ) -> DiagnosticResult<IntValue<'ctx>> {
        let types = &self.program.types;
        match tag {
            OperandTag::TypeId(tag) => Ok(self
                .tag_matches_any(*tag, &types.concrete_types(candidate))?
                .into_int_value()),
            OperandTag::Carrier(ptr) => {
                if types.is_nil(candidate) {
                    self.null_pointer_test(*ptr, "dispatch.nil")
                } else {
                    let is_null = self.null_pointer_test(*ptr, "dispatch.nil")?;
                    self.builder
                        .build_not(is_null, "dispatch.some")
                        .map_err(|_| self.op_err("not"))
                }
            }
            OperandTag::Fixed => Ok(self.i1_t.const_int(1, false)),
        }
    }
}
