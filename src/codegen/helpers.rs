//! Small helper utilities used across codegen lowering.
//!
//! This module implements the builder facade:
//! - stack slots placed in the function's alloca block regardless of the
//!   current insertion point (`entry_alloca`);
//! - allocation through a user-provided `__crystal_malloc`/`__crystal_realloc`
//!   when the program defines one, falling back to libc, always zero-filled
//!   via `memset`;
//! - truthiness coercion for conditionals (`to_condition_i1`);
//! - the branched-block value sink (`BranchSink`) that aggregates the values
//!   of diverging control paths into a phi or a union slot.

use inkwell::basic_block::BasicBlock;
use inkwell::values::{BasicValueEnum, FunctionValue, IntValue, PointerValue};
use inkwell::IntPredicate;

use crate::diagnostics::{bug, Diagnostic, DiagnosticResult, Severity};
use crate::types::Ty;

use super::CodeGen;

/// Aggregates the values flowing out of a set of branched blocks.
///
/// Union- and hierarchy-typed results are written into a pre-allocated slot
/// (widening each contribution); everything else is merged with a phi over
/// the terminating blocks. `reached` stays false when every contributing
/// path diverged, in which case the merge point is unreachable.
pub struct BranchSink<'ctx> {
    pub ty: Ty,
    pub exit: BasicBlock<'ctx>,
    pub union_slot: Option<PointerValue<'ctx>>,
    pub incoming: Vec<(BasicValueEnum<'ctx>, BasicBlock<'ctx>)>,
    pub reached: bool,
}

impl<'ctx, 'p> CodeGen<'ctx, 'p> {
    pub(crate) fn op_err(&self, what: &str) -> Box<Diagnostic> {
        Diagnostic::simple_boxed(Severity::Bug, format!("builder operation failed: {}", what))
    }

    pub(crate) fn current_fun(&self) -> DiagnosticResult<FunctionValue<'ctx>> {
        self.fun
            .get()
            .ok_or_else(|| Diagnostic::simple_boxed(Severity::Bug, "no current function"))
    }

    /// True when the current insertion block already has a terminator, i.e.
    /// the code being lowered is past a control transfer.
    pub(crate) fn current_block_terminated(&self) -> bool {
        self.builder
            .get_insert_block()
            .map_or(true, |b| b.get_terminator().is_some())
    }

    /// Branches to `bb` unless the current block already terminated.
    pub(crate) fn ensure_branch(&self, bb: BasicBlock<'ctx>) -> DiagnosticResult<()> {
        if !self.current_block_terminated() {
            self.builder
                .build_unconditional_branch(bb)
                .map_err(|_| self.op_err("branch"))?;
        }
        Ok(())
    }

    /// The value of `nil` in expression position.
    pub(crate) fn nil_value(&self) -> BasicValueEnum<'ctx> {
        self.i1_t.const_int(0, false).into()
    }

    /// Emits an alloca into the function's alloca block, restoring the
    /// builder position afterwards. Guarantees every stack slot dominates
    /// all its uses regardless of where lowering currently is.
    pub fn entry_alloca(
        &self,
        ty: inkwell::types::BasicTypeEnum<'ctx>,
        name: &str,
    ) -> DiagnosticResult<PointerValue<'ctx>> {
        let alloca_block = self
            .alloca_block
            .get()
            .ok_or_else(|| Diagnostic::simple_boxed(Severity::Bug, "no alloca block"))?;
        let saved = self.builder.get_insert_block();
        self.builder.position_at_end(alloca_block);
        let ptr = self
            .builder
            .build_alloca(ty, name)
            .map_err(|_| self.op_err("alloca"))?;
        if let Some(block) = saved {
            self.builder.position_at_end(block);
        }
        Ok(ptr)
    }

    /// `ptr-to-int(v) == 0`.
    pub(crate) fn null_pointer_test(
        &self,
        ptr: PointerValue<'ctx>,
        name: &str,
    ) -> DiagnosticResult<IntValue<'ctx>> {
        let as_int = self
            .builder
            .build_ptr_to_int(ptr, self.i64_t, "ptr.int")
            .map_err(|_| self.op_err("ptr_to_int"))?;
        self.builder
            .build_int_compare(
                IntPredicate::EQ,
                as_int,
                self.i64_t.const_int(0, false),
                name,
            )
            .map_err(|_| self.op_err("null test"))
    }

    // --- Allocation ---

    fn get_malloc(&self) -> DiagnosticResult<FunctionValue<'ctx>> {
        if let Some(f) = self.malloc_fn.get() {
            return Ok(f);
        }
        let f = match self.program.def_named("__crystal_malloc") {
            Some(def_id) => self.gen_def_ir(def_id, None)?,
            None => {
                let fn_type = self.i8ptr_t.fn_type(&[self.i64_t.into()], false);
                self.module.add_function("malloc", fn_type, None)
            }
        };
        self.malloc_fn.set(Some(f));
        Ok(f)
    }

    fn get_realloc(&self) -> DiagnosticResult<FunctionValue<'ctx>> {
        if let Some(f) = self.realloc_fn.get() {
            return Ok(f);
        }
        let f = match self.program.def_named("__crystal_realloc") {
            Some(def_id) => self.gen_def_ir(def_id, None)?,
            None => {
                let fn_type = self
                    .i8ptr_t
                    .fn_type(&[self.i8ptr_t.into(), self.i64_t.into()], false);
                self.module.add_function("realloc", fn_type, None)
            }
        };
        self.realloc_fn.set(Some(f));
        Ok(f)
    }

    fn get_memset(&self) -> FunctionValue<'ctx> {
        if let Some(f) = self.memset_fn.get() {
            return f;
        }
        let fn_type = self.i8ptr_t.fn_type(
            &[self.i8ptr_t.into(), self.i32_t.into(), self.i64_t.into()],
            false,
        );
        let f = self.module.add_function("memset", fn_type, None);
        self.memset_fn.set(Some(f));
        f
    }

    /// Allocates `size` bytes, zero-filled. `size` is an `i32` to match the
    /// `__crystal_malloc(i32)` contract; the libc fallback widens it.
    pub(crate) fn build_malloc(
        &self,
        size: IntValue<'ctx>,
        name: &str,
    ) -> DiagnosticResult<PointerValue<'ctx>> {
        let malloc = self.get_malloc()?;
        let takes_i64 = malloc.get_name().to_bytes() == b"malloc";
        let arg: BasicValueEnum<'ctx> = if takes_i64 {
            self.builder
                .build_int_z_extend(size, self.i64_t, "malloc.size")
                .map_err(|_| self.op_err("size widen"))?
                .into()
        } else {
            size.into()
        };
        let call = self
            .builder
            .build_call(malloc, &[arg.into()], name)
            .map_err(|_| self.op_err("malloc call"))?;
        let ptr = call
            .try_as_basic_value()
            .left()
            .ok_or_else(|| self.op_err("malloc result"))?
            .into_pointer_value();

        let size_i64 = self
            .builder
            .build_int_z_extend(size, self.i64_t, "memset.size")
            .map_err(|_| self.op_err("size widen"))?;
        self.builder
            .build_call(
                self.get_memset(),
                &[
                    ptr.into(),
                    self.i32_t.const_int(0, false).into(),
                    size_i64.into(),
                ],
                "zeroed",
            )
            .map_err(|_| self.op_err("memset call"))?;
        Ok(ptr)
    }

    /// Reallocates `ptr` to `size` bytes via `__crystal_realloc` or libc.
    pub(crate) fn build_realloc(
        &self,
        ptr: PointerValue<'ctx>,
        size: IntValue<'ctx>,
        name: &str,
    ) -> DiagnosticResult<PointerValue<'ctx>> {
        let realloc = self.get_realloc()?;
        let takes_i64 = realloc.get_name().to_bytes() == b"realloc";
        let size_arg: BasicValueEnum<'ctx> = if takes_i64 {
            self.builder
                .build_int_z_extend(size, self.i64_t, "realloc.size")
                .map_err(|_| self.op_err("size widen"))?
                .into()
        } else {
            size.into()
        };
        let call = self
            .builder
            .build_call(realloc, &[ptr.into(), size_arg.into()], name)
            .map_err(|_| self.op_err("realloc call"))?;
        Ok(call
            .try_as_basic_value()
            .left()
            .ok_or_else(|| self.op_err("realloc result"))?
            .into_pointer_value())
    }

    /// Heap-allocates a zeroed instance of `class`, yielding its reference.
    pub(crate) fn allocate_instance(&self, class: Ty) -> DiagnosticResult<PointerValue<'ctx>> {
        let size = self.program.types.instance_size(class);
        self.build_malloc(self.i32_t.const_int(size, false), "instance")
    }

    /// Pointer to field `index` of the instance struct of `class`, given the
    /// object reference (or struct pointer) `obj`.
    pub(crate) fn struct_field_ptr(
        &self,
        class: Ty,
        obj: PointerValue<'ctx>,
        index: u32,
        name: &str,
    ) -> DiagnosticResult<PointerValue<'ctx>> {
        let struct_ty = self.map_struct_type(class);
        let typed = self
            .builder
            .build_pointer_cast(
                obj,
                struct_ty.ptr_type(inkwell::AddressSpace::default()),
                "self.typed",
            )
            .map_err(|_| self.op_err("struct cast"))?;
        self.builder
            .build_struct_gep(typed, index, name)
            .map_err(|_| self.op_err("struct gep"))
    }

    // --- Condition coercion ---

    /// Produces the `i1` branch condition for a value of type `ty`.
    ///
    /// Truthiness: `nil` and `false` are falsey; a nilable or raw pointer is
    /// falsey when null; a union is falsey when its tag is Nil or its tag is
    /// Bool with a false payload; everything else is truthy.
    pub(crate) fn to_condition_i1(
        &self,
        value: Option<BasicValueEnum<'ctx>>,
        ty: Ty,
    ) -> DiagnosticResult<IntValue<'ctx>> {
        let types = &self.program.types;
        if types.is_nil(ty) {
            return Ok(self.i1_t.const_int(0, false));
        }
        if types.is_bool(ty) {
            let value = value.ok_or_else(|| self.op_err("missing condition value"))?;
            return Ok(value.into_int_value());
        }
        if types.is_nilable(ty) {
            let ptr = value
                .ok_or_else(|| self.op_err("missing condition value"))?
                .into_pointer_value();
            let is_null = self.null_pointer_test(ptr, "is_nil")?;
            return self
                .builder
                .build_not(is_null, "not_nil")
                .map_err(|_| self.op_err("not"));
        }
        if types.is_hierarchy(ty) {
            return Ok(self.i1_t.const_int(1, false));
        }
        if types.is_pointer(ty) {
            let ptr = value
                .ok_or_else(|| self.op_err("missing condition value"))?
                .into_pointer_value();
            let is_null = self.null_pointer_test(ptr, "is_null")?;
            return self
                .builder
                .build_not(is_null, "not_null")
                .map_err(|_| self.op_err("not"));
        }
        if types.is_union(ty) {
            let union_ptr = value
                .ok_or_else(|| self.op_err("missing condition value"))?
                .into_pointer_value();
            let tag = self.load_union_tag(union_ptr, ty)?;
            let nil_id = self.i32_t.const_int(types.type_id(types.nil()) as u64, false);
            let bool_id = self
                .i32_t
                .const_int(types.type_id(types.bool_()) as u64, false);
            let is_nil = self
                .builder
                .build_int_compare(IntPredicate::EQ, tag, nil_id, "tag.nil")
                .map_err(|_| self.op_err("cmp"))?;
            let is_bool = self
                .builder
                .build_int_compare(IntPredicate::EQ, tag, bool_id, "tag.bool")
                .map_err(|_| self.op_err("cmp"))?;
            // Read the payload as a bool; only meaningful when the tag says
            // Bool, which the conjunction guards.
            let payload = self.union_value_ptr_as(union_ptr, ty, self.i1_t.into())?;
            let bool_payload = self
                .builder
                .build_load(payload, "union.bool")
                .map_err(|_| self.op_err("load"))?
                .into_int_value();
            let not_payload = self
                .builder
                .build_not(bool_payload, "union.bool.not")
                .map_err(|_| self.op_err("not"))?;
            let false_bool = self
                .builder
                .build_and(is_bool, not_payload, "tag.false")
                .map_err(|_| self.op_err("and"))?;
            let falsey = self
                .builder
                .build_or(is_nil, false_bool, "falsey")
                .map_err(|_| self.op_err("or"))?;
            return self
                .builder
                .build_not(falsey, "truthy")
                .map_err(|_| self.op_err("not"));
        }
        Ok(self.i1_t.const_int(1, false))
    }

    // --- Branched-block value sink ---

    pub(crate) fn new_sink(&self, ty: Ty, label: &str) -> DiagnosticResult<BranchSink<'ctx>> {
        let fun = self.current_fun()?;
        let exit = self.context.append_basic_block(fun, label);
        let union_slot = if self.program.types.is_union(ty) || self.program.types.is_hierarchy(ty) {
            Some(self.entry_alloca(self.map_type_to_llvm(ty), &format!("{}.value", label))?)
        } else {
            None
        };
        Ok(BranchSink {
            ty,
            exit,
            union_slot,
            incoming: Vec::new(),
            reached: false,
        })
    }

    /// Records the value produced by the path currently being emitted and
    /// branches to the sink's merge block. A no-op when the path already
    /// diverged.
    pub(crate) fn sink_add(
        &self,
        sink: &mut BranchSink<'ctx>,
        value_ty: Ty,
        value: Option<BasicValueEnum<'ctx>>,
    ) -> DiagnosticResult<()> {
        if self.current_block_terminated() {
            return Ok(());
        }
        let types = &self.program.types;
        if let Some(slot) = sink.union_slot {
            self.store_into_union(slot, sink.ty, value_ty, value)?;
        } else if !types.is_void(sink.ty) && !types.is_no_return(sink.ty) {
            let coerced = self.coerce_to(value, value_ty, sink.ty)?;
            let block = self
                .builder
                .get_insert_block()
                .ok_or_else(|| self.op_err("insert block"))?;
            sink.incoming.push((coerced, block));
        }
        sink.reached = true;
        self.builder
            .build_unconditional_branch(sink.exit)
            .map_err(|_| self.op_err("branch to merge"))?;
        Ok(())
    }

    /// Positions at the merge block and produces the merged value: the union
    /// slot pointer, a phi over the recorded paths, or `None` when no path
    /// reached the merge (the block is then terminated with `unreachable`).
    pub(crate) fn sink_finish(
        &self,
        sink: BranchSink<'ctx>,
    ) -> DiagnosticResult<Option<BasicValueEnum<'ctx>>> {
        self.builder.position_at_end(sink.exit);
        if !sink.reached {
            self.builder
                .build_unreachable()
                .map_err(|_| self.op_err("unreachable"))?;
            return Ok(None);
        }
        if let Some(slot) = sink.union_slot {
            return Ok(Some(slot.into()));
        }
        let types = &self.program.types;
        if types.is_void(sink.ty) || types.is_no_return(sink.ty) {
            return Ok(Some(self.nil_value()));
        }
        let phi = self
            .builder
            .build_phi(self.map_type_to_llvm(sink.ty), "merge")
            .map_err(|_| self.op_err("phi"))?;
        for (value, block) in &sink.incoming {
            phi.add_incoming(&[(value, *block)]);
        }
        Ok(Some(phi.as_basic_value()))
    }

    /// Adapts a value of type `from` to the representation of `to` for
    /// phi-merged (non-union) positions. Union/hierarchy targets go through
    /// `store_into_union` instead.
    pub(crate) fn coerce_to(
        &self,
        value: Option<BasicValueEnum<'ctx>>,
        from: Ty,
        to: Ty,
    ) -> DiagnosticResult<BasicValueEnum<'ctx>> {
        let types = &self.program.types;
        if from == to {
            return Ok(value.unwrap_or_else(|| self.nil_value()));
        }
        if types.is_nilable(to) {
            // A nil-typed branch widens to the null carrier pointer.
            if types.is_nil(from) || types.is_integer(from) {
                return Ok(self.i8ptr_t.const_null().into());
            }
            let member = types.nilable_member(to).expect("nilable member");
            if types.implements(from, member) || types.is_nilable(from) {
                let value = value.ok_or_else(|| self.op_err("missing value"))?;
                return Ok(value);
            }
        }
        if types.is_class(to) && types.implements(from, to) {
            return Ok(value.unwrap_or_else(|| self.nil_value()));
        }
        if let Some(value) = value {
            if value.get_type() == self.map_type_to_llvm(to) {
                return Ok(value);
            }
        }
        bug(format!(
            "cannot adapt value of type {} to {}",
            types.name(from),
            types.name(to)
        ))
    }
}
