//! Unary/binary primitives, `is_a` tests, raw-pointer primitives and the
//! allocate primitive.
//!
//! Binary primitives are emitted for matching operand kinds only; mixed
//! arithmetic is resolved upstream by inserting conversion calls. `is_a`
//! folds to a constant when the receiver's static type already decides the
//! answer, and otherwise compares the runtime tag.

use inkwell::types::BasicType;
use inkwell::values::{BasicValueEnum, IntValue};
use inkwell::AddressSpace;
use inkwell::{FloatPredicate, IntPredicate};

use crate::ast::{BinaryOp, Node, PointerOp, UnaryOp};
use crate::diagnostics::{bug, DiagnosticResult};
use crate::types::{Ty, TypeKind};

use super::super::CodeGen;

impl<'ctx, 'p> CodeGen<'ctx, 'p> {
    pub(crate) fn lower_binary_primitive(
        &self,
        op: BinaryOp,
        left: &'p Node,
        right: &'p Node,
    ) -> DiagnosticResult<Option<BasicValueEnum<'ctx>>> {
        let lhs = match self.lower_expr(left)? {
            Some(v) => v,
            None => return Ok(None),
        };
        if self.current_block_terminated() {
            return Ok(None);
        }
        let rhs = match self.lower_expr(right)? {
            Some(v) => v,
            None => return Ok(None),
        };
        if self.current_block_terminated() {
            return Ok(None);
        }

        let operand_ty = left
            .ty()
            .ok_or_else(|| self.op_err("untyped primitive operand"))?;
        let types = &self.program.types;

        if types.is_float(operand_ty) {
            return self.float_binary(op, lhs, rhs).map(Some);
        }
        let signed = match types.kind(operand_ty) {
            TypeKind::Int { signed, .. } => *signed,
            // Bool, Char and Symbol compare as unsigned integers.
            TypeKind::Bool | TypeKind::Char | TypeKind::Symbol => false,
            TypeKind::Class { .. } | TypeKind::Pointer { .. } => {
                return self.pointer_binary(op, lhs, rhs).map(Some)
            }
            other => return bug(format!("binary primitive on {:?}", other)),
        };
        self.int_binary(op, lhs.into_int_value(), rhs.into_int_value(), signed)
            .map(Some)
    }

    fn int_binary(
        &self,
        op: BinaryOp,
        lhs: IntValue<'ctx>,
        rhs: IntValue<'ctx>,
        signed: bool,
    ) -> DiagnosticResult<BasicValueEnum<'ctx>> {
        let b = &self.builder;
        let err = |_| self.op_err("int primitive");
        let value: BasicValueEnum<'ctx> = match op {
            BinaryOp::Add => b.build_int_add(lhs, rhs, "add").map_err(err)?.into(),
            BinaryOp::Sub => b.build_int_sub(lhs, rhs, "sub").map_err(err)?.into(),
            BinaryOp::Mul => b.build_int_mul(lhs, rhs, "mul").map_err(err)?.into(),
            BinaryOp::Div => {
                if signed {
                    b.build_int_signed_div(lhs, rhs, "div").map_err(err)?.into()
                } else {
                    b.build_int_unsigned_div(lhs, rhs, "div")
                        .map_err(err)?
                        .into()
                }
            }
            BinaryOp::Rem => {
                if signed {
                    b.build_int_signed_rem(lhs, rhs, "rem").map_err(err)?.into()
                } else {
                    b.build_int_unsigned_rem(lhs, rhs, "rem")
                        .map_err(err)?
                        .into()
                }
            }
            BinaryOp::Shl => b.build_left_shift(lhs, rhs, "shl").map_err(err)?.into(),
            BinaryOp::Shr => b
                .build_right_shift(lhs, rhs, signed, "shr")
                .map_err(err)?
                .into(),
            BinaryOp::BitAnd => b.build_and(lhs, rhs, "and").map_err(err)?.into(),
            BinaryOp::BitOr => b.build_or(lhs, rhs, "or").map_err(err)?.into(),
            BinaryOp::BitXor => b.build_xor(lhs, rhs, "xor").map_err(err)?.into(),
            BinaryOp::Eq
            | BinaryOp::Ne
            | BinaryOp::Lt
            | BinaryOp::Le
            | BinaryOp::Gt
            | BinaryOp::Ge => {
                let pred = match (op, signed) {
                    (BinaryOp::Eq, _) => IntPredicate::EQ,
                    (BinaryOp::Ne, _) => IntPredicate::NE,
                    (BinaryOp::Lt, true) => IntPredicate::SLT,
                    (BinaryOp::Lt, false) => IntPredicate::ULT,
                    (BinaryOp::Le, true) => IntPredicate::SLE,
                    (BinaryOp::Le, false) => IntPredicate::ULE,
                    (BinaryOp::Gt, true) => IntPredicate::SGT,
                    (BinaryOp::Gt, false) => IntPredicate::UGT,
                    (BinaryOp::Ge, true) => IntPredicate::SGE,
                    (BinaryOp::Ge, false) => IntPredicate::UGE,
                    _ => unreachable!(),
                };
                b.build_int_compare(pred, lhs, rhs, "cmp").map_err(err)?.into()
            }
        };
        Ok(value)
    }

    fn float_binary(
        &self,
        op: BinaryOp,
        lhs: BasicValueEnum<'ctx>,
        rhs: BasicValueEnum<'ctx>,
    ) -> DiagnosticResult<BasicValueEnum<'ctx>> {
        let lhs = lhs.into_float_value();
        let rhs = rhs.into_float_value();
        let b = &self.builder;
        let err = |_| self.op_err("float primitive");
        let value: BasicValueEnum<'ctx> = match op {
            BinaryOp::Add => b.build_float_add(lhs, rhs, "fadd").map_err(err)?.into(),
            BinaryOp::Sub => b.build_float_sub(lhs, rhs, "fsub").map_err(err)?.into(),
            BinaryOp::Mul => b.build_float_mul(lhs, rhs, "fmul").map_err(err)?.into(),
            BinaryOp::Div => b.build_float_div(lhs, rhs, "fdiv").map_err(err)?.into(),
            BinaryOp::Rem => b.build_float_rem(lhs, rhs, "frem").map_err(err)?.into(),
            BinaryOp::Eq
            | BinaryOp::Ne
            | BinaryOp::Lt
            | BinaryOp::Le
            | BinaryOp::Gt
            | BinaryOp::Ge => {
                let pred = match op {
                    BinaryOp::Eq => FloatPredicate::OEQ,
                    BinaryOp::Ne => FloatPredicate::ONE,
                    BinaryOp::Lt => FloatPredicate::OLT,
                    BinaryOp::Le => FloatPredicate::OLE,
                    BinaryOp::Gt => FloatPredicate::OGT,
                    BinaryOp::Ge => FloatPredicate::OGE,
                    _ => unreachable!(),
                };
                b.build_float_compare(pred, lhs, rhs, "fcmp")
                    .map_err(err)?
                    .into()
            }
            other => return bug(format!("float primitive {:?}", other)),
        };
        Ok(value)
    }

    fn pointer_binary(
        &self,
        op: BinaryOp,
        lhs: BasicValueEnum<'ctx>,
        rhs: BasicValueEnum<'ctx>,
    ) -> DiagnosticResult<BasicValueEnum<'ctx>> {
        let to_int = |v: BasicValueEnum<'ctx>| -> DiagnosticResult<IntValue<'ctx>> {
            self.builder
                .build_ptr_to_int(v.into_pointer_value(), self.i64_t, "ptr.int")
                .map_err(|_| self.op_err("ptr_to_int"))
        };
        let pred = match op {
            BinaryOp::Eq => IntPredicate::EQ,
            BinaryOp::Ne => IntPredicate::NE,
            other => return bug(format!("pointer primitive {:?}", other)),
        };
        let cmp = self
            .builder
            .build_int_compare(pred, to_int(lhs)?, to_int(rhs)?, "ptr.cmp")
            .map_err(|_| self.op_err("cmp"))?;
        Ok(cmp.into())
    }

    pub(crate) fn lower_unary_primitive(
        &self,
        op: UnaryOp,
        operand: &'p Node,
        _ty: Ty,
    ) -> DiagnosticResult<Option<BasicValueEnum<'ctx>>> {
        let value = match self.lower_expr(operand)? {
            Some(v) => v,
            None => return Ok(None),
        };
        if self.current_block_terminated() {
            return Ok(None);
        }
        let result: BasicValueEnum<'ctx> = match (op, value) {
            (UnaryOp::Neg, BasicValueEnum::IntValue(iv)) => self
                .builder
                .build_int_neg(iv, "neg")
                .map_err(|_| self.op_err("neg"))?
                .into(),
            (UnaryOp::Neg, BasicValueEnum::FloatValue(fv)) => self
                .builder
                .build_float_neg(fv, "fneg")
                .map_err(|_| self.op_err("fneg"))?
                .into(),
            (UnaryOp::Not, BasicValueEnum::IntValue(iv)) => self
                .builder
                .build_not(iv, "not")
                .map_err(|_| self.op_err("not"))?
                .into(),
            (UnaryOp::BitNot, BasicValueEnum::IntValue(iv)) => self
                .builder
                .build_not(iv, "bnot")
                .map_err(|_| self.op_err("not"))?
                .into(),
            (op, value) => {
                return bug(format!("unary primitive {:?} on {:?}", op, value.get_type()))
            }
        };
        Ok(Some(result))
    }

    /// Runtime (or statically folded) type test.
    pub(crate) fn lower_is_a(
        &self,
        obj: &'p Node,
        target: Ty,
    ) -> DiagnosticResult<BasicValueEnum<'ctx>> {
        let types = &self.program.types;
        let static_ty = obj.ty().ok_or_else(|| self.op_err("untyped is_a receiver"))?;
        let obj_value = self.lower_expr(obj)?;

        if types.is_union(static_ty) || types.is_hierarchy(static_ty) {
            let ptr = obj_value
                .ok_or_else(|| self.op_err("missing is_a value"))?
                .into_pointer_value();
            let tag = self.load_union_tag(ptr, static_ty)?;
            return self.tag_matches_any(tag, &types.concrete_types(target));
        }

        if types.is_nilable(static_ty) {
            let member = types.nilable_member(static_ty).expect("nilable member");
            let carrier = obj_value
                .ok_or_else(|| self.op_err("missing is_a value"))?
                .into_pointer_value();
            let nil_matches = types.implements(types.nil(), target);
            let member_matches = types.implements(member, target);
            return match (nil_matches, member_matches) {
                (true, true) => Ok(self.i1_t.const_int(1, false).into()),
                (false, false) => Ok(self.i1_t.const_int(0, false).into()),
                (true, false) => Ok(self.null_pointer_test(carrier, "is_nil")?.into()),
                (false, true) => {
                    let is_null = self.null_pointer_test(carrier, "is_nil")?;
                    Ok(self
                        .builder
                        .build_not(is_null, "not_nil")
                        .map_err(|_| self.op_err("not"))?
                        .into())
                }
            };
        }

        // Concrete receiver: the answer is static.
        let result = types.implements(static_ty, target);
        Ok(self.i1_t.const_int(result as u64, false).into())
    }

    /// Disjunction of `tag == type_id(c)` over `candidates`.
    pub(crate) fn tag_matches_any(
        &self,
        tag: IntValue<'ctx>,
        candidates: &[Ty],
    ) -> DiagnosticResult<BasicValueEnum<'ctx>> {
        let types = &self.program.types;
        let mut acc: Option<IntValue<'ctx>> = None;
        for candidate in candidates {
            let id = self
                .i32_t
                .const_int(types.type_id(*candidate) as u64, false);
            let cmp = self
                .builder
                .build_int_compare(IntPredicate::EQ, tag, id, "tag.eq")
                .map_err(|_| self.op_err("cmp"))?;
            acc = Some(match acc {
                Some(prev) => self
                    .builder
                    .build_or(prev, cmp, "tag.any")
                    .map_err(|_| self.op_err("or"))?,
                None => cmp,
            });
        }
        Ok(acc
            .map(|v| v.into())
            .unwrap_or_else(|| self.i1_t.const_int(0, false).into()))
    }

    pub(crate) fn lower_pointer_primitive(
        &self,
        op: PointerOp,
        args: &'p [Node],
        node_ty: Ty,
    ) -> DiagnosticResult<Option<BasicValueEnum<'ctx>>> {
        let types = &self.program.types;
        let mut values = Vec::with_capacity(args.len());
        for arg in args {
            match self.lower_expr(arg)? {
                Some(v) => values.push(v),
                None => return Ok(None),
            }
            if self.current_block_terminated() {
                return Ok(None);
            }
        }

        match op {
            PointerOp::Malloc => {
                let elem = match types.kind(node_ty) {
                    TypeKind::Pointer { elem } => *elem,
                    _ => return bug("pointer malloc without pointer type"),
                };
                let count = self.int_as_i32(values[0])?;
                let elem_size = self
                    .i32_t
                    .const_int(types.llvm_size(elem).max(1), false);
                let size = self
                    .builder
                    .build_int_mul(count, elem_size, "alloc.size")
                    .map_err(|_| self.op_err("mul"))?;
                let raw = self.build_malloc(size, "ptr.malloc")?;
                let typed = self
                    .builder
                    .build_pointer_cast(
                        raw,
                        self.map_type_to_llvm(elem).ptr_type(AddressSpace::default()),
                        "ptr.typed",
                    )
                    .map_err(|_| self.op_err("pointer cast"))?;
                Ok(Some(typed.into()))
            }
            PointerOp::Realloc => {
                let elem = match types.kind(node_ty) {
                    TypeKind::Pointer { elem } => *elem,
                    _ => return bug("pointer realloc without pointer type"),
                };
                let ptr = values[0].into_pointer_value();
                let count = self.int_as_i32(values[1])?;
                let elem_size = self
                    .i32_t
                    .const_int(types.llvm_size(elem).max(1), false);
                let size = self
                    .builder
                    .build_int_mul(count, elem_size, "realloc.size")
                    .map_err(|_| self.op_err("mul"))?;
                let raw = self
                    .builder
                    .build_pointer_cast(ptr, self.i8ptr_t, "ptr.raw")
                    .map_err(|_| self.op_err("pointer cast"))?;
                let moved = self.build_realloc(raw, size, "ptr.realloc")?;
                let typed = self
                    .builder
                    .build_pointer_cast(
                        moved,
                        self.map_type_to_llvm(elem).ptr_type(AddressSpace::default()),
                        "ptr.typed",
                    )
                    .map_err(|_| self.op_err("pointer cast"))?;
                Ok(Some(typed.into()))
            }
            PointerOp::Get => {
                let elem = match args[0].ty().map(|t| types.kind(t)) {
                    Some(TypeKind::Pointer { elem }) => *elem,
                    _ => return bug("pointer read without pointer type"),
                };
                let ptr = values[0].into_pointer_value();
                if self.behind_pointer(elem) {
                    return Ok(Some(ptr.into()));
                }
                Ok(Some(
                    self.builder
                        .build_load(ptr, "ptr.value")
                        .map_err(|_| self.op_err("load"))?,
                ))
            }
            PointerOp::Set => {
                let elem = match args[0].ty().map(|t| types.kind(t)) {
                    Some(TypeKind::Pointer { elem }) => *elem,
                    _ => return bug("pointer write without pointer type"),
                };
                let ptr = values[0].into_pointer_value();
                let value_ty = args[1]
                    .ty()
                    .unwrap_or_else(|| self.program.types.nil());
                self.codegen_assign(ptr, elem, value_ty, Some(values[1]))?;
                Ok(Some(values[1]))
            }
            PointerOp::Add => {
                let elem = match args[0].ty().map(|t| types.kind(t)) {
                    Some(TypeKind::Pointer { elem }) => *elem,
                    _ => return bug("pointer add without pointer type"),
                };
                let ptr = values[0].into_pointer_value();
                let offset = values[1].into_int_value();
                let shifted = unsafe {
                    self.builder
                        .build_gep(ptr, &[offset], "ptr.add")
                        .map_err(|_| self.op_err("gep"))?
                };
                Ok(Some(shifted.into()))
            }
            PointerOp::Address => {
                let ptr = values[0].into_pointer_value();
                Ok(Some(
                    self.builder
                        .build_ptr_to_int(ptr, self.i64_t, "ptr.address")
                        .map_err(|_| self.op_err("ptr_to_int"))?
                        .into(),
                ))
            }
        }
    }

    fn int_as_i32(&self, value: BasicValueEnum<'ctx>) -> DiagnosticResult<IntValue<'ctx>> {
        let iv = value.into_int_value();
        if iv.get_type().get_bit_width() == 32 {
            return Ok(iv);
        }
        self.builder
            .build_int_cast(iv, self.i32_t, "as.i32")
            .map_err(|_| self.op_err("int cast"))
    }

    /// The allocate primitive: a zeroed instance. Reference classes come
    /// from the allocator; by-value structs live in a stack slot.
    pub(crate) fn lower_allocate(&self, class: Ty) -> DiagnosticResult<BasicValueEnum<'ctx>> {
        let types = &self.program.types;
        if types.passed_by_value(class) {
            let struct_ty = self.map_struct_type(class);
            let slot = self.entry_alloca(struct_ty.into(), "instance")?;
            self.builder
                .build_store(slot, struct_ty.const_zero())
                .map_err(|_| self.op_err("store"))?;
            return Ok(slot.into());
        }
        Ok(self.allocate_instance(class)?.into())
    }
}
