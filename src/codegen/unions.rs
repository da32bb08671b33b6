//! Reading, writing, tagging and bit-casting tagged-union values.
//!
//! Layout invariants:
//! - a tagged union slot is `{ i32 type_id, [N x i8] }`; the payload is
//!   reinterpreted through a pointer cast on every access;
//! - a hierarchy value is `{ i32 type_id, i8* }`, written through the same
//!   helpers (its payload is always the object reference);
//! - nilable values are bare nullable pointers and never carry a tag: the
//!   null pointer *is* nil.
//!
//! Union and hierarchy values always live behind pointers in the emission
//! environment; only the ABI boundary (calls, returns) moves them as
//! aggregates.

use inkwell::types::{BasicType, BasicTypeEnum};
use inkwell::values::{BasicValueEnum, IntValue, PointerValue};
use inkwell::AddressSpace;

use crate::diagnostics::{bug, DiagnosticResult};
use crate::types::Ty;

use super::CodeGen;

impl<'ctx, 'p> CodeGen<'ctx, 'p> {
    /// `GEP p,0,0`: pointer to the tag of a union/hierarchy value.
    pub fn union_tag_ptr(
        &self,
        ptr: PointerValue<'ctx>,
        ty: Ty,
    ) -> DiagnosticResult<PointerValue<'ctx>> {
        let struct_ty = self.union_struct_type(ty);
        self.builder
            .build_struct_gep(ptr, 0, "union.tag")
            .map_err(|_| self.op_err("union tag gep"))
    }

    /// `GEP p,0,1`: pointer to the payload slot of a union/hierarchy value.
    pub fn union_value_ptr(
        &self,
        ptr: PointerValue<'ctx>,
        ty: Ty,
    ) -> DiagnosticResult<PointerValue<'ctx>> {
        let struct_ty = self.union_struct_type(ty);
        self.builder
            .build_struct_gep(ptr, 1, "union.value")
            .map_err(|_| self.op_err("union value gep"))
    }

    /// The payload slot viewed as a pointer to `as_ty`.
    pub fn union_value_ptr_as(
        &self,
        ptr: PointerValue<'ctx>,
        ty: Ty,
        as_ty: BasicTypeEnum<'ctx>,
    ) -> DiagnosticResult<PointerValue<'ctx>> {
        let value_ptr = self.union_value_ptr(ptr, ty)?;
        self.builder
            .build_pointer_cast(
                value_ptr,
                as_ty.ptr_type(AddressSpace::default()),
                "union.value.cast",
            )
            .map_err(|_| self.op_err("union value cast"))
    }

    pub fn load_union_tag(
        &self,
        ptr: PointerValue<'ctx>,
        ty: Ty,
    ) -> DiagnosticResult<IntValue<'ctx>> {
        let tag_ptr = self.union_tag_ptr(ptr, ty)?;
        Ok(self
            .builder
            .build_load(tag_ptr, "tag")
            .map_err(|_| self.op_err("tag load"))?
            .into_int_value())
    }

    fn store_union_tag(
        &self,
        ptr: PointerValue<'ctx>,
        ty: Ty,
        tag: IntValue<'ctx>,
    ) -> DiagnosticResult<()> {
        let tag_ptr = self.union_tag_ptr(ptr, ty)?;
        self.builder
            .build_store(tag_ptr, tag)
            .map_err(|_| self.op_err("tag store"))?;
        Ok(())
    }

    fn const_type_id(&self, ty: Ty) -> IntValue<'ctx> {
        self.i32_t
            .const_int(self.program.types.type_id(ty) as u64, false)
    }

    /// Widens `value` of type `src_ty` into the union/hierarchy/nilable slot
    /// `dst` of type `dst_ty`.
    pub fn store_into_union(
        &self,
        dst: PointerValue<'ctx>,
        dst_ty: Ty,
        src_ty: Ty,
        value: Option<BasicValueEnum<'ctx>>,
    ) -> DiagnosticResult<()> {
        let types = &self.program.types;

        // Nilable destination: no tag, null encodes nil.
        if types.is_nilable(dst_ty) {
            let stored: BasicValueEnum<'ctx> = match value {
                // The nil literal arrives as an integer; int-to-ptr yields
                // the null carrier.
                Some(BasicValueEnum::IntValue(iv)) => self
                    .builder
                    .build_int_to_ptr(iv, self.i8ptr_t, "nil.ptr")
                    .map_err(|_| self.op_err("int_to_ptr"))?
                    .into(),
                Some(BasicValueEnum::PointerValue(pv)) => self
                    .builder
                    .build_pointer_cast(pv, self.i8ptr_t, "nilable.ptr")
                    .map_err(|_| self.op_err("pointer cast"))?
                    .into(),
                None => self.i8ptr_t.const_null().into(),
                Some(other) => {
                    return bug(format!(
                        "cannot store {:?} into nilable slot",
                        other.get_type()
                    ))
                }
            };
            self.builder
                .build_store(dst, stored)
                .map_err(|_| self.op_err("store"))?;
            return Ok(());
        }

        // Same representation: copy the aggregate through the source slot.
        if src_ty == dst_ty {
            let src_ptr = value
                .ok_or_else(|| self.op_err("missing union value"))?
                .into_pointer_value();
            let aggregate = self
                .builder
                .build_load(src_ptr, "union.copy")
                .map_err(|_| self.op_err("union load"))?;
            self.builder
                .build_store(dst, aggregate)
                .map_err(|_| self.op_err("store"))?;
            return Ok(());
        }

        // Union-to-union widening: load through a cast of the source pointer.
        if types.is_union(src_ty) {
            let src_ptr = value
                .ok_or_else(|| self.op_err("missing union value"))?
                .into_pointer_value();
            if types.is_hierarchy(dst_ty) {
                // The alternatives under a hierarchy are references, so the
                // source payload is read back as a pointer.
                let tag = self.load_union_tag(src_ptr, src_ty)?;
                let payload_ptr =
                    self.union_value_ptr_as(src_ptr, src_ty, self.i8ptr_t.into())?;
                let inner = self
                    .builder
                    .build_load(payload_ptr, "boxed")
                    .map_err(|_| self.op_err("payload load"))?;
                self.store_union_tag(dst, dst_ty, tag)?;
                let dst_value = self.union_value_ptr(dst, dst_ty)?;
                self.builder
                    .build_store(dst_value, inner)
                    .map_err(|_| self.op_err("store"))?;
            } else {
                let dst_struct = self.union_struct_type(dst_ty);
                let widened = self
                    .builder
                    .build_pointer_cast(
                        src_ptr,
                        dst_struct.ptr_type(AddressSpace::default()),
                        "union.widen",
                    )
                    .map_err(|_| self.op_err("union widen cast"))?;
                let aggregate = self
                    .builder
                    .build_load(widened, "union.copy")
                    .map_err(|_| self.op_err("union load"))?;
                self.builder
                    .build_store(dst, aggregate)
                    .map_err(|_| self.op_err("store"))?;
            }
            return Ok(());
        }

        // Hierarchy source: tag and reference are read out and re-stored.
        if types.is_hierarchy(src_ty) {
            let src_ptr = value
                .ok_or_else(|| self.op_err("missing hierarchy value"))?
                .into_pointer_value();
            let tag = self.load_union_tag(src_ptr, src_ty)?;
            let inner_ptr = self.union_value_ptr(src_ptr, src_ty)?;
            let inner = self
                .builder
                .build_load(inner_ptr, "boxed")
                .map_err(|_| self.op_err("payload load"))?;
            self.store_union_tag(dst, dst_ty, tag)?;
            let dst_value = self.union_value_ptr_as(dst, dst_ty, self.i8ptr_t.into())?;
            self.builder
                .build_store(dst_value, inner)
                .map_err(|_| self.op_err("store"))?;
            return Ok(());
        }

        // Nilable source: the tag is nil's when the pointer is null, the
        // member's otherwise; the payload is the raw pointer.
        if types.is_nilable(src_ty) {
            let member = types.nilable_member(src_ty).expect("nilable member");
            let ptr = value
                .ok_or_else(|| self.op_err("missing nilable value"))?
                .into_pointer_value();
            let is_null = self.null_pointer_test(ptr, "is_nil")?;
            let tag = self
                .builder
                .build_select(
                    is_null,
                    self.const_type_id(types.nil()),
                    self.const_type_id(member),
                    "tag",
                )
                .map_err(|_| self.op_err("select"))?
                .into_int_value();
            self.store_union_tag(dst, dst_ty, tag)?;
            let dst_value = self.union_value_ptr_as(dst, dst_ty, self.i8ptr_t.into())?;
            self.builder
                .build_store(dst_value, ptr)
                .map_err(|_| self.op_err("store"))?;
            return Ok(());
        }

        // Concrete source: constant tag, payload bit-cast to the source's
        // value type. By-value structs arrive behind a pointer and are
        // copied by value into the payload.
        self.store_union_tag(dst, dst_ty, self.const_type_id(src_ty))?;
        if types.is_nil(src_ty) || value.is_none() {
            let dst_value = self.union_value_ptr_as(dst, dst_ty, self.i1_t.into())?;
            self.builder
                .build_store(dst_value, self.i1_t.const_int(0, false))
                .map_err(|_| self.op_err("store"))?;
            return Ok(());
        }
        let value = value.expect("concrete union value");
        let stored = if types.passed_by_value(src_ty) {
            let struct_ty = self.map_struct_type(src_ty);
            self.builder
                .build_load(value.into_pointer_value(), "byval.copy")
                .map_err(|_| self.op_err("byval load"))?
        } else {
            value
        };
        let dst_value = self.union_value_ptr_as(dst, dst_ty, stored.get_type())?;
        self.builder
            .build_store(dst_value, stored)
            .map_err(|_| self.op_err("store"))?;
        Ok(())
    }

    /// Reads a concrete member out of a union slot: the payload bit-cast to
    /// the member's type, loaded unless the member is passed by value.
    pub fn read_union_member(
        &self,
        union_ptr: PointerValue<'ctx>,
        union_ty: Ty,
        member: Ty,
    ) -> DiagnosticResult<BasicValueEnum<'ctx>> {
        let member_llvm = self.map_type_to_llvm(member);
        let payload = self.union_value_ptr_as(union_ptr, union_ty, member_llvm)?;
        if self.program.types.passed_by_value(member) {
            return Ok(payload.into());
        }
        self.builder
            .build_load(payload, "union.member")
            .map_err(|_| self.op_err("member load"))
    }

    /// The ABI value of `value` for parameter/return position: aggregates
    /// behind pointers are loaded, everything else passes through.
    pub fn abi_value(
        &self,
        value: Option<BasicValueEnum<'ctx>>,
        ty: Ty,
    ) -> DiagnosticResult<BasicValueEnum<'ctx>> {
        let types = &self.program.types;
        if types.is_union(ty) || types.is_hierarchy(ty) {
            let ptr = value
                .ok_or_else(|| self.op_err("missing union value"))?
                .into_pointer_value();
            return self
                .builder
                .build_load(ptr, "union.abi")
                .map_err(|_| self.op_err("union load"));
        }
        Ok(value.unwrap_or_else(|| self.nil_value()))
    }

    /// Promotes a union/hierarchy aggregate returned by a call into a fresh
    /// slot, restoring the "unions live behind pointers" invariant.
    pub fn promote_aggregate(
        &self,
        aggregate: BasicValueEnum<'ctx>,
        ty: Ty,
    ) -> DiagnosticResult<PointerValue<'ctx>> {
        let slot = self.entry_alloca(self.map_type_to_llvm(ty), "promoted")?;
        self.builder
            .build_store(slot, aggregate)
            .map_err(|_| self.op_err("store"))?;
        Ok(slot)
    }

    /// Boxes a concrete value into a fresh slot of hierarchy/union type,
    /// returning the slot.
    pub fn box_value(
        &self,
        value: Option<BasicValueEnum<'ctx>>,
        src_ty: Ty,
        dst_ty: Ty,
    ) -> DiagnosticResult<PointerValue<'ctx>> {
        let slot = self.entry_alloca(self.map_type_to_llvm(dst_ty), "boxed")?;
        self.store_into_union(slot, dst_ty, src_ty, value)?;
        Ok(slot)
    }
}
