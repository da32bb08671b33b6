//! Variable reads: locals, casted locals, instance variables, class
//! variables and globals.
//!
//! Every read goes through `read_slot`, which adapts the slot's declared
//! type to the type the surrounding expression requests: narrowing a union
//! to one of its arms, narrowing a nilable to its member or to nil, boxing
//! a concrete value into a union or hierarchy view, and unboxing a
//! hierarchy payload.

use inkwell::values::BasicValueEnum;
use inkwell::AddressSpace;

use crate::diagnostics::{bug, DiagnosticResult};
use crate::types::Ty;

use super::super::{CodeGen, VarBinding};

impl<'ctx, 'p> CodeGen<'ctx, 'p> {
    pub(crate) fn lower_var_read(
        &self,
        name: &str,
        requested: Ty,
    ) -> DiagnosticResult<BasicValueEnum<'ctx>> {
        let binding = match self.vars.borrow().get(name) {
            Some(b) => *b,
            None => return bug(format!("read of undeclared variable {}", name)),
        };
        self.read_slot(binding.ptr, binding.ty, requested, binding.treated_as_pointer)
    }

    pub(crate) fn lower_instance_var_read(
        &self,
        name: &str,
        requested: Ty,
    ) -> DiagnosticResult<BasicValueEnum<'ctx>> {
        let (field_ptr, field_ty) = self.instance_var_slot(name)?;
        self.read_slot(field_ptr, field_ty, requested, false)
    }

    /// Slot pointer and declared type of instance variable `name` on the
    /// current receiver.
    pub(crate) fn instance_var_slot(
        &self,
        name: &str,
    ) -> DiagnosticResult<(inkwell::values::PointerValue<'ctx>, Ty)> {
        let owner = match self.self_type.get() {
            Some(t) => t,
            None => return bug("instance variable read without a receiver"),
        };
        let self_binding = match self.vars.borrow().get("self") {
            Some(b) => *b,
            None => return bug("missing self binding"),
        };
        let types = &self.program.types;
        let index = match types.index_of_instance_var(owner, name) {
            Some(i) => i,
            None => {
                return bug(format!(
                    "unknown instance variable {} on {}",
                    name,
                    types.name(owner)
                ))
            }
        };
        let field_ty = types
            .lookup_instance_var(owner, name)
            .expect("ivar type after index lookup");
        // `self` is bound as a pointer: the object reference for classes,
        // the struct pointer for by-value receivers.
        let field_ptr = self.struct_field_ptr(owner, self_binding.ptr, index as u32, name)?;
        Ok((field_ptr, field_ty))
    }

    pub(crate) fn lower_class_var_read(
        &self,
        owner: Ty,
        name: &str,
        requested: Ty,
    ) -> DiagnosticResult<BasicValueEnum<'ctx>> {
        let mangled = format!("{}::{}", self.program.types.name(owner), name);
        let binding = self.get_or_create_global(&mangled, requested)?;
        self.read_slot(binding.ptr, binding.ty, requested, false)
    }

    pub(crate) fn lower_global_read(
        &self,
        name: &str,
        requested: Ty,
    ) -> DiagnosticResult<BasicValueEnum<'ctx>> {
        let binding = self.get_or_create_global(name, requested)?;
        self.read_slot(binding.ptr, binding.ty, requested, false)
    }

    /// Lazily creates the zero-initialized internal global backing a global
    /// or class variable. The declared type is fixed by the first touch.
    pub(crate) fn get_or_create_global(
        &self,
        name: &str,
        ty: Ty,
    ) -> DiagnosticResult<VarBinding<'ctx>> {
        if let Some(binding) = self.global_bindings.borrow().get(name) {
            return Ok(*binding);
        }
        let llvm_ty = self.map_type_to_llvm(ty);
        let global = self.module.add_global(llvm_ty, None, name);
        global.set_initializer(&self.zero_value(llvm_ty));
        global.set_linkage(inkwell::module::Linkage::Internal);
        let binding = VarBinding {
            ptr: global.as_pointer_value(),
            ty,
            treated_as_pointer: false,
        };
        self.global_bindings
            .borrow_mut()
            .insert(name.to_string(), binding);
        Ok(binding)
    }

    pub(crate) fn zero_value(
        &self,
        ty: inkwell::types::BasicTypeEnum<'ctx>,
    ) -> BasicValueEnum<'ctx> {
        use inkwell::types::BasicTypeEnum;
        match ty {
            BasicTypeEnum::IntType(t) => t.const_zero().into(),
            BasicTypeEnum::FloatType(t) => t.const_zero().into(),
            BasicTypeEnum::PointerType(t) => t.const_null().into(),
            BasicTypeEnum::StructType(t) => t.const_zero().into(),
            BasicTypeEnum::ArrayType(t) => t.const_zero().into(),
            _ => unreachable!("no zero value for {:?}", ty),
        }
    }

    /// Reads a slot declared at `declared` as a value of type `requested`.
    pub(crate) fn read_slot(
        &self,
        ptr: inkwell::values::PointerValue<'ctx>,
        declared: Ty,
        requested: Ty,
        treated_as_pointer: bool,
    ) -> DiagnosticResult<BasicValueEnum<'ctx>> {
        let types = &self.program.types;

        if declared == requested {
            if treated_as_pointer || self.behind_pointer(declared) {
                return Ok(ptr.into());
            }
            return self
                .builder
                .build_load(ptr, "load")
                .map_err(|_| self.op_err("load"));
        }

        if types.is_nilable(declared) {
            let carrier = self
                .builder
                .build_load(ptr, "nilable")
                .map_err(|_| self.op_err("load"))?
                .into_pointer_value();
            // Requesting the nil alternative asks whether the carrier is
            // null; requesting the member assumes the checker proved it
            // non-null and hands back the pointer.
            if types.is_nil(requested) {
                return Ok(self.null_pointer_test(carrier, "is_nil")?.into());
            }
            if types.nilable_member(declared) == Some(requested) {
                return Ok(carrier.into());
            }
            if types.is_union(requested) || types.is_hierarchy(requested) {
                return Ok(self
                    .box_value(Some(carrier.into()), declared, requested)?
                    .into());
            }
            return bug("unsupported nilable narrowing");
        }

        if types.is_union(declared) {
            if types.is_union(requested) {
                // Union-to-union view: the tag layout is shared, so the
                // narrower view is a cast of the same slot.
                let narrowed = self
                    .builder
                    .build_pointer_cast(
                        ptr,
                        self.union_struct_type(requested)
                            .ptr_type(AddressSpace::default()),
                        "union.view",
                    )
                    .map_err(|_| self.op_err("union view cast"))?;
                return Ok(narrowed.into());
            }
            if types.is_nilable(requested) {
                // The requested carrier is in the payload slot.
                let payload = self.union_value_ptr_as(ptr, declared, self.i8ptr_t.into())?;
                return self
                    .builder
                    .build_load(payload, "union.nilable")
                    .map_err(|_| self.op_err("load"));
            }
            if types.is_hierarchy(requested) {
                return Ok(self.box_value(Some(ptr.into()), declared, requested)?.into());
            }
            return self.read_union_member(ptr, declared, requested);
        }

        if types.is_hierarchy(declared) {
            if types.is_hierarchy(requested) || types.is_union(requested) {
                return Ok(self.box_value(Some(ptr.into()), declared, requested)?.into());
            }
            // Concrete view of a hierarchy value: the payload reference.
            let payload = self.union_value_ptr(ptr, declared)?;
            return self
                .builder
                .build_load(payload, "unboxed")
                .map_err(|_| self.op_err("load"));
        }

        // Concrete declared type widened into a union/hierarchy/nilable view.
        if types.is_union(requested) || types.is_hierarchy(requested) {
            let value = self.read_slot(ptr, declared, declared, treated_as_pointer)?;
            return Ok(self.box_value(Some(value), declared, requested)?.into());
        }
        if types.is_nilable(requested) {
            let value = self.read_slot(ptr, declared, declared, treated_as_pointer)?;
            return self.coerce_to(Some(value), declared, requested);
        }
        if types.implements(declared, requested) {
            return self.read_slot(ptr, declared, declared, treated_as_pointer);
        }
        bug(format!(
            "cannot read {} slot as {}",
            types.name(declared),
            types.name(requested)
        ))
    }
}
