//! Mapping Beryl types to LLVM types.
//!
//! Three mappings, mirroring the three positions a type can appear in:
//! - `map_type_to_llvm`: the value form used for slots, loads and stores;
//! - `map_struct_type` : the instance struct behind a class reference or a
//!   by-value struct;
//! - `map_arg_type`    : the ABI form for parameters (by-value structs are
//!   passed as pointers carrying `byval`).
//!
//! Representation decisions:
//! - reference classes are opaque `i8*` values; their instance struct is
//!   only consulted for field access and allocation sizing;
//! - a tagged union is `{ i32 type_id, [N x i8] }` where N covers the
//!   largest alternative; the payload is bit-cast per access;
//! - a nilable type is the nullable `i8*` of its non-nil member;
//! - a hierarchy value is `{ i32 type_id, i8* }`, layout-compatible with a
//!   tagged union whose payload is a pointer.

use inkwell::types::{BasicType, BasicTypeEnum, StructType};
use inkwell::AddressSpace;

use crate::types::{Ty, TypeKind};

use super::CodeGen;

impl<'ctx, 'p> CodeGen<'ctx, 'p> {
    /// The value form of `ty`.
    pub fn map_type_to_llvm(&self, ty: Ty) -> BasicTypeEnum<'ctx> {
        let types = &self.program.types;
        match types.kind(ty) {
            TypeKind::Nil | TypeKind::Bool => self.i1_t.as_basic_type_enum(),
            TypeKind::Char => self.i8_t.as_basic_type_enum(),
            TypeKind::Symbol => self.i32_t.as_basic_type_enum(),
            // Void/NoReturn never appear in value position; a harmless i1
            // keeps callers uniform.
            TypeKind::Void | TypeKind::NoReturn => self.i1_t.as_basic_type_enum(),
            TypeKind::Int { bits, .. } => self
                .context
                .custom_width_int_type(*bits)
                .as_basic_type_enum(),
            TypeKind::Float { bits: 32 } => self.f32_t.as_basic_type_enum(),
            TypeKind::Float { .. } => self.f64_t.as_basic_type_enum(),
            TypeKind::Class { by_value, .. } => {
                if *by_value {
                    self.map_struct_type(ty).as_basic_type_enum()
                } else {
                    self.i8ptr_t.as_basic_type_enum()
                }
            }
            TypeKind::CStruct { .. } | TypeKind::CUnion { .. } => {
                self.map_struct_type(ty).as_basic_type_enum()
            }
            TypeKind::Pointer { elem } => self
                .map_type_to_llvm(*elem)
                .ptr_type(AddressSpace::default())
                .as_basic_type_enum(),
            TypeKind::Union { .. } => {
                if types.is_nilable(ty) {
                    self.i8ptr_t.as_basic_type_enum()
                } else {
                    self.union_struct_type(ty).as_basic_type_enum()
                }
            }
            TypeKind::Hierarchy { .. } => self.union_struct_type(ty).as_basic_type_enum(),
        }
    }

    /// The ABI form of `ty` in parameter position: by-value structs travel
    /// behind a pointer, everything else in its value form.
    pub fn map_arg_type(&self, ty: Ty) -> BasicTypeEnum<'ctx> {
        if self.program.types.passed_by_value(ty) {
            self.map_struct_type(ty)
                .ptr_type(AddressSpace::default())
                .as_basic_type_enum()
        } else {
            self.map_type_to_llvm(ty)
        }
    }

    /// The instance struct of a class, C struct or C union. For C unions the
    /// body is a single byte array sized to the largest field.
    pub fn map_struct_type(&self, ty: Ty) -> StructType<'ctx> {
        if let Some(cached) = self.struct_types.borrow().get(&ty) {
            return *cached;
        }
        let types = &self.program.types;
        let llvm_name = match types.kind(ty) {
            TypeKind::CStruct { .. } | TypeKind::CUnion { .. } => {
                format!("struct.{}", types.name(ty))
            }
            _ => format!("class.{}", types.name(ty)),
        };
        let struct_ty = self.context.opaque_struct_type(&llvm_name);
        // Insert before computing the body so self-referential fields (which
        // are always behind pointers) terminate.
        self.struct_types.borrow_mut().insert(ty, struct_ty);

        let body: Vec<BasicTypeEnum<'ctx>> = match types.kind(ty) {
            TypeKind::CUnion { .. } => {
                let size = types.llvm_size(ty);
                vec![self.i8_t.array_type(size as u32).as_basic_type_enum()]
            }
            _ => types
                .all_ivars(ty)
                .iter()
                .map(|(_, field_ty)| self.map_type_to_llvm(*field_ty))
                .collect(),
        };
        struct_ty.set_body(&body, false);
        struct_ty
    }

    /// The `{ tag, payload }` struct of a tagged union or hierarchy type.
    pub fn union_struct_type(&self, ty: Ty) -> StructType<'ctx> {
        if let Some(cached) = self.union_types.borrow().get(&ty) {
            return *cached;
        }
        let types = &self.program.types;
        let (llvm_name, payload): (String, BasicTypeEnum<'ctx>) = if types.is_hierarchy(ty) {
            (
                format!("hier.{}", types.name(types.hierarchy_base(ty))),
                self.i8ptr_t.as_basic_type_enum(),
            )
        } else {
            let size = types.union_payload_size(ty);
            (
                format!("union.{}", types.name(ty)),
                self.i8_t.array_type(size as u32).as_basic_type_enum(),
            )
        };
        let struct_ty = self.context.opaque_struct_type(&llvm_name);
        struct_ty.set_body(&[self.i32_t.as_basic_type_enum(), payload], false);
        self.union_types.borrow_mut().insert(ty, struct_ty);
        struct_ty
    }

    /// Whether values of `ty` live behind a pointer in the variable
    /// environment (tagged unions and hierarchy values always do).
    pub fn behind_pointer(&self, ty: Ty) -> bool {
        let types = &self.program.types;
        types.is_union(ty) || types.is_hierarchy(ty) || types.passed_by_value(ty)
    }
}
