//! Function materialization.
//!
//! IR functions for user defs are created lazily on first call and cached by
//! mangled name, so monomorphization is idempotent: two calls specializing
//! the same def to the same receiver type share one IR function. Extern defs
//! become bare declarations under their C name.
//!
//! Every generated function gets the fixed alloca -> entry block chain;
//! parameters are stored into fresh slots so they have addresses, except
//! parameters that already arrive as pointers (class receivers, by-value
//! structs), which are bound directly.

use inkwell::attributes::AttributeLoc;
use inkwell::module::Linkage;
use inkwell::types::{AnyType, BasicType};
use inkwell::values::{BasicValueEnum, FunctionValue};
use std::collections::HashMap;

use crate::ast::DefId;
use crate::diagnostics::DiagnosticResult;
use crate::types::Ty;

use super::{CodeGen, HandlerFrame, VarBinding};

/// Per-function emission state, saved around nested `gen_def_ir` calls and
/// const-chain splices so the caller's context survives untouched.
pub(crate) struct SavedFunctionState<'ctx> {
    fun: Option<FunctionValue<'ctx>>,
    alloca_block: Option<inkwell::basic_block::BasicBlock<'ctx>>,
    vars: HashMap<String, VarBinding<'ctx>>,
    self_type: Option<Ty>,
    fun_return_type: Option<Ty>,
    fun_return_union: Option<inkwell::values::PointerValue<'ctx>>,
    return_block: Option<inkwell::basic_block::BasicBlock<'ctx>>,
    return_sink: Option<super::helpers::BranchSink<'ctx>>,
    break_block: Option<inkwell::basic_block::BasicBlock<'ctx>>,
    break_sink: Option<super::helpers::BranchSink<'ctx>>,
    handlers: Vec<HandlerFrame<'ctx>>,
    position: Option<inkwell::basic_block::BasicBlock<'ctx>>,
}

impl<'ctx, 'p> CodeGen<'ctx, 'p> {
    pub(crate) fn save_function_state(&self) -> SavedFunctionState<'ctx> {
        SavedFunctionState {
            fun: self.fun.get(),
            alloca_block: self.alloca_block.get(),
            vars: std::mem::take(&mut *self.vars.borrow_mut()),
            self_type: self.self_type.get(),
            fun_return_type: self.fun_return_type.get(),
            fun_return_union: self.fun_return_union.get(),
            return_block: self.return_block.take(),
            return_sink: self.return_sink.borrow_mut().take(),
            break_block: self.break_block.take(),
            break_sink: self.break_sink.borrow_mut().take(),
            handlers: std::mem::take(&mut *self.handler_stack.borrow_mut()),
            position: self.builder.get_insert_block(),
        }
    }

    pub(crate) fn restore_function_state(&self, saved: SavedFunctionState<'ctx>) {
        self.fun.set(saved.fun);
        self.alloca_block.set(saved.alloca_block);
        *self.vars.borrow_mut() = saved.vars;
        self.self_type.set(saved.self_type);
        self.fun_return_type.set(saved.fun_return_type);
        self.fun_return_union.set(saved.fun_return_union);
        self.return_block.set(saved.return_block);
        *self.return_sink.borrow_mut() = saved.return_sink;
        self.break_block.set(saved.break_block);
        *self.break_sink.borrow_mut() = saved.break_sink;
        *self.handler_stack.borrow_mut() = saved.handlers;
        if let Some(block) = saved.position {
            self.builder.position_at_end(block);
        }
    }

    /// Materializes the IR function for `def_id` specialized to `self_type`,
    /// generating its body on first use.
    pub(crate) fn gen_def_ir(
        &self,
        def_id: DefId,
        self_type: Option<Ty>,
    ) -> DiagnosticResult<FunctionValue<'ctx>> {
        let types = &self.program.types;
        let def = &self.program.defs[def_id];
        let mangled = def.mangled_name(types, self_type, def_id);
        if let Some(cached) = self.functions.borrow().get(&mangled) {
            return Ok(*cached);
        }

        let owner = self_type.or(def.owner);
        let self_param = owner.filter(|o| !def.is_extern && types.passed_as_self(*o));

        let mut param_types: Vec<inkwell::types::BasicMetadataTypeEnum<'ctx>> = Vec::new();
        if let Some(o) = self_param {
            param_types.push(self.map_arg_type(o).into());
        }
        for param in &def.params {
            param_types.push(self.map_arg_type(param.ty).into());
        }

        let returns_value =
            !(types.is_void(def.return_type) || types.is_no_return(def.return_type));
        let fn_type = if returns_value {
            self.map_type_to_llvm(def.return_type)
                .fn_type(&param_types, false)
        } else {
            self.context.void_type().fn_type(&param_types, false)
        };
        let linkage = if def.is_extern {
            None
        } else {
            Some(Linkage::Internal)
        };
        let fun = self.module.add_function(&mangled, fn_type, linkage);
        // Cache before emitting the body so recursive calls resolve.
        self.functions.borrow_mut().insert(mangled.clone(), fun);

        // By-value struct parameters carry the byval attribute.
        let byval_kind = inkwell::attributes::Attribute::get_named_enum_kind_id("byval");
        let self_offset = self_param.is_some() as usize;
        for (i, param) in def.params.iter().enumerate() {
            if types.passed_by_value(param.ty) {
                let attr = self.context.create_type_attribute(
                    byval_kind,
                    self.map_struct_type(param.ty).as_any_type_enum(),
                );
                fun.add_attribute(AttributeLoc::Param((i + self_offset) as u32), attr);
            }
        }
        if types.is_no_return(def.return_type) {
            let noreturn_kind = inkwell::attributes::Attribute::get_named_enum_kind_id("noreturn");
            fun.add_attribute(
                AttributeLoc::Function,
                self.context.create_enum_attribute(noreturn_kind, 0),
            );
        }

        if def.is_extern {
            return Ok(fun);
        }

        let saved = self.save_function_state();

        let alloca_block = self.context.append_basic_block(fun, "alloca");
        let entry = self.context.append_basic_block(fun, "entry");
        self.fun.set(Some(fun));
        self.alloca_block.set(Some(alloca_block));
        self.self_type.set(self_param);
        self.fun_return_type.set(Some(def.return_type));
        self.return_block.set(None);
        self.break_block.set(None);
        self.builder.position_at_end(entry);

        if types.is_union(def.return_type) || types.is_hierarchy(def.return_type) {
            let slot =
                self.entry_alloca(self.map_type_to_llvm(def.return_type), "return.union")?;
            self.fun_return_union.set(Some(slot));
        } else {
            self.fun_return_union.set(None);
        }

        // Bind parameters. Pointer-shaped parameters (class receivers,
        // by-value structs) bind directly; everything else gets a slot so it
        // has an address.
        let mut param_index = 0u32;
        if let Some(o) = self_param {
            let raw = fun.get_nth_param(param_index).expect("self param");
            param_index += 1;
            let binding = if raw.is_pointer_value() {
                VarBinding {
                    ptr: raw.into_pointer_value(),
                    ty: o,
                    treated_as_pointer: true,
                }
            } else {
                let slot = self.entry_alloca(self.map_type_to_llvm(o), "self")?;
                self.builder
                    .build_store(slot, raw)
                    .map_err(|_| self.op_err("store"))?;
                VarBinding {
                    ptr: slot,
                    ty: o,
                    treated_as_pointer: false,
                }
            };
            self.vars.borrow_mut().insert("self".to_string(), binding);
        }
        for param in &def.params {
            let raw = fun.get_nth_param(param_index).expect("param");
            param_index += 1;
            let binding = if types.passed_by_value(param.ty) {
                VarBinding {
                    ptr: raw.into_pointer_value(),
                    ty: param.ty,
                    treated_as_pointer: true,
                }
            } else {
                let slot = self.entry_alloca(self.map_type_to_llvm(param.ty), &param.name)?;
                self.builder
                    .build_store(slot, raw)
                    .map_err(|_| self.op_err("store"))?;
                VarBinding {
                    ptr: slot,
                    ty: param.ty,
                    treated_as_pointer: false,
                }
            };
            self.vars.borrow_mut().insert(param.name.clone(), binding);
        }

        let body_value = self.lower_expr(&def.body)?;
        let body_ty = def.body.ty().unwrap_or_else(|| types.nil());
        self.emit_function_epilogue(body_value, body_ty)?;

        self.builder.position_at_end(alloca_block);
        self.builder
            .build_unconditional_branch(entry)
            .map_err(|_| self.op_err("wire alloca block"))?;

        self.di_subprogram(fun, &mangled);
        self.restore_function_state(saved);
        Ok(fun)
    }

    /// Terminates the current function if its body fell through.
    pub(crate) fn emit_function_epilogue(
        &self,
        value: Option<BasicValueEnum<'ctx>>,
        value_ty: Ty,
    ) -> DiagnosticResult<()> {
        if self.current_block_terminated() {
            return Ok(());
        }
        self.emit_function_return(value, value_ty)
    }

    /// Emits the terminator for a value leaving the current function.
    pub(crate) fn emit_function_return(
        &self,
        value: Option<BasicValueEnum<'ctx>>,
        value_ty: Ty,
    ) -> DiagnosticResult<()> {
        let types = &self.program.types;
        let ret_ty = self
            .fun_return_type
            .get()
            .unwrap_or_else(|| types.void());

        if types.is_no_return(ret_ty) || types.is_no_return(value_ty) {
            self.builder
                .build_unreachable()
                .map_err(|_| self.op_err("unreachable"))?;
            return Ok(());
        }
        if types.is_void(ret_ty) {
            self.builder
                .build_return(None)
                .map_err(|_| self.op_err("ret void"))?;
            return Ok(());
        }
        if types.is_union(ret_ty) || types.is_hierarchy(ret_ty) {
            let slot = self
                .fun_return_union
                .get()
                .ok_or_else(|| self.op_err("missing return union slot"))?;
            if value_ty != ret_ty || value.is_some() {
                self.store_into_union(slot, ret_ty, value_ty, value)?;
            }
            let aggregate = self
                .builder
                .build_load(slot, "ret.union")
                .map_err(|_| self.op_err("load"))?;
            self.builder
                .build_return(Some(&aggregate))
                .map_err(|_| self.op_err("ret"))?;
            return Ok(());
        }
        if types.is_nilable(ret_ty) && types.is_nil(value_ty) {
            let null = self.i8ptr_t.const_null();
            self.builder
                .build_return(Some(&null))
                .map_err(|_| self.op_err("ret"))?;
            return Ok(());
        }
        let coerced = self.coerce_to(value, value_ty, ret_ty)?;
        self.builder
            .build_return(Some(&coerced))
            .map_err(|_| self.op_err("ret"))?;
        Ok(())
    }
}
