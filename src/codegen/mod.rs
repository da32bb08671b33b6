//! Top-level code generation module.
//!
//! `CodeGen` holds the LLVM `Context`, `Module` and `Builder`, caches for
//! lowered types and materialized functions, and the per-emission state the
//! lowering passes thread through: the variable environment, the current
//! receiver type, return/break rendezvous targets, the exception handler
//! stack and the block activation stack. Lowering is organized across
//! submodules:
//! - `types`     : mapping Beryl types to LLVM ABI types
//! - `unions`    : tagged-union / nilable / hierarchy representation
//! - `helpers`   : alloca placement, allocation, condition coercion, sinks
//! - `expr`      : expression lowering
//! - `consts`    : deferred constant initialization
//! - `calls`     : call lowering and monomorphization
//! - `functions` : function materialization
//! - `blocks`    : block (iterator closure) inlining
//! - `dispatch`  : runtime type-id dispatch cascades
//! - `exceptions`: landing pads and rescue clauses
//! - `debug`     : DWARF subprogram metadata
//!
//! Emission is single-threaded and non-suspending: one `CodeGen` owns one
//! module for the duration of a compile, and concurrent compilations must
//! use disjoint contexts.

use inkwell::basic_block::BasicBlock;
use inkwell::builder::Builder;
use inkwell::context::Context;
use inkwell::module::{Linkage, Module};
use inkwell::types::{BasicType, StructType};
use inkwell::values::{BasicValueEnum, FunctionValue, PointerValue};
use inkwell::AddressSpace;
use std::cell::{Cell, RefCell};
use std::collections::HashMap;

pub mod blocks;
pub mod calls;
pub mod consts;
pub mod debug;
pub mod dispatch;
pub mod exceptions;
pub mod expr;
pub mod functions;
pub mod helpers;
pub mod types;
pub mod unions;

use crate::ast::{BlockNode, ConstId};
use crate::diagnostics::{bug, Diagnostic, DiagnosticResult, Severity};
use crate::program::Program;
use crate::types::Ty;
use crate::CodegenOptions;
use helpers::BranchSink;

/// Name of the program entry point in the emitted module.
pub const MAIN_NAME: &str = "__crystal_main";

/// A local binding. `treated_as_pointer` means the stored value *is* the
/// pointer itself: by-value structs and `self` when it arrives as a pointer.
#[derive(Debug, Clone, Copy)]
pub struct VarBinding<'ctx> {
    pub ptr: PointerValue<'ctx>,
    pub ty: Ty,
    pub treated_as_pointer: bool,
}

/// An active exception handler; calls emitted while one is on the stack use
/// `invoke` targeting its catch block.
#[derive(Debug, Clone, Copy)]
pub struct HandlerFrame<'ctx> {
    pub catch_block: BasicBlock<'ctx>,
}

/// Caller context stashed while a callee with an attached block is inlined.
/// Popped at each `yield` so the block body runs in the caller's environment
/// with the caller's non-local `return` target.
pub struct BlockFrame<'ctx, 'p> {
    pub block: &'p BlockNode,
    pub vars: HashMap<String, VarBinding<'ctx>>,
    pub self_type: Option<Ty>,
    pub return_block: Option<BasicBlock<'ctx>>,
    pub return_sink: Option<BranchSink<'ctx>>,
    pub fun_return_type: Option<Ty>,
    pub fun_return_union: Option<PointerValue<'ctx>>,
}

/// Main code generation context. See the module docs for the architecture.
pub struct CodeGen<'ctx, 'p> {
    pub context: &'ctx Context,
    pub module: Module<'ctx>,
    pub builder: Builder<'ctx>,
    pub program: &'p Program,
    pub options: CodegenOptions,

    // Cached LLVM scalar types.
    pub i1_t: inkwell::types::IntType<'ctx>,
    pub i8_t: inkwell::types::IntType<'ctx>,
    pub i16_t: inkwell::types::IntType<'ctx>,
    pub i32_t: inkwell::types::IntType<'ctx>,
    pub i64_t: inkwell::types::IntType<'ctx>,
    pub f32_t: inkwell::types::FloatType<'ctx>,
    pub f64_t: inkwell::types::FloatType<'ctx>,
    pub i8ptr_t: inkwell::types::PointerType<'ctx>,

    // Module-level caches.
    pub(crate) struct_types: RefCell<HashMap<Ty, StructType<'ctx>>>,
    pub(crate) union_types: RefCell<HashMap<Ty, StructType<'ctx>>>,
    pub(crate) functions: RefCell<HashMap<String, FunctionValue<'ctx>>>,
    pub(crate) string_literals: RefCell<HashMap<String, PointerValue<'ctx>>>,
    pub(crate) next_str_id: Cell<u32>,
    pub(crate) symbol_ids: HashMap<String, u32>,
    pub(crate) symbol_strings: Vec<String>,
    pub(crate) const_globals: RefCell<HashMap<ConstId, PointerValue<'ctx>>>,
    pub(crate) global_bindings: RefCell<HashMap<String, VarBinding<'ctx>>>,
    pub(crate) malloc_fn: Cell<Option<FunctionValue<'ctx>>>,
    pub(crate) realloc_fn: Cell<Option<FunctionValue<'ctx>>>,
    pub(crate) memset_fn: Cell<Option<FunctionValue<'ctx>>>,
    pub(crate) personality_fn: Cell<Option<FunctionValue<'ctx>>>,

    // Per-function emission state.
    pub(crate) fun: Cell<Option<FunctionValue<'ctx>>>,
    pub(crate) alloca_block: Cell<Option<BasicBlock<'ctx>>>,
    pub(crate) vars: RefCell<HashMap<String, VarBinding<'ctx>>>,
    pub(crate) self_type: Cell<Option<Ty>>,
    pub(crate) fun_return_type: Cell<Option<Ty>>,
    pub(crate) fun_return_union: Cell<Option<PointerValue<'ctx>>>,
    pub(crate) return_block: Cell<Option<BasicBlock<'ctx>>>,
    pub(crate) return_sink: RefCell<Option<BranchSink<'ctx>>>,
    pub(crate) break_block: Cell<Option<BasicBlock<'ctx>>>,
    pub(crate) break_sink: RefCell<Option<BranchSink<'ctx>>>,
    pub(crate) handler_stack: RefCell<Vec<HandlerFrame<'ctx>>>,
    pub(crate) block_stack: RefCell<Vec<BlockFrame<'ctx, 'p>>>,

    // Const initializer chain inside the entry function.
    pub(crate) const_tail: Cell<Option<BasicBlock<'ctx>>>,
    pub(crate) main_fun: Cell<Option<FunctionValue<'ctx>>>,
    pub(crate) main_alloca: Cell<Option<BasicBlock<'ctx>>>,

    pub(crate) di: RefCell<Option<debug::DebugInfoGenerator<'ctx>>>,
}

impl<'ctx, 'p> CodeGen<'ctx, 'p> {
    pub fn new(context: &'ctx Context, program: &'p Program, options: CodegenOptions) -> Self {
        let module = context.create_module(&options.module_name);
        let builder = context.create_builder();
        let i8ptr_t = context.i8_type().ptr_type(AddressSpace::default());

        // Symbol ids are assigned by sorting the set of symbols appearing
        // anywhere in the program; the id is the 0-based position.
        let symbol_strings = program.collect_symbols();
        let symbol_ids = symbol_strings
            .iter()
            .enumerate()
            .map(|(i, s)| (s.clone(), i as u32))
            .collect();

        let di = if options.debug_info {
            Some(debug::DebugInfoGenerator::new(&module, &options.source_file))
        } else {
            None
        };

        CodeGen {
            context,
            module,
            builder,
            program,
            options,
            i1_t: context.bool_type(),
            i8_t: context.i8_type(),
            i16_t: context.i16_type(),
            i32_t: context.i32_type(),
            i64_t: context.i64_type(),
            f32_t: context.f32_type(),
            f64_t: context.f64_type(),
            i8ptr_t,
            struct_types: RefCell::new(HashMap::new()),
            union_types: RefCell::new(HashMap::new()),
            functions: RefCell::new(HashMap::new()),
            string_literals: RefCell::new(HashMap::new()),
            next_str_id: Cell::new(0),
            symbol_ids,
            symbol_strings,
            const_globals: RefCell::new(HashMap::new()),
            global_bindings: RefCell::new(HashMap::new()),
            malloc_fn: Cell::new(None),
            realloc_fn: Cell::new(None),
            memset_fn: Cell::new(None),
            personality_fn: Cell::new(None),
            fun: Cell::new(None),
            alloca_block: Cell::new(None),
            vars: RefCell::new(HashMap::new()),
            self_type: Cell::new(None),
            fun_return_type: Cell::new(None),
            fun_return_union: Cell::new(None),
            return_block: Cell::new(None),
            return_sink: RefCell::new(None),
            break_block: Cell::new(None),
            break_sink: RefCell::new(None),
            handler_stack: RefCell::new(Vec::new()),
            block_stack: RefCell::new(Vec::new()),
            const_tail: Cell::new(None),
            main_fun: Cell::new(None),
            main_alloca: Cell::new(None),
            di: RefCell::new(di),
        }
    }

    /// Compiles the whole program into the module: the `__crystal_main`
    /// entry, its const-initializer chain, every transitively called def,
    /// the `main` wrapper and the symbol table.
    pub fn compile(&self) -> DiagnosticResult<()> {
        let types = &self.program.types;
        let body_ty = self.program.body.ty().unwrap_or_else(|| types.nil());

        let arg_types = [
            self.i32_t.into(),
            self.i8ptr_t.ptr_type(AddressSpace::default()).into(),
        ];
        let returns_value = !(types.is_void(body_ty) || types.is_no_return(body_ty));
        let fn_type = if returns_value {
            self.map_type_to_llvm(body_ty).fn_type(&arg_types, false)
        } else {
            self.context.void_type().fn_type(&arg_types, false)
        };
        let main = self.module.add_function(MAIN_NAME, fn_type, None);
        self.main_fun.set(Some(main));
        self.di_subprogram(main, MAIN_NAME);

        // Fixed block chain: alloca -> const -> entry. Const initializers
        // splice after `const`; the chain is wired up once emission is done.
        let alloca_block = self.context.append_basic_block(main, "alloca");
        let const_head = self.context.append_basic_block(main, "const");
        let entry = self.context.append_basic_block(main, "entry");
        self.fun.set(Some(main));
        self.alloca_block.set(Some(alloca_block));
        self.main_alloca.set(Some(alloca_block));
        self.const_tail.set(Some(const_head));
        self.fun_return_type.set(Some(body_ty));
        if types.is_union(body_ty) || types.is_hierarchy(body_ty) {
            let slot = self.entry_alloca(self.map_type_to_llvm(body_ty), "return.union")?;
            self.fun_return_union.set(Some(slot));
        }

        self.builder.position_at_end(entry);
        let value = self.lower_expr(&self.program.body)?;
        self.emit_function_epilogue(value, body_ty)?;

        // Wire the chain now that every const initializer has been spliced.
        self.builder.position_at_end(alloca_block);
        self.builder
            .build_unconditional_branch(const_head)
            .map_err(|_| Diagnostic::simple_boxed(Severity::Bug, "failed to wire alloca block"))?;
        let const_tail = self.const_tail.get().expect("const chain tail");
        self.builder.position_at_end(const_tail);
        self.builder
            .build_unconditional_branch(entry)
            .map_err(|_| Diagnostic::simple_boxed(Severity::Bug, "failed to wire const chain"))?;

        self.emit_main_wrapper(main, returns_value)?;
        self.emit_symbol_table();

        if !self.handler_stack.borrow().is_empty() || !self.block_stack.borrow().is_empty() {
            return bug("handler or block stack not empty after emission");
        }
        Ok(())
    }

    /// Verifies the module and hands it to the caller. On verification
    /// failure the dumped IR is the diagnostic.
    pub fn finish(self) -> DiagnosticResult<Module<'ctx>> {
        if let Some(di) = self.di.borrow().as_ref() {
            di.finalize();
        }
        if let Err(err) = self.module.verify() {
            return Err(Diagnostic::with_note_boxed(
                Severity::Error,
                format!("module verification failed: {}", err.to_string()),
                self.module.print_to_string().to_string(),
            ));
        }
        Ok(self.module)
    }

    /// Emits the conventional `main` wrapper: calls `__crystal_main(0, null)`
    /// and converts the program value to an `i32` exit value.
    fn emit_main_wrapper(
        &self,
        main: FunctionValue<'ctx>,
        returns_value: bool,
    ) -> DiagnosticResult<()> {
        let wrapper_ty = self.i32_t.fn_type(&[], false);
        let wrapper = self.module.add_function("main", wrapper_ty, None);
        let entry = self.context.append_basic_block(wrapper, "entry");

        let saved = self.builder.get_insert_block();
        self.builder.position_at_end(entry);

        let argc = self.i32_t.const_int(0, false).into();
        let argv = self
            .i8ptr_t
            .ptr_type(AddressSpace::default())
            .const_null()
            .into();
        let call = self
            .builder
            .build_call(main, &[argc, argv], "program")
            .map_err(|_| Diagnostic::simple_boxed(Severity::Bug, "failed to call entry point"))?;

        let exit_code = if !returns_value {
            self.i32_t.const_int(0, false)
        } else {
            let value = call.try_as_basic_value().left().ok_or_else(|| {
                Diagnostic::simple_boxed(Severity::Bug, "entry point returned no value")
            })?;
            match value {
                BasicValueEnum::IntValue(iv) => {
                    let width = iv.get_type().get_bit_width();
                    if width == 32 {
                        iv
                    } else if width < 32 {
                        self.builder
                            .build_int_z_extend(iv, self.i32_t, "exit.ext")
                            .map_err(|_| {
                                Diagnostic::simple_boxed(Severity::Bug, "exit code widen failed")
                            })?
                    } else {
                        self.builder
                            .build_int_truncate(iv, self.i32_t, "exit.trunc")
                            .map_err(|_| {
                                Diagnostic::simple_boxed(Severity::Bug, "exit code narrow failed")
                            })?
                    }
                }
                BasicValueEnum::FloatValue(fv) => self
                    .builder
                    .build_float_to_signed_int(fv, self.i32_t, "exit.f2i")
                    .map_err(|_| Diagnostic::simple_boxed(Severity::Bug, "exit code f2i failed"))?,
                BasicValueEnum::PointerValue(pv) => {
                    let as_int = self
                        .builder
                        .build_ptr_to_int(pv, self.i64_t, "exit.p2i")
                        .map_err(|_| {
                            Diagnostic::simple_boxed(Severity::Bug, "exit code p2i failed")
                        })?;
                    self.builder
                        .build_int_truncate(as_int, self.i32_t, "exit.trunc")
                        .map_err(|_| {
                            Diagnostic::simple_boxed(Severity::Bug, "exit code narrow failed")
                        })?
                }
                _ => self.i32_t.const_int(0, false),
            }
        };
        self.builder
            .build_return(Some(&exit_code))
            .map_err(|_| Diagnostic::simple_boxed(Severity::Bug, "failed to return exit code"))?;

        if let Some(block) = saved {
            self.builder.position_at_end(block);
        }
        Ok(())
    }

    /// Emits the `symbol_table` global: an internal constant array of string
    /// pointers indexed by symbol id.
    fn emit_symbol_table(&self) {
        let mut pointers = Vec::with_capacity(self.symbol_strings.len());
        for symbol in &self.symbol_strings {
            pointers.push(self.intern_string_literal(symbol));
        }
        let table_ty = self.i8ptr_t.array_type(pointers.len() as u32);
        let global = self.module.add_global(table_ty, None, "symbol_table");
        global.set_initializer(&self.i8ptr_t.const_array(&pointers));
        global.set_linkage(Linkage::Internal);
        global.set_constant(true);
    }

    /// Interns a string literal as a private constant global laid out as
    /// `{ i32 length, [len+1 x i8] }` with a trailing NUL, returning the
    /// global cast to the string representation (`i8*`). Identical literals
    /// share one global.
    pub fn intern_string_literal(&self, s: &str) -> PointerValue<'ctx> {
        if let Some(ptr) = self.string_literals.borrow().get(s) {
            return *ptr;
        }

        let bytes = s.as_bytes();
        let length = self.i32_t.const_int(bytes.len() as u64, false);
        let data = self.context.const_string(bytes, true);
        let initializer = self
            .context
            .const_struct(&[length.into(), data.into()], false);

        let id = self.next_str_id.get();
        self.next_str_id.set(id.wrapping_add(1));
        let global = self
            .module
            .add_global(initializer.get_type(), None, &format!("str.{}", id));
        global.set_initializer(&initializer);
        global.set_linkage(Linkage::Private);
        global.set_constant(true);

        let ptr = global.as_pointer_value().const_cast(self.i8ptr_t);
        self.string_literals.borrow_mut().insert(s.to_string(), ptr);
        ptr
    }

    /// Runtime id of an interned symbol.
    pub fn symbol_id(&self, name: &str) -> DiagnosticResult<u32> {
        self.symbol_ids.get(name).copied().ok_or_else(|| {
            Diagnostic::simple_boxed(Severity::Bug, format!("unknown symbol :{}", name))
        })
    }

    pub(crate) fn di_subprogram(&self, fun: FunctionValue<'ctx>, name: &str) {
        if let Some(di) = self.di.borrow().as_ref() {
            di.attach_subprogram(fun, name);
        }
    }
}
