//! Expression lowering.
//!
//! `lower_expr` is the single entry point: it dispatches on the node variant
//! and returns the expression's ABI value, or `None` when the expression
//! diverged (the current block is then terminated) or has no value.
//!
//! Conventions shared by every emitter:
//! - tagged-union and hierarchy values are pointers to their slot;
//! - by-value structs are pointers to their storage;
//! - everything else is an immediate value;
//! - an emitter must not touch the builder once the current block has a
//!   terminator; sequence lowering stops at the first diverging child.

pub mod assignments;
pub mod control_flow;
pub mod literals;
pub mod primitives;
pub mod vars;

use inkwell::values::BasicValueEnum;

use crate::ast::Node;
use crate::diagnostics::DiagnosticResult;

use super::CodeGen;

impl<'ctx, 'p> CodeGen<'ctx, 'p> {
    /// Lowers `node`, returning its value. `None` means the node produced no
    /// value: it diverged, or it is a statement-shaped node whose value is
    /// never read.
    pub fn lower_expr(&self, node: &'p Node) -> DiagnosticResult<Option<BasicValueEnum<'ctx>>> {
        match node {
            Node::Nop => Ok(Some(self.nil_value())),
            Node::NilLit { .. } => Ok(Some(self.nil_value())),
            Node::BoolLit { value, .. } => Ok(Some(self.lower_bool_literal(*value))),
            Node::NumberLit { value, kind, .. } => {
                self.lower_number_literal(value, *kind).map(Some)
            }
            Node::CharLit { value, .. } => Ok(Some(self.lower_char_literal(*value))),
            Node::StringLit { value, .. } => Ok(Some(self.intern_string_literal(value).into())),
            Node::SymbolLit { value, .. } => self.lower_symbol_literal(value).map(Some),

            Node::Var { name, ty } | Node::CastedVar { name, ty } => {
                self.lower_var_read(name, *ty).map(Some)
            }
            Node::InstanceVar { name, ty } => self.lower_instance_var_read(name, *ty).map(Some),
            Node::ClassVar { owner, name, ty } => {
                self.lower_class_var_read(*owner, name, *ty).map(Some)
            }
            Node::Global { name, ty } => self.lower_global_read(name, *ty).map(Some),
            Node::ConstRef { id, ty } => self.lower_const_read(*id, *ty).map(Some),

            Node::Assign { target, value, .. } => self.lower_assign(target, value),

            Node::If {
                cond,
                then,
                els,
                ty,
            } => self.lower_if(cond, then, els, *ty),
            Node::While {
                cond,
                body,
                run_once,
                ty,
            } => self.lower_while(cond, body, *run_once, *ty),
            Node::SimpleOr { left, right, ty } => self.lower_simple_or(left, right, *ty),
            Node::Return { value } => self.lower_return(value.as_deref()),
            Node::Break { value } => self.lower_break(value.as_deref()),
            Node::Yield { args, ty } => self.lower_yield(args, *ty),

            Node::Call(call) => self.lower_call(call),

            Node::DefDecl { .. } | Node::TypeDecl { .. } => Ok(Some(self.nil_value())),

            Node::Expressions { nodes, .. } => self.lower_expressions(nodes),

            Node::IsA { obj, target, .. } => self.lower_is_a(obj, *target).map(Some),
            Node::BinaryPrimitive {
                op, left, right, ..
            } => self.lower_binary_primitive(*op, left, right),
            Node::UnaryPrimitive { op, operand, ty } => {
                self.lower_unary_primitive(*op, operand, *ty)
            }
            Node::PointerPrimitive { op, args, ty } => {
                self.lower_pointer_primitive(*op, args, *ty)
            }
            Node::Allocate { ty } => self.lower_allocate(*ty).map(Some),
            // An out marker outside argument position reads like its inner
            // expression; call lowering intercepts the wrapped form.
            Node::Out { arg } => self.lower_expr(arg),

            Node::ExceptionHandler {
                body,
                rescues,
                ensure,
                ty,
            } => self.lower_handler(body, rescues, ensure.as_deref(), *ty),
        }
    }

    /// Lowers a sequence, stopping early once a child diverges. The value is
    /// the last child's value, nil for an empty sequence.
    fn lower_expressions(
        &self,
        nodes: &'p [Node],
    ) -> DiagnosticResult<Option<BasicValueEnum<'ctx>>> {
        let mut last = Some(self.nil_value());
        for node in nodes {
            last = self.lower_expr(node)?;
            if self.current_block_terminated() {
                return Ok(None);
            }
            if let Some(ty) = node.ty() {
                if self.program.types.is_no_return(ty) {
                    return Ok(None);
                }
            }
        }
        Ok(last)
    }
}
