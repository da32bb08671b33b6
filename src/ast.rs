//! The typed AST consumed by the code generator.
//!
//! Every node arrives fully typed from inference: value-producing variants
//! carry their resolved [`Ty`] and calls carry their resolved target defs.
//! The node set is closed; the emitter dispatches by exhaustive match, not
//! by open inheritance.

use crate::types::{NumberKind, Ty};

/// Identifies a def within [`crate::program::Program::defs`].
pub type DefId = usize;

/// Identifies a constant within [`crate::program::Program::constants`].
pub type ConstId = usize;

/// Binary primitives on numbers, bools, chars and symbols.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BinaryOp {
    Add,
    Sub,
    Mul,
    Div,
    Rem,
    Shl,
    Shr,
    BitAnd,
    BitOr,
    BitXor,
    Eq,
    Ne,
    Lt,
    Le,
    Gt,
    Ge,
}

impl BinaryOp {
    pub fn is_comparison(self) -> bool {
        matches!(
            self,
            BinaryOp::Eq | BinaryOp::Ne | BinaryOp::Lt | BinaryOp::Le | BinaryOp::Gt | BinaryOp::Ge
        )
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UnaryOp {
    Neg,
    Not,
    BitNot,
}

/// Raw-pointer primitives (`Pointer(T)` intrinsics).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PointerOp {
    /// `Pointer(T).malloc(count)`
    Malloc,
    /// `ptr.realloc(count)`
    Realloc,
    /// `ptr.value`
    Get,
    /// `ptr.value = v`
    Set,
    /// `ptr + offset`
    Add,
    /// `ptr.address`
    Address,
}

/// A caller-supplied block attached to a call, inlined at each `yield`.
#[derive(Debug, Clone)]
pub struct BlockNode {
    pub params: Vec<BlockParam>,
    pub body: Box<Node>,
    /// Type of the value the block body produces at fall-through.
    pub ty: Ty,
}

#[derive(Debug, Clone)]
pub struct BlockParam {
    pub name: String,
    pub ty: Ty,
}

/// One `rescue` clause of an exception handler. `types: None` is the
/// untyped catch-all clause.
#[derive(Debug, Clone)]
pub struct Rescue {
    pub name: Option<String>,
    pub types: Option<Vec<Ty>>,
    pub body: Node,
}

#[derive(Debug, Clone)]
pub struct Call {
    /// Receiver; absent for free-function calls.
    pub obj: Option<Box<Node>>,
    pub name: String,
    pub args: Vec<Node>,
    pub block: Option<BlockNode>,
    /// Resolved candidates. One entry is a monomorphic call; several entries
    /// require a runtime type-id dispatch cascade.
    pub target_defs: Vec<DefId>,
    /// Present when the checker expanded a macro at this call site; the
    /// expansion is emitted instead of the call.
    pub expanded: Option<Box<Node>>,
    pub ty: Ty,
}

#[derive(Debug, Clone)]
pub enum Node {
    Nop,
    NilLit {
        ty: Ty,
    },
    BoolLit {
        value: bool,
        ty: Ty,
    },
    NumberLit {
        value: String,
        kind: NumberKind,
        ty: Ty,
    },
    CharLit {
        value: char,
        ty: Ty,
    },
    StringLit {
        value: String,
        ty: Ty,
    },
    SymbolLit {
        value: String,
        ty: Ty,
    },
    /// Local variable read. `ty` is the type the surrounding expression
    /// requests, which may be narrower than the binding's declared type.
    Var {
        name: String,
        ty: Ty,
    },
    /// Read adapter inserted by the checker to view a union/hierarchy/nilable
    /// binding at a narrower (or boxed) static type.
    CastedVar {
        name: String,
        ty: Ty,
    },
    InstanceVar {
        name: String,
        ty: Ty,
    },
    ClassVar {
        owner: Ty,
        name: String,
        ty: Ty,
    },
    Global {
        name: String,
        ty: Ty,
    },
    ConstRef {
        id: ConstId,
        ty: Ty,
    },
    Assign {
        target: Box<Node>,
        value: Box<Node>,
        ty: Ty,
    },
    If {
        cond: Box<Node>,
        then: Box<Node>,
        els: Box<Node>,
        ty: Ty,
    },
    While {
        cond: Box<Node>,
        body: Box<Node>,
        /// do/while form: enter the body before the first condition check.
        run_once: bool,
        ty: Ty,
    },
    /// `a || b` with `a` evaluated once.
    SimpleOr {
        left: Box<Node>,
        right: Box<Node>,
        ty: Ty,
    },
    Return {
        value: Option<Box<Node>>,
    },
    Break {
        value: Option<Box<Node>>,
    },
    Yield {
        args: Vec<Node>,
        ty: Ty,
    },
    Call(Call),
    /// Def declaration site. Bodies are materialized lazily at calls; the
    /// declaration itself emits nothing.
    DefDecl {
        def: DefId,
    },
    /// Class/struct/union declaration site. Types live in the registry; the
    /// declaration itself emits nothing.
    TypeDecl {
        ty: Ty,
    },
    Expressions {
        nodes: Vec<Node>,
        ty: Ty,
    },
    IsA {
        obj: Box<Node>,
        target: Ty,
        ty: Ty,
    },
    BinaryPrimitive {
        op: BinaryOp,
        left: Box<Node>,
        right: Box<Node>,
        ty: Ty,
    },
    UnaryPrimitive {
        op: UnaryOp,
        operand: Box<Node>,
        ty: Ty,
    },
    PointerPrimitive {
        op: PointerOp,
        args: Vec<Node>,
        ty: Ty,
    },
    /// Heap-allocate a zeroed instance of a class (the `allocate` primitive
    /// behind `new`).
    Allocate {
        ty: Ty,
    },
    /// Out-argument marker: pass the slot pointer of the wrapped variable.
    Out {
        arg: Box<Node>,
    },
    ExceptionHandler {
        body: Box<Node>,
        rescues: Vec<Rescue>,
        ensure: Option<Box<Node>>,
        ty: Ty,
    },
}

impl Node {
    /// Resolved type of the node, when it produces a value.
    pub fn ty(&self) -> Option<Ty> {
        match self {
            Node::Nop | Node::Return { .. } | Node::Break { .. } | Node::DefDecl { .. } => None,
            Node::Out { arg } => arg.ty(),
            Node::NilLit { ty }
            | Node::BoolLit { ty, .. }
            | Node::NumberLit { ty, .. }
            | Node::CharLit { ty, .. }
            | Node::StringLit { ty, .. }
            | Node::SymbolLit { ty, .. }
            | Node::Var { ty, .. }
            | Node::CastedVar { ty, .. }
            | Node::InstanceVar { ty, .. }
            | Node::ClassVar { ty, .. }
            | Node::Global { ty, .. }
            | Node::ConstRef { ty, .. }
            | Node::Assign { ty, .. }
            | Node::If { ty, .. }
            | Node::While { ty, .. }
            | Node::SimpleOr { ty, .. }
            | Node::Yield { ty, .. }
            | Node::TypeDecl { ty }
            | Node::Expressions { ty, .. }
            | Node::IsA { ty, .. }
            | Node::BinaryPrimitive { ty, .. }
            | Node::UnaryPrimitive { ty, .. }
            | Node::PointerPrimitive { ty, .. }
            | Node::Allocate { ty }
            | Node::ExceptionHandler { ty, .. } => Some(*ty),
            Node::Call(call) => Some(call.ty),
        }
    }

    /// Whether emission after this node is unreachable because the node
    /// unconditionally transfers control.
    pub fn always_transfers_control(&self) -> bool {
        matches!(self, Node::Return { .. } | Node::Break { .. })
    }

    /// Walks this node and every child, invoking `f` on each.
    pub fn walk(&self, f: &mut impl FnMut(&Node)) {
        f(self);
        match self {
            Node::Assign { target, value, .. } => {
                target.walk(f);
                value.walk(f);
            }
            Node::If { cond, then, els, .. } => {
                cond.walk(f);
                then.walk(f);
                els.walk(f);
            }
            Node::While { cond, body, .. } => {
                cond.walk(f);
                body.walk(f);
            }
            Node::SimpleOr { left, right, .. } => {
                left.walk(f);
                right.walk(f);
            }
            Node::Return { value } | Node::Break { value } => {
                if let Some(v) = value {
                    v.walk(f);
                }
            }
            Node::Yield { args, .. } => {
                for a in args {
                    a.walk(f);
                }
            }
            Node::Call(call) => {
                if let Some(obj) = &call.obj {
                    obj.walk(f);
                }
                for a in &call.args {
                    a.walk(f);
                }
                if let Some(block) = &call.block {
                    block.body.walk(f);
                }
                if let Some(expanded) = &call.expanded {
                    expanded.walk(f);
                }
            }
            Node::Expressions { nodes, .. } => {
                for n in nodes {
                    n.walk(f);
                }
            }
            Node::IsA { obj, .. } => obj.walk(f),
            Node::BinaryPrimitive { left, right, .. } => {
                left.walk(f);
                right.walk(f);
            }
            Node::UnaryPrimitive { operand, .. } => operand.walk(f),
            Node::PointerPrimitive { args, .. } => {
                for a in args {
                    a.walk(f);
                }
            }
            Node::Out { arg } => arg.walk(f),
            Node::ExceptionHandler {
                body,
                rescues,
                ensure,
                ..
            } => {
                body.walk(f);
                for r in rescues {
                    r.body.walk(f);
                }
                if let Some(e) = ensure {
                    e.walk(f);
                }
            }
            _ => {}
        }
    }
}
