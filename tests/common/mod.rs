use anyhow::Result;

use berylc::ast::{BinaryOp, Node};
use berylc::program::Program;
use berylc::types::{NumberKind, Ty, TypeRegistry};
use berylc::CodegenOptions;

use inkwell::context::Context;

/// Generates the verified module's textual IR for a program.
#[allow(dead_code)]
pub fn gen_ir(program: &Program) -> Result<String> {
    let context = Context::create();
    let module = berylc::compile_program(&context, program, &CodegenOptions::default())?;
    Ok(module.print_to_string().to_string())
}

/// Compiles and JIT-executes a program, returning its exit value.
#[allow(dead_code)]
pub fn run(program: &Program) -> Result<i32> {
    berylc::jit::run_program(program, &CodegenOptions::default())
}

// --- Node shorthands used across the codegen tests ---

#[allow(dead_code)]
pub fn num(types: &TypeRegistry, value: i64) -> Node {
    Node::NumberLit {
        value: value.to_string(),
        kind: NumberKind::I32,
        ty: types.int32(),
    }
}

#[allow(dead_code)]
pub fn boolean(types: &TypeRegistry, value: bool) -> Node {
    Node::BoolLit {
        value,
        ty: types.bool_(),
    }
}

#[allow(dead_code)]
pub fn string(types: &TypeRegistry, value: &str) -> Node {
    Node::StringLit {
        value: value.to_string(),
        ty: types.string(),
    }
}

#[allow(dead_code)]
pub fn var(name: &str, ty: Ty) -> Node {
    Node::Var {
        name: name.to_string(),
        ty,
    }
}

#[allow(dead_code)]
pub fn assign(target: Node, value: Node, ty: Ty) -> Node {
    Node::Assign {
        target: Box::new(target),
        value: Box::new(value),
        ty,
    }
}

#[allow(dead_code)]
pub fn exprs(nodes: Vec<Node>, ty: Ty) -> Node {
    Node::Expressions { nodes, ty }
}

#[allow(dead_code)]
pub fn binary(op: BinaryOp, left: Node, right: Node, ty: Ty) -> Node {
    Node::BinaryPrimitive {
        op,
        left: Box::new(left),
        right: Box::new(right),
        ty,
    }
}

#[allow(dead_code)]
pub fn if_node(cond: Node, then: Node, els: Node, ty: Ty) -> Node {
    Node::If {
        cond: Box::new(cond),
        then: Box::new(then),
        els: Box::new(els),
        ty,
    }
}

#[allow(dead_code)]
pub fn call(name: &str, obj: Option<Node>, args: Vec<Node>, targets: Vec<usize>, ty: Ty) -> Node {
    Node::Call(berylc::ast::Call {
        obj: obj.map(Box::new),
        name: name.to_string(),
        args,
        block: None,
        target_defs: targets,
        expanded: None,
        ty,
    })
}
