use anyhow::Result;

use super::common::{binary, boolean, gen_ir, num, run};
use berylc::ast::{BinaryOp, Node};
use berylc::program::Program;
use berylc::types::TypeRegistry;

#[test]
fn integer_addition_runs_to_completion() -> Result<()> {
    let types = TypeRegistry::new();
    let body = binary(
        BinaryOp::Add,
        num(&types, 1),
        num(&types, 2),
        types.int32(),
    );
    let program = Program::new(types, body);

    assert_eq!(run(&program)?, 3);
    Ok(())
}

#[test]
fn module_exposes_entry_point_and_wrapper() -> Result<()> {
    let types = TypeRegistry::new();
    let body = binary(
        BinaryOp::Mul,
        num(&types, 6),
        num(&types, 7),
        types.int32(),
    );
    let program = Program::new(types, body);

    let ir = gen_ir(&program)?;
    assert!(
        ir.contains("__crystal_main"),
        "expected entry point in IR: {}",
        ir
    );
    assert!(
        ir.contains("define i32 @main()"),
        "expected main wrapper in IR: {}",
        ir
    );
    Ok(())
}

#[test]
fn comparison_yields_bool_exit_code() -> Result<()> {
    let types = TypeRegistry::new();
    let bool_ty = types.bool_();
    let body = binary(BinaryOp::Lt, num(&types, 2), num(&types, 5), bool_ty);
    let program = Program::new(types, body);

    assert_eq!(run(&program)?, 1);
    Ok(())
}

#[test]
fn simple_or_evaluates_the_left_side_once() -> Result<()> {
    let types = TypeRegistry::new();
    let bool_ty = types.bool_();
    // false || true  =>  true
    let body = Node::SimpleOr {
        left: Box::new(boolean(&types, false)),
        right: Box::new(boolean(&types, true)),
        ty: bool_ty,
    };
    let program = Program::new(types, body);
    assert_eq!(run(&program)?, 1);

    let types = TypeRegistry::new();
    let bool_ty = types.bool_();
    // true || false  =>  the left value itself
    let body = Node::SimpleOr {
        left: Box::new(boolean(&types, true)),
        right: Box::new(boolean(&types, false)),
        ty: bool_ty,
    };
    let program = Program::new(types, body);
    assert_eq!(run(&program)?, 1);
    Ok(())
}
