use anyhow::Result;

use super::common::{binary, call, gen_ir, num, run};
use berylc::ast::{BinaryOp, Node};
use berylc::program::{ConstDef, Def, Program};
use berylc::types::TypeRegistry;

/// `MAX = compute(); MAX + 1` where `compute` is an ordinary def, so the
/// initializer cannot fold and must run in the const chain.
fn const_program() -> Program {
    let types = TypeRegistry::new();
    let i32_ty = types.int32();

    let body = binary(
        BinaryOp::Add,
        Node::ConstRef { id: 0, ty: i32_ty },
        num(&types, 1),
        i32_ty,
    );
    let mut program = Program::new(types, body);
    program.add_def(Def {
        name: "compute".to_string(),
        owner: None,
        params: vec![],
        return_type: i32_ty,
        body: num(&program.types, 7),
        raises: false,
        is_extern: false,
    });
    program.add_constant(ConstDef {
        name: "MAX".to_string(),
        value: call("compute", None, vec![], vec![0], i32_ty),
        ty: i32_ty,
    });
    program
}

#[test]
fn deferred_initializer_runs_before_main_body() -> Result<()> {
    assert_eq!(run(&const_program())?, 8);
    Ok(())
}

#[test]
fn initializer_is_spliced_into_the_const_chain() -> Result<()> {
    let ir = gen_ir(&const_program())?;
    assert!(
        ir.contains("const.init.MAX:"),
        "expected a spliced const block: {}",
        ir
    );
    assert!(
        ir.contains("@const.MAX"),
        "expected the lazy global: {}",
        ir
    );
    // The alloca block reaches the entry block only through the chain.
    assert!(
        ir.contains("br label %const.init.MAX"),
        "const head must branch into the spliced block: {}",
        ir
    );
    assert!(
        ir.contains("br label %entry"),
        "the chain tail must branch into the entry block: {}",
        ir
    );
    Ok(())
}

#[test]
fn literal_constants_fold_into_the_initializer() -> Result<()> {
    let types = TypeRegistry::new();
    let i32_ty = types.int32();
    let body = binary(
        BinaryOp::Add,
        Node::ConstRef { id: 0, ty: i32_ty },
        num(&types, 1),
        i32_ty,
    );
    let mut program = Program::new(types, body);
    program.add_constant(ConstDef {
        name: "SEVEN".to_string(),
        value: num(&program.types, 7),
        ty: i32_ty,
    });

    assert_eq!(run(&program)?, 8);
    let ir = gen_ir(&program)?;
    assert!(
        ir.contains("@const.SEVEN = internal constant i32 7"),
        "literal constant must fold: {}",
        ir
    );
    Ok(())
}
