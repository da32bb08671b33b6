use anyhow::Result;

use super::common::{binary, call, gen_ir, num, run, var};
use berylc::ast::BinaryOp;
use berylc::program::{Def, Param, Program};
use berylc::types::TypeRegistry;

/// `def twice(x); x + x; end` called from two sites.
fn twice_program() -> Program {
    let types = TypeRegistry::new();
    let i32_ty = types.int32();

    let body = binary(
        BinaryOp::Add,
        call("twice", None, vec![num(&types, 3)], vec![0], i32_ty),
        call("twice", None, vec![num(&types, 4)], vec![0], i32_ty),
        i32_ty,
    );
    let mut program = Program::new(types, body);
    program.add_def(Def {
        name: "twice".to_string(),
        owner: None,
        params: vec![Param::new("x", i32_ty)],
        return_type: i32_ty,
        body: binary(
            BinaryOp::Add,
            var("x", i32_ty),
            var("x", i32_ty),
            i32_ty,
        ),
        raises: false,
        is_extern: false,
    });
    program
}

#[test]
fn both_call_sites_share_one_function() -> Result<()> {
    let ir = gen_ir(&twice_program())?;
    assert_eq!(
        ir.matches("define internal i32 @\"twice@0\"").count(),
        1,
        "two calls with the same mangled name must share one definition: {}",
        ir
    );
    Ok(())
}

#[test]
fn monomorphized_call_computes() -> Result<()> {
    assert_eq!(run(&twice_program())?, 14);
    Ok(())
}

#[test]
fn user_defs_get_internal_linkage() -> Result<()> {
    let ir = gen_ir(&twice_program())?;
    assert!(
        ir.contains("define internal i32 @\"twice@0\"(i32 %0)"),
        "user defs are internal: {}",
        ir
    );
    Ok(())
}
