use anyhow::Result;

use super::common::{assign, boolean, exprs, gen_ir, if_node, num, run, string, var};
use berylc::ast::{Call, Node};
use berylc::program::{Def, Program};
use berylc::types::TypeRegistry;

/// `x = cond ? 1 : "a"; x.describe` where `describe` is defined separately
/// for Int32 and String receivers.
fn dispatch_program(cond: bool) -> Program {
    let mut types = TypeRegistry::new();
    let i32_ty = types.int32();
    let string_ty = types.string();
    let union_ty = types.union_of(&[i32_ty, string_ty]);

    let x_init = if_node(
        boolean(&types, cond),
        num(&types, 1),
        string(&types, "a"),
        union_ty,
    );
    let body = exprs(
        vec![
            assign(var("x", union_ty), x_init, union_ty),
            Node::Call(Call {
                obj: Some(Box::new(var("x", union_ty))),
                name: "describe".to_string(),
                args: vec![],
                block: None,
                target_defs: vec![0, 1],
                expanded: None,
                ty: i32_ty,
            }),
        ],
        i32_ty,
    );

    let mut program = Program::new(types, body);
    program.add_def(Def {
        name: "describe".to_string(),
        owner: Some(i32_ty),
        params: vec![],
        return_type: i32_ty,
        body: num(&program.types, 10),
        raises: false,
        is_extern: false,
    });
    program.add_def(Def {
        name: "describe".to_string(),
        owner: Some(string_ty),
        params: vec![],
        return_type: i32_ty,
        body: num(&program.types, 20),
        raises: false,
        is_extern: false,
    });
    program
}

#[test]
fn receiver_tag_selects_the_candidate() -> Result<()> {
    assert_eq!(run(&dispatch_program(true))?, 10);
    assert_eq!(run(&dispatch_program(false))?, 20);
    Ok(())
}

#[test]
fn cascade_compares_type_ids_and_ends_unreachable() -> Result<()> {
    let ir = gen_ir(&dispatch_program(true))?;
    assert!(
        ir.contains("current_def") && ir.contains("next_def"),
        "expected dispatch cascade blocks: {}",
        ir
    );
    assert!(
        ir.contains("unreachable"),
        "expected dead fall-through after the last candidate: {}",
        ir
    );
    Ok(())
}

#[test]
fn both_candidates_are_materialized_once() -> Result<()> {
    let ir = gen_ir(&dispatch_program(true))?;
    assert_eq!(
        ir.matches("define internal i32 @\"Int32#describe@0\"").count(),
        1,
        "IR: {}",
        ir
    );
    assert_eq!(
        ir.matches("define internal i32 @\"String#describe@1\"").count(),
        1,
        "IR: {}",
        ir
    );
    Ok(())
}
