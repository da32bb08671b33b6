use anyhow::Result;

use super::common::{assign, boolean, exprs, gen_ir, if_node, num, run, string, var};
use berylc::ast::Node;
use berylc::program::Program;
use berylc::types::TypeRegistry;

/// `x = cond ? 1 : "a"` with `x : Int32 | String`.
fn union_program(cond: bool, tail: impl FnOnce(&TypeRegistry, berylc::types::Ty) -> Node) -> Program {
    let mut types = TypeRegistry::new();
    let i32_ty = types.int32();
    let string_ty = types.string();
    let union_ty = types.union_of(&[i32_ty, string_ty]);

    let branch = if_node(
        boolean(&types, cond),
        num(&types, 1),
        string(&types, "a"),
        union_ty,
    );
    let tail_node = tail(&types, union_ty);
    let body_ty = tail_node.ty().unwrap_or_else(|| types.nil());
    let body = exprs(
        vec![assign(var("x", union_ty), branch, union_ty), tail_node],
        body_ty,
    );
    Program::new(types, body)
}

#[test]
fn union_tag_tracks_the_taken_branch() -> Result<()> {
    // x.is_a?(String) is false for the then branch, true for the else branch.
    for (cond, expected) in [(true, 0), (false, 1)] {
        let program = union_program(cond, |types, union_ty| Node::IsA {
            obj: Box::new(var("x", union_ty)),
            target: types.string(),
            ty: types.bool_(),
        });
        assert_eq!(run(&program)?, expected, "cond = {}", cond);
    }
    Ok(())
}

#[test]
fn union_payload_round_trips_through_the_slot() -> Result<()> {
    // Reading the Int32 arm back out reproduces the stored value.
    let program = union_program(true, |types, union_ty| {
        let _ = union_ty;
        Node::CastedVar {
            name: "x".to_string(),
            ty: types.int32(),
        }
    });
    assert_eq!(run(&program)?, 1);
    Ok(())
}

#[test]
fn union_slot_layout_is_tag_plus_payload() -> Result<()> {
    let program = union_program(true, |types, union_ty| {
        let _ = union_ty;
        num(types, 0)
    });
    let ir = gen_ir(&program)?;
    assert!(
        ir.contains("%\"union.Int32|String\" = type { i32, [8 x i8] }"),
        "expected tagged union struct in IR: {}",
        ir
    );
    Ok(())
}
