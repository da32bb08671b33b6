use anyhow::Result;

use super::common::{assign, boolean, call, exprs, gen_ir, if_node, num, run, var};
use berylc::ast::Node;
use berylc::program::{Def, Program};
use berylc::types::{Ty, TypeRegistry};

/// `x = cond ? nil : make(); x ? x.value : 0` where `make` builds a Box
/// holding 42. Returns the program plus the nilable type.
fn nilable_program(cond: bool) -> (Program, Ty) {
    let mut types = TypeRegistry::new();
    let i32_ty = types.int32();
    let nil = types.nil();
    let box_ty = types.add_class("Box", None, false);
    types.add_ivar(box_ty, "value", i32_ty);
    let nilable = types.nilable_of(box_ty);

    // def Box#fill; @value = 42; end
    let fill_body = assign(
        Node::InstanceVar {
            name: "value".to_string(),
            ty: i32_ty,
        },
        num(&types, 42),
        i32_ty,
    );
    // def Box#value; @value; end
    let value_body = Node::InstanceVar {
        name: "value".to_string(),
        ty: i32_ty,
    };
    // def make; o = allocate(Box); o.fill; o; end
    let make_body = exprs(
        vec![
            assign(var("o", box_ty), Node::Allocate { ty: box_ty }, box_ty),
            call("fill", Some(var("o", box_ty)), vec![], vec![0], i32_ty),
            var("o", box_ty),
        ],
        box_ty,
    );

    let x_init = if_node(
        boolean(&types, cond),
        Node::NilLit { ty: nil },
        call("make", None, vec![], vec![2], box_ty),
        nilable,
    );
    let body = exprs(
        vec![
            assign(var("x", nilable), x_init, nilable),
            if_node(
                var("x", nilable),
                call(
                    "value",
                    Some(Node::CastedVar {
                        name: "x".to_string(),
                        ty: box_ty,
                    }),
                    vec![],
                    vec![1],
                    i32_ty,
                ),
                num(&types, 0),
                i32_ty,
            ),
        ],
        i32_ty,
    );

    let mut program = Program::new(types, body);
    program.add_def(Def {
        name: "fill".to_string(),
        owner: Some(box_ty),
        params: vec![],
        return_type: i32_ty,
        body: fill_body,
        raises: false,
        is_extern: false,
    });
    program.add_def(Def {
        name: "value".to_string(),
        owner: Some(box_ty),
        params: vec![],
        return_type: i32_ty,
        body: value_body,
        raises: false,
        is_extern: false,
    });
    program.add_def(Def {
        name: "make".to_string(),
        owner: None,
        params: vec![],
        return_type: box_ty,
        body: make_body,
        raises: false,
        is_extern: false,
    });
    (program, nilable)
}

#[test]
fn nil_branch_reads_as_zero() -> Result<()> {
    let (program, _) = nilable_program(true);
    assert_eq!(run(&program)?, 0);
    Ok(())
}

#[test]
fn present_branch_reads_the_instance_var() -> Result<()> {
    let (program, _) = nilable_program(false);
    assert_eq!(run(&program)?, 42);
    Ok(())
}

#[test]
fn nil_is_the_null_carrier_pointer() -> Result<()> {
    // The nilable never materializes a tagged slot: nil widens through
    // int-to-ptr/null and the truthiness test is a pointer comparison.
    let (program, _) = nilable_program(true);
    let ir = gen_ir(&program)?;
    assert!(
        !ir.contains("union.Box"),
        "nilable must not lower to a tagged union: {}",
        ir
    );
    assert!(
        ir.contains("ptrtoint"),
        "expected null test via ptrtoint: {}",
        ir
    );
    Ok(())
}
