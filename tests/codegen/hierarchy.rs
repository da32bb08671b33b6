use anyhow::Result;

use super::common::{assign, call, exprs, gen_ir, num, run, var};
use berylc::ast::{Call, Node};
use berylc::program::{Def, Program};
use berylc::types::TypeRegistry;

/// Builds `s : Shape+ = make(); s.area` where Shape+ is the hierarchy over
/// Shape with subclasses Circle and Square, and `make` returns the chosen
/// concrete class.
fn hierarchy_program(make_circle: bool) -> Program {
    let mut types = TypeRegistry::new();
    let i32_ty = types.int32();
    let shape = types.add_class("Shape", None, false);
    let circle = types.add_class("Circle", Some(shape), false);
    let square = types.add_class("Square", Some(shape), false);
    let hier = types.hierarchy_of(shape);

    let made = if make_circle { circle } else { square };
    let make_body = Node::Allocate { ty: made };

    let body = exprs(
        vec![
            assign(var("s", hier), call("make", None, vec![], vec![2], made), hier),
            Node::Call(Call {
                obj: Some(Box::new(var("s", hier))),
                name: "area".to_string(),
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
        name: "area".to_string(),
        owner: Some(circle),
        params: vec![],
        return_type: i32_ty,
        body: num(&program.types, 3),
        raises: false,
        is_extern: false,
    });
    program.add_def(Def {
        name: "area".to_string(),
        owner: Some(square),
        params: vec![],
        return_type: i32_ty,
        body: num(&program.types, 4),
        raises: false,
        is_extern: false,
    });
    program.add_def(Def {
        name: "make".to_string(),
        owner: None,
        params: vec![],
        return_type: made,
        body: make_body,
        raises: false,
        is_extern: false,
    });
    program
}

#[test]
fn boxing_records_the_concrete_type_id() -> Result<()> {
    // Assigning a concrete reference into a hierarchy slot writes the
    // subtype's id next to the reference; dispatch reads it back.
    assert_eq!(run(&hierarchy_program(true))?, 3);
    assert_eq!(run(&hierarchy_program(false))?, 4);
    Ok(())
}

#[test]
fn hierarchy_value_is_tag_plus_reference() -> Result<()> {
    let ir = gen_ir(&hierarchy_program(true))?;
    assert!(
        ir.contains("%hier.Shape = type { i32, i8* }"),
        "expected hierarchy layout in IR: {}",
        ir
    );
    Ok(())
}
