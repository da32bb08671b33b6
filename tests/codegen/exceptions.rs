use anyhow::Result;

use super::common::{call, exprs, gen_ir, num};
use berylc::ast::{Node, PointerOp, Rescue};
use berylc::program::{Def, Param, Program};
use berylc::types::TypeRegistry;

/// `begin; raise; 10; rescue Error; 20; end` — the raise is the unwinder
/// entry point declared as an extern that never returns. Returns the
/// program and the rescue clause's type.
fn handler_program(rescue_matches: bool) -> (Program, berylc::types::Ty) {
    let mut types = TypeRegistry::new();
    let i32_ty = types.int32();
    let no_return = types.no_return();
    let u8_ty = types.number(berylc::types::NumberKind::U8);
    let exc_ptr = types.pointer_of(u8_ty);
    let error_ty = types.add_class("Error", None, false);
    let other_ty = types.add_class("Other", None, false);

    let raise_arg = Node::PointerPrimitive {
        op: PointerOp::Malloc,
        args: vec![num(&types, 1)],
        ty: exc_ptr,
    };
    let protected = exprs(
        vec![
            call("_Unwind_RaiseException", None, vec![raise_arg], vec![0], no_return),
            num(&types, 10),
        ],
        i32_ty,
    );
    let rescue_ty = if rescue_matches { error_ty } else { other_ty };
    let body = Node::ExceptionHandler {
        body: Box::new(protected),
        rescues: vec![Rescue {
            name: Some("ex".to_string()),
            types: Some(vec![rescue_ty]),
            body: num(&types, 20),
        }],
        ensure: None,
        ty: i32_ty,
    };

    let mut program = Program::new(types, body);
    program.add_def(Def {
        name: "_Unwind_RaiseException".to_string(),
        owner: None,
        params: vec![Param::new("exception_object", exc_ptr)],
        return_type: no_return,
        body: Node::Nop,
        raises: true,
        is_extern: true,
    });
    (program, rescue_ty)
}

#[test]
fn protected_calls_become_invokes() -> Result<()> {
    let (program, _) = handler_program(true);
    let ir = gen_ir(&program)?;
    assert!(
        ir.contains("invoke"),
        "raising call under a handler must use invoke: {}",
        ir
    );
    assert!(
        ir.contains("landingpad { i8*, i32 }"),
        "expected Itanium landing pad: {}",
        ir
    );
    assert!(
        ir.contains("__crystal_personality"),
        "expected personality routine: {}",
        ir
    );
    Ok(())
}

#[test]
fn unmatched_exceptions_are_reraised() -> Result<()> {
    let (program, _) = handler_program(false);
    let ir = gen_ir(&program)?;
    // One declaration, one invoke in the protected body, one re-raise call.
    assert_eq!(
        ir.matches("_Unwind_RaiseException").count(),
        3,
        "IR: {}",
        ir
    );
    Ok(())
}

#[test]
fn rescue_matches_the_type_id_flat() -> Result<()> {
    let (program, rescue_ty) = handler_program(true);
    let error_id = program.types.type_id(rescue_ty);
    let ir = gen_ir(&program)?;
    assert!(
        ir.contains(&format!("icmp eq i32 %ex.type_id, {}", error_id)),
        "expected type-id comparison against {} in rescue: {}",
        error_id,
        ir
    );
    Ok(())
}
