use anyhow::Result;

use super::common::{assign, binary, boolean, exprs, num, run, var};
use berylc::ast::{BinaryOp, Node};
use berylc::program::Program;
use berylc::types::TypeRegistry;

#[test]
fn while_loop_counts_up() -> Result<()> {
    let types = TypeRegistry::new();
    let i32_ty = types.int32();
    let bool_ty = types.bool_();
    let nil = types.nil();

    // i = 0; while i < 3; i += 1; end; i
    let body = exprs(
        vec![
            assign(var("i", i32_ty), num(&types, 0), i32_ty),
            Node::While {
                cond: Box::new(binary(
                    BinaryOp::Lt,
                    var("i", i32_ty),
                    num(&types, 3),
                    bool_ty,
                )),
                body: Box::new(assign(
                    var("i", i32_ty),
                    binary(BinaryOp::Add, var("i", i32_ty), num(&types, 1), i32_ty),
                    i32_ty,
                )),
                run_once: false,
                ty: nil,
            },
            var("i", i32_ty),
        ],
        i32_ty,
    );
    let program = Program::new(types, body);
    assert_eq!(run(&program)?, 3);
    Ok(())
}

#[test]
fn break_targets_the_loop_exit() -> Result<()> {
    let types = TypeRegistry::new();
    let i32_ty = types.int32();
    let bool_ty = types.bool_();
    let nil = types.nil();

    // i = 0; while true; i += 1; break if i == 2; end; i
    let loop_body = exprs(
        vec![
            assign(
                var("i", i32_ty),
                binary(BinaryOp::Add, var("i", i32_ty), num(&types, 1), i32_ty),
                i32_ty,
            ),
            Node::If {
                cond: Box::new(binary(
                    BinaryOp::Eq,
                    var("i", i32_ty),
                    num(&types, 2),
                    bool_ty,
                )),
                then: Box::new(Node::Break { value: None }),
                els: Box::new(Node::Nop),
                ty: nil,
            },
        ],
        nil,
    );
    let body = exprs(
        vec![
            assign(var("i", i32_ty), num(&types, 0), i32_ty),
            Node::While {
                cond: Box::new(boolean(&types, true)),
                body: Box::new(loop_body),
                run_once: false,
                ty: nil,
            },
            var("i", i32_ty),
        ],
        i32_ty,
    );
    let program = Program::new(types, body);
    assert_eq!(run(&program)?, 2);
    Ok(())
}

#[test]
fn run_once_loop_enters_the_body_first() -> Result<()> {
    let types = TypeRegistry::new();
    let i32_ty = types.int32();
    let nil = types.nil();

    // i = 10; begin; i += 1; end while false; i  =>  11
    let body = exprs(
        vec![
            assign(var("i", i32_ty), num(&types, 10), i32_ty),
            Node::While {
                cond: Box::new(boolean(&types, false)),
                body: Box::new(assign(
                    var("i", i32_ty),
                    binary(BinaryOp::Add, var("i", i32_ty), num(&types, 1), i32_ty),
                    i32_ty,
                )),
                run_once: true,
                ty: nil,
            },
            var("i", i32_ty),
        ],
        i32_ty,
    );
    let program = Program::new(types, body);
    assert_eq!(run(&program)?, 11);
    Ok(())
}
