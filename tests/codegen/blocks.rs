use anyhow::Result;

use super::common::{assign, binary, exprs, num, run, var};
use berylc::ast::{BinaryOp, BlockNode, BlockParam, Call, Node};
use berylc::program::{Def, Program};
use berylc::types::TypeRegistry;

/// `def each; yield 1; yield 2; yield 3; end` with a nil-typed body.
fn each_def(types: &TypeRegistry) -> Def {
    let nil = types.nil();
    let yields: Vec<Node> = [1, 2, 3]
        .iter()
        .map(|&n| Node::Yield {
            args: vec![num(types, n)],
            ty: nil,
        })
        .collect();
    Def {
        name: "each".to_string(),
        owner: None,
        params: vec![],
        return_type: nil,
        body: exprs(yields, nil),
        raises: false,
        is_extern: false,
    }
}

#[test]
fn break_exits_the_yielding_call() -> Result<()> {
    let types = TypeRegistry::new();
    let nil = types.nil();
    let i32_ty = types.int32();
    let bool_ty = types.bool_();

    // sum = 0; each { |i| break if i == 2; sum += i }; sum  =>  1
    let block_body = exprs(
        vec![
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
            assign(
                var("sum", i32_ty),
                binary(BinaryOp::Add, var("sum", i32_ty), var("i", i32_ty), i32_ty),
                i32_ty,
            ),
        ],
        i32_ty,
    );
    let body = exprs(
        vec![
            assign(var("sum", i32_ty), num(&types, 0), i32_ty),
            Node::Call(Call {
                obj: None,
                name: "each".to_string(),
                args: vec![],
                block: Some(BlockNode {
                    params: vec![BlockParam {
                        name: "i".to_string(),
                        ty: i32_ty,
                    }],
                    body: Box::new(block_body),
                    ty: nil,
                }),
                target_defs: vec![0],
                expanded: None,
                ty: nil,
            }),
            var("sum", i32_ty),
        ],
        i32_ty,
    );

    let mut program = Program::new(types, body);
    let each = each_def(&program.types);
    program.add_def(each);

    assert_eq!(run(&program)?, 1);
    Ok(())
}

#[test]
fn fall_through_sums_every_yield() -> Result<()> {
    let types = TypeRegistry::new();
    let nil = types.nil();
    let i32_ty = types.int32();

    // sum = 0; each { |i| sum += i }; sum  =>  6
    let block_body = assign(
        var("sum", i32_ty),
        binary(BinaryOp::Add, var("sum", i32_ty), var("i", i32_ty), i32_ty),
        i32_ty,
    );
    let body = exprs(
        vec![
            assign(var("sum", i32_ty), num(&types, 0), i32_ty),
            Node::Call(Call {
                obj: None,
                name: "each".to_string(),
                args: vec![],
                block: Some(BlockNode {
                    params: vec![BlockParam {
                        name: "i".to_string(),
                        ty: i32_ty,
                    }],
                    body: Box::new(block_body),
                    ty: nil,
                }),
                target_defs: vec![0],
                expanded: None,
                ty: nil,
            }),
            var("sum", i32_ty),
        ],
        i32_ty,
    );

    let mut program = Program::new(types, body);
    let each = each_def(&program.types);
    program.add_def(each);

    assert_eq!(run(&program)?, 6);
    Ok(())
}

#[test]
fn return_in_block_returns_from_surrounding_method() -> Result<()> {
    let types = TypeRegistry::new();
    let nil = types.nil();
    let i32_ty = types.int32();
    let bool_ty = types.bool_();

    // def pick; each { |i| return i if i == 2 }; 99; end  =>  2
    let block_body = Node::If {
        cond: Box::new(binary(
            BinaryOp::Eq,
            var("i", i32_ty),
            num(&types, 2),
            bool_ty,
        )),
        then: Box::new(Node::Return {
            value: Some(Box::new(var("i", i32_ty))),
        }),
        els: Box::new(Node::Nop),
        ty: nil,
    };
    let pick_body = exprs(
        vec![
            Node::Call(Call {
                obj: None,
                name: "each".to_string(),
                args: vec![],
                block: Some(BlockNode {
                    params: vec![BlockParam {
                        name: "i".to_string(),
                        ty: i32_ty,
                    }],
                    body: Box::new(block_body),
                    ty: nil,
                }),
                target_defs: vec![0],
                expanded: None,
                ty: nil,
            }),
            num(&types, 99),
        ],
        i32_ty,
    );

    let body = super::common::call("pick", None, vec![], vec![1], i32_ty);
    let mut program = Program::new(types, body);
    let each = each_def(&program.types);
    program.add_def(each);
    program.add_def(Def {
        name: "pick".to_string(),
        owner: None,
        params: vec![],
        return_type: i32_ty,
        body: pick_body,
        raises: false,
        is_extern: false,
    });

    assert_eq!(run(&program)?, 2);
    Ok(())
}
