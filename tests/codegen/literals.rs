use anyhow::Result;

use super::common::{exprs, gen_ir, run, string};
use berylc::ast::Node;
use berylc::program::Program;
use berylc::types::TypeRegistry;

fn symbol(types: &TypeRegistry, name: &str) -> Node {
    Node::SymbolLit {
        value: name.to_string(),
        ty: types.symbol(),
    }
}

#[test]
fn symbols_are_sorted_interned_ids() -> Result<()> {
    let types = TypeRegistry::new();
    let symbol_ty = types.symbol();
    // :b sorts after :a, so its id is 1 regardless of appearance order.
    let body = exprs(
        vec![symbol(&types, "b"), symbol(&types, "a"), symbol(&types, "b")],
        symbol_ty,
    );
    let program = Program::new(types, body);

    assert_eq!(run(&program)?, 1);
    let ir = gen_ir(&program)?;
    assert!(
        ir.contains("@symbol_table = internal constant [2 x i8*]"),
        "expected symbol table global: {}",
        ir
    );
    Ok(())
}

#[test]
fn string_literals_are_interned_with_length_prefix() -> Result<()> {
    let types = TypeRegistry::new();
    let string_ty = types.string();
    let body = exprs(
        vec![string(&types, "hello"), string(&types, "hello")],
        string_ty,
    );
    let program = Program::new(types, body);

    let ir = gen_ir(&program)?;
    // One private global with { i32 len, bytes + NUL }, shared by both uses.
    assert!(
        ir.contains("@str.0 = private constant { i32, [6 x i8] } { i32 5, [6 x i8] c\"hello\\00\" }"),
        "expected length-prefixed interned string: {}",
        ir
    );
    assert!(!ir.contains("@str.1"), "duplicate literal was re-interned: {}", ir);
    Ok(())
}

#[test]
fn char_literals_lower_to_bytes() -> Result<()> {
    let types = TypeRegistry::new();
    let char_ty = types.char_();
    let body = Node::CharLit {
        value: 'A',
        ty: char_ty,
    };
    let program = Program::new(types, body);
    assert_eq!(run(&program)?, 65);
    Ok(())
}
