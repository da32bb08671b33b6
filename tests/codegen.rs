// Wrapper for tests in codegen/

mod common;

#[path = "codegen/arithmetic.rs"]
mod arithmetic;
#[path = "codegen/blocks.rs"]
mod blocks;
#[path = "codegen/constants.rs"]
mod constants;
#[path = "codegen/dispatch.rs"]
mod dispatch;
#[path = "codegen/exceptions.rs"]
mod exceptions;
#[path = "codegen/hierarchy.rs"]
mod hierarchy;
#[path = "codegen/literals.rs"]
mod literals;
#[path = "codegen/monomorphization.rs"]
mod monomorphization;
#[path = "codegen/nilable.rs"]
mod nilable;
#[path = "codegen/union_types.rs"]
mod union_types;
#[path = "codegen/while_loops.rs"]
mod while_loops;
