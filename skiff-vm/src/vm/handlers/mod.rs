// skiff-vm - Bytecode interpreter and ahead-of-time stack verifier for the skiff VM
// Copyright (c) 2025 Tom Waddington. MIT licensed.

//! Instruction handlers, grouped by category.

pub mod arithmetic;
pub mod builtins;
pub mod control;
pub mod variables;
