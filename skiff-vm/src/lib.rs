// skiff-vm - Bytecode interpreter and ahead-of-time stack verifier for the skiff VM
// Copyright (c) 2025 Tom Waddington. MIT licensed.

//! Interpreter and ahead-of-time stack verifier for skiff bytecode.
//!
//! [`verify`] proves, in one forward pass, that a loaded program keeps
//! a consistent operand stack depth at every reachable address and
//! that every static operand is in range. [`VM`] then executes the
//! program over one shared stack of globals, call frames and
//! operands, collaborating with the [`skiff_runtime`] heap for
//! strings, arrays, constructor applications and closures.

pub mod verifier;
pub mod vm;

pub use verifier::{verify, FrameLayout, FrameLayouts, Verified, VerifyError};
pub use vm::{
    Console, ControlFlow, Frame, OperandStack, Result, RuntimeError, ScriptedConsole, StdConsole,
    TrapKind, MAX_STACK_SIZE, VM,
};
