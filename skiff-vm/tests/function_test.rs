// skiff-vm - Bytecode interpreter and ahead-of-time stack verifier for the skiff VM
// Copyright (c) 2025 Tom Waddington. MIT licensed.

//! Call and frame discipline: direct calls, recursion, returns,
//! closures and the traps around them.

mod common;

use common::{program, Asm};
use skiff_bytefile::{Bytefile, Instr as I, VarSpec};
use skiff_vm::{ScriptedConsole, VM};

fn run_ok(file: &Bytefile, input: &[i32]) -> Vec<i32> {
    let mut console = ScriptedConsole::new(input);
    let mut vm = VM::new(file, None, &mut console);
    vm.run().expect("program runs");
    drop(vm);
    console.output().to_vec()
}

fn expect_trap(file: &Bytefile, fragment: &str) {
    let mut console = ScriptedConsole::new(&[]);
    let mut vm = VM::new(file, None, &mut console);
    let error = vm.run().expect_err("program traps");
    let message = error.to_string();
    assert!(
        message.contains(fragment),
        "expected {:?} in {:?}",
        fragment,
        message
    );
}

// ============================================================================
// Direct calls
// ============================================================================

#[test]
fn call_passes_arguments_and_returns_a_value() {
    let mut asm = Asm::new();
    asm.op(I::Begin { args: 2, locals: 0 })
        .op(I::Const(30))
        .op(I::Const(12))
        .op_to(I::Call { target: 0, args: 2 }, "add")
        .op(I::WriteInt)
        .op(I::Drop)
        .op(I::Const(0))
        .op(I::End)
        .label("add")
        .op(I::Begin { args: 2, locals: 0 })
        .op(I::LdArg(0))
        .op(I::LdArg(1))
        .op(I::Add)
        .op(I::End);
    let file = program(0, &[], &asm.finish());
    assert_eq!(run_ok(&file, &[]), vec![42]);
}

#[test]
fn return_unwinds_to_the_call_height() {
    // A sentinel below the call must still be there, right under the
    // result.
    let mut asm = Asm::new();
    asm.op(I::Begin { args: 2, locals: 0 })
        .op(I::Const(99))
        .op(I::Const(1))
        .op(I::Const(2))
        .op_to(I::Call { target: 0, args: 2 }, "f")
        .op(I::WriteInt)
        .op(I::Drop)
        .op(I::WriteInt)
        .op(I::Drop)
        .op(I::Const(0))
        .op(I::End)
        .label("f")
        .op(I::Begin { args: 2, locals: 1 })
        .op(I::Const(5))
        .op(I::StLocal(0))
        .op(I::Drop)
        .op(I::LdArg(0))
        .op(I::LdLocal(0))
        .op(I::Add)
        .op(I::Ret)
        .op(I::End);
    let file = program(0, &[], &asm.finish());
    assert_eq!(run_ok(&file, &[]), vec![6, 99]);
}

#[test]
fn nested_calls_resume_their_callers() {
    let mut asm = Asm::new();
    asm.op(I::Begin { args: 2, locals: 0 })
        .op(I::Const(4))
        .op_to(I::Call { target: 0, args: 1 }, "double")
        .op(I::WriteInt)
        .op(I::Drop)
        .op(I::Const(0))
        .op(I::End)
        .label("double")
        .op(I::Begin { args: 1, locals: 0 })
        .op(I::LdArg(0))
        .op_to(I::Call { target: 0, args: 1 }, "inc")
        .op(I::LdArg(0))
        .op(I::Add)
        .op(I::End)
        .label("inc")
        .op(I::Begin { args: 1, locals: 0 })
        .op(I::LdArg(0))
        .op(I::Const(1))
        .op(I::Add)
        .op(I::End);
    let file = program(0, &[], &asm.finish());
    // double(4) = inc(4) + 4 = 9.
    assert_eq!(run_ok(&file, &[]), vec![9]);
}

#[test]
fn recursion_computes_a_factorial() {
    let mut asm = Asm::new();
    asm.op(I::Begin { args: 2, locals: 0 })
        .op(I::Const(5))
        .op_to(I::Call { target: 0, args: 1 }, "fact")
        .op(I::WriteInt)
        .op(I::Drop)
        .op(I::Const(0))
        .op(I::End)
        .label("fact")
        .op(I::Begin { args: 1, locals: 0 })
        .op(I::LdArg(0))
        .op_to(I::CJmpZ(0), "base")
        .op(I::LdArg(0))
        .op(I::LdArg(0))
        .op(I::Const(1))
        .op(I::Sub)
        .op_to(I::Call { target: 0, args: 1 }, "fact")
        .op(I::Mul)
        .op(I::End)
        .label("base")
        .op(I::Const(1))
        .op(I::End);
    let file = program(0, &[], &asm.finish());
    assert_eq!(run_ok(&file, &[]), vec![120]);
}

#[test]
fn call_target_must_be_a_function_entry() {
    let mut asm = Asm::new();
    asm.op(I::Begin { args: 2, locals: 0 })
        .op_to(I::Call { target: 0, args: 0 }, "not_begin")
        .op(I::End)
        .label("not_begin")
        .op(I::Const(1))
        .op(I::End);
    let file = program(0, &[], &asm.finish());
    expect_trap(&file, "is not a function entry");
}

#[test]
fn call_target_must_be_in_the_code_area() {
    let mut asm = Asm::new();
    asm.op(I::Begin { args: 2, locals: 0 })
        .op(I::Call {
            target: 0xFFFF,
            args: 0,
        })
        .op(I::End);
    let file = program(0, &[], &asm.finish());
    expect_trap(&file, "invalid destination 0xffff");
}

#[test]
fn direct_call_may_not_enter_a_closure_entry() {
    let mut asm = Asm::new();
    asm.op(I::Begin { args: 2, locals: 0 })
        .op_to(I::Call { target: 0, args: 0 }, "f")
        .op(I::End)
        .label("f")
        .op(I::CBegin { args: 0, locals: 0 })
        .op(I::Const(1))
        .op(I::End);
    let file = program(0, &[], &asm.finish());
    expect_trap(&file, "is not a function entry");
}

// ============================================================================
// Closures
// ============================================================================

#[test]
fn closure_call_reads_captured_values() {
    let mut asm = Asm::new();
    asm.op(I::Begin { args: 2, locals: 1 })
        .op(I::Const(10))
        .op(I::StLocal(0))
        .op(I::Drop)
        .op_to(
            I::Closure {
                target: 0,
                captures: vec![(VarSpec::Local, 0)],
            },
            "body",
        )
        .op(I::CallC { args: 0 })
        .op(I::WriteInt)
        .op(I::Drop)
        .op(I::Const(0))
        .op(I::End)
        .label("body")
        .op(I::CBegin { args: 0, locals: 0 })
        .op(I::LdCapture(0))
        .op(I::Const(1))
        .op(I::Add)
        .op(I::End);
    let file = program(0, &[], &asm.finish());
    assert_eq!(run_ok(&file, &[]), vec![11]);
}

#[test]
fn closure_call_into_a_plain_entry_marks_the_frame() {
    // The body declares BEGIN, not CBEGIN; entered through CALLC it
    // still gets the closure slot.
    let mut asm = Asm::new();
    asm.op(I::Begin { args: 2, locals: 0 })
        .op(I::Const(7))
        .op(I::StGlobal(0))
        .op(I::Drop)
        .op_to(
            I::Closure {
                target: 0,
                captures: vec![(VarSpec::Global, 0)],
            },
            "body",
        )
        .op(I::CallC { args: 0 })
        .op(I::WriteInt)
        .op(I::Drop)
        .op(I::Const(0))
        .op(I::End)
        .label("body")
        .op(I::Begin { args: 0, locals: 0 })
        .op(I::LdCapture(0))
        .op(I::End);
    let file = program(1, &[], &asm.finish());
    assert_eq!(run_ok(&file, &[]), vec![7]);
}

#[test]
fn closure_call_passes_arguments_above_the_closure() {
    let mut asm = Asm::new();
    asm.op(I::Begin { args: 2, locals: 0 })
        .op(I::Const(10))
        .op(I::StGlobal(0))
        .op(I::Drop)
        .op_to(
            I::Closure {
                target: 0,
                captures: vec![(VarSpec::Global, 0)],
            },
            "adder",
        )
        .op(I::Const(32))
        .op(I::CallC { args: 1 })
        .op(I::WriteInt)
        .op(I::Drop)
        .op(I::Const(0))
        .op(I::End)
        .label("adder")
        .op(I::CBegin { args: 1, locals: 0 })
        .op(I::LdArg(0))
        .op(I::LdCapture(0))
        .op(I::Add)
        .op(I::End);
    let file = program(1, &[], &asm.finish());
    assert_eq!(run_ok(&file, &[]), vec![42]);
}

#[test]
fn captures_are_copies_with_their_own_storage() {
    // Writing through a capture location changes the closure's slot,
    // not the global it was copied from.
    let mut asm = Asm::new();
    asm.op(I::Begin { args: 2, locals: 0 })
        .op(I::Const(1))
        .op(I::StGlobal(0))
        .op(I::Drop)
        .op_to(
            I::Closure {
                target: 0,
                captures: vec![(VarSpec::Global, 0)],
            },
            "body",
        )
        .op(I::CallC { args: 0 })
        .op(I::WriteInt)
        .op(I::Drop)
        .op(I::LdGlobal(0))
        .op(I::WriteInt)
        .op(I::Drop)
        .op(I::Const(0))
        .op(I::End)
        .label("body")
        .op(I::CBegin { args: 0, locals: 0 })
        .op(I::LdaCapture(0))
        .op(I::Const(5))
        .op(I::Sta)
        .op(I::Drop)
        .op(I::LdCapture(0))
        .op(I::End);
    let file = program(1, &[], &asm.finish());
    assert_eq!(run_ok(&file, &[]), vec![5, 1]);
}

#[test]
fn closures_capture_other_captures() {
    // An inner closure built inside a closure body copies from the
    // outer one's captured slots.
    let mut asm = Asm::new();
    asm.op(I::Begin { args: 2, locals: 0 })
        .op(I::Const(21))
        .op(I::StGlobal(0))
        .op(I::Drop)
        .op_to(
            I::Closure {
                target: 0,
                captures: vec![(VarSpec::Global, 0)],
            },
            "outer",
        )
        .op(I::CallC { args: 0 })
        .op(I::CallC { args: 0 })
        .op(I::WriteInt)
        .op(I::Drop)
        .op(I::Const(0))
        .op(I::End)
        .label("outer")
        .op(I::CBegin { args: 0, locals: 0 })
        .op_to(
            I::Closure {
                target: 0,
                captures: vec![(VarSpec::Capture, 0)],
            },
            "inner",
        )
        .op(I::End)
        .label("inner")
        .op(I::CBegin { args: 0, locals: 0 })
        .op(I::LdCapture(0))
        .op(I::Dup)
        .op(I::Add)
        .op(I::End);
    let file = program(1, &[], &asm.finish());
    assert_eq!(run_ok(&file, &[]), vec![42]);
}

#[test]
fn closures_are_closures_to_the_pattern_test() {
    let mut asm = Asm::new();
    asm.op(I::Begin { args: 2, locals: 0 })
        .op_to(
            I::Closure {
                target: 0,
                captures: vec![],
            },
            "body",
        )
        .op(I::PattFun)
        .op(I::WriteInt)
        .op(I::Drop)
        .op(I::Const(0))
        .op(I::End)
        .label("body")
        .op(I::CBegin { args: 0, locals: 0 })
        .op(I::Const(0))
        .op(I::End);
    let file = program(0, &[], &asm.finish());
    assert_eq!(run_ok(&file, &[]), vec![1]);
}

#[test]
fn closure_call_requires_a_closure_value() {
    let mut asm = Asm::new();
    asm.op(I::Begin { args: 2, locals: 0 })
        .op(I::Const(3))
        .op(I::CallC { args: 0 })
        .op(I::End);
    let file = program(0, &[], &asm.finish());
    expect_trap(&file, "expected closure, got integer");
}

#[test]
fn closure_target_must_be_a_function_entry() {
    let mut asm = Asm::new();
    asm.op(I::Begin { args: 2, locals: 0 })
        .op_to(
            I::Closure {
                target: 0,
                captures: vec![],
            },
            "not_begin",
        )
        .op(I::End)
        .label("not_begin")
        .op(I::Const(1))
        .op(I::End);
    let file = program(0, &[], &asm.finish());
    expect_trap(&file, "is not a function entry");
}

#[test]
fn capture_access_needs_a_closure_frame() {
    let mut asm = Asm::new();
    asm.op(I::Begin { args: 2, locals: 0 })
        .op(I::LdCapture(0))
        .op(I::End);
    let file = program(0, &[], &asm.finish());
    expect_trap(&file, "capture access outside a closure call");
}

#[test]
fn capture_index_is_bounds_checked() {
    let mut asm = Asm::new();
    asm.op(I::Begin { args: 2, locals: 0 })
        .op_to(
            I::Closure {
                target: 0,
                captures: vec![],
            },
            "body",
        )
        .op(I::CallC { args: 0 })
        .op(I::End)
        .label("body")
        .op(I::CBegin { args: 0, locals: 0 })
        .op(I::LdCapture(3))
        .op(I::End);
    let file = program(0, &[], &asm.finish());
    expect_trap(&file, "index 3 out of bounds (length 0)");
}

// ============================================================================
// Frame lifetime
// ============================================================================

#[test]
fn stale_stack_locations_trap_instead_of_corrupting() {
    // f returns the address of its own local; storing through it
    // after f's frame is gone must trap.
    let mut asm = Asm::new();
    asm.op(I::Begin { args: 2, locals: 0 })
        .op_to(I::Call { target: 0, args: 0 }, "f")
        .op(I::Const(9))
        .op(I::Swap)
        .op(I::Sti)
        .op(I::End)
        .label("f")
        .op(I::Begin { args: 0, locals: 1 })
        .op(I::Const(5))
        .op(I::StLocal(0))
        .op(I::Drop)
        .op(I::LdaLocal(0))
        .op(I::End);
    let file = program(0, &[], &asm.finish());
    expect_trap(&file, "stack index");
}

#[test]
fn argument_index_is_bounds_checked() {
    let mut asm = Asm::new();
    asm.op(I::Begin { args: 2, locals: 0 })
        .op(I::LdArg(2))
        .op(I::End);
    let file = program(0, &[], &asm.finish());
    expect_trap(&file, "argument index 2 out of bounds (size 2)");
}

#[test]
fn deep_recursion_overflows_the_stack() {
    // Each frame grows the stack by one local, so the limit is hit
    // long before memory runs out.
    let mut asm = Asm::new();
    asm.op(I::Begin { args: 2, locals: 0 })
        .op_to(I::Call { target: 0, args: 0 }, "f")
        .op(I::End)
        .label("f")
        .op(I::Begin { args: 0, locals: 1 })
        .op_to(I::Call { target: 0, args: 0 }, "f")
        .op(I::End);
    let file = program(0, &[], &asm.finish());
    expect_trap(&file, "stack overflow");
}
