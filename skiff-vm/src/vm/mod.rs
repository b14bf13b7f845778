// skiff-vm - Bytecode interpreter and ahead-of-time stack verifier for the skiff VM
// Copyright (c) 2025 Tom Waddington. MIT licensed.

//! The bytecode interpreter.
//!
//! A fetch-decode-execute loop over one shared stack that holds
//! globals, call frames and working operands. Simple stack shuffles
//! are handled inline; everything else is dispatched to a handler
//! module by category.

pub mod error;
pub mod frame;
pub mod handlers;
pub mod io;
pub mod stack;

use skiff_bytefile::{Bytefile, Instr};
use skiff_runtime::{GcReport, Heap, HeapHandle, Value};

use crate::verifier::FrameLayouts;

pub use error::{Result, RuntimeError, TrapKind};
pub use frame::Frame;
pub use handlers::control::ControlFlow;
pub use io::{Console, ScriptedConsole, StdConsole};
pub use stack::{OperandStack, MAX_STACK_SIZE};

use error::OpResult;

/// The skiff virtual machine.
pub struct VM<'a> {
    /// The loaded program.
    file: &'a Bytefile,
    /// Frame layouts recorded by verification, when it ran. Lets a
    /// frame pre-check its whole stack headroom on entry.
    layouts: Option<&'a FrameLayouts>,
    /// Console the read and write builtins talk to.
    console: &'a mut dyn Console,
    /// The shared operand stack.
    stack: OperandStack,
    /// Open activations, entry frame first.
    frames: Vec<Frame>,
    /// Garbage-collected heap for strings, arrays, constructor
    /// applications and closures.
    heap: Heap,
    /// Address of the next instruction.
    ip: u32,
    /// Address of the instruction being executed, for trap reports.
    instr_address: u32,
    /// Most recent source line marker.
    line: u32,
    /// Set between a closure call and the entry it lands on.
    entering_closure: bool,
}

impl<'a> VM<'a> {
    /// Makes a VM over a loaded program. Pass the layouts from
    /// verification to enable whole-frame stack pre-checks; without
    /// them every push still checks the limit on its own.
    pub fn new(
        file: &'a Bytefile,
        layouts: Option<&'a FrameLayouts>,
        console: &'a mut dyn Console,
    ) -> VM<'a> {
        VM {
            file,
            layouts,
            console,
            stack: OperandStack::new(file.global_area_size()),
            frames: Vec::new(),
            heap: Heap::new(),
            ip: 0,
            instr_address: 0,
            line: 0,
            entering_closure: false,
        }
    }

    /// Runs from the entrypoint until the program halts or traps.
    pub fn run(&mut self) -> Result<()> {
        loop {
            match self.step() {
                Ok(ControlFlow::Continue) => {}
                Ok(ControlFlow::Halt) => return Ok(()),
                Err(kind) => return Err(self.trap(kind)),
            }
        }
    }

    /// Executes one instruction.
    fn step(&mut self) -> OpResult<ControlFlow> {
        self.instr_address = self.ip;
        let (instr, size) = Instr::decode(self.file.code(), self.ip)?;
        self.ip += size;

        match instr {
            Instr::Const(n) => {
                self.stack.push(Value::int(n))?;
            }
            Instr::Drop => {
                self.stack.pop()?;
            }
            Instr::Dup => {
                let top = self.stack.peek(0)?;
                self.stack.push(top)?;
            }
            Instr::Swap => {
                let a = self.stack.pop()?;
                let b = self.stack.pop()?;
                self.stack.push(a)?;
                self.stack.push(b)?;
            }
            Instr::Line { number } => {
                self.line = number;
            }
            Instr::Add
            | Instr::Sub
            | Instr::Mul
            | Instr::Div
            | Instr::Mod
            | Instr::Lt
            | Instr::Le
            | Instr::Gt
            | Instr::Ge
            | Instr::Eq
            | Instr::Ne
            | Instr::And
            | Instr::Or => self.execute_arithmetic(instr)?,
            Instr::LdGlobal(_)
            | Instr::LdLocal(_)
            | Instr::LdArg(_)
            | Instr::LdCapture(_)
            | Instr::LdaGlobal(_)
            | Instr::LdaLocal(_)
            | Instr::LdaArg(_)
            | Instr::LdaCapture(_)
            | Instr::StGlobal(_)
            | Instr::StLocal(_)
            | Instr::StArg(_)
            | Instr::StCapture(_)
            | Instr::Sti
            | Instr::Sta
            | Instr::Elem => self.execute_variables(instr)?,
            Instr::Jmp(_)
            | Instr::CJmpZ(_)
            | Instr::CJmpNz(_)
            | Instr::Begin { .. }
            | Instr::CBegin { .. }
            | Instr::Closure { .. }
            | Instr::CallC { .. }
            | Instr::Call { .. }
            | Instr::End
            | Instr::Ret
            | Instr::Fail { .. }
            | Instr::Stop => return self.execute_control(instr),
            Instr::String(_)
            | Instr::Sexp { .. }
            | Instr::Tag { .. }
            | Instr::Array { .. }
            | Instr::PattStrEq
            | Instr::PattString
            | Instr::PattArray
            | Instr::PattSexp
            | Instr::PattRef
            | Instr::PattVal
            | Instr::PattFun
            | Instr::ReadInt
            | Instr::WriteInt
            | Instr::Length
            | Instr::Stringify
            | Instr::MakeArray { .. } => self.execute_builtins(instr)?,
        }
        Ok(ControlFlow::Continue)
    }

    /// Attaches the trap site to a raw trap.
    fn trap(&self, kind: TrapKind) -> RuntimeError {
        match kind {
            TrapKind::MatchFailure {
                line,
                column,
                value,
            } => RuntimeError::MatchFailure {
                file: self.file.name().to_string(),
                line,
                column,
                value,
            },
            kind => RuntimeError::Trap {
                kind,
                offset: self.instr_address,
                line: self.line,
            },
        }
    }

    // ========================================================================
    // Frame and slot access
    // ========================================================================

    fn frame(&self) -> OpResult<&Frame> {
        self.frames.last().ok_or(TrapKind::NoFrame)
    }

    fn frame_mut(&mut self) -> OpResult<&mut Frame> {
        self.frames.last_mut().ok_or(TrapKind::NoFrame)
    }

    /// Absolute slot of a global.
    fn global_slot(&self, index: u32) -> OpResult<u32> {
        let len = self.file.global_area_size();
        if index >= len {
            return Err(TrapKind::BadSlot {
                space: "global",
                index,
                len,
            });
        }
        Ok(index)
    }

    /// Absolute slot of a local in the current frame.
    fn local_slot(&self, index: u32) -> OpResult<u32> {
        let frame = self.frame()?;
        if index >= frame.locals {
            return Err(TrapKind::BadSlot {
                space: "local",
                index,
                len: frame.locals,
            });
        }
        Ok(frame.base + index)
    }

    /// Absolute slot of an argument in the current frame.
    fn arg_slot(&self, index: u32) -> OpResult<u32> {
        let frame = self.frame()?;
        if index >= frame.args {
            return Err(TrapKind::BadSlot {
                space: "argument",
                index,
                len: frame.args,
            });
        }
        Ok(frame.args_base() + index)
    }

    /// Handle of the closure the current frame was entered through.
    fn closure_handle(&self) -> OpResult<HeapHandle> {
        let frame = self.frame()?;
        let slot = frame.closure_slot().ok_or(TrapKind::NoClosure)?;
        let value = self.stack.get(slot)?;
        self.heap.closure(value).ok_or_else(|| TrapKind::TypeMismatch {
            expected: "closure",
            got: self.heap.kind_name(value),
        })
    }

    /// The string starting at `offset`, decoupled from `self` so the
    /// heap can be borrowed alongside it.
    fn string_table(&self, offset: u32) -> OpResult<&'a [u8]> {
        self.file
            .string_at(offset)
            .ok_or(TrapKind::BadStringIndex { offset })
    }

    /// Rejects negative count operands.
    fn count(&self, count: i32, what: &'static str) -> OpResult<u32> {
        if count < 0 {
            return Err(TrapKind::NegativeCount { what });
        }
        Ok(count as u32)
    }

    /// The integer inside `value`, or a type trap.
    fn int_operand(&self, value: Value) -> OpResult<i32> {
        value.as_int().ok_or_else(|| TrapKind::TypeMismatch {
            expected: "integer",
            got: self.heap.kind_name(value),
        })
    }

    // ========================================================================
    // Observation points for embedders and tests
    // ========================================================================

    /// The shared stack as it stands.
    pub fn stack(&self) -> &OperandStack {
        &self.stack
    }

    /// The heap as it stands.
    pub fn heap(&self) -> &Heap {
        &self.heap
    }

    /// Renders a value the way the stringify builtin would.
    pub fn render(&self, value: Value) -> String {
        self.heap.render(value)
    }

    /// Forces a collection with the live stack as roots.
    pub fn collect_garbage(&mut self) -> GcReport {
        self.heap.collect(self.stack.live())
    }
}
