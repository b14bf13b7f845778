// skiff-vm - Bytecode interpreter and ahead-of-time stack verifier for the skiff VM
// Copyright (c) 2025 Tom Waddington. MIT licensed.

//! Control flow: jumps, frames, calls, closures and halting.

use skiff_bytefile::{Instr, VarSpec};

use crate::vm::error::{OpResult, TrapKind};
use crate::vm::frame::Frame;
use crate::vm::stack::MAX_STACK_SIZE;
use crate::vm::VM;

/// What the run loop should do after a control instruction.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ControlFlow {
    Continue,
    Halt,
}

impl VM<'_> {
    pub(crate) fn execute_control(&mut self, instr: Instr) -> OpResult<ControlFlow> {
        match instr {
            Instr::Jmp(target) => {
                self.jump(target)?;
            }
            Instr::CJmpZ(target) => {
                let value = self.stack.pop()?;
                if self.int_operand(value)? == 0 {
                    self.jump(target)?;
                }
            }
            Instr::CJmpNz(target) => {
                let value = self.stack.pop()?;
                if self.int_operand(value)? != 0 {
                    self.jump(target)?;
                }
            }
            Instr::Begin { args, locals } => {
                // A plain entry reached through a closure call still
                // opens a closure frame.
                let via_closure = std::mem::take(&mut self.entering_closure);
                self.open_frame(args, locals, via_closure)?;
            }
            Instr::CBegin { args, locals } => {
                self.entering_closure = false;
                self.open_frame(args, locals, true)?;
            }
            Instr::Call { target, args } => {
                self.count(args, "argument count")?;
                self.frame_mut()?.return_address = Some(self.ip);
                self.enter(target, false)?;
            }
            Instr::CallC { args } => {
                let args = self.count(args, "argument count")?;
                let callee = self.stack.peek(args)?;
                let closure = self
                    .heap
                    .closure(callee)
                    .ok_or_else(|| TrapKind::TypeMismatch {
                        expected: "closure",
                        got: self.heap.kind_name(callee),
                    })?;
                let target = self.heap.closure_code(closure)?;
                self.frame_mut()?.return_address = Some(self.ip);
                self.enter(target, true)?;
            }
            Instr::Closure { target, captures } => {
                self.make_closure(target, &captures)?;
            }
            Instr::End | Instr::Ret => return self.close_frame(),
            Instr::Fail { line, column } => {
                let value = self.stack.pop()?;
                return Err(TrapKind::MatchFailure {
                    line,
                    column,
                    value: self.heap.render(value),
                });
            }
            Instr::Stop => return Ok(ControlFlow::Halt),
            _ => return Err(TrapKind::Internal("non-control instruction dispatched here")),
        }
        Ok(ControlFlow::Continue)
    }

    fn jump(&mut self, target: u32) -> OpResult<()> {
        if target >= self.file.code_size() {
            return Err(TrapKind::BadTarget { target });
        }
        self.ip = target;
        Ok(())
    }

    /// Transfers to a function entry, checking that the destination
    /// actually is one. Closure calls may land on either entry kind;
    /// direct calls only on a plain one.
    fn enter(&mut self, target: u32, via_closure: bool) -> OpResult<()> {
        if target >= self.file.code_size() {
            return Err(TrapKind::BadTarget { target });
        }
        let (dest, _) = Instr::decode(self.file.code(), target)?;
        let valid = match dest {
            Instr::Begin { .. } => true,
            Instr::CBegin { .. } => via_closure,
            _ => false,
        };
        if !valid {
            return Err(TrapKind::TargetNotBegin { target });
        }
        self.ip = target;
        self.entering_closure = via_closure;
        Ok(())
    }

    /// Opens a frame at the current stack top. The arguments (and the
    /// closure, for closure calls) must already sit below it.
    fn open_frame(&mut self, args: i32, locals: i32, is_closure: bool) -> OpResult<()> {
        let args = self.count(args, "argument count")?;
        let locals = self.count(locals, "local count")?;
        let base = self.stack.len();
        let reserved = args + is_closure as u32;
        if base < reserved {
            return Err(TrapKind::StackUnderflow);
        }
        // With a verified layout the whole frame's headroom is checked
        // once here instead of push by push.
        if let Some(layout) = self
            .layouts
            .and_then(|layouts| layouts.get(&self.instr_address))
        {
            let needed = base as u64 + layout.locals as u64 + layout.max_depth as u64;
            if needed > MAX_STACK_SIZE as u64 {
                return Err(TrapKind::StackOverflow);
            }
        }
        self.stack.grow_to(base + locals)?;
        self.frames.push(Frame::new(base, args, locals, is_closure));
        Ok(())
    }

    /// Returns from the current frame: pop the result, drop the
    /// frame's whole stack region, resume the caller. Returning from
    /// the entry frame halts.
    fn close_frame(&mut self) -> OpResult<ControlFlow> {
        let result = self.stack.pop()?;
        let frame = self.frames.pop().ok_or(TrapKind::NoFrame)?;
        self.stack.truncate(frame.floor());
        match self.frames.last() {
            None => Ok(ControlFlow::Halt),
            Some(caller) => {
                let return_address = caller
                    .return_address
                    .ok_or(TrapKind::Internal("caller frame has no return address"))?;
                self.ip = return_address;
                self.stack.push(result)?;
                Ok(ControlFlow::Continue)
            }
        }
    }

    /// Builds a closure value, capturing from the current frame.
    fn make_closure(&mut self, target: u32, captures: &[(VarSpec, u32)]) -> OpResult<()> {
        if target >= self.file.code_size() {
            return Err(TrapKind::BadTarget { target });
        }
        let (dest, _) = Instr::decode(self.file.code(), target)?;
        if !dest.is_begin() {
            return Err(TrapKind::TargetNotBegin { target });
        }
        let mut captured = Vec::with_capacity(captures.len());
        for &(spec, index) in captures {
            let value = match spec {
                VarSpec::Global => {
                    let slot = self.global_slot(index)?;
                    self.stack.get(slot)?
                }
                VarSpec::Local => {
                    let slot = self.local_slot(index)?;
                    self.stack.get(slot)?
                }
                VarSpec::Arg => {
                    let slot = self.arg_slot(index)?;
                    self.stack.get(slot)?
                }
                VarSpec::Capture => {
                    let closure = self.closure_handle()?;
                    self.heap.capture(closure, index)?
                }
            };
            captured.push(value);
        }
        let closure = self.heap.alloc_closure(target, &captured, self.stack.live());
        self.stack.push(closure)?;
        Ok(())
    }
}
