// skiff-vm - Bytecode interpreter and ahead-of-time stack verifier for the skiff VM
// Copyright (c) 2025 Tom Waddington. MIT licensed.

//! Variable access, stores through locations and element reads.

use skiff_bytefile::Instr;
use skiff_runtime::{Location, Value};

use crate::vm::error::{OpResult, TrapKind};
use crate::vm::VM;

impl VM<'_> {
    pub(crate) fn execute_variables(&mut self, instr: Instr) -> OpResult<()> {
        match instr {
            Instr::LdGlobal(index) => {
                let slot = self.global_slot(index)?;
                let value = self.stack.get(slot)?;
                self.stack.push(value)?;
            }
            Instr::LdLocal(index) => {
                let slot = self.local_slot(index)?;
                let value = self.stack.get(slot)?;
                self.stack.push(value)?;
            }
            Instr::LdArg(index) => {
                let slot = self.arg_slot(index)?;
                let value = self.stack.get(slot)?;
                self.stack.push(value)?;
            }
            Instr::LdCapture(index) => {
                let closure = self.closure_handle()?;
                let value = self.heap.capture(closure, index)?;
                self.stack.push(value)?;
            }
            Instr::LdaGlobal(index) => {
                let slot = self.global_slot(index)?;
                self.stack.push(Value::Loc(Location::Stack(slot)))?;
            }
            Instr::LdaLocal(index) => {
                let slot = self.local_slot(index)?;
                self.stack.push(Value::Loc(Location::Stack(slot)))?;
            }
            Instr::LdaArg(index) => {
                let slot = self.arg_slot(index)?;
                self.stack.push(Value::Loc(Location::Stack(slot)))?;
            }
            Instr::LdaCapture(index) => {
                let closure = self.closure_handle()?;
                let len = self.heap.closure_captures(closure)?;
                if index >= len {
                    return Err(TrapKind::BadSlot {
                        space: "captured",
                        index,
                        len,
                    });
                }
                self.stack
                    .push(Value::Loc(Location::Capture { closure, slot: index }))?;
            }
            // Stores keep their value on the stack.
            Instr::StGlobal(index) => {
                let slot = self.global_slot(index)?;
                let value = self.stack.peek(0)?;
                self.stack.set(slot, value)?;
            }
            Instr::StLocal(index) => {
                let slot = self.local_slot(index)?;
                let value = self.stack.peek(0)?;
                self.stack.set(slot, value)?;
            }
            Instr::StArg(index) => {
                let slot = self.arg_slot(index)?;
                let value = self.stack.peek(0)?;
                self.stack.set(slot, value)?;
            }
            Instr::StCapture(index) => {
                let closure = self.closure_handle()?;
                let value = self.stack.peek(0)?;
                self.heap.set_capture(closure, index, value)?;
            }
            Instr::Sti => {
                let target = self.stack.pop()?;
                let value = self.stack.pop()?;
                let location = match target {
                    Value::Loc(location) => location,
                    other => {
                        return Err(TrapKind::TypeMismatch {
                            expected: "location",
                            got: self.heap.kind_name(other),
                        })
                    }
                };
                self.store_through(location, value)?;
                self.stack.push(value)?;
            }
            Instr::Sta => {
                let value = self.stack.pop()?;
                let selector = self.stack.pop()?;
                match selector {
                    // A location on the stack: store through it, no
                    // third operand.
                    Value::Loc(location) => {
                        self.store_through(location, value)?;
                    }
                    // An integer index: the aggregate sits below it.
                    Value::Int(index) => {
                        let target = self.stack.pop()?;
                        let handle =
                            self.heap
                                .aggregate(target)
                                .ok_or_else(|| TrapKind::TypeMismatch {
                                    expected: "aggregate",
                                    got: self.heap.kind_name(target),
                                })?;
                        self.heap.set(handle, index, value)?;
                    }
                    other => {
                        return Err(TrapKind::TypeMismatch {
                            expected: "location or integer",
                            got: self.heap.kind_name(other),
                        })
                    }
                }
                self.stack.push(value)?;
            }
            Instr::Elem => {
                let index_value = self.stack.pop()?;
                let target = self.stack.pop()?;
                let index = self.int_operand(index_value)?;
                let handle = self
                    .heap
                    .aggregate(target)
                    .ok_or_else(|| TrapKind::TypeMismatch {
                        expected: "aggregate",
                        got: self.heap.kind_name(target),
                    })?;
                let element = self.heap.get(handle, index)?;
                self.stack.push(element)?;
            }
            _ => return Err(TrapKind::Internal("non-variable instruction dispatched here")),
        }
        Ok(())
    }

    /// Writes through a first-class location.
    fn store_through(&mut self, location: Location, value: Value) -> OpResult<()> {
        match location {
            Location::Stack(slot) => {
                // The slot may have been cut off by a frame return.
                if slot >= self.stack.len() {
                    return Err(TrapKind::BadSlot {
                        space: "stack",
                        index: slot,
                        len: self.stack.len(),
                    });
                }
                self.stack.set(slot, value)
            }
            Location::Capture { closure, slot } => {
                self.heap.set_capture(closure, slot, value)?;
                Ok(())
            }
        }
    }
}
