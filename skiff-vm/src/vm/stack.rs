// skiff-vm - Bytecode interpreter and ahead-of-time stack verifier for the skiff VM
// Copyright (c) 2025 Tom Waddington. MIT licensed.

//! The shared operand stack.

use skiff_runtime::Value;

use crate::vm::error::{OpResult, TrapKind};

/// Capacity limit of the shared stack, in slots.
pub const MAX_STACK_SIZE: usize = 0xF_FFFF;

/// The shared stack: globals at the bottom, then each activation's
/// arguments, locals and working operands.
#[derive(Debug)]
pub struct OperandStack {
    values: Vec<Value>,
}

impl OperandStack {
    /// Makes a stack holding `globals` unset slots plus the two guard
    /// slots the entry frame reads as its arguments.
    pub fn new(globals: u32) -> OperandStack {
        OperandStack {
            values: vec![Value::Empty; globals as usize + 2],
        }
    }

    #[inline]
    pub fn push(&mut self, value: Value) -> OpResult<()> {
        if self.values.len() >= MAX_STACK_SIZE {
            return Err(TrapKind::StackOverflow);
        }
        self.values.push(value);
        Ok(())
    }

    #[inline]
    pub fn pop(&mut self) -> OpResult<Value> {
        self.values.pop().ok_or(TrapKind::StackUnderflow)
    }

    /// Pops `count` values, returning them bottom to top.
    pub fn pop_n(&mut self, count: u32) -> OpResult<Vec<Value>> {
        let count = count as usize;
        if self.values.len() < count {
            return Err(TrapKind::StackUnderflow);
        }
        Ok(self.values.split_off(self.values.len() - count))
    }

    /// Reads `depth` slots below the top without popping.
    #[inline]
    pub fn peek(&self, depth: u32) -> OpResult<Value> {
        let len = self.values.len();
        if (depth as usize) < len {
            Ok(self.values[len - 1 - depth as usize])
        } else {
            Err(TrapKind::StackUnderflow)
        }
    }

    /// Reads an absolute slot. Callers bound-check against their
    /// logical area first, so a miss here is an interpreter bug.
    #[inline]
    pub fn get(&self, slot: u32) -> OpResult<Value> {
        self.values
            .get(slot as usize)
            .copied()
            .ok_or(TrapKind::Internal("slot read out of range"))
    }

    #[inline]
    pub fn set(&mut self, slot: u32, value: Value) -> OpResult<()> {
        match self.values.get_mut(slot as usize) {
            Some(cell) => {
                *cell = value;
                Ok(())
            }
            None => Err(TrapKind::Internal("slot write out of range")),
        }
    }

    #[inline]
    pub fn len(&self) -> u32 {
        self.values.len() as u32
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    /// Cuts the stack back to `len` slots.
    pub fn truncate(&mut self, len: u32) {
        self.values.truncate(len as usize);
    }

    /// Grows the stack to `len` slots, filling new slots with the
    /// unset value.
    pub fn grow_to(&mut self, len: u32) -> OpResult<()> {
        if len as usize > MAX_STACK_SIZE {
            return Err(TrapKind::StackOverflow);
        }
        if len as usize > self.values.len() {
            self.values.resize(len as usize, Value::Empty);
        }
        Ok(())
    }

    /// Every live slot, bottom to top. This is the GC root set.
    pub fn live(&self) -> &[Value] {
        &self.values
    }
}
