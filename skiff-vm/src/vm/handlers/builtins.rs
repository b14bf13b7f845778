// skiff-vm - Bytecode interpreter and ahead-of-time stack verifier for the skiff VM
// Copyright (c) 2025 Tom Waddington. MIT licensed.

//! Heap constructors, pattern tests and console builtins.

use skiff_bytefile::Instr;
use skiff_runtime::{tags, Value};

use crate::vm::error::{OpResult, TrapKind};
use crate::vm::VM;

impl VM<'_> {
    pub(crate) fn execute_builtins(&mut self, instr: Instr) -> OpResult<()> {
        match instr {
            Instr::String(offset) => {
                let bytes = self.string_table(offset)?;
                let value = self.heap.alloc_string(bytes, self.stack.live());
                self.stack.push(value)?;
            }
            Instr::Sexp { tag, arity } => {
                let count = self.count(arity, "constructor arity")?;
                let hash = self.tag_hash_at(tag)?;
                let elements = self.stack.pop_n(count)?;
                let value = self.heap.alloc_sexp(hash, &elements, self.stack.live());
                self.stack.push(value)?;
            }
            Instr::MakeArray { len } => {
                let count = self.count(len, "array length")?;
                let elements = self.stack.pop_n(count)?;
                let value = self.heap.alloc_array(&elements, self.stack.live());
                self.stack.push(value)?;
            }
            // TAG and ARRAY carry the expected shape in their operands
            // and pop only the scrutinee.
            Instr::Tag { name, arity } => {
                let count = self.count(arity, "constructor arity")?;
                let hash = self.tag_hash_at(name)?;
                let value = self.stack.pop()?;
                let matched = match value.handle() {
                    Some(handle) if self.heap.is_sexp(value) => {
                        self.heap.sexp_tag(handle) == Some(hash)
                            && self.heap.len(handle)? == count
                    }
                    _ => false,
                };
                self.push_flag(matched)?;
            }
            Instr::Array { len } => {
                let count = self.count(len, "array length")?;
                let value = self.stack.pop()?;
                let matched = match value.handle() {
                    Some(handle) if self.heap.is_array(value) => self.heap.len(handle)? == count,
                    _ => false,
                };
                self.push_flag(matched)?;
            }
            Instr::PattStrEq => {
                let pattern = self.stack.pop()?;
                let scrutinee = self.stack.pop()?;
                let pattern_bytes = pattern
                    .handle()
                    .and_then(|handle| self.heap.string_bytes(handle))
                    .ok_or_else(|| TrapKind::TypeMismatch {
                        expected: "string",
                        got: self.heap.kind_name(pattern),
                    })?;
                let matched = match scrutinee.handle() {
                    Some(handle) => self.heap.string_bytes(handle) == Some(pattern_bytes),
                    None => false,
                };
                self.push_flag(matched)?;
            }
            Instr::PattString => {
                let value = self.stack.pop()?;
                let matched = self.heap.is_string(value);
                self.push_flag(matched)?;
            }
            Instr::PattArray => {
                let value = self.stack.pop()?;
                let matched = self.heap.is_array(value);
                self.push_flag(matched)?;
            }
            Instr::PattSexp => {
                let value = self.stack.pop()?;
                let matched = self.heap.is_sexp(value);
                self.push_flag(matched)?;
            }
            Instr::PattRef => {
                let value = self.stack.pop()?;
                self.push_flag(value.is_reference())?;
            }
            Instr::PattVal => {
                let value = self.stack.pop()?;
                self.push_flag(value.is_int())?;
            }
            Instr::PattFun => {
                let value = self.stack.pop()?;
                let matched = self.heap.is_closure(value);
                self.push_flag(matched)?;
            }
            Instr::ReadInt => {
                let value = self
                    .console
                    .read_int()
                    .ok_or(TrapKind::InputExhausted)?;
                self.stack.push(Value::int(value))?;
            }
            Instr::WriteInt => {
                let value = self.stack.pop()?;
                let n = self.int_operand(value)?;
                self.console.write_int(n);
                self.stack.push(Value::Empty)?;
            }
            Instr::Length => {
                let value = self.stack.pop()?;
                let handle = self
                    .heap
                    .aggregate(value)
                    .ok_or_else(|| TrapKind::TypeMismatch {
                        expected: "aggregate",
                        got: self.heap.kind_name(value),
                    })?;
                let len = self.heap.len(handle)?;
                self.stack.push(Value::int(len as i32))?;
            }
            Instr::Stringify => {
                let value = self.stack.pop()?;
                let rendered = self.heap.render(value);
                let result = self.heap.alloc_string(rendered.as_bytes(), self.stack.live());
                self.stack.push(result)?;
            }
            _ => return Err(TrapKind::Internal("non-builtin instruction dispatched here")),
        }
        Ok(())
    }

    /// Resolves a string-table name to its tag hash.
    fn tag_hash_at(&self, offset: u32) -> OpResult<i32> {
        let name = self.string_table(offset)?;
        tags::tag_hash(name).ok_or(TrapKind::BadTagName)
    }

    /// Pushes a match outcome as 1 or 0.
    fn push_flag(&mut self, matched: bool) -> OpResult<()> {
        self.stack.push(Value::int(matched as i32))
    }
}
