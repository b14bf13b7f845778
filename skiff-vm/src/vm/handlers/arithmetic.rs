// skiff-vm - Bytecode interpreter and ahead-of-time stack verifier for the skiff VM
// Copyright (c) 2025 Tom Waddington. MIT licensed.

//! Integer arithmetic, comparison and logic.

use skiff_bytefile::Instr;
use skiff_runtime::Value;

use crate::vm::error::{OpResult, TrapKind};
use crate::vm::VM;

impl VM<'_> {
    /// Binary operators. The right operand is on top; the left one is
    /// checked first so mixed-type traps name it.
    pub(crate) fn execute_arithmetic(&mut self, instr: Instr) -> OpResult<()> {
        let rhs = self.stack.pop()?;
        let lhs = self.stack.pop()?;

        // EQ accepts arbitrary operands; only two equal integers
        // compare equal.
        if matches!(instr, Instr::Eq) {
            let equal = match (lhs.as_int(), rhs.as_int()) {
                (Some(a), Some(b)) => a == b,
                _ => false,
            };
            self.stack.push(Value::int(equal as i32))?;
            return Ok(());
        }

        let a = self.int_operand(lhs)?;
        let b = self.int_operand(rhs)?;
        let result = match instr {
            Instr::Add => a.wrapping_add(b),
            Instr::Sub => a.wrapping_sub(b),
            Instr::Mul => a.wrapping_mul(b),
            Instr::Div => {
                if b == 0 {
                    return Err(TrapKind::DivisionByZero);
                }
                a.wrapping_div(b)
            }
            Instr::Mod => {
                if b == 0 {
                    return Err(TrapKind::DivisionByZero);
                }
                a.wrapping_rem(b)
            }
            Instr::Lt => (a < b) as i32,
            Instr::Le => (a <= b) as i32,
            Instr::Gt => (a > b) as i32,
            Instr::Ge => (a >= b) as i32,
            Instr::Ne => (a != b) as i32,
            Instr::And => (a != 0 && b != 0) as i32,
            Instr::Or => (a != 0 || b != 0) as i32,
            _ => return Err(TrapKind::Internal("non-arithmetic instruction dispatched here")),
        };
        self.stack.push(Value::int(result))?;
        Ok(())
    }
}
