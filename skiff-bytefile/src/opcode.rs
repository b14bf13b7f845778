// skiff-bytefile - Bytecode container format and instruction set for the skiff VM
// Copyright (c) 2025 Tom Waddington. MIT licensed.

//! Raw opcode bytes and variable designators of the wire format.

use std::fmt;

/// First byte of an encoded instruction.
///
/// An instruction is one opcode byte followed by zero or more
/// little-endian 32-bit operands. Variable designators occupy a single
/// byte, and `Closure` carries a variable-length capture list.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u8)]
pub enum Opcode {
    /// Pop two integers, push their sum.
    Add = 0x01,
    /// Pop two integers, push their difference.
    Sub = 0x02,
    /// Pop two integers, push their product.
    Mul = 0x03,
    /// Pop two integers, push their quotient. Traps on zero divisor.
    Div = 0x04,
    /// Pop two integers, push their remainder. Traps on zero divisor.
    Mod = 0x05,
    /// Pop two integers, push 1 if the left is less, else 0.
    Lt = 0x06,
    /// Pop two integers, push 1 if the left is less or equal, else 0.
    Le = 0x07,
    /// Pop two integers, push 1 if the left is greater, else 0.
    Gt = 0x08,
    /// Pop two integers, push 1 if the left is greater or equal, else 0.
    Ge = 0x09,
    /// Pop two values, push 1 if both are equal integers, else 0.
    Eq = 0x0A,
    /// Pop two integers, push 1 if they differ, else 0.
    Ne = 0x0B,
    /// Pop two integers, push 1 if both are non-zero, else 0.
    And = 0x0C,
    /// Pop two integers, push 1 if either is non-zero, else 0.
    Or = 0x0D,
    /// Operand `n`: push the integer `n`.
    Const = 0x10,
    /// Operand `s`: push a fresh heap string copied from table offset `s`.
    String = 0x11,
    /// Operands `t`, `n`: pop `n` values, push an s-expression tagged by
    /// the name at table offset `t`.
    Sexp = 0x12,
    /// Pop a location, pop a value, store through the location, push the
    /// value back.
    Sti = 0x13,
    /// Pop a value and a selector; store through a location selector, or
    /// pop an aggregate and set its element at an integer selector.
    Sta = 0x14,
    /// Operand `a`: continue at code address `a`.
    Jmp = 0x15,
    /// Return from the current frame, or halt when it is the last one.
    End = 0x16,
    /// Same as `End`.
    Ret = 0x17,
    /// Pop and discard the top of the stack.
    Drop = 0x18,
    /// Push a copy of the top of the stack.
    Dup = 0x19,
    /// Exchange the two topmost values.
    Swap = 0x1A,
    /// Pop an integer index, pop an aggregate, push the indexed element.
    Elem = 0x1B,
    /// Operand `i`: push global `i`.
    LdGlobal = 0x20,
    /// Operand `i`: push local `i` of the current frame.
    LdLocal = 0x21,
    /// Operand `i`: push argument `i` of the current frame.
    LdArg = 0x22,
    /// Operand `i`: push captured slot `i` of the current closure.
    LdCapture = 0x23,
    /// Operand `i`: push a location designating global `i`.
    LdaGlobal = 0x30,
    /// Operand `i`: push a location designating local `i`.
    LdaLocal = 0x31,
    /// Operand `i`: push a location designating argument `i`.
    LdaArg = 0x32,
    /// Operand `i`: push a location designating captured slot `i`.
    LdaCapture = 0x33,
    /// Operand `i`: store the top of the stack into global `i`.
    StGlobal = 0x40,
    /// Operand `i`: store the top of the stack into local `i`.
    StLocal = 0x41,
    /// Operand `i`: store the top of the stack into argument `i`.
    StArg = 0x42,
    /// Operand `i`: store the top of the stack into captured slot `i`.
    StCapture = 0x43,
    /// Operand `a`: pop an integer, jump to `a` when it is zero.
    CJmpZ = 0x50,
    /// Operand `a`: pop an integer, jump to `a` when it is non-zero.
    CJmpNz = 0x51,
    /// Operands `args`, `locals`: open a plain call frame.
    Begin = 0x52,
    /// Operands `args`, `locals`: open a closure call frame.
    CBegin = 0x53,
    /// Operands `a`, `k`, then `k` designator/index pairs: push a closure
    /// over code address `a` capturing the designated slots.
    Closure = 0x54,
    /// Operand `n`: call the closure found under `n` arguments.
    CallC = 0x55,
    /// Operands `a`, `n`: call the function at code address `a`.
    Call = 0x56,
    /// Operands `t`, `n`: pop a value, push 1 if it is an s-expression
    /// with the tag named at offset `t` and exactly `n` elements.
    Tag = 0x57,
    /// Operand `n`: pop a value, push 1 if it is an array of length `n`.
    Array = 0x58,
    /// Operands `line`, `col`: pop the scrutinee and abort with a
    /// match-failure report.
    Fail = 0x59,
    /// Operand `n`: record `n` as the current source line.
    Line = 0x5A,
    /// Pop a pattern string and a scrutinee, push 1 on content equality.
    PattStrEq = 0x60,
    /// Pop a value, push 1 if it is a heap string.
    PattString = 0x61,
    /// Pop a value, push 1 if it is an array.
    PattArray = 0x62,
    /// Pop a value, push 1 if it is an s-expression.
    PattSexp = 0x63,
    /// Pop a value, push 1 if it is a reference.
    PattRef = 0x64,
    /// Pop a value, push 1 if it is an integer.
    PattVal = 0x65,
    /// Pop a value, push 1 if it is a closure.
    PattFun = 0x66,
    /// Read an integer from the console, push it.
    ReadInt = 0x70,
    /// Pop an integer, write it to the console, push the empty value.
    WriteInt = 0x71,
    /// Pop an aggregate, push its length.
    Length = 0x72,
    /// Pop any value, push its rendering as a heap string.
    Stringify = 0x73,
    /// Operand `n`: pop `n` values, push an array of them.
    MakeArray = 0x74,
    /// Halt normally, leaving the stack as it is.
    Stop = 0xF0,
}

impl Opcode {
    /// Decodes a raw byte, `None` when it is not a known opcode.
    pub fn from_byte(byte: u8) -> Option<Opcode> {
        let op = match byte {
            0x01 => Opcode::Add,
            0x02 => Opcode::Sub,
            0x03 => Opcode::Mul,
            0x04 => Opcode::Div,
            0x05 => Opcode::Mod,
            0x06 => Opcode::Lt,
            0x07 => Opcode::Le,
            0x08 => Opcode::Gt,
            0x09 => Opcode::Ge,
            0x0A => Opcode::Eq,
            0x0B => Opcode::Ne,
            0x0C => Opcode::And,
            0x0D => Opcode::Or,
            0x10 => Opcode::Const,
            0x11 => Opcode::String,
            0x12 => Opcode::Sexp,
            0x13 => Opcode::Sti,
            0x14 => Opcode::Sta,
            0x15 => Opcode::Jmp,
            0x16 => Opcode::End,
            0x17 => Opcode::Ret,
            0x18 => Opcode::Drop,
            0x19 => Opcode::Dup,
            0x1A => Opcode::Swap,
            0x1B => Opcode::Elem,
            0x20 => Opcode::LdGlobal,
            0x21 => Opcode::LdLocal,
            0x22 => Opcode::LdArg,
            0x23 => Opcode::LdCapture,
            0x30 => Opcode::LdaGlobal,
            0x31 => Opcode::LdaLocal,
            0x32 => Opcode::LdaArg,
            0x33 => Opcode::LdaCapture,
            0x40 => Opcode::StGlobal,
            0x41 => Opcode::StLocal,
            0x42 => Opcode::StArg,
            0x43 => Opcode::StCapture,
            0x50 => Opcode::CJmpZ,
            0x51 => Opcode::CJmpNz,
            0x52 => Opcode::Begin,
            0x53 => Opcode::CBegin,
            0x54 => Opcode::Closure,
            0x55 => Opcode::CallC,
            0x56 => Opcode::Call,
            0x57 => Opcode::Tag,
            0x58 => Opcode::Array,
            0x59 => Opcode::Fail,
            0x5A => Opcode::Line,
            0x60 => Opcode::PattStrEq,
            0x61 => Opcode::PattString,
            0x62 => Opcode::PattArray,
            0x63 => Opcode::PattSexp,
            0x64 => Opcode::PattRef,
            0x65 => Opcode::PattVal,
            0x66 => Opcode::PattFun,
            0x70 => Opcode::ReadInt,
            0x71 => Opcode::WriteInt,
            0x72 => Opcode::Length,
            0x73 => Opcode::Stringify,
            0x74 => Opcode::MakeArray,
            0xF0 => Opcode::Stop,
            _ => return None,
        };
        Some(op)
    }

    /// The encoded byte value.
    pub fn byte(self) -> u8 {
        self as u8
    }
}

/// Storage class selector carried by variable access instructions and
/// closure capture lists.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u8)]
pub enum VarSpec {
    /// A global slot at the bottom of the shared stack.
    Global = 0x00,
    /// A local slot of the current frame.
    Local = 0x01,
    /// An argument slot of the current frame.
    Arg = 0x02,
    /// A captured slot of the current closure.
    Capture = 0x03,
}

impl VarSpec {
    /// Decodes a designator byte, `None` when it is out of range.
    pub fn from_byte(byte: u8) -> Option<VarSpec> {
        match byte {
            0x00 => Some(VarSpec::Global),
            0x01 => Some(VarSpec::Local),
            0x02 => Some(VarSpec::Arg),
            0x03 => Some(VarSpec::Capture),
            _ => None,
        }
    }

    /// The encoded byte value.
    pub fn byte(self) -> u8 {
        self as u8
    }
}

impl fmt::Display for VarSpec {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let letter = match self {
            VarSpec::Global => "G",
            VarSpec::Local => "L",
            VarSpec::Arg => "A",
            VarSpec::Capture => "C",
        };
        f.write_str(letter)
    }
}
