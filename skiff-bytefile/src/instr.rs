// skiff-bytefile - Bytecode container format and instruction set for the skiff VM
// Copyright (c) 2025 Tom Waddington. MIT licensed.

//! Decoded instructions with their operands read and sizes known.

use std::fmt;

use crate::error::DecodeError;
use crate::opcode::{Opcode, VarSpec};

/// A single decoded instruction.
///
/// Counts (arities, argument and frame sizes) are kept as the signed
/// values they are encoded as and validated by the consumers; addresses
/// and slot indexes are unsigned, so a negative encoding fails their
/// range checks instead of wrapping.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Instr {
    Add,
    Sub,
    Mul,
    Div,
    Mod,
    Lt,
    Le,
    Gt,
    Ge,
    Eq,
    Ne,
    And,
    Or,
    Const(i32),
    String(u32),
    Sexp { tag: u32, arity: i32 },
    Sti,
    Sta,
    Jmp(u32),
    End,
    Ret,
    Drop,
    Dup,
    Swap,
    Elem,
    LdGlobal(u32),
    LdLocal(u32),
    LdArg(u32),
    LdCapture(u32),
    LdaGlobal(u32),
    LdaLocal(u32),
    LdaArg(u32),
    LdaCapture(u32),
    StGlobal(u32),
    StLocal(u32),
    StArg(u32),
    StCapture(u32),
    CJmpZ(u32),
    CJmpNz(u32),
    Begin { args: i32, locals: i32 },
    CBegin { args: i32, locals: i32 },
    Closure { target: u32, captures: Vec<(VarSpec, u32)> },
    CallC { args: i32 },
    Call { target: u32, args: i32 },
    Tag { name: u32, arity: i32 },
    Array { len: i32 },
    Fail { line: u32, column: u32 },
    Line { number: u32 },
    PattStrEq,
    PattString,
    PattArray,
    PattSexp,
    PattRef,
    PattVal,
    PattFun,
    ReadInt,
    WriteInt,
    Length,
    Stringify,
    MakeArray { len: i32 },
    Stop,
}

struct Cursor<'a> {
    code: &'a [u8],
    pos: usize,
    start: u32,
}

impl<'a> Cursor<'a> {
    fn byte(&mut self) -> Result<u8, DecodeError> {
        let byte = self
            .code
            .get(self.pos)
            .copied()
            .ok_or(DecodeError::UnexpectedEnd { offset: self.start })?;
        self.pos += 1;
        Ok(byte)
    }

    fn word(&mut self) -> Result<u32, DecodeError> {
        let end = self
            .pos
            .checked_add(4)
            .filter(|&end| end <= self.code.len())
            .ok_or(DecodeError::UnexpectedEnd { offset: self.start })?;
        let mut buf = [0u8; 4];
        buf.copy_from_slice(&self.code[self.pos..end]);
        self.pos = end;
        Ok(u32::from_le_bytes(buf))
    }

    fn int(&mut self) -> Result<i32, DecodeError> {
        Ok(self.word()? as i32)
    }

    fn var_spec(&mut self) -> Result<VarSpec, DecodeError> {
        let byte = self.byte()?;
        VarSpec::from_byte(byte).ok_or(DecodeError::BadVarSpec {
            offset: self.start,
            byte,
        })
    }
}

impl Instr {
    /// Decodes the instruction starting at `offset`, returning it
    /// together with its encoded size.
    pub fn decode(code: &[u8], offset: u32) -> Result<(Instr, u32), DecodeError> {
        let mut c = Cursor {
            code,
            pos: offset as usize,
            start: offset,
        };
        let byte = c.byte()?;
        let op = Opcode::from_byte(byte).ok_or(DecodeError::UnknownOpcode { offset, byte })?;
        let instr = match op {
            Opcode::Add => Instr::Add,
            Opcode::Sub => Instr::Sub,
            Opcode::Mul => Instr::Mul,
            Opcode::Div => Instr::Div,
            Opcode::Mod => Instr::Mod,
            Opcode::Lt => Instr::Lt,
            Opcode::Le => Instr::Le,
            Opcode::Gt => Instr::Gt,
            Opcode::Ge => Instr::Ge,
            Opcode::Eq => Instr::Eq,
            Opcode::Ne => Instr::Ne,
            Opcode::And => Instr::And,
            Opcode::Or => Instr::Or,
            Opcode::Const => Instr::Const(c.int()?),
            Opcode::String => Instr::String(c.word()?),
            Opcode::Sexp => Instr::Sexp {
                tag: c.word()?,
                arity: c.int()?,
            },
            Opcode::Sti => Instr::Sti,
            Opcode::Sta => Instr::Sta,
            Opcode::Jmp => Instr::Jmp(c.word()?),
            Opcode::End => Instr::End,
            Opcode::Ret => Instr::Ret,
            Opcode::Drop => Instr::Drop,
            Opcode::Dup => Instr::Dup,
            Opcode::Swap => Instr::Swap,
            Opcode::Elem => Instr::Elem,
            Opcode::LdGlobal => Instr::LdGlobal(c.word()?),
            Opcode::LdLocal => Instr::LdLocal(c.word()?),
            Opcode::LdArg => Instr::LdArg(c.word()?),
            Opcode::LdCapture => Instr::LdCapture(c.word()?),
            Opcode::LdaGlobal => Instr::LdaGlobal(c.word()?),
            Opcode::LdaLocal => Instr::LdaLocal(c.word()?),
            Opcode::LdaArg => Instr::LdaArg(c.word()?),
            Opcode::LdaCapture => Instr::LdaCapture(c.word()?),
            Opcode::StGlobal => Instr::StGlobal(c.word()?),
            Opcode::StLocal => Instr::StLocal(c.word()?),
            Opcode::StArg => Instr::StArg(c.word()?),
            Opcode::StCapture => Instr::StCapture(c.word()?),
            Opcode::CJmpZ => Instr::CJmpZ(c.word()?),
            Opcode::CJmpNz => Instr::CJmpNz(c.word()?),
            Opcode::Begin => Instr::Begin {
                args: c.int()?,
                locals: c.int()?,
            },
            Opcode::CBegin => Instr::CBegin {
                args: c.int()?,
                locals: c.int()?,
            },
            Opcode::Closure => {
                let target = c.word()?;
                let count = c.int()?;
                if count < 0 {
                    return Err(DecodeError::BadCaptureCount { offset });
                }
                let mut captures = Vec::new();
                for _ in 0..count {
                    let spec = c.var_spec()?;
                    let index = c.word()?;
                    captures.push((spec, index));
                }
                Instr::Closure { target, captures }
            }
            Opcode::CallC => Instr::CallC { args: c.int()? },
            Opcode::Call => Instr::Call {
                target: c.word()?,
                args: c.int()?,
            },
            Opcode::Tag => Instr::Tag {
                name: c.word()?,
                arity: c.int()?,
            },
            Opcode::Array => Instr::Array { len: c.int()? },
            Opcode::Fail => Instr::Fail {
                line: c.word()?,
                column: c.word()?,
            },
            Opcode::Line => Instr::Line { number: c.word()? },
            Opcode::PattStrEq => Instr::PattStrEq,
            Opcode::PattString => Instr::PattString,
            Opcode::PattArray => Instr::PattArray,
            Opcode::PattSexp => Instr::PattSexp,
            Opcode::PattRef => Instr::PattRef,
            Opcode::PattVal => Instr::PattVal,
            Opcode::PattFun => Instr::PattFun,
            Opcode::ReadInt => Instr::ReadInt,
            Opcode::WriteInt => Instr::WriteInt,
            Opcode::Length => Instr::Length,
            Opcode::Stringify => Instr::Stringify,
            Opcode::MakeArray => Instr::MakeArray { len: c.int()? },
            Opcode::Stop => Instr::Stop,
        };
        Ok((instr, (c.pos - offset as usize) as u32))
    }

    /// The opcode this instruction encodes to.
    pub fn opcode(&self) -> Opcode {
        match self {
            Instr::Add => Opcode::Add,
            Instr::Sub => Opcode::Sub,
            Instr::Mul => Opcode::Mul,
            Instr::Div => Opcode::Div,
            Instr::Mod => Opcode::Mod,
            Instr::Lt => Opcode::Lt,
            Instr::Le => Opcode::Le,
            Instr::Gt => Opcode::Gt,
            Instr::Ge => Opcode::Ge,
            Instr::Eq => Opcode::Eq,
            Instr::Ne => Opcode::Ne,
            Instr::And => Opcode::And,
            Instr::Or => Opcode::Or,
            Instr::Const(_) => Opcode::Const,
            Instr::String(_) => Opcode::String,
            Instr::Sexp { .. } => Opcode::Sexp,
            Instr::Sti => Opcode::Sti,
            Instr::Sta => Opcode::Sta,
            Instr::Jmp(_) => Opcode::Jmp,
            Instr::End => Opcode::End,
            Instr::Ret => Opcode::Ret,
            Instr::Drop => Opcode::Drop,
            Instr::Dup => Opcode::Dup,
            Instr::Swap => Opcode::Swap,
            Instr::Elem => Opcode::Elem,
            Instr::LdGlobal(_) => Opcode::LdGlobal,
            Instr::LdLocal(_) => Opcode::LdLocal,
            Instr::LdArg(_) => Opcode::LdArg,
            Instr::LdCapture(_) => Opcode::LdCapture,
            Instr::LdaGlobal(_) => Opcode::LdaGlobal,
            Instr::LdaLocal(_) => Opcode::LdaLocal,
            Instr::LdaArg(_) => Opcode::LdaArg,
            Instr::LdaCapture(_) => Opcode::LdaCapture,
            Instr::StGlobal(_) => Opcode::StGlobal,
            Instr::StLocal(_) => Opcode::StLocal,
            Instr::StArg(_) => Opcode::StArg,
            Instr::StCapture(_) => Opcode::StCapture,
            Instr::CJmpZ(_) => Opcode::CJmpZ,
            Instr::CJmpNz(_) => Opcode::CJmpNz,
            Instr::Begin { .. } => Opcode::Begin,
            Instr::CBegin { .. } => Opcode::CBegin,
            Instr::Closure { .. } => Opcode::Closure,
            Instr::CallC { .. } => Opcode::CallC,
            Instr::Call { .. } => Opcode::Call,
            Instr::Tag { .. } => Opcode::Tag,
            Instr::Array { .. } => Opcode::Array,
            Instr::Fail { .. } => Opcode::Fail,
            Instr::Line { .. } => Opcode::Line,
            Instr::PattStrEq => Opcode::PattStrEq,
            Instr::PattString => Opcode::PattString,
            Instr::PattArray => Opcode::PattArray,
            Instr::PattSexp => Opcode::PattSexp,
            Instr::PattRef => Opcode::PattRef,
            Instr::PattVal => Opcode::PattVal,
            Instr::PattFun => Opcode::PattFun,
            Instr::ReadInt => Opcode::ReadInt,
            Instr::WriteInt => Opcode::WriteInt,
            Instr::Length => Opcode::Length,
            Instr::Stringify => Opcode::Stringify,
            Instr::MakeArray { .. } => Opcode::MakeArray,
            Instr::Stop => Opcode::Stop,
        }
    }

    /// Encoded size in bytes.
    pub fn size(&self) -> u32 {
        match self {
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
            | Instr::Or
            | Instr::Sti
            | Instr::Sta
            | Instr::End
            | Instr::Ret
            | Instr::Drop
            | Instr::Dup
            | Instr::Swap
            | Instr::Elem
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
            | Instr::Stop => 1,
            Instr::Const(_)
            | Instr::String(_)
            | Instr::Jmp(_)
            | Instr::CJmpZ(_)
            | Instr::CJmpNz(_)
            | Instr::LdGlobal(_)
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
            | Instr::CallC { .. }
            | Instr::Array { .. }
            | Instr::Line { .. }
            | Instr::MakeArray { .. } => 5,
            Instr::Sexp { .. }
            | Instr::Begin { .. }
            | Instr::CBegin { .. }
            | Instr::Call { .. }
            | Instr::Tag { .. }
            | Instr::Fail { .. } => 9,
            Instr::Closure { captures, .. } => 9 + 5 * captures.len() as u32,
        }
    }

    /// Appends the encoded form to `out`.
    pub fn encode(&self, out: &mut Vec<u8>) {
        out.push(self.opcode().byte());
        match self {
            Instr::Const(n) => out.extend_from_slice(&n.to_le_bytes()),
            Instr::String(offset) => out.extend_from_slice(&offset.to_le_bytes()),
            Instr::Sexp { tag, arity } => {
                out.extend_from_slice(&tag.to_le_bytes());
                out.extend_from_slice(&arity.to_le_bytes());
            }
            Instr::Jmp(target) | Instr::CJmpZ(target) | Instr::CJmpNz(target) => {
                out.extend_from_slice(&target.to_le_bytes());
            }
            Instr::LdGlobal(index)
            | Instr::LdLocal(index)
            | Instr::LdArg(index)
            | Instr::LdCapture(index)
            | Instr::LdaGlobal(index)
            | Instr::LdaLocal(index)
            | Instr::LdaArg(index)
            | Instr::LdaCapture(index)
            | Instr::StGlobal(index)
            | Instr::StLocal(index)
            | Instr::StArg(index)
            | Instr::StCapture(index) => out.extend_from_slice(&index.to_le_bytes()),
            Instr::Begin { args, locals } | Instr::CBegin { args, locals } => {
                out.extend_from_slice(&args.to_le_bytes());
                out.extend_from_slice(&locals.to_le_bytes());
            }
            Instr::Closure { target, captures } => {
                out.extend_from_slice(&target.to_le_bytes());
                out.extend_from_slice(&(captures.len() as i32).to_le_bytes());
                for (spec, index) in captures {
                    out.push(spec.byte());
                    out.extend_from_slice(&index.to_le_bytes());
                }
            }
            Instr::CallC { args } => out.extend_from_slice(&args.to_le_bytes()),
            Instr::Call { target, args } => {
                out.extend_from_slice(&target.to_le_bytes());
                out.extend_from_slice(&args.to_le_bytes());
            }
            Instr::Tag { name, arity } => {
                out.extend_from_slice(&name.to_le_bytes());
                out.extend_from_slice(&arity.to_le_bytes());
            }
            Instr::Array { len } => out.extend_from_slice(&len.to_le_bytes()),
            Instr::Fail { line, column } => {
                out.extend_from_slice(&line.to_le_bytes());
                out.extend_from_slice(&column.to_le_bytes());
            }
            Instr::Line { number } => out.extend_from_slice(&number.to_le_bytes()),
            Instr::MakeArray { len } => out.extend_from_slice(&len.to_le_bytes()),
            _ => {}
        }
    }

    /// Net operand-stack effect, grouped by how each instruction moves
    /// the stack. `None` for `Sta`, whose effect depends on the selector
    /// it finds at runtime.
    ///
    /// `Closure` counts one slot per capture operand plus the closure
    /// itself; the depth checker enforces this accounting even though
    /// the interpreter pushes a single closure value.
    pub fn stack_effect(&self) -> Option<i32> {
        let effect = match self {
            // Pop two, push one.
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
            | Instr::Or
            | Instr::Sti
            | Instr::Drop
            | Instr::Elem
            | Instr::CJmpZ(_)
            | Instr::CJmpNz(_)
            | Instr::Fail { .. }
            | Instr::PattStrEq => -1,
            // Push one.
            Instr::Const(_)
            | Instr::String(_)
            | Instr::Dup
            | Instr::LdGlobal(_)
            | Instr::LdLocal(_)
            | Instr::LdArg(_)
            | Instr::LdCapture(_)
            | Instr::LdaGlobal(_)
            | Instr::LdaLocal(_)
            | Instr::LdaArg(_)
            | Instr::LdaCapture(_)
            | Instr::ReadInt => 1,
            // No net movement.
            Instr::Jmp(_)
            | Instr::End
            | Instr::Ret
            | Instr::Swap
            | Instr::StGlobal(_)
            | Instr::StLocal(_)
            | Instr::StArg(_)
            | Instr::StCapture(_)
            | Instr::Begin { .. }
            | Instr::CBegin { .. }
            | Instr::Tag { .. }
            | Instr::Array { .. }
            | Instr::Line { .. }
            | Instr::PattString
            | Instr::PattArray
            | Instr::PattSexp
            | Instr::PattRef
            | Instr::PattVal
            | Instr::PattFun
            | Instr::WriteInt
            | Instr::Length
            | Instr::Stringify
            | Instr::Stop => 0,
            // Pop a counted group, push the result.
            Instr::Sexp { arity, .. } => 1i32.saturating_sub(*arity),
            Instr::Call { args, .. } => 1i32.saturating_sub(*args),
            Instr::MakeArray { len } => 1i32.saturating_sub(*len),
            Instr::CallC { args } => args.saturating_neg(),
            Instr::Closure { captures, .. } => captures.len() as i32 + 1,
            Instr::Sta => return None,
        };
        Some(effect)
    }

    /// Whether execution can continue at the next address.
    pub fn falls_through(&self) -> bool {
        !matches!(
            self,
            Instr::Jmp(_) | Instr::End | Instr::Ret | Instr::Fail { .. } | Instr::Stop
        )
    }

    /// Whether this instruction opens a call frame.
    pub fn is_begin(&self) -> bool {
        matches!(self, Instr::Begin { .. } | Instr::CBegin { .. })
    }

    /// Whether this instruction transfers control into a function.
    pub fn is_call(&self) -> bool {
        matches!(self, Instr::Call { .. } | Instr::CallC { .. })
    }
}

impl fmt::Display for Instr {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Instr::Add => f.write_str("ADD"),
            Instr::Sub => f.write_str("SUB"),
            Instr::Mul => f.write_str("MUL"),
            Instr::Div => f.write_str("DIV"),
            Instr::Mod => f.write_str("MOD"),
            Instr::Lt => f.write_str("LT"),
            Instr::Le => f.write_str("LE"),
            Instr::Gt => f.write_str("GT"),
            Instr::Ge => f.write_str("GE"),
            Instr::Eq => f.write_str("EQ"),
            Instr::Ne => f.write_str("NE"),
            Instr::And => f.write_str("AND"),
            Instr::Or => f.write_str("OR"),
            Instr::Const(n) => write!(f, "CONST {}", n),
            Instr::String(offset) => write!(f, "STRING {}", offset),
            Instr::Sexp { tag, arity } => write!(f, "SEXP {} {}", tag, arity),
            Instr::Sti => f.write_str("STI"),
            Instr::Sta => f.write_str("STA"),
            Instr::Jmp(target) => write!(f, "JMP 0x{:x}", target),
            Instr::End => f.write_str("END"),
            Instr::Ret => f.write_str("RET"),
            Instr::Drop => f.write_str("DROP"),
            Instr::Dup => f.write_str("DUP"),
            Instr::Swap => f.write_str("SWAP"),
            Instr::Elem => f.write_str("ELEM"),
            Instr::LdGlobal(i) => write!(f, "LD G({})", i),
            Instr::LdLocal(i) => write!(f, "LD L({})", i),
            Instr::LdArg(i) => write!(f, "LD A({})", i),
            Instr::LdCapture(i) => write!(f, "LD C({})", i),
            Instr::LdaGlobal(i) => write!(f, "LDA G({})", i),
            Instr::LdaLocal(i) => write!(f, "LDA L({})", i),
            Instr::LdaArg(i) => write!(f, "LDA A({})", i),
            Instr::LdaCapture(i) => write!(f, "LDA C({})", i),
            Instr::StGlobal(i) => write!(f, "ST G({})", i),
            Instr::StLocal(i) => write!(f, "ST L({})", i),
            Instr::StArg(i) => write!(f, "ST A({})", i),
            Instr::StCapture(i) => write!(f, "ST C({})", i),
            Instr::CJmpZ(target) => write!(f, "CJMPZ 0x{:x}", target),
            Instr::CJmpNz(target) => write!(f, "CJMPNZ 0x{:x}", target),
            Instr::Begin { args, locals } => write!(f, "BEGIN {} {}", args, locals),
            Instr::CBegin { args, locals } => write!(f, "CBEGIN {} {}", args, locals),
            Instr::Closure { target, captures } => {
                write!(f, "CLOSURE 0x{:x}", target)?;
                for (spec, index) in captures {
                    write!(f, " {}({})", spec, index)?;
                }
                Ok(())
            }
            Instr::CallC { args } => write!(f, "CALLC {}", args),
            Instr::Call { target, args } => write!(f, "CALL 0x{:x} {}", target, args),
            Instr::Tag { name, arity } => write!(f, "TAG {} {}", name, arity),
            Instr::Array { len } => write!(f, "ARRAY {}", len),
            Instr::Fail { line, column } => write!(f, "FAIL {} {}", line, column),
            Instr::Line { number } => write!(f, "LINE {}", number),
            Instr::PattStrEq => f.write_str("PATT =str"),
            Instr::PattString => f.write_str("PATT #string"),
            Instr::PattArray => f.write_str("PATT #array"),
            Instr::PattSexp => f.write_str("PATT #sexp"),
            Instr::PattRef => f.write_str("PATT #ref"),
            Instr::PattVal => f.write_str("PATT #val"),
            Instr::PattFun => f.write_str("PATT #fun"),
            Instr::ReadInt => f.write_str("CALL read"),
            Instr::WriteInt => f.write_str("CALL write"),
            Instr::Length => f.write_str("CALL length"),
            Instr::Stringify => f.write_str("CALL string"),
            Instr::MakeArray { len } => write!(f, "CALL array {}", len),
            Instr::Stop => f.write_str("STOP"),
        }
    }
}
