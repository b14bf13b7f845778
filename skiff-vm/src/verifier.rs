// skiff-vm - Bytecode interpreter and ahead-of-time stack verifier for the skiff VM
// Copyright (c) 2025 Tom Waddington. MIT licensed.

//! Ahead-of-time verification of operand stack discipline.
//!
//! One forward abstract-interpretation pass over the code. Every
//! reachable instruction is assigned the operand depth the stack has
//! when it executes; every edge into an address must agree on that
//! depth, and every static operand is range-checked. A program that
//! verifies cannot underflow the shared stack or run it past its
//! capacity on any path the pass covered, so the interpreter's own
//! checks become a backstop instead of the only line of defense.
//!
//! Function bodies reached through `CLOSURE` alone are not traversed;
//! their targets are only checked structurally. The interpreter keeps
//! its runtime checks for exactly that reason.

use std::collections::HashMap;
use std::fmt;

use skiff_bytefile::{Bytefile, DecodeError, Instr, PublicSymbol, VarSpec};

use crate::vm::stack::MAX_STACK_SIZE;

/// Depth annotation of one code address.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Mark {
    Unvisited,
    /// Scheduled on the worklist with its entry depth.
    Scheduled(u32),
    /// Processed with this entry depth.
    Done(u32),
}

/// What verification learned about one function, keyed by the address
/// of its entry instruction.
pub type FrameLayouts = HashMap<u32, FrameLayout>;

/// Stack shape of one verified function.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FrameLayout {
    pub args: u32,
    pub locals: u32,
    /// Deepest operand stack the function's own code reaches, counted
    /// above its locals.
    pub max_depth: u32,
}

/// A successful verification: frame layouts plus the per-address
/// depth annotations.
#[derive(Debug, PartialEq)]
pub struct Verified {
    pub layouts: FrameLayouts,
    marks: Vec<Mark>,
}

impl Verified {
    /// Entry depth recorded for a reachable code address.
    pub fn entry_depth(&self, address: u32) -> Option<u32> {
        match self.marks.get(address as usize)? {
            Mark::Done(depth) => Some(*depth),
            _ => None,
        }
    }
}

/// Why verification rejected a program.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum VerifyError {
    /// The instruction stream is malformed.
    Decode { error: DecodeError },
    /// An instruction would pop more than the stack holds.
    Underflow { offset: u32 },
    /// The depth would exceed the stack capacity.
    Overflow { offset: u32 },
    /// Two paths reach the same address with different depths.
    MergeMismatch {
        offset: u32,
        recorded: u32,
        found: u32,
    },
    /// A jump, call or capture destination outside the code area.
    BadTarget { offset: u32, target: u32 },
    /// A call or closure destination that is not a function entry.
    TargetNotBegin { offset: u32, target: u32 },
    /// A static operand outside its table or frame area.
    OperandOutOfRange {
        offset: u32,
        what: &'static str,
        index: u32,
        limit: u32,
    },
    /// A negative count operand.
    NegativeCount { offset: u32, what: &'static str },
    /// The instruction's stack effect depends on runtime values.
    Unverifiable { offset: u32 },
    /// A public symbol pointing outside the code area.
    BadSymbol { index: usize, address: u32 },
}

impl fmt::Display for VerifyError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            VerifyError::Decode { error } => {
                write!(f, "{}. Bytecode offset: 0x{:x}", error, error.offset())
            }
            VerifyError::Underflow { offset } => {
                write!(f, "stack underflow. Bytecode offset: 0x{:x}", offset)
            }
            VerifyError::Overflow { offset } => {
                write!(f, "stack limit exceeded. Bytecode offset: 0x{:x}", offset)
            }
            VerifyError::MergeMismatch {
                offset,
                recorded,
                found,
            } => write!(
                f,
                "stack depth mismatch at merge point (recorded {}, found {}). \
                 Bytecode offset: 0x{:x}",
                recorded, found, offset
            ),
            VerifyError::BadTarget { offset, target } => write!(
                f,
                "invalid destination 0x{:x}. Bytecode offset: 0x{:x}",
                target, offset
            ),
            VerifyError::TargetNotBegin { offset, target } => write!(
                f,
                "destination 0x{:x} is not a function entry. Bytecode offset: 0x{:x}",
                target, offset
            ),
            VerifyError::OperandOutOfRange {
                offset,
                what,
                index,
                limit,
            } => write!(
                f,
                "{} index {} out of bounds (size {}). Bytecode offset: 0x{:x}",
                what, index, limit, offset
            ),
            VerifyError::NegativeCount { offset, what } => {
                write!(f, "negative {}. Bytecode offset: 0x{:x}", what, offset)
            }
            VerifyError::Unverifiable { offset } => write!(
                f,
                "STA cannot be verified statically. Bytecode offset: 0x{:x}",
                offset
            ),
            VerifyError::BadSymbol { index, address } => write!(
                f,
                "public symbol {} points outside the code area (0x{:x})",
                index, address
            ),
        }
    }
}

impl std::error::Error for VerifyError {}

/// Frame bookkeeping of the pass: the function whose body is being
/// traversed.
#[derive(Debug, Clone, Copy)]
struct FrameCtx {
    begin: u32,
    args: u32,
    locals: u32,
    max_depth: u32,
}

/// Worklist entries. `FrameExit` markers are pushed under a frame's
/// body so the body drains first; popping one closes the frame.
enum WorkItem {
    Instr(u32),
    FrameExit(FrameCtx),
}

struct Verifier<'a> {
    file: &'a Bytefile,
    marks: Vec<Mark>,
    work: Vec<WorkItem>,
    ctx: FrameCtx,
    layouts: FrameLayouts,
}

/// Verifies a loaded program, seeding the pass from every public
/// symbol.
pub fn verify(file: &Bytefile) -> Result<Verified, VerifyError> {
    let mut verifier = Verifier {
        file,
        marks: vec![Mark::Unvisited; file.code_size() as usize],
        work: Vec::new(),
        ctx: FrameCtx {
            begin: 0,
            args: 0,
            locals: 0,
            max_depth: 0,
        },
        layouts: HashMap::new(),
    };
    for (index, symbol) in file.symbols().iter().enumerate() {
        verifier.seed(index, symbol)?;
        verifier.drain()?;
    }
    Ok(Verified {
        layouts: verifier.layouts,
        marks: verifier.marks,
    })
}

impl<'a> Verifier<'a> {
    /// Schedules a public symbol's entry at depth zero.
    fn seed(&mut self, index: usize, symbol: &PublicSymbol) -> Result<(), VerifyError> {
        let address = symbol.address;
        if address >= self.file.code_size() {
            return Err(VerifyError::BadSymbol { index, address });
        }
        let (entry, _) = self.decode(address)?;
        if !entry.is_begin() {
            return Err(VerifyError::TargetNotBegin {
                offset: address,
                target: address,
            });
        }
        self.flow(address, address, 0)
    }

    /// Drains the worklist, processing instructions and closing
    /// frames as their bodies complete.
    fn drain(&mut self) -> Result<(), VerifyError> {
        while let Some(item) = self.work.pop() {
            match item {
                WorkItem::Instr(address) => self.step(address)?,
                WorkItem::FrameExit(outer) => {
                    self.layouts.insert(
                        self.ctx.begin,
                        FrameLayout {
                            args: self.ctx.args,
                            locals: self.ctx.locals,
                            max_depth: self.ctx.max_depth,
                        },
                    );
                    self.ctx = outer;
                }
            }
        }
        Ok(())
    }

    /// Records an edge into `target` carrying `depth`.
    fn flow(&mut self, from: u32, target: u32, depth: u32) -> Result<(), VerifyError> {
        if target >= self.file.code_size() {
            return Err(VerifyError::BadTarget {
                offset: from,
                target,
            });
        }
        match self.marks[target as usize] {
            Mark::Unvisited => {
                self.marks[target as usize] = Mark::Scheduled(depth);
                self.work.push(WorkItem::Instr(target));
                Ok(())
            }
            Mark::Scheduled(recorded) | Mark::Done(recorded) => {
                if recorded == depth {
                    Ok(())
                } else {
                    Err(VerifyError::MergeMismatch {
                        offset: target,
                        recorded,
                        found: depth,
                    })
                }
            }
        }
    }

    /// Processes one scheduled instruction.
    fn step(&mut self, address: u32) -> Result<(), VerifyError> {
        let entry = match self.marks[address as usize] {
            Mark::Scheduled(depth) => depth,
            // The worklist only ever holds scheduled addresses.
            Mark::Unvisited | Mark::Done(_) => return Ok(()),
        };
        self.marks[address as usize] = Mark::Done(entry);

        let (instr, size) = self.decode(address)?;

        self.check_static(address, &instr)?;

        let delta = instr
            .stack_effect()
            .ok_or(VerifyError::Unverifiable { offset: address })?;
        let after = entry as i64 + delta as i64;
        if after < 0 {
            return Err(VerifyError::Underflow { offset: address });
        }
        if after >= MAX_STACK_SIZE as i64 {
            return Err(VerifyError::Overflow { offset: address });
        }
        let after = after as u32;
        if after > self.ctx.max_depth {
            self.ctx.max_depth = after;
        }

        match instr {
            Instr::Begin { args, locals } | Instr::CBegin { args, locals } => {
                self.work.push(WorkItem::FrameExit(self.ctx));
                self.ctx = FrameCtx {
                    begin: address,
                    args: args as u32,
                    locals: locals as u32,
                    max_depth: after,
                };
                self.flow(address, address + size, after)?;
            }
            Instr::Jmp(target) => {
                self.flow(address, target, after)?;
            }
            Instr::CJmpZ(target) | Instr::CJmpNz(target) => {
                self.flow(address, target, after)?;
                self.flow(address, address + size, after)?;
            }
            // The callee starts its own accounting at depth zero; the
            // caller continues past the call site.
            Instr::Call { target, .. } => {
                self.flow(address, target, 0)?;
                self.flow(address, address + size, after)?;
            }
            Instr::End | Instr::Ret => {
                // Returning pops the frame's result.
                if entry == 0 {
                    return Err(VerifyError::Underflow { offset: address });
                }
            }
            Instr::Fail { .. } | Instr::Stop => {}
            _ => {
                self.flow(address, address + size, after)?;
            }
        }
        Ok(())
    }

    /// Range checks on static operands, before the depth bookkeeping.
    fn check_static(&self, address: u32, instr: &Instr) -> Result<(), VerifyError> {
        match instr {
            Instr::String(offset) => self.check_string(address, *offset),
            Instr::Sexp { tag, arity } => {
                self.check_string(address, *tag)?;
                self.check_count(address, *arity, "constructor arity")
            }
            Instr::Tag { name, arity } => {
                self.check_string(address, *name)?;
                self.check_count(address, *arity, "constructor arity")
            }
            Instr::Array { len } => self.check_count(address, *len, "array length"),
            Instr::MakeArray { len } => self.check_count(address, *len, "array length"),
            Instr::CallC { args } => self.check_count(address, *args, "argument count"),
            Instr::Begin { args, locals } | Instr::CBegin { args, locals } => {
                self.check_count(address, *args, "argument count")?;
                self.check_count(address, *locals, "local count")
            }
            Instr::Call { target, args } => {
                self.check_count(address, *args, "argument count")?;
                self.check_entry(address, *target, false)
            }
            Instr::Closure { target, captures } => {
                self.check_entry(address, *target, true)?;
                for &(spec, index) in captures {
                    self.check_slot(address, spec, index)?;
                }
                Ok(())
            }
            Instr::LdGlobal(index) | Instr::LdaGlobal(index) | Instr::StGlobal(index) => {
                self.check_slot(address, VarSpec::Global, *index)
            }
            Instr::LdLocal(index) | Instr::LdaLocal(index) | Instr::StLocal(index) => {
                self.check_slot(address, VarSpec::Local, *index)
            }
            Instr::LdArg(index) | Instr::LdaArg(index) | Instr::StArg(index) => {
                self.check_slot(address, VarSpec::Arg, *index)
            }
            _ => Ok(()),
        }
    }

    /// A call or closure destination must sit in the code area and
    /// decode to a function entry. Only closures may target `CBEGIN`.
    fn check_entry(&self, address: u32, target: u32, closure: bool) -> Result<(), VerifyError> {
        if target >= self.file.code_size() {
            return Err(VerifyError::BadTarget {
                offset: address,
                target,
            });
        }
        let valid = match self.decode(target) {
            Ok((Instr::Begin { .. }, _)) => true,
            Ok((Instr::CBegin { .. }, _)) => closure,
            _ => false,
        };
        if !valid {
            return Err(VerifyError::TargetNotBegin {
                offset: address,
                target,
            });
        }
        Ok(())
    }

    /// Frame-relative slot operands are checked against the current
    /// function's declared sizes. Capture indexes are only known at
    /// runtime.
    fn check_slot(&self, address: u32, spec: VarSpec, index: u32) -> Result<(), VerifyError> {
        let (what, limit) = match spec {
            VarSpec::Global => ("global", self.file.global_area_size()),
            VarSpec::Local => ("local", self.ctx.locals),
            VarSpec::Arg => ("argument", self.ctx.args),
            VarSpec::Capture => return Ok(()),
        };
        if index >= limit {
            return Err(VerifyError::OperandOutOfRange {
                offset: address,
                what,
                index,
                limit,
            });
        }
        Ok(())
    }

    fn check_string(&self, address: u32, offset: u32) -> Result<(), VerifyError> {
        let limit = self.file.string_table_size();
        if offset >= limit {
            return Err(VerifyError::OperandOutOfRange {
                offset: address,
                what: "string table",
                index: offset,
                limit,
            });
        }
        Ok(())
    }

    fn check_count(&self, address: u32, count: i32, what: &'static str) -> Result<(), VerifyError> {
        if count < 0 {
            return Err(VerifyError::NegativeCount {
                offset: address,
                what,
            });
        }
        Ok(())
    }

    fn decode(&self, address: u32) -> Result<(Instr, u32), VerifyError> {
        Instr::decode(self.file.code(), address).map_err(|error| VerifyError::Decode { error })
    }
}
