// skiff - A bytecode virtual machine with ahead-of-time stack verification
// Copyright (c) 2025 Tom Waddington. MIT licensed.

//! Frequency mining of one- and two-instruction sequences.
//!
//! Marks every instruction reachable from the public symbols, then
//! walks the reachable code in address order counting each instruction
//! and each adjacent pair that executes as a unit. A pair is skipped
//! when the first instruction is a call (the callee runs in between)
//! or when the second is a join point (control can enter it from
//! elsewhere). Sequences are merged by their encoded bytes.

use std::collections::HashMap;
use std::fmt;

use skiff_bytefile::{Bytefile, DecodeError, Instr};

/// Errors raised while walking the code area.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IdiomError {
    /// An instruction failed to decode.
    Decode(DecodeError),
    /// A public symbol points outside the code area.
    BadSymbol { index: usize, address: u32 },
    /// A jump or call destination is outside the code area.
    BadTarget { offset: u32, target: u32 },
}

impl fmt::Display for IdiomError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            IdiomError::Decode(error) => {
                write!(f, "{}. Bytecode offset: 0x{:x}", error, error.offset())
            }
            IdiomError::BadSymbol { index, address } => {
                write!(
                    f,
                    "public symbol {} points outside the code area (0x{:x})",
                    index, address
                )
            }
            IdiomError::BadTarget { offset, target } => {
                write!(
                    f,
                    "invalid destination 0x{:x}. Bytecode offset: 0x{:x}",
                    target, offset
                )
            }
        }
    }
}

impl std::error::Error for IdiomError {}

impl From<DecodeError> for IdiomError {
    fn from(error: DecodeError) -> IdiomError {
        IdiomError::Decode(error)
    }
}

/// One mined sequence and how often it occurred.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IdiomCount {
    /// The decoded sequence, one or two instructions long.
    pub instrs: Vec<Instr>,
    /// Its encoded bytes, the identity sequences are merged by.
    pub bytes: Vec<u8>,
    /// Occurrences across the reachable code.
    pub count: u64,
}

impl fmt::Display for IdiomCount {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.count)?;
        let mut sep = " ";
        for instr in &self.instrs {
            write!(f, "{}{}", sep, instr)?;
            sep = "; ";
        }
        Ok(())
    }
}

struct Reach {
    /// Instruction starts reachable from some public symbol.
    reachable: Vec<bool>,
    /// Addresses control can enter sideways: symbol entries and
    /// jump/call destinations.
    join: Vec<bool>,
}

/// Mines the program and returns its sequences sorted by frequency,
/// most frequent first; ties go to the shorter sequence, then to the
/// lexicographically smaller encoding.
pub fn mine(file: &Bytefile) -> Result<Vec<IdiomCount>, IdiomError> {
    let reach = reach(file)?;
    let mut frequency: HashMap<Vec<u8>, Tally> = HashMap::new();

    let mut addr = 0;
    while addr < file.code_size() {
        if !reach.reachable[addr as usize] {
            addr += 1;
            continue;
        }
        let (instr, size) = Instr::decode(file.code(), addr)?;
        let end = addr + size;
        record(&mut frequency, slice(file, addr, end), &[instr.clone()]);
        if !instr.is_call()
            && instr.falls_through()
            && reach.reachable[end as usize]
            && !reach.join[end as usize]
        {
            let (next, next_size) = Instr::decode(file.code(), end)?;
            record(
                &mut frequency,
                slice(file, addr, end + next_size),
                &[instr, next],
            );
        }
        addr = end;
    }

    let mut idioms: Vec<IdiomCount> = frequency
        .into_iter()
        .map(|(bytes, tally)| IdiomCount {
            instrs: tally.instrs,
            bytes,
            count: tally.count,
        })
        .collect();
    idioms.sort_by(|a, b| {
        b.count
            .cmp(&a.count)
            .then(a.instrs.len().cmp(&b.instrs.len()))
            .then_with(|| a.bytes.cmp(&b.bytes))
    });
    Ok(idioms)
}

/// Marks the instructions reachable from every public symbol.
///
/// `CALLC` carries an argument count, not a destination, and `CLOSURE`
/// targets are only ever entered through a closure value, so neither
/// contributes an edge here; a body reached solely through closures is
/// left out of the counts.
fn reach(file: &Bytefile) -> Result<Reach, IdiomError> {
    let size = file.code_size() as usize;
    let mut reach = Reach {
        reachable: vec![false; size],
        join: vec![false; size],
    };
    let mut workset = Vec::new();

    for (index, symbol) in file.symbols().iter().enumerate() {
        if symbol.address >= file.code_size() {
            return Err(IdiomError::BadSymbol {
                index,
                address: symbol.address,
            });
        }
        if !reach.reachable[symbol.address as usize] {
            reach.reachable[symbol.address as usize] = true;
            reach.join[symbol.address as usize] = true;
            workset.push(symbol.address);
        }
    }

    while let Some(addr) = workset.pop() {
        let (instr, size) = Instr::decode(file.code(), addr)?;
        let target = match instr {
            Instr::Jmp(target) | Instr::CJmpZ(target) | Instr::CJmpNz(target) => Some(target),
            Instr::Call { target, .. } => Some(target),
            _ => None,
        };
        if let Some(target) = target {
            if target >= file.code_size() {
                return Err(IdiomError::BadTarget {
                    offset: addr,
                    target,
                });
            }
            reach.join[target as usize] = true;
            if !reach.reachable[target as usize] {
                reach.reachable[target as usize] = true;
                workset.push(target);
            }
        }
        if instr.falls_through() {
            let next = addr + size;
            if next >= file.code_size() {
                return Err(DecodeError::UnexpectedEnd { offset: next }.into());
            }
            if !reach.reachable[next as usize] {
                reach.reachable[next as usize] = true;
                workset.push(next);
            }
        }
    }
    Ok(reach)
}

struct Tally {
    instrs: Vec<Instr>,
    count: u64,
}

fn record(frequency: &mut HashMap<Vec<u8>, Tally>, bytes: &[u8], instrs: &[Instr]) {
    match frequency.get_mut(bytes) {
        Some(tally) => tally.count += 1,
        None => {
            frequency.insert(
                bytes.to_vec(),
                Tally {
                    instrs: instrs.to_vec(),
                    count: 1,
                },
            );
        }
    }
}

fn slice(file: &Bytefile, start: u32, end: u32) -> &[u8] {
    &file.code()[start as usize..end as usize]
}

#[cfg(test)]
mod tests {
    use super::*;

    fn emit(instrs: &[Instr]) -> Vec<u8> {
        let mut code = Vec::new();
        for instr in instrs {
            instr.encode(&mut code);
        }
        code
    }

    fn build_file(symbols: &[(&str, u32)], code: &[u8]) -> Bytefile {
        let mut strings = Vec::new();
        let mut table = Vec::new();
        for (name, address) in symbols {
            table.push((strings.len() as u32, *address));
            strings.extend_from_slice(name.as_bytes());
            strings.push(0);
        }
        let mut bytes = Vec::new();
        bytes.extend_from_slice(&(strings.len() as u32).to_le_bytes());
        bytes.extend_from_slice(&0u32.to_le_bytes());
        bytes.extend_from_slice(&(symbols.len() as u32).to_le_bytes());
        for (offset, address) in table {
            bytes.extend_from_slice(&offset.to_le_bytes());
            bytes.extend_from_slice(&address.to_le_bytes());
        }
        bytes.extend_from_slice(&strings);
        bytes.extend_from_slice(code);
        Bytefile::parse("test.sbc", &bytes).expect("container builds")
    }

    fn lines(file: &Bytefile) -> Vec<String> {
        mine(file)
            .expect("mines")
            .iter()
            .map(|idiom| idiom.to_string())
            .collect()
    }

    #[test]
    fn repeated_sequences_merge_and_sort_first() {
        let file = build_file(
            &[("main", 0)],
            &emit(&[
                Instr::Const(7),
                Instr::WriteInt,
                Instr::Const(7),
                Instr::WriteInt,
                Instr::Stop,
            ]),
        );
        assert_eq!(
            lines(&file),
            [
                "2 CONST 7",
                "2 CALL write",
                "2 CONST 7; CALL write",
                "1 STOP",
                "1 CALL write; CONST 7",
                "1 CALL write; STOP",
            ]
        );
    }

    #[test]
    fn unreachable_code_is_not_counted() {
        let file = build_file(
            &[("main", 0)],
            &emit(&[Instr::Jmp(10), Instr::Const(99), Instr::Stop]),
        );
        assert_eq!(lines(&file), ["1 JMP 0xa", "1 STOP"]);
    }

    #[test]
    fn join_points_break_pairs() {
        // CJMPZ targets the STOP, which is also fallen into.
        let file = build_file(
            &[("main", 0)],
            &emit(&[
                Instr::Const(0),
                Instr::CJmpZ(15),
                Instr::Const(1),
                Instr::Stop,
            ]),
        );
        assert_eq!(
            lines(&file),
            [
                "1 CONST 0",
                "1 CONST 1",
                "1 CJMPZ 0xf",
                "1 STOP",
                "1 CONST 0; CJMPZ 0xf",
                "1 CJMPZ 0xf; CONST 1",
            ]
        );
    }

    #[test]
    fn callc_and_closure_operands_are_not_destinations() {
        // Were CALLC's argument count read as an address, offset 1
        // (inside BEGIN's operands) would be counted as code; were
        // CLOSURE's target followed, the CBEGIN body would appear.
        let file = build_file(
            &[("main", 0)],
            &emit(&[
                Instr::Begin { args: 2, locals: 0 },
                Instr::Closure {
                    target: 24,
                    captures: vec![],
                },
                Instr::CallC { args: 1 },
                Instr::Stop,
                Instr::CBegin { args: 1, locals: 0 },
                Instr::End,
            ]),
        );
        assert_eq!(
            lines(&file),
            [
                "1 BEGIN 2 0",
                "1 CLOSURE 0x18",
                "1 CALLC 1",
                "1 STOP",
                "1 BEGIN 2 0; CLOSURE 0x18",
                "1 CLOSURE 0x18; CALLC 1",
            ]
        );
    }

    #[test]
    fn every_public_symbol_seeds_reachability() {
        let file = build_file(
            &[("main", 0), ("aux", 1)],
            &emit(&[Instr::Stop, Instr::Const(4), Instr::Stop]),
        );
        assert_eq!(lines(&file), ["2 STOP", "1 CONST 4", "1 CONST 4; STOP"]);
    }

    #[test]
    fn symbols_outside_the_code_area_are_rejected() {
        let file = build_file(&[("main", 100)], &emit(&[Instr::Stop]));
        assert_eq!(
            mine(&file),
            Err(IdiomError::BadSymbol {
                index: 0,
                address: 100
            })
        );
    }

    #[test]
    fn destinations_outside_the_code_area_are_rejected() {
        let file = build_file(&[("main", 0)], &emit(&[Instr::Jmp(0x100), Instr::Stop]));
        assert_eq!(
            mine(&file),
            Err(IdiomError::BadTarget {
                offset: 0,
                target: 0x100
            })
        );
    }

    #[test]
    fn code_running_past_the_end_is_rejected() {
        let file = build_file(&[("main", 0)], &emit(&[Instr::Const(1)]));
        assert_eq!(
            mine(&file),
            Err(IdiomError::Decode(DecodeError::UnexpectedEnd {
                offset: 5
            }))
        );
    }
}
