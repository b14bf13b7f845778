// skiff-vm - Bytecode interpreter and ahead-of-time stack verifier for the skiff VM
// Copyright (c) 2025 Tom Waddington. MIT licensed.

//! Shared test support: a label-aware assembler and a container
//! builder.

use std::collections::HashMap;

use skiff_bytefile::{Bytefile, Instr};

/// Assembles instruction sequences, patching label targets in a
/// second pass. Targets passed as instruction operands are ignored
/// when a label is given alongside.
pub struct Asm {
    code: Vec<u8>,
    labels: HashMap<&'static str, u32>,
    patches: Vec<(usize, &'static str)>,
}

impl Asm {
    pub fn new() -> Asm {
        Asm {
            code: Vec::new(),
            labels: HashMap::new(),
            patches: Vec::new(),
        }
    }

    /// Current code address.
    pub fn here(&self) -> u32 {
        self.code.len() as u32
    }

    /// Defines `name` at the current address.
    pub fn label(&mut self, name: &'static str) -> &mut Asm {
        self.labels.insert(name, self.here());
        self
    }

    /// Address of a defined label.
    pub fn address(&self, name: &str) -> u32 {
        self.labels[name]
    }

    /// Emits one instruction as encoded.
    pub fn op(&mut self, instr: Instr) -> &mut Asm {
        instr.encode(&mut self.code);
        self
    }

    /// Emits an instruction whose first operand word is the address
    /// of `target`, patched once all labels are known.
    pub fn op_to(&mut self, instr: Instr, target: &'static str) -> &mut Asm {
        // The target word always sits right after the opcode byte.
        self.patches.push((self.code.len() + 1, target));
        instr.encode(&mut self.code);
        self
    }

    /// Emits raw bytes, for deliberately malformed streams.
    pub fn raw(&mut self, bytes: &[u8]) -> &mut Asm {
        self.code.extend_from_slice(bytes);
        self
    }

    /// Resolves labels and returns the code area.
    pub fn finish(&mut self) -> Vec<u8> {
        for &(position, name) in &self.patches {
            let address = self.labels[name];
            self.code[position..position + 4].copy_from_slice(&address.to_le_bytes());
        }
        self.code.clone()
    }
}

/// Builds a parsed container: `strings` land at the front of the
/// string table (offsets from [`string_offset`]), symbol names after
/// them.
pub fn build_file(
    globals: u32,
    strings: &[&str],
    symbols: &[(&str, u32)],
    code: &[u8],
) -> Bytefile {
    let mut table = Vec::new();
    for string in strings {
        table.extend_from_slice(string.as_bytes());
        table.push(0);
    }
    let mut name_offsets = Vec::new();
    for (name, _) in symbols {
        name_offsets.push(table.len() as u32);
        table.extend_from_slice(name.as_bytes());
        table.push(0);
    }

    let mut bytes = Vec::new();
    bytes.extend_from_slice(&(table.len() as u32).to_le_bytes());
    bytes.extend_from_slice(&globals.to_le_bytes());
    bytes.extend_from_slice(&(symbols.len() as u32).to_le_bytes());
    for ((_, address), offset) in symbols.iter().zip(&name_offsets) {
        bytes.extend_from_slice(&offset.to_le_bytes());
        bytes.extend_from_slice(&address.to_le_bytes());
    }
    bytes.extend_from_slice(&table);
    bytes.extend_from_slice(code);

    Bytefile::parse("test.sbc", &bytes).expect("container builds")
}

/// A single-function program: `main` at address zero.
pub fn program(globals: u32, strings: &[&str], code: &[u8]) -> Bytefile {
    build_file(globals, strings, &[("main", 0)], code)
}

/// Offset of `strings[index]` in a table built by [`build_file`].
pub fn string_offset(strings: &[&str], index: usize) -> u32 {
    strings[..index].iter().map(|s| s.len() as u32 + 1).sum()
}
