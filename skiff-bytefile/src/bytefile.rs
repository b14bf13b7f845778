// skiff-bytefile - Bytecode container format and instruction set for the skiff VM
// Copyright (c) 2025 Tom Waddington. MIT licensed.

//! Loading and validation of the on-disk container.
//!
//! A container is four little-endian sections: a 12-byte header
//! (string table size, global area size, public symbol count), the
//! public symbol table, the string table, and the code area, which
//! runs to the end of the file.

use std::fs;
use std::path::Path;

use crate::error::{LoadError, Result};

/// A code address paired with the string-table offset of its exported
/// name.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PublicSymbol {
    pub name_offset: u32,
    pub address: u32,
}

/// A loaded program.
///
/// Loading validates the section framing, every symbol name and the
/// presence of a `main` entrypoint; code addresses inside the symbol
/// table and the code area itself are left to the verifier.
#[derive(Debug, Clone)]
pub struct Bytefile {
    name: String,
    global_area: u32,
    symbols: Vec<PublicSymbol>,
    string_table: Vec<u8>,
    code: Vec<u8>,
}

struct Reader<'a> {
    bytes: &'a [u8],
    pos: usize,
}

impl<'a> Reader<'a> {
    fn word(&mut self) -> Result<u32> {
        let end = self
            .pos
            .checked_add(4)
            .filter(|&end| end <= self.bytes.len())
            .ok_or(LoadError::Truncated)?;
        let mut buf = [0u8; 4];
        buf.copy_from_slice(&self.bytes[self.pos..end]);
        self.pos = end;
        Ok(u32::from_le_bytes(buf))
    }

    fn take(&mut self, len: usize) -> Result<&'a [u8]> {
        let end = self
            .pos
            .checked_add(len)
            .filter(|&end| end <= self.bytes.len())
            .ok_or(LoadError::Truncated)?;
        let section = &self.bytes[self.pos..end];
        self.pos = end;
        Ok(section)
    }
}

impl Bytefile {
    /// Reads and parses a container file.
    pub fn load(path: &Path) -> Result<Bytefile> {
        let bytes = fs::read(path).map_err(|error| LoadError::Io {
            path: path.display().to_string(),
            error,
        })?;
        Bytefile::parse(&path.display().to_string(), &bytes)
    }

    /// Parses an in-memory container. `name` is used in diagnostics
    /// only.
    pub fn parse(name: &str, bytes: &[u8]) -> Result<Bytefile> {
        let mut r = Reader { bytes, pos: 0 };
        let string_table_size = r.word()? as usize;
        let global_area = r.word()?;
        let symbol_count = r.word()? as usize;
        if symbol_count == 0 || symbol_count > i32::MAX as usize {
            return Err(LoadError::InvalidSymbolTable);
        }

        let mut symbols = Vec::new();
        for _ in 0..symbol_count {
            let name_offset = r.word()?;
            let address = r.word()?;
            symbols.push(PublicSymbol {
                name_offset,
                address,
            });
        }
        let string_table = r.take(string_table_size)?.to_vec();
        let code = bytes[r.pos..].to_vec();

        let mut has_entry = false;
        for (index, symbol) in symbols.iter().enumerate() {
            let name = name_in(&string_table, symbol.name_offset)
                .ok_or(LoadError::BadSymbolName { index })?;
            has_entry = has_entry || name == b"main";
        }
        if !has_entry {
            return Err(LoadError::MissingEntry);
        }

        Ok(Bytefile {
            name: name.to_string(),
            global_area,
            symbols,
            string_table,
            code,
        })
    }

    /// Display name of the program, used in diagnostics.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Number of global slots the program declares.
    pub fn global_area_size(&self) -> u32 {
        self.global_area
    }

    /// Size of the string table in bytes.
    pub fn string_table_size(&self) -> u32 {
        self.string_table.len() as u32
    }

    /// The code area.
    pub fn code(&self) -> &[u8] {
        &self.code
    }

    /// Size of the code area in bytes.
    pub fn code_size(&self) -> u32 {
        self.code.len() as u32
    }

    /// The exported symbols, in table order.
    pub fn symbols(&self) -> &[PublicSymbol] {
        &self.symbols
    }

    /// The NUL-terminated string starting at `offset` in the string
    /// table, without its terminator. `None` when the offset is out of
    /// range or no terminator follows it.
    pub fn string_at(&self, offset: u32) -> Option<&[u8]> {
        name_in(&self.string_table, offset)
    }

    /// The name of a public symbol.
    pub fn symbol_name(&self, symbol: &PublicSymbol) -> Option<&[u8]> {
        self.string_at(symbol.name_offset)
    }
}

fn name_in(table: &[u8], offset: u32) -> Option<&[u8]> {
    let rest = table.get(offset as usize..)?;
    let nul = rest.iter().position(|&byte| byte == 0)?;
    Some(&rest[..nul])
}
