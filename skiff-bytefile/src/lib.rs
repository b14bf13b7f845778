// skiff-bytefile - Bytecode container format and instruction set for the skiff VM
// Copyright (c) 2025 Tom Waddington. MIT licensed.

//! Container format and instruction set shared by the skiff tools.
//!
//! The container carries a string table, a global-area size, a table
//! of public symbols and the code area. Instructions are one opcode
//! byte plus little-endian 32-bit operands; [`Instr::decode`] turns
//! the raw bytes into [`Instr`] values the interpreter, verifier and
//! disassembler all work from.

pub mod bytefile;
pub mod error;
pub mod instr;
pub mod opcode;

pub use bytefile::{Bytefile, PublicSymbol};
pub use error::{DecodeError, LoadError};
pub use instr::Instr;
pub use opcode::{Opcode, VarSpec};
