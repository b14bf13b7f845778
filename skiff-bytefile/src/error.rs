// skiff-bytefile - Bytecode container format and instruction set for the skiff VM
// Copyright (c) 2025 Tom Waddington. MIT licensed.

//! Error types for container loading and instruction decoding.

use std::fmt;
use std::io;

/// Errors raised while reading or validating a container file.
#[derive(Debug)]
pub enum LoadError {
    /// The file could not be read at all.
    Io { path: String, error: io::Error },
    /// The file ends before a length-prefixed section does.
    Truncated,
    /// The public symbol count is zero or out of range.
    InvalidSymbolTable,
    /// A symbol's name offset points outside the string table, or the
    /// name is not NUL-terminated inside it.
    BadSymbolName { index: usize },
    /// No public symbol is named `main`.
    MissingEntry,
}

impl fmt::Display for LoadError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            LoadError::Io { path, error } => write!(f, "cannot read {}: {}", path, error),
            LoadError::Truncated => write!(f, "unexpected end of file"),
            LoadError::InvalidSymbolTable => write!(f, "invalid symbol table size"),
            LoadError::BadSymbolName { index } => {
                write!(f, "public symbol {} has a malformed name", index)
            }
            LoadError::MissingEntry => write!(f, "entrypoint `main` is not defined"),
        }
    }
}

impl std::error::Error for LoadError {}

/// Result type for container loading.
pub type Result<T> = std::result::Result<T, LoadError>;

/// Errors raised when a byte stream cannot be decoded into an
/// instruction. The offset is always the address of the instruction
/// whose decoding failed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DecodeError {
    /// The opcode byte is not part of the instruction set.
    UnknownOpcode { offset: u32, byte: u8 },
    /// The code area ends in the middle of an instruction.
    UnexpectedEnd { offset: u32 },
    /// A variable designator byte is out of range.
    BadVarSpec { offset: u32, byte: u8 },
    /// A closure capture count is negative.
    BadCaptureCount { offset: u32 },
}

impl DecodeError {
    /// Address of the instruction that failed to decode.
    pub fn offset(&self) -> u32 {
        match *self {
            DecodeError::UnknownOpcode { offset, .. } => offset,
            DecodeError::UnexpectedEnd { offset } => offset,
            DecodeError::BadVarSpec { offset, .. } => offset,
            DecodeError::BadCaptureCount { offset } => offset,
        }
    }
}

impl fmt::Display for DecodeError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DecodeError::UnknownOpcode { byte, .. } => {
                write!(f, "unknown opcode 0x{:02x}", byte)
            }
            DecodeError::UnexpectedEnd { .. } => write!(f, "unexpected end of code"),
            DecodeError::BadVarSpec { byte, .. } => {
                write!(f, "invalid variable designator 0x{:02x}", byte)
            }
            DecodeError::BadCaptureCount { .. } => write!(f, "negative capture count"),
        }
    }
}

impl std::error::Error for DecodeError {}
