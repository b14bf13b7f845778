// skiff-vm - Bytecode interpreter and ahead-of-time stack verifier for the skiff VM
// Copyright (c) 2025 Tom Waddington. MIT licensed.

//! Trap and runtime error types for interpretation.

use std::fmt;

use skiff_bytefile::DecodeError;
use skiff_runtime::HeapError;

/// What went wrong, before the trap site is attached.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TrapKind {
    /// Pop or peek past what the stack holds.
    StackUnderflow,
    /// The shared stack hit its capacity limit.
    StackOverflow,
    /// An operand had the wrong tag.
    TypeMismatch {
        expected: &'static str,
        got: &'static str,
    },
    /// Integer division or remainder by zero.
    DivisionByZero,
    /// Element access outside an aggregate's bounds.
    IndexOutOfBounds { index: i32, len: u32 },
    /// A slot index outside its storage area.
    BadSlot {
        space: &'static str,
        index: u32,
        len: u32,
    },
    /// A jump or call destination outside the code area.
    BadTarget { target: u32 },
    /// A call destination that is not a function entry.
    TargetNotBegin { target: u32 },
    /// A string-table offset with no string behind it.
    BadStringIndex { offset: u32 },
    /// A constructor name with characters outside the tag alphabet.
    BadTagName,
    /// A count operand that should not be negative.
    NegativeCount { what: &'static str },
    /// An instruction that needs a frame ran with none open.
    NoFrame,
    /// Capture access in a frame that was not entered through a
    /// closure.
    NoClosure,
    /// The instruction stream itself is malformed.
    Decode(DecodeError),
    /// The console could not produce an integer.
    InputExhausted,
    /// The running program raised a pattern-match failure.
    MatchFailure {
        line: u32,
        column: u32,
        value: String,
    },
    /// States the interpreter keeps impossible by construction.
    Internal(&'static str),
}

impl fmt::Display for TrapKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TrapKind::StackUnderflow => write!(f, "stack underflow"),
            TrapKind::StackOverflow => write!(f, "stack overflow"),
            TrapKind::TypeMismatch { expected, got } => {
                write!(f, "expected {}, got {}", expected, got)
            }
            TrapKind::DivisionByZero => write!(f, "division by zero"),
            TrapKind::IndexOutOfBounds { index, len } => {
                write!(f, "index {} out of bounds (length {})", index, len)
            }
            TrapKind::BadSlot { space, index, len } => {
                write!(f, "{} index {} out of bounds (size {})", space, index, len)
            }
            TrapKind::BadTarget { target } => write!(f, "invalid destination 0x{:x}", target),
            TrapKind::TargetNotBegin { target } => {
                write!(f, "destination 0x{:x} is not a function entry", target)
            }
            TrapKind::BadStringIndex { offset } => {
                write!(f, "string table offset {} out of bounds", offset)
            }
            TrapKind::BadTagName => {
                write!(f, "constructor name has characters outside the tag alphabet")
            }
            TrapKind::NegativeCount { what } => write!(f, "negative {}", what),
            TrapKind::NoFrame => write!(f, "no active frame"),
            TrapKind::NoClosure => write!(f, "capture access outside a closure call"),
            TrapKind::Decode(error) => write!(f, "{}", error),
            TrapKind::InputExhausted => write!(f, "cannot read an integer from input"),
            TrapKind::MatchFailure { value, .. } => write!(f, "match failure, value {}", value),
            TrapKind::Internal(message) => write!(f, "internal error: {}", message),
        }
    }
}

impl From<DecodeError> for TrapKind {
    fn from(error: DecodeError) -> TrapKind {
        TrapKind::Decode(error)
    }
}

impl From<HeapError> for TrapKind {
    fn from(error: HeapError) -> TrapKind {
        match error {
            HeapError::IndexOutOfBounds { index, len } => TrapKind::IndexOutOfBounds { index, len },
            HeapError::InvalidHandle => TrapKind::Internal("dead heap handle"),
            HeapError::NotAnAggregate => TrapKind::TypeMismatch {
                expected: "aggregate",
                got: "closure",
            },
            HeapError::NotAClosure => TrapKind::Internal("capture access on a non-closure"),
            // Strings store integers; anything else written into one
            // is a reference.
            HeapError::NotAnInteger => TrapKind::TypeMismatch {
                expected: "integer",
                got: "reference",
            },
        }
    }
}

/// An execution failure with its program location attached.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RuntimeError {
    /// A trap: carries the offending instruction's address and the
    /// most recent source line marker.
    Trap {
        kind: TrapKind,
        offset: u32,
        line: u32,
    },
    /// A pattern-match failure raised by the program itself.
    MatchFailure {
        file: String,
        line: u32,
        column: u32,
        value: String,
    },
}

impl fmt::Display for RuntimeError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RuntimeError::Trap { kind, offset, line } => {
                write!(f, "{}. Line: {}, bytecode offset: 0x{:x}", kind, line, offset)
            }
            RuntimeError::MatchFailure {
                file,
                line,
                column,
                value,
            } => {
                write!(f, "match failure at {}:{}:{}, value {}", file, line, column, value)
            }
        }
    }
}

impl std::error::Error for RuntimeError {}

/// Result type for whole-program runs.
pub type Result<T> = std::result::Result<T, RuntimeError>;

/// Result type for individual operations; the run loop attaches the
/// trap site.
pub(crate) type OpResult<T> = std::result::Result<T, TrapKind>;
