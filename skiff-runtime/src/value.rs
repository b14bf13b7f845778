// skiff-runtime - Tagged values, heap and garbage collector for the skiff VM
// Copyright (c) 2025 Tom Waddington. MIT licensed.

//! The machine value: a small copyable tagged union.

use crate::heap::HeapHandle;

/// Where a location value points.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Location {
    /// A slot of the shared stack, counted from its bottom.
    Stack(u32),
    /// A captured slot of a closure.
    Capture { closure: HeapHandle, slot: u32 },
}

/// A machine value.
///
/// `Empty` is the unset/unit value globals and fresh guard slots start
/// as. Integers are kept inside the 31-bit range, so construct them
/// through [`Value::int`]. Everything that is not an `Int` counts as a
/// reference to the pattern instructions.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub enum Value {
    #[default]
    Empty,
    Int(i32),
    Ref(HeapHandle),
    Loc(Location),
}

impl Value {
    /// Makes an integer value, wrapping into the 31-bit range.
    pub fn int(n: i32) -> Value {
        Value::Int(wrap31(n))
    }

    pub fn is_int(&self) -> bool {
        matches!(self, Value::Int(_))
    }

    pub fn as_int(&self) -> Option<i32> {
        match self {
            Value::Int(n) => Some(*n),
            _ => None,
        }
    }

    pub fn is_reference(&self) -> bool {
        !self.is_int()
    }

    /// The heap object behind a `Ref`, if this is one.
    pub fn handle(&self) -> Option<HeapHandle> {
        match self {
            Value::Ref(handle) => Some(*handle),
            _ => None,
        }
    }
}

// A 31-bit store: shift the low 31 bits up and back down again, letting
// the arithmetic shift smear the sign.
fn wrap31(n: i32) -> i32 {
    n.wrapping_shl(1) >> 1
}
