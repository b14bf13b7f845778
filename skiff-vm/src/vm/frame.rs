// skiff-vm - Bytecode interpreter and ahead-of-time stack verifier for the skiff VM
// Copyright (c) 2025 Tom Waddington. MIT licensed.

//! Call frames over the shared stack.

/// One activation: where it sits in the shared stack and where the
/// caller resumes.
///
/// Layout, bottom to top: the optional closure slot, `args` argument
/// slots, then `base`, then `locals` local slots, then working
/// operands. The constructor's caller guarantees `base` leaves room
/// for the slots below it.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Frame {
    /// First local slot.
    pub base: u32,
    pub args: u32,
    pub locals: u32,
    /// Set when the frame was entered through a closure call, which
    /// reserves one extra slot under the arguments.
    pub is_closure: bool,
    /// Where the caller resumes. The entry frame has none, and a
    /// frame that has not called yet has none either.
    pub return_address: Option<u32>,
}

impl Frame {
    pub fn new(base: u32, args: u32, locals: u32, is_closure: bool) -> Frame {
        Frame {
            base,
            args,
            locals,
            is_closure,
            return_address: None,
        }
    }

    /// First argument slot.
    pub fn args_base(&self) -> u32 {
        self.base - self.args
    }

    /// Slot holding the closure, for frames entered through one.
    pub fn closure_slot(&self) -> Option<u32> {
        if self.is_closure {
            Some(self.base - self.args - 1)
        } else {
            None
        }
    }

    /// Lowest slot the frame owns, including the closure slot.
    pub fn floor(&self) -> u32 {
        self.args_base() - self.is_closure as u32
    }
}
