// skiff-runtime - Tagged values, heap and garbage collector for the skiff VM
// Copyright (c) 2025 Tom Waddington. MIT licensed.

//! Value model and heap for the skiff VM.
//!
//! Values are a small copyable union over integers, heap handles and
//! slot locations. The heap owns every structured object (strings,
//! arrays, s-expressions, closures) and reclaims garbage with a
//! mark-and-sweep pass whose roots the interpreter hands in at each
//! allocation.

pub mod heap;
mod render;
pub mod tags;
pub mod value;

pub use heap::{GcReport, Heap, HeapError, HeapHandle, HeapKind, HeapStats};
pub use value::{Location, Value};
