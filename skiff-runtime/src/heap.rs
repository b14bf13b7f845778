// skiff-runtime - Tagged values, heap and garbage collector for the skiff VM
// Copyright (c) 2025 Tom Waddington. MIT licensed.

//! Handle-based heap with mark-and-sweep collection.
//!
//! Objects live in a slot vector and are addressed by [`HeapHandle`],
//! so nothing moves and handles stay valid across collections. Every
//! allocation names its roots: the live stack slice plus the values
//! being allocated from, which keeps the collector and the interpreter
//! consistent by construction.

use crate::value::{Location, Value};

/// Stable index of a heap object.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct HeapHandle(u32);

impl HeapHandle {
    pub fn index(self) -> u32 {
        self.0
    }
}

/// What an object is, without its payload.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HeapKind {
    String,
    Array,
    Sexp,
    Closure,
}

#[derive(Debug, Clone)]
enum Payload {
    String(Vec<u8>),
    Array(Vec<Value>),
    Sexp { tag: i32, elements: Vec<Value> },
    Closure { code: u32, captures: Vec<Value> },
}

#[derive(Debug, Clone)]
struct HeapObject {
    marked: bool,
    payload: Payload,
}

/// Errors surfaced to the interpreter as traps.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HeapError {
    /// Element access outside an object's bounds.
    IndexOutOfBounds { index: i32, len: u32 },
    /// A handle that does not name a live object.
    InvalidHandle,
    /// Indexed access to something that has no elements.
    NotAnAggregate,
    /// Capture access to something that is not a closure.
    NotAClosure,
    /// A string element was written with a non-integer.
    NotAnInteger,
}

/// Counters kept across the heap's lifetime.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct HeapStats {
    pub allocations: usize,
    pub gc_runs: usize,
    pub last_freed: usize,
    pub last_live: usize,
}

/// What one collection did.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct GcReport {
    pub marked: usize,
    pub freed: usize,
    pub live: usize,
}

const INITIAL_GC_THRESHOLD: usize = 1024;

/// The object heap.
#[derive(Debug)]
pub struct Heap {
    slots: Vec<Option<HeapObject>>,
    free: Vec<u32>,
    allocated_since_gc: usize,
    threshold: usize,
    stats: HeapStats,
}

impl Default for Heap {
    fn default() -> Self {
        Heap::new()
    }
}

impl Heap {
    pub fn new() -> Heap {
        Heap {
            slots: Vec::new(),
            free: Vec::new(),
            allocated_since_gc: 0,
            threshold: INITIAL_GC_THRESHOLD,
            stats: HeapStats::default(),
        }
    }

    pub fn stats(&self) -> HeapStats {
        self.stats
    }

    /// Number of live objects.
    pub fn live_objects(&self) -> usize {
        self.slots.iter().filter(|slot| slot.is_some()).count()
    }

    // ============================================================
    // Allocation
    // ============================================================

    /// Allocates a string. `roots` is the live stack.
    pub fn alloc_string(&mut self, bytes: &[u8], roots: &[Value]) -> Value {
        self.maybe_collect(&[roots]);
        Value::Ref(self.alloc_object(Payload::String(bytes.to_vec())))
    }

    /// Allocates an array of `elements`, which are rooted for the
    /// duration of the call alongside `roots`.
    pub fn alloc_array(&mut self, elements: &[Value], roots: &[Value]) -> Value {
        self.maybe_collect(&[roots, elements]);
        Value::Ref(self.alloc_object(Payload::Array(elements.to_vec())))
    }

    /// Allocates an s-expression with a packed tag.
    pub fn alloc_sexp(&mut self, tag: i32, elements: &[Value], roots: &[Value]) -> Value {
        self.maybe_collect(&[roots, elements]);
        Value::Ref(self.alloc_object(Payload::Sexp {
            tag,
            elements: elements.to_vec(),
        }))
    }

    /// Allocates a closure over the code address `code`.
    pub fn alloc_closure(&mut self, code: u32, captures: &[Value], roots: &[Value]) -> Value {
        self.maybe_collect(&[roots, captures]);
        Value::Ref(self.alloc_object(Payload::Closure {
            code,
            captures: captures.to_vec(),
        }))
    }

    fn alloc_object(&mut self, payload: Payload) -> HeapHandle {
        self.allocated_since_gc += 1;
        self.stats.allocations += 1;
        let object = HeapObject {
            marked: false,
            payload,
        };
        match self.free.pop() {
            Some(index) => {
                self.slots[index as usize] = Some(object);
                HeapHandle(index)
            }
            None => {
                let index = self.slots.len() as u32;
                self.slots.push(Some(object));
                HeapHandle(index)
            }
        }
    }

    // ============================================================
    // Kind queries
    // ============================================================

    /// The kind of a live object.
    pub fn kind(&self, handle: HeapHandle) -> Option<HeapKind> {
        let kind = match &self.object(handle)?.payload {
            Payload::String(_) => HeapKind::String,
            Payload::Array(_) => HeapKind::Array,
            Payload::Sexp { .. } => HeapKind::Sexp,
            Payload::Closure { .. } => HeapKind::Closure,
        };
        Some(kind)
    }

    /// A short noun for diagnostics.
    pub fn kind_name(&self, value: Value) -> &'static str {
        match value {
            Value::Empty => "empty",
            Value::Int(_) => "integer",
            Value::Loc(_) => "location",
            Value::Ref(handle) => match self.kind(handle) {
                Some(HeapKind::String) => "string",
                Some(HeapKind::Array) => "array",
                Some(HeapKind::Sexp) => "s-expression",
                Some(HeapKind::Closure) => "closure",
                None => "dead reference",
            },
        }
    }

    /// The handle behind a value that has indexed elements.
    pub fn aggregate(&self, value: Value) -> Option<HeapHandle> {
        let handle = value.handle()?;
        match self.kind(handle)? {
            HeapKind::String | HeapKind::Array | HeapKind::Sexp => Some(handle),
            HeapKind::Closure => None,
        }
    }

    /// The handle behind a closure value.
    pub fn closure(&self, value: Value) -> Option<HeapHandle> {
        let handle = value.handle()?;
        match self.kind(handle)? {
            HeapKind::Closure => Some(handle),
            _ => None,
        }
    }

    pub fn is_string(&self, value: Value) -> bool {
        self.value_kind(value) == Some(HeapKind::String)
    }

    pub fn is_array(&self, value: Value) -> bool {
        self.value_kind(value) == Some(HeapKind::Array)
    }

    pub fn is_sexp(&self, value: Value) -> bool {
        self.value_kind(value) == Some(HeapKind::Sexp)
    }

    pub fn is_closure(&self, value: Value) -> bool {
        self.value_kind(value) == Some(HeapKind::Closure)
    }

    fn value_kind(&self, value: Value) -> Option<HeapKind> {
        self.kind(value.handle()?)
    }

    // ============================================================
    // Element access
    // ============================================================

    /// Element count of a string, array or s-expression.
    pub fn len(&self, handle: HeapHandle) -> Result<u32, HeapError> {
        match &self.live(handle)?.payload {
            Payload::String(bytes) => Ok(bytes.len() as u32),
            Payload::Array(elements) | Payload::Sexp { elements, .. } => {
                Ok(elements.len() as u32)
            }
            Payload::Closure { .. } => Err(HeapError::NotAnAggregate),
        }
    }

    /// Indexed read. String elements come back as integer values.
    pub fn get(&self, handle: HeapHandle, index: i32) -> Result<Value, HeapError> {
        match &self.live(handle)?.payload {
            Payload::String(bytes) => {
                let byte = *checked(bytes, index)?;
                Ok(Value::int(byte as i32))
            }
            Payload::Array(elements) | Payload::Sexp { elements, .. } => {
                Ok(*checked(elements, index)?)
            }
            Payload::Closure { .. } => Err(HeapError::NotAnAggregate),
        }
    }

    /// Indexed write. String elements take the low byte of an integer
    /// value.
    pub fn set(&mut self, handle: HeapHandle, index: i32, value: Value) -> Result<(), HeapError> {
        match &mut self.live_mut(handle)?.payload {
            Payload::String(bytes) => {
                let n = value.as_int().ok_or(HeapError::NotAnInteger)?;
                *checked_mut(bytes, index)? = n as u8;
                Ok(())
            }
            Payload::Array(elements) | Payload::Sexp { elements, .. } => {
                *checked_mut(elements, index)? = value;
                Ok(())
            }
            Payload::Closure { .. } => Err(HeapError::NotAnAggregate),
        }
    }

    /// The bytes of a string object.
    pub fn string_bytes(&self, handle: HeapHandle) -> Option<&[u8]> {
        match &self.object(handle)?.payload {
            Payload::String(bytes) => Some(bytes),
            _ => None,
        }
    }

    /// The packed tag of an s-expression.
    pub fn sexp_tag(&self, handle: HeapHandle) -> Option<i32> {
        match &self.object(handle)?.payload {
            Payload::Sexp { tag, .. } => Some(*tag),
            _ => None,
        }
    }

    // ============================================================
    // Closure access
    // ============================================================

    /// Code address a closure was built over.
    pub fn closure_code(&self, handle: HeapHandle) -> Result<u32, HeapError> {
        match &self.live(handle)?.payload {
            Payload::Closure { code, .. } => Ok(*code),
            _ => Err(HeapError::NotAClosure),
        }
    }

    /// Number of captured slots.
    pub fn closure_captures(&self, handle: HeapHandle) -> Result<u32, HeapError> {
        match &self.live(handle)?.payload {
            Payload::Closure { captures, .. } => Ok(captures.len() as u32),
            _ => Err(HeapError::NotAClosure),
        }
    }

    /// Reads a captured slot.
    pub fn capture(&self, handle: HeapHandle, slot: u32) -> Result<Value, HeapError> {
        match &self.live(handle)?.payload {
            Payload::Closure { captures, .. } => Ok(*checked(captures, slot as i32)?),
            _ => Err(HeapError::NotAClosure),
        }
    }

    /// Writes a captured slot.
    pub fn set_capture(
        &mut self,
        handle: HeapHandle,
        slot: u32,
        value: Value,
    ) -> Result<(), HeapError> {
        match &mut self.live_mut(handle)?.payload {
            Payload::Closure { captures, .. } => {
                *checked_mut(captures, slot as i32)? = value;
                Ok(())
            }
            _ => Err(HeapError::NotAClosure),
        }
    }

    // ============================================================
    // Collection
    // ============================================================

    /// Runs a mark-and-sweep collection over the given roots.
    pub fn collect(&mut self, roots: &[Value]) -> GcReport {
        self.collect_sets(&[roots])
    }

    fn maybe_collect(&mut self, root_sets: &[&[Value]]) {
        if self.allocated_since_gc < self.threshold {
            return;
        }
        let report = self.collect_sets(root_sets);
        // Widen the window while most of the heap survives.
        if report.live * 2 > self.threshold {
            self.threshold *= 2;
        }
    }

    fn collect_sets(&mut self, root_sets: &[&[Value]]) -> GcReport {
        let mut pending: Vec<HeapHandle> = root_sets
            .iter()
            .flat_map(|set| set.iter())
            .filter_map(|value| traced_handle(*value))
            .collect();

        let mut marked = 0;
        while let Some(handle) = pending.pop() {
            if self.mark(handle) {
                marked += 1;
                self.push_children(handle, &mut pending);
            }
        }

        let mut freed = 0;
        let mut live = 0;
        for (index, slot) in self.slots.iter_mut().enumerate() {
            match slot {
                Some(object) if object.marked => {
                    object.marked = false;
                    live += 1;
                }
                Some(_) => {
                    *slot = None;
                    self.free.push(index as u32);
                    freed += 1;
                }
                None => {}
            }
        }

        self.allocated_since_gc = 0;
        self.stats.gc_runs += 1;
        self.stats.last_freed = freed;
        self.stats.last_live = live;
        GcReport { marked, freed, live }
    }

    fn mark(&mut self, handle: HeapHandle) -> bool {
        match self.slots.get_mut(handle.0 as usize) {
            Some(Some(object)) if !object.marked => {
                object.marked = true;
                true
            }
            _ => false,
        }
    }

    fn push_children(&self, handle: HeapHandle, pending: &mut Vec<HeapHandle>) {
        let Some(object) = self.object(handle) else {
            return;
        };
        match &object.payload {
            Payload::String(_) => {}
            Payload::Array(elements)
            | Payload::Sexp { elements, .. }
            | Payload::Closure {
                captures: elements, ..
            } => {
                pending.extend(elements.iter().filter_map(|value| traced_handle(*value)));
            }
        }
    }

    fn object(&self, handle: HeapHandle) -> Option<&HeapObject> {
        self.slots.get(handle.0 as usize)?.as_ref()
    }

    fn live(&self, handle: HeapHandle) -> Result<&HeapObject, HeapError> {
        self.object(handle).ok_or(HeapError::InvalidHandle)
    }

    fn live_mut(&mut self, handle: HeapHandle) -> Result<&mut HeapObject, HeapError> {
        self.slots
            .get_mut(handle.0 as usize)
            .and_then(|slot| slot.as_mut())
            .ok_or(HeapError::InvalidHandle)
    }
}

/// The handle a root value keeps alive: a plain reference, or the
/// closure that owns a captured slot someone still points into.
fn traced_handle(value: Value) -> Option<HeapHandle> {
    match value {
        Value::Ref(handle) => Some(handle),
        Value::Loc(Location::Capture { closure, .. }) => Some(closure),
        Value::Loc(Location::Stack(_)) | Value::Int(_) | Value::Empty => None,
    }
}

fn checked<T>(elements: &[T], index: i32) -> Result<&T, HeapError> {
    usize::try_from(index)
        .ok()
        .and_then(|index| elements.get(index))
        .ok_or(HeapError::IndexOutOfBounds {
            index,
            len: elements.len() as u32,
        })
}

fn checked_mut<T>(elements: &mut [T], index: i32) -> Result<&mut T, HeapError> {
    let len = elements.len() as u32;
    usize::try_from(index)
        .ok()
        .and_then(|index| elements.get_mut(index))
        .ok_or(HeapError::IndexOutOfBounds { index, len })
}
