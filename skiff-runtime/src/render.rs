// skiff-runtime - Tagged values, heap and garbage collector for the skiff VM
// Copyright (c) 2025 Tom Waddington. MIT licensed.

//! Rendering values for the stringify builtin and failure reports.

use crate::heap::{Heap, HeapHandle};
use crate::tags::tag_name;
use crate::value::Value;

// Cyclic structures exist (an array can be stored into itself), so the
// walk is depth-capped.
const MAX_RENDER_DEPTH: usize = 100;

impl Heap {
    /// Renders a value: integers in decimal, strings verbatim, arrays
    /// as `[a, b]`, s-expressions as `Tag` or `Tag (a, b)`, closures
    /// by their code address.
    pub fn render(&self, value: Value) -> String {
        let mut out = String::new();
        self.render_into(&mut out, value, 0);
        out
    }

    fn render_into(&self, out: &mut String, value: Value, depth: usize) {
        use std::fmt::Write;

        if depth > MAX_RENDER_DEPTH {
            out.push_str("...");
            return;
        }
        match value {
            Value::Empty => out.push_str("#empty"),
            Value::Int(n) => {
                let _ = write!(out, "{}", n);
            }
            Value::Loc(_) => out.push_str("#location"),
            Value::Ref(handle) => {
                if let Some(bytes) = self.string_bytes(handle) {
                    out.push_str(&String::from_utf8_lossy(bytes));
                } else if let Some(tag) = self.sexp_tag(handle) {
                    out.push_str(&tag_name(tag));
                    let len = self.len(handle).unwrap_or(0);
                    if len > 0 {
                        out.push_str(" (");
                        self.render_elements(out, handle, len, depth);
                        out.push(')');
                    }
                } else if let Ok(code) = self.closure_code(handle) {
                    let _ = write!(out, "<closure 0x{:x}>", code);
                } else if let Ok(len) = self.len(handle) {
                    out.push('[');
                    self.render_elements(out, handle, len, depth);
                    out.push(']');
                } else {
                    out.push_str("#dead");
                }
            }
        }
    }

    fn render_elements(&self, out: &mut String, handle: HeapHandle, len: u32, depth: usize) {
        for index in 0..len {
            if index > 0 {
                out.push_str(", ");
            }
            match self.get(handle, index as i32) {
                Ok(element) => self.render_into(out, element, depth + 1),
                Err(_) => out.push('?'),
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn renders_scalars() {
        let heap = Heap::new();
        assert_eq!(heap.render(Value::int(-42)), "-42");
        assert_eq!(heap.render(Value::Empty), "#empty");
    }

    #[test]
    fn renders_structures() {
        let mut heap = Heap::new();
        let hello = heap.alloc_string(b"hello", &[]);
        assert_eq!(heap.render(hello), "hello");

        let pair = heap.alloc_array(&[Value::int(1), hello], &[]);
        assert_eq!(heap.render(pair), "[1, hello]");

        let tag = crate::tags::tag_hash(b"Cons").unwrap();
        let cons = heap.alloc_sexp(tag, &[Value::int(3), pair], &[pair]);
        assert_eq!(heap.render(cons), "Cons (3, [1, hello])");

        let nil = heap.alloc_sexp(crate::tags::tag_hash(b"Nil").unwrap(), &[], &[cons]);
        assert_eq!(heap.render(nil), "Nil");
    }

    #[test]
    fn cyclic_structures_terminate() {
        let mut heap = Heap::new();
        let cell = heap.alloc_array(&[Value::int(0)], &[]);
        let handle = cell.handle().unwrap();
        heap.set(handle, 0, cell).unwrap();
        let rendered = heap.render(cell);
        assert!(rendered.contains("..."));
    }
}
