// skiff-vm - Bytecode interpreter and ahead-of-time stack verifier for the skiff VM
// Copyright (c) 2025 Tom Waddington. MIT licensed.

//! Console seam for the read and write builtins.

use std::collections::VecDeque;
use std::io::{self, BufRead, Write};

/// Integer I/O the VM performs on behalf of the program.
pub trait Console {
    /// Reads one integer; `None` on end of input or a non-numeric
    /// line.
    fn read_int(&mut self) -> Option<i32>;

    /// Writes one integer on its own line.
    fn write_int(&mut self, value: i32);
}

/// The process console: prompts on stdout, reads stdin lines.
#[derive(Debug, Default)]
pub struct StdConsole;

impl Console for StdConsole {
    fn read_int(&mut self) -> Option<i32> {
        print!("> ");
        io::stdout().flush().ok()?;
        let mut line = String::new();
        let read = io::stdin().lock().read_line(&mut line).ok()?;
        if read == 0 {
            return None;
        }
        line.trim().parse().ok()
    }

    fn write_int(&mut self, value: i32) {
        println!("{}", value);
    }
}

/// Scripted console: reads from a queue, collects writes. Used by
/// tests and anything embedding the VM without a terminal.
#[derive(Debug, Default)]
pub struct ScriptedConsole {
    input: VecDeque<i32>,
    output: Vec<i32>,
}

impl ScriptedConsole {
    pub fn new(input: &[i32]) -> ScriptedConsole {
        ScriptedConsole {
            input: input.iter().copied().collect(),
            output: Vec::new(),
        }
    }

    /// Everything the program has written so far.
    pub fn output(&self) -> &[i32] {
        &self.output
    }
}

impl Console for ScriptedConsole {
    fn read_int(&mut self) -> Option<i32> {
        self.input.pop_front()
    }

    fn write_int(&mut self, value: i32) {
        self.output.push(value);
    }
}
