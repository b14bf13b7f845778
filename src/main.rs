// skiff - A bytecode virtual machine with ahead-of-time stack verification
// Copyright (c) 2025 Tom Waddington. MIT licensed.

use std::env;
use std::path::Path;
use std::process;

use skiff_bytefile::{Bytefile, Instr};
use skiff_vm::{verify, StdConsole, VM};

mod idioms;

fn main() {
    let args: Vec<String> = env::args().collect();

    // Handle --version flag
    if args.len() == 2 && (args[1] == "--version" || args[1] == "-v") {
        println!("skiff v0.1.0");
        return;
    }

    let result = if args.len() == 2 {
        run_program(&args[1])
    } else if args.len() == 3 && args[1] == "--disasm" {
        disassemble(&args[2])
    } else if args.len() == 3 && args[1] == "--idioms" {
        count_idioms(&args[2])
    } else {
        eprintln!("Usage: {} [--disasm | --idioms] <file.sbc>", args[0]);
        process::exit(1);
    };

    if let Err(e) = result {
        eprintln!("{}", e);
        process::exit(1);
    }
}

/// Load, verify and execute a program on the process console.
fn run_program(file_path: &str) -> Result<(), String> {
    let file = load(file_path)?;
    let verified = verify(&file).map_err(|e| e.to_string())?;
    let mut console = StdConsole;
    let mut vm = VM::new(&file, Some(&verified.layouts), &mut console);
    vm.run().map_err(|e| e.to_string())
}

/// Print a listing of the whole code area.
fn disassemble(file_path: &str) -> Result<(), String> {
    let file = load(file_path)?;
    let mut addr = 0;
    while addr < file.code_size() {
        let (instr, size) = Instr::decode(file.code(), addr)
            .map_err(|e| format!("{}. Bytecode offset: 0x{:x}", e, e.offset()))?;
        println!("0x{:04x}\t{}", addr, instr);
        addr += size;
    }
    Ok(())
}

/// Print the program's instruction sequences by frequency.
fn count_idioms(file_path: &str) -> Result<(), String> {
    let file = load(file_path)?;
    let mined = idioms::mine(&file).map_err(|e| e.to_string())?;
    for idiom in &mined {
        println!("{}", idiom);
    }
    Ok(())
}

/// Read a container file.
fn load(file_path: &str) -> Result<Bytefile, String> {
    Bytefile::load(Path::new(file_path))
        .map_err(|e| format!("Error loading '{}': {}", file_path, e))
}
