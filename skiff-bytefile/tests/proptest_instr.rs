// skiff-bytefile - Property-based tests for instruction encoding
// Copyright (c) 2025 Tom Waddington. MIT licensed.

//! Property-based tests for the instruction codec.
//!
//! Tests the following properties:
//! - A stream of instructions decodes back element by element
//! - `size` agrees with the bytes `encode` actually emits
//! - Any truncation of a single instruction is rejected

use proptest::prelude::*;
use skiff_bytefile::{DecodeError, Instr, VarSpec};

// =============================================================================
// Strategies
// =============================================================================

/// Instructions with no operands.
fn arb_plain() -> impl Strategy<Value = Instr> {
    prop::sample::select(vec![
        Instr::Add,
        Instr::Sub,
        Instr::Mul,
        Instr::Div,
        Instr::Mod,
        Instr::Lt,
        Instr::Le,
        Instr::Gt,
        Instr::Ge,
        Instr::Eq,
        Instr::Ne,
        Instr::And,
        Instr::Or,
        Instr::Sti,
        Instr::Sta,
        Instr::End,
        Instr::Ret,
        Instr::Drop,
        Instr::Dup,
        Instr::Swap,
        Instr::Elem,
        Instr::PattStrEq,
        Instr::PattString,
        Instr::PattArray,
        Instr::PattSexp,
        Instr::PattRef,
        Instr::PattVal,
        Instr::PattFun,
        Instr::ReadInt,
        Instr::WriteInt,
        Instr::Length,
        Instr::Stringify,
        Instr::Stop,
    ])
}

/// Instructions carrying one signed count.
fn arb_int_operand() -> impl Strategy<Value = Instr> {
    let families: Vec<fn(i32) -> Instr> = vec![
        Instr::Const,
        |len| Instr::Array { len },
        |len| Instr::MakeArray { len },
        |args| Instr::CallC { args },
    ];
    (prop::sample::select(families), any::<i32>()).prop_map(|(make, n)| make(n))
}

/// Instructions carrying one unsigned word.
fn arb_word_operand() -> impl Strategy<Value = Instr> {
    let families: Vec<fn(u32) -> Instr> = vec![
        Instr::String,
        Instr::Jmp,
        Instr::CJmpZ,
        Instr::CJmpNz,
        |number| Instr::Line { number },
    ];
    (prop::sample::select(families), any::<u32>()).prop_map(|(make, n)| make(n))
}

/// The twelve variable access instructions.
fn arb_var_access() -> impl Strategy<Value = Instr> {
    let families: Vec<fn(u32) -> Instr> = vec![
        Instr::LdGlobal,
        Instr::LdLocal,
        Instr::LdArg,
        Instr::LdCapture,
        Instr::LdaGlobal,
        Instr::LdaLocal,
        Instr::LdaArg,
        Instr::LdaCapture,
        Instr::StGlobal,
        Instr::StLocal,
        Instr::StArg,
        Instr::StCapture,
    ];
    (prop::sample::select(families), any::<u32>()).prop_map(|(make, index)| make(index))
}

fn arb_var_spec() -> impl Strategy<Value = VarSpec> {
    prop_oneof![
        Just(VarSpec::Global),
        Just(VarSpec::Local),
        Just(VarSpec::Arg),
        Just(VarSpec::Capture),
    ]
}

/// Every instruction shape the codec knows.
fn arb_instr() -> impl Strategy<Value = Instr> {
    let word_and_int: Vec<fn(u32, i32) -> Instr> = vec![
        |tag, arity| Instr::Sexp { tag, arity },
        |target, args| Instr::Call { target, args },
        |name, arity| Instr::Tag { name, arity },
    ];
    prop_oneof![
        arb_plain(),
        arb_int_operand(),
        arb_word_operand(),
        arb_var_access(),
        (prop::sample::select(word_and_int), any::<u32>(), any::<i32>())
            .prop_map(|(make, word, int)| make(word, int)),
        (any::<bool>(), any::<i32>(), any::<i32>()).prop_map(|(closure, args, locals)| {
            if closure {
                Instr::CBegin { args, locals }
            } else {
                Instr::Begin { args, locals }
            }
        }),
        (any::<u32>(), any::<u32>()).prop_map(|(line, column)| Instr::Fail { line, column }),
        (
            any::<u32>(),
            prop::collection::vec((arb_var_spec(), any::<u32>()), 0..5)
        )
            .prop_map(|(target, captures)| Instr::Closure { target, captures }),
    ]
}

// =============================================================================
// Properties
// =============================================================================

proptest! {
    #![proptest_config(ProptestConfig::with_cases(256))]

    /// Concatenated instructions come back one by one, each reporting
    /// the size it was encoded with.
    #[test]
    fn streams_decode_back_instruction_by_instruction(instrs in prop::collection::vec(arb_instr(), 1..20)) {
        let mut bytes = Vec::new();
        for instr in &instrs {
            let before = bytes.len();
            instr.encode(&mut bytes);
            prop_assert_eq!((bytes.len() - before) as u32, instr.size());
        }

        let mut offset = 0;
        for instr in &instrs {
            let (decoded, size) = Instr::decode(&bytes, offset).unwrap();
            prop_assert_eq!(&decoded, instr);
            prop_assert_eq!(size, instr.size());
            offset += size;
        }
        prop_assert_eq!(offset as usize, bytes.len());
    }

    /// Cutting an instruction short anywhere makes decoding fail
    /// rather than return a shorter instruction.
    #[test]
    fn truncated_instructions_are_rejected(
        (instr, cut) in arb_instr().prop_flat_map(|instr| {
            let size = instr.size();
            (Just(instr), 0..size)
        })
    ) {
        let mut bytes = Vec::new();
        instr.encode(&mut bytes);
        let err = Instr::decode(&bytes[..cut as usize], 0).unwrap_err();
        prop_assert_eq!(err, DecodeError::UnexpectedEnd { offset: 0 });
    }
}
