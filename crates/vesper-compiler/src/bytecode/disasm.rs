//! Bytecode disassembler
//!
//! Converts a chunk back to a human-readable listing. Used for
//! debugging, tests, and `vesper --disasm` output.

use super::{Chunk, Opcode};
use crate::value::Value;
use std::fmt::Write;

/// Disassemble a chunk to a human-readable listing
///
/// # Format
/// ```text
/// == <script> ==
/// 0000    1  Constant 0 (1)
/// 0002    |  DefineGlobal 1 ('x')
/// 0004    |  Nil
/// 0005    |  Return
/// ```
///
/// The line column prints `|` when the byte shares its source line with
/// the previous instruction.
pub fn disassemble(chunk: &Chunk, name: &str) -> String {
    let mut output = String::new();
    writeln!(output, "== {} ==", name).unwrap();

    let mut offset = 0;
    while offset < chunk.code.len() {
        let line = disassemble_instruction(chunk, &mut offset);
        writeln!(output, "{}", line).unwrap();
    }

    output
}

/// Disassemble a single instruction at the given offset
///
/// Advances `offset` past the instruction and its operands.
fn disassemble_instruction(chunk: &Chunk, offset: &mut usize) -> String {
    let start = *offset;
    let mut out = format!("{:04} {}", start, line_marker(chunk, start));

    let byte = chunk.code[*offset];
    *offset += 1;

    let opcode = match Opcode::try_from(byte) {
        Ok(op) => op,
        Err(_) => {
            write!(out, "  <invalid opcode: {:#04x}>", byte).unwrap();
            return out;
        }
    };

    match opcode {
        // Constant-pool operand
        Opcode::Constant
        | Opcode::GetGlobal
        | Opcode::DefineGlobal
        | Opcode::SetGlobal
        | Opcode::GetProperty
        | Opcode::GetPropertyNoPop
        | Opcode::SetProperty
        | Opcode::GetSuper
        | Opcode::Class
        | Opcode::Subclass
        | Opcode::Trait
        | Opcode::Method
        | Opcode::TraitMethod => {
            let index = read_u8(chunk, offset);
            write!(out, "  {:?} {} ({})", opcode, index, constant(chunk, index)).unwrap();
        }

        // Stack-slot or upvalue-slot operand
        Opcode::GetLocal | Opcode::SetLocal | Opcode::GetUpvalue | Opcode::SetUpvalue => {
            let slot = read_u8(chunk, offset);
            write!(out, "  {:?} {}", opcode, slot).unwrap();
        }

        Opcode::Call => {
            let args = read_u8(chunk, offset);
            write!(out, "  {:?} {}", opcode, args).unwrap();
        }

        // Argument count then method-name constant
        Opcode::Invoke | Opcode::Super => {
            let args = read_u8(chunk, offset);
            let index = read_u8(chunk, offset);
            write!(
                out,
                "  {:?} {} {} ({})",
                opcode,
                args,
                index,
                constant(chunk, index)
            )
            .unwrap();
        }

        // 16-bit jump offsets
        Opcode::Jump | Opcode::JumpIfFalse | Opcode::Break => {
            let jump = read_u16(chunk, offset);
            write!(out, "  {:?} {} -> {}", opcode, jump, *offset + jump as usize).unwrap();
        }
        Opcode::Loop => {
            let jump = read_u16(chunk, offset);
            write!(out, "  {:?} {} -> {}", opcode, jump, *offset - jump as usize).unwrap();
        }

        // Function constant followed by (is_local, index) pairs
        Opcode::Closure => {
            let index = read_u8(chunk, offset);
            write!(out, "  {:?} {} ({})", opcode, index, constant(chunk, index)).unwrap();

            let upvalue_count = match chunk.constants.get(index as usize) {
                Some(Value::Function(func)) => func.upvalue_count,
                _ => 0,
            };
            for _ in 0..upvalue_count {
                let is_local = read_u8(chunk, offset);
                let slot = read_u8(chunk, offset);
                let kind = if is_local == 1 { "local" } else { "upvalue" };
                write!(out, "\n        |  {} {}", kind, slot).unwrap();
            }
        }

        // Everything else takes no operand
        _ => {
            write!(out, "  {:?}", opcode).unwrap();
        }
    }

    out
}

fn line_marker(chunk: &Chunk, offset: usize) -> String {
    if offset > 0 && chunk.lines[offset] == chunk.lines[offset - 1] {
        "   |".to_string()
    } else {
        format!("{:>4}", chunk.lines[offset])
    }
}

fn constant(chunk: &Chunk, index: u8) -> String {
    match chunk.constants.get(index as usize) {
        Some(value) => value.to_string(),
        None => "<missing constant>".to_string(),
    }
}

fn read_u8(chunk: &Chunk, offset: &mut usize) -> u8 {
    let byte = chunk.code.get(*offset).copied().unwrap_or(0);
    *offset += 1;
    byte
}

fn read_u16(chunk: &Chunk, offset: &mut usize) -> u16 {
    let hi = read_u8(chunk, offset) as u16;
    let lo = read_u8(chunk, offset) as u16;
    (hi << 8) | lo
}
