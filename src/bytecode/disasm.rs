use std::fmt::Write as _;

use crate::bytecode::op::Opcode;
use crate::memory::VmImage;
use crate::number::{Fixed, WORD};

/// Renders the program region of an image instruction by instruction.
///
/// Best-effort: a byte with no opcode is rendered as `??` and the walk
/// stops there, since operand sizes are unknowable past that point.
pub fn disassemble(image: &VmImage) -> String {
    let program = image.program();
    let mut out = String::new();
    let mut pos = 0;

    while pos < program.len() {
        let byte = program[pos];
        let Some(op) = Opcode::from_byte(byte) else {
            let _ = writeln!(out, "{:04}   ?? ({:#04x})", pos, byte);
            break;
        };

        let _ = write!(out, "{:04}   {}", pos, op.mnemonic());

        if op.operand_size() == WORD && pos + 1 + WORD <= program.len() {
            let word: [u8; WORD] = program[pos + 1..pos + 1 + WORD]
                .try_into()
                .unwrap_or([0; WORD]);
            let value = Fixed::from_word(word);
            let _ = match op {
                Opcode::LoadConst => write!(out, " {}", value),
                Opcode::CallNative => write!(out, " #{}", value.raw()),
                // Variable operands carry patched absolute slot offsets;
                // show the name when the offset matches a declared slot.
                Opcode::LoadVariable | Opcode::SetVariable => {
                    let offset = value.raw();
                    match image
                        .variables()
                        .iter()
                        .find(|v| v.offset as i128 == offset)
                    {
                        Some(var) => write!(out, " {} (@{})", var.name, offset),
                        None => write!(out, " @{}", offset),
                    }
                }
                _ => Ok(()),
            };
        }

        let _ = writeln!(out);
        if op == Opcode::Halt {
            break;
        }
        pos += 1 + op.operand_size();
    }

    out
}
