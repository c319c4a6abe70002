use serde::{Deserialize, Serialize};

use crate::number::WORD;

// =============================================================================
// Opcode - the closed instruction set
// =============================================================================

/// One opcode byte. Every instruction is the opcode followed by zero or one
/// immediate operand word; the operand size is static per opcode, so the
/// decoder can walk a program without executing it.
///
/// Byte values start at 1: a zero byte in the program region always decodes
/// as an unknown instruction, which catches runs into zeroed memory.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[repr(u8)]
pub enum Opcode {
    /// Push the operand word.
    LoadConst = 1,
    /// Push the word at the slot offset given by the operand.
    LoadVariable,
    /// Pop into the slot offset given by the operand.
    SetVariable,
    /// Duplicate the top word.
    Dup,

    Add,
    Sub,
    Mul,
    Div,

    /// Pop one word, push 1 if it was zero, else 0.
    Not,
    And,
    Or,
    Equals,
    NotEquals,
    LessThan,

    /// Pop the target word, jump unconditionally.
    Jump,
    /// Pop target, pop value; jump when the value is zero.
    JumpIfZero,
    JumpIfNotZero,
    JumpIfOne,
    JumpIfNotOne,

    /// Invoke the native-table routine at the index in the operand word.
    CallNative,

    /// Terminal opcode: stop the run loop.
    Halt,
}

impl Opcode {
    pub const fn byte(self) -> u8 {
        self as u8
    }

    pub fn from_byte(b: u8) -> Option<Self> {
        use Opcode::*;
        Some(match b {
            1 => LoadConst,
            2 => LoadVariable,
            3 => SetVariable,
            4 => Dup,
            5 => Add,
            6 => Sub,
            7 => Mul,
            8 => Div,
            9 => Not,
            10 => And,
            11 => Or,
            12 => Equals,
            13 => NotEquals,
            14 => LessThan,
            15 => Jump,
            16 => JumpIfZero,
            17 => JumpIfNotZero,
            18 => JumpIfOne,
            19 => JumpIfNotOne,
            20 => CallNative,
            21 => Halt,
            _ => return None,
        })
    }

    /// Immediate operand size in bytes. Statically known per opcode.
    pub const fn operand_size(self) -> usize {
        use Opcode::*;
        match self {
            LoadConst | LoadVariable | SetVariable | CallNative => WORD,
            _ => 0,
        }
    }

    pub const fn mnemonic(self) -> &'static str {
        use Opcode::*;
        match self {
            LoadConst => "load-const",
            LoadVariable => "load-var",
            SetVariable => "set-var",
            Dup => "dup",
            Add => "add",
            Sub => "sub",
            Mul => "mul",
            Div => "div",
            Not => "not",
            And => "and",
            Or => "or",
            Equals => "eq",
            NotEquals => "ne",
            LessThan => "lt",
            Jump => "jmp",
            JumpIfZero => "jz",
            JumpIfNotZero => "jnz",
            JumpIfOne => "jone",
            JumpIfNotOne => "jnone",
            CallNative => "call-native",
            Halt => "halt",
        }
    }
}
