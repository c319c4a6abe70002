use std::collections::HashMap;

use crate::bytecode::assemble_error::AssembleError;
use crate::bytecode::op::Opcode;
use crate::memory::{MemLayout, Variable, VmImage, VmMemory};
use crate::number::{Fixed, WORD};

// =============================================================================
// Assembler - builds a runnable memory image
// =============================================================================

/// Builds a [`VmImage`] by appending opcodes and immediate operands to the
/// program region, allocating data-region slots for variables, and resolving
/// label and slot references in a patching pass at [`Assembler::finalize`].
///
/// Emission is a single forward pass; resolution runs once after the whole
/// program has been emitted, so labels may be referenced before they are
/// bound and no symbol table survives into execution. `finalize` consumes
/// the assembler, so emitting after finalization is rejected at compile
/// time rather than left undefined.
pub struct Assembler {
    mem: VmMemory,
    layout: MemLayout,

    /// Declared variables, in declaration order. The slot offset is
    /// data-segment-relative until `finalize` knows where that segment
    /// starts.
    variables: Vec<String>,

    /// Bound labels: name -> program offset of the following instruction.
    labels: HashMap<String, usize>,

    /// Pending patches: operand position -> label name awaiting resolution.
    pending_labels: Vec<(usize, String)>,

    /// Pending patches: operand position -> variable awaiting its absolute
    /// slot offset.
    pending_slots: Vec<(usize, usize)>,
}

impl Assembler {
    pub fn new() -> Self {
        Self::with_layout(MemLayout::default())
    }

    pub fn with_layout(layout: MemLayout) -> Self {
        Assembler {
            mem: VmMemory::new(),
            layout,
            variables: Vec::new(),
            labels: HashMap::new(),
            pending_labels: Vec::new(),
            pending_slots: Vec::new(),
        }
    }

    /// Current emission offset: where the next instruction will land.
    pub fn here(&self) -> usize {
        self.mem.ip
    }

    pub fn emit_op(&mut self, op: Opcode) {
        self.mem.write_next_byte(op.byte());
    }

    /// Emits one constant word. Must immediately follow an opcode that
    /// expects an operand.
    pub fn emit_const(&mut self, value: Fixed) {
        self.mem.write_next_word(value.to_word());
    }

    /// Emits one constant word parsed from decimal-literal text.
    pub fn emit_number(&mut self, text: &str) -> Result<(), AssembleError> {
        let value: Fixed = text
            .parse()
            .map_err(|reason| AssembleError::invalid_number(text, reason))?;
        self.emit_const(value);
        Ok(())
    }

    /// Allocates the next data-region slot and binds `name` to it.
    pub fn declare_variable(&mut self, name: &str) -> Result<(), AssembleError> {
        if self.variables.iter().any(|v| v == name) {
            return Err(AssembleError::DuplicateVariable(name.to_string()));
        }
        self.variables.push(name.to_string());
        Ok(())
    }

    /// Emits `SetVariable` with a slot operand patched in at `finalize`.
    pub fn set_variable(&mut self, name: &str) -> Result<(), AssembleError> {
        self.variable_op(Opcode::SetVariable, name)
    }

    /// Emits `LoadVariable` with a slot operand patched in at `finalize`.
    pub fn load_variable(&mut self, name: &str) -> Result<(), AssembleError> {
        self.variable_op(Opcode::LoadVariable, name)
    }

    fn variable_op(&mut self, op: Opcode, name: &str) -> Result<(), AssembleError> {
        let slot = self
            .variables
            .iter()
            .position(|v| v == name)
            .ok_or_else(|| AssembleError::UnknownVariable(name.to_string()))?;
        self.emit_op(op);
        self.pending_slots.push((self.mem.ip, slot));
        self.emit_const(Fixed::ZERO);
        Ok(())
    }

    /// Binds `name` to the position of the instruction emitted next.
    pub fn set_label(&mut self, name: &str) -> Result<(), AssembleError> {
        if self.labels.contains_key(name) {
            return Err(AssembleError::DuplicateLabel(name.to_string()));
        }
        self.labels.insert(name.to_string(), self.mem.ip);
        Ok(())
    }

    /// Emits a jump to `label`: a `LoadConst` whose placeholder operand is
    /// patched with the resolved target, then the jump opcode itself. The
    /// conditional forms consume the value below the target word.
    pub fn goto_label(&mut self, label: &str, jump: Opcode) {
        self.emit_op(Opcode::LoadConst);
        self.pending_labels.push((self.mem.ip, label.to_string()));
        self.emit_const(Fixed::ZERO);
        self.emit_op(jump);
    }

    pub fn jump(&mut self, label: &str) {
        self.goto_label(label, Opcode::Jump);
    }

    pub fn jump_if_zero(&mut self, label: &str) {
        self.goto_label(label, Opcode::JumpIfZero);
    }

    pub fn jump_if_not_zero(&mut self, label: &str) {
        self.goto_label(label, Opcode::JumpIfNotZero);
    }

    pub fn jump_if_one(&mut self, label: &str) {
        self.goto_label(label, Opcode::JumpIfOne);
    }

    pub fn jump_if_not_one(&mut self, label: &str) {
        self.goto_label(label, Opcode::JumpIfNotOne);
    }

    /// Emits `CallNative` with the routine's table index as its operand.
    pub fn call_native(&mut self, index: usize) {
        self.emit_op(Opcode::CallNative);
        self.emit_const(Fixed::from_raw(index as i128));
    }

    /// Appends the terminal `Halt`, applies every pending slot and label
    /// patch, lays out the stack and data segments after the program, and
    /// returns the completed image with its instruction pointer reset.
    pub fn finalize(mut self) -> Result<VmImage, AssembleError> {
        self.emit_op(Opcode::Halt);

        let program_end = self.mem.ip;
        let stack_start = program_end.next_multiple_of(WORD);
        let stack_end = stack_start + self.layout.stack_words * WORD;
        let data_start = stack_end;
        let data_end = data_start + self.variables.len() * WORD;

        self.mem.bytes.resize(data_end, 0);
        // Stack and data segments start zeroed.
        self.mem.bytes[program_end..].fill(0);

        for (pos, name) in &self.pending_labels {
            let target = self
                .labels
                .get(name)
                .ok_or_else(|| AssembleError::UnresolvedLabel(name.clone()))?;
            self.mem
                .patch_word(*pos, Fixed::from_raw(*target as i128).to_word());
        }

        for (pos, slot) in &self.pending_slots {
            let offset = data_start + slot * WORD;
            self.mem
                .patch_word(*pos, Fixed::from_raw(offset as i128).to_word());
        }

        let variables = self
            .variables
            .into_iter()
            .enumerate()
            .map(|(slot, name)| Variable {
                name,
                offset: data_start + slot * WORD,
            })
            .collect();

        Ok(VmImage::new(
            self.mem.bytes,
            program_end,
            stack_start,
            stack_end,
            data_start,
            variables,
        ))
    }
}

impl Default for Assembler {
    fn default() -> Self {
        Self::new()
    }
}
