use std::collections::HashMap;

use crate::bytecode::op::Opcode;
use crate::memory::VmImage;
use crate::number::Fixed;
use crate::runtime::fault::{ExitStatus, Fault};
use crate::runtime::natives::NativeRegistry;

/// Host-side execution limits.
#[derive(Debug, Clone, Default)]
pub struct EngineConfig {
    /// Upper bound on executed instructions; `None` runs to completion.
    /// The engine has no cancellation primitive of its own, so a host that
    /// needs a timeout bounds the step count here.
    pub max_steps: Option<u64>,
}

/// What a handler tells the dispatch loop to do next.
enum Control {
    Continue,
    Halt,
}

/// Invoked once per run with the final image state and exit status.
pub type ExitHook = Box<dyn FnMut(&VmImage, &ExitStatus)>;

// =============================================================================
// Engine - decode pass + dispatch loop
// =============================================================================

/// Executes a finished [`VmImage`].
///
/// A run has three phases: a one-time decode pass that maps every
/// instruction-pointer position in the program region to its opcode, the
/// dispatch loop, and the terminal halted/faulted state delivered through
/// the exit notification. The engine borrows the image mutably for the
/// duration of [`Engine::run`] only; the caller keeps ownership and can
/// inspect whatever state the program left behind.
pub struct Engine {
    config: EngineConfig,
    natives: NativeRegistry,
    pub on_start: Option<Box<dyn FnMut()>>,
    pub on_exit: Option<ExitHook>,
}

impl Engine {
    pub fn new(natives: NativeRegistry) -> Self {
        Self::with_config(natives, EngineConfig::default())
    }

    pub fn with_config(natives: NativeRegistry, config: EngineConfig) -> Self {
        Engine {
            config,
            natives,
            on_start: None,
            on_exit: None,
        }
    }

    /// Decodes and runs the image until halt or fault. The exit hook fires
    /// exactly once, after which the status is also returned.
    pub fn run(&mut self, image: &mut VmImage) -> ExitStatus {
        image.ip = 0;

        let status = match Self::decode(image) {
            Ok(table) => {
                if let Some(hook) = self.on_start.as_mut() {
                    hook();
                }
                self.execute(image, &table)
            }
            Err(fault) => ExitStatus::Faulted(fault),
        };

        if let Some(hook) = self.on_exit.as_mut() {
            hook(image, &status);
        }
        status
    }

    /// One-time decode pass: walk the program region from its first byte,
    /// mapping byte offset -> opcode. Operand sizes are static, so the scan
    /// advances without executing anything and stops at the terminal halt.
    /// A byte with no opcode is an assembler defect caught here, before any
    /// code runs.
    fn decode(image: &VmImage) -> Result<HashMap<usize, Opcode>, Fault> {
        let mut table = HashMap::new();
        let mut pos = 0;

        loop {
            let byte = image.program_byte(pos).ok_or(Fault::MissingHalt)?;
            let op = Opcode::from_byte(byte).ok_or(Fault::UnknownInstruction { byte, offset: pos })?;
            table.insert(pos, op);
            if op == Opcode::Halt {
                return Ok(table);
            }
            pos += 1 + op.operand_size();
        }
    }

    fn execute(&mut self, image: &mut VmImage, table: &HashMap<usize, Opcode>) -> ExitStatus {
        let mut steps: u64 = 0;

        loop {
            if let Some(limit) = self.config.max_steps {
                steps += 1;
                if steps > limit {
                    return ExitStatus::Faulted(Fault::StepLimitExceeded { limit });
                }
            }

            // Sequential advances stay on boundaries by construction, so a
            // miss here means a jump went somewhere illegal.
            let Some(op) = table.get(&image.ip).copied() else {
                return ExitStatus::Faulted(Fault::InvalidJumpTarget {
                    target: image.ip as i128,
                });
            };

            match self.step(image, op) {
                Ok(Control::Continue) => {}
                Ok(Control::Halt) => return ExitStatus::Completed,
                Err(fault) => return ExitStatus::Faulted(fault),
            }
        }
    }

    /// Executes one instruction. Each handler advances the instruction
    /// pointer itself: sequential ones step past their opcode and operand,
    /// jumps overwrite it with the target.
    fn step(&mut self, image: &mut VmImage, op: Opcode) -> Result<Control, Fault> {
        match op {
            Opcode::LoadConst => {
                let value = image.operand_word(image.ip + 1)?;
                image.push(value)?;
            }
            Opcode::LoadVariable => {
                let offset = image.operand_word(image.ip + 1)?.raw();
                let value = image.read_slot(offset)?;
                image.push(value)?;
            }
            Opcode::SetVariable => {
                let offset = image.operand_word(image.ip + 1)?.raw();
                let value = image.pop()?;
                image.write_slot(offset, value)?;
            }
            Opcode::Dup => {
                let top = image.peek()?;
                image.push(top)?;
            }

            Opcode::Add => Self::binary(image, |a, b| {
                a.checked_add(b).ok_or(Fault::NumericOverflow { op: "add" })
            })?,
            Opcode::Sub => Self::binary(image, |a, b| {
                a.checked_sub(b).ok_or(Fault::NumericOverflow { op: "sub" })
            })?,
            Opcode::Mul => Self::binary(image, |a, b| {
                a.checked_mul(b).ok_or(Fault::NumericOverflow { op: "mul" })
            })?,
            Opcode::Div => Self::binary(image, |a, b| {
                if b.is_zero() {
                    return Err(Fault::DivideByZero { a, b });
                }
                a.checked_div(b).ok_or(Fault::NumericOverflow { op: "div" })
            })?,

            Opcode::Not => {
                let a = image.pop()?;
                image.push(bool_word(a.is_zero()))?;
            }
            Opcode::And => Self::binary(image, |a, b| {
                Ok(bool_word(!a.is_zero() && !b.is_zero()))
            })?,
            Opcode::Or => Self::binary(image, |a, b| {
                Ok(bool_word(!a.is_zero() || !b.is_zero()))
            })?,
            Opcode::Equals => Self::binary(image, |a, b| Ok(bool_word(a == b)))?,
            Opcode::NotEquals => Self::binary(image, |a, b| Ok(bool_word(a != b)))?,
            Opcode::LessThan => Self::binary(image, |a, b| Ok(bool_word(a < b)))?,

            Opcode::Jump => {
                let target = Self::pop_target(image)?;
                image.ip = target;
                return Ok(Control::Continue);
            }
            Opcode::JumpIfZero => return Self::conditional_jump(image, op, |v| v.is_zero()),
            Opcode::JumpIfNotZero => return Self::conditional_jump(image, op, |v| !v.is_zero()),
            Opcode::JumpIfOne => return Self::conditional_jump(image, op, |v| v == Fixed::ONE),
            Opcode::JumpIfNotOne => return Self::conditional_jump(image, op, |v| v != Fixed::ONE),

            Opcode::CallNative => {
                let raw = image.operand_word(image.ip + 1)?.raw();
                let index = usize::try_from(raw).map_err(|_| Fault::UnknownNative { index: raw })?;
                let routine = self
                    .natives
                    .get_mut(index)
                    .ok_or(Fault::UnknownNative { index: raw })?;
                routine(image).map_err(|message| Fault::NativeFailure { index: raw, message })?;
            }

            Opcode::Halt => return Ok(Control::Halt),
        }

        image.ip += 1 + op.operand_size();
        Ok(Control::Continue)
    }

    /// Pops b then a, pushes `f(a, b)`.
    fn binary(
        image: &mut VmImage,
        f: impl FnOnce(Fixed, Fixed) -> Result<Fixed, Fault>,
    ) -> Result<(), Fault> {
        let b = image.pop()?;
        let a = image.pop()?;
        image.push(f(a, b)?)
    }

    /// Pops the target, then the value; jumps when the predicate holds.
    fn conditional_jump(
        image: &mut VmImage,
        op: Opcode,
        predicate: impl FnOnce(Fixed) -> bool,
    ) -> Result<Control, Fault> {
        let target = Self::pop_target(image)?;
        let value = image.pop()?;
        if predicate(value) {
            image.ip = target;
        } else {
            image.ip += 1 + op.operand_size();
        }
        Ok(Control::Continue)
    }

    fn pop_target(image: &mut VmImage) -> Result<usize, Fault> {
        let raw = image.pop()?.raw();
        usize::try_from(raw).map_err(|_| Fault::InvalidJumpTarget { target: raw })
    }
}

fn bool_word(b: bool) -> Fixed {
    if b { Fixed::ONE } else { Fixed::ZERO }
}
