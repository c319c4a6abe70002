use crate::number::Fixed;

/// Run-time failure: terminates the dispatch loop cleanly and is carried in
/// the exit notification. Whatever stack/variable state existed at the
/// fault point stays inspectable; nothing is rolled back.
#[derive(Debug, Clone, PartialEq)]
pub enum Fault {
    StackUnderflow,
    StackOverflow,
    /// Divisor was zero; both operands are kept for the diagnostic.
    DivideByZero { a: Fixed, b: Fixed },
    /// An add/sub/mul/div result left the 128-bit range.
    NumericOverflow { op: &'static str },
    /// The decoder met a byte with no opcode assigned. An assembler defect:
    /// raised before any instruction runs.
    UnknownInstruction { byte: u8, offset: usize },
    /// A jump landed somewhere that is not an instruction boundary.
    InvalidJumpTarget { target: i128 },
    /// A variable operand does not point at a data-region slot.
    BadSlotOffset { offset: i128 },
    /// The program region ended without the terminal halt opcode.
    MissingHalt,
    /// A native call index outside the registered table. Carries the raw
    /// operand value, which may not even be a representable index.
    UnknownNative { index: i128 },
    /// A registered native routine reported an error.
    NativeFailure { index: i128, message: String },
    /// The host-configured instruction bound was exceeded.
    StepLimitExceeded { limit: u64 },
}

impl std::fmt::Display for Fault {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Fault::StackUnderflow => write!(f, "stack underflow"),
            Fault::StackOverflow => write!(f, "stack overflow"),
            Fault::DivideByZero { a, b } => {
                write!(f, "divide by zero (a={}; b={})", a, b)
            }
            Fault::NumericOverflow { op } => write!(f, "numeric overflow in {}", op),
            Fault::UnknownInstruction { byte, offset } => {
                write!(f, "unknown instruction {:#04x} at offset {}", byte, offset)
            }
            Fault::InvalidJumpTarget { target } => {
                write!(f, "jump target {} is not an instruction boundary", target)
            }
            Fault::BadSlotOffset { offset } => {
                write!(f, "offset {} is not a data slot", offset)
            }
            Fault::MissingHalt => write!(f, "program region ended without halt"),
            Fault::UnknownNative { index } => {
                write!(f, "no native routine registered at index {}", index)
            }
            Fault::NativeFailure { index, message } => {
                write!(f, "native routine {} failed: {}", index, message)
            }
            Fault::StepLimitExceeded { limit } => {
                write!(f, "execution step limit exceeded ({})", limit)
            }
        }
    }
}

impl std::error::Error for Fault {}

/// Final status of one run, delivered through the exit notification and
/// returned from `Engine::run`.
#[derive(Debug, Clone, PartialEq)]
pub enum ExitStatus {
    /// The program reached the terminal halt opcode.
    Completed,
    /// The run stopped on a fault.
    Faulted(Fault),
}

impl ExitStatus {
    pub fn is_success(&self) -> bool {
        matches!(self, ExitStatus::Completed)
    }

    pub fn fault(&self) -> Option<&Fault> {
        match self {
            ExitStatus::Completed => None,
            ExitStatus::Faulted(fault) => Some(fault),
        }
    }
}

impl std::fmt::Display for ExitStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ExitStatus::Completed => write!(f, "completed"),
            ExitStatus::Faulted(fault) => write!(f, "faulted: {}", fault),
        }
    }
}
