pub mod assemble;
pub mod assemble_error;
pub mod disasm;
pub mod op;

pub use assemble::Assembler;
pub use assemble_error::AssembleError;
pub use op::Opcode;
