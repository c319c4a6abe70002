//! cinder - a fixed-point bytecode virtual machine.
//!
//! The crate is the pair {bytecode assembler, execution engine} plus the
//! exact fixed-point number they share:
//!
//! - [`number::Fixed`]: a scaled 128-bit signed integer (19 decimal
//!   fraction digits) whose multiply/divide widen to 256 bits internally,
//!   so arithmetic is exact with no intermediate overflow.
//! - [`bytecode::Assembler`]: lays out opcodes, constants, and variable
//!   slots into a linear [`memory::VmImage`], resolving label and slot
//!   references in a single patching pass at finalization.
//! - [`runtime::Engine`]: decodes a finished image once, then runs a tight
//!   dispatch loop until the terminal halt or a fault, reporting the
//!   outcome through an exit notification.
//!
//! Execution is single-threaded and run-to-completion; the engine borrows
//! the image only for the duration of one run. Host routines are exposed to
//! programs through [`runtime::NativeRegistry`], an ordered call table
//! dispatched by index.

pub mod bytecode;
pub mod memory;
pub mod number;
pub mod runtime;

pub use bytecode::{AssembleError, Assembler, Opcode};
pub use memory::{MemLayout, Variable, VmImage};
pub use number::{Fixed, SCALE, WORD};
pub use runtime::{Engine, EngineConfig, ExitStatus, Fault, NativeRegistry};
