pub mod engine;
pub mod fault;
pub mod natives;

pub use engine::{Engine, EngineConfig, ExitHook};
pub use fault::{ExitStatus, Fault};
pub use natives::{NativeFn, NativeRegistry};
