pub mod alu;
pub mod block;
pub mod decode;
pub mod ops;
pub mod registers;

use thiserror::Error;

use crate::mem::MemoryError;

/// Errors surfaced by block execution and the core driver loop.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum CoreError {
    #[error(transparent)]
    Memory(#[from] MemoryError),

    /// Raised when `lock_on_undefined` is configured and an undefined opcode
    /// is decoded; otherwise undefined opcodes decode as NOP-equivalents.
    #[error("undefined instruction {opcode:#04x} at {address:#06x}")]
    UndefinedInstruction { address: u16, opcode: u8 },

    #[error("execution cancelled")]
    Cancelled,
}
