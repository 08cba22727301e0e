//! Disassembler errors

use tcu_assembler::EncodeError;
use tcu_spec::SpecError;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum DisassemblerError {
    #[error("Unknown opcode: 0x{0:02X}")]
    UnknownOpcode(u64),

    #[error("Invalid instruction encoding: {reason}")]
    InvalidEncoding { reason: String },

    #[error("Stream of {len} bytes is not a whole number of {word_bytes}-byte instructions")]
    Truncated { len: usize, word_bytes: usize },

    #[error("Encoding error: {0}")]
    Encode(#[from] EncodeError),

    #[error("Specification error: {0}")]
    Spec(#[from] SpecError),
}

pub type Result<T> = std::result::Result<T, DisassemblerError>;
