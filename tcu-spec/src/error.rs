//! # Error Types for the TCU specification

use thiserror::Error;

#[derive(Debug, Error)]
pub enum SpecError {
    // ISA table errors
    #[error("Missing ISA key: {table}.{key}")]
    MissingKey { table: &'static str, key: String },

    #[error("Invalid width for field class `{class}`: {width} bits (valid range: 1-64)")]
    InvalidWidth { class: String, width: u32 },

    #[error("Invalid instruction size: {0} bits (must be a positive multiple of 8)")]
    InvalidInstructionSize(u32),

    #[error("{shape} shape needs {bits} bits but instructions are {word_bits} bits")]
    ShapeOverflow {
        shape: &'static str,
        bits: u32,
        word_bits: u32,
    },

    // Architecture errors
    #[error("Invalid architecture: {0}")]
    InvalidArchitecture(String),

    #[error("Value {value} is not representable as {data_type}")]
    RawOutOfRange { value: i64, data_type: &'static str },

    // Address errors
    #[error("Address {value} is not aligned to {granularity} ({unit})")]
    Misaligned {
        value: u64,
        granularity: u64,
        unit: &'static str,
    },

    #[error("Address {value} overflows when converted to {unit}")]
    AddressOverflow { value: u64, unit: &'static str },

    #[error("Row range {start}..{end} exceeds {space} depth {depth}")]
    OutOfRange {
        space: &'static str,
        start: u64,
        end: u64,
        depth: u64,
    },

    // Loading errors
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl SpecError {
    /// Check if this error means the specification itself is unusable
    pub fn is_configuration(&self) -> bool {
        matches!(
            self,
            SpecError::MissingKey { .. }
                | SpecError::InvalidWidth { .. }
                | SpecError::InvalidInstructionSize(_)
                | SpecError::ShapeOverflow { .. }
                | SpecError::InvalidArchitecture(_)
                | SpecError::Json(_)
        )
    }
}

pub type Result<T> = std::result::Result<T, SpecError>;
