//! Encoder errors

use tcu_spec::SpecError;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum EncodeError {
    #[error("Specification error: {0}")]
    Spec(#[from] SpecError),

    #[error("Unknown field: {field}")]
    UnknownField { field: String },

    #[error("Invalid width for field {field}: {width} bits (valid range: 0-64)")]
    InvalidWidth { field: String, width: u32 },

    #[error("Fields need {bits} bits but the instruction word is {word_bits} bits")]
    WordOverflow { bits: u32, word_bits: u32 },

    #[error("Invalid instruction word size: {0} bits")]
    InvalidWordSize(u32),

    #[error("Value {value:#x} does not fit field {field} ({width} bits)")]
    ValueOutOfRange { field: String, value: u64, width: u32 },

    #[error("ISA value {table}.{key} = {value:#x} does not fit in {width} bits")]
    ValueTooWide {
        table: &'static str,
        key: &'static str,
        value: u64,
        width: u32,
    },
}

impl EncodeError {
    /// The field table or ISA does not match what is being encoded
    pub fn is_configuration(&self) -> bool {
        match self {
            EncodeError::Spec(err) => err.is_configuration(),
            EncodeError::UnknownField { .. }
            | EncodeError::InvalidWidth { .. }
            | EncodeError::WordOverflow { .. }
            | EncodeError::InvalidWordSize(_)
            | EncodeError::ValueTooWide { .. } => true,
            EncodeError::ValueOutOfRange { .. } => false,
        }
    }

    /// A field value exceeds its width
    pub fn is_range(&self) -> bool {
        matches!(self, EncodeError::ValueOutOfRange { .. })
    }
}

pub type Result<T> = std::result::Result<T, EncodeError>;
