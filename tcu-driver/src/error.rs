//! Driver error types

use std::time::Duration;
use tcu_assembler::EncodeError;
use tcu_disassembler::DisassemblerError;
use tcu_spec::{Architecture, SpecError};
use thiserror::Error;

/// Errors reported by a remote execution service
#[derive(Debug, Error)]
pub enum ServiceError {
    #[error("Remote instance is not up")]
    NotUp,

    #[error("Unknown buffer: {0}")]
    UnknownBuffer(String),

    #[error("Buffer already allocated: {0}")]
    BufferExists(String),

    #[error("Unknown DMA channel: {0}")]
    UnknownChannel(String),

    #[error("Access {offset:#x}..{end:#x} outside buffer {name} of {size} bytes")]
    OutOfRange {
        name: String,
        offset: u64,
        end: u64,
        size: u64,
    },

    #[error("Payload of {len} bytes exceeds the {max}-byte limit")]
    PayloadTooLarge { len: usize, max: usize },

    #[error("DMA on channel {channel} did not complete within {timeout:?}")]
    DmaTimeout { channel: String, timeout: Duration },

    #[error("Device error: {0}")]
    Device(String),

    #[error("Transport error: {0}")]
    Transport(String),
}

#[derive(Debug, Error)]
pub enum DriverError {
    #[error("Specification error: {0}")]
    Spec(#[from] SpecError),

    #[error("Encoding error: {0}")]
    Encode(#[from] EncodeError),

    #[error("Decoding error: {0}")]
    Disassembler(#[from] DisassemblerError),

    #[error("Service error: {0}")]
    Service(#[from] ServiceError),

    #[error("Configuration error: {0}")]
    Configuration(String),

    #[error("Model requires architecture {model:?} but the driver runs {driver:?}")]
    ArchitectureMismatch {
        model: Box<Architecture>,
        driver: Box<Architecture>,
    },

    #[error("Transfer to {buffer} failed at chunk {chunk} (offset {offset:#x}): {source}")]
    Transfer {
        buffer: String,
        chunk: usize,
        offset: u64,
        source: ServiceError,
    },

    #[error("Access {offset:#x}+{len} outside {buffer} of {size} bytes")]
    OutOfBounds {
        buffer: String,
        offset: u64,
        len: u64,
        size: u64,
    },

    #[error("Flush not observed after {polls} polls in {elapsed:?}")]
    SynchronizationTimeout { elapsed: Duration, polls: u64 },

    #[error("Model not loaded")]
    ModelNotLoaded,

    #[error("Missing input: {0}")]
    MissingInput(String),

    #[error("Input {name} has {len} values but its region holds {capacity}")]
    InputTooLarge {
        name: String,
        len: usize,
        capacity: usize,
    },

    #[error("Model region {name} (rows {start}..{end}) must end at or before DRAM0 row {limit}")]
    InvalidPlacement {
        name: String,
        start: u64,
        end: u64,
        limit: u64,
    },

    #[error("Driver is closed")]
    Closed,

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

impl DriverError {
    /// The caller may retry or continue with the same driver
    pub fn is_recoverable(&self) -> bool {
        matches!(
            self,
            DriverError::Transfer { .. }
                | DriverError::SynchronizationTimeout { .. }
                | DriverError::MissingInput(_)
                | DriverError::InputTooLarge { .. }
                | DriverError::Service(ServiceError::DmaTimeout { .. })
        )
    }

    /// The driver was set up against the wrong ISA, architecture or settings
    pub fn is_configuration(&self) -> bool {
        match self {
            DriverError::Spec(err) => err.is_configuration(),
            DriverError::Encode(err) => err.is_configuration(),
            DriverError::Configuration(_)
            | DriverError::ArchitectureMismatch { .. }
            | DriverError::InvalidPlacement { .. }
            | DriverError::Json(_) => true,
            _ => false,
        }
    }
}

pub type Result<T> = std::result::Result<T, DriverError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_transfer_display() {
        let err = DriverError::Transfer {
            buffer: "d0".to_string(),
            chunk: 3,
            offset: 0x30_0000,
            source: ServiceError::Transport("connection reset".to_string()),
        };
        assert_eq!(
            err.to_string(),
            "Transfer to d0 failed at chunk 3 (offset 0x300000): Transport error: connection reset"
        );
        assert!(err.is_recoverable());
        assert!(std::error::Error::source(&err).is_some());
    }

    #[test]
    fn test_timeout_is_recoverable() {
        let err = DriverError::SynchronizationTimeout {
            elapsed: Duration::from_millis(10),
            polls: 4,
        };
        assert!(err.is_recoverable());
        assert!(!err.is_configuration());
    }

    #[test]
    fn test_configuration_classification() {
        assert!(DriverError::Configuration("chunk size".to_string()).is_configuration());
        assert!(!DriverError::Configuration("chunk size".to_string()).is_recoverable());

        let mismatch = DriverError::ArchitectureMismatch {
            model: Box::new(Architecture::pynq_z1()),
            driver: Box::new(Architecture::pynq_z1()),
        };
        assert!(mismatch.is_configuration());

        let spec: DriverError = SpecError::InvalidInstructionSize(7).into();
        assert!(spec.is_configuration());
    }

    #[test]
    fn test_service_error_from() {
        let err: DriverError = ServiceError::NotUp.into();
        assert_eq!(err.to_string(), "Service error: Remote instance is not up");
        assert!(!err.is_recoverable());
    }
}
