//! # TCU Disassembler
//!
//! Reverse direction of `tcu-assembler`: unpack instruction words back into
//! field sets, recover instruction kinds and render streams as text.
//!
//! Both instruction families are supported:
//!
//! - VTA-style shapes, decoded against an [`Encoder`](tcu_assembler::Encoder)
//!   so the same ISA tables drive both directions
//! - the architecture-derived TCU format, decoded against a
//!   [`Layout`](tcu_spec::Layout)
//!
//! ## Example
//!
//! ```rust
//! use tcu_assembler::Encoder;
//! use tcu_disassembler::decode;
//! use tcu_spec::{DepFlags, Instruction, IsaSpec};
//!
//! let encoder = Encoder::new(IsaSpec::vta()).unwrap();
//! let word = encoder.encode(&Instruction::Finish(DepFlags::NONE)).unwrap();
//! assert_eq!(decode(&encoder, word.as_bytes()).unwrap(), Instruction::Finish(DepFlags::NONE));
//! ```

pub mod error;
pub mod decoder;
pub mod formatter;
pub mod disassembler;

pub use error::{DisassemblerError, Result};
pub use decoder::{decode, decode_tcu, unpack};
pub use formatter::{format, format_tcu};
pub use disassembler::{disassemble, disassemble_tcu};
