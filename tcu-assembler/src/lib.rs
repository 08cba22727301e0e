//! TCU Instruction Encoder
//!
//! Packs heterogeneous-width integer fields into fixed-size instruction
//! words. Two instruction families share the same packer:
//!
//! - VTA-style shapes described by an [`IsaSpec`](tcu_spec::IsaSpec), encoded
//!   through [`Encoder`]
//! - the architecture-derived TCU format described by a
//!   [`Layout`](tcu_spec::Layout), encoded through [`tcu::encode`]
//!
//! ## Example
//!
//! ```rust
//! use tcu_assembler::Encoder;
//! use tcu_spec::{DepFlags, Instruction, IsaSpec};
//!
//! let encoder = Encoder::new(IsaSpec::vta()).unwrap();
//! let word = encoder.encode(&Instruction::Finish(DepFlags::NONE)).unwrap();
//! assert_eq!(word.as_bytes()[0], 3);
//! ```

pub mod error;
pub mod packer;
pub mod encoder;
pub mod tcu;
pub mod assembler;

pub use error::{EncodeError, Result};
pub use packer::{pack, Field, FieldSet, InstructionWord};
pub use encoder::{Encoder, ResolvedValues};
pub use assembler::{assemble, assemble_tcu};
