//! # TCU Specification
//!
//! Declarative description of the tensor compute unit toolchain:
//!
//! - [`IsaSpec`]: externally supplied opcode and field-width tables for the
//!   VTA-style instruction shapes (memory, GEMM, ALU)
//! - [`Shape`] / [`ShapeLayout`]: closed field lists per shape, resolved
//!   against an [`IsaSpec`] into bit offsets
//! - [`Instruction`]: the concrete instruction kinds (load, store, gemm,
//!   alu, addi, finish, nop)
//! - [`Architecture`] / [`DataType`]: accelerator parameters
//! - [`Layout`] / [`TcuInstruction`]: the architecture-derived instruction
//!   format consumed by the TCU driver
//! - [`AddressUnits`]: conversions between byte, scalar and row addresses

pub mod error;
pub mod isa;
pub mod shape;
pub mod instruction;
pub mod architecture;
pub mod address;
pub mod opcode;
pub mod layout;

pub use error::{SpecError, Result};
pub use isa::{IsaSpec, IsaValues, WidthClass};
pub use shape::{FieldName, FieldSlot, Shape, ShapeLayout};
pub use instruction::{AluFunc, AluOp, DepFlags, GemmOp, Instruction, MemOp};
pub use architecture::{Architecture, DataType};
pub use address::{AddressSpace, AddressUnits, ByteOffset, DramBank, RowAddress, ScalarAddress};
pub use opcode::{ConfigRegister, DataMoveFlag, Opcode};
pub use layout::{Layout, StridedAddress, TcuInstruction};

/// Device address-offset registers count in blocks of this many bytes
pub const TCU_BLOCK_SIZE: u64 = 1 << 16;

/// Instruction word size of the reference VTA configuration
pub const VTA_INSTRUCTION_BITS: u32 = 128;
