//! # TCU Instruction Layout
//!
//! The TCU instruction format is derived from the [`Architecture`]: each
//! operand is wide enough for the largest address it carries plus a stride,
//! rounded up to a whole byte.
//!
//! ```text
//! MSB                                                    LSB
//! | opcode:4 | flags:4 | operand2 | operand1 | operand0 |
//! ```
//!
//! - operand0: local or accumulator address, stride0
//! - operand1: any memory address, stride1
//! - operand2: local or accumulator address (row counts)

use crate::architecture::Architecture;
use crate::error::Result;
use crate::opcode::{ConfigRegister, DataMoveFlag, Opcode};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Flags field width
pub const FLAGS_BITS: u32 = 4;

/// Bits needed to address `depth` distinct values
pub fn bits_for(depth: u64) -> u32 {
    if depth <= 1 {
        0
    } else {
        64 - (depth - 1).leading_zeros()
    }
}

fn round_to_byte(bits: u32) -> u32 {
    bits.div_ceil(8) * 8
}

/// Operand widths of the TCU instruction format
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct Layout {
    pub op0_address_bits: u32,
    pub op0_stride_bits: u32,
    pub op0_bits: u32,
    pub op1_address_bits: u32,
    pub op1_stride_bits: u32,
    pub op1_bits: u32,
    pub op2_address_bits: u32,
    pub op2_bits: u32,
}

impl Layout {
    pub fn new(arch: &Architecture) -> Result<Self> {
        arch.validate()?;

        let local = bits_for(arch.local_depth);
        let acc = bits_for(arch.accumulator_depth);

        let op0_address_bits = local.max(acc);
        let op0_stride_bits = bits_for(arch.stride0_depth);
        let op1_address_bits = local
            .max(bits_for(arch.dram0_depth))
            .max(bits_for(arch.dram1_depth))
            .max(acc);
        let op1_stride_bits = bits_for(arch.stride1_depth);
        let op2_address_bits = local.max(acc);

        Ok(Layout {
            op0_address_bits,
            op0_stride_bits,
            op0_bits: round_to_byte(op0_address_bits + op0_stride_bits),
            op1_address_bits,
            op1_stride_bits,
            op1_bits: round_to_byte(op1_address_bits + op1_stride_bits),
            op2_address_bits,
            op2_bits: round_to_byte(op2_address_bits),
        })
    }

    /// Header (flags and opcode) width
    #[inline]
    pub const fn header_bits(&self) -> u32 {
        FLAGS_BITS + Opcode::BITS
    }

    #[inline]
    pub const fn instruction_bits(&self) -> u32 {
        self.op0_bits + self.op1_bits + self.op2_bits + self.header_bits()
    }

    #[inline]
    pub const fn instruction_bytes(&self) -> usize {
        (self.instruction_bits() / 8) as usize
    }
}

impl fmt::Display for Layout {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "instruction {} bits (op0 {} = {}+{}, op1 {} = {}+{}, op2 {} = {}, header {})",
            self.instruction_bits(),
            self.op0_bits,
            self.op0_address_bits,
            self.op0_stride_bits,
            self.op1_bits,
            self.op1_address_bits,
            self.op1_stride_bits,
            self.op2_bits,
            self.op2_address_bits,
            self.header_bits()
        )
    }
}

/// Row address with a log2 stride
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct StridedAddress {
    pub address: u64,
    /// Step between consecutive rows is `1 << stride`
    pub stride: u64,
}

impl StridedAddress {
    pub const fn new(address: u64) -> Self {
        StridedAddress { address, stride: 0 }
    }
}

/// An instruction of the TCU format
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum TcuInstruction {
    NoOp,
    MatMul {
        accumulate: bool,
        /// Feed zeroes instead of local rows
        zeroes: bool,
        local: StridedAddress,
        accumulator: StridedAddress,
        /// Row count minus one
        size: u64,
    },
    DataMove {
        flag: DataMoveFlag,
        local: StridedAddress,
        /// DRAM or accumulator row
        address: StridedAddress,
        /// Row count minus one
        size: u64,
    },
    LoadWeights {
        zeroes: bool,
        local: StridedAddress,
        /// Row count minus one
        size: u64,
    },
    Configure {
        register: ConfigRegister,
        value: u64,
    },
}

impl TcuInstruction {
    /// Unstrided data move of `size + 1` rows
    pub const fn data_move(flag: DataMoveFlag, local: u64, address: u64, size: u64) -> Self {
        TcuInstruction::DataMove {
            flag,
            local: StridedAddress::new(local),
            address: StridedAddress::new(address),
            size,
        }
    }

    pub const fn configure(register: ConfigRegister, value: u64) -> Self {
        TcuInstruction::Configure { register, value }
    }

    pub const fn opcode(&self) -> Opcode {
        match self {
            TcuInstruction::NoOp => Opcode::NoOp,
            TcuInstruction::MatMul { .. } => Opcode::MatMul,
            TcuInstruction::DataMove { .. } => Opcode::DataMove,
            TcuInstruction::LoadWeights { .. } => Opcode::LoadWeights,
            TcuInstruction::Configure { .. } => Opcode::Configure,
        }
    }

    /// Value of the flags nibble
    pub const fn flags(&self) -> u8 {
        match self {
            TcuInstruction::NoOp | TcuInstruction::Configure { .. } => 0,
            TcuInstruction::MatMul {
                accumulate, zeroes, ..
            } => (*accumulate as u8) | ((*zeroes as u8) << 1),
            TcuInstruction::DataMove { flag, .. } => flag.to_u8(),
            TcuInstruction::LoadWeights { zeroes, .. } => *zeroes as u8,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_bits_for() {
        assert_eq!(bits_for(0), 0);
        assert_eq!(bits_for(1), 0);
        assert_eq!(bits_for(2), 1);
        assert_eq!(bits_for(8), 3);
        assert_eq!(bits_for(9), 4);
        assert_eq!(bits_for(8192), 13);
        assert_eq!(bits_for(1 << 20), 20);
    }

    #[test]
    fn test_pynq_layout() {
        let layout = Layout::new(&Architecture::pynq_z1()).unwrap();
        assert_eq!(layout.op0_address_bits, 13);
        assert_eq!(layout.op0_stride_bits, 3);
        assert_eq!(layout.op0_bits, 16);
        assert_eq!(layout.op1_address_bits, 20);
        assert_eq!(layout.op1_bits, 24);
        assert_eq!(layout.op2_bits, 16);
        assert_eq!(layout.instruction_bits(), 64);
        assert_eq!(layout.instruction_bytes(), 8);
    }

    #[test]
    fn test_flags() {
        let matmul = TcuInstruction::MatMul {
            accumulate: true,
            zeroes: true,
            local: StridedAddress::new(0),
            accumulator: StridedAddress::new(0),
            size: 0,
        };
        assert_eq!(matmul.flags(), 0b11);
        assert_eq!(
            TcuInstruction::data_move(DataMoveFlag::LocalToAccumulator, 0, 0, 0).flags(),
            0xD
        );
        assert_eq!(TcuInstruction::configure(ConfigRegister::Timeout, 100).opcode(), Opcode::Configure);
    }
}
