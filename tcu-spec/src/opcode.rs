//! # TCU Opcode Definitions
//!
//! Opcodes, data-move flags and configuration registers of the TCU
//! instruction layout. Opcodes and flags are 4 bits each.
//!
//! ## Opcode Encoding
//!
//! - 0x0: NoOp
//! - 0x1: MatMul
//! - 0x2: DataMove
//! - 0x3: LoadWeights
//! - 0x4: SIMD
//! - 0xF: Configure

use crate::address::AddressSpace;
use serde::{Deserialize, Serialize};
use std::fmt;

/// TCU instruction opcode (4 bits)
#[repr(u8)]
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Opcode {
    NoOp = 0x0,
    /// MatMul: local rows through the array into the accumulators
    MatMul = 0x1,
    /// DataMove: between local memory and DRAM or the accumulators
    DataMove = 0x2,
    /// LoadWeights: local rows (or zeroes) into the array
    LoadWeights = 0x3,
    Simd = 0x4,
    /// Configure: write a configuration register
    Configure = 0xF,
}

impl Opcode {
    /// Opcode width in bits
    pub const BITS: u32 = 4;

    /// Try to convert from u8
    pub fn from_u8(value: u8) -> Option<Self> {
        match value {
            0x0 => Some(Opcode::NoOp),
            0x1 => Some(Opcode::MatMul),
            0x2 => Some(Opcode::DataMove),
            0x3 => Some(Opcode::LoadWeights),
            0x4 => Some(Opcode::Simd),
            0xF => Some(Opcode::Configure),
            _ => None,
        }
    }

    #[inline]
    pub const fn to_u8(self) -> u8 {
        self as u8
    }

    pub const fn mnemonic(self) -> &'static str {
        match self {
            Opcode::NoOp => "noop",
            Opcode::MatMul => "matmul",
            Opcode::DataMove => "datamove",
            Opcode::LoadWeights => "loadweights",
            Opcode::Simd => "simd",
            Opcode::Configure => "configure",
        }
    }
}

impl fmt::Display for Opcode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.mnemonic())
    }
}

/// Direction of a data move (the flags nibble of a DataMove)
#[repr(u8)]
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum DataMoveFlag {
    Dram0ToLocal = 0x0,
    LocalToDram0 = 0x1,
    Dram1ToLocal = 0x2,
    LocalToDram1 = 0x3,
    AccumulatorToLocal = 0xC,
    LocalToAccumulator = 0xD,
    /// Add local rows into the accumulators
    LocalToAccumulatorAccumulate = 0xF,
}

impl DataMoveFlag {
    pub const ALL: [DataMoveFlag; 7] = [
        DataMoveFlag::Dram0ToLocal,
        DataMoveFlag::LocalToDram0,
        DataMoveFlag::Dram1ToLocal,
        DataMoveFlag::LocalToDram1,
        DataMoveFlag::AccumulatorToLocal,
        DataMoveFlag::LocalToAccumulator,
        DataMoveFlag::LocalToAccumulatorAccumulate,
    ];

    pub fn from_u8(value: u8) -> Option<Self> {
        match value {
            0x0 => Some(DataMoveFlag::Dram0ToLocal),
            0x1 => Some(DataMoveFlag::LocalToDram0),
            0x2 => Some(DataMoveFlag::Dram1ToLocal),
            0x3 => Some(DataMoveFlag::LocalToDram1),
            0xC => Some(DataMoveFlag::AccumulatorToLocal),
            0xD => Some(DataMoveFlag::LocalToAccumulator),
            0xF => Some(DataMoveFlag::LocalToAccumulatorAccumulate),
            _ => None,
        }
    }

    #[inline]
    pub const fn to_u8(self) -> u8 {
        self as u8
    }

    /// The non-local side of the move
    pub const fn remote(self) -> AddressSpace {
        match self {
            DataMoveFlag::Dram0ToLocal | DataMoveFlag::LocalToDram0 => AddressSpace::Dram0,
            DataMoveFlag::Dram1ToLocal | DataMoveFlag::LocalToDram1 => AddressSpace::Dram1,
            DataMoveFlag::AccumulatorToLocal
            | DataMoveFlag::LocalToAccumulator
            | DataMoveFlag::LocalToAccumulatorAccumulate => AddressSpace::Accumulator,
        }
    }

    /// True when data flows into local memory
    pub const fn is_to_local(self) -> bool {
        matches!(
            self,
            DataMoveFlag::Dram0ToLocal | DataMoveFlag::Dram1ToLocal | DataMoveFlag::AccumulatorToLocal
        )
    }

    pub const fn source(self) -> AddressSpace {
        if self.is_to_local() {
            self.remote()
        } else {
            AddressSpace::Local
        }
    }

    pub const fn destination(self) -> AddressSpace {
        if self.is_to_local() {
            AddressSpace::Local
        } else {
            self.remote()
        }
    }

    pub const fn mnemonic(self) -> &'static str {
        match self {
            DataMoveFlag::Dram0ToLocal => "dram0->local",
            DataMoveFlag::LocalToDram0 => "local->dram0",
            DataMoveFlag::Dram1ToLocal => "dram1->local",
            DataMoveFlag::LocalToDram1 => "local->dram1",
            DataMoveFlag::AccumulatorToLocal => "acc->local",
            DataMoveFlag::LocalToAccumulator => "local->acc",
            DataMoveFlag::LocalToAccumulatorAccumulate => "local->acc+",
        }
    }
}

/// Configuration registers written by Configure
#[repr(u8)]
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum ConfigRegister {
    /// DRAM0 base, in TCU blocks
    Dram0AddressOffset = 0x0,
    Dram0CacheBehaviour = 0x1,
    /// DRAM1 base, in TCU blocks
    Dram1AddressOffset = 0x4,
    Dram1CacheBehaviour = 0x5,
    Timeout = 0x8,
    Tracepoint = 0x9,
    ProgramCounter = 0xA,
    SampleInterval = 0xB,
}

impl ConfigRegister {
    pub fn from_u8(value: u8) -> Option<Self> {
        match value {
            0x0 => Some(ConfigRegister::Dram0AddressOffset),
            0x1 => Some(ConfigRegister::Dram0CacheBehaviour),
            0x4 => Some(ConfigRegister::Dram1AddressOffset),
            0x5 => Some(ConfigRegister::Dram1CacheBehaviour),
            0x8 => Some(ConfigRegister::Timeout),
            0x9 => Some(ConfigRegister::Tracepoint),
            0xA => Some(ConfigRegister::ProgramCounter),
            0xB => Some(ConfigRegister::SampleInterval),
            _ => None,
        }
    }

    #[inline]
    pub const fn to_u8(self) -> u8 {
        self as u8
    }

    pub const fn name(self) -> &'static str {
        match self {
            ConfigRegister::Dram0AddressOffset => "dram0_offset",
            ConfigRegister::Dram0CacheBehaviour => "dram0_cache",
            ConfigRegister::Dram1AddressOffset => "dram1_offset",
            ConfigRegister::Dram1CacheBehaviour => "dram1_cache",
            ConfigRegister::Timeout => "timeout",
            ConfigRegister::Tracepoint => "tracepoint",
            ConfigRegister::ProgramCounter => "program_counter",
            ConfigRegister::SampleInterval => "sample_interval",
        }
    }
}
