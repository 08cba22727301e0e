//! # ISA Specification Tables
//!
//! The ISA is described by an external JSON document:
//!
//! ```json
//! {
//!   "instruction_bits": 128,
//!   "width": { "opcode": 3, "flag": 1, "mem_id": 3, ... },
//!   "value": {
//!     "opcode": { "load": 0, "store": 1, "gemm": 2, "finish": 3, "alu": 4 },
//!     "mem_id": { "uop": 0, "wgt": 1, "inp": 2, "acc": 3, "out": 4 },
//!     "alu_opcode": { "min": 0, "max": 1, "add": 2, "shr": 3 }
//!   }
//! }
//! ```
//!
//! Lookups fail closed: a key that is absent is a [`SpecError::MissingKey`],
//! never a default.

use crate::error::{Result, SpecError};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use std::path::Path;

/// Width classes shared between fields of the instruction shapes
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum WidthClass {
    Opcode,
    Flag,
    MemId,
    MemSram,
    MemDram,
    MemSize,
    MemStride,
    MemPad,
    MemEmpty,
    UopBegin,
    UopEnd,
    Iter,
    DstFactor,
    SrcFactor,
    WgtFactor,
    GemmEmpty,
    AluOpcode,
    AluImm,
    AluEmpty,
}

impl WidthClass {
    pub const ALL: [WidthClass; 19] = [
        WidthClass::Opcode,
        WidthClass::Flag,
        WidthClass::MemId,
        WidthClass::MemSram,
        WidthClass::MemDram,
        WidthClass::MemSize,
        WidthClass::MemStride,
        WidthClass::MemPad,
        WidthClass::MemEmpty,
        WidthClass::UopBegin,
        WidthClass::UopEnd,
        WidthClass::Iter,
        WidthClass::DstFactor,
        WidthClass::SrcFactor,
        WidthClass::WgtFactor,
        WidthClass::GemmEmpty,
        WidthClass::AluOpcode,
        WidthClass::AluImm,
        WidthClass::AluEmpty,
    ];

    /// Key of this class in the `width` table
    pub const fn key(self) -> &'static str {
        match self {
            WidthClass::Opcode => "opcode",
            WidthClass::Flag => "flag",
            WidthClass::MemId => "mem_id",
            WidthClass::MemSram => "mem_sram",
            WidthClass::MemDram => "mem_dram",
            WidthClass::MemSize => "mem_size",
            WidthClass::MemStride => "mem_stride",
            WidthClass::MemPad => "mem_pad",
            WidthClass::MemEmpty => "mem_empty",
            WidthClass::UopBegin => "uop_begin",
            WidthClass::UopEnd => "uop_end",
            WidthClass::Iter => "iter",
            WidthClass::DstFactor => "dst_factor",
            WidthClass::SrcFactor => "src_factor",
            WidthClass::WgtFactor => "wgt_factor",
            WidthClass::GemmEmpty => "gemm_empty",
            WidthClass::AluOpcode => "alu_opcode",
            WidthClass::AluImm => "alu_imm",
            WidthClass::AluEmpty => "alu_empty",
        }
    }
}

impl fmt::Display for WidthClass {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.key())
    }
}

/// Named value tables of the ISA
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct IsaValues {
    pub opcode: BTreeMap<String, u64>,
    #[serde(default)]
    pub mem_id: BTreeMap<String, u64>,
    #[serde(default)]
    pub alu_opcode: BTreeMap<String, u64>,
}

/// ISA specification: instruction size, field widths and named values
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct IsaSpec {
    /// Size of every instruction word in bits
    pub instruction_bits: u32,
    /// Field-class name to bit width
    pub width: BTreeMap<String, u32>,
    pub value: IsaValues,
}

impl IsaSpec {
    /// Parse an ISA specification from JSON and validate the word size
    pub fn from_json(json: &str) -> Result<Self> {
        let spec: IsaSpec = serde_json::from_str(json)?;
        spec.validate()?;
        Ok(spec)
    }

    pub fn from_file(path: impl AsRef<Path>) -> Result<Self> {
        let text = std::fs::read_to_string(path)?;
        Self::from_json(&text)
    }

    /// Reference VTA configuration (1x16 GEMM core, 128-bit instructions)
    pub fn vta() -> Self {
        let width = [
            (WidthClass::Opcode, 3),
            (WidthClass::Flag, 1),
            (WidthClass::MemId, 3),
            (WidthClass::MemSram, 16),
            (WidthClass::MemDram, 32),
            (WidthClass::MemSize, 16),
            (WidthClass::MemStride, 16),
            (WidthClass::MemPad, 4),
            (WidthClass::MemEmpty, 6),
            (WidthClass::UopBegin, 13),
            (WidthClass::UopEnd, 14),
            (WidthClass::Iter, 14),
            (WidthClass::DstFactor, 11),
            (WidthClass::SrcFactor, 11),
            (WidthClass::WgtFactor, 10),
            (WidthClass::GemmEmpty, 1),
            (WidthClass::AluOpcode, 2),
            (WidthClass::AluImm, 16),
            (WidthClass::AluEmpty, 1),
        ]
        .into_iter()
        .map(|(class, bits)| (class.key().to_string(), bits))
        .collect();

        let table = |entries: &[(&str, u64)]| -> BTreeMap<String, u64> {
            entries.iter().map(|(k, v)| (k.to_string(), *v)).collect()
        };

        IsaSpec {
            instruction_bits: crate::VTA_INSTRUCTION_BITS,
            width,
            value: IsaValues {
                opcode: table(&[("load", 0), ("store", 1), ("gemm", 2), ("finish", 3), ("alu", 4)]),
                mem_id: table(&[("uop", 0), ("wgt", 1), ("inp", 2), ("acc", 3), ("out", 4)]),
                alu_opcode: table(&[("min", 0), ("max", 1), ("add", 2), ("shr", 3)]),
            },
        }
    }

    /// Check the instruction size
    pub fn validate(&self) -> Result<()> {
        if self.instruction_bits == 0 || self.instruction_bits % 8 != 0 {
            return Err(SpecError::InvalidInstructionSize(self.instruction_bits));
        }
        Ok(())
    }

    /// Instruction size in bytes
    #[inline]
    pub fn instruction_bytes(&self) -> usize {
        (self.instruction_bits / 8) as usize
    }

    /// Width in bits of a field class
    pub fn width(&self, class: WidthClass) -> Result<u32> {
        let width = *self.width.get(class.key()).ok_or_else(|| SpecError::MissingKey {
            table: "width",
            key: class.key().to_string(),
        })?;
        if width == 0 || width > 64 {
            return Err(SpecError::InvalidWidth {
                class: class.key().to_string(),
                width,
            });
        }
        Ok(width)
    }

    pub fn opcode(&self, name: &str) -> Result<u64> {
        lookup(&self.value.opcode, "value.opcode", name)
    }

    pub fn mem_id(&self, name: &str) -> Result<u64> {
        lookup(&self.value.mem_id, "value.mem_id", name)
    }

    pub fn alu_opcode(&self, name: &str) -> Result<u64> {
        lookup(&self.value.alu_opcode, "value.alu_opcode", name)
    }
}

fn lookup(table: &BTreeMap<String, u64>, table_name: &'static str, key: &str) -> Result<u64> {
    table.get(key).copied().ok_or_else(|| SpecError::MissingKey {
        table: table_name,
        key: key.to_string(),
    })
}
