//! # Instruction Shapes
//!
//! Every instruction is one of three closed shapes. A shape is an ordered
//! field list; the first field occupies the lowest bits of the word.
//!
//! ```text
//! Memory: opcode | 4 deps | mem_type | sram_base | dram_base | empty |
//!         y_size | x_size | x_stride | y_pad_0 | y_pad_1 | x_pad_0 | x_pad_1
//! Gemm:   opcode | 4 deps | reset_flag | uop_bgn | uop_end | iter_out | iter_in |
//!         empty | dst_factor_{out,in} | src_factor_{out,in} | wgt_factor_{out,in}
//! Alu:    opcode | 4 deps | reset_reg | uop_bgn | uop_end | iter_out | iter_in |
//!         empty | dst_factor_{out,in} | src_factor_{out,in} | alu_opcode | use_imm | imm
//! ```

use crate::error::{Result, SpecError};
use crate::isa::{IsaSpec, WidthClass};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Instruction shape
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Shape {
    Memory,
    Gemm,
    Alu,
}

/// Field names used by the shapes
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum FieldName {
    Opcode,
    PopPrevDep,
    PopNextDep,
    PushPrevDep,
    PushNextDep,
    MemType,
    SramBase,
    DramBase,
    Empty,
    YSize,
    XSize,
    XStride,
    YPad0,
    YPad1,
    XPad0,
    XPad1,
    ResetFlag,
    ResetReg,
    UopBegin,
    UopEnd,
    IterOut,
    IterIn,
    DstFactorOut,
    DstFactorIn,
    SrcFactorOut,
    SrcFactorIn,
    WgtFactorOut,
    WgtFactorIn,
    AluOpcode,
    UseImm,
    Imm,
}

impl FieldName {
    pub const fn as_str(self) -> &'static str {
        match self {
            FieldName::Opcode => "opcode",
            FieldName::PopPrevDep => "pop_prev_dep",
            FieldName::PopNextDep => "pop_next_dep",
            FieldName::PushPrevDep => "push_prev_dep",
            FieldName::PushNextDep => "push_next_dep",
            FieldName::MemType => "mem_type",
            FieldName::SramBase => "sram_base",
            FieldName::DramBase => "dram_base",
            FieldName::Empty => "empty",
            FieldName::YSize => "y_size",
            FieldName::XSize => "x_size",
            FieldName::XStride => "x_stride",
            FieldName::YPad0 => "y_pad_0",
            FieldName::YPad1 => "y_pad_1",
            FieldName::XPad0 => "x_pad_0",
            FieldName::XPad1 => "x_pad_1",
            FieldName::ResetFlag => "reset_flag",
            FieldName::ResetReg => "reset_reg",
            FieldName::UopBegin => "uop_bgn",
            FieldName::UopEnd => "uop_end",
            FieldName::IterOut => "iter_out",
            FieldName::IterIn => "iter_in",
            FieldName::DstFactorOut => "dst_factor_out",
            FieldName::DstFactorIn => "dst_factor_in",
            FieldName::SrcFactorOut => "src_factor_out",
            FieldName::SrcFactorIn => "src_factor_in",
            FieldName::WgtFactorOut => "wgt_factor_out",
            FieldName::WgtFactorIn => "wgt_factor_in",
            FieldName::AluOpcode => "alu_opcode",
            FieldName::UseImm => "use_imm",
            FieldName::Imm => "imm",
        }
    }
}

impl fmt::Display for FieldName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

use FieldName as F;
use WidthClass as W;

const MEMORY_FIELDS: &[(FieldName, WidthClass)] = &[
    (F::Opcode, W::Opcode),
    (F::PopPrevDep, W::Flag),
    (F::PopNextDep, W::Flag),
    (F::PushPrevDep, W::Flag),
    (F::PushNextDep, W::Flag),
    (F::MemType, W::MemId),
    (F::SramBase, W::MemSram),
    (F::DramBase, W::MemDram),
    (F::Empty, W::MemEmpty),
    (F::YSize, W::MemSize),
    (F::XSize, W::MemSize),
    (F::XStride, W::MemStride),
    (F::YPad0, W::MemPad),
    (F::YPad1, W::MemPad),
    (F::XPad0, W::MemPad),
    (F::XPad1, W::MemPad),
];

const GEMM_FIELDS: &[(FieldName, WidthClass)] = &[
    (F::Opcode, W::Opcode),
    (F::PopPrevDep, W::Flag),
    (F::PopNextDep, W::Flag),
    (F::PushPrevDep, W::Flag),
    (F::PushNextDep, W::Flag),
    (F::ResetFlag, W::Flag),
    (F::UopBegin, W::UopBegin),
    (F::UopEnd, W::UopEnd),
    (F::IterOut, W::Iter),
    (F::IterIn, W::Iter),
    (F::Empty, W::GemmEmpty),
    (F::DstFactorOut, W::DstFactor),
    (F::DstFactorIn, W::DstFactor),
    (F::SrcFactorOut, W::SrcFactor),
    (F::SrcFactorIn, W::SrcFactor),
    (F::WgtFactorOut, W::WgtFactor),
    (F::WgtFactorIn, W::WgtFactor),
];

const ALU_FIELDS: &[(FieldName, WidthClass)] = &[
    (F::Opcode, W::Opcode),
    (F::PopPrevDep, W::Flag),
    (F::PopNextDep, W::Flag),
    (F::PushPrevDep, W::Flag),
    (F::PushNextDep, W::Flag),
    (F::ResetReg, W::Flag),
    (F::UopBegin, W::UopBegin),
    (F::UopEnd, W::UopEnd),
    (F::IterOut, W::Iter),
    (F::IterIn, W::Iter),
    (F::Empty, W::AluEmpty),
    (F::DstFactorOut, W::DstFactor),
    (F::DstFactorIn, W::DstFactor),
    (F::SrcFactorOut, W::SrcFactor),
    (F::SrcFactorIn, W::SrcFactor),
    (F::AluOpcode, W::AluOpcode),
    (F::UseImm, W::Flag),
    (F::Imm, W::AluImm),
];

impl Shape {
    pub const ALL: [Shape; 3] = [Shape::Memory, Shape::Gemm, Shape::Alu];

    /// Canonical field order with the width class of each field
    pub const fn fields(self) -> &'static [(FieldName, WidthClass)] {
        match self {
            Shape::Memory => MEMORY_FIELDS,
            Shape::Gemm => GEMM_FIELDS,
            Shape::Alu => ALU_FIELDS,
        }
    }

    pub const fn name(self) -> &'static str {
        match self {
            Shape::Memory => "memory",
            Shape::Gemm => "gemm",
            Shape::Alu => "alu",
        }
    }

    pub fn has_field(self, name: FieldName) -> bool {
        self.fields().iter().any(|(field, _)| *field == name)
    }
}

impl fmt::Display for Shape {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// A field of a resolved shape
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct FieldSlot {
    pub name: FieldName,
    pub width: u32,
    /// Bit offset from the least significant bit of the word
    pub offset: u32,
}

/// A shape with every field width resolved against an [`IsaSpec`]
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ShapeLayout {
    shape: Shape,
    slots: Vec<FieldSlot>,
    total_bits: u32,
    word_bits: u32,
}

impl ShapeLayout {
    /// Resolve all widths of `shape`; the fields must fit in one instruction word
    pub fn resolve(shape: Shape, spec: &IsaSpec) -> Result<Self> {
        spec.validate()?;

        let mut slots = Vec::with_capacity(shape.fields().len());
        let mut offset = 0u32;
        for &(name, class) in shape.fields() {
            let width = spec.width(class)?;
            slots.push(FieldSlot { name, width, offset });
            offset += width;
        }

        if offset > spec.instruction_bits {
            return Err(SpecError::ShapeOverflow {
                shape: shape.name(),
                bits: offset,
                word_bits: spec.instruction_bits,
            });
        }

        Ok(Self {
            shape,
            slots,
            total_bits: offset,
            word_bits: spec.instruction_bits,
        })
    }

    #[inline]
    pub fn shape(&self) -> Shape {
        self.shape
    }

    #[inline]
    pub fn slots(&self) -> &[FieldSlot] {
        &self.slots
    }

    /// Bits used by the fields (the rest of the word is zero)
    #[inline]
    pub fn total_bits(&self) -> u32 {
        self.total_bits
    }

    #[inline]
    pub fn word_bits(&self) -> u32 {
        self.word_bits
    }

    pub fn slot(&self, name: FieldName) -> Option<&FieldSlot> {
        self.slots.iter().find(|slot| slot.name == name)
    }
}
