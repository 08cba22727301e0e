//! Shape encoder for VTA-style instructions
//!
//! The encoder resolves every shape, opcode and memory id up front, so an
//! incomplete ISA fails in [`Encoder::new`] instead of on the first unlucky
//! instruction. ALU functions are optional: a table may define only `add`,
//! and encoding an ALU function it lacks is a configuration error.

use crate::error::{EncodeError, Result};
use crate::packer::{pack, FieldSet, InstructionWord};
use tcu_spec::{
    AluFunc, AluOp, DepFlags, FieldName, GemmOp, Instruction, IsaSpec, MemOp, Shape, ShapeLayout,
    SpecError, WidthClass,
};

/// ISA values used by the instruction kinds
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct ResolvedValues {
    pub load: u64,
    pub store: u64,
    pub gemm: u64,
    pub finish: u64,
    pub alu: u64,
    pub mem_acc: u64,
    pub mem_out: u64,
    /// Indexed in [`AluFunc::ALL`] order; `None` when the ISA leaves it out
    pub alu_funcs: [Option<u64>; 4],
}

impl ResolvedValues {
    fn resolve(spec: &IsaSpec) -> Result<Self> {
        let opcode_width = spec.width(WidthClass::Opcode)?;
        let mem_id_width = spec.width(WidthClass::MemId)?;
        let alu_width = spec.width(WidthClass::AluOpcode)?;

        let checked = |table: &'static str, key: &'static str, value: u64, width: u32| {
            if width < 64 && value >> width != 0 {
                Err(EncodeError::ValueTooWide {
                    table,
                    key,
                    value,
                    width,
                })
            } else {
                Ok(value)
            }
        };
        let opcode = |key: &'static str| -> Result<u64> {
            checked("value.opcode", key, spec.opcode(key)?, opcode_width)
        };
        let mem_id = |key: &'static str| -> Result<u64> {
            checked("value.mem_id", key, spec.mem_id(key)?, mem_id_width)
        };

        let mut alu_funcs = [None; 4];
        for (slot, func) in alu_funcs.iter_mut().zip(AluFunc::ALL) {
            if let Some(&value) = spec.value.alu_opcode.get(func.key()) {
                *slot = Some(checked("value.alu_opcode", func.key(), value, alu_width)?);
            }
        }

        Ok(ResolvedValues {
            load: opcode("load")?,
            store: opcode("store")?,
            gemm: opcode("gemm")?,
            finish: opcode("finish")?,
            alu: opcode("alu")?,
            mem_acc: mem_id("acc")?,
            mem_out: mem_id("out")?,
            alu_funcs,
        })
    }

    fn alu_slot(func: AluFunc) -> usize {
        match func {
            AluFunc::Min => 0,
            AluFunc::Max => 1,
            AluFunc::Add => 2,
            AluFunc::Shr => 3,
        }
    }

    pub fn alu_func(&self, func: AluFunc) -> Result<u64> {
        self.alu_funcs[Self::alu_slot(func)].ok_or_else(|| {
            SpecError::MissingKey {
                table: "value.alu_opcode",
                key: func.key().to_string(),
            }
            .into()
        })
    }

    /// Inverse of [`alu_func`](Self::alu_func)
    pub fn alu_func_of(&self, value: u64) -> Option<AluFunc> {
        AluFunc::ALL
            .into_iter()
            .find(|func| self.alu_funcs[Self::alu_slot(*func)] == Some(value))
    }
}

/// Encoder for one ISA specification
#[derive(Clone, Debug)]
pub struct Encoder {
    spec: IsaSpec,
    memory: ShapeLayout,
    gemm: ShapeLayout,
    alu: ShapeLayout,
    values: ResolvedValues,
}

impl Encoder {
    pub fn new(spec: IsaSpec) -> Result<Self> {
        let memory = ShapeLayout::resolve(Shape::Memory, &spec)?;
        let gemm = ShapeLayout::resolve(Shape::Gemm, &spec)?;
        let alu = ShapeLayout::resolve(Shape::Alu, &spec)?;
        let values = ResolvedValues::resolve(&spec)?;

        Ok(Encoder {
            spec,
            memory,
            gemm,
            alu,
            values,
        })
    }

    #[inline]
    pub fn spec(&self) -> &IsaSpec {
        &self.spec
    }

    #[inline]
    pub fn values(&self) -> &ResolvedValues {
        &self.values
    }

    #[inline]
    pub fn word_bits(&self) -> u32 {
        self.spec.instruction_bits
    }

    #[inline]
    pub fn word_bytes(&self) -> usize {
        self.spec.instruction_bytes()
    }

    pub fn layout(&self, shape: Shape) -> &ShapeLayout {
        match shape {
            Shape::Memory => &self.memory,
            Shape::Gemm => &self.gemm,
            Shape::Alu => &self.alu,
        }
    }

    /// All fields of `shape`, zeroed, in canonical order
    pub fn template(&self, shape: Shape) -> Result<FieldSet> {
        let layout = self.layout(shape);
        let mut set = FieldSet::with_capacity(layout.slots().len());
        for slot in layout.slots() {
            set.push(slot.name.as_str(), slot.width, 0)?;
        }
        Ok(set)
    }

    /// Field values of an instruction
    pub fn field_set(&self, instr: &Instruction) -> Result<FieldSet> {
        let mut set = self.template(instr.shape())?;
        let v = &self.values;

        match instr {
            Instruction::Load(op) => {
                put(&mut set, FieldName::Opcode, v.load)?;
                put_mem(&mut set, v.mem_acc, op)?;
            }
            Instruction::Store(op) => {
                put(&mut set, FieldName::Opcode, v.store)?;
                put_mem(&mut set, v.mem_out, op)?;
            }
            Instruction::Gemm(op) => {
                put(&mut set, FieldName::Opcode, v.gemm)?;
                put_gemm(&mut set, op)?;
            }
            Instruction::Alu { func, use_imm, op } => {
                put(&mut set, FieldName::Opcode, v.alu)?;
                put_alu(&mut set, v.alu_func(*func)?, *use_imm, op)?;
            }
            Instruction::Addi(op) => {
                put(&mut set, FieldName::Opcode, v.alu)?;
                put_alu(&mut set, v.alu_func(AluFunc::Add)?, true, op)?;
            }
            Instruction::Finish(deps) => {
                put(&mut set, FieldName::Opcode, v.finish)?;
                put_deps(&mut set, deps)?;
            }
            Instruction::Nop(deps) => {
                put(&mut set, FieldName::Opcode, v.gemm)?;
                put_deps(&mut set, deps)?;
            }
        }

        Ok(set)
    }

    pub fn encode(&self, instr: &Instruction) -> Result<InstructionWord> {
        let set = self.field_set(instr)?;
        pack(&set, self.word_bits())
    }

    /// Pack an arbitrary field set into this ISA's word size
    pub fn pack(&self, set: &FieldSet) -> Result<InstructionWord> {
        pack(set, self.word_bits())
    }
}

#[inline]
fn put(set: &mut FieldSet, name: FieldName, value: u64) -> Result<()> {
    set.set(name.as_str(), value)
}

fn put_deps(set: &mut FieldSet, deps: &DepFlags) -> Result<()> {
    put(set, FieldName::PopPrevDep, deps.pop_prev as u64)?;
    put(set, FieldName::PopNextDep, deps.pop_next as u64)?;
    put(set, FieldName::PushPrevDep, deps.push_prev as u64)?;
    put(set, FieldName::PushNextDep, deps.push_next as u64)
}

fn put_mem(set: &mut FieldSet, mem_type: u64, op: &MemOp) -> Result<()> {
    put_deps(set, &op.deps)?;
    put(set, FieldName::MemType, mem_type)?;
    put(set, FieldName::SramBase, op.sram_base)?;
    put(set, FieldName::DramBase, op.dram_base)?;
    put(set, FieldName::YSize, op.y_size)?;
    put(set, FieldName::XSize, op.x_size)?;
    put(set, FieldName::XStride, op.x_stride)?;
    put(set, FieldName::YPad0, op.y_pad_0)?;
    put(set, FieldName::YPad1, op.y_pad_1)?;
    put(set, FieldName::XPad0, op.x_pad_0)?;
    put(set, FieldName::XPad1, op.x_pad_1)
}

fn put_gemm(set: &mut FieldSet, op: &GemmOp) -> Result<()> {
    put_deps(set, &op.deps)?;
    put(set, FieldName::ResetFlag, op.reset as u64)?;
    put(set, FieldName::UopBegin, op.uop_begin)?;
    put(set, FieldName::UopEnd, op.uop_end)?;
    put(set, FieldName::IterOut, op.iter_out)?;
    put(set, FieldName::IterIn, op.iter_in)?;
    put(set, FieldName::DstFactorOut, op.dst_factor_out)?;
    put(set, FieldName::DstFactorIn, op.dst_factor_in)?;
    put(set, FieldName::SrcFactorOut, op.src_factor_out)?;
    put(set, FieldName::SrcFactorIn, op.src_factor_in)?;
    put(set, FieldName::WgtFactorOut, op.wgt_factor_out)?;
    put(set, FieldName::WgtFactorIn, op.wgt_factor_in)
}

fn put_alu(set: &mut FieldSet, func: u64, use_imm: bool, op: &AluOp) -> Result<()> {
    put_deps(set, &op.deps)?;
    put(set, FieldName::ResetReg, op.reset as u64)?;
    put(set, FieldName::UopBegin, op.uop_begin)?;
    put(set, FieldName::UopEnd, op.uop_end)?;
    put(set, FieldName::IterOut, op.iter_out)?;
    put(set, FieldName::IterIn, op.iter_in)?;
    put(set, FieldName::DstFactorOut, op.dst_factor_out)?;
    put(set, FieldName::DstFactorIn, op.dst_factor_in)?;
    put(set, FieldName::SrcFactorOut, op.src_factor_out)?;
    put(set, FieldName::SrcFactorIn, op.src_factor_in)?;
    put(set, FieldName::AluOpcode, func)?;
    put(set, FieldName::UseImm, use_imm as u64)?;
    put(set, FieldName::Imm, op.imm)
}
