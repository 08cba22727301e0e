//! Instruction kinds built on the three shapes.
//!
//! Each kind fixes part of its shape by convention; those fields are not
//! reachable from the caller:
//!
//! | Kind   | Shape  | Opcode key | Fixed fields                          |
//! |--------|--------|------------|---------------------------------------|
//! | Load   | Memory | `load`     | `mem_type = mem_id.acc`               |
//! | Store  | Memory | `store`    | `mem_type = mem_id.out`               |
//! | Gemm   | Gemm   | `gemm`     |                                       |
//! | Alu    | Alu    | `alu`      |                                       |
//! | Addi   | Alu    | `alu`      | `alu_opcode = add`, `use_imm = 1`     |
//! | Finish | Gemm   | `finish`   | everything except dependency flags    |
//! | Nop    | Gemm   | `gemm`     | empty micro-op range, zero iterations |

use crate::shape::Shape;
use serde::{Deserialize, Serialize};

/// Dependency-queue flags shared by every shape
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct DepFlags {
    pub pop_prev: bool,
    pub pop_next: bool,
    pub push_prev: bool,
    pub push_next: bool,
}

impl DepFlags {
    pub const NONE: Self = Self {
        pop_prev: false,
        pop_next: false,
        push_prev: false,
        push_next: false,
    };

    pub fn is_empty(&self) -> bool {
        *self == Self::NONE
    }
}

/// Operands of a memory-move instruction
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct MemOp {
    pub deps: DepFlags,
    pub sram_base: u64,
    pub dram_base: u64,
    pub y_size: u64,
    pub x_size: u64,
    pub x_stride: u64,
    pub y_pad_0: u64,
    pub y_pad_1: u64,
    pub x_pad_0: u64,
    pub x_pad_1: u64,
}

/// Operands of a GEMM instruction
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct GemmOp {
    pub deps: DepFlags,
    pub reset: bool,
    pub uop_begin: u64,
    pub uop_end: u64,
    pub iter_out: u64,
    pub iter_in: u64,
    pub dst_factor_out: u64,
    pub dst_factor_in: u64,
    pub src_factor_out: u64,
    pub src_factor_in: u64,
    pub wgt_factor_out: u64,
    pub wgt_factor_in: u64,
}

/// Operands of an ALU instruction
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct AluOp {
    pub deps: DepFlags,
    pub reset: bool,
    pub uop_begin: u64,
    pub uop_end: u64,
    pub iter_out: u64,
    pub iter_in: u64,
    pub dst_factor_out: u64,
    pub dst_factor_in: u64,
    pub src_factor_out: u64,
    pub src_factor_in: u64,
    pub imm: u64,
}

/// ALU function selector
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum AluFunc {
    Min,
    Max,
    Add,
    Shr,
}

impl AluFunc {
    pub const ALL: [AluFunc; 4] = [AluFunc::Min, AluFunc::Max, AluFunc::Add, AluFunc::Shr];

    /// Key in the `value.alu_opcode` table
    pub const fn key(self) -> &'static str {
        match self {
            AluFunc::Min => "min",
            AluFunc::Max => "max",
            AluFunc::Add => "add",
            AluFunc::Shr => "shr",
        }
    }
}

/// A VTA-style instruction
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Instruction {
    /// LOAD: DRAM to accumulator memory
    Load(MemOp),
    /// STORE: output memory to DRAM
    Store(MemOp),
    /// GEMM over the micro-op range
    Gemm(GemmOp),
    /// ALU over the micro-op range
    Alu {
        func: AluFunc,
        use_imm: bool,
        op: AluOp,
    },
    /// ADDI: ALU add with immediate
    Addi(AluOp),
    /// FINISH: signal completion of the stream
    Finish(DepFlags),
    /// NOP: GEMM with nothing to do
    Nop(DepFlags),
}

impl Instruction {
    pub const fn shape(&self) -> Shape {
        match self {
            Instruction::Load(_) | Instruction::Store(_) => Shape::Memory,
            Instruction::Gemm(_) | Instruction::Finish(_) | Instruction::Nop(_) => Shape::Gemm,
            Instruction::Alu { .. } | Instruction::Addi(_) => Shape::Alu,
        }
    }

    /// Key of this kind's opcode in the `value.opcode` table
    pub const fn opcode_key(&self) -> &'static str {
        match self {
            Instruction::Load(_) => "load",
            Instruction::Store(_) => "store",
            Instruction::Gemm(_) | Instruction::Nop(_) => "gemm",
            Instruction::Alu { .. } | Instruction::Addi(_) => "alu",
            Instruction::Finish(_) => "finish",
        }
    }

    pub const fn mnemonic(&self) -> &'static str {
        match self {
            Instruction::Load(_) => "load",
            Instruction::Store(_) => "store",
            Instruction::Gemm(_) => "gemm",
            Instruction::Alu { .. } => "alu",
            Instruction::Addi(_) => "addi",
            Instruction::Finish(_) => "finish",
            Instruction::Nop(_) => "nop",
        }
    }

    pub fn deps(&self) -> DepFlags {
        match self {
            Instruction::Load(op) | Instruction::Store(op) => op.deps,
            Instruction::Gemm(op) => op.deps,
            Instruction::Alu { op, .. } | Instruction::Addi(op) => op.deps,
            Instruction::Finish(deps) | Instruction::Nop(deps) => *deps,
        }
    }
}
