//! Encoder for the architecture-derived TCU format
//!
//! Field order from the least significant bit:
//!
//! ```text
//! op0_address | op0_stride | op0_pad | op1_address | op1_stride | op1_pad |
//! op2_address | op2_pad | flags | opcode
//! ```
//!
//! Configure replaces operand0 with a `register` field and operand1 with a
//! `value` field spanning the whole operand.

use crate::error::Result;
use crate::packer::{pack, FieldSet, InstructionWord};
use tcu_spec::layout::FLAGS_BITS;
use tcu_spec::{Layout, Opcode, StridedAddress, TcuInstruction};

pub const OP0_ADDRESS: &str = "op0_address";
pub const OP0_STRIDE: &str = "op0_stride";
pub const OP0_PAD: &str = "op0_pad";
pub const OP1_ADDRESS: &str = "op1_address";
pub const OP1_STRIDE: &str = "op1_stride";
pub const OP1_PAD: &str = "op1_pad";
pub const OP2_ADDRESS: &str = "op2_address";
pub const OP2_PAD: &str = "op2_pad";
pub const REGISTER: &str = "register";
pub const VALUE: &str = "value";
pub const FLAGS: &str = "flags";
pub const OPCODE: &str = "opcode";

/// Zeroed fields of an instruction with the given opcode
pub fn template(layout: &Layout, opcode: Opcode) -> Result<FieldSet> {
    let mut set = FieldSet::with_capacity(10);
    if opcode == Opcode::Configure {
        set.push(REGISTER, layout.op0_bits, 0)?;
        set.push(VALUE, layout.op1_bits, 0)?;
    } else {
        set.push(OP0_ADDRESS, layout.op0_address_bits, 0)?;
        set.push(OP0_STRIDE, layout.op0_stride_bits, 0)?;
        set.push(OP0_PAD, layout.op0_bits - layout.op0_address_bits - layout.op0_stride_bits, 0)?;
        set.push(OP1_ADDRESS, layout.op1_address_bits, 0)?;
        set.push(OP1_STRIDE, layout.op1_stride_bits, 0)?;
        set.push(OP1_PAD, layout.op1_bits - layout.op1_address_bits - layout.op1_stride_bits, 0)?;
    }
    set.push(OP2_ADDRESS, layout.op2_address_bits, 0)?;
    set.push(OP2_PAD, layout.op2_bits - layout.op2_address_bits, 0)?;
    set.push(FLAGS, FLAGS_BITS, 0)?;
    set.push(OPCODE, Opcode::BITS, opcode.to_u8() as u64)?;
    Ok(set)
}

fn put_op0(set: &mut FieldSet, addr: &StridedAddress) -> Result<()> {
    set.set(OP0_ADDRESS, addr.address)?;
    set.set(OP0_STRIDE, addr.stride)
}

fn put_op1(set: &mut FieldSet, addr: &StridedAddress) -> Result<()> {
    set.set(OP1_ADDRESS, addr.address)?;
    set.set(OP1_STRIDE, addr.stride)
}

/// Field values of a TCU instruction
pub fn field_set(layout: &Layout, instr: &TcuInstruction) -> Result<FieldSet> {
    let mut set = template(layout, instr.opcode())?;
    set.set(FLAGS, instr.flags() as u64)?;

    match instr {
        TcuInstruction::NoOp => {}
        TcuInstruction::MatMul {
            local,
            accumulator,
            size,
            ..
        } => {
            put_op0(&mut set, local)?;
            put_op1(&mut set, accumulator)?;
            set.set(OP2_ADDRESS, *size)?;
        }
        TcuInstruction::DataMove {
            local, address, size, ..
        } => {
            put_op0(&mut set, local)?;
            put_op1(&mut set, address)?;
            set.set(OP2_ADDRESS, *size)?;
        }
        TcuInstruction::LoadWeights { local, size, .. } => {
            put_op0(&mut set, local)?;
            set.set(OP1_ADDRESS, *size)?;
        }
        TcuInstruction::Configure { register, value } => {
            set.set(REGISTER, register.to_u8() as u64)?;
            set.set(VALUE, *value)?;
        }
    }

    Ok(set)
}

pub fn encode(layout: &Layout, instr: &TcuInstruction) -> Result<InstructionWord> {
    let set = field_set(layout, instr)?;
    pack(&set, layout.instruction_bits())
}
