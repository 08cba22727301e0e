//! Instruction decoding
//!
//! [`unpack`] is the exact inverse of [`tcu_assembler::pack`]: it walks a
//! template field set and reads each field back at its offset. The kind
//! decoders then apply the encoding conventions in reverse.

use crate::error::{DisassemblerError, Result};
use tcu_assembler::{tcu, Encoder, FieldSet, InstructionWord};
use tcu_spec::{
    AluOp, ConfigRegister, DataMoveFlag, DepFlags, FieldName, GemmOp, Instruction, Layout, MemOp,
    Opcode, Shape, StridedAddress, TcuInstruction, WidthClass,
};

/// Read every field of `template` out of `word`
pub fn unpack(word: &InstructionWord, template: &FieldSet) -> Result<FieldSet> {
    let mut set = FieldSet::with_capacity(template.fields().len());
    let mut offset = 0;
    for field in template.fields() {
        let value = word.extract(offset, field.width)?;
        set.push(field.name, field.width, value)?;
        offset += field.width;
    }
    Ok(set)
}

fn check_len(bytes: &[u8], word_bytes: usize) -> Result<()> {
    if bytes.len() != word_bytes {
        return Err(DisassemblerError::Truncated {
            len: bytes.len(),
            word_bytes,
        });
    }
    Ok(())
}

fn invalid(reason: impl Into<String>) -> DisassemblerError {
    DisassemblerError::InvalidEncoding {
        reason: reason.into(),
    }
}

#[inline]
fn get(set: &FieldSet, name: FieldName) -> u64 {
    set.get(name.as_str()).unwrap_or(0)
}

fn deps_of(set: &FieldSet) -> DepFlags {
    DepFlags {
        pop_prev: get(set, FieldName::PopPrevDep) != 0,
        pop_next: get(set, FieldName::PopNextDep) != 0,
        push_prev: get(set, FieldName::PushPrevDep) != 0,
        push_next: get(set, FieldName::PushNextDep) != 0,
    }
}

fn is_dep_field(name: &str) -> bool {
    [
        FieldName::Opcode,
        FieldName::PopPrevDep,
        FieldName::PopNextDep,
        FieldName::PushPrevDep,
        FieldName::PushNextDep,
    ]
    .iter()
    .any(|f| f.as_str() == name)
}

fn mem_op(set: &FieldSet) -> MemOp {
    MemOp {
        deps: deps_of(set),
        sram_base: get(set, FieldName::SramBase),
        dram_base: get(set, FieldName::DramBase),
        y_size: get(set, FieldName::YSize),
        x_size: get(set, FieldName::XSize),
        x_stride: get(set, FieldName::XStride),
        y_pad_0: get(set, FieldName::YPad0),
        y_pad_1: get(set, FieldName::YPad1),
        x_pad_0: get(set, FieldName::XPad0),
        x_pad_1: get(set, FieldName::XPad1),
    }
}

fn gemm_op(set: &FieldSet) -> GemmOp {
    GemmOp {
        deps: deps_of(set),
        reset: get(set, FieldName::ResetFlag) != 0,
        uop_begin: get(set, FieldName::UopBegin),
        uop_end: get(set, FieldName::UopEnd),
        iter_out: get(set, FieldName::IterOut),
        iter_in: get(set, FieldName::IterIn),
        dst_factor_out: get(set, FieldName::DstFactorOut),
        dst_factor_in: get(set, FieldName::DstFactorIn),
        src_factor_out: get(set, FieldName::SrcFactorOut),
        src_factor_in: get(set, FieldName::SrcFactorIn),
        wgt_factor_out: get(set, FieldName::WgtFactorOut),
        wgt_factor_in: get(set, FieldName::WgtFactorIn),
    }
}

fn alu_op(set: &FieldSet) -> AluOp {
    AluOp {
        deps: deps_of(set),
        reset: get(set, FieldName::ResetReg) != 0,
        uop_begin: get(set, FieldName::UopBegin),
        uop_end: get(set, FieldName::UopEnd),
        iter_out: get(set, FieldName::IterOut),
        iter_in: get(set, FieldName::IterIn),
        dst_factor_out: get(set, FieldName::DstFactorOut),
        dst_factor_in: get(set, FieldName::DstFactorIn),
        src_factor_out: get(set, FieldName::SrcFactorOut),
        src_factor_in: get(set, FieldName::SrcFactorIn),
        imm: get(set, FieldName::Imm),
    }
}

/// Decode one VTA-style instruction word
///
/// Where two kinds share an encoding the more specific one wins: an ALU add
/// with immediate decodes as `Addi`, a GEMM with no work as `Nop`.
pub fn decode(encoder: &Encoder, bytes: &[u8]) -> Result<Instruction> {
    check_len(bytes, encoder.word_bytes())?;
    let word = InstructionWord::from_bytes(bytes);
    let opcode_width = encoder.spec().width(WidthClass::Opcode)?;
    let opcode = word.extract(0, opcode_width)?;
    let v = encoder.values();

    let shape = if opcode == v.load || opcode == v.store {
        Shape::Memory
    } else if opcode == v.gemm || opcode == v.finish {
        Shape::Gemm
    } else if opcode == v.alu {
        Shape::Alu
    } else {
        return Err(DisassemblerError::UnknownOpcode(opcode));
    };
    let set = unpack(&word, &encoder.template(shape)?)?;

    match shape {
        Shape::Memory => {
            let (kind, expected) = if opcode == v.load {
                ("load", v.mem_acc)
            } else {
                ("store", v.mem_out)
            };
            let mem_type = get(&set, FieldName::MemType);
            if mem_type != expected {
                return Err(invalid(format!(
                    "{} with mem_type {} (expected {})",
                    kind, mem_type, expected
                )));
            }
            let op = mem_op(&set);
            Ok(if opcode == v.load {
                Instruction::Load(op)
            } else {
                Instruction::Store(op)
            })
        }
        Shape::Gemm => {
            let busy = set
                .fields()
                .iter()
                .find(|f| !is_dep_field(f.name) && f.value != 0);
            if opcode == v.finish {
                if let Some(field) = busy {
                    return Err(invalid(format!("finish with nonzero field {}", field.name)));
                }
                Ok(Instruction::Finish(deps_of(&set)))
            } else if busy.is_none() {
                Ok(Instruction::Nop(deps_of(&set)))
            } else {
                Ok(Instruction::Gemm(gemm_op(&set)))
            }
        }
        Shape::Alu => {
            let raw = get(&set, FieldName::AluOpcode);
            let func = v
                .alu_func_of(raw)
                .ok_or_else(|| invalid(format!("unknown alu_opcode {}", raw)))?;
            let use_imm = get(&set, FieldName::UseImm) != 0;
            let op = alu_op(&set);
            if func == tcu_spec::AluFunc::Add && use_imm {
                Ok(Instruction::Addi(op))
            } else {
                Ok(Instruction::Alu { func, use_imm, op })
            }
        }
    }
}

fn strided(set: &FieldSet, address: &str, stride: &str) -> StridedAddress {
    StridedAddress {
        address: set.get(address).unwrap_or(0),
        stride: set.get(stride).unwrap_or(0),
    }
}

/// Decode one TCU instruction word
pub fn decode_tcu(layout: &Layout, bytes: &[u8]) -> Result<TcuInstruction> {
    check_len(bytes, layout.instruction_bytes())?;
    let word = InstructionWord::from_bytes(bytes);
    let raw = word.extract(layout.instruction_bits() - Opcode::BITS, Opcode::BITS)?;
    let opcode = Opcode::from_u8(raw as u8).ok_or(DisassemblerError::UnknownOpcode(raw))?;

    let set = unpack(&word, &tcu::template(layout, opcode)?)?;
    let flags = set.get(tcu::FLAGS).unwrap_or(0) as u8;
    let size = set.get(tcu::OP2_ADDRESS).unwrap_or(0);

    match opcode {
        Opcode::NoOp => Ok(TcuInstruction::NoOp),
        Opcode::MatMul => Ok(TcuInstruction::MatMul {
            accumulate: flags & 0b01 != 0,
            zeroes: flags & 0b10 != 0,
            local: strided(&set, tcu::OP0_ADDRESS, tcu::OP0_STRIDE),
            accumulator: strided(&set, tcu::OP1_ADDRESS, tcu::OP1_STRIDE),
            size,
        }),
        Opcode::DataMove => {
            let flag = DataMoveFlag::from_u8(flags)
                .ok_or_else(|| invalid(format!("unknown data move flag 0x{:X}", flags)))?;
            Ok(TcuInstruction::DataMove {
                flag,
                local: strided(&set, tcu::OP0_ADDRESS, tcu::OP0_STRIDE),
                address: strided(&set, tcu::OP1_ADDRESS, tcu::OP1_STRIDE),
                size,
            })
        }
        Opcode::LoadWeights => Ok(TcuInstruction::LoadWeights {
            zeroes: flags & 0b01 != 0,
            local: strided(&set, tcu::OP0_ADDRESS, tcu::OP0_STRIDE),
            size: set.get(tcu::OP1_ADDRESS).unwrap_or(0),
        }),
        Opcode::Configure => {
            let reg = set.get(tcu::REGISTER).unwrap_or(0);
            let register = u8::try_from(reg)
                .ok()
                .and_then(ConfigRegister::from_u8)
                .ok_or_else(|| invalid(format!("unknown configuration register 0x{:X}", reg)))?;
            Ok(TcuInstruction::Configure {
                register,
                value: set.get(tcu::VALUE).unwrap_or(0),
            })
        }
        Opcode::Simd => Err(invalid("SIMD instructions have no decoder")),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tcu_spec::{AluFunc, Architecture, IsaSpec};

    fn vta() -> Encoder {
        Encoder::new(IsaSpec::vta()).unwrap()
    }

    fn pynq() -> Layout {
        Layout::new(&Architecture::pynq_z1()).unwrap()
    }

    #[test]
    fn test_unpack_inverts_pack() {
        let encoder = vta();
        let instr = Instruction::Store(MemOp {
            sram_base: 7,
            dram_base: 0xDEAD_BEEF,
            x_size: 3,
            ..MemOp::default()
        });
        let set = encoder.field_set(&instr).unwrap();
        let word = encoder.pack(&set).unwrap();
        assert_eq!(unpack(&word, &encoder.template(Shape::Memory).unwrap()).unwrap(), set);
    }

    #[test]
    fn test_decode_kinds() {
        let encoder = vta();
        let kinds = [
            Instruction::Load(MemOp {
                y_size: 4,
                ..MemOp::default()
            }),
            Instruction::Store(MemOp::default()),
            Instruction::Gemm(GemmOp {
                uop_end: 1,
                ..GemmOp::default()
            }),
            Instruction::Alu {
                func: AluFunc::Shr,
                use_imm: true,
                op: AluOp {
                    imm: 2,
                    ..AluOp::default()
                },
            },
            Instruction::Alu {
                func: AluFunc::Add,
                use_imm: false,
                op: AluOp::default(),
            },
            Instruction::Addi(AluOp {
                imm: 5,
                ..AluOp::default()
            }),
            Instruction::Finish(DepFlags {
                push_prev: true,
                ..DepFlags::NONE
            }),
            Instruction::Nop(DepFlags::NONE),
        ];
        for instr in kinds {
            let word = encoder.encode(&instr).unwrap();
            assert_eq!(decode(&encoder, word.as_bytes()).unwrap(), instr);
        }
    }

    #[test]
    fn test_zero_gemm_decodes_as_nop() {
        let encoder = vta();
        let word = encoder.encode(&Instruction::Gemm(GemmOp::default())).unwrap();
        assert_eq!(
            decode(&encoder, word.as_bytes()).unwrap(),
            Instruction::Nop(DepFlags::NONE)
        );
    }

    #[test]
    fn test_decode_rejects_wrong_mem_type() {
        let encoder = vta();
        let mut set = encoder.template(Shape::Memory).unwrap();
        set.set("opcode", 0).unwrap();
        set.set("mem_type", 2).unwrap();
        let word = encoder.pack(&set).unwrap();
        assert!(matches!(
            decode(&encoder, word.as_bytes()),
            Err(DisassemblerError::InvalidEncoding { .. })
        ));
    }

    #[test]
    fn test_decode_unknown_opcode() {
        let mut bytes = vec![0u8; 16];
        bytes[0] = 0x7;
        assert!(matches!(
            decode(&vta(), &bytes),
            Err(DisassemblerError::UnknownOpcode(7))
        ));
    }

    #[test]
    fn test_decode_wrong_length() {
        assert!(matches!(
            decode(&vta(), &[0u8; 15]),
            Err(DisassemblerError::Truncated { len: 15, word_bytes: 16 })
        ));
    }

    #[test]
    fn test_decode_tcu_instructions() {
        let layout = pynq();
        let program = [
            TcuInstruction::NoOp,
            TcuInstruction::configure(ConfigRegister::Dram1AddressOffset, 0x1234),
            TcuInstruction::data_move(DataMoveFlag::AccumulatorToLocal, 12, 2047, 3),
            TcuInstruction::MatMul {
                accumulate: false,
                zeroes: true,
                local: StridedAddress { address: 1, stride: 1 },
                accumulator: StridedAddress::new(2),
                size: 0,
            },
            TcuInstruction::LoadWeights {
                zeroes: true,
                local: StridedAddress::new(0),
                size: 7,
            },
        ];
        for instr in program {
            let word = tcu::encode(&layout, &instr).unwrap();
            assert_eq!(decode_tcu(&layout, word.as_bytes()).unwrap(), instr);
        }
    }

    #[test]
    fn test_decode_tcu_bad_flag() {
        // DataMove opcode with flag 0x4
        let bytes = [0, 0, 0, 0, 0, 0, 0, 0x24];
        assert!(matches!(
            decode_tcu(&pynq(), &bytes),
            Err(DisassemblerError::InvalidEncoding { .. })
        ));
    }

    #[test]
    fn test_decode_tcu_unknown_opcode() {
        let bytes = [0, 0, 0, 0, 0, 0, 0, 0x70];
        assert!(matches!(
            decode_tcu(&pynq(), &bytes),
            Err(DisassemblerError::UnknownOpcode(7))
        ));
    }
}
