//! Instruction stream assembly

use crate::encoder::Encoder;
use crate::error::Result;
use crate::tcu;
use tcu_spec::{Instruction, Layout, TcuInstruction};

/// Encode a sequence of VTA-style instructions into one byte stream
pub fn assemble(encoder: &Encoder, instructions: &[Instruction]) -> Result<Vec<u8>> {
    let mut stream = Vec::with_capacity(instructions.len() * encoder.word_bytes());
    for instr in instructions {
        stream.extend_from_slice(encoder.encode(instr)?.as_bytes());
    }
    Ok(stream)
}

/// Encode a sequence of TCU instructions into one byte stream
pub fn assemble_tcu(layout: &Layout, instructions: &[TcuInstruction]) -> Result<Vec<u8>> {
    let mut stream = Vec::with_capacity(instructions.len() * layout.instruction_bytes());
    for instr in instructions {
        stream.extend_from_slice(tcu::encode(layout, instr)?.as_bytes());
    }
    Ok(stream)
}

#[cfg(test)]
mod tests {
    use super::*;
    use tcu_spec::{Architecture, DepFlags, IsaSpec};

    #[test]
    fn test_assemble_empty() {
        let encoder = Encoder::new(IsaSpec::vta()).unwrap();
        assert!(assemble(&encoder, &[]).unwrap().is_empty());
    }

    #[test]
    fn test_assemble_concatenates_words() {
        let encoder = Encoder::new(IsaSpec::vta()).unwrap();
        let stream = assemble(
            &encoder,
            &[Instruction::Nop(DepFlags::NONE), Instruction::Finish(DepFlags::NONE)],
        )
        .unwrap();
        assert_eq!(stream.len(), 32);
        assert_eq!(stream[0], 2);
        assert_eq!(stream[16], 3);
    }

    #[test]
    fn test_assemble_tcu_stops_at_first_error() {
        let layout = Layout::new(&Architecture::pynq_z1()).unwrap();
        let program = [
            TcuInstruction::NoOp,
            TcuInstruction::LoadWeights {
                zeroes: false,
                local: tcu_spec::StridedAddress::new(1 << 20),
                size: 0,
            },
        ];
        assert!(assemble_tcu(&layout, &program).is_err());
        assert_eq!(assemble_tcu(&layout, &program[..1]).unwrap().len(), 8);
    }
}
