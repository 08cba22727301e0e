//! Stream disassembly

use crate::decoder::{decode, decode_tcu};
use crate::error::{DisassemblerError, Result};
use crate::formatter::{format, format_tcu};
use tcu_assembler::Encoder;
use tcu_spec::Layout;

fn hex(bytes: &[u8]) -> String {
    // Most significant byte first, the way the word reads as a number
    bytes.iter().rev().map(|b| format!("{:02X}", b)).collect()
}

fn words(stream: &[u8], word_bytes: usize) -> Result<std::slice::ChunksExact<'_, u8>> {
    if word_bytes == 0 || stream.len() % word_bytes != 0 {
        return Err(DisassemblerError::Truncated {
            len: stream.len(),
            word_bytes,
        });
    }
    Ok(stream.chunks_exact(word_bytes))
}

/// Disassemble a VTA-style instruction stream, one line per instruction
///
/// Words that fail to decode are reported inline and do not stop the listing.
pub fn disassemble(encoder: &Encoder, stream: &[u8]) -> Result<String> {
    let word_bytes = encoder.word_bytes();
    let chunks = words(stream, word_bytes)?;

    let mut output = String::new();
    output.push_str("; VTA disassembly\n");
    output.push_str(&format!(
        "; {} instructions ({}-bit words)\n",
        stream.len() / word_bytes,
        encoder.word_bits()
    ));
    output.push('\n');

    for (i, word) in chunks.enumerate() {
        output.push_str(&format!("0x{:06X}:  {}  ", i * word_bytes, hex(word)));
        match decode(encoder, word) {
            Ok(instr) => output.push_str(&format(&instr)),
            Err(e) => output.push_str(&format!("; ERROR: {}", e)),
        }
        output.push('\n');
    }

    Ok(output)
}

/// Disassemble a TCU instruction stream, one line per instruction
pub fn disassemble_tcu(layout: &Layout, stream: &[u8]) -> Result<String> {
    let word_bytes = layout.instruction_bytes();
    let chunks = words(stream, word_bytes)?;

    let mut output = String::new();
    output.push_str("; TCU disassembly\n");
    output.push_str(&format!(
        "; {} instructions ({}-bit words)\n",
        stream.len() / word_bytes,
        layout.instruction_bits()
    ));
    output.push('\n');

    for (i, word) in chunks.enumerate() {
        output.push_str(&format!("0x{:06X}:  {}  ", i * word_bytes, hex(word)));
        match decode_tcu(layout, word) {
            Ok(instr) => output.push_str(&format_tcu(&instr)),
            Err(e) => output.push_str(&format!("; ERROR: {}", e)),
        }
        output.push('\n');
    }

    Ok(output)
}

#[cfg(test)]
mod tests {
    use super::*;
    use tcu_assembler::{assemble, assemble_tcu};
    use tcu_spec::{Architecture, DataMoveFlag, DepFlags, Instruction, IsaSpec, TcuInstruction};

    #[test]
    fn test_disassemble_vta_stream() {
        let encoder = Encoder::new(IsaSpec::vta()).unwrap();
        let stream = assemble(
            &encoder,
            &[Instruction::Nop(DepFlags::NONE), Instruction::Finish(DepFlags::NONE)],
        )
        .unwrap();
        let asm = disassemble(&encoder, &stream).unwrap();
        assert!(asm.contains("2 instructions (128-bit words)"));
        assert!(asm.contains("0x000000:  00000000000000000000000000000002  nop"));
        assert!(asm.contains("0x000010:  00000000000000000000000000000003  finish"));
    }

    #[test]
    fn test_disassemble_reports_bad_words_inline() {
        let layout = Layout::new(&Architecture::pynq_z1()).unwrap();
        let mut stream = assemble_tcu(
            &layout,
            &[TcuInstruction::data_move(DataMoveFlag::Dram0ToLocal, 1, 2, 0)],
        )
        .unwrap();
        stream.extend_from_slice(&[0, 0, 0, 0, 0, 0, 0, 0x70]);

        let asm = disassemble_tcu(&layout, &stream).unwrap();
        assert!(asm.contains("datamove dram0->local local=1 addr=2 size=0"));
        assert!(asm.contains("; ERROR: Unknown opcode: 0x07"));
    }

    #[test]
    fn test_disassemble_truncated_stream() {
        let layout = Layout::new(&Architecture::pynq_z1()).unwrap();
        assert!(matches!(
            disassemble_tcu(&layout, &[0u8; 12]),
            Err(DisassemblerError::Truncated { len: 12, word_bytes: 8 })
        ));
    }
}
