//! Instruction formatting to text

use tcu_spec::{AluOp, DepFlags, GemmOp, Instruction, MemOp, StridedAddress, TcuInstruction};

/// Format a VTA-style instruction
pub fn format(instr: &Instruction) -> String {
    let body = match instr {
        Instruction::Load(op) | Instruction::Store(op) => format_mem(op),
        Instruction::Gemm(op) => format_gemm(op),
        Instruction::Alu { func, use_imm, op } => {
            let imm = if *use_imm {
                format!(" imm={}", op.imm)
            } else {
                String::new()
            };
            format!("{}{} {}", func.key(), imm, format_alu(op))
        }
        Instruction::Addi(op) => format!("imm={} {}", op.imm, format_alu(op)),
        Instruction::Finish(_) | Instruction::Nop(_) => String::new(),
    };

    let deps = format_deps(&instr.deps());
    let mut text = instr.mnemonic().to_string();
    for part in [body, deps] {
        if !part.is_empty() {
            text.push(' ');
            text.push_str(&part);
        }
    }
    text
}

fn format_deps(deps: &DepFlags) -> String {
    let names: Vec<&str> = [
        (deps.pop_prev, "pop_prev"),
        (deps.pop_next, "pop_next"),
        (deps.push_prev, "push_prev"),
        (deps.push_next, "push_next"),
    ]
    .iter()
    .filter(|(set, _)| *set)
    .map(|(_, name)| *name)
    .collect();

    if names.is_empty() {
        String::new()
    } else {
        format!("deps({})", names.join(","))
    }
}

fn format_mem(op: &MemOp) -> String {
    format!(
        "sram=0x{:X} dram=0x{:X} y={} x={} stride={} pad=[{},{},{},{}]",
        op.sram_base,
        op.dram_base,
        op.y_size,
        op.x_size,
        op.x_stride,
        op.y_pad_0,
        op.y_pad_1,
        op.x_pad_0,
        op.x_pad_1
    )
}

fn format_gemm(op: &GemmOp) -> String {
    format!(
        "{}uop=[{},{}) iter={}x{} dst={},{} src={},{} wgt={},{}",
        if op.reset { "reset " } else { "" },
        op.uop_begin,
        op.uop_end,
        op.iter_out,
        op.iter_in,
        op.dst_factor_out,
        op.dst_factor_in,
        op.src_factor_out,
        op.src_factor_in,
        op.wgt_factor_out,
        op.wgt_factor_in
    )
}

fn format_alu(op: &AluOp) -> String {
    format!(
        "{}uop=[{},{}) iter={}x{} dst={},{} src={},{}",
        if op.reset { "reset " } else { "" },
        op.uop_begin,
        op.uop_end,
        op.iter_out,
        op.iter_in,
        op.dst_factor_out,
        op.dst_factor_in,
        op.src_factor_out,
        op.src_factor_in
    )
}

fn format_strided(addr: &StridedAddress) -> String {
    if addr.stride == 0 {
        addr.address.to_string()
    } else {
        format!("{}:{}", addr.address, addr.stride)
    }
}

/// Format a TCU instruction
pub fn format_tcu(instr: &TcuInstruction) -> String {
    let op = instr.opcode().mnemonic();
    match instr {
        TcuInstruction::NoOp => op.to_string(),
        TcuInstruction::MatMul {
            accumulate,
            zeroes,
            local,
            accumulator,
            size,
        } => format!(
            "{}{}{} local={} acc={} size={}",
            op,
            if *accumulate { ".acc" } else { "" },
            if *zeroes { ".zeroes" } else { "" },
            format_strided(local),
            format_strided(accumulator),
            size
        ),
        TcuInstruction::DataMove {
            flag,
            local,
            address,
            size,
        } => format!(
            "{} {} local={} addr={} size={}",
            op,
            flag.mnemonic(),
            format_strided(local),
            format_strided(address),
            size
        ),
        TcuInstruction::LoadWeights { zeroes, local, size } => format!(
            "{}{} local={} size={}",
            op,
            if *zeroes { ".zeroes" } else { "" },
            format_strided(local),
            size
        ),
        TcuInstruction::Configure { register, value } => {
            format!("{} {}={}", op, register.name(), value)
        }
    }
}
