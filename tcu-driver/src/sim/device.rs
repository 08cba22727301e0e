//! Simulated TCU
//!
//! Executes NoOp, Configure and DataMove in order. MatMul and LoadWeights need
//! the systolic array and are reported as unsupported.

use super::PhysicalMemory;
use std::collections::{BTreeMap, VecDeque};
use tcu_spec::{
    AddressSpace, Architecture, ConfigRegister, DataMoveFlag, DataType, StridedAddress, TcuInstruction,
    TCU_BLOCK_SIZE,
};
use tracing::{debug, trace, warn};

#[derive(Clone, Debug)]
pub struct SimDevice {
    arch: Architecture,
    registers: BTreeMap<ConfigRegister, u64>,
    local: Vec<i32>,
    accumulator: Vec<i32>,
    queue: VecDeque<TcuInstruction>,
    executed: u64,
}

impl SimDevice {
    pub fn new(arch: Architecture) -> Self {
        let width = arch.array_size as usize;
        SimDevice {
            local: vec![0; arch.local_depth as usize * width],
            accumulator: vec![0; arch.accumulator_depth as usize * width],
            registers: BTreeMap::new(),
            queue: VecDeque::new(),
            executed: 0,
            arch,
        }
    }

    /// Clear memories, registers and the queue
    pub fn reset(&mut self) {
        *self = SimDevice::new(self.arch.clone());
    }

    pub fn enqueue(&mut self, instructions: impl IntoIterator<Item = TcuInstruction>) {
        self.queue.extend(instructions);
    }

    /// Instructions waiting to execute
    pub fn pending(&self) -> usize {
        self.queue.len()
    }

    pub fn executed(&self) -> u64 {
        self.executed
    }

    pub fn register(&self, register: ConfigRegister) -> u64 {
        self.registers.get(&register).copied().unwrap_or(0)
    }

    pub fn local_row(&self, row: u64) -> Option<&[i32]> {
        row_slice(&self.local, self.arch.array_size, row)
    }

    pub fn accumulator_row(&self, row: u64) -> Option<&[i32]> {
        row_slice(&self.accumulator, self.arch.array_size, row)
    }

    /// Execute up to `limit` queued instructions (all when `None`)
    ///
    /// A fault drops the rest of the queue and is returned once.
    pub(crate) fn step(&mut self, memory: &mut PhysicalMemory, limit: Option<usize>) -> Result<usize, String> {
        let count = limit.unwrap_or(usize::MAX).min(self.queue.len());
        for done in 0..count {
            let Some(instr) = self.queue.pop_front() else {
                return Ok(done);
            };
            if let Err(fault) = self.execute(memory, &instr) {
                let dropped = self.queue.len();
                self.queue.clear();
                warn!(?instr, dropped, "device fault: {}", fault);
                return Err(fault);
            }
            self.executed += 1;
        }
        if count > 0 {
            debug!(count, pending = self.queue.len(), "device step");
        }
        Ok(count)
    }

    fn execute(&mut self, memory: &mut PhysicalMemory, instr: &TcuInstruction) -> Result<(), String> {
        trace!(?instr, "execute");
        match *instr {
            TcuInstruction::NoOp => Ok(()),
            TcuInstruction::Configure { register, value } => {
                self.registers.insert(register, value);
                Ok(())
            }
            TcuInstruction::DataMove {
                flag,
                local,
                address,
                size,
            } => {
                for i in 0..=size {
                    let local_row = strided(local, i);
                    let remote_row = strided(address, i);
                    self.move_row(memory, flag, local_row, remote_row)?;
                }
                Ok(())
            }
            TcuInstruction::MatMul { .. } | TcuInstruction::LoadWeights { .. } => {
                Err(format!("{} is not supported by the simulator", instr.opcode()))
            }
        }
    }

    fn move_row(
        &mut self,
        memory: &mut PhysicalMemory,
        flag: DataMoveFlag,
        local_row: u64,
        remote_row: u64,
    ) -> Result<(), String> {
        let width = self.arch.array_size as usize;
        let data_type = self.arch.data_type;
        let local = row_range(self.arch.local_depth, width, local_row)
            .ok_or_else(|| format!("local row {} out of range", local_row))?;

        match flag.remote() {
            AddressSpace::Dram0 | AddressSpace::Dram1 => {
                let (register, depth) = if flag.remote() == AddressSpace::Dram0 {
                    (ConfigRegister::Dram0AddressOffset, self.arch.dram0_depth)
                } else {
                    (ConfigRegister::Dram1AddressOffset, self.arch.dram1_depth)
                };
                if remote_row >= depth {
                    return Err(format!("{} row {} out of range", flag.remote(), remote_row));
                }
                let row_bytes = self.arch.row_bytes();
                let phys = self.register(register) * TCU_BLOCK_SIZE + remote_row * row_bytes;

                if flag.is_to_local() {
                    let bytes = memory
                        .resolve(phys, row_bytes as usize)
                        .ok_or_else(|| format!("no buffer at physical {:#x}", phys))?;
                    let values = data_type.from_le_bytes(bytes);
                    self.local[local].copy_from_slice(&values);
                } else {
                    let bytes = data_type
                        .to_le_bytes(&self.local[local])
                        .map_err(|e| e.to_string())?;
                    memory
                        .resolve_mut(phys, row_bytes as usize)
                        .ok_or_else(|| format!("no buffer at physical {:#x}", phys))?
                        .copy_from_slice(&bytes);
                }
            }
            AddressSpace::Accumulator | AddressSpace::Local => {
                let acc = row_range(self.arch.accumulator_depth, width, remote_row)
                    .ok_or_else(|| format!("accumulator row {} out of range", remote_row))?;
                match flag {
                    DataMoveFlag::AccumulatorToLocal => {
                        self.local[local].copy_from_slice(&self.accumulator[acc]);
                    }
                    DataMoveFlag::LocalToAccumulatorAccumulate => {
                        for (a, l) in self.accumulator[acc].iter_mut().zip(&self.local[local]) {
                            *a = saturate(*a as i64 + *l as i64, data_type);
                        }
                    }
                    _ => self.accumulator[acc].copy_from_slice(&self.local[local]),
                }
            }
        }
        trace!(flag = flag.mnemonic(), local_row, remote_row, "row moved");
        Ok(())
    }
}

fn strided(addr: StridedAddress, i: u64) -> u64 {
    addr.address + (i << addr.stride)
}

fn row_range(depth: u64, width: usize, row: u64) -> Option<std::ops::Range<usize>> {
    (row < depth).then(|| row as usize * width..(row as usize + 1) * width)
}

fn row_slice(data: &[i32], array_size: u64, row: u64) -> Option<&[i32]> {
    let width = array_size as usize;
    let start = (row as usize).checked_mul(width)?;
    data.get(start..start + width)
}

fn saturate(value: i64, data_type: DataType) -> i32 {
    value.clamp(data_type.min_raw() as i64, data_type.max_raw() as i64) as i32
}
